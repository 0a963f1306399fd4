use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::DebpullError;
use crate::host::HostPackageSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum InstallOutcome {
    AlreadyInstalled { version: String },
    Installed { previous: Option<String> },
    InstalledAfterRepair { previous: Option<String> },
}

/// Installs `artifact` unless the same version is already installed.
///
/// A failed install triggers one dependency repair and one more install
/// attempt before giving up.
pub fn install_artifact(
    host: &dyn HostPackageSystem,
    artifact: &Path,
    package: &str,
    version: &str,
    force: bool,
) -> Result<InstallOutcome, DebpullError> {
    let installed = host.installed_version(package)?;
    if !force {
        if let Some(current) = &installed {
            if host.compare_versions(current, version).is_eq() {
                info!(package, version, "already installed");
                return Ok(InstallOutcome::AlreadyInstalled {
                    version: current.clone(),
                });
            }
        }
    }

    let first = match host.install(artifact) {
        Ok(()) => return Ok(InstallOutcome::Installed { previous: installed }),
        Err(err) => err,
    };
    warn!(error = %first, "install failed, repairing dependencies");

    host.repair_dependencies().map_err(|err| {
        DebpullError::InstallFailed(format!("{first}; dependency repair failed: {err}"))
    })?;

    match host.install(artifact) {
        Ok(()) => Ok(InstallOutcome::InstalledAfterRepair { previous: installed }),
        Err(_) if host.installed_version(package)?.as_deref() == Some(version) => {
            Ok(InstallOutcome::InstalledAfterRepair { previous: installed })
        }
        Err(err) => Err(DebpullError::InstallFailed(format!(
            "{err} (after dependency repair)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct ScriptedHost {
        installed: Mutex<Option<String>>,
        install_results: Mutex<VecDeque<bool>>,
        repair_ok: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedHost {
        fn new(installed: Option<&str>, installs: &[bool], repair_ok: bool) -> Self {
            Self {
                installed: Mutex::new(installed.map(str::to_string)),
                install_results: Mutex::new(installs.iter().copied().collect()),
                repair_ok,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HostPackageSystem for ScriptedHost {
        fn native_architecture(&self) -> Result<String, DebpullError> {
            Ok("amd64".to_string())
        }

        fn installed_version(&self, _package: &str) -> Result<Option<String>, DebpullError> {
            Ok(self.installed.lock().unwrap().clone())
        }

        fn install(&self, _artifact: &Path) -> Result<(), DebpullError> {
            self.calls.lock().unwrap().push("install");
            let ok = self.install_results.lock().unwrap().pop_front().unwrap_or(false);
            if ok {
                Ok(())
            } else {
                Err(DebpullError::HostTool("dependency problems".to_string()))
            }
        }

        fn repair_dependencies(&self) -> Result<(), DebpullError> {
            self.calls.lock().unwrap().push("repair");
            if self.repair_ok {
                Ok(())
            } else {
                Err(DebpullError::HostTool("apt-get failed".to_string()))
            }
        }
    }

    const DEB: &str = "/tmp/foo_1.0_amd64.deb";

    #[test]
    fn same_version_is_noop() {
        let host = ScriptedHost::new(Some("1.0"), &[], true);
        let outcome = install_artifact(&host, Path::new(DEB), "foo", "1.0", false).unwrap();
        assert_matches!(outcome, InstallOutcome::AlreadyInstalled { .. });
        assert!(host.calls().is_empty());
    }

    #[test]
    fn force_reinstalls() {
        let host = ScriptedHost::new(Some("1.0"), &[true], true);
        let outcome = install_artifact(&host, Path::new(DEB), "foo", "1.0", true).unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                previous: Some("1.0".to_string())
            }
        );
    }

    #[test]
    fn repair_then_retry() {
        let host = ScriptedHost::new(None, &[false, true], true);
        let outcome = install_artifact(&host, Path::new(DEB), "foo", "1.0", false).unwrap();
        assert_matches!(outcome, InstallOutcome::InstalledAfterRepair { previous: None });
        assert_eq!(host.calls(), vec!["install", "repair", "install"]);
    }

    #[test]
    fn failed_repair_is_fatal() {
        let host = ScriptedHost::new(Some("0.9"), &[false], false);
        let err = install_artifact(&host, Path::new(DEB), "foo", "1.0", false).unwrap_err();
        assert_matches!(err, DebpullError::InstallFailed(_));
        assert_eq!(host.calls(), vec!["install", "repair"]);
    }

    #[test]
    fn failed_retry_is_fatal() {
        let host = ScriptedHost::new(None, &[false, false], true);
        let err = install_artifact(&host, Path::new(DEB), "foo", "1.0", false).unwrap_err();
        assert_matches!(err, DebpullError::InstallFailed(_));
    }
}

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::DebpullError;
use crate::version;

/// Capabilities borrowed from the host's package ecosystem.
pub trait HostPackageSystem: Send + Sync {
    fn compare_versions(&self, left: &str, right: &str) -> Ordering {
        version::compare_versions(left, right)
    }

    fn native_architecture(&self) -> Result<String, DebpullError>;

    /// Installed version of `package`, or `None` when it is not installed.
    fn installed_version(&self, package: &str) -> Result<Option<String>, DebpullError>;

    fn install(&self, artifact: &Path) -> Result<(), DebpullError>;

    fn repair_dependencies(&self) -> Result<(), DebpullError>;
}

#[derive(Debug, Clone)]
pub struct DpkgHost {
    dpkg: Option<PathBuf>,
    dpkg_query: Option<PathBuf>,
    apt_get: Option<PathBuf>,
    sudo: Option<PathBuf>,
}

impl DpkgHost {
    pub fn new() -> Self {
        let sudo = if running_as_root() {
            None
        } else {
            find_in_path("sudo")
        };
        Self {
            dpkg: find_in_path("dpkg"),
            dpkg_query: find_in_path("dpkg-query"),
            apt_get: find_in_path("apt-get"),
            sudo,
        }
    }

    fn require<'a>(tool: &'a Option<PathBuf>, name: &str) -> Result<&'a PathBuf, DebpullError> {
        tool.as_ref()
            .ok_or_else(|| DebpullError::HostTool(format!("required tool not found: {name}")))
    }

    fn run_privileged(&self, program: &Path, args: &[String]) -> Result<(), DebpullError> {
        let mut cmd = match &self.sudo {
            Some(sudo) => {
                let mut cmd = Command::new(sudo);
                cmd.arg(program);
                cmd
            }
            None => Command::new(program),
        };
        cmd.args(args);
        debug!(command = ?cmd, "running");
        let status = cmd
            .status()
            .map_err(|err| DebpullError::HostTool(format!("{}: {err}", program.display())))?;
        if status.success() {
            return Ok(());
        }
        Err(DebpullError::HostTool(format!(
            "{} exited with {status}",
            program.display()
        )))
    }
}

impl Default for DpkgHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPackageSystem for DpkgHost {
    fn native_architecture(&self) -> Result<String, DebpullError> {
        if let Some(dpkg) = &self.dpkg {
            if let Some(arch) = capture(dpkg, &["--print-architecture"]) {
                return Ok(arch);
            }
        }
        debian_arch(std::env::consts::ARCH)
            .map(str::to_string)
            .ok_or_else(|| {
                DebpullError::HostTool(format!(
                    "cannot map architecture {} to a Debian name; pass --arch",
                    std::env::consts::ARCH
                ))
            })
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>, DebpullError> {
        let dpkg_query = Self::require(&self.dpkg_query, "dpkg-query")?;
        let format = "-f=${Status}\t${Version}";
        let Some(output) = capture(dpkg_query, &["-W", format, package]) else {
            return Ok(None);
        };
        Ok(parse_query_output(&output))
    }

    fn install(&self, artifact: &Path) -> Result<(), DebpullError> {
        let dpkg = Self::require(&self.dpkg, "dpkg")?;
        self.run_privileged(dpkg, &["-i".to_string(), artifact.display().to_string()])
    }

    fn repair_dependencies(&self) -> Result<(), DebpullError> {
        let apt_get = Self::require(&self.apt_get, "apt-get")?;
        self.run_privileged(
            apt_get,
            &["install".to_string(), "-f".to_string(), "-y".to_string()],
        )
    }
}

fn parse_query_output(output: &str) -> Option<String> {
    let line = output.lines().next()?;
    let (status, version) = line.split_once('\t')?;
    let version = version.trim();
    if status.trim_end().ends_with(" installed") && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

/// Maps a Rust target architecture to its Debian name.
pub fn debian_arch(rust_arch: &str) -> Option<&'static str> {
    match rust_arch {
        "x86_64" => Some("amd64"),
        "x86" => Some("i386"),
        "aarch64" => Some("arm64"),
        "arm" => Some("armhf"),
        "powerpc64" => Some("ppc64el"),
        "riscv64" => Some("riscv64"),
        "s390x" => Some("s390x"),
        "loongarch64" => Some("loong64"),
        "mips64" => Some("mips64el"),
        _ => None,
    }
}

fn capture(program: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

fn running_as_root() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim() == "0")
        .unwrap_or(false)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::descriptor::RepositoryDescriptor;
use crate::error::DebpullError;
use crate::index::VersionRequest;
use crate::repo::ClientSettings;

pub const LOCAL_CONFIG_FILE: &str = "debpull.json";

/// Defaults read from `debpull.json`. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl Defaults {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            user_agent: self.user_agent.clone(),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads defaults from `path` when given (it must exist), otherwise from
    /// `./debpull.json` or the user config directory if either exists.
    pub fn resolve(path: Option<&str>) -> Result<Defaults, DebpullError> {
        if let Some(path) = path {
            return Self::load(Utf8Path::new(path));
        }
        let local = Utf8PathBuf::from(LOCAL_CONFIG_FILE);
        if local.as_std_path().is_file() {
            return Self::load(&local);
        }
        match user_config_path() {
            Some(user) if user.as_std_path().is_file() => Self::load(&user),
            _ => Ok(Defaults::default()),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Defaults, DebpullError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| DebpullError::ConfigRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Defaults, DebpullError> {
        serde_json::from_str(content).map_err(|err| DebpullError::ConfigParse(err.to_string()))
    }
}

fn user_config_path() -> Option<Utf8PathBuf> {
    let dirs = ProjectDirs::from("", "", "debpull")?;
    Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.json")).ok()
}

/// Values supplied on the command line, before defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub distribution: Option<String>,
    pub component: Option<String>,
    pub package: Option<String>,
    pub version: Option<String>,
    pub arch: Option<String>,
    pub output_dir: Option<Utf8PathBuf>,
    pub install: bool,
    pub force: bool,
    pub overwrite: bool,
    pub dry_run: bool,
}

/// Everything one run needs, fixed before the pipeline starts.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub descriptor: RepositoryDescriptor,
    pub package: Option<String>,
    pub version: VersionRequest,
    /// `None` means ask the host for its native architecture.
    pub arch: Option<String>,
    pub output_dir: Utf8PathBuf,
    pub install: bool,
    pub force: bool,
    pub overwrite: bool,
    pub dry_run: bool,
}

impl FetchConfig {
    pub fn build(request: FetchRequest, defaults: &Defaults) -> Result<Self, DebpullError> {
        let parsed = RepositoryDescriptor::parse(&request.url)?;
        // a repository line always names its component, a bare URL does not
        let component = match request.component {
            Some(component) => Some(component),
            None if !parsed.is_repo_line() => defaults.component.clone(),
            None => None,
        };
        let descriptor = parsed
            .with_distribution(request.distribution)
            .with_component(component);

        let arch = non_empty(request.arch)
            .or_else(|| descriptor.architectures().first().cloned())
            .or_else(|| non_empty(defaults.arch.clone()));

        let output_dir = match request.output_dir.or_else(|| defaults.output_dir.clone()) {
            Some(dir) => dir,
            None => default_output_dir()?,
        };

        let version = request
            .version
            .as_deref()
            .unwrap_or("latest")
            .parse::<VersionRequest>()?;

        Ok(Self {
            descriptor,
            package: non_empty(request.package),
            version,
            arch,
            output_dir,
            install: request.install,
            force: request.force,
            overwrite: request.overwrite,
            dry_run: request.dry_run,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn default_output_dir() -> Result<Utf8PathBuf, DebpullError> {
    Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .map_err(|_| DebpullError::Filesystem("non-utf8 temporary directory".to_string()))
}

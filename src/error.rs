use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DebpullError {
    #[error("invalid repository descriptor: {0}")]
    #[diagnostic(help(
        "pass a repository line (`deb [opts] URL DIST COMPONENT`) or an http(s) base URL"
    ))]
    InvalidDescriptor(String),

    #[error("multiple distributions found: {}", candidates.join(", "))]
    #[diagnostic(help("choose one with --dist"))]
    AmbiguousDistribution { candidates: Vec<String> },

    #[error("could not discover a distribution: {0}")]
    #[diagnostic(help("pass the distribution explicitly with --dist"))]
    DiscoveryFailed(String),

    #[error("package index unavailable at {url}: {message}")]
    IndexUnavailable { url: String, message: String },

    #[error("invalid index entry: {0}")]
    InvalidIndexEntry(String),

    #[error("no package specified; available packages: {}", join_or_none(available))]
    #[diagnostic(help("choose one with --package"))]
    PackageNotSpecified { available: Vec<String> },

    #[error("package {package} not found; available packages: {}", join_or_none(available))]
    PackageNotFound {
        package: String,
        available: Vec<String>,
    },

    #[error(
        "version {version} of {package} not found; available versions: {}",
        join_or_none(available)
    )]
    #[diagnostic(help("omit --version (or pass `latest`) to take the newest"))]
    VersionNotFound {
        package: String,
        version: String,
        available: Vec<String>,
    },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("server returned status {status} for {url}")]
    DownloadStatus { status: u16, url: String },

    #[error("download cancelled")]
    Cancelled,

    #[error("installation failed: {0}")]
    InstallFailed(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("host tool failed: {0}")]
    HostTool(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl DebpullError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DebpullError::Cancelled)
    }
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}

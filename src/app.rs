use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::config::FetchConfig;
use crate::descriptor::RepositoryDescriptor;
use crate::discovery;
use crate::download::{CancelToken, DownloadJob, DownloadOutcome, Downloader};
use crate::error::DebpullError;
use crate::host::HostPackageSystem;
use crate::index::PackageIndex;
use crate::install::{InstallOutcome, install_artifact};
use crate::repo::{self, RepoClient};

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub distribution: String,
    pub component: String,
    pub source_url: String,
    pub path: String,
    pub action: FetchAction,
    pub bytes: Option<u64>,
    pub install: Option<InstallOutcome>,
    pub fetched_at: String,
}

/// What happened to the artifact on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchAction {
    Download,
    Cache,
    DryRun,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

pub struct App<C: RepoClient, H: HostPackageSystem> {
    client: C,
    host: H,
    cancel: CancelToken,
}

impl<C: RepoClient, H: HostPackageSystem> App<C, H> {
    pub fn new(client: C, host: H, cancel: CancelToken) -> Self {
        Self {
            client,
            host,
            cancel,
        }
    }

    /// Runs the whole pipeline for one artifact: distribution discovery,
    /// index fetch, resolution, download and the optional install.
    pub fn fetch(
        &self,
        config: &FetchConfig,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, DebpullError> {
        let descriptor = &config.descriptor;
        emit(sink, format!("phase=Resolve; repository {}", descriptor.base_url()));

        let distribution = match descriptor.distribution() {
            Some(dist) => dist.to_string(),
            None => self.discover_distribution(descriptor, sink)?,
        };
        let architecture = match &config.arch {
            Some(arch) => arch.clone(),
            None => self.host.native_architecture()?,
        };

        emit(
            sink,
            format!(
                "phase=Fetch; index {distribution}/{}/binary-{architecture}",
                descriptor.component()
            ),
        );
        let start = Instant::now();
        let text = repo::fetch_index(&self.client, descriptor, &distribution, &architecture)?;
        sink.event(ProgressEvent {
            message: format!("index.response bytes={}", text.len()),
            elapsed: Some(start.elapsed()),
        });

        let index = PackageIndex::parse(&text);
        info!(entries = index.entries().len(), "parsed package index");
        let target = index.resolve_with(config.package.as_deref(), &config.version, |a, b| {
            self.host.compare_versions(a, b)
        })?;
        emit(
            sink,
            format!("phase=Resolve; selected {} {}", target.package, target.version),
        );

        let source_url = descriptor.artifact_url(&target.artifact_path);
        let job = DownloadJob::new(source_url, &config.output_dir, target.file_name()?);

        let mut result = FetchResult {
            package: target.package.clone(),
            version: target.version.clone(),
            architecture,
            distribution,
            component: descriptor.component().to_string(),
            source_url: job.source_url.clone(),
            path: job.final_path.to_string(),
            action: FetchAction::DryRun,
            bytes: None,
            install: None,
            fetched_at: chrono::Utc::now().to_rfc3339(),
        };
        if config.dry_run {
            return Ok(result);
        }

        emit(sink, format!("phase=Download; {}", job.source_url));
        let start = Instant::now();
        let outcome = Downloader::new(&self.client, self.cancel.clone())
            .download(&job, config.overwrite)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; {}", outcome.path()),
            elapsed: Some(start.elapsed()),
        });
        match &outcome {
            DownloadOutcome::Downloaded { bytes, .. } => {
                result.action = FetchAction::Download;
                result.bytes = Some(*bytes);
            }
            DownloadOutcome::Cached { .. } => {
                result.action = FetchAction::Cache;
            }
        }

        if config.install {
            emit(sink, format!("phase=Install; {}", target.package));
            let installed = install_artifact(
                &self.host,
                outcome.path().as_std_path(),
                &target.package,
                &target.version,
                config.force,
            )?;
            result.install = Some(installed);
        }

        Ok(result)
    }

    fn discover_distribution(
        &self,
        descriptor: &RepositoryDescriptor,
        sink: &dyn ProgressSink,
    ) -> Result<String, DebpullError> {
        let url = descriptor.dists_url();
        emit(sink, format!("phase=Resolve; discovering distribution at {url}"));
        let html = self
            .client
            .fetch_listing(&url)
            .map_err(|err| DebpullError::DiscoveryFailed(format!("{url}: {err}")))?;
        let distribution = discovery::resolve_distribution(discovery::parse_listing(&html))?;
        info!(%distribution, "discovered distribution");
        Ok(distribution)
    }
}

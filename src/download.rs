use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::DebpullError;
use crate::repo::RepoClient;

const CHUNK_SIZE: usize = 64 * 1024;
const CANCEL_POLL: Duration = Duration::from_millis(50);
pub const CANCEL_EXIT_CODE: i32 = 130;

/// Interrupt state shared between the Ctrl-C handler and the transfer loop.
///
/// While armed, an interrupt only raises the flag so the transfer can clean
/// up after itself. While disarmed, an interrupt exits with status 130.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    armed: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the process-wide Ctrl-C handler. Call at most once.
    pub fn install_handler(&self) -> Result<(), DebpullError> {
        let state = self.inner.clone();
        ctrlc::set_handler(move || {
            if state.armed.load(Ordering::SeqCst) {
                state.cancelled.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(CANCEL_EXIT_CODE);
            }
        })
        .map_err(|err| DebpullError::HostTool(format!("failed to set signal handler: {err}")))
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn arm(&self) -> ArmGuard<'_> {
        self.inner.armed.store(true, Ordering::SeqCst);
        ArmGuard { token: self }
    }
}

struct ArmGuard<'a> {
    token: &'a CancelToken,
}

impl Drop for ArmGuard<'_> {
    fn drop(&mut self) {
        self.token.inner.armed.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub source_url: String,
    pub final_path: Utf8PathBuf,
    pub partial_path: Utf8PathBuf,
}

impl DownloadJob {
    pub fn new(source_url: impl Into<String>, dir: &Utf8Path, file_name: &str) -> Self {
        let final_path = dir.join(file_name);
        let partial_path = Utf8PathBuf::from(format!("{final_path}.part"));
        Self {
            source_url: source_url.into(),
            final_path,
            partial_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Downloaded { path: Utf8PathBuf, bytes: u64 },
    Cached { path: Utf8PathBuf },
}

impl DownloadOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            DownloadOutcome::Downloaded { path, .. } | DownloadOutcome::Cached { path } => path,
        }
    }
}

/// A `.part` file that is removed on drop unless committed to its final path.
struct PartialFile {
    path: Utf8PathBuf,
    file: Option<File>,
}

impl PartialFile {
    fn create(path: &Utf8Path) -> Result<Self, DebpullError> {
        let file = File::create(path.as_std_path())
            .map_err(|err| DebpullError::Filesystem(format!("create {path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    fn writer(&mut self) -> Result<&mut File, DebpullError> {
        self.file
            .as_mut()
            .ok_or_else(|| DebpullError::Filesystem("partial file already closed".to_string()))
    }

    fn commit(mut self, final_path: &Utf8Path) -> Result<(), DebpullError> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|err| DebpullError::Filesystem(err.to_string()))?;
        }
        fs::rename(self.path.as_std_path(), final_path.as_std_path())
            .map_err(|err| DebpullError::Filesystem(format!("rename to {final_path}: {err}")))?;
        self.path = Utf8PathBuf::new();
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        self.file.take();
        if self.path.as_str().is_empty() {
            return;
        }
        match fs::remove_file(self.path.as_std_path()) {
            Ok(()) => debug!(path = %self.path, "removed partial download"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path, error = %err, "failed to remove partial download"),
        }
    }
}

pub struct Downloader<'a> {
    client: &'a dyn RepoClient,
    cancel: CancelToken,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a dyn RepoClient, cancel: CancelToken) -> Self {
        Self { client, cancel }
    }

    /// Fetches `job.source_url` into `job.final_path`. An existing final file
    /// is reused unless `overwrite` is set. The final path only ever receives
    /// a complete body.
    pub fn download(
        &self,
        job: &DownloadJob,
        overwrite: bool,
    ) -> Result<DownloadOutcome, DebpullError> {
        if let Some(parent) = job.final_path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DebpullError::Filesystem(format!("create {parent}: {err}")))?;
        }

        if !overwrite && job.final_path.as_std_path().is_file() {
            info!(path = %job.final_path, "artifact already present, skipping download");
            return Ok(DownloadOutcome::Cached {
                path: job.final_path.clone(),
            });
        }

        let _armed = self.cancel.arm();
        if self.cancel.is_cancelled() {
            return Err(DebpullError::Cancelled);
        }

        let mut partial = PartialFile::create(&job.partial_path)?;
        let stream = self
            .client
            .open_artifact(&job.source_url)
            .map_err(|err| DebpullError::DownloadFailed(err.to_string()))?;
        let bytes = self.copy_stream(stream.reader, partial.writer()?)?;
        if self.cancel.is_cancelled() {
            warn!("download interrupted");
            return Err(DebpullError::Cancelled);
        }

        if let Some(expected) = stream.content_length {
            if expected != bytes {
                return Err(DebpullError::DownloadFailed(format!(
                    "incomplete body from {}: expected {expected} bytes, got {bytes}",
                    job.source_url
                )));
            }
        }

        partial.commit(&job.final_path)?;
        info!(path = %job.final_path, bytes, "download complete");
        Ok(DownloadOutcome::Downloaded {
            path: job.final_path.clone(),
            bytes,
        })
    }

    /// Copies the body chunk by chunk. Reads happen on a helper thread so an
    /// interrupt is noticed even while the server sends nothing.
    fn copy_stream(
        &self,
        reader: Box<dyn Read + Send>,
        writer: &mut File,
    ) -> Result<u64, DebpullError> {
        let chunks = spawn_reader(reader);
        let mut total = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                warn!("download interrupted");
                return Err(DebpullError::Cancelled);
            }
            let chunk = match chunks.recv_timeout(CANCEL_POLL) {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(err)) => return Err(DebpullError::DownloadFailed(err.to_string())),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            writer
                .write_all(&chunk)
                .map_err(|err| DebpullError::Filesystem(err.to_string()))?;
            total += chunk.len() as u64;
        }
        writer
            .flush()
            .map_err(|err| DebpullError::Filesystem(err.to_string()))?;
        Ok(total)
    }
}

/// Reads `reader` to the end on its own thread. The channel closes at end of
/// body; the thread stops early once the receiver is dropped.
fn spawn_reader(mut reader: Box<dyn Read + Send>) -> Receiver<io::Result<Vec<u8>>> {
    let (sender, receiver) = mpsc::sync_channel(4);
    thread::spawn(move || {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let chunk = match reader.read(&mut buffer) {
                Ok(0) => return,
                Ok(read) => Ok(buffer[..read].to_vec()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => Err(err),
            };
            let failed = chunk.is_err();
            if sender.send(chunk).is_err() || failed {
                return;
            }
        }
    });
    receiver
}

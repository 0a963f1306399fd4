use std::io::{Cursor, Read};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use debpull::download::{CancelToken, DownloadJob, DownloadOutcome, Downloader};
use debpull::error::DebpullError;
use debpull::repo::{ArtifactStream, RepoClient};

const BODY: &[u8] = b"!<arch>\ndebian-binary   1700000000  0     0     100644  4         `\n2.0\n";

#[derive(Default)]
struct CountingRepo {
    opened: Mutex<usize>,
    status: Option<u16>,
}

impl RepoClient for CountingRepo {
    fn fetch_listing(&self, _url: &str) -> Result<String, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn open_artifact(&self, url: &str) -> Result<ArtifactStream, DebpullError> {
        *self.opened.lock().unwrap() += 1;
        if let Some(status) = self.status {
            return Err(DebpullError::DownloadStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(ArtifactStream {
            reader: Box::new(Cursor::new(BODY.to_vec())),
            content_length: Some(BODY.len() as u64),
        })
    }
}

/// Yields one chunk, then trips the cancel token as if Ctrl-C arrived.
struct InterruptingReader {
    cancel: CancelToken,
    sent: bool,
}

impl Read for InterruptingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.sent {
            self.cancel.cancel();
            buf[..4].copy_from_slice(b"more");
            return Ok(4);
        }
        self.sent = true;
        buf[..4].copy_from_slice(b"part");
        Ok(4)
    }
}

struct InterruptingRepo {
    cancel: CancelToken,
}

impl RepoClient for InterruptingRepo {
    fn fetch_listing(&self, _url: &str) -> Result<String, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn open_artifact(&self, _url: &str) -> Result<ArtifactStream, DebpullError> {
        Ok(ArtifactStream {
            reader: Box::new(InterruptingReader {
                cancel: self.cancel.clone(),
                sent: false,
            }),
            content_length: None,
        })
    }
}

/// Never delivers a byte within the lifetime of a test.
struct StalledReader;

impl Read for StalledReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(0)
    }
}

struct StalledRepo;

impl RepoClient for StalledRepo {
    fn fetch_listing(&self, _url: &str) -> Result<String, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, DebpullError> {
        Err(DebpullError::Http("not used".to_string()))
    }

    fn open_artifact(&self, _url: &str) -> Result<ArtifactStream, DebpullError> {
        Ok(ArtifactStream {
            reader: Box::new(StalledReader),
            content_length: Some(100),
        })
    }
}

fn out_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("nested").join("debs")).unwrap()
}

#[test]
fn downloads_into_new_directory() {
    let temp = tempfile::tempdir().unwrap();
    let repo = CountingRepo::default();
    let job = DownloadJob::new("https://h/d/pool/foo_1.0_amd64.deb", &out_dir(&temp), "foo_1.0_amd64.deb");

    let outcome = Downloader::new(&repo, CancelToken::new())
        .download(&job, false)
        .unwrap();

    assert_matches!(outcome, DownloadOutcome::Downloaded { bytes, .. } if bytes == BODY.len() as u64);
    assert_eq!(std::fs::read(job.final_path.as_std_path()).unwrap(), BODY);
    assert!(!job.partial_path.exists());
}

#[test]
fn existing_file_skips_network() {
    let temp = tempfile::tempdir().unwrap();
    let dir = out_dir(&temp);
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    let job = DownloadJob::new("https://h/d/pool/foo.deb", &dir, "foo.deb");
    std::fs::write(job.final_path.as_std_path(), b"old").unwrap();
    let repo = CountingRepo::default();

    let outcome = Downloader::new(&repo, CancelToken::new())
        .download(&job, false)
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Cached {
            path: job.final_path.clone()
        }
    );
    assert_eq!(*repo.opened.lock().unwrap(), 0);
    assert_eq!(std::fs::read(job.final_path.as_std_path()).unwrap(), b"old");
}

#[test]
fn overwrite_replaces_existing_file() {
    let temp = tempfile::tempdir().unwrap();
    let dir = out_dir(&temp);
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    let job = DownloadJob::new("https://h/d/pool/foo.deb", &dir, "foo.deb");
    std::fs::write(job.final_path.as_std_path(), b"old").unwrap();
    let repo = CountingRepo::default();

    let outcome = Downloader::new(&repo, CancelToken::new())
        .download(&job, true)
        .unwrap();

    assert_matches!(outcome, DownloadOutcome::Downloaded { .. });
    assert_eq!(*repo.opened.lock().unwrap(), 1);
    assert_eq!(std::fs::read(job.final_path.as_std_path()).unwrap(), BODY);
}

#[test]
fn interrupted_download_leaves_no_files() {
    let temp = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    let repo = InterruptingRepo {
        cancel: cancel.clone(),
    };
    let job = DownloadJob::new("https://h/d/pool/foo.deb", &out_dir(&temp), "foo.deb");

    let err = Downloader::new(&repo, cancel).download(&job, false).unwrap_err();

    assert_matches!(err, DebpullError::Cancelled);
    assert!(!job.partial_path.exists());
    assert!(!job.final_path.exists());
}

#[test]
fn http_error_leaves_no_files() {
    let temp = tempfile::tempdir().unwrap();
    let repo = CountingRepo {
        status: Some(404),
        ..CountingRepo::default()
    };
    let job = DownloadJob::new("https://h/d/pool/foo.deb", &out_dir(&temp), "foo.deb");

    let err = Downloader::new(&repo, CancelToken::new())
        .download(&job, false)
        .unwrap_err();

    assert_matches!(err, DebpullError::DownloadFailed(ref message) if message.contains("404"));
    assert!(!job.partial_path.exists());
    assert!(!job.final_path.exists());
}

#[test]
fn interrupt_during_stalled_read_is_prompt() {
    let temp = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });
    let job = DownloadJob::new("https://h/d/pool/foo.deb", &out_dir(&temp), "foo.deb");

    let start = Instant::now();
    let err = Downloader::new(&StalledRepo, cancel)
        .download(&job, false)
        .unwrap_err();

    assert_matches!(err, DebpullError::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!job.partial_path.exists());
    assert!(!job.final_path.exists());
}

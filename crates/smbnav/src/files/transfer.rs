//! Chunked file transfer and remote directory creation.
//!
//! Every remote file handle is closed and every tree connection is
//! disconnected on all exit paths, including failures. A failed download
//! leaves whatever was already written in the local file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use protocol::{FileId, ProtocolError, ProtocolSession, TreeId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DirectoryCreateError, TransferError};
use crate::path::PathCursor;
use crate::session::ConnectionManager;

/// Default read size per request (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Largest accepted chunk size (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Download,
    Upload,
}

/// Report of one finished transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferJob {
    pub direction: TransferDirection,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Size announced by the server (downloads) or read locally (uploads).
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
}

impl TransferJob {
    fn new(direction: TransferDirection, local_path: &Path, remote_path: &str) -> Self {
        Self {
            direction,
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_string(),
            total_bytes: None,
            transferred_bytes: 0,
        }
    }
}

/// Progress notification streamed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub direction: TransferDirection,
    pub remote_path: String,
    /// Completion in percent, 0.0 to 100.0.
    pub percent: f64,
}

fn percent(done: u64, total: u64) -> f64 {
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Pair `op` with a tree connect and a guaranteed disconnect.
fn on_tree<T>(
    session: &mut dyn ProtocolSession,
    share: &str,
    op: impl FnOnce(&mut dyn ProtocolSession, TreeId) -> Result<T, ProtocolError>,
) -> Result<T, ProtocolError> {
    let tree = session.connect_tree(share)?;
    let result = op(session, tree);
    match session.disconnect_tree(tree) {
        Ok(()) => result,
        Err(e) if result.is_ok() => {
            warn!(share = %share, %tree, error = %e, "Tree disconnect failed");
            if e.is_fatal() {
                Err(e)
            } else {
                result
            }
        }
        Err(e) => {
            debug!(share = %share, %tree, error = %e, "Tree disconnect failed after error");
            result
        }
    }
}

/// Run `op` on an open file and close it afterwards.
fn with_file<T, E>(
    session: &mut dyn ProtocolSession,
    tree: TreeId,
    file: FileId,
    op: impl FnOnce(&mut dyn ProtocolSession) -> Result<T, E>,
) -> Result<T, E> {
    let result = op(session);
    if let Err(e) = session.close_file(tree, file) {
        warn!(%tree, %file, error = %e, "File close failed");
    }
    result
}

/// Moves file contents between the current share and local disk.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferEngine {
    /// Engine reading `chunk_size` bytes per request, clamped to 1..=1 MiB.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `remote_path` of the current share to `local_path`.
    ///
    /// `on_progress` receives the completion percentage after each chunk
    /// when the server reports a nonzero size.
    pub fn download(
        &self,
        manager: &mut ConnectionManager,
        remote_path: &str,
        local_path: &Path,
        mut on_progress: impl FnMut(f64),
    ) -> Result<TransferJob, TransferError> {
        let share = manager
            .current_share()
            .map(str::to_owned)
            .ok_or(TransferError::NoShareSelected)?;
        let remote = PathCursor::parse(remote_path).to_string();
        let mut job = TransferJob::new(TransferDirection::Download, local_path, &remote);
        info!(share = %share, remote = %remote, local = %local_path.display(), "Download started");

        let outcome = manager
            .with_session(|session| {
                let mut failure: Option<TransferError> = None;
                let result = on_tree(session, &share, |session, tree| {
                    let file = session.open_file(tree, &remote)?;
                    with_file(session, tree, file, |session| {
                        match self.copy_to_local(session, tree, file, &mut job, &mut on_progress) {
                            Ok(()) => Ok(()),
                            Err(TransferError::Remote { source, .. }) => Err(source),
                            Err(other) => {
                                failure = Some(other);
                                Ok(())
                            }
                        }
                    })
                });
                match (result, failure) {
                    (Err(source), _) => Err(TransferError::remote(&remote, source)),
                    (Ok(()), Some(failure)) => Err(failure),
                    (Ok(()), None) => Ok(()),
                }
            })
            .ok_or(TransferError::NoShareSelected)?;

        match outcome {
            Ok(()) => {
                info!(
                    share = %share,
                    remote = %remote,
                    bytes = job.transferred_bytes,
                    "Download finished"
                );
                Ok(job)
            }
            Err(e) => {
                warn!(share = %share, remote = %remote, error = %e, "Download failed");
                Err(e)
            }
        }
    }

    fn copy_to_local(
        &self,
        session: &mut dyn ProtocolSession,
        tree: TreeId,
        file: FileId,
        job: &mut TransferJob,
        on_progress: &mut impl FnMut(f64),
    ) -> Result<(), TransferError> {
        let total = match session.file_size(tree, file) {
            Ok(size) => Some(size),
            Err(e) if e.is_fatal() => return Err(TransferError::remote(&job.remote_path, e)),
            Err(e) => {
                debug!(remote = %job.remote_path, error = %e, "File size unavailable");
                None
            }
        };
        job.total_bytes = total;

        let local = job.local_path.clone();
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TransferError::local(parent, e))?;
        }
        let mut out = File::create(&local).map_err(|e| TransferError::local(&local, e))?;

        loop {
            let chunk = session
                .read_file(tree, file, job.transferred_bytes, self.chunk_size)
                .map_err(|e| TransferError::remote(&job.remote_path, e))?;
            if chunk.is_empty() {
                break;
            }
            out.write_all(&chunk)
                .map_err(|e| TransferError::local(&local, e))?;
            job.transferred_bytes += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                on_progress(percent(job.transferred_bytes, total));
            }
        }
        out.flush().map_err(|e| TransferError::local(&local, e))?;

        match total {
            Some(expected) if job.transferred_bytes < expected => Err(TransferError::ShortRead {
                path: job.remote_path.clone(),
                expected,
                received: job.transferred_bytes,
            }),
            _ => Ok(()),
        }
    }

    /// Copy `local_path` to `remote_path` on the current share.
    ///
    /// The file is sent in one write; `on_progress(100.0)` follows it.
    pub fn upload(
        &self,
        manager: &mut ConnectionManager,
        local_path: &Path,
        remote_path: &str,
        mut on_progress: impl FnMut(f64),
    ) -> Result<TransferJob, TransferError> {
        let share = manager
            .current_share()
            .map(str::to_owned)
            .ok_or(TransferError::NoShareSelected)?;
        let remote = PathCursor::parse(remote_path).to_string();
        let mut job = TransferJob::new(TransferDirection::Upload, local_path, &remote);

        let data = fs::read(local_path).map_err(|e| TransferError::local(local_path, e))?;
        job.total_bytes = Some(data.len() as u64);
        info!(share = %share, remote = %remote, bytes = data.len(), "Upload started");

        let written = manager
            .with_session(|session| {
                on_tree(session, &share, |session, tree| {
                    let file = session.create_file(tree, &remote)?;
                    with_file(session, tree, file, |session| {
                        session.write_file(tree, file, &data)
                    })
                })
                .map_err(|e| TransferError::remote(&remote, e))
            })
            .ok_or(TransferError::NoShareSelected)?
            .inspect_err(|e| warn!(share = %share, remote = %remote, error = %e, "Upload failed"))?;

        job.transferred_bytes = written as u64;
        if written < data.len() {
            warn!(share = %share, remote = %remote, written, "Upload truncated");
            return Err(TransferError::ShortWrite {
                path: remote,
                expected: data.len() as u64,
                written: written as u64,
            });
        }

        on_progress(100.0);
        info!(share = %share, remote = %remote, "Upload finished");
        Ok(job)
    }

    /// Create the directory `remote_path` on the current share.
    pub fn create_directory(
        &self,
        manager: &mut ConnectionManager,
        remote_path: &str,
    ) -> Result<(), DirectoryCreateError> {
        let share = manager
            .current_share()
            .map(str::to_owned)
            .ok_or(DirectoryCreateError::NoShareSelected)?;
        let path = PathCursor::parse(remote_path);
        if path.is_root() {
            return Err(DirectoryCreateError::InvalidName(remote_path.to_string()));
        }
        let path = path.to_string();

        let result = manager
            .with_session(|session| session.create_directory(&share, &path))
            .ok_or(DirectoryCreateError::NoShareSelected)?;

        match result {
            Ok(()) => {
                info!(share = %share, path = %path, "Directory created");
                Ok(())
            }
            Err(e) => {
                warn!(share = %share, path = %path, error = %e, "Directory creation failed");
                Err(match e {
                    ProtocolError::AlreadyExists(_) => DirectoryCreateError::AlreadyExists(path),
                    ProtocolError::AccessDenied(_) => {
                        DirectoryCreateError::AccessDenied { path, source: e }
                    }
                    source => DirectoryCreateError::Protocol { path, source },
                })
            }
        }
    }
}

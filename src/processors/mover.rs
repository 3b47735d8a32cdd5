//! The move algorithm shared by the early and bulk moves.
//!
//! A task is skipped when its destination already exists or its source is
//! gone, which makes re-running an interrupted sync safe. Permission errors
//! are retried under the [`RetryPolicy`]; any other failure is fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::RetryPolicy;
use crate::core::cancel::CancelToken;
use crate::core::events::{EventSink, MoveKind, SyncEvent};

/// Errors that abort a synchronizer run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to move '{from}' to '{to}': {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read marker '{path}': {source}")]
    MarkerRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove marker '{path}': {source}")]
    MarkerRemove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),
}

/// One entry to relocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: MoveKind,
}

impl MoveTask {
    /// Directory move that keeps only the base name under `destination_root`.
    pub fn flattened(path: &Path, destination_root: &Path) -> Self {
        let destination = match path.file_name() {
            Some(name) => destination_root.join(name),
            None => destination_root.to_path_buf(),
        };
        Self {
            source: path.to_path_buf(),
            destination,
            kind: MoveKind::Directory,
        }
    }

    /// File move that keeps the path relative to `source_root`.
    pub fn relative(path: &Path, source_root: &Path, destination_root: &Path) -> Self {
        let destination = match path.strip_prefix(source_root) {
            Ok(rel) => destination_root.join(rel),
            Err(_) => Self::flattened(path, destination_root).destination,
        };
        Self {
            source: path.to_path_buf(),
            destination,
            kind: MoveKind::File,
        }
    }

    /// Base name used in progress messages.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Result of executing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { attempts: u32 },
    AlreadyPresent,
    SourceMissing,
    GaveUp { attempts: u32 },
    Cancelled,
}

/// Filesystem operation behind a move.
pub trait Mover {
    fn move_path(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Moves with `rename`, copying then removing when the rename crosses filesystems.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMover;

impl Mover for FsMover {
    fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!("rename crossed filesystems, copying '{}'", from.display());
                copy_then_remove(from, to)
            }
            Err(e) => Err(e),
        }
    }
}

/// Copy `from` to `to`, then remove `from`.
///
/// Symlinks are recreated, never followed. If the copy fails, the partial
/// destination is removed so a rerun does not mistake it for a finished move.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    let file_type = fs::symlink_metadata(from)?.file_type();

    if let Err(e) = copy_tree(from, to, file_type) {
        let _ = if file_type.is_dir() {
            fs::remove_dir_all(to)
        } else {
            fs::remove_file(to)
        };
        return Err(e);
    }

    if file_type.is_dir() {
        fs::remove_dir_all(from)
    } else {
        fs::remove_file(from)
    }
}

fn copy_tree(from: &Path, to: &Path, file_type: fs::FileType) -> io::Result<()> {
    if file_type.is_symlink() {
        return copy_symlink(from, to);
    }
    if !file_type.is_dir() {
        return fs::copy(from, to).map(|_| ());
    }

    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(rel);

        let entry_type = entry.file_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(windows)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let link = fs::read_link(from)?;
    if fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link, to)
    } else {
        std::os::windows::fs::symlink_file(link, to)
    }
}

#[cfg(not(any(unix, windows)))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

/// Whether anything, including a dangling symlink, sits at `path`.
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Everything a move needs besides the task itself.
pub struct MoveContext<'a> {
    pub mover: &'a dyn Mover,
    pub sink: &'a dyn EventSink,
    pub policy: RetryPolicy,
    pub cancel: &'a CancelToken,
}

/// Run one move task under the retry policy.
///
/// Returns `Err` only for failures other than permission errors.
pub fn execute_move(task: &MoveTask, ctx: &MoveContext<'_>) -> Result<MoveOutcome, SyncError> {
    let name = task.name();

    if entry_exists(&task.destination) {
        ctx.sink.emit(&SyncEvent::AlreadyMoved {
            name,
            destination: task.destination.clone(),
        });
        return Ok(MoveOutcome::AlreadyPresent);
    }

    if !entry_exists(&task.source) {
        ctx.sink.emit(&SyncEvent::SourceMissing {
            path: task.source.clone(),
        });
        return Ok(MoveOutcome::SourceMissing);
    }

    let max_attempts = ctx.policy.max_attempts();
    for attempt in 1..=max_attempts {
        debug!(
            "moving {} '{}' to '{}' (attempt {})",
            task.kind,
            task.source.display(),
            task.destination.display(),
            attempt
        );

        match ctx.mover.move_path(&task.source, &task.destination) {
            Ok(()) => {
                ctx.sink.emit(&SyncEvent::Moved {
                    name,
                    destination: task.destination.clone(),
                    kind: task.kind,
                });
                return Ok(MoveOutcome::Moved { attempts: attempt });
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                if attempt == max_attempts {
                    break;
                }
                ctx.sink.emit(&SyncEvent::RetryScheduled {
                    path: task.source.clone(),
                    attempt,
                    max_attempts,
                    error: e.to_string(),
                    backoff: ctx.policy.backoff(),
                });
                if !ctx.cancel.sleep(ctx.policy.backoff()) {
                    return Ok(MoveOutcome::Cancelled);
                }
            }
            Err(e) => {
                return Err(SyncError::Move {
                    from: task.source.clone(),
                    to: task.destination.clone(),
                    source: e,
                })
            }
        }
    }

    warn!(
        "giving up on '{}' after {} attempts",
        task.source.display(),
        max_attempts
    );
    ctx.sink.emit(&SyncEvent::GaveUp {
        path: task.source.clone(),
        attempts: max_attempts,
        kind: task.kind,
    });
    Ok(MoveOutcome::GaveUp {
        attempts: max_attempts,
    })
}

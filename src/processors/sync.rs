//! Directory synchronizer: ships finished results from a working directory.
//!
//! The run has two phases. While the termination marker is absent from the
//! source directory, the synchronizer polls the completion marker and moves
//! the directory it names. Once the termination marker appears, one bulk
//! sweep moves everything left (directories flattened by base name, files
//! under their relative path), after which the marker carried over to the
//! destination is deleted.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{ConfigError, RetryPolicy, SyncConfig};
use crate::core::cancel::CancelToken;
use crate::core::events::{ConsoleSink, EventSink, MoveKind, SyncEvent};
use crate::processors::mover::{
    entry_exists, execute_move, FsMover, MoveContext, MoveOutcome, MoveTask, Mover, SyncError,
};

/// Tally of a synchronizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub moved: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub failed: usize,
    /// False when the run was cancelled before the sweep finished.
    pub completed: bool,
}

impl SyncReport {
    fn record(&mut self, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Moved { .. } => self.moved += 1,
            MoveOutcome::AlreadyPresent | MoveOutcome::SourceMissing => self.skipped += 1,
            MoveOutcome::GaveUp { .. } => self.failed += 1,
            MoveOutcome::Cancelled => {}
        }
    }
}

/// Moves intermediate results from `source_root` to `destination_root`.
pub struct DirectorySync {
    source_root: PathBuf,
    destination_root: PathBuf,
    exclusions: HashSet<String>,
    completion_marker: String,
    termination_marker: String,
    poll_interval: Duration,
    policy: RetryPolicy,
    mover: Box<dyn Mover>,
    sink: Box<dyn EventSink>,
    cancel: CancelToken,
}

impl DirectorySync {
    pub fn new<I, S>(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        exclusions: I,
        config: &SyncConfig,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            exclusions: exclusions.into_iter().map(Into::into).collect(),
            completion_marker: config.completion_marker.clone(),
            termination_marker: config.termination_marker.clone(),
            poll_interval: config.poll_interval(),
            policy: config.retry.policy()?,
            mover: Box::new(FsMover),
            sink: Box::new(ConsoleSink),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_mover(mut self, mover: impl Mover + 'static) -> Self {
        self.mover = Box::new(mover);
        self
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that interrupts the polling wait and retry backoff.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclusions.contains(name)
    }

    fn context(&self) -> MoveContext<'_> {
        MoveContext {
            mover: &*self.mover,
            sink: &*self.sink,
            policy: self.policy,
            cancel: &self.cancel,
        }
    }

    fn termination_marker_path(&self) -> PathBuf {
        self.source_root.join(&self.termination_marker)
    }

    /// Check the completion marker once and move the directory it names.
    ///
    /// Returns `None` when there was nothing to move.
    pub fn move_marked(&self) -> Result<Option<MoveOutcome>, SyncError> {
        Ok(self.move_marked_target()?.map(|(_, outcome)| outcome))
    }

    fn move_marked_target(&self) -> Result<Option<(PathBuf, MoveOutcome)>, SyncError> {
        let marker = self.source_root.join(&self.completion_marker);
        let line = match read_first_line(&marker) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SyncError::MarkerRead {
                    path: marker,
                    source,
                })
            }
        };

        let target = PathBuf::from(&line);
        let base_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.is_excluded(&line) || self.is_excluded(&base_name) {
            self.sink.emit(&SyncEvent::Excluded { path: target });
            return Ok(None);
        }

        debug!("completion marker names '{}'", target.display());
        self.sink.emit(&SyncEvent::MarkerFound {
            target: target.clone(),
        });
        let task = MoveTask::flattened(&target, &self.destination_root);
        let outcome = execute_move(&task, &self.context())?;
        Ok(Some((target, outcome)))
    }

    /// Poll until the termination marker exists, shipping marked directories
    /// as they are announced.
    ///
    /// A marker left in place is seen again on every poll, so each target is
    /// tallied once: a successful move sticks, otherwise the latest outcome
    /// counts. Returns `false` if cancelled first.
    pub fn wait_for_completion(&self, report: &mut SyncReport) -> Result<bool, SyncError> {
        let sentinel = self.termination_marker_path();
        let mut marked: HashMap<PathBuf, MoveOutcome> = HashMap::new();

        let finished = loop {
            if sentinel.exists() {
                break true;
            }
            if self.cancel.is_cancelled() {
                break false;
            }
            if let Some((target, outcome)) = self.move_marked_target()? {
                if outcome == MoveOutcome::Cancelled {
                    break false;
                }
                marked
                    .entry(target)
                    .and_modify(|prev| {
                        if !matches!(prev, MoveOutcome::Moved { .. }) {
                            *prev = outcome;
                        }
                    })
                    .or_insert(outcome);
            }
            if !self.cancel.sleep(self.poll_interval) {
                break false;
            }
        };

        for outcome in marked.into_values() {
            report.record(outcome);
        }
        if finished {
            info!("termination marker found at '{}'", sentinel.display());
        }
        Ok(finished)
    }

    /// Move everything under the source root.
    ///
    /// Returns `false` if cancelled part way through.
    pub fn bulk_sweep(&self, report: &mut SyncReport) -> Result<bool, SyncError> {
        let root = self.source_root.clone();
        self.sweep_dir(&root, report)
    }

    fn sweep_dir(&self, dir: &Path, report: &mut SyncReport) -> Result<bool, SyncError> {
        let (dirs, files) = match list_dir(dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.sink.emit(&SyncEvent::PathVanished {
                    path: dir.to_path_buf(),
                });
                return Ok(true);
            }
            Err(e) => {
                warn!("cannot list '{}': {}", dir.display(), e);
                return Ok(true);
            }
        };

        for path in &dirs {
            if !self.visit(path, MoveKind::Directory, report)? {
                return Ok(false);
            }
        }
        for path in &files {
            if !self.visit(path, MoveKind::File, report)? {
                return Ok(false);
            }
        }

        // Descend only into directories that were not moved away
        for path in dirs.iter().filter(|p| p.is_dir()) {
            if !self.sweep_dir(path, report)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn visit(&self, path: &Path, kind: MoveKind, report: &mut SyncReport) -> Result<bool, SyncError> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        if !entry_exists(path) {
            self.sink.emit(&SyncEvent::PathVanished {
                path: path.to_path_buf(),
            });
            report.skipped += 1;
            return Ok(true);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.is_excluded(&name) {
            self.sink.emit(&SyncEvent::Excluded {
                path: path.to_path_buf(),
            });
            report.excluded += 1;
            return Ok(true);
        }

        let task = match kind {
            MoveKind::Directory => MoveTask::flattened(path, &self.destination_root),
            MoveKind::File => MoveTask::relative(path, &self.source_root, &self.destination_root),
        };
        let outcome = execute_move(&task, &self.context())?;
        report.record(outcome);
        Ok(outcome != MoveOutcome::Cancelled)
    }

    /// Delete the termination marker if the sweep carried it to the destination.
    pub fn remove_destination_marker(&self) -> Result<bool, SyncError> {
        let path = self.destination_root.join(&self.termination_marker);
        match fs::symlink_metadata(&path) {
            Ok(meta) if !meta.is_dir() => {}
            _ => return Ok(false),
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                self.sink.emit(&SyncEvent::MarkerRemoved { path });
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SyncError::MarkerRemove { path, source }),
        }
    }

    /// Run both phases and the cleanup.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        if !self.source_root.is_dir() {
            return Err(SyncError::SourceNotFound(self.source_root.clone()));
        }

        self.sink.emit(&SyncEvent::Started {
            source: self.source_root.clone(),
            destination: self.destination_root.clone(),
        });

        let mut report = SyncReport::default();
        if !self.wait_for_completion(&mut report)? || !self.bulk_sweep(&mut report)? {
            self.sink.emit(&SyncEvent::Interrupted);
            return Ok(report);
        }

        self.remove_destination_marker()?;
        report.completed = true;

        info!(
            "sync finished: {} moved, {} skipped, {} excluded, {} failed",
            report.moved, report.skipped, report.excluded, report.failed
        );
        self.sink.emit(&SyncEvent::Finished);
        Ok(report)
    }
}

/// First line of `path`, trimmed; `None` if the line is blank.
fn read_first_line(path: &Path) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

/// Split a directory listing into subdirectories and everything else.
fn list_dir(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in '{}': {}", dir.display(), e);
                continue;
            }
        };
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }

    Ok((dirs, files))
}

//! Operator-facing progress events emitted by the directory synchronizer.
//!
//! The synchronizer never prints directly. It hands every notable step to an
//! [`EventSink`], which decides how (or whether) to show it:
//! - [`ConsoleSink`] prints timestamped lines for the operator
//! - [`RecordingSink`] keeps the events in memory for inspection

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;

/// Timestamp format used on every console line.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time formatted for console output.
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// What kind of filesystem entry a move task relocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Directory,
    File,
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveKind::Directory => f.write_str("directory"),
            MoveKind::File => f.write_str("file"),
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The synchronizer started watching `source`.
    Started {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The completion marker named a directory to ship early.
    MarkerFound { target: PathBuf },
    /// An entry reached its destination.
    Moved {
        name: String,
        destination: PathBuf,
        kind: MoveKind,
    },
    /// The destination already holds the entry.
    AlreadyMoved { name: String, destination: PathBuf },
    /// The source entry no longer exists.
    SourceMissing { path: PathBuf },
    /// The sweep reached a path that an earlier move already took away.
    PathVanished { path: PathBuf },
    /// The entry's name is in the exclusion set.
    Excluded { path: PathBuf },
    /// A permission error was hit; another attempt follows after `backoff`.
    RetryScheduled {
        path: PathBuf,
        attempt: u32,
        max_attempts: u32,
        error: String,
        backoff: Duration,
    },
    /// Every attempt failed with a permission error; the task is abandoned.
    GaveUp {
        path: PathBuf,
        attempts: u32,
        kind: MoveKind,
    },
    /// The termination marker carried over to the destination was deleted.
    MarkerRemoved { path: PathBuf },
    /// Cancellation was requested before the run finished.
    Interrupted,
    /// The sweep and cleanup are done.
    Finished,
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Started { source, destination } => write!(
                f,
                "Moving intermediate results initiated from '{}' to '{}'",
                source.display(),
                destination.display()
            ),
            SyncEvent::MarkerFound { target } => {
                write!(f, "Completion marker names '{}'", target.display())
            }
            SyncEvent::Moved {
                name,
                destination,
                kind: MoveKind::Directory,
            } => write!(f, "Moved '{}' to '{}'", name, destination.display()),
            SyncEvent::Moved {
                name,
                destination,
                kind: MoveKind::File,
            } => write!(f, "Moved file '{}' to '{}'", name, destination.display()),
            SyncEvent::AlreadyMoved { name, destination } => write!(
                f,
                "'{}' already moved to destination '{}'. Skipping...",
                name,
                destination.display()
            ),
            SyncEvent::SourceMissing { path } => write!(
                f,
                "Path '{}' does not exist or may have been moved already. Skipping...",
                path.display()
            ),
            SyncEvent::PathVanished { path } => {
                write!(f, "Path '{}' does not exist. Skipping...", path.display())
            }
            SyncEvent::Excluded { path } => {
                write!(f, "Path '{}' is excluded. Skipping...", path.display())
            }
            SyncEvent::RetryScheduled {
                path,
                attempt,
                max_attempts,
                error,
                backoff,
            } => write!(
                f,
                "PermissionError on '{}' (attempt {}/{}): {}. Retrying after {:?}...",
                path.display(),
                attempt,
                max_attempts,
                error,
                backoff
            ),
            SyncEvent::GaveUp {
                path,
                attempts,
                kind,
            } => write!(
                f,
                "Max attempts ({}) reached. Unable to move {} '{}'.",
                attempts,
                kind,
                path.display()
            ),
            SyncEvent::MarkerRemoved { path } => {
                write!(f, "Removed marker '{}'", path.display())
            }
            SyncEvent::Interrupted => f.write_str("Interrupted before all files were moved."),
            SyncEvent::Finished => f.write_str("All files moved."),
        }
    }
}

/// Receiver for synchronizer progress.
pub trait EventSink {
    fn emit(&self, event: &SyncEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &SyncEvent) {
        (**self).emit(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&self, event: &SyncEvent) {
        (**self).emit(event)
    }
}

/// Prints each event as `<timestamp>: <message>` on stdout.
///
/// The start and finish events also carry the operator banners telling
/// whether the window may be closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &SyncEvent) {
        let now = timestamp();
        match event {
            SyncEvent::Started { .. } => {
                println!("DO NOT CLOSE THIS WINDOW.");
                println!("{}: {}", now, event);
                println!(
                    "This process periodically moves files from the source directory to the specified destination."
                );
                println!(
                    "It will continue moving files until the point cloud processing is completed.\n"
                );
            }
            SyncEvent::Finished => {
                println!("THE WINDOW CAN NOW BE CLOSED SAFELY.");
                println!("{}: {}\n", now, event);
            }
            _ => println!("{}: {}\n", now, event),
        }
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moved_message_format() {
        let event = SyncEvent::Moved {
            name: "tile_001".to_string(),
            destination: PathBuf::from("/dst/tile_001"),
            kind: MoveKind::Directory,
        };
        assert_eq!(event.to_string(), "Moved 'tile_001' to '/dst/tile_001'");
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        // 2024-01-31 12:00:00
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
    }

    #[test]
    fn test_recording_sink_through_arc() {
        let sink = Arc::new(RecordingSink::new());
        let shared: Arc<RecordingSink> = Arc::clone(&sink);

        shared.emit(&SyncEvent::Finished);
        shared.emit(&SyncEvent::Interrupted);

        assert_eq!(
            sink.events(),
            vec![SyncEvent::Finished, SyncEvent::Interrupted]
        );
    }
}

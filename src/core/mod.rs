//! Core data types, I/O and run-control primitives.

pub mod cancel;
pub mod events;
pub mod loaders;
pub mod writers;

pub use cancel::CancelToken;
pub use events::{ConsoleSink, EventSink, MoveKind, RecordingSink, SyncEvent};
pub use loaders::{parse_report, ReportError, ReportField, TileReport, EXTRACTION_RULES};
pub use writers::{write_summary_csv, WriteError};

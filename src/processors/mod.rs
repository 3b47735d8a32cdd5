//! Data processing modules.

pub mod mover;
pub mod summary;
pub mod sync;

// Re-export key types for convenience
pub use mover::{execute_move, FsMover, MoveContext, MoveOutcome, MoveTask, Mover, SyncError};
pub use summary::{collect_reports, find_reports, summarize_tiles, SummaryOutcome};
pub use sync::{DirectorySync, SyncReport};

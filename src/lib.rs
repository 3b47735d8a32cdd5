//! Support tools for a LiDAR point cloud processing pipeline.
//!
//! This crate provides:
//! - A directory synchronizer that ships intermediate results from a working
//!   directory to a destination as processing stages complete
//! - An aggregator that turns per-tile LAS info reports into one summary table
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::processors::summary::summarize_tiles;
//! use std::path::Path;
//!
//! let outcome = summarize_tiles(Path::new("reports"), Path::new("summary.csv"), "txt").unwrap();
//! println!("{} tiles summarized", outcome.reports.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{PipelineConfig, RetryPolicy, SummaryConfig, SyncConfig};
pub use core::loaders::{ReportField, TileReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Output module for reporting on stored harvests
//!
//! This module handles:
//! - Exporting harvested results as JSON
//! - Summarizing stored checkpoints and runs

mod export;
pub mod stats;

pub use export::{collect_rows, export_results, ExportRow};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

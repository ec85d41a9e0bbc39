//! Output module for reporting on crawl results
//!
//! This module handles:
//! - Printing repository and crawl run statistics
//! - Exporting stored repositories as CSV

mod export;
pub mod stats;

pub use export::{export_csv, write_csv, CSV_HEADER};
pub use stats::{load_statistics, print_statistics, write_statistics, CrawlStatistics};

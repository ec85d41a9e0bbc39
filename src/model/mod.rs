//! Domain values passed between the fetcher, the coordinator and the sink
//!
//! # Components
//!
//! - `Repository`: one crawled repository (owner, name, stars, fetch time)
//! - `Cursor` / `Page`: one page of search results and its continuation
//! - `RateBudget`: the remaining API budget reported by the source
//! - `CrawlMetrics` / `MetricsAccumulator`: per-run counters and timing

mod budget;
mod metrics;
mod page;
mod repository;

// Re-export main types
pub use budget::RateBudget;
pub use metrics::{CrawlMetrics, MetricsAccumulator};
pub use page::{Cursor, Page};
pub use repository::Repository;

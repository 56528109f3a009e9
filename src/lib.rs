//! Headless Crawler - Browser-driven web crawl orchestration engine.
//!
//! This library coordinates a crawl over real browser sessions: it owns
//! the URL frontier, deduplication and scoping policy, the per-page
//! action pipeline and the network hijack sink, while delegating actual
//! browser control to a pluggable [`BrowserDriver`] implementation.
//!
//! # Architecture
//!
//! One crawl is a small constellation of tasks:
//!
//! - **Frontier owner**: single task owning the growable FIFO of
//!   discovered URLs; producers never block on a full queue
//! - **Browser workers**: one per driver connection, pulling URLs and
//!   running page sessions under a global concurrency bound
//! - **Page session**: navigates, waits for load, runs the action
//!   pipeline (input fill, link harvest, click exploration)
//! - **Hijack sink**: intercepts every request the page makes, records
//!   it exactly once and feeds discovered URLs back to the frontier
//!
//! The crawl terminates on quiescence (every queued URL handled),
//! cancellation, the whole-crawl timeout, or the max-result cutover.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use headless_crawler::{BrowserDriver, CrawlConfig, Crawler, RepeatLevel, Result};
//!
//! # async fn example(driver: Arc<dyn BrowserDriver>) -> Result<()> {
//! let config = CrawlConfig::new()
//!     .with_concurrency(5)
//!     .with_repeat_level(RepeatLevel::Low)
//!     .with_form_fill("username", "admin");
//!
//! let (handle, mut records) = Crawler::start("https://example.com", config, vec![driver]).await?;
//!
//! while let Some(record) = records.recv().await {
//!     println!("{} {}", record.method, record.url);
//! }
//! let stats = handle.join().await?;
//! println!("visited {} URLs", stats.visited);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`CrawlConfig`] builder and defaults |
//! | [`crawler`] | Coordinator, workers, action pipeline, hijack sink |
//! | [`driver`] | [`BrowserDriver`]/[`PageHandle`] collaborator traits |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`filter`] | Visit/Sent membership filters |
//! | [`frontier`] | Growable non-blocking URL queue |
//! | [`policy`] | Dedup levels, scan range, black/white lists |
//! | [`record`] | Output [`TrafficRecord`] types |
//! | [`script`] | JavaScript snippets injected into pages |

// ============================================================================
// Modules
// ============================================================================

/// CrawlConfig builder and defaults.
pub mod config;

/// Coordinator, workers, action pipeline and hijack sink.
pub mod crawler;

/// Browser driver collaborator traits and wire types.
pub mod driver;

/// Error types and Result alias.
pub mod error;

/// Visit/Sent membership filters.
pub mod filter;

/// Growable non-blocking URL queue.
pub mod frontier;

/// Dedup levels, scan range and URL admission policy.
pub mod policy;

/// Output record types.
pub mod record;

/// JavaScript snippets injected into crawled pages.
pub mod script;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::CrawlConfig;
pub use crawler::{CrawlHandle, CrawlStats, Crawler};
pub use driver::{
    BrowserDriver, Cookie, HijackHandler, HijackedRequest, HijackedResponse, PageHandle,
    RequestAction, ResourceKind, ResponseAction, TabPool,
};
pub use error::{Error, Result};
pub use filter::KeyFilter;
pub use frontier::{Frontier, FrontierReceiver};
pub use policy::{Deduplicator, RepeatLevel, ScanRangeLevel, ScanScope, UrlPolicy};
pub use record::{RecordKind, TrafficRecord};

//! Crawl coordinator.
//!
//! [`Crawler::start`] wires the frontier, filters and policy together,
//! spawns one browser worker per driver and returns a [`CrawlHandle`]
//! plus the output record channel. The crawl runs until
//! one of:
//!
//! - **quiescence** — every harvested URL has completed its page session
//!   and the frontier is empty;
//! - **cancellation** — [`CrawlHandle::cancel`] or the whole-crawl
//!   timeout fires the root token;
//! - **max-result cutover** — the emitted-record cap sets the
//!   cooperative stop flag and remaining queued URLs drain unvisited.
//!
//! Quiescence is detected with a pending counter: every URL admitted to
//! the frontier increments it, every completed (or dropped) page session
//! decrements it, and the session that brings it to zero closes the
//! frontier.

// ============================================================================
// Imports
// ============================================================================

mod actions;
mod hijack;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::driver::BrowserDriver;
use crate::error::{Error, Result};
use crate::filter::KeyFilter;
use crate::frontier::Frontier;
use crate::policy::{Deduplicator, ScanScope, UrlPolicy};
use crate::record::TrafficRecord;

// ============================================================================
// Constants
// ============================================================================

/// Output record channel capacity. A full channel backpressures the
/// hijack sinks, which in turn stalls the pages producing traffic.
const OUTPUT_CAPACITY: usize = 256;

// ============================================================================
// CrawlShared
// ============================================================================

/// State shared by the coordinator, every worker and every hijack sink.
pub(crate) struct CrawlShared {
    pub(crate) config: CrawlConfig,
    pub(crate) root_url: String,
    pub(crate) policy: UrlPolicy,
    pub(crate) dedup: Deduplicator,
    pub(crate) visit_filter: KeyFilter,
    pub(crate) sent_filter: KeyFilter,
    pub(crate) frontier: Frontier,
    pub(crate) cancel: CancellationToken,

    /// Cooperative stop: set on max-result cutover. Workers consume and
    /// drop queued URLs; sinks stop harvesting and recording but still
    /// deliver responses to pages mid-render.
    stop: AtomicBool,

    /// URLs admitted to the frontier whose page session has not yet
    /// completed. Zero after the first admission means quiescence.
    pending: AtomicUsize,

    /// Currently running page sessions, and the high-water mark.
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,

    /// Records pushed to the output channel.
    emitted: AtomicU64,

    /// Link depth each admitted URL was discovered at.
    depths: Mutex<FxHashMap<String, usize>>,

    /// Dropped after the last worker exits so the receiver sees the end
    /// of the crawl.
    out: Mutex<Option<mpsc::Sender<TrafficRecord>>>,
}

impl CrawlShared {
    /// Returns `true` once the crawl should wind down.
    #[inline]
    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Sets the cooperative stop flag.
    pub(crate) fn request_stop(&self, reason: &str) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            info!(reason, "Crawl stop requested");
        }
    }

    /// Depth the URL was harvested at (root = 0).
    pub(crate) fn depth_of(&self, url: &str) -> usize {
        self.depths.lock().get(url).copied().unwrap_or(0)
    }

    /// Admission path for a discovered URL.
    ///
    /// Runs the full pipeline: harvest validity, scope + lists, depth
    /// cap, Visit-filter check-and-mark, then frontier feed. Returns
    /// `true` if the URL was queued.
    pub(crate) async fn harvest(&self, raw: &str, depth: usize) -> bool {
        if self.stopping() {
            return false;
        }
        if !self.policy.is_harvestable(raw) || !self.policy.accepts(raw) {
            return false;
        }
        let max_depth = self.config.max_depth;
        if max_depth > 0 && depth > max_depth {
            debug!(url = %raw, depth, "Dropping link past depth limit");
            return false;
        }
        let key = self.dedup.url_key(raw);
        if !self.visit_filter.insert(&key) {
            return false;
        }

        self.depths.lock().insert(raw.to_string(), depth);
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.frontier.feed(raw.to_string()).await {
            Ok(()) => {
                debug!(url = %raw, depth, "URL queued");
                true
            }
            Err(_) => {
                // Frontier already closed; undo the pending slot.
                self.complete_one().await;
                false
            }
        }
    }

    /// Marks one queued URL as fully handled.
    ///
    /// Closing the frontier on the zero transition is what lets the
    /// crawl terminate: workers observe the closed queue and exit.
    pub(crate) async fn complete_one(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "pending underflow");
        if prev == 1 {
            debug!("All queued URLs handled, closing frontier");
            self.frontier.close().await;
        }
    }

    /// Check-and-mark on the Sent filter. `true` means this exchange
    /// has not been emitted before.
    #[inline]
    pub(crate) fn mark_sent(&self, key: &str) -> bool {
        self.sent_filter.insert(key)
    }

    /// Pushes a record to the output channel, waiting for capacity.
    ///
    /// Returns `false` if the crawl was cancelled or the receiver went
    /// away. Trips the max-result cutover once the cap is reached.
    pub(crate) async fn emit(&self, record: TrafficRecord) -> bool {
        let Some(sender) = self.out.lock().as_ref().cloned() else {
            return false;
        };
        let sent = tokio::select! {
            () = self.cancel.cancelled() => false,
            result = sender.send(record) => result.is_ok(),
        };
        if !sent {
            return false;
        }
        let emitted = self.emitted.fetch_add(1, Ordering::AcqRel) + 1;
        let cap = self.config.max_url_count;
        if cap > 0 && emitted >= cap && !self.stopping() {
            self.request_stop("max result count reached");
        }
        true
    }

    /// Gauges a page session start; tracks the high-water mark.
    pub(crate) fn session_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    /// Gauges a page session end.
    pub(crate) fn session_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Drops the output sender so the record receiver terminates.
    fn close_output(&self) {
        self.out.lock().take();
    }
}

// ============================================================================
// CrawlStats
// ============================================================================

/// Final counters for a finished crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    /// Distinct URLs admitted to the frontier.
    pub visited: u64,
    /// Records pushed to the output channel.
    pub emitted: u64,
    /// Most page sessions ever running at once.
    pub peak_sessions: usize,
}

// ============================================================================
// CrawlHandle
// ============================================================================

/// Control handle for a running crawl.
pub struct CrawlHandle {
    cancel: CancellationToken,
    shared: Arc<CrawlShared>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for CrawlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlHandle")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl CrawlHandle {
    /// Cancels the crawl. In-flight page sessions stop at their next
    /// await point; queued URLs are dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every worker to exit and returns final counters.
    pub async fn join(self) -> Result<CrawlStats> {
        self.supervisor
            .await
            .map_err(|err| Error::driver(format!("crawl supervisor panicked: {err}")))?;
        Ok(CrawlStats {
            visited: self.shared.visit_filter.count(),
            emitted: self.shared.emitted.load(Ordering::Acquire),
            peak_sessions: self.shared.peak_in_flight.load(Ordering::Acquire),
        })
    }

    /// Most page sessions observed running at once so far.
    #[must_use]
    pub fn peak_sessions(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::Acquire)
    }

    /// Records emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.shared.emitted.load(Ordering::Acquire)
    }
}

// ============================================================================
// Crawler
// ============================================================================

/// Entry point: builds the shared state and launches the workers.
pub struct Crawler;

impl Crawler {
    /// Starts a crawl of `root_url` over the given browser drivers.
    ///
    /// One worker runs per driver; `config.concurrency` bounds page
    /// sessions across all of them. Returns the control handle and the
    /// output record channel, which terminates when the crawl does.
    pub async fn start(
        root_url: &str,
        config: CrawlConfig,
        drivers: Vec<Arc<dyn BrowserDriver>>,
    ) -> Result<(CrawlHandle, mpsc::Receiver<TrafficRecord>)> {
        config.validate()?;
        if drivers.is_empty() {
            return Err(Error::config("at least one browser driver is required"));
        }

        let root = Url::parse(root_url)
            .map_err(|err| Error::invalid_root(root_url, err.to_string()))?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(Error::invalid_root(root_url, "scheme must be http or https"));
        }
        let root_url = root.to_string();

        let mut scope = ScanScope::new(&root, config.scan_range);
        if !config.allow_suffixes.is_empty() {
            scope = scope.with_allow_suffixes(config.allow_suffixes.clone());
        }
        let invalid_suffixes = (!config.invalid_suffixes.is_empty())
            .then(|| config.invalid_suffixes.clone());
        let policy = UrlPolicy::new(scope, &config.whitelist, &config.blacklist, invalid_suffixes);
        let dedup = Deduplicator::new(config.repeat_level, &config.ignore_params);
        let (visit_filter, sent_filter) = match config.filter_ttl {
            Some(ttl) => (KeyFilter::with_ttl(ttl), KeyFilter::with_ttl(ttl)),
            None => (KeyFilter::new(), KeyFilter::new()),
        };

        let (frontier, queue) = Frontier::new();
        let (out_tx, out_rx) = mpsc::channel(OUTPUT_CAPACITY);
        let cancel = CancellationToken::new();

        let shared = Arc::new(CrawlShared {
            config,
            root_url: root_url.clone(),
            policy,
            dedup,
            visit_filter,
            sent_filter,
            frontier,
            cancel: cancel.clone(),
            stop: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            emitted: AtomicU64::new(0),
            depths: Mutex::new(FxHashMap::default()),
            out: Mutex::new(Some(out_tx)),
        });

        if !shared.harvest(&root_url, 0).await {
            return Err(Error::invalid_root(
                &root_url,
                "root URL rejected by crawl policy",
            ));
        }

        let queue = Arc::new(tokio::sync::Mutex::new(queue));
        let sessions = Arc::new(Semaphore::new(shared.config.concurrency));

        let mut workers = JoinSet::new();
        for (id, driver) in drivers.into_iter().enumerate() {
            let worker = worker::BrowserWorker::new(
                id,
                driver,
                Arc::clone(&shared),
                Arc::clone(&queue),
                Arc::clone(&sessions),
            );
            workers.spawn(worker.run());
        }

        // Whole-crawl deadline arms the root token.
        let deadline = shared.config.total_timeout;
        let timeout_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timeout_cancel.cancelled() => {}
                () = tokio::time::sleep(deadline) => {
                    warn!(timeout_secs = deadline.as_secs(), "Crawl deadline reached");
                    timeout_cancel.cancel();
                }
            }
        });

        let supervisor_shared = Arc::clone(&shared);
        let supervisor = tokio::spawn(async move {
            while let Some(result) = workers.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, "Worker exited with error"),
                    Err(err) => warn!(error = %err, "Worker task panicked"),
                }
            }
            supervisor_shared.cancel.cancel();
            supervisor_shared.close_output();
            info!(
                visited = supervisor_shared.visit_filter.count(),
                emitted = supervisor_shared.emitted.load(Ordering::Acquire),
                "Crawl finished"
            );
        });

        info!(root = %root_url, "Crawl started");
        Ok((
            CrawlHandle {
                cancel,
                shared,
                supervisor,
            },
            out_rx,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

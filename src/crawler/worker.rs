//! Browser workers and page sessions.
//!
//! One [`BrowserWorker`] runs per browser driver. Each worker pulls URLs
//! from the shared frontier queue, acquires a slot on the global session
//! semaphore and spawns a [`PageSession`] for the URL. The semaphore is
//! what bounds concurrent page sessions across every worker.
//!
//! A session walks a fixed state machine:
//!
//! ```text
//! Idle → Navigating → WaitLoad → RunningActions → Closing → Terminated
//! ```
//!
//! A timeout or error at any state abandons the URL — logged, never
//! retried — and still releases the tab and the pending slot.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::driver::{BrowserDriver, PageHandle, TabPool};
use crate::error::{Error, Result};
use crate::frontier::FrontierReceiver;

use super::CrawlShared;
use super::actions::ActionPipeline;
use super::hijack::TrafficSink;

// ============================================================================
// PageState
// ============================================================================

/// Lifecycle state of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Idle,
    Navigating,
    WaitLoad,
    RunningActions,
    Closing,
    Terminated,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Navigating => "navigating",
            Self::WaitLoad => "wait_load",
            Self::RunningActions => "running_actions",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// ============================================================================
// BrowserWorker
// ============================================================================

/// Pulls URLs from the frontier queue and runs page sessions over one
/// browser connection.
pub(crate) struct BrowserWorker {
    id: usize,
    driver: Arc<dyn BrowserDriver>,
    shared: Arc<CrawlShared>,
    queue: Arc<Mutex<FrontierReceiver>>,
    sessions: Arc<Semaphore>,
}

impl BrowserWorker {
    pub(crate) fn new(
        id: usize,
        driver: Arc<dyn BrowserDriver>,
        shared: Arc<CrawlShared>,
        queue: Arc<Mutex<FrontierReceiver>>,
        sessions: Arc<Semaphore>,
    ) -> Self {
        Self {
            id,
            driver,
            shared,
            queue,
            sessions,
        }
    }

    /// Worker main loop. Exits when the frontier queue terminates or the
    /// crawl is cancelled.
    pub(crate) async fn run(self) -> Result<()> {
        self.driver.connect().await.map_err(|err| {
            warn!(worker = self.id, error = %err, "Browser connection failed");
            err
        })?;
        info!(worker = self.id, "Worker started");

        let tabs = Arc::new(TabPool::new(Arc::clone(&self.driver)));
        let mut running = JoinSet::new();

        loop {
            let url = tokio::select! {
                () = self.shared.cancel.cancelled() => break,
                url = async { self.queue.lock().await.recv().await } => match url {
                    Some(url) => url,
                    None => break,
                },
            };

            // After the stop flag, queued URLs are consumed and dropped
            // so the pending count still reaches zero.
            if self.shared.stopping() {
                self.shared.complete_one().await;
                continue;
            }

            let permit = tokio::select! {
                () = self.shared.cancel.cancelled() => {
                    self.shared.complete_one().await;
                    break;
                }
                permit = Arc::clone(&self.sessions).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let session = PageSession {
                id: Uuid::new_v4(),
                worker: self.id,
                url,
                shared: Arc::clone(&self.shared),
                tabs: Arc::clone(&tabs),
            };
            running.spawn(session.run(permit));

            // Reap finished sessions without blocking the pull loop.
            while running.try_join_next().is_some() {}
        }

        while running.join_next().await.is_some() {}
        tabs.drain().await;
        if let Err(err) = self.driver.disconnect().await {
            warn!(worker = self.id, error = %err, "Browser disconnect failed");
        }
        info!(worker = self.id, "Worker stopped");
        Ok(())
    }
}

// ============================================================================
// PageSession
// ============================================================================

/// One URL's visit: a tab, a hijack sink and an action pipeline run.
struct PageSession {
    id: Uuid,
    worker: usize,
    url: String,
    shared: Arc<CrawlShared>,
    tabs: Arc<TabPool>,
}

impl PageSession {
    async fn run(self, _permit: OwnedSemaphorePermit) {
        self.shared.session_started();
        self.transition(PageState::Idle, PageState::Navigating);

        if let Err(err) = self.drive().await {
            if err.is_fatal() {
                warn!(session = %self.id, url = %self.url, error = %err, "Fatal error, cancelling crawl");
                self.shared.cancel.cancel();
            } else if matches!(err, Error::Cancelled) {
                debug!(session = %self.id, url = %self.url, "Session cancelled");
            } else {
                warn!(session = %self.id, url = %self.url, error = %err, "Page abandoned");
            }
        }

        self.transition(PageState::Closing, PageState::Terminated);
        self.shared.session_finished();
        self.shared.complete_one().await;
    }

    async fn drive(&self) -> Result<()> {
        let tab = self.tabs.acquire().await?;
        let outcome = self.run_on_tab(&tab).await;

        // Tab hygiene runs on every path so the pool only holds clean tabs.
        if let Err(err) = tab.clear_hijack().await {
            debug!(session = %self.id, error = %err, "Hijack clear failed");
        }
        if let Err(err) = tab.set_extra_headers(&[]).await {
            debug!(session = %self.id, error = %err, "Header clear failed");
        }
        self.tabs.release(tab);
        outcome
    }

    async fn run_on_tab(&self, tab: &Arc<dyn PageHandle>) -> Result<()> {
        let config = &self.shared.config;
        let depth = self.shared.depth_of(&self.url);

        if !config.cookies.is_empty() {
            tab.set_cookies(&config.cookies).await?;
        }
        let sink = Arc::new(TrafficSink::new(
            Arc::clone(&self.shared),
            self.url.clone(),
            depth,
        ));
        tab.register_hijack(sink).await?;
        // Listener tracking must be live before any page script runs so
        // the event strategy can enumerate click targets later.
        tab.install_init_script(crate::script::TRACK_LISTENERS).await?;

        // Navigation and load waits race the root token so a cancelled
        // crawl never rides out a full page timeout.
        tokio::select! {
            () = self.shared.cancel.cancelled() => return Err(Error::Cancelled),
            result = tab.navigate(&self.url) => {
                result.map_err(|err| Error::navigation(&self.url, err.to_string()))?;
            }
        }
        self.transition(PageState::Navigating, PageState::WaitLoad);

        let load = tokio::select! {
            () = self.shared.cancel.cancelled() => return Err(Error::Cancelled),
            load = timeout(config.page_timeout, tab.wait_load(config.page_timeout)) => load,
        };
        match load {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::load_timeout(
                    &self.url,
                    config.page_timeout.as_millis() as u64,
                ));
            }
        }
        if !config.extra_wait_load.is_zero() {
            tokio::time::sleep(config.extra_wait_load).await;
        }
        self.transition(PageState::WaitLoad, PageState::RunningActions);

        let pipeline = ActionPipeline::new(Arc::clone(&self.shared), self.url.clone(), depth);
        pipeline.run(tab).await?;
        self.transition(PageState::RunningActions, PageState::Closing);
        Ok(())
    }

    fn transition(&self, from: PageState, to: PageState) {
        trace!(
            session = %self.id,
            worker = self.worker,
            url = %self.url,
            from = %from,
            to = %to,
            "Session state"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Browser driver collaborator interface.
//!
//! The crawl engine never talks to a browser directly; it drives an
//! implementation of [`BrowserDriver`] / [`PageHandle`] — a CDP-like
//! control seam providing navigation, script evaluation, element
//! interaction and network interception.
//!
//! # Driver contract
//!
//! - `wait_load` resolves when the page reaches its loaded state; the
//!   engine always wraps it in a bounded timeout.
//! - `register_hijack` installs a [`HijackHandler`] for the page's
//!   lifetime. For every intercepted request the driver calls
//!   [`on_request`](HijackHandler::on_request), forwards (or blocks)
//!   accordingly **without transparently following redirects** — each hop
//!   is its own interception — and then calls
//!   [`on_response`](HijackHandler::on_response) with the outcome.
//!   Handler callbacks may run concurrently, one per in-flight request.
//! - `evaluate` returns the script's JSON value.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// ResourceKind
// ============================================================================

/// Coarse resource classification of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top-level or frame document.
    Document,
    /// CSS stylesheet.
    Stylesheet,
    /// JavaScript source.
    Script,
    /// Image resource.
    Image,
    /// Web font.
    Font,
    /// Audio/video media.
    Media,
    /// XHR or fetch call.
    Xhr,
    /// WebSocket upgrade.
    WebSocket,
    /// Anything else.
    Other,
}

// ============================================================================
// Cookie
// ============================================================================

/// Cookie injected into every page of the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to.
    pub domain: String,
    /// Path the cookie applies to, `/` if unset.
    pub path: Option<String>,
}

impl Cookie {
    /// Creates a cookie for a domain.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: None,
        }
    }
}

// ============================================================================
// Hijack Types
// ============================================================================

/// An intercepted request, before it leaves the browser.
#[derive(Debug, Clone)]
pub struct HijackedRequest {
    /// HTTP method.
    pub method: String,
    /// Request URL (final URL of this hop).
    pub url: String,
    /// Resource classification.
    pub resource_kind: ResourceKind,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body, if present.
    pub body: Option<Vec<u8>>,
}

impl HijackedRequest {
    /// Returns the first header value matching `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The response side of an intercepted exchange.
#[derive(Debug, Clone)]
pub struct HijackedResponse {
    /// Status code of this hop (redirects are separate hops).
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HijackedResponse {
    /// Returns the first header value matching `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Decision returned from [`HijackHandler::on_request`].
#[derive(Debug, Clone)]
pub enum RequestAction {
    /// Abort the request without touching the network.
    Block,
    /// Forward to origin with extra headers merged in.
    Forward {
        /// Headers to inject before forwarding.
        extra_headers: Vec<(String, String)>,
    },
}

impl RequestAction {
    /// Forward without modification.
    #[inline]
    #[must_use]
    pub fn forward() -> Self {
        Self::Forward {
            extra_headers: Vec::new(),
        }
    }
}

/// Decision returned from [`HijackHandler::on_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// Deliver the response to the renderer as-is.
    Deliver,
    /// Answer the renderer with an empty stub so rendering never stalls.
    Stub,
}

/// Per-page network interception callbacks.
///
/// Registered for a page session's lifetime; callbacks run concurrently
/// with the session's action pipeline.
#[async_trait]
pub trait HijackHandler: Send + Sync {
    /// Called before the request leaves the browser.
    async fn on_request(&self, request: &HijackedRequest) -> RequestAction;

    /// Called with the outcome of the forwarded request.
    ///
    /// `response` is `Err` when loading failed (e.g. the page was closed
    /// mid-flight).
    async fn on_response(
        &self,
        request: &HijackedRequest,
        response: Result<HijackedResponse>,
    ) -> ResponseAction;
}

// ============================================================================
// PageHandle
// ============================================================================

/// One browser tab under engine control.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates the tab to `url`.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Navigates back in tab history.
    async fn navigate_back(&self) -> Result<()>;

    /// Waits for the current navigation to reach the loaded state.
    ///
    /// The driver may wait indefinitely; the engine bounds this call with
    /// `timeout`.
    async fn wait_load(&self, timeout: Duration) -> Result<()>;

    /// Returns the tab's current URL.
    async fn current_url(&self) -> Result<String>;

    /// Evaluates JavaScript in the page, returning its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Registers a script evaluated at document start of every
    /// subsequent navigation in this tab.
    async fn install_init_script(&self, script: &str) -> Result<()>;

    /// Clicks the element at `selector`.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Types `text` into the element at `selector`.
    async fn input(&self, selector: &str, text: &str) -> Result<()>;

    /// Attaches a local file to the file input at `selector`.
    async fn set_input_files(&self, selector: &str, path: &str) -> Result<()>;

    /// Replaces the tab's extra headers. An empty slice clears them.
    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()>;

    /// Installs cookies before navigation.
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Registers network interception for this tab.
    async fn register_hijack(&self, handler: Arc<dyn HijackHandler>) -> Result<()>;

    /// Removes any registered interception.
    async fn clear_hijack(&self) -> Result<()>;

    /// Captures a screenshot (PNG bytes).
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Closes the tab.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// BrowserDriver
// ============================================================================

/// One controllable browser instance.
///
/// Each [`BrowserWorker`](crate::crawler) owns exactly one driver
/// connection; horizontal fan-out runs several drivers in parallel.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Establishes the control connection.
    async fn connect(&self) -> Result<()>;

    /// Tears the control connection down.
    async fn disconnect(&self) -> Result<()>;

    /// Opens a fresh blank tab.
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>>;
}

// ============================================================================
// TabPool
// ============================================================================

/// Pool of idle tab handles for one browser connection.
///
/// A tab is owned by exactly one page session at a time and returned only
/// after the session fully completes, including on error.
pub struct TabPool {
    driver: Arc<dyn BrowserDriver>,
    idle: Mutex<Vec<Arc<dyn PageHandle>>>,
}

impl TabPool {
    /// Creates an empty pool over a driver connection.
    #[must_use]
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes an idle tab or opens a new one.
    pub async fn acquire(&self) -> Result<Arc<dyn PageHandle>> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(tab) => Ok(tab),
            None => self.driver.new_page().await,
        }
    }

    /// Returns a tab to the pool.
    pub fn release(&self, tab: Arc<dyn PageHandle>) {
        self.idle.lock().push(tab);
    }

    /// Closes every idle tab.
    pub async fn drain(&self) {
        let tabs: Vec<_> = self.idle.lock().drain(..).collect();
        for tab in tabs {
            let _ = tab.close().await;
        }
    }

    /// Number of idle tabs.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

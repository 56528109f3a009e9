//! Traffic hijack sink.
//!
//! One [`TrafficSink`] is registered per page session. Every request the
//! page makes flows through it:
//!
//! 1. resource-kind blocking (images/media/fonts aborted off the wire);
//! 2. header injection, with `Referer` defaulting to the crawl root;
//! 3. multipart uploads surfaced as [`RecordKind::FileUpload`] records;
//! 4. scan-range check on the response side (off-scope traffic is
//!    delivered to the renderer but never recorded);
//! 5. Sent-filter check-and-mark — the single at-most-once choke point
//!    for output emission;
//! 6. URL-literal extraction from JavaScript bodies, fed back through
//!    the shared admission path;
//! 7. record emission with backpressure (a full output channel stalls
//!    the page's network stack, not the crawl).
//!
//! Redirects are never followed transparently; each hop is its own
//! interception and its own record.
//!
//! [`RecordKind::FileUpload`]: crate::record::RecordKind::FileUpload

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, trace, warn};
use url::Url;

use crate::driver::{
    HijackHandler, HijackedRequest, HijackedResponse, RequestAction, ResourceKind, ResponseAction,
};
use crate::error::Result;
use crate::record::TrafficRecord;

use super::CrawlShared;

// ============================================================================
// JS URL Extraction
// ============================================================================

/// Quoted URL/path literals in the argument position of common request
/// call shapes. Group 1 is the literal.
static JS_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // $.get("..."), axios.post('...'), http.put(`...`)
        r#"\.(?:get|post|put|delete|patch)\(\s*["'`]([^"'`\s]+)["'`]"#,
        // url: "..." in request option objects
        r#"url\s*:\s*["'`]([^"'`\s]+)["'`]"#,
        // fetch("...")
        r#"\bfetch\(\s*["'`]([^"'`\s]+)["'`]"#,
        // xhr.open("GET", "...")
        r#"\.open\(\s*["'`][A-Za-z]+["'`]\s*,\s*["'`]([^"'`\s]+)["'`]"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static pattern"))
    .collect()
});

/// Extracts URL literals from a JavaScript body, resolved against the
/// script's own URL.
fn extract_js_urls(script_url: &str, body: &[u8]) -> Vec<String> {
    let Ok(base) = Url::parse(script_url) else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(body);
    let mut found = Vec::new();
    for pattern in JS_URL_PATTERNS.iter() {
        for capture in pattern.captures_iter(&text) {
            let literal = &capture[1];
            if literal.starts_with("data:") || literal.contains("${") {
                continue;
            }
            if let Ok(resolved) = base.join(literal) {
                if matches!(resolved.scheme(), "http" | "https") {
                    let resolved = resolved.to_string();
                    if !found.contains(&resolved) {
                        found.push(resolved);
                    }
                }
            }
        }
    }
    found
}

fn is_javascript(request: &HijackedRequest, response: &HijackedResponse) -> bool {
    if request.resource_kind == ResourceKind::Script {
        return true;
    }
    response
        .header("content-type")
        .is_some_and(|ct| ct.contains("javascript") || ct.contains("ecmascript"))
}

fn is_multipart(request: &HijackedRequest) -> bool {
    request
        .header("content-type")
        .is_some_and(|ct| ct.contains("multipart/form-data"))
}

// ============================================================================
// TrafficSink
// ============================================================================

/// Per-session [`HijackHandler`] feeding the crawl's output channel and
/// the frontier.
pub(crate) struct TrafficSink {
    shared: Arc<CrawlShared>,
    /// URL of the page this session is visiting.
    page_url: String,
    /// Depth of the page, for harvested JS links.
    depth: usize,
    /// Document URL actually observed on the wire (tracks redirects).
    observed_page_url: Mutex<Option<String>>,
}

impl TrafficSink {
    pub(crate) fn new(shared: Arc<CrawlShared>, page_url: String, depth: usize) -> Self {
        Self {
            shared,
            page_url,
            depth,
            observed_page_url: Mutex::new(None),
        }
    }

    /// The `from` attribution for records of this session.
    fn origin(&self) -> String {
        self.observed_page_url
            .lock()
            .clone()
            .unwrap_or_else(|| self.page_url.clone())
    }

    /// Headers to merge into an outgoing request.
    fn injected_headers(&self, request: &HijackedRequest) -> Vec<(String, String)> {
        let mut extra = self.shared.config.headers.clone();
        let has_referer = request.header("referer").is_some()
            || extra.iter().any(|(name, _)| name.eq_ignore_ascii_case("referer"));
        if !has_referer && request.url != self.shared.root_url {
            extra.push(("Referer".to_string(), self.shared.root_url.clone()));
        }
        extra
    }

    async fn handle_js_body(&self, request: &HijackedRequest, response: &HijackedResponse) {
        for js_url in extract_js_urls(&request.url, &response.body) {
            self.shared.harvest(&js_url, self.depth + 1).await;

            if !self.shared.policy.scope().admits(&js_url) {
                continue;
            }
            let key = self.shared.dedup.url_key(&js_url);
            if !self.shared.mark_sent(&key) {
                continue;
            }
            let record = TrafficRecord::js_url(js_url, request.url.clone());
            if !self.shared.emit(record).await {
                return;
            }
        }
    }
}

#[async_trait]
impl HijackHandler for TrafficSink {
    async fn on_request(&self, request: &HijackedRequest) -> RequestAction {
        if request.resource_kind == ResourceKind::Document {
            let mut observed = self.observed_page_url.lock();
            if observed.is_none() {
                *observed = Some(request.url.clone());
            }
        }

        if self.shared.config.blocked_resources.contains(&request.resource_kind) {
            trace!(url = %request.url, kind = ?request.resource_kind, "Blocking resource");
            return RequestAction::Block;
        }

        if is_multipart(request) {
            debug!(url = %request.url, "Multipart upload observed");
            let record =
                TrafficRecord::file_upload(request.method.clone(), request.url.clone(), Some(self.origin()))
                    .with_request_headers(request.headers.clone());
            self.shared.emit(record).await;
        }

        RequestAction::Forward {
            extra_headers: self.injected_headers(request),
        }
    }

    async fn on_response(
        &self,
        request: &HijackedRequest,
        response: Result<HijackedResponse>,
    ) -> ResponseAction {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %request.url, error = %err, "Response load failed");
                return ResponseAction::Stub;
            }
        };

        // Once stopping, in-flight pages keep rendering; only recording
        // and harvesting stop.
        if self.shared.stopping() {
            return ResponseAction::Deliver;
        }

        if !self.shared.policy.scope().admits(&request.url) {
            return ResponseAction::Deliver;
        }

        if self.shared.config.js_link_extraction && is_javascript(request, &response) {
            self.handle_js_body(request, &response).await;
        }

        let key = self.shared.dedup.key(&request.method, &request.url);
        if !self.shared.mark_sent(&key) {
            return ResponseAction::Deliver;
        }

        let record = TrafficRecord::exchange(
            request.method.clone(),
            request.url.clone(),
            Some(self.origin()),
            response.status,
        )
        .with_request_headers(request.headers.clone())
        .with_response_headers(response.headers.clone())
        .with_response_body(response.body.clone());
        let record = match &request.body {
            Some(body) => record.with_request_body(body.clone()),
            None => record,
        };
        self.shared.emit(record).await;

        ResponseAction::Deliver
    }
}

// ============================================================================
// Tests
// ============================================================================

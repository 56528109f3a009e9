//! End-to-end crawl tests over an in-process mock browser driver.
//!
//! The mock models a small site as a map from URL to page description
//! (links, form elements, network resources). `wait_load` replays the
//! page's network traffic through the registered hijack handler, so the
//! whole engine path — frontier, policy, filters, hijack sink, action
//! pipeline — runs exactly as it would against a real browser.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio_test::assert_ok;

use headless_crawler::{
    BrowserDriver, Cookie, CrawlConfig, Crawler, Error, HijackHandler, HijackedRequest,
    HijackedResponse, PageHandle, RecordKind, RequestAction, ResourceKind, Result, TrafficRecord,
};

// ============================================================================
// Mock Site
// ============================================================================

#[derive(Clone)]
struct MockResource {
    method: &'static str,
    url: String,
    kind: ResourceKind,
    content_type: &'static str,
    body: Vec<u8>,
    status: u16,
}

#[derive(Clone)]
struct SitePage {
    hrefs: Vec<String>,
    inputs: Value,
    clickables: Value,
    listeners: Value,
    resources: Vec<MockResource>,
}

impl Default for SitePage {
    fn default() -> Self {
        Self {
            hrefs: Vec::new(),
            inputs: json!([]),
            clickables: json!([]),
            listeners: json!([]),
            resources: Vec::new(),
        }
    }
}

impl SitePage {
    fn with_hrefs<I: IntoIterator<Item = &'static str>>(mut self, hrefs: I) -> Self {
        self.hrefs = hrefs.into_iter().map(String::from).collect();
        self
    }

    fn with_resource(mut self, resource: MockResource) -> Self {
        self.resources.push(resource);
        self
    }
}

fn js_resource(url: &str, body: &str) -> MockResource {
    MockResource {
        method: "GET",
        url: url.to_string(),
        kind: ResourceKind::Script,
        content_type: "application/javascript",
        body: body.as_bytes().to_vec(),
        status: 200,
    }
}

fn xhr_resource(url: &str) -> MockResource {
    MockResource {
        method: "GET",
        url: url.to_string(),
        kind: ResourceKind::Xhr,
        content_type: "application/json",
        body: b"{}".to_vec(),
        status: 200,
    }
}

struct MockSite {
    pages: FxHashMap<String, SitePage>,
    /// Selector → URL the click navigates to.
    click_nav: FxHashMap<String, String>,
    /// (selector, value) pairs typed into inputs.
    filled: Mutex<Vec<(String, String)>>,
    load_delay: Duration,
}

impl MockSite {
    fn new(pages: Vec<(&str, SitePage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, page)| (url.to_string(), page))
                .collect(),
            click_nav: FxHashMap::default(),
            filled: Mutex::new(Vec::new()),
            load_delay: Duration::from_millis(5),
        }
    }

    fn page(&self, url: &str) -> SitePage {
        self.pages.get(url).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Mock Driver
// ============================================================================

struct MockDriver {
    site: Arc<MockSite>,
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        Ok(Arc::new(MockPage {
            site: Arc::clone(&self.site),
            current: Mutex::new(String::new()),
            history: Mutex::new(Vec::new()),
            hijack: Mutex::new(None),
        }))
    }
}

struct MockPage {
    site: Arc<MockSite>,
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
    hijack: Mutex<Option<Arc<dyn HijackHandler>>>,
}

impl MockPage {
    async fn replay(&self, request: HijackedRequest, response: HijackedResponse) {
        let handler = self.hijack.lock().clone();
        let Some(handler) = handler else { return };
        match handler.on_request(&request).await {
            RequestAction::Block => {}
            RequestAction::Forward { extra_headers } => {
                let mut request = request;
                request.headers.extend(extra_headers);
                handler.on_response(&request, Ok(response)).await;
            }
        }
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut current = self.current.lock();
        if !current.is_empty() {
            self.history.lock().push(current.clone());
        }
        *current = url.to_string();
        Ok(())
    }

    async fn navigate_back(&self) -> Result<()> {
        let previous = self
            .history
            .lock()
            .pop()
            .ok_or_else(|| Error::navigation("", "no history"))?;
        *self.current.lock() = previous;
        Ok(())
    }

    async fn wait_load(&self, _timeout: Duration) -> Result<()> {
        tokio::time::sleep(self.site.load_delay).await;
        let url = self.current.lock().clone();
        let page = self.site.page(&url);

        // Document request first, then the page's subresources.
        self.replay(
            HijackedRequest {
                method: "GET".to_string(),
                url: url.clone(),
                resource_kind: ResourceKind::Document,
                headers: Vec::new(),
                body: None,
            },
            HijackedResponse {
                status: 200,
                headers: vec![("Content-Type".to_string(), "text/html".to_string())],
                body: b"<html></html>".to_vec(),
            },
        )
        .await;

        for resource in page.resources {
            self.replay(
                HijackedRequest {
                    method: resource.method.to_string(),
                    url: resource.url.clone(),
                    resource_kind: resource.kind,
                    headers: Vec::new(),
                    body: None,
                },
                HijackedResponse {
                    status: resource.status,
                    headers: vec![("Content-Type".to_string(), resource.content_type.to_string())],
                    body: resource.body.clone(),
                },
            )
            .await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current.lock().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let url = self.current.lock().clone();
        let page = self.site.page(&url);
        if script.contains("createNodeIterator") {
            return Ok(json!(page.hrefs));
        }
        if script.contains("'input, textarea, select'") {
            return Ok(page.inputs);
        }
        if script.contains("input[type=submit]") {
            return Ok(page.clickables);
        }
        if script.contains("__clickListenerTargets") {
            return Ok(page.listeners);
        }
        if script.contains("selectedIndex") {
            return Ok(json!(true));
        }
        Err(Error::script(format!("unrecognized script: {script}")))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if let Some(target) = self.site.click_nav.get(selector) {
            let mut current = self.current.lock();
            self.history.lock().push(current.clone());
            *current = target.clone();
        }
        Ok(())
    }

    async fn input(&self, selector: &str, text: &str) -> Result<()> {
        self.site
            .filled
            .lock()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &str) -> Result<()> {
        self.site
            .filled
            .lock()
            .push((selector.to_string(), format!("file:{path}")));
        Ok(())
    }

    async fn install_init_script(&self, _script: &str) -> Result<()> {
        Ok(())
    }

    async fn set_extra_headers(&self, _headers: &[(String, String)]) -> Result<()> {
        Ok(())
    }

    async fn set_cookies(&self, _cookies: &[Cookie]) -> Result<()> {
        Ok(())
    }

    async fn register_hijack(&self, handler: Arc<dyn HijackHandler>) -> Result<()> {
        *self.hijack.lock() = Some(handler);
        Ok(())
    }

    async fn clear_hijack(&self) -> Result<()> {
        *self.hijack.lock() = None;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn run_crawl(
    site: Arc<MockSite>,
    root: &str,
    config: CrawlConfig,
) -> anyhow::Result<(headless_crawler::CrawlStats, Vec<TrafficRecord>)> {
    init_logging();
    let driver: Arc<dyn BrowserDriver> = Arc::new(MockDriver {
        site: Arc::clone(&site),
    });
    let (handle, mut records) = Crawler::start(root, config, vec![driver])
        .await
        .context("crawl start")?;

    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(record) = records.recv().await {
            collected.push(record);
        }
        collected
    });

    let stats = handle.join().await.context("crawl join")?;
    let records = collector.await.context("collector")?;
    Ok((stats, records))
}

fn exchange_urls(records: &[TrafficRecord]) -> Vec<&str> {
    records
        .iter()
        .filter(|r| r.kind == RecordKind::Exchange)
        .map(|r| r.url.as_str())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawl_follows_links_fills_forms_and_stays_in_scope() -> anyhow::Result<()> {
    let login_inputs = json!([
        {"selector": "#username", "kind": "text", "visible": true, "keywords": "username login"},
        {"selector": "#password", "kind": "password", "visible": true, "keywords": "password"},
        {"selector": "#hidden", "kind": "text", "visible": false, "keywords": "secret"}
    ]);
    let site = Arc::new(MockSite::new(vec![
        (
            "http://site.test/",
            SitePage::default()
                .with_hrefs([
                    "http://site.test/a",
                    "http://site.test/b",
                    "http://other.test/x",
                ]),
        ),
        (
            "http://site.test/a",
            SitePage {
                inputs: login_inputs,
                ..SitePage::default()
            },
        ),
        ("http://site.test/b", SitePage::default()),
    ]));

    let config = CrawlConfig::new().with_form_fill("password", "s3cret");
    let (stats, records) = run_crawl(Arc::clone(&site), "http://site.test/", config).await?;

    // Root plus the two in-scope links were visited; the off-domain link
    // was never admitted.
    assert_eq!(stats.visited, 3);
    let urls = exchange_urls(&records);
    assert!(urls.contains(&"http://site.test/"));
    assert!(urls.contains(&"http://site.test/a"));
    assert!(urls.contains(&"http://site.test/b"));
    assert!(!urls.iter().any(|u| u.starts_with("http://other.test/")));

    // The visible form fields were filled; the password keyword mapping
    // won over the default fill value. The hidden input was skipped.
    let filled = site.filled.lock().clone();
    assert!(filled.contains(&("#password".to_string(), "s3cret".to_string())));
    assert!(filled.iter().any(|(sel, _)| sel == "#username"));
    assert!(!filled.iter().any(|(sel, _)| sel == "#hidden"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn records_are_emitted_at_most_once() -> anyhow::Result<()> {
    // Both pages link to each other and both load the same API resource.
    let site = Arc::new(MockSite::new(vec![
        (
            "http://site.test/",
            SitePage::default()
                .with_hrefs(["http://site.test/a"])
                .with_resource(xhr_resource("http://site.test/api/data")),
        ),
        (
            "http://site.test/a",
            SitePage::default()
                .with_hrefs(["http://site.test/"])
                .with_resource(xhr_resource("http://site.test/api/data")),
        ),
    ]));

    let (stats, records) = run_crawl(site, "http://site.test/", CrawlConfig::new()).await?;

    assert_eq!(stats.visited, 2);
    let api_records = records
        .iter()
        .filter(|r| r.url == "http://site.test/api/data")
        .count();
    assert_eq!(api_records, 1, "shared resource recorded more than once");
    let root_docs = records
        .iter()
        .filter(|r| r.kind == RecordKind::Exchange && r.url == "http://site.test/")
        .count();
    assert_eq!(root_docs, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn js_bodies_yield_js_url_records_and_frontier_entries() -> anyhow::Result<()> {
    let site = Arc::new(MockSite::new(vec![(
        "http://site.test/",
        SitePage::default().with_resource(js_resource(
            "http://site.test/static/app.js",
            r#"fetch("/api/users"); $.post("/api/login", data);"#,
        )),
    )]));

    let (stats, records) = run_crawl(site, "http://site.test/", CrawlConfig::new()).await?;

    let js_urls: Vec<&str> = records
        .iter()
        .filter(|r| r.kind == RecordKind::JsUrl)
        .map(|r| r.url.as_str())
        .collect();
    assert!(js_urls.contains(&"http://site.test/api/users"));
    assert!(js_urls.contains(&"http://site.test/api/login"));

    // Extracted URLs were fed back to the frontier and visited as pages.
    assert_eq!(stats.visited, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_never_exceed_the_bound() -> anyhow::Result<()> {
    let mut pages = vec![(
        "http://site.test/",
        SitePage::default().with_hrefs([
            "http://site.test/p0",
            "http://site.test/p1",
            "http://site.test/p2",
            "http://site.test/p3",
            "http://site.test/p4",
            "http://site.test/p5",
            "http://site.test/p6",
            "http://site.test/p7",
            "http://site.test/p8",
            "http://site.test/p9",
        ]),
    )];
    for url in [
        "http://site.test/p0",
        "http://site.test/p1",
        "http://site.test/p2",
        "http://site.test/p3",
        "http://site.test/p4",
        "http://site.test/p5",
        "http://site.test/p6",
        "http://site.test/p7",
        "http://site.test/p8",
        "http://site.test/p9",
    ] {
        pages.push((url, SitePage::default()));
    }
    let mut site = MockSite::new(pages);
    site.load_delay = Duration::from_millis(25);

    let config = CrawlConfig::new().with_concurrency(3);
    let (stats, _records) = run_crawl(Arc::new(site), "http://site.test/", config).await?;

    assert_eq!(stats.visited, 11);
    assert!(
        stats.peak_sessions <= 3,
        "bound exceeded: {}",
        stats.peak_sessions
    );
    assert!(stats.peak_sessions >= 2, "sessions never overlapped");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn max_url_count_stops_the_crawl() -> anyhow::Result<()> {
    // A page chain long enough that the cap must cut it short.
    let mut pages = Vec::new();
    for i in 0..50 {
        let url: &'static str = Box::leak(format!("http://site.test/p{i}").into_boxed_str());
        let next: &'static str = Box::leak(format!("http://site.test/p{}", i + 1).into_boxed_str());
        pages.push((url, SitePage::default().with_hrefs([next])));
    }
    let site = Arc::new(MockSite::new(pages));

    let config = CrawlConfig::new().with_max_url_count(3);
    let (stats, records) = run_crawl(site, "http://site.test/p0", config).await?;

    assert!(stats.emitted >= 3);
    assert!(
        records.len() < 50,
        "cap did not stop the crawl: {} records",
        records.len()
    );
    assert!(stats.visited < 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_terminates_a_running_crawl() {
    // Self-perpetuating site: every page links onward forever.
    let mut pages = Vec::new();
    for i in 0..500 {
        let url: &'static str = Box::leak(format!("http://site.test/p{i}").into_boxed_str());
        let next: &'static str = Box::leak(format!("http://site.test/p{}", i + 1).into_boxed_str());
        pages.push((url, SitePage::default().with_hrefs([next])));
    }
    let mut site = MockSite::new(pages);
    site.load_delay = Duration::from_millis(10);

    let driver: Arc<dyn BrowserDriver> = Arc::new(MockDriver {
        site: Arc::new(site),
    });
    let (handle, mut records) = tokio_test::assert_ok!(
        Crawler::start("http://site.test/p0", CrawlConfig::new(), vec![driver]).await
    );

    let collector = tokio::spawn(async move { while records.recv().await.is_some() {} });

    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.cancel();

    let joined = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("join timed out");
    let stats = tokio_test::assert_ok!(joined);
    collector.await.expect("collector");
    assert!(stats.visited < 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_interrupts_a_slow_page_load() {
    init_logging();
    // A page that takes far longer to load than the test is willing to
    // wait; cancellation must cut the load wait short.
    let mut site = MockSite::new(vec![("http://site.test/", SitePage::default())]);
    site.load_delay = Duration::from_secs(30);

    let driver: Arc<dyn BrowserDriver> = Arc::new(MockDriver {
        site: Arc::new(site),
    });
    let (handle, mut records) = tokio_test::assert_ok!(
        Crawler::start("http://site.test/", CrawlConfig::new(), vec![driver]).await
    );
    let collector = tokio::spawn(async move { while records.recv().await.is_some() {} });

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let joined = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("cancel did not interrupt the load wait");
    let stats = tokio_test::assert_ok!(joined);
    collector.await.expect("collector");
    assert_eq!(stats.emitted, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spa_pages_fall_back_to_event_clicks() -> anyhow::Result<()> {
    let mut site = MockSite::new(vec![
        (
            "http://site.test/app",
            SitePage {
                listeners: json!(["#nav-next"]),
                ..SitePage::default()
            },
        ),
        ("http://site.test/next", SitePage::default()),
    ]);
    site.click_nav
        .insert("#nav-next".to_string(), "http://site.test/next".to_string());

    let (stats, records) =
        run_crawl(Arc::new(site), "http://site.test/app", CrawlConfig::new()).await?;

    let event_urls: Vec<&str> = records
        .iter()
        .filter(|r| r.kind == RecordKind::EventUrl)
        .map(|r| r.url.as_str())
        .collect();
    assert_eq!(event_urls, vec!["http://site.test/next"]);
    assert_eq!(stats.visited, 2);
    Ok(())
}

//! Crawl configuration.
//!
//! [`CrawlConfig`] collects every tunable of a crawl: worker fan-out,
//! dedup and scope levels, filter lists, per-page and whole-crawl
//! timeouts, header/cookie injection and form-fill tables.
//!
//! # Example
//!
//! ```ignore
//! use headless_crawler::{CrawlConfig, RepeatLevel, ScanRangeLevel};
//!
//! let config = CrawlConfig::new()
//!     .with_concurrency(5)
//!     .with_repeat_level(RepeatLevel::Medium)
//!     .with_scan_range(ScanRangeLevel::SubPath)
//!     .with_form_fill("username", "admin")
//!     .with_blacklist([r"logout"]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::driver::{Cookie, ResourceKind};
use crate::error::{Error, Result};
use crate::policy::{RepeatLevel, ScanRangeLevel};

// ============================================================================
// Defaults
// ============================================================================

/// Default number of concurrent page sessions.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default per-page load timeout.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-crawl timeout.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(3000);

/// Default extra settle delay after page load.
pub const DEFAULT_EXTRA_WAIT_LOAD: Duration = Duration::from_millis(500);

/// Fill value for inputs matching no form-fill keyword.
pub const DEFAULT_FILL_VALUE: &str = "test";

fn default_form_fill() -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    map.insert("username".to_string(), "admin".to_string());
    map.insert("admin".to_string(), "admin".to_string());
    map.insert("password".to_string(), "password".to_string());
    map.insert("captcha".to_string(), "captcha".to_string());
    map
}

fn default_blocked_resources() -> FxHashSet<ResourceKind> {
    [ResourceKind::Image, ResourceKind::Media, ResourceKind::Font]
        .into_iter()
        .collect()
}

// ============================================================================
// CrawlConfig
// ============================================================================

/// Immutable configuration for one crawl.
///
/// Built with `with_*` methods, validated once by the coordinator before
/// any worker starts.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum concurrent page sessions across all workers.
    pub concurrency: usize,

    /// Stop harvesting new URLs after this many emitted records
    /// (`0` = unlimited).
    pub max_url_count: u64,

    /// Maximum link depth from the root (`0` = unlimited).
    pub max_depth: usize,

    /// Crawl boundary derivation from the root URL.
    pub scan_range: ScanRangeLevel,

    /// Dedup key coarseness.
    pub repeat_level: RepeatLevel,

    /// Query parameter names ignored by dedup keys.
    pub ignore_params: Vec<String>,

    /// Regex patterns; a matching URL is always rejected.
    pub blacklist: Vec<String>,

    /// Regex patterns; a matching URL bypasses the blacklist.
    pub whitelist: Vec<String>,

    /// Keyword → value table for input filling.
    pub form_fill: FxHashMap<String, String>,

    /// Keyword → local file path table for file inputs. The `"default"`
    /// entry is used when no keyword matches.
    pub file_upload: FxHashMap<String, String>,

    /// Headers injected into every outgoing request.
    pub headers: Vec<(String, String)>,

    /// Cookies installed before the first navigation of every session.
    pub cookies: Vec<Cookie>,

    /// Per-page load timeout.
    pub page_timeout: Duration,

    /// Whole-crawl timeout.
    pub total_timeout: Duration,

    /// Extra settle delay after load, for pages that render late.
    pub extra_wait_load: Duration,

    /// Clickable elements whose text matches any of these words are
    /// never clicked.
    pub sensitive_words: Vec<String>,

    /// Resource kinds aborted at the network layer.
    pub blocked_resources: FxHashSet<ResourceKind>,

    /// Extract URL literals from JavaScript response bodies.
    pub js_link_extraction: bool,

    /// Extra path suffixes rejected as non-page content.
    pub invalid_suffixes: Vec<String>,

    /// Suffixes admitted regardless of scan range. Empty means the
    /// built-in favicon/robots list.
    pub allow_suffixes: Vec<String>,

    /// Visit/Sent filter entry lifetime (`None` = never expire).
    pub filter_ttl: Option<Duration>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl CrawlConfig {
    /// Creates a configuration with production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_url_count: 0,
            max_depth: 0,
            scan_range: ScanRangeLevel::MainDomain,
            repeat_level: RepeatLevel::Low,
            ignore_params: Vec::new(),
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            form_fill: default_form_fill(),
            file_upload: FxHashMap::default(),
            headers: Vec::new(),
            cookies: Vec::new(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            total_timeout: DEFAULT_TOTAL_TIMEOUT,
            extra_wait_load: DEFAULT_EXTRA_WAIT_LOAD,
            sensitive_words: Vec::new(),
            blocked_resources: default_blocked_resources(),
            js_link_extraction: true,
            invalid_suffixes: Vec::new(),
            allow_suffixes: Vec::new(),
            filter_ttl: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl CrawlConfig {
    /// Sets the maximum number of concurrent page sessions.
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Stops harvesting after `count` emitted records. `0` = unlimited.
    #[inline]
    #[must_use]
    pub fn with_max_url_count(mut self, count: u64) -> Self {
        self.max_url_count = count;
        self
    }

    /// Limits link depth from the root. `0` = unlimited.
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the scan-range level.
    #[inline]
    #[must_use]
    pub fn with_scan_range(mut self, level: ScanRangeLevel) -> Self {
        self.scan_range = level;
        self
    }

    /// Sets the dedup coarseness level.
    #[inline]
    #[must_use]
    pub fn with_repeat_level(mut self, level: RepeatLevel) -> Self {
        self.repeat_level = level;
        self
    }

    /// Adds query parameter names to ignore in dedup keys.
    #[must_use]
    pub fn with_ignore_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Adds blacklist regex patterns.
    #[must_use]
    pub fn with_blacklist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Adds whitelist regex patterns.
    #[must_use]
    pub fn with_whitelist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Maps an input keyword to a fill value.
    #[must_use]
    pub fn with_form_fill(mut self, keyword: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_fill.insert(keyword.into(), value.into());
        self
    }

    /// Maps a file-input keyword to a local file path. Use the keyword
    /// `"default"` for inputs matching nothing else.
    #[must_use]
    pub fn with_file_upload(mut self, keyword: impl Into<String>, path: impl Into<String>) -> Self {
        self.file_upload.insert(keyword.into(), path.into());
        self
    }

    /// Adds a header injected into every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie installed before navigation.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Sets the per-page load timeout.
    #[inline]
    #[must_use]
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Sets the whole-crawl timeout.
    #[inline]
    #[must_use]
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Sets the extra post-load settle delay.
    #[inline]
    #[must_use]
    pub fn with_extra_wait_load(mut self, delay: Duration) -> Self {
        self.extra_wait_load = delay;
        self
    }

    /// Adds words that disqualify a clickable element.
    #[must_use]
    pub fn with_sensitive_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_words
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    /// Replaces the set of resource kinds blocked at the network layer.
    #[must_use]
    pub fn with_blocked_resources<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = ResourceKind>,
    {
        self.blocked_resources = kinds.into_iter().collect();
        self
    }

    /// Enables or disables JS body URL extraction.
    #[inline]
    #[must_use]
    pub fn with_js_link_extraction(mut self, enabled: bool) -> Self {
        self.js_link_extraction = enabled;
        self
    }

    /// Adds path suffixes rejected as non-page content.
    #[must_use]
    pub fn with_invalid_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalid_suffixes
            .extend(suffixes.into_iter().map(Into::into));
        self
    }

    /// Replaces the always-allow suffix list of the scan range.
    #[must_use]
    pub fn with_allow_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_suffixes
            .extend(suffixes.into_iter().map(Into::into));
        self
    }

    /// Expires filter entries after `ttl`.
    #[inline]
    #[must_use]
    pub fn with_filter_ttl(mut self, ttl: Duration) -> Self {
        self.filter_ttl = Some(ttl);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl CrawlConfig {
    /// Checks internal consistency.
    ///
    /// Malformed black/white-list regexes are *not* an error here; they
    /// degrade to a warning at compile time in the policy layer.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.page_timeout.is_zero() {
            return Err(Error::config("page_timeout must be non-zero"));
        }
        if self.total_timeout < self.page_timeout {
            return Err(Error::config(
                "total_timeout must be at least page_timeout",
            ));
        }
        Ok(())
    }

    /// Fill value for an input whose keywords match `keyword_str`.
    ///
    /// Longest-match wins; falls back to [`DEFAULT_FILL_VALUE`].
    #[must_use]
    pub fn fill_value_for(&self, keyword_str: &str) -> &str {
        let lowered = keyword_str.to_lowercase();
        self.form_fill
            .iter()
            .filter(|(k, _)| lowered.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map_or(DEFAULT_FILL_VALUE, |(_, v)| v.as_str())
    }

    /// Upload path for a file input whose keywords match `keyword_str`.
    ///
    /// Falls back to the `"default"` entry; `None` means skip the input.
    #[must_use]
    pub fn upload_path_for(&self, keyword_str: &str) -> Option<&str> {
        let lowered = keyword_str.to_lowercase();
        self.file_upload
            .iter()
            .filter(|(k, _)| *k != "default" && lowered.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, v)| v.as_str())
            .or_else(|| self.file_upload.get("default").map(String::as_str))
    }
}

// ============================================================================
// Tests
// ============================================================================

//! URL deduplication and scan-range policy.
//!
//! Pure canonicalization and admission rules, chosen once per crawl:
//!
//! - [`RepeatLevel`] selects one of five canonical-key functions over
//!   `(method, URL)`. Coarser levels merge more URLs into one key.
//! - [`ScanRangeLevel`] + [`ScanScope`] bound the crawl to a URL prefix
//!   computed once from the root, with an always-allow suffix list that is
//!   independent of scope.
//! - [`UrlPolicy`] layers scope, whitelist/blacklist regexes and
//!   invalid-literal/suffix filtering into a single admission check.
//!
//! # Repeat-check levels
//!
//! | Level | Key contents |
//! |-------|--------------|
//! | [`Unlimited`] | method + full URL verbatim |
//! | [`Low`] | method + path + query parameter names (order kept, values dropped) |
//! | [`Medium`] | method + path + sorted parameter names |
//! | [`High`] | method + path (query dropped) |
//! | [`Extreme`] | scheme + host + path only (method dropped) |
//!
//! [`Unlimited`]: RepeatLevel::Unlimited
//! [`Low`]: RepeatLevel::Low
//! [`Medium`]: RepeatLevel::Medium
//! [`High`]: RepeatLevel::High
//! [`Extreme`]: RepeatLevel::Extreme

// ============================================================================
// Imports
// ============================================================================

use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashSet;
use tracing::warn;
use url::Url;

// ============================================================================
// Constants
// ============================================================================

/// Href values that are not navigable links.
const INVALID_URLS: &[&str] = &["", "#", "javascript:;", "#/"];

/// Default binary/media suffixes rejected during link harvesting.
const DEFAULT_INVALID_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".bmp", ".webp", ".mp3", ".mp4", ".avi",
    ".mov", ".flv", ".wmv", ".zip", ".rar", ".gz", ".7z", ".tar", ".exe", ".dmg", ".pdf", ".doc",
    ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".woff", ".woff2", ".ttf", ".eot",
];

/// Suffixes admitted regardless of scan range (favicon-like resources).
const DEFAULT_ALLOW_SUFFIXES: &[&str] = &["/favicon.ico", "/robots.txt"];

// ============================================================================
// RepeatLevel
// ============================================================================

/// Deduplication granularity, strongest recall first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepeatLevel {
    /// Method + full URL verbatim. Maximum recall, most duplicates.
    Unlimited,
    /// Method + path + query parameter names, values dropped.
    #[default]
    Low,
    /// Method + path + sorted parameter names, order-independent.
    Medium,
    /// Method + path, query dropped.
    High,
    /// Scheme + host + path only, method dropped.
    Extreme,
}

// ============================================================================
// Deduplicator
// ============================================================================

/// Computes canonical dedup keys at a fixed [`RepeatLevel`].
///
/// The level and ignore-list are chosen at construction; `key` is a pure
/// function afterwards.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    level: RepeatLevel,
    ignore_params: FxHashSet<String>,
}

impl Deduplicator {
    /// Creates a deduplicator at the given level.
    ///
    /// `ignore_params` names query parameters (e.g. CSRF tokens) excluded
    /// from Low/Medium canonicalization.
    #[must_use]
    pub fn new(level: RepeatLevel, ignore_params: &[String]) -> Self {
        Self {
            level,
            ignore_params: ignore_params.iter().cloned().collect(),
        }
    }

    /// Returns the configured level.
    #[inline]
    #[must_use]
    pub fn level(&self) -> RepeatLevel {
        self.level
    }

    /// Computes the canonical key for `(method, url)`.
    ///
    /// Unparseable URLs fall back to the raw string so they still
    /// deduplicate against themselves.
    #[must_use]
    pub fn key(&self, method: &str, url: &str) -> String {
        let method = method.to_ascii_uppercase();
        if self.level == RepeatLevel::Unlimited {
            return format!("{method} {url}");
        }

        let Ok(parsed) = Url::parse(url) else {
            return match self.level {
                RepeatLevel::Extreme => url.to_string(),
                _ => format!("{method} {url}"),
            };
        };

        let base = base_of(&parsed);
        match self.level {
            RepeatLevel::Unlimited => unreachable!("handled above"),
            RepeatLevel::Low => {
                let names = self.param_names(&parsed, false);
                join_key(&method, &base, &names)
            }
            RepeatLevel::Medium => {
                let names = self.param_names(&parsed, true);
                join_key(&method, &base, &names)
            }
            RepeatLevel::High => format!("{method} {base}"),
            RepeatLevel::Extreme => base,
        }
    }

    /// Convenience for URL-only keys (harvested links are always GET).
    #[inline]
    #[must_use]
    pub fn url_key(&self, url: &str) -> String {
        self.key("GET", url)
    }

    /// Query parameter names minus the ignore-list, optionally sorted.
    fn param_names(&self, url: &Url, sorted: bool) -> Vec<String> {
        let mut names: Vec<String> = url
            .query_pairs()
            .map(|(name, _)| name.into_owned())
            .filter(|name| !self.ignore_params.contains(name))
            .collect();
        if sorted {
            names.sort_unstable();
        }
        names
    }
}

/// Scheme + host + path with query and fragment stripped.
fn base_of(url: &Url) -> String {
    let mut base = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        base.push_str(host);
    }
    if let Some(port) = url.port() {
        base.push(':');
        base.push_str(&port.to_string());
    }
    base.push_str(url.path());
    base
}

fn join_key(method: &str, base: &str, names: &[String]) -> String {
    if names.is_empty() {
        format!("{method} {base}")
    } else {
        format!("{method} {base}?{}", names.join(","))
    }
}

// ============================================================================
// ScanRangeLevel
// ============================================================================

/// How the crawl boundary is derived from the root URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanRangeLevel {
    /// Everything under the root's scheme + host.
    #[default]
    MainDomain,
    /// Everything under the root's directory prefix.
    SubPath,
}

// ============================================================================
// ScanScope
// ============================================================================

/// Crawl boundary computed once from the root URL.
#[derive(Debug, Clone)]
pub struct ScanScope {
    prefix: String,
    allow_suffixes: Vec<String>,
}

impl ScanScope {
    /// Derives the scope prefix from the root at the given level.
    #[must_use]
    pub fn new(root: &Url, level: ScanRangeLevel) -> Self {
        let mut prefix = format!("{}://", root.scheme());
        if let Some(host) = root.host_str() {
            prefix.push_str(host);
        }
        if let Some(port) = root.port() {
            prefix.push(':');
            prefix.push_str(&port.to_string());
        }
        match level {
            ScanRangeLevel::MainDomain => prefix.push('/'),
            ScanRangeLevel::SubPath => {
                let path = root.path();
                let dir = match path.rfind('/') {
                    Some(idx) => &path[..=idx],
                    None => "/",
                };
                prefix.push_str(dir);
            }
        }
        Self {
            prefix,
            allow_suffixes: DEFAULT_ALLOW_SUFFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Replaces the always-allow suffix list.
    #[must_use]
    pub fn with_allow_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.allow_suffixes = suffixes;
        self
    }

    /// Returns the computed prefix.
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `true` if `url` matches an always-allow suffix.
    #[must_use]
    pub fn is_always_allowed(&self, url: &str) -> bool {
        self.allow_suffixes.iter().any(|s| url.ends_with(s.as_str()))
    }

    /// Returns `true` if `url` falls inside the boundary or matches an
    /// always-allow suffix.
    #[must_use]
    pub fn admits(&self, url: &str) -> bool {
        url.starts_with(&self.prefix) || self.is_always_allowed(url)
    }
}

// ============================================================================
// UrlPolicy
// ============================================================================

/// Full admission policy for discovered URLs.
///
/// Evaluation order: harvest validity (literal + suffix), scan range,
/// whitelist (match short-circuits acceptance), blacklist (match rejects).
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    scope: ScanScope,
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
    invalid_suffixes: Vec<String>,
}

impl UrlPolicy {
    /// Builds a policy from raw regex pattern lists.
    ///
    /// Patterns that fail to compile are skipped with a warning; a fully
    /// malformed list degrades to a no-op rather than aborting startup.
    #[must_use]
    pub fn new(
        scope: ScanScope,
        whitelist: &[String],
        blacklist: &[String],
        invalid_suffixes: Option<Vec<String>>,
    ) -> Self {
        Self {
            scope,
            whitelist: compile_patterns(whitelist, "whitelist"),
            blacklist: compile_patterns(blacklist, "blacklist"),
            invalid_suffixes: invalid_suffixes.unwrap_or_else(|| {
                DEFAULT_INVALID_SUFFIXES
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect()
            }),
        }
    }

    /// Returns the scan scope.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ScanScope {
        &self.scope
    }

    /// Returns `true` if `raw` is a harvestable link at all: not an
    /// invalid literal and not a known binary/media resource.
    #[must_use]
    pub fn is_harvestable(&self, raw: &str) -> bool {
        if INVALID_URLS.contains(&raw) {
            return false;
        }
        let path_end = raw.find(['?', '#']).unwrap_or(raw.len());
        let path = &raw[..path_end];
        // Always-allow suffixes win over the binary-suffix rejection,
        // otherwise favicon.ico could never be harvested.
        if self.scope.is_always_allowed(path) {
            return true;
        }
        !self
            .invalid_suffixes
            .iter()
            .any(|s| path.to_ascii_lowercase().ends_with(s.as_str()))
    }

    /// Full admission check for a harvested URL.
    #[must_use]
    pub fn accepts(&self, url: &str) -> bool {
        if !self.scope.admits(url) {
            return false;
        }
        if self.whitelist.iter().any(|re| re.is_match(url)) {
            return true;
        }
        if !self.whitelist.is_empty() {
            return false;
        }
        !self.blacklist.iter().any(|re| re.is_match(url))
    }
}

/// Compiles case-insensitive patterns, skipping malformed ones.
fn compile_patterns(patterns: &[String], which: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(list = which, pattern = %pattern, error = %err, "Skipping malformed pattern");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

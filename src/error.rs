//! Error types for the crawl engine.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`].
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidRoot`] |
//! | Driver | [`Error::Driver`], [`Error::Connection`] |
//! | Page lifecycle | [`Error::Navigation`], [`Error::LoadTimeout`], [`Error::Script`] |
//! | Core invariants | [`Error::Frontier`], [`Error::Filter`] |
//! | Shutdown | [`Error::Cancelled`], [`Error::OutputClosed`] |
//! | External | [`Error::Json`], [`Error::UrlParse`] |
//!
//! Page-lifecycle errors are non-fatal: a worker logs them, abandons the
//! current page and moves on. Core-invariant errors abort the whole crawl.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Crawl configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The root URL could not be parsed or has no host.
    #[error("Invalid root URL: {url}: {message}")]
    InvalidRoot {
        /// The offending root URL.
        url: String,
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// Browser driver reported a failure.
    #[error("Driver error: {message}")]
    Driver {
        /// Description of the driver failure.
        message: String,
    },

    /// Browser connection could not be established or was lost.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Page Lifecycle Errors
    // ========================================================================
    /// Navigation to a URL failed (DNS, refused, aborted).
    #[error("Navigation failed: {url}: {message}")]
    Navigation {
        /// The URL that failed to load.
        url: String,
        /// Description of the navigation failure.
        message: String,
    },

    /// Page did not reach the loaded state within the page timeout.
    #[error("Load timeout after {timeout_ms}ms: {url}")]
    LoadTimeout {
        /// The URL that timed out.
        url: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// In-page JavaScript evaluation failed.
    #[error("Script error: {message}")]
    Script {
        /// Error message from script execution.
        message: String,
    },

    // ========================================================================
    // Core Invariant Errors
    // ========================================================================
    /// Frontier queue invariant violation. Fatal to the crawl.
    #[error("Frontier error: {message}")]
    Frontier {
        /// Description of the broken invariant.
        message: String,
    },

    /// Visited/sent filter invariant violation. Fatal to the crawl.
    #[error("Filter error: {message}")]
    Filter {
        /// Description of the broken invariant.
        message: String,
    },

    // ========================================================================
    // Shutdown Errors
    // ========================================================================
    /// The crawl was cancelled before the operation completed.
    #[error("Crawl cancelled")]
    Cancelled,

    /// The output channel receiver was dropped.
    #[error("Output channel closed")]
    OutputClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON (de)serialization error from driver evaluate results.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid root URL error.
    #[inline]
    pub fn invalid_root(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRoot {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a driver error.
    #[inline]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    #[inline]
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a load timeout error.
    #[inline]
    pub fn load_timeout(url: impl Into<String>, timeout_ms: u64) -> Self {
        Self::LoadTimeout {
            url: url.into(),
            timeout_ms,
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates a frontier invariant error.
    #[inline]
    pub fn frontier(message: impl Into<String>) -> Self {
        Self::Frontier {
            message: message.into(),
        }
    }

    /// Creates a filter invariant error.
    #[inline]
    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error aborts the whole crawl.
    ///
    /// Only broken core guarantees are fatal; everything page-scoped is
    /// logged and skipped.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Frontier { .. } | Self::Filter { .. })
    }

    /// Returns `true` if this error is scoped to a single page and the
    /// worker should abandon the item and continue.
    #[inline]
    #[must_use]
    pub fn is_page_error(&self) -> bool {
        matches!(
            self,
            Self::Navigation { .. } | Self::LoadTimeout { .. } | Self::Script { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoadTimeout { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

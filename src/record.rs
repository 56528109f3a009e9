//! Captured traffic records.
//!
//! Every observation the crawl emits flows through one type:
//! [`TrafficRecord`]. Full request/response exchanges captured by the
//! hijack sink are [`RecordKind::Exchange`]; URLs recovered from
//! JavaScript bodies, SPA event clicks and multipart uploads are the
//! lighter-weight kinds.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// RecordKind
// ============================================================================

/// Origin of a captured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A full wire-level request/response exchange.
    Exchange,

    /// A URL literal extracted from a JavaScript response body.
    JsUrl,

    /// A URL reached by clicking an event-listener element (SPA fallback).
    EventUrl,

    /// A multipart/form-data upload observed in-flight (body not captured).
    FileUpload,
}

// ============================================================================
// TrafficRecord
// ============================================================================

/// One captured request/response observation.
///
/// Pushed to the crawl's output channel. For non-[`Exchange`] kinds the
/// response fields are empty.
///
/// [`Exchange`]: RecordKind::Exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRecord {
    /// What produced this record.
    pub kind: RecordKind,

    /// HTTP method. Synthetic for non-exchange kinds (`"JS GET"`,
    /// `"EVENT GET"`).
    pub method: String,

    /// Final request URL (redirect hops are separate records).
    pub url: String,

    /// URL of the page that produced this record, if known.
    pub from: Option<String>,

    /// Response status code, if a response was observed.
    pub status: Option<u16>,

    /// Request headers as sent (after injection).
    pub request_headers: Vec<(String, String)>,

    /// Response headers as received.
    pub response_headers: Vec<(String, String)>,

    /// Request body, if present.
    pub request_body: Option<Vec<u8>>,

    /// Response body, if present.
    pub response_body: Option<Vec<u8>>,
}

// ============================================================================
// TrafficRecord - Constructors
// ============================================================================

impl TrafficRecord {
    /// Creates a full exchange record.
    #[must_use]
    pub fn exchange(
        method: impl Into<String>,
        url: impl Into<String>,
        from: Option<String>,
        status: u16,
    ) -> Self {
        Self {
            kind: RecordKind::Exchange,
            method: method.into(),
            url: url.into(),
            from,
            status: Some(status),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: None,
            response_body: None,
        }
    }

    /// Creates a record for a URL literal found in a JavaScript body.
    #[must_use]
    pub fn js_url(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::JsUrl,
            method: "JS GET".to_string(),
            url: url.into(),
            from: Some(from.into()),
            status: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: None,
            response_body: None,
        }
    }

    /// Creates a record for a URL reached via an event-listener click.
    #[must_use]
    pub fn event_url(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::EventUrl,
            method: "EVENT GET".to_string(),
            url: url.into(),
            from: Some(from.into()),
            status: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: None,
            response_body: None,
        }
    }

    /// Creates a record for an observed multipart upload.
    #[must_use]
    pub fn file_upload(
        method: impl Into<String>,
        url: impl Into<String>,
        from: Option<String>,
    ) -> Self {
        Self {
            kind: RecordKind::FileUpload,
            method: method.into(),
            url: url.into(),
            from,
            status: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: None,
            response_body: None,
        }
    }
}

// ============================================================================
// TrafficRecord - Builder Methods
// ============================================================================

impl TrafficRecord {
    /// Attaches request headers.
    #[inline]
    #[must_use]
    pub fn with_request_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.request_headers = headers;
        self
    }

    /// Attaches response headers.
    #[inline]
    #[must_use]
    pub fn with_response_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.response_headers = headers;
        self
    }

    /// Attaches the request body.
    #[inline]
    #[must_use]
    pub fn with_request_body(mut self, body: Vec<u8>) -> Self {
        self.request_body = Some(body);
        self
    }

    /// Attaches the response body.
    #[inline]
    #[must_use]
    pub fn with_response_body(mut self, body: Vec<u8>) -> Self {
        self.response_body = Some(body);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_record() {
        let record = TrafficRecord::exchange(
            "GET",
            "http://a.com/api",
            Some("http://a.com/".to_string()),
            200,
        )
        .with_response_body(b"ok".to_vec());

        assert_eq!(record.kind, RecordKind::Exchange);
        assert_eq!(record.status, Some(200));
        assert_eq!(record.response_body.as_deref(), Some(b"ok".as_slice()));
    }

    #[test]
    fn test_js_url_record_method() {
        let record = TrafficRecord::js_url("http://a.com/api/list", "http://a.com/app.js");
        assert_eq!(record.kind, RecordKind::JsUrl);
        assert_eq!(record.method, "JS GET");
        assert!(record.status.is_none());
    }

    #[test]
    fn test_event_url_record_method() {
        let record = TrafficRecord::event_url("http://a.com/next", "http://a.com/");
        assert_eq!(record.method, "EVENT GET");
        assert_eq!(record.from.as_deref(), Some("http://a.com/"));
    }

    #[test]
    fn test_serde_round_trip() {
        let record = TrafficRecord::exchange("POST", "http://a.com/login", None, 302);
        let json = serde_json::to_string(&record).expect("serialize");
        let back: TrafficRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.kind, RecordKind::Exchange);
        assert_eq!(back.method, "POST");
        assert_eq!(back.status, Some(302));
    }
}

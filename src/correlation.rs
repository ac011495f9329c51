//! Request correlation cache.
//!
//! Remembers the origin of in-flight requests between the request-sent and
//! response-received events so the `HTTP_ORIGIN` placeholder can be resolved.
//! Entries expire a fixed TTL after they are recorded; expired entries are
//! swept as a side effect of every lookup.

use crate::config::DEFAULT_CORRELATION_TTL_MS;
use crate::context::Header;
use tracing::trace;

/// Origin recorded for an in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub request_id: String,
    pub origin: String,
    /// Host timestamp (ms) after which the entry may be swept
    pub expires_at: f64,
}

/// Short-lived request id to origin cache.
#[derive(Debug, Clone)]
pub struct CorrelationCache {
    ttl_ms: i64,
    pending: Vec<PendingRequest>,
}

impl Default for CorrelationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_TTL_MS)
    }
}

impl CorrelationCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            pending: Vec::new(),
        }
    }

    /// Record the origin of a request observed at `timestamp`.
    pub fn record(&mut self, request_id: &str, origin: &str, timestamp: f64) {
        let expires_at = timestamp + self.ttl_ms as f64;
        trace!(request_id, origin, expires_at, "Recording request origin");

        self.pending.push(PendingRequest {
            request_id: request_id.to_string(),
            origin: origin.to_string(),
            expires_at,
        });
    }

    /// Remove and return the entry for `request_id`, dropping every other
    /// entry that expired before `timestamp`.
    ///
    /// The matching entry is returned whether or not it has expired. When a
    /// request was recorded several times (redirects resend headers under the
    /// same id) the most recent entry is returned and all of them are removed.
    pub fn take_and_sweep(&mut self, request_id: &str, timestamp: f64) -> Option<PendingRequest> {
        let mut found = None;
        let mut swept = 0usize;

        let retained: Vec<PendingRequest> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|entry| {
                if entry.request_id == request_id {
                    found = Some(entry);
                    None
                } else if entry.expires_at < timestamp {
                    swept += 1;
                    None
                } else {
                    Some(entry)
                }
            })
            .collect();

        self.pending = retained;

        trace!(
            request_id,
            found = found.is_some(),
            swept,
            remaining = self.pending.len(),
            "Correlation lookup"
        );

        found
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }
}

/// Find the origin signal in an outbound header set.
///
/// An `Origin` header ends the scan; otherwise the last `Referer` seen is
/// used. Names are compared exactly. An empty value counts as no signal.
pub fn origin_signal(headers: &[Header]) -> Option<&str> {
    let mut origin = None;

    for header in headers {
        if header.name == "Origin" {
            origin = Some(header.value.as_str());
            break;
        }
        if header.name == "Referer" {
            origin = Some(header.value.as_str());
        }
    }

    origin.filter(|o| !o.is_empty())
}

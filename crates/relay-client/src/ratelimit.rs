//! Advisory rate-limit tracking
//!
//! Process-wide snapshot of the last `x-ratelimit-*` headers seen on a
//! response. Purely advisory: the client never decrements it locally and
//! never throttles proactively — it only refuses to send once a known
//! exhaustion has not yet reset. A response missing any of the three
//! headers leaves the previous snapshot untouched.

use reqwest::header::HeaderMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Last observed rate-limit window. `reset_at` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

/// Process-wide advisory rate-limit cell.
///
/// A std Mutex is enough here: no await ever happens under the lock.
#[derive(Debug, Default)]
pub struct RateLimitState {
    inner: Mutex<Option<RateLimitSnapshot>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the snapshot from response headers, best-effort.
    /// All three headers must parse; otherwise the prior state stands.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let (Some(limit), Some(remaining), Some(reset_at)) = (
            header_u64(headers, LIMIT_HEADER),
            header_u64(headers, REMAINING_HEADER),
            header_u64(headers, RESET_HEADER),
        ) else {
            return;
        };

        debug!(limit, remaining, reset_at, "rate limit state updated");
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(RateLimitSnapshot {
            limit,
            remaining,
            reset_at,
        });
    }

    /// Seconds until reset when exhaustion is currently known, else `None`.
    ///
    /// Returns `None` once the reset time has passed — the gate opens
    /// optimistically and the next response re-establishes the state.
    pub fn blocked_for_secs(&self) -> Option<u64> {
        let snapshot = (*self.inner.lock().unwrap_or_else(|e| e.into_inner()))?;
        if snapshot.remaining > 0 {
            return None;
        }
        let now = now_secs();
        if snapshot.reset_at > now {
            Some(snapshot.reset_at - now)
        } else {
            None
        }
    }

    /// Last observed snapshot, if any.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

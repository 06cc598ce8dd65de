//! gateway::rate_limit
//!
//! Last-seen rate-limit window for the GitHub API.
//!
//! The state is owned exclusively by the gateway and updated from the
//! `x-ratelimit-*` headers of every response. Other components see it
//! only through the gateway's read-only accessor.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Last-seen quota window for the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// Unix epoch seconds when the window resets.
    pub reset_epoch: u64,
    /// Requests used in the current window.
    pub used: u32,
}

impl Default for RateLimitState {
    fn default() -> Self {
        // Unauthenticated default until the first response arrives
        Self {
            limit: 60,
            remaining: 60,
            reset_epoch: 0,
            used: 0,
        }
    }
}

impl RateLimitState {
    /// Update from response headers. Headers that are absent or
    /// unparsable leave the corresponding field untouched.
    pub fn update_from_headers(&mut self, headers: &reqwest::header::HeaderMap) {
        if let Some(limit) = header_u64(headers, "x-ratelimit-limit") {
            self.limit = limit as u32;
        }
        if let Some(remaining) = header_u64(headers, "x-ratelimit-remaining") {
            self.remaining = remaining as u32;
        }
        if let Some(reset) = header_u64(headers, "x-ratelimit-reset") {
            self.reset_epoch = reset;
        }
        if let Some(used) = header_u64(headers, "x-ratelimit-used") {
            self.used = used as u32;
        }
    }

    /// True when the window is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// How long to wait until the window resets, plus one second of
    /// slack. Zero when the reset is already in the past.
    pub fn wait_until_reset(&self) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        if self.reset_epoch > now {
            Duration::from_secs(self.reset_epoch - now + 1)
        } else {
            Duration::ZERO
        }
    }
}

fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers_of(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn updates_all_fields_from_headers() {
        let mut state = RateLimitState::default();
        state.update_from_headers(&headers_of(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4999"),
            ("x-ratelimit-reset", "1700000000"),
            ("x-ratelimit-used", "1"),
        ]));
        assert_eq!(state.limit, 5000);
        assert_eq!(state.remaining, 4999);
        assert_eq!(state.reset_epoch, 1700000000);
        assert_eq!(state.used, 1);
    }

    #[test]
    fn missing_headers_leave_fields_alone() {
        let mut state = RateLimitState {
            limit: 5000,
            remaining: 10,
            reset_epoch: 42,
            used: 4990,
        };
        state.update_from_headers(&HeaderMap::new());
        assert_eq!(state.remaining, 10);
        assert_eq!(state.reset_epoch, 42);
    }

    #[test]
    fn exhaustion_and_wait() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let state = RateLimitState {
            limit: 5000,
            remaining: 0,
            reset_epoch: now + 10,
            used: 5000,
        };
        assert!(state.is_exhausted());
        let wait = state.wait_until_reset();
        // reset + 1s slack, minus scheduling noise
        assert!(wait >= Duration::from_secs(9));
        assert!(wait <= Duration::from_secs(12));

        let past = RateLimitState {
            reset_epoch: now.saturating_sub(100),
            remaining: 0,
            ..state
        };
        assert_eq!(past.wait_until_reset(), Duration::ZERO);
    }
}

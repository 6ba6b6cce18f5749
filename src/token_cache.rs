// 🔑 Access token cache for the bank-aggregation API
// Owned by the one service that talks to the API; refreshed lazily on expiry.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

/// Seconds shaved off the advertised lifetime so a token is never used
/// right at its expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TokenCache {
    cached: Option<CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token if still valid at `now`.
    pub fn get(&self, now: DateTime<Utc>) -> Option<&str> {
        self.cached
            .as_ref()
            .filter(|c| now < c.expires_at)
            .map(|c| c.token.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.as_ref().map(|c| c.expires_at)
    }

    /// Store a token the API says lives for `expires_in_secs`.
    pub fn store(&mut self, token: String, expires_in_secs: i64, now: DateTime<Utc>) {
        let lifetime = (expires_in_secs - EXPIRY_MARGIN_SECS).max(0);
        self.cached = Some(CachedToken {
            token,
            expires_at: now + Duration::seconds(lifetime),
        });
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Return the cached token, or call `refresh` for a new
    /// `(token, expires_in_secs)` pair and cache it.
    ///
    /// A failed refresh leaves the cache empty.
    pub fn get_or_refresh<F>(&mut self, now: DateTime<Utc>, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Result<(String, i64)>,
    {
        if let Some(token) = self.get(now) {
            return Ok(token.to_string());
        }

        self.cached = None;
        let (token, expires_in) = refresh().context("Failed to refresh access token")?;
        tracing::debug!(expires_in, "access token refreshed");
        self.store(token.clone(), expires_in, now);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_refreshes_once_until_expiry() {
        let mut cache = TokenCache::new();
        let calls = Cell::new(0);
        let refresh = || {
            calls.set(calls.get() + 1);
            Ok((format!("token-{}", calls.get()), 3_600))
        };

        assert_eq!(cache.get_or_refresh(t0(), refresh).unwrap(), "token-1");
        assert_eq!(cache.get_or_refresh(t0() + Duration::minutes(30), refresh).unwrap(), "token-1");
        assert_eq!(calls.get(), 1);

        // 3600s lifetime minus the 60s margin
        assert_eq!(cache.expires_at(), Some(t0() + Duration::seconds(3_540)));
        assert_eq!(cache.get_or_refresh(t0() + Duration::seconds(3_540), refresh).unwrap(), "token-2");
        assert_eq!(calls.get(), 2);

        println!("✅ Token cache refreshed {} times", calls.get());
    }

    #[test]
    fn test_failed_refresh_leaves_cache_empty() {
        let mut cache = TokenCache::new();
        cache.store("old".to_string(), 120, t0());

        let later = t0() + Duration::minutes(5);
        let result = cache.get_or_refresh(later, || Err(anyhow::anyhow!("auth failed: 401")));

        assert!(result.is_err());
        assert_eq!(cache.get(later), None);
        assert_eq!(cache.expires_at(), None);
    }

    #[test]
    fn test_short_lifetime_never_negative() {
        let mut cache = TokenCache::new();
        cache.store("tiny".to_string(), 30, t0());
        assert_eq!(cache.expires_at(), Some(t0()));
        assert_eq!(cache.get(t0()), None);

        cache.store("fresh".to_string(), 600, t0());
        assert_eq!(cache.get(t0()), Some("fresh"));
        cache.invalidate();
        assert_eq!(cache.get(t0()), None);
    }
}

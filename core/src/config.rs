//! Plain-data request configuration.
//!
//! [`RequestConfig`] holds every option that can be written down as data.
//! It deserializes from the conventional JSON shape (camelCase keys,
//! durations in milliseconds, `-1` meaning "never" / "unlimited"):
//!
//! ```
//! use reqflow_core::config::{Expiry, RequestConfig, RetryLimit};
//! use std::time::Duration;
//!
//! let config: RequestConfig = serde_json::from_str(
//!     r#"{ "cacheKey": "user:1", "staleTime": -1, "retryCount": 3, "pollingInterval": 500 }"#,
//! ).unwrap();
//!
//! assert_eq!(config.stale_time, Expiry::Never);
//! assert_eq!(config.retry_count, Some(RetryLimit::Limited(3)));
//! assert_eq!(config.polling_interval, Some(Duration::from_millis(500)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default time a cache entry survives before eviction.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

/// Default minimum gap between two focus-triggered refreshes.
pub const DEFAULT_FOCUS_TIMESPAN: Duration = Duration::from_secs(5);

/// Opaque identifier grouping requests that share cached data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<i64> for CacheKey {
    fn from(key: i64) -> Self {
        Self(key.to_string())
    }
}

impl From<u64> for CacheKey {
    fn from(key: u64) -> Self {
        Self(key.to_string())
    }
}

/// How long something stays valid.
///
/// Serialized as milliseconds; any negative number means [`Expiry::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Expiry {
    /// Valid while younger than (or exactly as old as) the duration.
    After(Duration),
    /// Valid forever.
    Never,
}

impl Expiry {
    /// `true` when something of the given age is still valid.
    #[must_use]
    pub fn covers(self, age: Duration) -> bool {
        match self {
            Self::After(limit) => age <= limit,
            Self::Never => true,
        }
    }

    /// The finite duration, if any.
    #[must_use]
    pub const fn duration(self) -> Option<Duration> {
        match self {
            Self::After(limit) => Some(limit),
            Self::Never => None,
        }
    }
}

impl From<i64> for Expiry {
    fn from(millis: i64) -> Self {
        u64::try_from(millis).map_or(Self::Never, |ms| Self::After(Duration::from_millis(ms)))
    }
}

impl From<Expiry> for i64 {
    fn from(expiry: Expiry) -> Self {
        match expiry {
            Expiry::After(limit) => i64::try_from(limit.as_millis()).unwrap_or(i64::MAX),
            Expiry::Never => -1,
        }
    }
}

impl From<Duration> for Expiry {
    fn from(limit: Duration) -> Self {
        Self::After(limit)
    }
}

/// Upper bound on a counter of consecutive failures.
///
/// Serialized as an integer; any negative number means [`RetryLimit::Unlimited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RetryLimit {
    /// At most this many.
    Limited(u32),
    /// No bound.
    Unlimited,
}

impl RetryLimit {
    /// `true` while `count` is within the bound.
    #[must_use]
    pub const fn allows(self, count: u32) -> bool {
        match self {
            Self::Limited(limit) => count <= limit,
            Self::Unlimited => true,
        }
    }

    /// A zero limit turns the feature off.
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        matches!(self, Self::Limited(0))
    }
}

impl From<i64> for RetryLimit {
    fn from(count: i64) -> Self {
        if count < 0 {
            Self::Unlimited
        } else {
            Self::Limited(u32::try_from(count).unwrap_or(u32::MAX))
        }
    }
}

impl From<RetryLimit> for i64 {
    fn from(limit: RetryLimit) -> Self {
        match limit {
            RetryLimit::Limited(count) => Self::from(count),
            RetryLimit::Unlimited => -1,
        }
    }
}

impl From<u32> for RetryLimit {
    fn from(count: u32) -> Self {
        Self::Limited(count)
    }
}

/// Every data-only option a request controller recognizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)] // mirrors the option surface one to one
pub struct RequestConfig {
    /// Do not run automatically; wait for an explicit `run`.
    pub manual: bool,
    /// While `false`, every run is vetoed.
    pub ready: bool,

    /// Enables the cache plugin.
    pub cache_key: Option<CacheKey>,
    /// How long a cache entry lives before eviction.
    pub cache_time: Expiry,
    /// How long a cache entry counts as fresh.
    pub stale_time: Expiry,

    /// Enables polling.
    #[serde(with = "opt_millis")]
    pub polling_interval: Option<Duration>,
    /// Keep polling while the page is hidden.
    pub polling_when_hidden: bool,
    /// Consecutive failures after which polling stops.
    pub polling_error_retry_count: RetryLimit,

    /// Enables retry on failure.
    pub retry_count: Option<RetryLimit>,
    /// Fixed retry delay; exponential backoff when unset.
    #[serde(with = "opt_millis")]
    pub retry_interval: Option<Duration>,

    /// Enables debouncing of runs.
    #[serde(with = "opt_millis")]
    pub debounce_wait: Option<Duration>,
    /// Invoke on the leading edge of a debounce window.
    pub debounce_leading: Option<bool>,
    /// Invoke on the trailing edge of a debounce window.
    pub debounce_trailing: Option<bool>,
    /// Longest a debounced run may be deferred.
    #[serde(with = "opt_millis")]
    pub debounce_max_wait: Option<Duration>,

    /// Enables throttling of runs.
    #[serde(with = "opt_millis")]
    pub throttle_wait: Option<Duration>,
    /// Invoke on the leading edge of a throttle window.
    pub throttle_leading: Option<bool>,
    /// Invoke on the trailing edge of a throttle window.
    pub throttle_trailing: Option<bool>,

    /// Delay before `loading` flips to `true`.
    #[serde(with = "opt_millis")]
    pub loading_delay: Option<Duration>,

    /// Refresh when the window regains focus or becomes visible.
    pub refresh_on_window_focus: bool,
    /// Minimum gap between two focus-triggered refreshes.
    #[serde(with = "millis")]
    pub focus_timespan: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            manual: false,
            ready: true,
            cache_key: None,
            cache_time: Expiry::After(DEFAULT_CACHE_TIME),
            stale_time: Expiry::After(Duration::ZERO),
            polling_interval: None,
            polling_when_hidden: true,
            polling_error_retry_count: RetryLimit::Unlimited,
            retry_count: None,
            retry_interval: None,
            debounce_wait: None,
            debounce_leading: None,
            debounce_trailing: None,
            debounce_max_wait: None,
            throttle_wait: None,
            throttle_leading: None,
            throttle_trailing: None,
            loading_delay: None,
            refresh_on_window_focus: false,
            focus_timespan: DEFAULT_FOCUS_TIMESPAN,
        }
    }
}

/// An option combination that is accepted but probably not what was meant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `retry_interval` without `retry_count` does nothing.
    #[error("retryInterval is set but retryCount is not; retries are disabled")]
    RetryIntervalWithoutCount,

    /// Entries are evicted before they ever become stale.
    #[error("staleTime ({stale:?}) exceeds cacheTime ({cache:?}); entries are evicted while still fresh")]
    StaleOutlivesCache {
        /// Configured stale time.
        stale: Expiry,
        /// Configured cache time.
        cache: Expiry,
    },

    /// Both rate limiters wrap the run entry point.
    #[error("both debounceWait and throttleWait are set; runs are debounced and then throttled")]
    DebounceAndThrottle,

    /// Cache-only options without a cache key.
    #[error("staleTime/cacheTime are set but cacheKey is not; caching is disabled")]
    CacheOptionsWithoutKey,
}

impl RequestConfig {
    /// Option combinations worth a warning.
    #[must_use]
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        if self.retry_interval.is_some() && self.retry_count.is_none() {
            warnings.push(ConfigWarning::RetryIntervalWithoutCount);
        }

        if let (Some(_), Some(cache), Expiry::After(stale)) =
            (&self.cache_key, self.cache_time.duration(), self.stale_time)
        {
            if stale > cache {
                warnings.push(ConfigWarning::StaleOutlivesCache {
                    stale: self.stale_time,
                    cache: self.cache_time,
                });
            }
        }

        if self.debounce_wait.is_some() && self.throttle_wait.is_some() {
            warnings.push(ConfigWarning::DebounceAndThrottle);
        }

        if self.cache_key.is_none()
            && (self.cache_time != defaults.cache_time || self.stale_time != defaults.stale_time)
        {
            warnings.push(ConfigWarning::CacheOptionsWithoutKey);
        }

        warnings
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)] // serde `with` signature
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    /// Zero counts as unset, like a falsy interval.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RequestConfig::default();

        assert!(config.ready);
        assert!(!config.manual);
        assert_eq!(config.cache_time, Expiry::After(Duration::from_secs(300)));
        assert_eq!(config.stale_time, Expiry::After(Duration::ZERO));
        assert_eq!(config.polling_error_retry_count, RetryLimit::Unlimited);
        assert!(config.polling_when_hidden);
        assert_eq!(config.focus_timespan, Duration::from_secs(5));
    }

    #[test]
    fn parses_camel_case_json() {
        let config: RequestConfig = serde_json::from_str(
            r#"{
                "manual": true,
                "cacheKey": "todos",
                "cacheTime": -1,
                "staleTime": 100,
                "pollingInterval": 0,
                "pollingErrorRetryCount": 2,
                "retryCount": -1,
                "debounceWait": 300,
                "debounceLeading": true,
                "focusTimespan": 1000
            }"#,
        )
        .unwrap();

        assert!(config.manual);
        assert_eq!(config.cache_key, Some(CacheKey::from("todos")));
        assert_eq!(config.cache_time, Expiry::Never);
        assert_eq!(config.stale_time, Expiry::After(Duration::from_millis(100)));
        assert_eq!(config.polling_interval, None);
        assert_eq!(config.polling_error_retry_count, RetryLimit::Limited(2));
        assert_eq!(config.retry_count, Some(RetryLimit::Unlimited));
        assert_eq!(config.debounce_wait, Some(Duration::from_millis(300)));
        assert_eq!(config.debounce_leading, Some(true));
        assert_eq!(config.focus_timespan, Duration::from_secs(1));
    }

    #[test]
    fn serializes_back_to_millis() {
        let config = RequestConfig {
            cache_time: Expiry::Never,
            retry_interval: Some(Duration::from_millis(250)),
            ..RequestConfig::default()
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cacheTime"], -1);
        assert_eq!(json["retryInterval"], 250);
        assert_eq!(json["focusTimespan"], 5000);
    }

    #[test]
    fn warns_about_inert_options() {
        let config = RequestConfig {
            retry_interval: Some(Duration::from_secs(1)),
            debounce_wait: Some(Duration::from_millis(10)),
            throttle_wait: Some(Duration::from_millis(10)),
            ..RequestConfig::default()
        };

        let warnings = config.warnings();
        assert!(warnings.contains(&ConfigWarning::RetryIntervalWithoutCount));
        assert!(warnings.contains(&ConfigWarning::DebounceAndThrottle));
    }

    #[test]
    fn warns_when_fresh_entries_are_evicted() {
        let config = RequestConfig {
            cache_key: Some("k".into()),
            cache_time: Expiry::After(Duration::from_millis(50)),
            stale_time: Expiry::After(Duration::from_millis(500)),
            ..RequestConfig::default()
        };

        assert!(matches!(
            config.warnings().as_slice(),
            [ConfigWarning::StaleOutlivesCache { .. }]
        ));
        assert!(RequestConfig::default().warnings().is_empty());
    }

    #[test]
    fn retry_limit_bounds() {
        assert!(RetryLimit::Limited(2).allows(2));
        assert!(!RetryLimit::Limited(2).allows(3));
        assert!(RetryLimit::Unlimited.allows(u32::MAX));
        assert!(RetryLimit::Limited(0).is_disabled());
    }

    proptest! {
        #[test]
        fn expiry_roundtrips_through_millis(ms in 0i64..10_000_000) {
            let expiry = Expiry::from(ms);
            prop_assert_eq!(i64::from(expiry), ms);
            prop_assert!(expiry.covers(Duration::from_millis(u64::try_from(ms).unwrap())));
        }

        #[test]
        fn negative_millis_never_expire(ms in i64::MIN..0, age in any::<u64>()) {
            let expiry = Expiry::from(ms);
            prop_assert_eq!(expiry, Expiry::Never);
            prop_assert!(expiry.covers(Duration::from_millis(age)));
        }
    }
}

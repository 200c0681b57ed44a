//! Built-in policies.
//!
//! Each module is one [`Plugin`](reqflow_core::plugin::Plugin). The
//! controller registers them in this order:
//!
//! | # | Plugin | Registered when |
//! |---|--------|-----------------|
//! | 1 | [`RateLimitPlugin`] (debounce) | always; inert without a wait |
//! | 2 | [`LoadingDelayPlugin`] | `loading_delay` is set |
//! | 3 | [`PollingPlugin`] | always; inert without an interval |
//! | 4 | [`FocusPlugin`] | `refresh_on_window_focus` |
//! | 5 | [`RateLimitPlugin`] (throttle) | always; inert without a wait |
//! | 6 | [`AutoRunPlugin`] | always |
//! | 7 | [`CachePlugin`] | `cache_key` is set |
//! | 8 | [`RetryPlugin`] | `retry_count` is set and non-zero |

pub mod auto_run;
pub mod cache;
pub mod focus;
pub mod loading_delay;
pub mod polling;
pub mod rate_limit;
pub mod retry;

pub use auto_run::AutoRunPlugin;
pub use cache::CachePlugin;
pub use focus::FocusPlugin;
pub use loading_delay::LoadingDelayPlugin;
pub use polling::PollingPlugin;
pub use rate_limit::{RateLimitKind, RateLimitPlugin};
pub use retry::{RetryPlugin, RetryPolicy};

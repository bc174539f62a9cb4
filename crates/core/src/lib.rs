//! Domain types and long-lived state for the chat gateway.
//!
//! Nothing in this crate performs network I/O. Vendor adapters and the
//! provider chain live in `chatgate-agent`; the HTTP front end lives in
//! `chatgate-server`.

pub mod cache;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod provider;
pub mod rate_limit;
pub mod request;
pub mod usage;

pub use cache::{cache_key, ResponseCache};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use errors::{AttemptFailure, ChainExhausted, GatewayError};
pub use provider::{resolve_order, ProviderAdapter, ProviderError, ProviderKind, CANONICAL_ORDER};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use request::{AssistRequest, Locale, ProviderCredentials, RequestContext, RequestSettings};
pub use usage::{
    InMemoryUsageSink, TracingUsageSink, UsageLogEntry, UsageRecorder, UsageSink, UsageSinkError,
};

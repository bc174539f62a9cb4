//! Vendor-facing half of the gateway.
//!
//! - `providers` - one adapter per vendor envelope (Claude, OpenAI, Gemini)
//! - `prompt` - the instruction block every vendor receives
//! - `chain` - sequential failover with caching and usage recording
//!
//! Vendors only ever translate a prompt into text. Rate limiting, request
//! validation and fallback wording are decided elsewhere.

pub mod chain;
pub mod prompt;
pub mod providers;

pub use chain::{ChainSuccess, ProviderChain};
pub use prompt::build_prompt;

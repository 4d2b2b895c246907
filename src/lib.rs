//! Analytics event logger — Rust SDK
//!
//! Sends named events with typed parameters to a logging endpoint over HTTP.
//! Ordinary events are sent synchronously and report failures; discreet
//! events are sent on a background thread on a best-effort basis. Requests
//! carry the API key and, when a secret key is set, an HMAC-SHA256 signature.
//!
//! ```no_run
//! use gae_analytics::{AnalyticsLogger, Options, Parameters};
//!
//! let logger = AnalyticsLogger::with_options(Options::with_endpoints(
//!     "key123",
//!     "https://analytics.example.com/log",
//!     "https://analytics.example.com/log/event",
//! ))?;
//!
//! let mut params = Parameters::new();
//! params.insert("item".into(), "sword".into());
//! params.insert("price".into(), 9.99.into());
//! logger.log_event("purchase", &params, false)?;
//! # Ok::<(), gae_analytics::LoggerError>(())
//! ```

mod client;
mod endpoint;
mod error;
mod signing;
mod types;

pub use client::AnalyticsLogger;
pub use endpoint::validate_endpoint;
pub use error::{LoggerError, Result};
pub use signing::sign_body;
pub use types::{
    ErrorCallback, Event, LoggerConfig, Options, ParamValue, Parameters, SessionRecord,
    DEFAULT_BASIC_EVENTS_URL, DEFAULT_EVENTS_URL,
};

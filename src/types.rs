use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LoggerError;

/// Development endpoint for basic (session) analytics records.
pub const DEFAULT_BASIC_EVENTS_URL: &str = "http://localhost:8083/log";
/// Development endpoint for named events.
pub const DEFAULT_EVENTS_URL: &str = "http://localhost:8083/log/event";

/// Callback invoked from the background thread when a discreet send fails.
pub type ErrorCallback = Arc<dyn Fn(&LoggerError) + Send + Sync>;

/// Event parameters, keyed by name.
pub type Parameters = BTreeMap<String, ParamValue>;

/// A single parameter value. Serialized as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Integer(v.into())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Integer(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

/// A named event as it goes over the wire to the events URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub discreet: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_start: Option<String>,
}

/// Basic analytics record sent to the basic events URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_start: String,
    pub timestamp: String,
    pub session_seconds: i64,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Current logger configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerConfig {
    pub api_key: String,
    pub secret_key: String,
    pub basic_events_url: String,
    pub events_url: String,
    /// Set when the logger is initialized; `None` before that.
    pub start_time: Option<DateTime<Utc>>,
    pub debug: bool,
}

/// Construction-time options for [`AnalyticsLogger::with_options`](crate::AnalyticsLogger::with_options).
pub struct Options {
    /// API key sent with every request (required).
    pub api_key: String,
    /// Key for the `x-signature` request HMAC. Empty disables signing.
    pub secret_key: String,
    /// URL for basic session records. Default: [`DEFAULT_BASIC_EVENTS_URL`].
    pub basic_events_url: String,
    /// URL for named events. Default: [`DEFAULT_EVENTS_URL`].
    pub events_url: String,
    /// Enable debug logging through the `log` facade.
    pub debug: bool,
    /// Per-request timeout. Default: 5s.
    pub timeout: Duration,
    /// Discreet sends that may wait for the background thread before new
    /// ones are dropped. Default: 1,000.
    pub queue_capacity: usize,
    /// Optional callback for failures of discreet sends.
    pub on_error: Option<ErrorCallback>,
}

impl Options {
    /// Options with the built-in development endpoints.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoints(api_key, DEFAULT_BASIC_EVENTS_URL, DEFAULT_EVENTS_URL)
    }

    /// Options with caller-supplied endpoints; all other fields use defaults.
    pub fn with_endpoints(
        api_key: impl Into<String>,
        basic_events_url: impl Into<String>,
        events_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: String::new(),
            basic_events_url: basic_events_url.into(),
            events_url: events_url.into(),
            debug: false,
            timeout: Duration::from_secs(5),
            queue_capacity: 1_000,
            on_error: None,
        }
    }
}

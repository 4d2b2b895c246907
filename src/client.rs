use crate::endpoint::validate_endpoint;
use crate::error::{LoggerError, Result};
use crate::signing::sign_body;
use crate::types::{
    ErrorCallback, Event, LoggerConfig, Options, ParamValue, Parameters, SessionRecord,
    DEFAULT_BASIC_EVENTS_URL, DEFAULT_EVENTS_URL,
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_EVENT_NAME_LENGTH: usize = 256;
const MAX_BODY_BYTES: usize = 65_536;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_QUEUE_CAPACITY: usize = 1_000;
const SDK_HEADER: &str = concat!("rust/", env!("CARGO_PKG_VERSION"));
const LOG_TARGET: &str = "gae_analytics";

static DEFAULT_INSTANCE: OnceLock<AnalyticsLogger> = OnceLock::new();

/// Analytics event logger.
///
/// Holds the API key, secret key and endpoint URLs, and sends each logged
/// event to the events URL as one HTTP POST. Ordinary events are sent
/// synchronously and report failures; discreet events are queued for a
/// single background thread and never report failures to the caller. When
/// that queue is full, new discreet events are dropped.
///
/// Build one at startup with [`AnalyticsLogger::with_options`] and share it
/// by reference. [`AnalyticsLogger::default_instance`] exists for code that
/// wants a single process-wide logger instead. Re-initializing a logger while
/// other threads are logging through it is not supported.
pub struct AnalyticsLogger {
    config: RwLock<LoggerConfig>,
    agent: ureq::Agent,
    on_error: RwLock<Option<ErrorCallback>>,
    queue_capacity: usize,
    // Started on the first discreet send
    worker: Mutex<Option<Worker>>,
}

/// Background sender for discreet requests.
struct Worker {
    jobs: SyncSender<Job>,
    handle: JoinHandle<()>,
}

enum Job {
    Send {
        request: OutboundRequest,
        debug: bool,
        on_error: Option<ErrorCallback>,
    },
    // Acknowledged once every job queued before it is done
    Flush(mpsc::Sender<()>),
}

/// A fully prepared request; built on the caller's thread.
struct OutboundRequest {
    url: String,
    api_key: String,
    signature: Option<String>,
    body: Vec<u8>,
}

impl AnalyticsLogger {
    /// An uninitialized logger. Call [`initialize`](Self::initialize) before logging.
    pub fn new() -> Self {
        Self::build(DEFAULT_TIMEOUT, DEFAULT_QUEUE_CAPACITY, None)
    }

    /// The process-wide logger, created empty on first access.
    ///
    /// This instance lives in a static and is never dropped, so nothing
    /// waits for its queued discreet sends at exit. Call
    /// [`flush`](Self::flush) before the process ends to deliver them.
    pub fn default_instance() -> &'static AnalyticsLogger {
        DEFAULT_INSTANCE.get_or_init(AnalyticsLogger::new)
    }

    /// Create an initialized logger from options.
    ///
    /// Validates the API key and both endpoint URLs and records the start time.
    pub fn with_options(opts: Options) -> Result<Self> {
        let timeout = if opts.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            opts.timeout
        };
        let queue_capacity = if opts.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            opts.queue_capacity
        };
        let logger = Self::build(timeout, queue_capacity, opts.on_error);
        {
            let mut config = logger.write_config();
            config.secret_key = opts.secret_key;
            config.debug = opts.debug;
        }
        logger.initialize_with_urls(&opts.api_key, &opts.basic_events_url, &opts.events_url)?;
        Ok(logger)
    }

    fn build(timeout: Duration, queue_capacity: usize, on_error: Option<ErrorCallback>) -> Self {
        Self {
            config: RwLock::new(LoggerConfig::default()),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            on_error: RwLock::new(on_error),
            queue_capacity,
            worker: Mutex::new(None),
        }
    }

    /// Set the API key, reset both URLs to the development defaults and
    /// record the start time.
    pub fn initialize(&self, api_key: &str) -> Result<()> {
        self.initialize_with_urls(api_key, DEFAULT_BASIC_EVENTS_URL, DEFAULT_EVENTS_URL)
    }

    /// Like [`initialize`](Self::initialize) with caller-supplied endpoints.
    pub fn initialize_with_urls(
        &self,
        api_key: &str,
        basic_events_url: &str,
        events_url: &str,
    ) -> Result<()> {
        validate_api_key(api_key)?;
        let basic_events_url = validate_endpoint(basic_events_url)?;
        let events_url = validate_endpoint(events_url)?;

        let mut config = self.write_config();
        config.api_key = api_key.to_string();
        config.basic_events_url = basic_events_url;
        config.events_url = events_url;
        config.start_time = Some(Utc::now());

        if config.debug {
            log::debug!(
                target: LOG_TARGET,
                "initialized; events -> {}, basic -> {}",
                config.events_url,
                config.basic_events_url
            );
        }
        Ok(())
    }

    /// Send a named event with parameters to the events URL.
    ///
    /// With `discreet` unset the call blocks until the endpoint answers and
    /// returns network failures. With `discreet` set the request is queued
    /// for the background thread and the call returns `Ok(())` straight away;
    /// failures and drops then go to the debug log and the error callback
    /// only. Configuration and event validation errors are returned either
    /// way; a non-finite float parameter is one of those.
    pub fn log_event(&self, name: &str, parameters: &Parameters, discreet: bool) -> Result<()> {
        let config = self.ready_config()?;
        validate_parameters(parameters)?;
        let event = Event {
            name: sanitize_event_name(name)?,
            parameters: parameters.clone(),
            discreet,
            timestamp: format_time(Utc::now()),
            session_start: config.start_time.map(format_time),
        };
        let body = encode_body(&event)?;
        let request = prepare(&config, &config.events_url, body)?;

        if config.debug {
            log::debug!(target: LOG_TARGET, "logging event '{}' (discreet: {discreet})", event.name);
        }
        self.dispatch(request, config.debug, discreet)
    }

    /// Send a basic session record to the basic events URL.
    ///
    /// The record carries the start time, the seconds elapsed since then and
    /// the given parameters. `discreet` behaves as in [`log_event`](Self::log_event).
    pub fn log_session(&self, parameters: &Parameters, discreet: bool) -> Result<()> {
        let config = self.ready_config()?;
        validate_parameters(parameters)?;
        let now = Utc::now();
        let start = config.start_time.unwrap_or(now);
        let record = SessionRecord {
            session_start: format_time(start),
            timestamp: format_time(now),
            session_seconds: (now - start).num_seconds().max(0),
            parameters: parameters.clone(),
        };
        let body = encode_body(&record)?;
        let request = prepare(&config, &config.basic_events_url, body)?;
        self.dispatch(request, config.debug, discreet)
    }

    /// Wait until every discreet send queued so far has been attempted.
    pub fn flush(&self) {
        let jobs = match self.lock_worker().as_ref() {
            Some(worker) => worker.jobs.clone(),
            None => return,
        };
        let (ack, done) = mpsc::channel();
        // Blocks while the queue is full; an error means the thread is gone
        if jobs.send(Job::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LoggerConfig {
        self.read_config().clone()
    }

    pub fn api_key(&self) -> String {
        self.read_config().api_key.clone()
    }

    pub fn set_api_key(&self, api_key: &str) -> Result<()> {
        validate_api_key(api_key)?;
        self.write_config().api_key = api_key.to_string();
        Ok(())
    }

    pub fn secret_key(&self) -> String {
        self.read_config().secret_key.clone()
    }

    /// Set the request signing key. An empty key turns signing off.
    pub fn set_secret_key(&self, secret_key: impl Into<String>) {
        self.write_config().secret_key = secret_key.into();
    }

    pub fn basic_events_url(&self) -> String {
        self.read_config().basic_events_url.clone()
    }

    pub fn set_basic_events_url(&self, url: &str) -> Result<()> {
        let url = validate_endpoint(url)?;
        self.write_config().basic_events_url = url;
        Ok(())
    }

    pub fn events_url(&self) -> String {
        self.read_config().events_url.clone()
    }

    pub fn set_events_url(&self, url: &str) -> Result<()> {
        let url = validate_endpoint(url)?;
        self.write_config().events_url = url;
        Ok(())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.read_config().start_time
    }

    pub fn debug_enabled(&self) -> bool {
        self.read_config().debug
    }

    pub fn set_debug_enabled(&self, debug: bool) {
        self.write_config().debug = debug;
    }

    /// Replace the callback that receives discreet send failures.
    pub fn set_error_callback(&self, on_error: Option<ErrorCallback>) {
        *self
            .on_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = on_error;
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&self, request: OutboundRequest, debug: bool, discreet: bool) -> Result<()> {
        if !discreet {
            return send(&self.agent, &request);
        }

        let on_error = self
            .on_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let job = Job::Send {
            request,
            debug,
            on_error: on_error.clone(),
        };

        // The guard is released before any callback runs
        let failure = {
            let mut worker = self.lock_worker();
            if worker.is_none() {
                match self.spawn_worker() {
                    Ok(started) => *worker = Some(started),
                    Err(e) => {
                        drop(worker);
                        let err =
                            LoggerError::Network(format!("failed to spawn send thread: {e}"));
                        report_discreet_failure(&err, debug, on_error.as_ref());
                        return Ok(());
                    }
                }
            }
            let queued = worker.as_ref().map(|w| w.jobs.try_send(job));
            match queued {
                Some(Ok(())) | None => None,
                Some(Err(TrySendError::Full(_))) => Some(LoggerError::QueueFull {
                    capacity: self.queue_capacity,
                }),
                Some(Err(TrySendError::Disconnected(_))) => {
                    // Restarted on the next discreet send
                    *worker = None;
                    Some(LoggerError::Network(
                        "background send thread stopped".to_string(),
                    ))
                }
            }
        };

        if let Some(err) = failure {
            report_discreet_failure(&err, debug, on_error.as_ref());
        }
        Ok(())
    }

    fn spawn_worker(&self) -> std::io::Result<Worker> {
        let (jobs, queue) = mpsc::sync_channel(self.queue_capacity);
        let agent = self.agent.clone();
        let handle = std::thread::Builder::new()
            .name("gae-analytics-send".to_string())
            .spawn(move || run_worker(&agent, queue))?;
        Ok(Worker { jobs, handle })
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration snapshot, or an error if no API key is set yet.
    fn ready_config(&self) -> Result<LoggerConfig> {
        let config = self.config();
        if config.api_key.is_empty() {
            return Err(LoggerError::Configuration(
                "logger is not initialized; call initialize with an API key first".to_string(),
            ));
        }
        Ok(config)
    }

    fn read_config(&self) -> RwLockReadGuard<'_, LoggerConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_config(&self) -> RwLockWriteGuard<'_, LoggerConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AnalyticsLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnalyticsLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.read_config();
        f.debug_struct("AnalyticsLogger")
            .field("events_url", &config.events_url)
            .field("basic_events_url", &config.basic_events_url)
            .field("initialized", &!config.api_key.is_empty())
            .field("debug", &config.debug)
            .finish()
    }
}

impl Drop for AnalyticsLogger {
    fn drop(&mut self) {
        self.flush();
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { jobs, handle }) = worker {
            // Closing the queue ends the thread's receive loop
            drop(jobs);
            let _ = handle.join();
        }
    }
}

// ------------------------------------------------------------------
// Network
// ------------------------------------------------------------------

fn prepare(config: &LoggerConfig, url: &str, body: Vec<u8>) -> Result<OutboundRequest> {
    if url.is_empty() {
        return Err(LoggerError::Configuration(
            "endpoint URL is not set; call initialize first".to_string(),
        ));
    }
    Ok(OutboundRequest {
        url: url.to_string(),
        api_key: config.api_key.clone(),
        signature: sign_body(&config.secret_key, &body),
        body,
    })
}

fn send(agent: &ureq::Agent, request: &OutboundRequest) -> Result<()> {
    let mut call = agent
        .post(&request.url)
        .set("Content-Type", "application/json")
        .set("x-api-key", &request.api_key)
        .set("x-gae-analytics-sdk", SDK_HEADER);
    if let Some(ref signature) = request.signature {
        call = call.set("x-signature", signature);
    }

    match call.send_bytes(&request.body) {
        Ok(resp) => {
            let status = resp.status();
            if (200..300).contains(&status) {
                Ok(())
            } else {
                Err(LoggerError::Status { status })
            }
        }
        Err(ureq::Error::Status(status, _resp)) => Err(LoggerError::Status { status }),
        Err(ureq::Error::Transport(e)) => Err(LoggerError::Network(e.to_string())),
    }
}

fn run_worker(agent: &ureq::Agent, queue: Receiver<Job>) {
    for job in queue {
        match job {
            Job::Send {
                request,
                debug,
                on_error,
            } => match send(agent, &request) {
                Ok(()) if debug => {
                    log::debug!(target: LOG_TARGET, "discreet send to {} succeeded", request.url);
                }
                Ok(()) => {}
                Err(e) => report_discreet_failure(&e, debug, on_error.as_ref()),
            },
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn report_discreet_failure(err: &LoggerError, debug: bool, on_error: Option<&ErrorCallback>) {
    if debug {
        log::warn!(target: LOG_TARGET, "discreet send failed: {err}");
    }
    if let Some(cb) = on_error {
        // A panicking callback must not take the send thread down with it
        if catch_unwind(AssertUnwindSafe(|| cb(err))).is_err() && debug {
            log::warn!(target: LOG_TARGET, "error callback panicked");
        }
    }
}

// ------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------

fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(LoggerError::Configuration("'api_key' is required".to_string()));
    }
    if api_key.contains(['\0', '\r', '\n']) {
        return Err(LoggerError::Configuration(
            "'api_key' contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_parameters(parameters: &Parameters) -> Result<()> {
    // serde_json would silently encode these as null
    for (key, value) in parameters {
        if let ParamValue::Float(f) = value {
            if !f.is_finite() {
                return Err(LoggerError::InvalidEvent(format!(
                    "parameter '{key}' is not a finite number ({f})"
                )));
            }
        }
    }
    Ok(())
}

fn sanitize_event_name(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(LoggerError::InvalidEvent(
            "event name must not be empty".to_string(),
        ));
    }
    let mut end = name.len().min(MAX_EVENT_NAME_LENGTH);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    Ok(name[..end].to_string())
}

fn encode_body<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(payload)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(LoggerError::InvalidEvent(format!(
            "event too large ({} bytes, limit {MAX_BODY_BYTES})",
            body.len()
        )));
    }
    Ok(body)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

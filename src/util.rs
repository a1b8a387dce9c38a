//! Shared runtime plumbing: tracing setup, application state, CORS, and the
//! per-request completion log.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use actix_cors::Cors;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ApiKeyTable, RouteTable};
use crate::upstream::OllamaConnector;

/// Initialise the global tracing subscriber. `RUST_LOG` wins over the
/// configured default filter. Callers load `.env` before settings are
/// parsed so both clap and the filter see it.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Everything the handlers need, shared via `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub connector: OllamaConnector,
    pub routes: Arc<RouteTable>,
    pub api_keys: Arc<ApiKeyTable>,
}

impl AppState {
    pub fn new(routes: RouteTable, api_keys: ApiKeyTable) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ollamux/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            connector: OllamaConnector::new(http),
            routes: Arc::new(routes),
            api_keys: Arc::new(api_keys),
        }
    }
}

/// Build the CORS layer from the comma-separated origin list. `*` means
/// any origin.
pub fn cors_config(origins: &str) -> Cors {
    let mut cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);
    if origins.trim() == "*" {
        cors = cors.allow_any_origin();
    } else {
        for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}

/// Seconds since the Unix epoch, saturating at zero if the clock is wrong.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Emits exactly one completion event per request, on whichever exit path
/// fires first. Dropping an unfinished log records the request as aborted,
/// so client disconnects still show up in the logs.
pub struct RequestLog {
    request_id: String,
    model: String,
    api_key: String,
    started: Instant,
    done: bool,
}

impl RequestLog {
    pub fn new(request_id: &str, model: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            model: model.to_string(),
            api_key: "-".to_string(),
            started: Instant::now(),
            done: false,
        }
    }

    pub fn set_api_key(&mut self, name: &str) {
        self.api_key = name.to_string();
    }

    /// The model is unknown until the body parses; fill it in then.
    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    /// Record the outcome. Later calls are no-ops, so the streaming path can
    /// mark success and let the `Drop` safety net stand down.
    pub fn complete(&mut self, outcome: &str, prompt_tokens: u32, completion_tokens: u32) {
        if self.done {
            return;
        }
        self.done = true;
        info!(
            request_id = %self.request_id,
            model = %self.model,
            api_key = %self.api_key,
            outcome = outcome,
            prompt_tokens,
            completion_tokens,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "request finished"
        );
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        self.complete("aborted", 0, 0);
    }
}

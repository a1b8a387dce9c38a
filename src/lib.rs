//! ollamux: an OpenAI-compatible gateway for a fleet of Ollama backends.
//!
//! Callers speak the Chat Completions dialect against a single endpoint;
//! the gateway authenticates them, resolves the requested public model name
//! to a per-model backend, translates the request to the backend's native
//! `/api/chat` shape, and translates the answer back. Streaming responses
//! are transcoded line by line from backend NDJSON into SSE frames.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod conversion;
pub mod error;
pub mod models;
pub mod server;
pub mod streaming;
pub mod upstream;
pub mod util;

pub use config::{ApiKeyTable, ModelRoute, RouteTable, Settings};
pub use error::GatewayError;
pub use server::config_routes;
pub use util::AppState;

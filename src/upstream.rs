//! HTTP connector for per-model Ollama backends.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ModelRoute;
use crate::error::UpstreamError;
use crate::models::ollama::{OllamaChatRequest, OllamaChatResponse, OllamaTagsResponse};

/// Thin wrapper over a shared `reqwest::Client`. Holds no per-route state;
/// the route passed to each call carries the address and deadline.
#[derive(Clone)]
pub struct OllamaConnector {
    http: reqwest::Client,
}

impl OllamaConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send a non-streaming chat request and decode the complete response.
    /// The route's deadline bounds the whole exchange, body included.
    pub async fn chat_once(
        &self,
        route: &ModelRoute,
        body: &OllamaChatRequest,
    ) -> Result<OllamaChatResponse, UpstreamError> {
        let url = format!("{}/api/chat", route.base_url());
        debug!(model = %route.name, url = %url, "dispatching chat request");
        let exchange = async {
            let response = self.http.post(&url).json(body).send().await?;
            if !response.status().is_success() {
                return Err(UpstreamError::BadStatus(response.status().as_u16()));
            }
            response
                .json::<OllamaChatResponse>()
                .await
                .map_err(|e| UpstreamError::Protocol(format!("invalid backend response: {e}")))
        };
        match tokio::time::timeout(Duration::from_secs(route.timeout), exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model = %route.name, timeout_secs = route.timeout, "backend deadline exceeded");
                Err(UpstreamError::Timeout)
            }
        }
    }

    /// Send a streaming chat request and hand back the raw response once the
    /// backend has accepted it. The route's deadline bounds time-to-headers
    /// only; the body is paced by the transcoder's stall watchdog.
    pub async fn chat_stream(
        &self,
        route: &ModelRoute,
        body: &OllamaChatRequest,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}/api/chat", route.base_url());
        debug!(model = %route.name, url = %url, "dispatching streaming chat request");
        let send = self.http.post(&url).json(body).send();
        let response = match tokio::time::timeout(Duration::from_secs(route.timeout), send).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(model = %route.name, timeout_secs = route.timeout, "backend deadline exceeded");
                return Err(UpstreamError::Timeout);
            }
        };
        if !response.status().is_success() {
            return Err(UpstreamError::BadStatus(response.status().as_u16()));
        }
        Ok(response)
    }

    /// List the model tags a backend advertises. Used by readiness probes,
    /// never on the request path.
    pub async fn list_tags(&self, route: &ModelRoute) -> Result<Vec<String>, UpstreamError> {
        let url = format!("{}/api/tags", route.base_url());
        let exchange = async {
            let response = self.http.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(UpstreamError::BadStatus(response.status().as_u16()));
            }
            response
                .json::<OllamaTagsResponse>()
                .await
                .map_err(|e| UpstreamError::Protocol(format!("invalid backend response: {e}")))
        };
        match tokio::time::timeout(Duration::from_secs(route.timeout), exchange).await {
            Ok(result) => Ok(result?.models.into_iter().map(|t| t.name).collect()),
            Err(_) => Err(UpstreamError::Timeout),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_connect() {
            UpstreamError::ConnectFailed
        } else {
            UpstreamError::Protocol(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(port: u16, timeout: u64) -> ModelRoute {
        serde_yaml::from_str::<ModelRoute>(&format!(
            "host: 127.0.0.1\nport: {port}\nmodel: llama3:8b\ntimeout: {timeout}"
        ))
        .expect("valid route")
    }

    #[tokio::test]
    async fn connect_refused_maps_to_connect_failed() {
        // Port 1 is unassigned on loopback; connecting fails immediately.
        let connector = OllamaConnector::new(reqwest::Client::new());
        let err = connector
            .chat_once(&route(1, 5), &OllamaChatRequest::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, UpstreamError::ConnectFailed));
    }

    #[tokio::test]
    async fn streaming_connect_refused_maps_the_same_way() {
        let connector = OllamaConnector::new(reqwest::Client::new());
        let err = connector
            .chat_stream(&route(1, 5), &OllamaChatRequest::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, UpstreamError::ConnectFailed));
    }
}

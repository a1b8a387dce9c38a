//! HTTP surface: route registration and request handlers.

use std::io;
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{authenticate, bearer_token};
use crate::conversion::{chat_to_ollama_request, ollama_to_chat_response};
use crate::error::{GatewayError, ValidationError};
use crate::models::chat::ChatCompletionRequest;
use crate::streaming::SseTranscoder;
use crate::util::{unix_now, AppState, RequestLog};

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/health", web::get().to(health))
            .route("/v1/models", web::get().to(list_models))
            .route("/v1/chat/completions", web::post().to(chat_completions)),
    );
}

/// Liveness probe. Unauthenticated; reports the configured public model
/// names without touching any backend.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "models": state.routes.model_names(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /v1/models`: the configured routes with live availability. Each
/// backend is probed via `/api/tags`; a model is available when its backend
/// answers and advertises the native model id.
async fn list_models(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Err(err) = authenticate(&state.api_keys, bearer_token(req.headers()).as_deref()) {
        return GatewayError::from(err).to_response();
    }
    let mut routes: Vec<_> = state.routes.iter().collect();
    routes.sort_by(|a, b| a.name.cmp(&b.name));

    let probes = routes.iter().map(|route| async {
        let status = match state.connector.list_tags(route).await {
            Ok(tags) if tags.iter().any(|t| t == &route.model) => "available",
            Ok(_) | Err(_) => "unavailable",
        };
        json!({
            "name": route.name,
            "status": status,
            "backend_url": route.base_url(),
        })
    });
    let data = futures_util::future::join_all(probes).await;
    HttpResponse::Ok().json(json!({ "object": "list", "data": data }))
}

/// `POST /v1/chat/completions`: authenticate, validate, resolve the route,
/// translate, and either proxy one response or transcode the stream.
async fn chat_completions(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let request_id = Uuid::new_v4().to_string();
    let mut log = RequestLog::new(&request_id, "-");

    let principal = match authenticate(&state.api_keys, bearer_token(req.headers()).as_deref()) {
        Ok(principal) => principal,
        Err(err) => {
            log.complete("unauthorized", 0, 0);
            return GatewayError::from(err).to_response();
        }
    };
    log.set_api_key(&principal.name);

    let chat_req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            log.complete("invalid_request", 0, 0);
            return GatewayError::from(ValidationError::MalformedBody(err.to_string()))
                .to_response();
        }
    };
    log.set_model(&chat_req.model);

    if let Err(err) = chat_req.validate() {
        log.complete("invalid_request", 0, 0);
        return GatewayError::from(err).to_response();
    }

    let route = match state.routes.resolve(&chat_req.model) {
        Ok(route) => route,
        Err(err) => {
            log.complete("unknown_model", 0, 0);
            return GatewayError::from(err).to_response();
        }
    };

    let native = chat_to_ollama_request(&chat_req, &route.model);
    let completion_id = format!("chatcmpl-{request_id}");
    let created = unix_now();

    if chat_req.stream {
        let upstream = match state.connector.chat_stream(route, &native).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request_id = %request_id, model = %chat_req.model, %err, "streaming dispatch failed");
                log.complete("upstream_error", 0, 0);
                return GatewayError::from(err).to_response();
            }
        };
        let bytes = upstream.bytes_stream().map_err(io::Error::other).boxed();
        let transcoder = SseTranscoder::new(
            bytes,
            &completion_id,
            created,
            &chat_req.model,
            Duration::from_secs(route.stall_timeout),
            log,
        );
        HttpResponse::Ok()
            .insert_header(("content-type", "text/plain; charset=utf-8"))
            .insert_header(("cache-control", "no-cache"))
            .insert_header(("x-request-id", request_id))
            .streaming(transcoder)
    } else {
        let backend = match state.connector.chat_once(route, &native).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request_id = %request_id, model = %chat_req.model, %err, "backend request failed");
                log.complete("upstream_error", 0, 0);
                return GatewayError::from(err).to_response();
            }
        };
        let response = ollama_to_chat_response(&backend, &completion_id, created, &chat_req.model);
        if let Some(usage) = &response.usage {
            log.complete("success", usage.prompt_tokens, usage.completion_tokens);
        } else {
            log.complete("success", 0, 0);
        }
        HttpResponse::Ok()
            .insert_header(("x-request-id", request_id))
            .json(response)
    }
}

//! Pure mapping between the caller-facing Chat Completions shapes and the
//! backend-native Ollama shapes. No I/O here; the connector and transcoder
//! own everything that touches the network.

use serde_json::Map;

use crate::models::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChunkChoice, ChunkDelta, FinishReason, Role, Usage,
};
use crate::models::ollama::{OllamaChatRequest, OllamaChatResponse, OllamaMessage, OllamaOptions};

/// Keys the translator itself populates; caller-supplied extras must never
/// overwrite them.
const RESERVED_KEYS: [&str; 4] = ["model", "messages", "stream", "options"];

/// Translate a canonical chat request into the backend-native request.
///
/// Messages map 1:1. `temperature` and `max_tokens` fold into the `options`
/// sub-object (`max_tokens` becomes `num_predict`). Unmodeled caller fields
/// pass through at the top level when they do not collide with translator
/// output. `top_p`, the penalties, and `stop` have no backend equivalent and
/// are dropped after validation.
pub fn chat_to_ollama_request(
    request: &ChatCompletionRequest,
    native_model_id: &str,
) -> OllamaChatRequest {
    let messages = request
        .messages
        .iter()
        .map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    let options = if request.temperature.is_some() || request.max_tokens.is_some() {
        Some(OllamaOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        })
    } else {
        None
    };

    let mut extra = Map::new();
    for (key, value) in &request.extra {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        extra.insert(key.clone(), value.clone());
    }

    OllamaChatRequest {
        model: native_model_id.to_string(),
        messages,
        stream: request.stream,
        options,
        extra,
    }
}

/// Translate a complete backend response into the single-choice canonical
/// response. Missing content becomes an empty string; `done=true` maps to
/// `finish_reason="stop"`.
pub fn ollama_to_chat_response(
    response: &OllamaChatResponse,
    completion_id: &str,
    created: u64,
    model_name: &str,
) -> ChatCompletionResponse {
    let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
    let completion_tokens = response.eval_count.unwrap_or(0);
    let content = response
        .message
        .as_ref()
        .map(|m| m.content.clone())
        .unwrap_or_default();

    ChatCompletionResponse {
        id: completion_id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model_name.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: Role::Assistant,
                content,
                name: None,
            },
            finish_reason: response.done.then_some(FinishReason::Stop),
        }],
        usage: Some(Usage::new(prompt_tokens, completion_tokens)),
    }
}

/// The first chunk of every stream: announces the assistant role with empty
/// content and no finish reason.
pub fn role_announcement_chunk(
    completion_id: &str,
    created: u64,
    model_name: &str,
) -> ChatCompletionChunk {
    chunk(
        completion_id,
        created,
        model_name,
        ChunkDelta {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
        },
        None,
    )
}

/// Translate one backend stream line into a canonical chunk. A `done=true`
/// line yields the terminal chunk: its content delta (when any) together
/// with `finish_reason="stop"`; with no content the delta is empty.
pub fn ollama_chunk_to_chat_chunk(
    line: &OllamaChatResponse,
    completion_id: &str,
    created: u64,
    model_name: &str,
) -> ChatCompletionChunk {
    let content = line
        .message
        .as_ref()
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let delta = if line.done && content.is_empty() {
        ChunkDelta::default()
    } else {
        ChunkDelta {
            role: None,
            content: Some(content),
        }
    };
    chunk(
        completion_id,
        created,
        model_name,
        delta,
        line.done.then_some(FinishReason::Stop),
    )
}

fn chunk(
    completion_id: &str,
    created: u64,
    model_name: &str,
    delta: ChunkDelta,
    finish_reason: Option<FinishReason>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: completion_id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model_name.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

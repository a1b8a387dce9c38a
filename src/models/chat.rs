//! OpenAI-style Chat Completions request/response models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Author of a chat message. Only the three canonical roles are accepted;
/// anything else fails deserialization before the request reaches routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Stop sequences accept both the scalar and the list form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

/// Inbound request body for `POST /v1/chat/completions`.
///
/// Fields the gateway does not model explicitly are collected in `extra` and
/// forwarded to the backend verbatim (without overwriting translator output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    #[serde(default)]
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    /// Opaque caller identifier, accepted for OpenAI compatibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Range checks that must pass before any network call is made.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.messages.is_empty() {
            return Err(ValidationError::EmptyMessages);
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ValidationError::OutOfRange {
                    field: "temperature",
                    allowed: "between 0 and 1",
                });
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ValidationError::OutOfRange {
                field: "max_tokens",
                allowed: "greater than 0",
            });
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ValidationError::OutOfRange {
                    field: "top_p",
                    allowed: "between 0 and 1",
                });
            }
        }
        if let Some(p) = self.frequency_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(ValidationError::OutOfRange {
                    field: "frequency_penalty",
                    allowed: "between -2 and 2",
                });
            }
        }
        if let Some(p) = self.presence_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(ValidationError::OutOfRange {
                    field: "presence_penalty",
                    allowed: "between -2 and 2",
                });
            }
        }
        Ok(())
    }
}

/// Token usage accounting. `total_tokens` is always the sum of the parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
}

/// Non-streaming response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Incremental content in a streaming chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// One unit of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> ChatCompletionRequest {
        serde_json::from_value(body).expect("valid request")
    }

    #[test]
    fn rejects_empty_messages() {
        let req = request(json!({"model": "llama3", "messages": []}));
        assert_eq!(req.validate(), Err(ValidationError::EmptyMessages));
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let base = json!({"model": "llama3", "messages": [{"role": "user", "content": "hi"}]});
        for (field, value) in [
            ("temperature", json!(1.5)),
            ("max_tokens", json!(0)),
            ("top_p", json!(-0.1)),
            ("frequency_penalty", json!(2.5)),
            ("presence_penalty", json!(-3.0)),
        ] {
            let mut body = base.clone();
            body[field] = value;
            let err = request(body).validate().expect_err("should be rejected");
            assert!(matches!(err, ValidationError::OutOfRange { field: f, .. } if f == field));
        }
    }

    #[test]
    fn accepts_boundary_values() {
        let req = request(json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 1.0,
            "max_tokens": 1,
            "frequency_penalty": -2.0,
            "presence_penalty": 2.0
        }));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn unknown_role_fails_deserialization() {
        let res: Result<ChatCompletionRequest, _> = serde_json::from_value(json!({
            "model": "llama3",
            "messages": [{"role": "tool", "content": "hi"}]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn stop_accepts_scalar_and_list() {
        let scalar = request(json!({
            "model": "m", "messages": [{"role": "user", "content": "x"}], "stop": "END"
        }));
        assert_eq!(scalar.stop, Some(StopSequences::One("END".into())));

        let list = request(json!({
            "model": "m", "messages": [{"role": "user", "content": "x"}], "stop": ["a", "b"]
        }));
        assert_eq!(
            list.stop,
            Some(StopSequences::Many(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn unmodeled_fields_land_in_extra() {
        let req = request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "x"}],
            "top_k": 42,
            "repetition_penalty": 1.1
        }));
        assert_eq!(req.extra.get("top_k"), Some(&json!(42)));
        assert_eq!(req.extra.get("repetition_penalty"), Some(&json!(1.1)));
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = Usage::new(3, 2);
        assert_eq!(usage.total_tokens, 5);
    }
}

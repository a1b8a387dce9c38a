//! Wire-format data structures.
//!
//! - `chat`: the caller-facing, OpenAI-style Chat Completions shapes.
//! - `ollama`: the backend-native shapes spoken by Ollama's `/api/chat`.

pub mod chat;
pub mod ollama;

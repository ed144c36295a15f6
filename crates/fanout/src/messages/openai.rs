//! OpenAI-compatible request body and streaming chunk shapes.
//!
//! Both self-hosted servers and the gateway accept this format, so a single
//! pair of types covers the whole upstream surface. Chunk parsing only cares
//! about `choices[0].delta.content`; everything else is tolerated and
//! ignored.

use serde::{Deserialize, Serialize};

use crate::messages::{ChatMessage, GenerationParams};

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 1.0;

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(model: &'a str, messages: &'a [ChatMessage], params: GenerationParams) -> Self {
        Self {
            model,
            messages,
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE).clamp(0.0, 2.0),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            top_p: params.top_p.unwrap_or(DEFAULT_TOP_P),
            stream: true,
        }
    }
}

/// One `data:` payload of an upstream SSE stream.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

impl StreamChunk {
    /// The content delta of the first choice, when present and non-empty.
    pub fn content_delta(&self) -> Option<&str> {
        let content = self.choices.first()?.delta.content.as_deref()?;

        (!content.is_empty()).then_some(content)
    }
}

#[derive(Debug, Default, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

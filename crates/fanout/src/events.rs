//! The per-model event vocabulary emitted by the fan-out engine.

use serde::{Deserialize, Serialize};

use crate::error::FanoutError;

/// One event in the unified output sequence of a fan-out request.
///
/// Every variant names the model it refers to. For each model that gets a
/// `Start`, exactly one `Done` or `Error` follows; events for one model are
/// delivered in production order, with no ordering across models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Upstream connection established for this model.
    Start { model_id: String },
    /// Incremental content delta.
    Token { model_id: String, content: String },
    /// Upstream signalled a clean end of stream.
    Done { model_id: String },
    /// This model failed; other models continue.
    Error {
        model_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl ChatEvent {
    /// The model this event refers to.
    pub fn model_id(&self) -> &str {
        match self {
            Self::Start { model_id }
            | Self::Token { model_id, .. }
            | Self::Done { model_id }
            | Self::Error { model_id, .. } => model_id,
        }
    }

    /// Whether this event ends the sequence for its model.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub(crate) fn error(model_id: impl Into<String>, error: &FanoutError) -> Self {
        Self::Error {
            model_id: model_id.into(),
            content: error.to_string(),
            code: error.code(),
        }
    }
}

//! Multi-model chat fan-out.
//!
//! Given a prompt and a set of model identifiers, Chorus opens one streaming
//! request per model - self-hosted servers and the hosted gateway alike speak
//! the OpenAI-compatible SSE format - and merges the per-model token streams
//! into a single event sequence that preserves per-model ordering and
//! independent completion.
//!
//! The [`Orchestrator`] is the entry point: it owns the [`ModelRegistry`]
//! (populated from a discovery endpoint, kept fresh by the [`HealthProber`])
//! and turns a [`ChatRequest`] into a stream of [`ChatEvent`]s.

mod engine;
mod error;
mod events;
mod health;
mod http_client;
mod messages;
mod registry;
mod resolver;
pub mod selection;

pub use engine::{ChatEventStream, ChatRequest, Orchestrator};
pub use error::{FanoutError, FanoutResult};
pub use events::ChatEvent;
pub use health::{HealthProber, run_cycle};
pub use messages::{ChatMessage, GenerationParams, Role};
pub use registry::{Availability, ModelRecord, ModelRegistry, TransportClass};
pub use resolver::{Endpoint, resolve_endpoint};

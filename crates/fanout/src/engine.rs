//! The fan-out engine: one worker per selected model, all streams merged by
//! arrival into a single event sequence.

use std::pin::Pin;
use std::sync::Arc;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt, stream};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{FanoutError, FanoutResult};
use crate::events::ChatEvent;
use crate::http_client::http_client;
use crate::messages::openai::{CompletionRequest, StreamChunk};
use crate::messages::{ChatMessage, GenerationParams};
use crate::registry::ModelRegistry;
use crate::resolver::{Endpoint, resolve_endpoint};

/// Bound on buffered events per worker. A fast upstream paired with a slow
/// consumer blocks the worker instead of growing memory.
const EVENT_BUFFER: usize = 32;

/// Upper bound on the error-body excerpt quoted in `error` events.
const ERROR_SNIPPET_CHARS: usize = 512;

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// One fan-out request: a selection of models, the conversation so far, and
/// a cancellation handle shared by every worker the request spawns.
pub struct ChatRequest {
    pub models: Vec<String>,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
    /// Caller-supplied gateway credential, overriding the configured one.
    pub gateway_token: Option<SecretString>,
    pub cancellation: CancellationToken,
}

impl ChatRequest {
    pub fn new(models: Vec<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            models,
            messages,
            params: GenerationParams::default(),
            gateway_token: None,
            cancellation: CancellationToken::new(),
        }
    }
}

struct OrchestratorInner {
    config: Arc<config::Config>,
    registry: ModelRegistry,
    client: reqwest::Client,
}

/// The handle hosts consume: owns the registry and turns chat requests into
/// event streams.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(config: Arc<config::Config>) -> Self {
        Self {
            shared: Arc::new(OrchestratorInner {
                config,
                registry: ModelRegistry::new(),
                client: http_client(),
            }),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &config::Config {
        &self.shared.config
    }

    /// Populate the registry from the discovery endpoint.
    pub async fn load_registry(&self) -> FanoutResult<()> {
        self.shared
            .registry
            .load(&self.shared.client, &self.shared.config.discovery)
            .await
    }

    /// Operator-triggered re-fetch of the registry.
    pub async fn retry_now(&self) -> FanoutResult<()> {
        self.load_registry().await
    }

    /// Open one streaming request per selected model and merge the
    /// per-model event streams by arrival.
    ///
    /// The output obeys the per-model contract: one `start` before anything
    /// else, tokens in upstream order, exactly one terminal event - with no
    /// ordering between models and no head-of-line blocking. Workers are
    /// fully independent after spawn; one model failing never touches the
    /// others.
    pub fn stream_chat(&self, request: ChatRequest) -> ChatEventStream {
        let mut models = request.models;
        dedupe_in_place(&mut models);

        if models.is_empty() {
            let event = ChatEvent::error("", &FanoutError::InvalidRequest("no models selected".to_string()));
            return Box::pin(stream::once(async move { event }));
        }

        let singleton = models.len() == 1;
        let messages = Arc::new(request.messages);
        let cancellation = request.cancellation;
        let mut outputs = Vec::with_capacity(models.len());

        for model_id in models {
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);

            let worker = Worker {
                model_id,
                messages: Arc::clone(&messages),
                params: request.params,
                gateway_token: request.gateway_token.clone(),
                singleton,
                cancellation: cancellation.clone(),
                registry: self.shared.registry.clone(),
                config: Arc::clone(&self.shared.config),
                client: self.shared.client.clone(),
            };

            tokio::spawn(worker.run(tx));
            outputs.push(ReceiverStream::new(rx));
        }

        // Cancellation ends the merged sequence immediately, even when
        // workers still hold buffered events.
        Box::pin(stream::select_all(outputs).take_until(cancellation.cancelled_owned()))
    }
}

/// Keeps the first occurrence of each identifier; a selection is a set.
fn dedupe_in_place(models: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    models.retain(|model| seen.insert(model.clone()));
}

struct Worker {
    model_id: String,
    messages: Arc<Vec<ChatMessage>>,
    params: GenerationParams,
    gateway_token: Option<SecretString>,
    singleton: bool,
    cancellation: CancellationToken,
    registry: ModelRegistry,
    config: Arc<config::Config>,
    client: reqwest::Client,
}

impl Worker {
    async fn run(self, tx: mpsc::Sender<ChatEvent>) {
        let endpoint = match resolve_endpoint(
            &self.registry,
            &self.config,
            &self.model_id,
            self.gateway_token.as_ref(),
            self.singleton,
        ) {
            Ok(endpoint) => endpoint,
            Err(error) => {
                log::warn!("endpoint resolution for {model} failed: {error}", model = self.model_id);
                emit(&tx, &self.cancellation, ChatEvent::error(&self.model_id, &error)).await;
                return;
            }
        };

        let response = match self.open_stream(&endpoint).await {
            Ok(Some(response)) => response,
            // Cancelled before the connection settled.
            Ok(None) => return,
            Err(error) => {
                emit(&tx, &self.cancellation, ChatEvent::error(&self.model_id, &error)).await;
                return;
            }
        };

        let started = emit(
            &tx,
            &self.cancellation,
            ChatEvent::Start {
                model_id: self.model_id.clone(),
            },
        )
        .await;

        if !started {
            return;
        }

        consume_sse(&self.model_id, response.bytes_stream(), &tx, &self.cancellation).await;
    }

    /// Open the upstream connection and validate the response status.
    ///
    /// `Ok(None)` means cancellation was observed; the worker exits without
    /// another event.
    async fn open_stream(&self, endpoint: &Endpoint) -> Result<Option<reqwest::Response>, FanoutError> {
        let body = CompletionRequest::new(&self.model_id, &self.messages, self.params);
        let body =
            sonic_rs::to_vec(&body).map_err(|error| FanoutError::InvalidRequest(format!("unserializable request: {error}")))?;

        let mut request = self
            .client
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(bearer) = &endpoint.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", bearer.expose_secret()));
        }

        if let Some(version) = &endpoint.api_version {
            request = request.header(API_VERSION_HEADER, version);
        }

        let response = tokio::select! {
            _ = self.cancellation.cancelled() => return Ok(None),
            result = request.send() => {
                result.map_err(|error| FanoutError::UpstreamTransport(error.to_string()))?
            }
        };

        let status = response.status();

        if !status.is_success() {
            let body = tokio::select! {
                _ = self.cancellation.cancelled() => return Ok(None),
                body = response.text() => body.unwrap_or_default(),
            };

            let snippet: String = body.chars().take(ERROR_SNIPPET_CHARS).collect();

            return Err(FanoutError::UpstreamHttp {
                status: status.as_u16(),
                message: snippet,
            });
        }

        Ok(Some(response))
    }
}

/// Send one event unless the request was cancelled first. Returns whether
/// the worker should keep going.
async fn emit(tx: &mpsc::Sender<ChatEvent>, cancellation: &CancellationToken, event: ChatEvent) -> bool {
    tokio::select! {
        _ = cancellation.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

/// Drive one upstream SSE body to completion, emitting `token` events for
/// content deltas and exactly one terminal event.
///
/// Undecodable `data:` payloads and malformed SSE input are skipped -
/// upstreams occasionally emit keep-alive noise and truncated partials.
/// Only a transport-level failure of the body read terminates with `error`;
/// both the `[DONE]` sentinel and a plain end of body terminate with `done`.
async fn consume_sse<S, B, E>(
    model_id: &str,
    byte_stream: S,
    tx: &mpsc::Sender<ChatEvent>,
    cancellation: &CancellationToken,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut events = Box::pin(byte_stream.eventsource());

    loop {
        let event = tokio::select! {
            _ = cancellation.cancelled() => return,
            event = events.next() => event,
        };

        match event {
            None => {
                emit(
                    tx,
                    cancellation,
                    ChatEvent::Done {
                        model_id: model_id.to_string(),
                    },
                )
                .await;
                return;
            }
            Some(Ok(event)) => {
                if event.data == "[DONE]" {
                    emit(
                        tx,
                        cancellation,
                        ChatEvent::Done {
                            model_id: model_id.to_string(),
                        },
                    )
                    .await;
                    return;
                }

                match sonic_rs::from_str::<StreamChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(content) = chunk.content_delta() {
                            let token = ChatEvent::Token {
                                model_id: model_id.to_string(),
                                content: content.to_string(),
                            };

                            if !emit(tx, cancellation, token).await {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        log::debug!("skipping undecodable stream payload for {model_id}: {error}");
                    }
                }
            }
            Some(Err(EventStreamError::Transport(error))) => {
                let error = FanoutError::UpstreamTransport(error.to_string());
                emit(tx, cancellation, ChatEvent::error(model_id, &error)).await;
                return;
            }
            Some(Err(error)) => {
                log::warn!("skipping malformed SSE input for {model_id}: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use super::*;

    fn collect_events(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();

        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        events
    }

    async fn consume_chunks(chunks: Vec<Vec<u8>>) -> Vec<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancellation = CancellationToken::new();

        let byte_stream = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));

        consume_sse("qwen3-4b", byte_stream, &tx, &cancellation).await;
        drop(tx);

        collect_events(rx)
    }

    fn chunk(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    #[tokio::test]
    async fn clean_stream_yields_tokens_then_done() {
        let events = consume_chunks(vec![
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n"),
            chunk("data: [DONE]\n\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Token {
                    model_id: "qwen3-4b".into(),
                    content: "Hel".into()
                },
                ChatEvent::Token {
                    model_id: "qwen3-4b".into(),
                    content: "lo".into()
                },
                ChatEvent::Done {
                    model_id: "qwen3-4b".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn utf8_sequences_split_across_chunks_survive() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\n";
        let bytes = payload.as_bytes();

        // Split inside the two-byte encoding of 'é'.
        let cut = payload.find('é').expect("payload contains é") + 1;

        let events = consume_chunks(vec![
            bytes[..cut].to_vec(),
            bytes[cut..].to_vec(),
            chunk("data: [DONE]\n\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Token {
                    model_id: "qwen3-4b".into(),
                    content: "héllo".into()
                },
                ChatEvent::Done {
                    model_id: "qwen3-4b".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_payloads_and_framing_noise_are_skipped() {
        let events = consume_chunks(vec![
            chunk(": keep-alive\n\n"),
            chunk("event: ping\n\n"),
            chunk("data: {not-json\n\n"),
            chunk("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n"),
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"),
            chunk("data: [DONE]\n\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Token {
                    model_id: "qwen3-4b".into(),
                    content: "x".into()
                },
                ChatEvent::Done {
                    model_id: "qwen3-4b".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn body_end_without_sentinel_is_a_clean_done() {
        let events = consume_chunks(vec![chunk("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n")]).await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Token {
                    model_id: "qwen3-4b".into(),
                    content: "x".into()
                },
                ChatEvent::Done {
                    model_id: "qwen3-4b".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_terminates_with_error() {
        #[derive(Debug)]
        struct Broken;

        impl std::fmt::Display for Broken {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("connection reset")
            }
        }

        impl std::error::Error for Broken {}

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancellation = CancellationToken::new();

        let byte_stream = stream::iter(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n".as_bytes().to_vec()),
            Err(Broken),
        ]);

        consume_sse("qwen3-4b", byte_stream, &tx, &cancellation).await;
        drop(tx);

        let events = collect_events(rx);

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ChatEvent::Token {
                model_id: "qwen3-4b".into(),
                content: "par".into()
            }
        );

        match &events[1] {
            ChatEvent::Error { model_id, content, code } => {
                assert_eq!(model_id, "qwen3-4b");
                assert!(content.contains("connection reset"), "{content}");
                assert!(code.is_none());
            }
            other => unreachable!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_suppresses_further_events() {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let byte_stream = stream::pending::<Result<Vec<u8>, Infallible>>();

        tokio::time::timeout(
            Duration::from_secs(1),
            consume_sse("qwen3-4b", byte_stream, &tx, &cancellation),
        )
        .await
        .expect("cancelled consumption should return promptly");

        drop(tx);
        assert!(collect_events(rx).is_empty());
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut models = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        dedupe_in_place(&mut models);

        assert_eq!(models, vec!["a", "b", "c"]);
    }
}

//! The model registry: the single source of truth for known models, their
//! metadata, and the prober's current belief about their availability.

mod discovery;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use crate::error::{FanoutError, FanoutResult};

/// How a model's inference endpoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// A separately-operated server with a per-model base URL.
    SelfHosted,
    /// The shared hosted gateway, reached through one endpoint with a bearer credential.
    Gateway,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfHosted => f.write_str("self-hosted"),
            Self::Gateway => f.write_str("gateway"),
        }
    }
}

/// The prober's belief about whether a model is reachable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// One known model.
#[derive(Debug, Clone)]
pub struct ModelRecord {
    /// Opaque, stable identifier. Unique within the registry.
    pub id: String,
    /// Display name; may repeat across records.
    pub name: String,
    pub class: TransportClass,
    /// Lower sorts first. Absent sorts last.
    pub priority: Option<u32>,
    /// Informational context window size.
    pub context_length: Option<u64>,
    /// Preferred first responder when nothing is selected.
    pub default: bool,
    /// Gateway records are pinned online; self-hosted records start unknown
    /// and transition on probe results.
    pub availability: Availability,
}

#[derive(Default)]
struct RegistryState {
    records: Vec<ModelRecord>,
    loading: bool,
    load_error: Option<String>,
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    /// Serializes concurrent loads: a finished fetch only commits when its
    /// generation is still current.
    generation: AtomicU64,
    /// Bumped whenever availability or the record set changes.
    availability_tx: watch::Sender<u64>,
}

/// Cheaply clonable handle to the shared registry.
#[derive(Clone)]
pub struct ModelRegistry {
    shared: Arc<RegistryInner>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let (availability_tx, _) = watch::channel(0);

        Self {
            shared: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                generation: AtomicU64::new(0),
                availability_tx,
            }),
        }
    }

    /// Fetch the discovery document and replace the record set.
    ///
    /// Retries with the configured exponential backoff, then tries the
    /// static fallback document once. A failed load keeps whatever records
    /// a previous load produced; a load that lost the race to a newer one
    /// is discarded entirely.
    pub async fn load(&self, client: &reqwest::Client, config: &config::DiscoveryConfig) -> FanoutResult<()> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.write_state(|state| state.loading = true);

        let outcome = discovery::fetch_with_retry(client, config).await;

        if self.shared.generation.load(Ordering::SeqCst) != generation {
            log::debug!("discarding stale registry load (generation {generation})");
            return Ok(());
        }

        match outcome {
            Ok(records) => {
                log::info!("model registry loaded with {} models", records.len());

                self.write_state(|state| {
                    state.records = records;
                    state.loading = false;
                    state.load_error = None;
                });
                self.notify();

                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                log::error!("model registry load failed: {message}");

                self.write_state(|state| {
                    state.loading = false;
                    state.load_error = Some(message);
                });

                Err(error)
            }
        }
    }

    /// Snapshot of every record, in discovery order.
    pub fn models(&self) -> Vec<ModelRecord> {
        self.read_state(|state| state.records.clone())
    }

    /// Look up one record by identifier.
    pub fn get(&self, model_id: &str) -> Option<ModelRecord> {
        self.read_state(|state| state.records.iter().find(|record| record.id == model_id).cloned())
    }

    /// Transport class of a known model.
    pub fn classify(&self, model_id: &str) -> FanoutResult<TransportClass> {
        self.get(model_id)
            .map(|record| record.class)
            .ok_or_else(|| FanoutError::ModelNotFound(model_id.to_string()))
    }

    /// Identifiers of every self-hosted record, for the prober.
    pub fn self_hosted_ids(&self) -> Vec<String> {
        self.read_state(|state| {
            state
                .records
                .iter()
                .filter(|record| record.class == TransportClass::SelfHosted)
                .map(|record| record.id.clone())
                .collect()
        })
    }

    /// Set one record's availability. Returns whether anything changed.
    ///
    /// Idempotent; gateway records are pinned online and never transition.
    pub fn set_availability(&self, model_id: &str, availability: Availability) -> bool {
        let changed = self.write_state(|state| {
            let Some(record) = state.records.iter_mut().find(|record| record.id == model_id) else {
                return false;
            };

            if record.class == TransportClass::Gateway || record.availability == availability {
                return false;
            }

            record.availability = availability;
            true
        });

        if changed {
            self.notify();
        }

        changed
    }

    /// Preferred moderator / first-responder model: the explicit default,
    /// else the first gateway record, else the first record overall.
    pub fn default_model(&self) -> Option<ModelRecord> {
        self.read_state(|state| {
            state
                .records
                .iter()
                .find(|record| record.default)
                .or_else(|| {
                    state
                        .records
                        .iter()
                        .find(|record| record.class == TransportClass::Gateway)
                })
                .or_else(|| state.records.first())
                .cloned()
        })
    }

    /// Whether a load is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.read_state(|state| state.loading)
    }

    /// The last load failure, if the most recent load did not succeed.
    pub fn load_error(&self) -> Option<String> {
        self.read_state(|state| state.load_error.clone())
    }

    /// Subscribe to the availability-changed signal. The value is a change
    /// counter; observers re-read the registry when it moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.availability_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn install_records(&self, records: Vec<ModelRecord>) {
        self.write_state(|state| state.records = records);
        self.notify();
    }

    fn notify(&self) {
        self.shared.availability_tx.send_modify(|version| *version += 1);
    }

    fn read_state<T>(&self, reader: impl FnOnce(&RegistryState) -> T) -> T {
        let state = self.shared.state.read().expect("registry lock poisoned");
        reader(&state)
    }

    fn write_state<T>(&self, writer: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = self.shared.state.write().expect("registry lock poisoned");
        writer(&mut state)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn record(id: &str, class: TransportClass) -> ModelRecord {
        ModelRecord {
            id: id.to_string(),
            name: id.to_string(),
            class,
            priority: None,
            context_length: None,
            default: false,
            availability: match class {
                TransportClass::Gateway => Availability::Online,
                TransportClass::SelfHosted => Availability::Unknown,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn default_model_prefers_explicit_default() {
        let registry = ModelRegistry::new();
        let mut gateway = record("gpt-4o", TransportClass::Gateway);
        let mut flagged = record("qwen3-4b", TransportClass::SelfHosted);
        flagged.default = true;
        gateway.priority = Some(0);

        registry.install_records(vec![record("gemma-2b", TransportClass::SelfHosted), gateway, flagged]);

        assert_eq!(registry.default_model().map(|record| record.id).as_deref(), Some("qwen3-4b"));
    }

    #[test]
    fn default_model_falls_back_to_first_gateway_then_first_record() {
        let registry = ModelRegistry::new();
        registry.install_records(vec![
            record("gemma-2b", TransportClass::SelfHosted),
            record("gpt-4o", TransportClass::Gateway),
        ]);
        assert_eq!(registry.default_model().map(|record| record.id).as_deref(), Some("gpt-4o"));

        let registry = ModelRegistry::new();
        registry.install_records(vec![
            record("gemma-2b", TransportClass::SelfHosted),
            record("qwen3-4b", TransportClass::SelfHosted),
        ]);
        assert_eq!(
            registry.default_model().map(|record| record.id).as_deref(),
            Some("gemma-2b")
        );
    }

    #[test]
    fn availability_updates_are_idempotent_and_signal_subscribers() {
        let registry = ModelRegistry::new();
        registry.install_records(vec![record("gemma-2b", TransportClass::SelfHosted)]);

        let receiver = registry.subscribe();
        let before = *receiver.borrow();

        assert!(registry.set_availability("gemma-2b", Availability::Online));
        assert!(!registry.set_availability("gemma-2b", Availability::Online));
        assert!(registry.set_availability("gemma-2b", Availability::Offline));

        let after = *receiver.borrow();
        assert_eq!(after - before, 2);

        assert_eq!(
            registry.get("gemma-2b").map(|record| record.availability),
            Some(Availability::Offline)
        );
    }

    #[test]
    fn gateway_availability_is_pinned_online() {
        let registry = ModelRegistry::new();
        registry.install_records(vec![record("gpt-4o", TransportClass::Gateway)]);

        assert!(!registry.set_availability("gpt-4o", Availability::Offline));
        assert_eq!(
            registry.get("gpt-4o").map(|record| record.availability),
            Some(Availability::Online)
        );
    }

    #[test]
    fn unknown_model_update_is_a_noop() {
        let registry = ModelRegistry::new();

        assert!(!registry.set_availability("missing", Availability::Online));
        assert!(registry.get("missing").is_none());
        assert!(registry.classify("missing").is_err());
    }
}

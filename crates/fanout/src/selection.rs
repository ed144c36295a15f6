//! Helpers for keeping a model selection consistent with registry health.
//!
//! The engine itself never edits selections; hosts call these on the
//! availability-changed signal and right before building a request.

use crate::registry::{Availability, ModelRecord, ModelRegistry, TransportClass};

/// Records a user may select right now: everything not known to be offline.
pub fn selectable(records: &[ModelRecord]) -> Vec<&ModelRecord> {
    records
        .iter()
        .filter(|record| record.availability != Availability::Offline)
        .collect()
}

/// Identifiers belonging to one transport class, in registry order.
pub fn class_members<'a>(records: &'a [ModelRecord], class: TransportClass) -> Vec<&'a str> {
    records
        .iter()
        .filter(|record| record.class == class)
        .map(|record| record.id.as_str())
        .collect()
}

/// Drop every offline model from a selection, returning what was removed.
pub fn prune_offline(selection: &mut Vec<String>, registry: &ModelRegistry) -> Vec<String> {
    let mut removed = Vec::new();

    selection.retain(|model_id| match registry.get(model_id) {
        Some(record) if record.availability == Availability::Offline => {
            removed.push(model_id.clone());
            false
        }
        _ => true,
    });

    removed
}

/// Preferred gateway record to fall back to when no self-hosted model is
/// reachable: default-flagged first, then lowest priority, then registry
/// order.
pub fn gateway_fallback(records: &[ModelRecord]) -> Option<&ModelRecord> {
    records
        .iter()
        .filter(|record| record.class == TransportClass::Gateway)
        .min_by_key(|record| (!record.default, record.priority.unwrap_or(u32::MAX)))
}

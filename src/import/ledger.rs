//! Per-run ledgers: what was imported, and what failed

use crate::graph::{EntityId, EntityKind};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

/// A document node that became a knowledge-base entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedEntity {
    pub source_node_id: String,
    pub kind: EntityKind,
    pub entity: EntityId,
}

/// Source node id -> imported entity, in first-recorded order
///
/// Recording an id twice overwrites the earlier entry in place: when one
/// node yields several entities only the last one is kept.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportLedger {
    entries: IndexMap<String, ImportedEntity>,
}

impl ImportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entity` for `node_id`, returning the entry it replaced
    pub fn record(
        &mut self,
        node_id: impl Into<String>,
        kind: EntityKind,
        entity: EntityId,
    ) -> Option<ImportedEntity> {
        let node_id = node_id.into();
        let entry = ImportedEntity {
            source_node_id: node_id.clone(),
            kind,
            entity,
        };
        self.entries.insert(node_id, entry)
    }

    pub fn was_imported(&self, node_id: &str) -> bool {
        self.entries.contains_key(node_id)
    }

    pub fn get(&self, node_id: &str) -> Option<&ImportedEntity> {
        self.entries.get(node_id)
    }

    /// Move the entry of `from` to `to`; the `from` id disappears.
    /// Returns false when `from` was never imported.
    pub fn transfer(&mut self, from: &str, to: &str) -> bool {
        match self.entries.shift_remove(from) {
            Some(entry) => {
                self.record(to, entry.kind, entry.entity);
                true
            }
            None => false,
        }
    }

    /// The Event created for the document, if any
    pub fn event(&self) -> Option<&ImportedEntity> {
        self.iter().find(|e| e.kind == EntityKind::Event)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportedEntity> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub message: String,
    pub node_type: String,
    pub node_id: String,
}

/// Append-only list of per-node failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        message: impl Into<String>,
        node_type: impl Into<String>,
        node_id: impl Into<String>,
    ) {
        let record = FailureRecord {
            message: message.into(),
            node_type: node_type.into(),
            node_id: node_id.into(),
        };
        warn!(
            node_type = %record.node_type,
            node = %record.node_id,
            "Import failure: {}",
            record.message
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &FailureRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_overwrites_in_place() {
        let mut ledger = ImportLedger::new();
        assert!(ledger.record("ind-1", EntityKind::Indicator, EntityId::new(1)).is_none());
        ledger.record("obs-1", EntityKind::IP, EntityId::new(2));

        let previous = ledger.record("ind-1", EntityKind::Indicator, EntityId::new(3));
        assert_eq!(previous.map(|p| p.entity), Some(EntityId::new(1)));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("ind-1").unwrap().entity, EntityId::new(3));

        let order: Vec<_> = ledger.iter().map(|e| e.source_node_id.as_str()).collect();
        assert_eq!(order, ["ind-1", "obs-1"]);
    }

    #[test]
    fn test_transfer_moves_entry_to_wrapper() {
        let mut ledger = ImportLedger::new();
        ledger.record("obs-embedded", EntityKind::Domain, EntityId::new(5));

        assert!(ledger.transfer("obs-embedded", "ind-wrapper"));
        assert!(!ledger.was_imported("obs-embedded"));

        let entry = ledger.get("ind-wrapper").unwrap();
        assert_eq!(entry.source_node_id, "ind-wrapper");
        assert_eq!(entry.kind, EntityKind::Domain);
        assert_eq!(ledger.len(), 1);

        assert!(!ledger.transfer("missing", "ind-other"));
        assert!(!ledger.was_imported("ind-other"));
    }

    #[test]
    fn test_event_lookup() {
        let mut ledger = ImportLedger::new();
        ledger.record("obs-1", EntityKind::IP, EntityId::new(2));
        assert!(ledger.event().is_none());
        ledger.record("pkg-1", EntityKind::Event, EntityId::new(1));
        assert_eq!(ledger.event().unwrap().source_node_id, "pkg-1");
    }

    #[test]
    fn test_failures_keep_order() {
        let mut failures = FailureLedger::new();
        failures.push("first", "Observable", "obs-1");
        failures.push("second", "ThreatActor", "ta-1");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures.records()[1].node_type, "ThreatActor");
        assert_eq!(failures.iter().next().unwrap().message, "first");
    }
}

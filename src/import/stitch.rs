//! Relationship stitching
//!
//! Relationships found during the walk are only recorded, never created,
//! because the node on the other end may not have been imported yet. Once
//! the walk is complete the stitcher turns them into knowledge-base edges:
//!
//! 1. Event -> hinted entity, with the hinted type and confidence
//! 2. Event -> every other non-Event entity, "Related To" / "Unknown"
//! 3. Deferred relationships whose endpoints were both imported
//!
//! and finally saves every imported entity.

use super::ledger::{FailureLedger, ImportLedger};
use crate::graph::{EntityKind, RelationType};
use crate::kb::PersistenceHandlers;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const UNKNOWN_CONFIDENCE: &str = "Unknown";

/// A relationship between two document nodes, resolved after the walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredRelationship {
    pub left_id: String,
    pub relation_type: RelationType,
    pub right_id: String,
    pub confidence: String,
}

impl DeferredRelationship {
    pub fn new(
        left_id: impl Into<String>,
        relation_type: impl Into<RelationType>,
        right_id: impl Into<String>,
        confidence: impl Into<String>,
    ) -> Self {
        Self {
            left_id: left_id.into(),
            relation_type: relation_type.into(),
            right_id: right_id.into(),
            confidence: confidence.into(),
        }
    }

    /// Point either end at `to` where it referenced `from`
    pub fn rename_endpoint(&mut self, from: &str, to: &str) {
        if self.left_id == from {
            self.left_id = to.to_string();
        }
        if self.right_id == from {
            self.right_id = to.to_string();
        }
    }
}

/// Relation type and confidence to use for the Event edge of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRelationHint {
    pub relation_type: RelationType,
    pub confidence: String,
}

pub type EventRelationHints = HashMap<String, EventRelationHint>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StitchPolicy {
    /// Record deferred relationships with a missing endpoint as failures
    /// instead of dropping them
    pub record_unresolved: bool,
}

/// What the stitcher did
#[derive(Debug, Clone, Default, Serialize)]
pub struct StitchReport {
    pub hinted_edges: usize,
    pub default_edges: usize,
    pub deferred_edges: usize,
    /// Deferred relationships with an endpoint that was never imported
    pub dropped: Vec<DeferredRelationship>,
    /// Edge creations the knowledge base refused
    pub edge_errors: usize,
    pub saved: usize,
}

impl StitchReport {
    pub fn edges_created(&self) -> usize {
        self.hinted_edges + self.default_edges + self.deferred_edges
    }
}

/// Everything the stitcher reads from a finished walk
pub struct StitchInput<'a> {
    pub ledger: &'a ImportLedger,
    pub hints: &'a EventRelationHints,
    pub deferred: &'a [DeferredRelationship],
    pub analyst: &'a str,
}

pub fn stitch<K: PersistenceHandlers + ?Sized>(
    kb: &mut K,
    input: StitchInput<'_>,
    failures: &mut FailureLedger,
    policy: StitchPolicy,
) -> StitchReport {
    let mut report = StitchReport::default();
    let ledger = input.ledger;

    if let Some(event) = ledger.event() {
        for entry in ledger.iter() {
            let (rel_type, confidence, hinted) = match input.hints.get(&entry.source_node_id) {
                Some(hint) => (hint.relation_type.clone(), hint.confidence.as_str(), true),
                None if entry.kind != EntityKind::Event => {
                    (RelationType::related_to(), UNKNOWN_CONFIDENCE, false)
                }
                None => continue,
            };
            match kb.add_relationship(event.entity, entry.entity, &rel_type, confidence, input.analyst) {
                Ok(()) if hinted => report.hinted_edges += 1,
                Ok(()) => report.default_edges += 1,
                Err(e) => {
                    warn!("Failed to relate event to {}: {}", entry.source_node_id, e);
                    report.edge_errors += 1;
                }
            }
        }
    }

    for rel in input.deferred {
        let (Some(left), Some(right)) = (ledger.get(&rel.left_id), ledger.get(&rel.right_id)) else {
            debug!(
                left = %rel.left_id,
                right = %rel.right_id,
                "Dropping relationship with an unresolved endpoint"
            );
            if policy.record_unresolved {
                let missing = if ledger.was_imported(&rel.left_id) { &rel.right_id } else { &rel.left_id };
                failures.push(
                    format!("Unresolved {} relationship: {} was not imported", rel.relation_type, missing),
                    "Relationship",
                    rel.left_id.clone(),
                );
            }
            report.dropped.push(rel.clone());
            continue;
        };
        match kb.add_relationship(left.entity, right.entity, &rel.relation_type, &rel.confidence, input.analyst) {
            Ok(()) => report.deferred_edges += 1,
            Err(e) => {
                warn!("Failed to relate {} to {}: {}", rel.left_id, rel.right_id, e);
                report.edge_errors += 1;
            }
        }
    }

    for entry in ledger.iter() {
        match kb.save(entry.entity, input.analyst) {
            Ok(()) => report.saved += 1,
            Err(e) => warn!("Failed to save {}: {}", entry.source_node_id, e),
        }
    }

    info!(
        "Stitched {} edges ({} dropped, {} refused), saved {} entities",
        report.edges_created(),
        report.dropped.len(),
        report.edge_errors,
        report.saved
    );
    report
}

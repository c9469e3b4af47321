//! Import requests and the state of one import run

use super::ledger::{FailureLedger, ImportLedger};
use super::stitch::{DeferredRelationship, EventRelationHints};
use crate::config::ImportConfig;
use crate::graph::{EntityId, SourceAttribution};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Caller-supplied parameters of one import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub analyst: String,
    pub method: String,
    pub reference: Option<String>,
    pub make_event: bool,
    pub source_override: Option<String>,
}

impl ImportRequest {
    pub fn new(analyst: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            analyst: analyst.into(),
            method: method.into(),
            reference: None,
            make_event: false,
            source_override: None,
        }
    }

    /// Request carrying the configured defaults
    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.analyst.clone(), config.method.clone()).with_event(config.make_event)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_event(mut self, make_event: bool) -> Self {
        self.make_event = make_event;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_override = Some(source.into());
        self
    }
}

/// Progress of an import run; phases only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ImportPhase {
    HeaderResolved,
    EventCreated,
    IndicatorsWalked,
    ObservablesWalked,
    ThreatActorsWalked,
    AuxiliaryPassesRun,
    StitchingPending,
    Stitched,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::HeaderResolved => "header resolved",
            ImportPhase::EventCreated => "event created",
            ImportPhase::IndicatorsWalked => "indicators walked",
            ImportPhase::ObservablesWalked => "observables walked",
            ImportPhase::ThreatActorsWalked => "threat actors walked",
            ImportPhase::AuxiliaryPassesRun => "auxiliary passes run",
            ImportPhase::StitchingPending => "stitching pending",
            ImportPhase::Stitched => "stitched",
        };
        f.write_str(name)
    }
}

/// Everything one import produced, handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub run_id: Uuid,
    pub package_id: String,
    pub started_at: DateTime<Utc>,
    pub analyst: String,
    pub attribution: SourceAttribution,
    pub phase: ImportPhase,
    pub ledger: ImportLedger,
    pub failures: FailureLedger,
    pub deferred: Vec<DeferredRelationship>,
    pub hints: EventRelationHints,
    pub event: Option<EntityId>,
    /// Set when a campaign marker indicator ended the indicator walk
    pub campaign_mode: bool,
}

impl ImportRun {
    pub(crate) fn new(
        run_id: Uuid,
        package_id: &str,
        started_at: DateTime<Utc>,
        analyst: &str,
        attribution: SourceAttribution,
    ) -> Self {
        Self {
            run_id,
            package_id: package_id.to_string(),
            started_at,
            analyst: analyst.to_string(),
            attribution,
            phase: ImportPhase::HeaderResolved,
            ledger: ImportLedger::new(),
            failures: FailureLedger::new(),
            deferred: Vec::new(),
            hints: EventRelationHints::new(),
            event: None,
            campaign_mode: false,
        }
    }

    pub(crate) fn advance(&mut self, phase: ImportPhase) {
        debug_assert!(phase >= self.phase, "import phase moved backwards");
        self.phase = phase;
        info!(
            phase = %phase,
            imported = self.ledger.len(),
            failed = self.failures.len(),
            "Import phase complete"
        );
    }

    pub fn is_stitched(&self) -> bool {
        self.phase == ImportPhase::Stitched
    }
}

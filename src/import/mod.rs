//! Import resolution engine
//!
//! Walks one parsed threat-intelligence document and turns its nodes into
//! knowledge-base entities:
//!
//! 1. Resolve the source every created entity is attributed to
//! 2. Optionally create an Event for the document
//! 3. Walk indicators, observables and threat actors, one handler call per
//!    node, recording results in the import ledger and failures in the
//!    failure ledger
//! 4. Run the auxiliary metadata passes over imported indicators
//!
//! Relationship stitching is a separate, explicit step (`Importer::stitch`)
//! so callers can inspect the ledgers first.

pub mod classify;
pub mod ledger;
pub mod passes;
pub mod run;
pub mod source;
pub mod stitch;
mod walk;

pub use classify::{classify, Classification, ClassifyInput, FollowUp, Persisted, RULES};
pub use ledger::{FailureLedger, FailureRecord, ImportLedger, ImportedEntity};
pub use passes::AuxiliaryPasses;
pub use run::{ImportPhase, ImportRequest, ImportRun};
pub use source::{contributing_source, resolve_source, DECLARED_SOURCE_PREFIX};
pub use stitch::{
    stitch, DeferredRelationship, EventRelationHint, EventRelationHints, StitchInput,
    StitchPolicy, StitchReport,
};

use crate::config::ImportConfig;
use crate::document::{DocumentParser, JsonDocumentParser, ParseError};
use crate::kb::{HandlerError, KnowledgeBase};
use crate::vocab::{DefaultVocabulary, Vocabulary};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;
use walk::Walker;

/// Errors that abort a whole import
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),

    #[error("No source to attribute data to.")]
    NoSource,
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Why a single document node could not be imported
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("No valid object_properties was found!")]
    MissingProperties,

    #[error("Unsupported address category: {0}")]
    UnsupportedAddressCategory(String),

    #[error("No mapping for {0} objects")]
    Unmapped(String),

    #[error("Malformed {type_name} object: {reason}")]
    Malformed { type_name: String, reason: String },

    #[error("Artifact payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Artifact payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Entry point: imports documents into a knowledge base
pub struct Importer<'k, K: KnowledgeBase + ?Sized> {
    kb: &'k mut K,
    parser: Box<dyn DocumentParser>,
    vocab: Box<dyn Vocabulary>,
    config: ImportConfig,
}

impl<'k, K: KnowledgeBase + ?Sized> Importer<'k, K> {
    /// Importer with the JSON parser, the default vocabulary and default config
    pub fn new(kb: &'k mut K) -> Self {
        Self {
            kb,
            parser: Box::new(JsonDocumentParser::new()),
            vocab: Box::new(DefaultVocabulary),
            config: ImportConfig::default(),
        }
    }

    pub fn with_parser(mut self, parser: impl DocumentParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_vocabulary(mut self, vocab: impl Vocabulary + 'static) -> Self {
        self.vocab = Box::new(vocab);
        self
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &K {
        &*self.kb
    }

    /// Parse `data` and import every node it contains.
    ///
    /// Fails only when the document cannot be parsed or no known source can
    /// be attributed; in both cases nothing is written. Any other problem is
    /// recorded in the returned run's failure ledger. The run is left in
    /// `StitchingPending`; call [`Importer::stitch`] to create relationships.
    pub fn import(&mut self, data: &[u8], request: &ImportRequest) -> ImportResult<ImportRun> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let package = self.parser.parse(data)?;

        let span = info_span!("import", run = %run_id, package = %package.id);
        let _guard = span.enter();

        let attribution = resolve_source(&*self.kb, request, package.declared_source(), started_at)?;
        info!(
            "Importing {} nodes from {} for {}",
            package.node_count(),
            attribution.name(),
            request.analyst
        );

        let mut run = ImportRun::new(run_id, &package.id, started_at, &request.analyst, attribution.clone());

        Walker {
            kb: &mut *self.kb,
            package: &package,
            vocab: &*self.vocab,
            markers: &self.config.markers,
            attribution: &attribution,
            analyst: &request.analyst,
            run: &mut run,
        }
        .walk(request.make_event);

        AuxiliaryPasses {
            kb: &mut *self.kb,
            package: &package,
            vocab: &*self.vocab,
            config: &self.config,
            attribution: &attribution,
            ledger: &run.ledger,
            failures: &mut run.failures,
            started_at,
            campaign_mode: run.campaign_mode,
        }
        .run();
        run.advance(ImportPhase::AuxiliaryPassesRun);
        run.advance(ImportPhase::StitchingPending);

        info!(
            "Imported {} nodes, {} failures, {} deferred relationships",
            run.ledger.len(),
            run.failures.len(),
            run.deferred.len()
        );
        Ok(run)
    }

    /// Create the run's relationships and save every imported entity
    pub fn stitch(&mut self, run: &mut ImportRun) -> StitchReport {
        let span = info_span!("stitch", run = %run.run_id, package = %run.package_id);
        let _guard = span.enter();

        if run.is_stitched() {
            warn!("Run {} is already stitched", run.run_id);
            return StitchReport::default();
        }

        let policy = StitchPolicy {
            record_unresolved: self.config.record_unresolved_relationships,
        };
        let input = StitchInput {
            ledger: &run.ledger,
            hints: &run.hints,
            deferred: &run.deferred,
            analyst: &run.analyst,
        };
        let report = stitch::stitch(&mut *self.kb, input, &mut run.failures, policy);
        run.advance(ImportPhase::Stitched);
        report
    }

    /// Import then stitch in one call
    pub fn import_and_stitch(
        &mut self,
        data: &[u8],
        request: &ImportRequest,
    ) -> ImportResult<(ImportRun, StitchReport)> {
        let mut run = self.import(data, request)?;
        let report = self.stitch(&mut run);
        Ok((run, report))
    }
}

//! Knowledge base collaborator interface
//!
//! The import engine talks to the knowledge base only through the two traits
//! defined here:
//! - `PersistenceHandlers` create or upsert one entity per call
//! - `MetadataHandlers` attach auxiliary metadata to an existing entity
//!
//! `GraphKnowledgeBase` implements both over the in-memory entity store.

pub mod fields;
pub mod graph_kb;

pub use fields::{
    valid_ip_value, ActorFields, CampaignFields, CertificateFields, DomainFields, EmailFields,
    EntityFields, EventFields, IndicatorFields, IpFields, PcapFields, RawDataFields,
    SampleFields,
};
pub use graph_kb::GraphKnowledgeBase;

use crate::graph::{Comment, EntityId, EntityKind, GraphError, RelationType, Sighting, SourceAttribution};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a handler refused or failed a request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("{0}")]
    Rejected(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type HandlerResult<T = EntityId> = Result<T, HandlerError>;

/// Per-call context shared by every persistence handler
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub source: &'a SourceAttribution,
    pub analyst: &'a str,
    /// Ties every entity to the document that produced it
    pub correlation_id: &'a str,
}

/// Actor tag categories, each stored as its own list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorTagCategory {
    Sophistication,
    Motivation,
    ThreatType,
    IntendedEffect,
}

impl ActorTagCategory {
    pub const ALL: [ActorTagCategory; 4] = [
        ActorTagCategory::Sophistication,
        ActorTagCategory::Motivation,
        ActorTagCategory::ThreatType,
        ActorTagCategory::IntendedEffect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorTagCategory::Sophistication => "ActorSophistication",
            ActorTagCategory::Motivation => "ActorMotivation",
            ActorTagCategory::ThreatType => "ActorThreatType",
            ActorTagCategory::IntendedEffect => "ActorIntendedEffect",
        }
    }
}

/// Relationship to an entity that already lives in the knowledge base
#[derive(Debug, Clone, PartialEq)]
pub struct ForgedRelationship {
    /// Expected kind of the right-hand entity, when the producer names one
    pub right_kind: Option<EntityKind>,
    /// Knowledge-base identifier of the right-hand entity
    pub right_key: String,
    pub rel_type: RelationType,
    pub confidence: String,
    pub reason: String,
    pub date: Option<DateTime<Utc>>,
}

/// Entity creation, one method per entity kind
pub trait PersistenceHandlers {
    /// Whether `name` is a source data may be attributed to
    fn source_exists(&self, name: &str) -> bool;

    fn add_event(&mut self, fields: EventFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    /// Create the indicator, or append the source to an existing one
    fn add_indicator(&mut self, fields: IndicatorFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn upsert_ip(&mut self, fields: IpFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn upsert_domain(&mut self, fields: DomainFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_raw_data(&mut self, fields: RawDataFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_certificate(&mut self, fields: CertificateFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_pcap(&mut self, fields: PcapFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_sample(&mut self, fields: SampleFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_email(&mut self, fields: EmailFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_actor(&mut self, fields: ActorFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_campaign(&mut self, fields: CampaignFields, ctx: &HandlerContext<'_>) -> HandlerResult;

    fn add_relationship(
        &mut self,
        left: EntityId,
        right: EntityId,
        rel_type: &RelationType,
        confidence: &str,
        analyst: &str,
    ) -> HandlerResult<()>;

    fn save(&mut self, entity: EntityId, analyst: &str) -> HandlerResult<()>;
}

/// Auxiliary metadata on entities that already exist
pub trait MetadataHandlers {
    fn update_actor_tags(
        &mut self,
        actor: EntityId,
        category: ActorTagCategory,
        tags: &[String],
        analyst: &str,
    ) -> HandlerResult<()>;

    fn add_sample_filenames(&mut self, sample: EntityId, filenames: &[String], analyst: &str) -> HandlerResult<()>;

    fn comments(&self, entity: EntityId) -> HandlerResult<Vec<Comment>>;

    fn add_comment(&mut self, entity: EntityId, comment: Comment) -> HandlerResult<()>;

    fn add_sighting(&mut self, entity: EntityId, sighting: Sighting) -> HandlerResult<()>;

    fn add_source_instance(&mut self, entity: EntityId, source: &SourceAttribution) -> HandlerResult<()>;

    fn set_sectors(&mut self, entity: EntityId, sectors: &[String], analyst: &str) -> HandlerResult<()>;

    fn set_kill_chain(&mut self, entity: EntityId, phases: &[String], analyst: &str) -> HandlerResult<()>;

    /// Set the TLP color unless the entity already has one
    fn set_tlp(&mut self, entity: EntityId, color: &str, analyst: &str) -> HandlerResult<()>;

    fn set_releasability(&mut self, entity: EntityId, feed: &str, note: &str, analyst: &str) -> HandlerResult<()>;

    /// Attribute the entity to a campaign, creating the campaign if needed
    fn attach_campaign(
        &mut self,
        entity: EntityId,
        campaign: CampaignFields,
        ctx: &HandlerContext<'_>,
    ) -> HandlerResult<()>;

    fn merge_ttp(
        &mut self,
        campaign: EntityId,
        ttp: &str,
        date: Option<DateTime<Utc>>,
        analyst: &str,
    ) -> HandlerResult<()>;

    fn set_campaign_aliases(&mut self, campaign: EntityId, aliases: &[String], analyst: &str) -> HandlerResult<()>;

    fn add_rfi(
        &mut self,
        entity: EntityId,
        topic: &str,
        rfi_id: &str,
        date: Option<DateTime<Utc>>,
        analyst: &str,
    ) -> HandlerResult<()>;

    fn add_rfi_request(
        &mut self,
        entity: EntityId,
        topic: &str,
        request: &str,
        source: &str,
        date: Option<DateTime<Utc>>,
    ) -> HandlerResult<()>;

    fn add_rfi_response(
        &mut self,
        entity: EntityId,
        topic: &str,
        request: &str,
        response: &str,
        source: &str,
        date: Option<DateTime<Utc>>,
    ) -> HandlerResult<()>;

    fn forge_relationship(
        &mut self,
        left: EntityId,
        relationship: ForgedRelationship,
        analyst: &str,
    ) -> HandlerResult<()>;
}

/// Everything the import engine needs from a knowledge base
pub trait KnowledgeBase: PersistenceHandlers + MetadataHandlers {}

impl<T: PersistenceHandlers + MetadataHandlers + ?Sized> KnowledgeBase for T {}

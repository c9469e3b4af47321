//! In-memory knowledge base over the entity store

use super::fields::EntityFields;
use super::*;
use crate::graph::{
    Entity, EntityStore, Relationship, RelationId, Releasability, Rfi, RfiRequest, RfiResponse,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

const TLP_COLORS: [&str; 4] = ["WHITE", "GREEN", "AMBER", "RED"];

/// Property-graph knowledge base
///
/// Upserts by natural key (IP, Domain, Indicator, Actor, Campaign, Email
/// message id) and by payload digest (Sample, Certificate, PCAP, RawData).
/// Data may only be attributed to registered sources.
#[derive(Debug, Default)]
pub struct GraphKnowledgeBase {
    store: EntityStore,
    sources: BTreeSet<String>,
}

impl GraphKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kb = Self::new();
        for source in sources {
            kb.register_source(source);
        }
        kb
    }

    pub fn register_source(&mut self, name: impl Into<String>) {
        let name = name.into();
        info!("Registered source {}", name);
        self.sources.insert(name);
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn into_store(self) -> EntityStore {
        self.store
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.store.get_entity(id)
    }

    fn persist<F: EntityFields>(&mut self, fields: F, ctx: &HandlerContext<'_>) -> HandlerResult {
        if !self.source_exists(ctx.source.name()) {
            return Err(HandlerError::UnknownSource(ctx.source.name().to_string()));
        }
        fields.validate().map_err(HandlerError::Rejected)?;

        let key = fields.natural_key();
        if let Some(id) = key.as_deref().and_then(|k| self.store.find_by_key(F::KIND, k)) {
            self.store.entity_mut(id)?.add_source(ctx.source);
            debug!(kind = %F::KIND, entity = %id, "Appended source to existing entity");
            return Ok(id);
        }

        let mut properties = fields.into_properties();
        properties.insert("created_by".to_string(), ctx.analyst.into());
        properties.insert("correlation_id".to_string(), ctx.correlation_id.into());
        let id = match key {
            Some(key) => self.store.create_keyed_entity(F::KIND, key, properties),
            None => self.store.create_entity(F::KIND, properties),
        };
        self.store.entity_mut(id)?.add_source(ctx.source);
        debug!(kind = %F::KIND, entity = %id, "Created entity");
        Ok(id)
    }

    /// Mutable access to an entity that must be of `kind`
    fn entity_of_kind(&mut self, id: EntityId, kind: EntityKind) -> HandlerResult<&mut Entity> {
        let entity = self.store.entity_mut(id)?;
        if entity.kind != kind {
            return Err(HandlerError::Rejected(format!(
                "Entity {} is a {}, not a {}",
                id, entity.kind, kind
            )));
        }
        Ok(entity)
    }

    fn append_list(&mut self, id: EntityId, category: &str, values: &[String]) -> HandlerResult<()> {
        let entity = self.store.entity_mut(id)?;
        let added = entity.append_tags(category, non_blank(values));
        debug!(entity = %id, category, added, "Updated list");
        Ok(())
    }

    fn rfi_mut(&mut self, id: EntityId, topic: &str) -> HandlerResult<&mut Rfi> {
        self.store
            .entity_mut(id)?
            .rfis
            .iter_mut()
            .find(|rfi| rfi.topic == topic)
            .ok_or_else(|| HandlerError::Rejected(format!("No RFI with topic '{}'", topic)))
    }
}

fn non_blank(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl PersistenceHandlers for GraphKnowledgeBase {
    fn source_exists(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    fn add_event(&mut self, fields: EventFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_indicator(&mut self, fields: IndicatorFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn upsert_ip(&mut self, fields: IpFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn upsert_domain(&mut self, fields: DomainFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_raw_data(&mut self, fields: RawDataFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_certificate(&mut self, fields: CertificateFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_pcap(&mut self, fields: PcapFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_sample(&mut self, fields: SampleFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_email(&mut self, fields: EmailFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_actor(&mut self, fields: ActorFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    fn add_campaign(&mut self, fields: CampaignFields, ctx: &HandlerContext<'_>) -> HandlerResult {
        self.persist(fields, ctx)
    }

    /// Re-asserting an existing relationship is a no-op
    fn add_relationship(
        &mut self,
        left: EntityId,
        right: EntityId,
        rel_type: &RelationType,
        confidence: &str,
        analyst: &str,
    ) -> HandlerResult<()> {
        match self
            .store
            .create_relationship(left, right, rel_type.clone(), confidence, analyst)
        {
            Ok(_) | Err(GraphError::RelationshipExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, entity: EntityId, analyst: &str) -> HandlerResult<()> {
        let revision = self.store.save_entity(entity)?;
        debug!(entity = %entity, revision, analyst, "Saved entity");
        Ok(())
    }
}

impl MetadataHandlers for GraphKnowledgeBase {
    fn update_actor_tags(
        &mut self,
        actor: EntityId,
        category: ActorTagCategory,
        tags: &[String],
        _analyst: &str,
    ) -> HandlerResult<()> {
        self.entity_of_kind(actor, EntityKind::Actor)?;
        self.append_list(actor, category.as_str(), tags)
    }

    fn add_sample_filenames(&mut self, sample: EntityId, filenames: &[String], _analyst: &str) -> HandlerResult<()> {
        self.entity_of_kind(sample, EntityKind::Sample)?;
        self.append_list(sample, "filenames", filenames)
    }

    fn comments(&self, entity: EntityId) -> HandlerResult<Vec<Comment>> {
        self.store
            .get_entity(entity)
            .map(|e| e.comments.clone())
            .ok_or_else(|| GraphError::EntityNotFound(entity).into())
    }

    fn add_comment(&mut self, entity: EntityId, comment: Comment) -> HandlerResult<()> {
        if comment.text.trim().is_empty() {
            return Err(HandlerError::Rejected("Comment text is empty".to_string()));
        }
        self.store.entity_mut(entity)?.comments.push(comment);
        Ok(())
    }

    fn add_sighting(&mut self, entity: EntityId, sighting: Sighting) -> HandlerResult<()> {
        let target = self.store.entity_mut(entity)?;
        if !target.sightings.iter().any(|s| s.name == sighting.name && s.date == sighting.date) {
            target.sightings.push(sighting);
        }
        Ok(())
    }

    fn add_source_instance(&mut self, entity: EntityId, source: &SourceAttribution) -> HandlerResult<()> {
        self.store.entity_mut(entity)?.add_source(source);
        Ok(())
    }

    fn set_sectors(&mut self, entity: EntityId, sectors: &[String], _analyst: &str) -> HandlerResult<()> {
        self.append_list(entity, "sectors", sectors)
    }

    fn set_kill_chain(&mut self, entity: EntityId, phases: &[String], _analyst: &str) -> HandlerResult<()> {
        self.append_list(entity, "kill_chain", phases)
    }

    fn set_tlp(&mut self, entity: EntityId, color: &str, _analyst: &str) -> HandlerResult<()> {
        let color = color.trim().to_uppercase();
        if !TLP_COLORS.contains(&color.as_str()) {
            return Err(HandlerError::Rejected(format!("Invalid TLP color: {}", color)));
        }
        self.store.entity_mut(entity)?.set_tlp_once(&color);
        Ok(())
    }

    fn set_releasability(&mut self, entity: EntityId, feed: &str, note: &str, analyst: &str) -> HandlerResult<()> {
        if feed.trim().is_empty() {
            return Err(HandlerError::Rejected("Releasability needs a feed name".to_string()));
        }
        let target = self.store.entity_mut(entity)?;
        if !target.releasability.iter().any(|r| r.name == feed) {
            target.releasability.push(Releasability {
                name: feed.to_string(),
                note: note.to_string(),
                analyst: analyst.to_string(),
            });
        }
        Ok(())
    }

    fn attach_campaign(
        &mut self,
        entity: EntityId,
        campaign: CampaignFields,
        ctx: &HandlerContext<'_>,
    ) -> HandlerResult<()> {
        self.store.entity_mut(entity)?;
        let name = campaign.name.trim().to_string();
        self.persist(campaign, ctx)?;
        self.append_list(entity, "campaigns", &[name])
    }

    fn merge_ttp(
        &mut self,
        campaign: EntityId,
        ttp: &str,
        date: Option<DateTime<Utc>>,
        _analyst: &str,
    ) -> HandlerResult<()> {
        let target = self.entity_of_kind(campaign, EntityKind::Campaign)?;
        if target.append_tags("ttps", non_blank(&[ttp.to_string()])) > 0 {
            if let Some(date) = date {
                target.set_property("ttps_updated", date);
            }
        }
        Ok(())
    }

    fn set_campaign_aliases(&mut self, campaign: EntityId, aliases: &[String], _analyst: &str) -> HandlerResult<()> {
        self.entity_of_kind(campaign, EntityKind::Campaign)?;
        self.append_list(campaign, "aliases", aliases)
    }

    fn add_rfi(
        &mut self,
        entity: EntityId,
        topic: &str,
        rfi_id: &str,
        date: Option<DateTime<Utc>>,
        analyst: &str,
    ) -> HandlerResult<()> {
        if topic.trim().is_empty() {
            return Err(HandlerError::Rejected("RFI topic is empty".to_string()));
        }
        let target = self.store.entity_mut(entity)?;
        if !target.rfis.iter().any(|rfi| rfi.topic == topic) {
            target.rfis.push(Rfi {
                topic: topic.to_string(),
                rfi_id: rfi_id.to_string(),
                analyst: analyst.to_string(),
                date,
                requests: Vec::new(),
            });
        }
        Ok(())
    }

    fn add_rfi_request(
        &mut self,
        entity: EntityId,
        topic: &str,
        request: &str,
        source: &str,
        date: Option<DateTime<Utc>>,
    ) -> HandlerResult<()> {
        let rfi = self.rfi_mut(entity, topic)?;
        if !rfi.requests.iter().any(|r| r.request == request) {
            rfi.requests.push(RfiRequest {
                request: request.to_string(),
                source: source.to_string(),
                date,
                responses: Vec::new(),
            });
        }
        Ok(())
    }

    fn add_rfi_response(
        &mut self,
        entity: EntityId,
        topic: &str,
        request: &str,
        response: &str,
        source: &str,
        date: Option<DateTime<Utc>>,
    ) -> HandlerResult<()> {
        let rfi = self.rfi_mut(entity, topic)?;
        let thread = rfi
            .requests
            .iter_mut()
            .find(|r| r.request == request)
            .ok_or_else(|| HandlerError::Rejected(format!("No RFI request '{}'", request)))?;
        if !thread.responses.iter().any(|r| r.response == response && r.source == source) {
            thread.responses.push(RfiResponse {
                response: response.to_string(),
                source: source.to_string(),
                date,
            });
        }
        Ok(())
    }

    fn forge_relationship(
        &mut self,
        left: EntityId,
        relationship: ForgedRelationship,
        analyst: &str,
    ) -> HandlerResult<()> {
        if relationship.rel_type.as_str().trim().is_empty() {
            return Err(HandlerError::Rejected("Relationship type is empty".to_string()));
        }
        let right: EntityId = relationship.right_key.parse().map_err(|_| {
            HandlerError::Rejected(format!("Invalid entity id: {}", relationship.right_key))
        })?;
        let target = self
            .store
            .get_entity(right)
            .ok_or_else(|| HandlerError::Rejected(format!("Relationship target {} not found", right)))?;
        if let Some(kind) = relationship.right_kind {
            if target.kind != kind {
                return Err(HandlerError::Rejected(format!(
                    "Relationship target {} is a {}, not a {}",
                    right, target.kind, kind
                )));
            }
        }

        let mut rel = Relationship::new(
            RelationId::new(0),
            left,
            right,
            relationship.rel_type,
            relationship.confidence,
            analyst,
        )
        .with_reason(relationship.reason);
        if let Some(date) = relationship.date {
            rel = rel.with_date(date);
        }
        match self.store.insert_relationship(rel) {
            Ok(_) | Err(GraphError::RelationshipExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Top-level walk over a parsed document
//!
//! Optional event creation, then indicators, observables and threat actors,
//! in that order. Every handler outcome lands in the run's ledgers; nothing
//! here aborts on a single node.

use super::classify::{check_payload, classify, indicator_fields, ClassifyInput, FollowUp, Persisted};
use super::run::{ImportPhase, ImportRun};
use super::stitch::{DeferredRelationship, EventRelationHint, UNKNOWN_CONFIDENCE};
use super::NodeError;
use crate::config::MarkerTitles;
use crate::document::{Indicator, Observable, Package};
use crate::graph::{EntityKind, RelationType, SourceAttribution};
use crate::kb::{ActorFields, ActorTagCategory, CampaignFields, EventFields, HandlerContext, KnowledgeBase};
use crate::vocab::{Vocabulary, DEFAULT_EVENT_TYPE};
use std::fmt::Display;
use tracing::debug;

const OBSERVABLE_NODE: &str = "Observable";
const THREAT_ACTOR_NODE: &str = "ThreatActor";
const ATTACHMENT_CONFIDENCE: &str = "High";

pub(crate) struct Walker<'a, K: KnowledgeBase + ?Sized> {
    pub kb: &'a mut K,
    pub package: &'a Package,
    pub vocab: &'a dyn Vocabulary,
    pub markers: &'a MarkerTitles,
    pub attribution: &'a SourceAttribution,
    pub analyst: &'a str,
    pub run: &'a mut ImportRun,
}

impl<'a, K: KnowledgeBase + ?Sized> Walker<'a, K> {
    pub fn walk(mut self, make_event: bool) {
        if make_event {
            self.create_event();
            self.run.advance(ImportPhase::EventCreated);
        }

        self.walk_indicators();
        self.run.advance(ImportPhase::IndicatorsWalked);

        let package = self.package;
        self.walk_observables(&package.observables);
        self.run.advance(ImportPhase::ObservablesWalked);

        self.walk_threat_actors();
        self.run.advance(ImportPhase::ThreatActorsWalked);
    }

    fn ctx(&self) -> HandlerContext<'a> {
        HandlerContext {
            source: self.attribution,
            analyst: self.analyst,
            correlation_id: &self.package.id,
        }
    }

    fn fail(&mut self, message: impl Display, node_type: &str, node_id: &str) {
        self.run.failures.push(message.to_string(), node_type, node_id);
    }

    /// Event for the whole document, recorded under the package id
    fn create_event(&mut self) {
        let package = self.package;
        let header = package.header.as_ref();
        let title = header
            .and_then(|h| h.title.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("STIX Document {}", package.id));
        let description = header
            .and_then(|h| h.description.clone())
            .unwrap_or_else(|| self.run.started_at.to_string());
        let event_type = header
            .and_then(|h| h.package_intents.first())
            .and_then(|intent| self.vocab.event_type(intent))
            .unwrap_or(DEFAULT_EVENT_TYPE)
            .to_string();

        let fields = EventFields {
            title,
            description,
            event_type,
            date: self.run.started_at,
        };
        let ctx = self.ctx();
        match self.kb.add_event(fields, &ctx) {
            Ok(event) => {
                self.run.ledger.record(package.id.clone(), EntityKind::Event, event);
                self.run.event = Some(event);
                if let Some(incident) = package.incidents.first() {
                    for related in &incident.related_indicators {
                        let hint = EventRelationHint {
                            relation_type: related
                                .relationship
                                .clone()
                                .map(RelationType::new)
                                .unwrap_or_else(RelationType::related_to),
                            confidence: related
                                .confidence
                                .clone()
                                .unwrap_or_else(|| UNKNOWN_CONFIDENCE.to_string()),
                        };
                        self.run.hints.insert(related.idref.clone(), hint);
                    }
                }
                debug!(event = %event, hints = self.run.hints.len(), "Created document event");
            }
            Err(e) => self.fail(e, "Event", &package.id),
        }
    }

    fn walk_indicators(&mut self) {
        let (package, markers) = (self.package, self.markers);
        for indicator in &package.indicators {
            if indicator.title_contains(&markers.top_level_object) {
                self.walk_observables(&indicator.observables);
                if let Some(embedded) = indicator.observables.first() {
                    if self.run.ledger.transfer(&embedded.id, &indicator.id) {
                        for relationship in &mut self.run.deferred {
                            relationship.rename_endpoint(&embedded.id, &indicator.id);
                        }
                        debug!(from = %embedded.id, to = %indicator.id, "Moved wrapped observable to its indicator");
                    }
                }
                continue;
            }
            if indicator.title_contains(&markers.campaign) {
                self.import_campaigns(indicator);
                self.run.campaign_mode = true;
                break;
            }
            self.import_indicator(indicator);
        }
    }

    /// One Indicator entity per observable value; the node id keeps the last
    fn import_indicator(&mut self, indicator: &Indicator) {
        let ctx = self.ctx();
        for observable in &indicator.observables {
            let Some(properties) = observable.properties() else {
                self.fail(NodeError::MissingProperties, OBSERVABLE_NODE, &observable.id);
                continue;
            };
            let object_id = observable
                .object
                .as_ref()
                .and_then(|o| o.id.clone())
                .unwrap_or_else(|| observable.id.clone());
            let node_type = properties.type_name();
            if let Err(e) = check_payload(properties) {
                self.fail(e, node_type, &object_id);
                continue;
            }
            let Some(form) = self.vocab.indicator_form(properties) else {
                self.fail(NodeError::Unmapped(node_type.to_string()), node_type, &object_id);
                continue;
            };
            for fields in indicator_fields(&form.indicator_type, &form.values) {
                match self.kb.add_indicator(fields, &ctx) {
                    Ok(entity) => {
                        self.run.ledger.record(indicator.id.clone(), EntityKind::Indicator, entity);
                    }
                    Err(e) => self.fail(e, node_type, &object_id),
                }
            }
        }
    }

    /// Campaign marker: document campaigns are imported under the marker id
    fn import_campaigns(&mut self, marker: &Indicator) {
        let ctx = self.ctx();
        let package = self.package;
        for campaign in &package.campaigns {
            let fields = CampaignFields {
                name: campaign.title.clone().unwrap_or_default(),
                description: campaign.description.clone(),
            };
            match self.kb.add_campaign(fields, &ctx) {
                Ok(entity) => {
                    self.run.ledger.record(marker.id.clone(), EntityKind::Campaign, entity);
                }
                Err(e) => self.fail(e, "Campaign", &campaign.id),
            }
        }
    }

    /// Compositions are flattened; results are recorded under the
    /// top-level observable id
    fn walk_observables(&mut self, observables: &[Observable]) {
        let ctx = self.ctx();
        let (package, vocab) = (self.package, self.vocab);
        let package_id = package.id.as_str();
        for top in observables {
            for member in top.members() {
                let Some((object, properties)) = member
                    .object
                    .as_ref()
                    .and_then(|o| o.properties.as_ref().map(|p| (o, p)))
                else {
                    self.fail(NodeError::MissingProperties, OBSERVABLE_NODE, &member.id);
                    continue;
                };
                let node_type = properties.type_name();
                let input = ClassifyInput { object, properties, vocab, package_id };
                let classification = match classify(&input) {
                    Ok(classification) => classification,
                    Err(e) => {
                        self.fail(e, node_type, &member.id);
                        continue;
                    }
                };
                for outcome in classification.persist(&mut *self.kb, &ctx) {
                    match outcome {
                        Ok(persisted) => {
                            self.run.ledger.record(top.id.clone(), persisted.kind, persisted.entity);
                            self.follow_up(top, node_type, &member.id, persisted);
                        }
                        Err(e) => self.fail(e, node_type, &member.id),
                    }
                }
            }
        }
    }

    fn follow_up(&mut self, top: &Observable, node_type: &str, member_id: &str, persisted: Persisted) {
        match persisted.follow_up {
            FollowUp::None => {}
            FollowUp::SampleFilenames(filenames) => {
                if filenames.is_empty() {
                    return;
                }
                if let Err(e) = self.kb.add_sample_filenames(persisted.entity, &filenames, self.analyst) {
                    self.fail(e, node_type, member_id);
                }
            }
            FollowUp::EmailAttachments(attachments) => {
                for attachment in attachments {
                    self.run.deferred.push(DeferredRelationship::new(
                        top.id.clone(),
                        RelationType::CONTAINS,
                        attachment,
                        ATTACHMENT_CONFIDENCE,
                    ));
                }
            }
        }
    }

    fn walk_threat_actors(&mut self) {
        let ctx = self.ctx();
        let (package, vocab) = (self.package, self.vocab);
        for actor in &package.threat_actors {
            let fields = ActorFields {
                name: actor.title.clone().unwrap_or_default(),
                description: actor.description.clone(),
            };
            let entity = match self.kb.add_actor(fields, &ctx) {
                Ok(entity) => entity,
                Err(e) => {
                    self.fail(e, THREAT_ACTOR_NODE, &actor.id);
                    continue;
                }
            };

            let categories = [
                (ActorTagCategory::Sophistication, &actor.sophistications),
                (ActorTagCategory::Motivation, &actor.motivations),
                (ActorTagCategory::ThreatType, &actor.types),
                (ActorTagCategory::IntendedEffect, &actor.intended_effects),
            ];
            for (category, values) in categories {
                let tags: Vec<String> = values
                    .iter()
                    .filter_map(|v| vocab.actor_tag(v))
                    .map(str::to_string)
                    .collect();
                if tags.is_empty() {
                    continue;
                }
                if let Err(e) = self.kb.update_actor_tags(entity, category, &tags, self.analyst) {
                    self.fail(e, THREAT_ACTOR_NODE, &actor.id);
                }
            }
            self.run.ledger.record(actor.id.clone(), EntityKind::Actor, entity);
        }
    }
}

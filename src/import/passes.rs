//! Auxiliary metadata passes
//!
//! Run after the walk. Each pass visits the document's indicators, skips the
//! ones that were never imported and applies an idempotent update to the
//! imported entity. A handler failure is recorded against the indicator and
//! the pass moves on.

use super::ledger::{FailureLedger, ImportLedger, ImportedEntity};
use super::source::contributing_source;
use crate::config::ImportConfig;
use crate::document::{Indicator, Package};
use crate::graph::{Comment, EntityKind, RelationType, Sighting, SourceAttribution};
use crate::kb::{CampaignFields, ForgedRelationship, HandlerContext, HandlerResult, KnowledgeBase};
use crate::vocab::Vocabulary;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use tracing::debug;

const INDICATOR_NODE: &str = "Indicator";

/// Indicators of the document paired with their ledger entries
fn imported<'a>(
    package: &'a Package,
    ledger: &'a ImportLedger,
) -> impl Iterator<Item = (&'a Indicator, &'a ImportedEntity)> + 'a {
    package
        .indicators
        .iter()
        .filter_map(move |indicator| ledger.get(&indicator.id).map(|entry| (indicator, entry)))
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct AuxiliaryPasses<'a, K: KnowledgeBase + ?Sized> {
    pub kb: &'a mut K,
    pub package: &'a Package,
    pub vocab: &'a dyn Vocabulary,
    pub config: &'a ImportConfig,
    pub attribution: &'a SourceAttribution,
    pub ledger: &'a ImportLedger,
    pub failures: &'a mut FailureLedger,
    pub started_at: DateTime<Utc>,
    pub campaign_mode: bool,
}

impl<'a, K: KnowledgeBase + ?Sized> AuxiliaryPasses<'a, K> {
    pub fn run(mut self) {
        if self.campaign_mode {
            self.ttps();
            self.aliases();
        }
        self.comments();
        self.relations();
        self.sources();
        self.sectors();
        self.sightings();
        self.kill_chain();
        self.rfi();
        if !self.package.campaigns.is_empty() {
            self.related_campaigns();
        }
        let package = self.package;
        if let Some(color) = package.header.as_ref().and_then(|h| h.tlp_color()) {
            self.tlp(color);
        }
        self.releasability();
    }

    fn analyst(&self) -> &'a str {
        &self.config.metadata_analyst
    }

    fn check(&mut self, indicator: &Indicator, result: HandlerResult<()>) {
        if let Err(e) = result {
            self.fail(indicator, e);
        }
    }

    fn fail(&mut self, indicator: &Indicator, message: impl Display) {
        self.failures.push(message.to_string(), INDICATOR_NODE, indicator.id.clone());
    }

    /// Analyst comments carried as related indicators
    pub fn comments(&mut self) {
        let analyst = self.analyst();
        let (package, ledger, config) = (self.package, self.ledger, self.config);
        for (indicator, entry) in imported(package, ledger) {
            let mut existing = match self.kb.comments(entry.entity) {
                Ok(comments) => comments,
                Err(e) => {
                    self.fail(indicator, e);
                    continue;
                }
            };
            for rel in indicator.related_titled(&config.markers.comment) {
                let text = rel.description.clone().unwrap_or_default();
                if existing.iter().any(|c| c.is_duplicate_of(&text, rel.timestamp.as_ref())) {
                    debug!(indicator = %indicator.id, "Skipping duplicate comment");
                    continue;
                }
                let comment = Comment {
                    text,
                    url_key: rel
                        .short_description
                        .clone()
                        .unwrap_or_else(|| entry.entity.to_string()),
                    analyst: analyst.to_string(),
                    source_analyst: rel
                        .producer
                        .as_ref()
                        .and_then(|p| p.contributing_sources.iter().filter_map(|s| s.identity_name()).last())
                        .map(str::to_string),
                    date: rel.timestamp,
                    private: false,
                };
                let result = self.kb.add_comment(entry.entity, comment.clone());
                if result.is_ok() {
                    existing.push(comment);
                }
                self.check(indicator, result);
            }
        }
    }

    /// Relationships to entities that already exist in the knowledge base
    pub fn relations(&mut self) {
        let analyst = self.analyst();
        let (package, ledger, config) = (self.package, self.ledger, self.config);
        for (indicator, entry) in imported(package, ledger) {
            for rel in indicator.related_titled(&config.markers.relation) {
                let forged = ForgedRelationship {
                    right_kind: self.vocab.relation_target_kind(&rel.indicator_types),
                    right_key: rel.id.clone(),
                    rel_type: RelationType::new(rel.short_description.clone().unwrap_or_default()),
                    confidence: rel.confidence.clone().unwrap_or_else(|| "Unknown".to_string()),
                    reason: rel.description.clone().unwrap_or_default(),
                    date: rel.timestamp,
                };
                let result = self.kb.forge_relationship(entry.entity, forged, analyst);
                self.check(indicator, result);
            }
        }
    }

    /// Contributing sources of the indicator's producer
    pub fn sources(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            let Some(producer) = &indicator.producer else { continue };
            for item in &producer.contributing_sources {
                match contributing_source(item, analyst, self.started_at) {
                    Ok(source) => {
                        let result = self.kb.add_source_instance(entry.entity, &source);
                        self.check(indicator, result);
                    }
                    Err(message) => self.fail(indicator, message),
                }
            }
            let result = self.kb.save(entry.entity, analyst);
            self.check(indicator, result);
        }
    }

    pub fn sectors(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            let sectors = non_blank(&indicator.short_descriptions);
            if sectors.is_empty() {
                continue;
            }
            let result = self.kb.set_sectors(entry.entity, &sectors, analyst);
            self.check(indicator, result);
        }
    }

    pub fn sightings(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            for sighting in &indicator.sightings {
                let Some(source) = &sighting.source else { continue };
                for item in &source.contributing_sources {
                    let Some(name) = item.identity_name() else {
                        self.fail(indicator, "Sighting source has no identity name");
                        continue;
                    };
                    let sighting = Sighting {
                        name: name.to_string(),
                        date: item.start_time(),
                        analyst: analyst.to_string(),
                    };
                    let result = self.kb.add_sighting(entry.entity, sighting);
                    self.check(indicator, result);
                }
            }
        }
    }

    /// Phase ids without a known phase are skipped
    pub fn kill_chain(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            let phases: Vec<String> = indicator
                .kill_chain_phases
                .iter()
                .filter_map(|phase| self.vocab.kill_chain_phase(&phase.phase_id))
                .collect();
            if phases.is_empty() {
                continue;
            }
            let result = self.kb.set_kill_chain(entry.entity, &phases, analyst);
            self.check(indicator, result);
        }
    }

    /// Request-for-information threads: topic, request, responses
    pub fn rfi(&mut self) {
        let analyst = self.analyst();
        let (package, ledger, config) = (self.package, self.ledger, self.config);
        for (indicator, entry) in imported(package, ledger) {
            for rel in indicator.related_titled(&config.markers.rfi) {
                let Some(topic) = rel.description.as_deref().filter(|t| !t.trim().is_empty()) else {
                    self.fail(indicator, "RFI has no topic");
                    continue;
                };
                let result = self.kb.add_rfi(entry.entity, topic, &rel.id, rel.timestamp, analyst);
                if result.is_err() {
                    self.check(indicator, result);
                    continue;
                }

                let Some(producer) = &rel.producer else { continue };
                let request = producer.description.clone().unwrap_or_default();
                let requester = producer.identity_name().unwrap_or_default();
                let result =
                    self.kb
                        .add_rfi_request(entry.entity, topic, &request, requester, producer.start_time());
                if result.is_err() {
                    self.check(indicator, result);
                    continue;
                }

                for item in &producer.contributing_sources {
                    let response = item.description.clone().unwrap_or_default();
                    let result = self.kb.add_rfi_response(
                        entry.entity,
                        topic,
                        &request,
                        &response,
                        item.identity_name().unwrap_or_default(),
                        item.start_time(),
                    );
                    self.check(indicator, result);
                }
            }
        }
    }

    /// Attribute imported entities to the document campaigns they reference
    pub fn related_campaigns(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        let ctx = HandlerContext {
            source: self.attribution,
            analyst,
            correlation_id: &package.id,
        };
        for (indicator, entry) in imported(package, ledger) {
            for related in &indicator.related_campaigns {
                let Some(campaign) = package.campaigns.iter().find(|c| c.id == related.idref) else {
                    continue;
                };
                let fields = CampaignFields {
                    name: campaign.title.clone().unwrap_or_default(),
                    description: campaign.description.clone(),
                };
                let result = self.kb.attach_campaign(entry.entity, fields, &ctx);
                self.check(indicator, result);
            }
        }
    }

    /// TLP from the header applies to every imported indicator
    pub fn tlp(&mut self, color: &str) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            let result = self.kb.set_tlp(entry.entity, color, analyst);
            self.check(indicator, result);
        }
    }

    pub fn releasability(&mut self) {
        let analyst = self.analyst();
        let (package, ledger, config) = (self.package, self.ledger, self.config);
        let attribution = self.attribution;
        let feed = config
            .releasability_feed
            .as_deref()
            .unwrap_or_else(|| attribution.name());
        for (indicator, entry) in imported(package, ledger) {
            let result = self.kb.set_releasability(entry.entity, feed, &package.id, analyst);
            self.check(indicator, result);
        }
    }

    /// Campaign mode only: TTP descriptions merge into the campaign
    pub fn ttps(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            if entry.kind != EntityKind::Campaign {
                continue;
            }
            for ttp in &indicator.indicated_ttps {
                let Some(description) = ttp.description.as_deref().filter(|d| !d.trim().is_empty()) else {
                    continue;
                };
                let result = self.kb.merge_ttp(entry.entity, description, ttp.timestamp, analyst);
                self.check(indicator, result);
            }
        }
    }

    /// Campaign mode only: indicator descriptions become campaign aliases
    pub fn aliases(&mut self) {
        let analyst = self.analyst();
        let (package, ledger) = (self.package, self.ledger);
        for (indicator, entry) in imported(package, ledger) {
            if entry.kind != EntityKind::Campaign {
                continue;
            }
            let aliases = non_blank(&indicator.descriptions);
            if aliases.is_empty() {
                continue;
            }
            let result = self.kb.set_campaign_aliases(entry.entity, &aliases, analyst);
            self.check(indicator, result);
        }
    }
}

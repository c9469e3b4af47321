//! Entity implementation for the knowledge base
//!
//! An entity is one persisted domain object (an IP, a Sample, an Event, ...).
//! Entities carry:
//! - A unique ID and an entity kind
//! - Scalar properties (the handler field set)
//! - Source attributions
//! - Append-only tag lists and auxiliary metadata (comments, sightings, RFIs)
//! - A revision counter bumped on every save

use super::property::{PropertyMap, PropertyValue};
use super::source::SourceAttribution;
use super::types::{EntityId, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Analyst comment on an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub url_key: String,
    pub analyst: String,
    pub source_analyst: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub private: bool,
}

impl Comment {
    /// Text with line endings unified and surrounding whitespace removed
    pub fn normalized_text(text: &str) -> String {
        text.replace("\r\n", "\n").trim().to_string()
    }

    /// Whether this comment already records `text` at `date`
    pub fn is_duplicate_of(&self, text: &str, date: Option<&DateTime<Utc>>) -> bool {
        self.date.as_ref() == date
            && Self::normalized_text(&self.text) == Self::normalized_text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
    pub analyst: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfiResponse {
    pub response: String,
    pub source: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfiRequest {
    pub request: String,
    pub source: String,
    pub date: Option<DateTime<Utc>>,
    pub responses: Vec<RfiResponse>,
}

/// Request-for-information thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rfi {
    pub topic: String,
    pub rfi_id: String,
    pub analyst: String,
    pub date: Option<DateTime<Utc>>,
    pub requests: Vec<RfiRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Releasability {
    pub name: String,
    pub note: String,
    pub analyst: String,
}

/// A persisted entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    pub kind: EntityKind,

    /// Bumped on every save
    pub revision: u64,

    /// Field set supplied by the persistence handler
    pub properties: PropertyMap,

    pub sources: Vec<SourceAttribution>,

    /// Append-only string lists keyed by category (sectors, aliases, ...)
    pub tags: BTreeMap<String, Vec<String>>,

    /// Traffic Light Protocol color, set once
    pub tlp: Option<String>,

    pub comments: Vec<Comment>,

    pub sightings: Vec<Sighting>,

    pub rfis: Vec<Rfi>,

    pub releasability: Vec<Releasability>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        let now = Utc::now();
        Entity {
            id,
            kind,
            revision: 0,
            properties: PropertyMap::new(),
            sources: Vec::new(),
            tags: BTreeMap::new(),
            tlp: None,
            comments: Vec::new(),
            sightings: Vec::new(),
            rfis: Vec::new(),
            releasability: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_with_properties(id: EntityId, kind: EntityKind, properties: PropertyMap) -> Self {
        let mut entity = Entity::new(id, kind);
        entity.properties = properties;
        entity
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
        self.updated_at = Utc::now();
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// String property shortcut
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.get_property(key).and_then(|v| v.as_string())
    }

    /// Attach a source, merging instances into an existing source of the same name
    pub fn add_source(&mut self, source: &SourceAttribution) {
        match self.sources.iter_mut().find(|s| s.name() == source.name()) {
            Some(existing) => existing.merge(source),
            None => self.sources.push(source.clone()),
        }
        self.updated_at = Utc::now();
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name() == name)
    }

    /// Append values to a tag list, skipping ones already present.
    /// Returns how many values were added.
    pub fn append_tags<I, S>(&mut self, category: &str, values: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.tags.entry(category.to_string()).or_default();
        let mut added = 0;
        for value in values {
            let value = value.into();
            if !list.contains(&value) {
                list.push(value);
                added += 1;
            }
        }
        if added > 0 {
            self.updated_at = Utc::now();
        }
        added
    }

    pub fn tag_list(&self, category: &str) -> &[String] {
        self.tags.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Set the TLP color unless one is already recorded.
    /// Returns whether the value changed.
    pub fn set_tlp_once(&mut self, color: &str) -> bool {
        if self.tlp.is_some() {
            return false;
        }
        self.tlp = Some(color.to_string());
        self.updated_at = Utc::now();
        true
    }

    /// Mark the entity as saved
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

//! Relationship edges between entities
//!
//! Relationships are directed (left → right), typed, and carry the
//! confidence and analyst that asserted them. Multiple relationships may
//! exist between the same pair of entities as long as their type differs.

use super::types::{EntityId, RelationId, RelationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationId,

    /// Entity the relationship starts from
    pub left: EntityId,

    /// Entity the relationship points to
    pub right: EntityId,

    pub rel_type: RelationType,

    /// Confidence label (e.g. "High", "Unknown")
    pub confidence: String,

    /// Free-text reason, empty when none was given
    pub reason: String,

    pub analyst: String,

    /// When the relationship was asserted; defaults to creation time
    pub rel_date: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        id: RelationId,
        left: EntityId,
        right: EntityId,
        rel_type: impl Into<RelationType>,
        confidence: impl Into<String>,
        analyst: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Relationship {
            id,
            left,
            right,
            rel_type: rel_type.into(),
            confidence: confidence.into(),
            reason: String::new(),
            analyst: analyst.into(),
            rel_date: now,
            created_at: now,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.rel_date = date;
        self
    }

    /// Check if this relationship connects two entities (in either direction)
    pub fn connects(&self, a: EntityId, b: EntityId) -> bool {
        (self.left == a && self.right == b) || (self.left == b && self.right == a)
    }

    pub fn starts_from(&self, entity: EntityId) -> bool {
        self.left == entity
    }

    pub fn ends_at(&self, entity: EntityId) -> bool {
        self.right == entity
    }

    /// Same endpoints and type, regardless of confidence
    pub fn same_assertion(&self, left: EntityId, right: EntityId, rel_type: &RelationType) -> bool {
        self.left == left && self.right == right && &self.rel_type == rel_type
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Relationship {}

//! In-memory entity storage
//!
//! Entities live in an arena indexed by `EntityId`; relationships in a flat
//! vector with adjacency lists for both directions. Two indices support the
//! handler semantics:
//! - kind index: EntityKind -> ids, for listing
//! - key index: (EntityKind, natural key) -> id, for upserts

use super::entity::Entity;
use super::property::PropertyMap;
use super::relationship::Relationship;
use super::types::{EntityId, EntityKind, RelationId, RelationType};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("Relationship {0} not found")]
    RelationshipNotFound(RelationId),

    #[error("Invalid relationship: left entity {0} does not exist")]
    InvalidRelationshipLeft(EntityId),

    #[error("Invalid relationship: right entity {0} does not exist")]
    InvalidRelationshipRight(EntityId),

    #[error("Relationship {rel_type} between {left} and {right} already exists")]
    RelationshipExists {
        left: EntityId,
        right: EntityId,
        rel_type: RelationType,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Serializable view of the whole store
#[derive(Debug, Serialize)]
pub struct StoreSnapshot<'a> {
    pub entities: Vec<&'a Entity>,
    pub relationships: Vec<&'a Relationship>,
}

#[derive(Debug, Default)]
pub struct EntityStore {
    /// Entity arena; slot `n` holds EntityId(n + 1)
    entities: Vec<Entity>,

    relationships: Vec<Relationship>,

    outgoing: HashMap<EntityId, Vec<RelationId>>,

    incoming: HashMap<EntityId, Vec<RelationId>>,

    kind_index: HashMap<EntityKind, BTreeSet<EntityId>>,

    key_index: HashMap<(EntityKind, String), EntityId>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity with auto-generated ID
    pub fn create_entity(&mut self, kind: EntityKind, properties: PropertyMap) -> EntityId {
        let id = EntityId::new(self.entities.len() as u64 + 1);
        self.entities
            .push(Entity::new_with_properties(id, kind, properties));
        self.kind_index.entry(kind).or_default().insert(id);
        id
    }

    /// Create an entity reachable through a natural key (IP value, domain name, ...)
    pub fn create_keyed_entity(
        &mut self,
        kind: EntityKind,
        key: impl Into<String>,
        properties: PropertyMap,
    ) -> EntityId {
        let id = self.create_entity(kind, properties);
        self.key_index.insert((kind, key.into()), id);
        id
    }

    /// Look up an entity by natural key
    pub fn find_by_key(&self, kind: EntityKind, key: &str) -> Option<EntityId> {
        self.key_index.get(&(kind, key.to_string())).copied()
    }

    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        Self::slot(id).and_then(|idx| self.entities.get(idx))
    }

    pub fn get_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        Self::slot(id).and_then(move |idx| self.entities.get_mut(idx))
    }

    /// Mutable access that reports a missing entity as an error
    pub fn entity_mut(&mut self, id: EntityId) -> GraphResult<&mut Entity> {
        self.get_entity_mut(id).ok_or(GraphError::EntityNotFound(id))
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.get_entity(id).is_some()
    }

    /// Bump the revision of an entity
    pub fn save_entity(&mut self, id: EntityId) -> GraphResult<u64> {
        let entity = self.entity_mut(id)?;
        entity.touch();
        Ok(entity.revision)
    }

    /// Create a directed relationship. Re-asserting an existing
    /// (left, right, type) triple is rejected.
    pub fn create_relationship(
        &mut self,
        left: EntityId,
        right: EntityId,
        rel_type: impl Into<RelationType>,
        confidence: impl Into<String>,
        analyst: impl Into<String>,
    ) -> GraphResult<RelationId> {
        let rel = Relationship::new(
            RelationId::new(self.relationships.len() as u64 + 1),
            left,
            right,
            rel_type,
            confidence,
            analyst,
        );
        self.insert_relationship(rel)
    }

    /// Insert a fully-built relationship, assigning it the next ID
    pub fn insert_relationship(&mut self, mut rel: Relationship) -> GraphResult<RelationId> {
        if !self.has_entity(rel.left) {
            return Err(GraphError::InvalidRelationshipLeft(rel.left));
        }
        if !self.has_entity(rel.right) {
            return Err(GraphError::InvalidRelationshipRight(rel.right));
        }
        if self.find_relationship(rel.left, rel.right, &rel.rel_type).is_some() {
            return Err(GraphError::RelationshipExists {
                left: rel.left,
                right: rel.right,
                rel_type: rel.rel_type,
            });
        }

        let id = RelationId::new(self.relationships.len() as u64 + 1);
        rel.id = id;
        self.outgoing.entry(rel.left).or_default().push(id);
        self.incoming.entry(rel.right).or_default().push(id);
        self.relationships.push(rel);
        Ok(id)
    }

    pub fn get_relationship(&self, id: RelationId) -> Option<&Relationship> {
        (id.as_u64() as usize)
            .checked_sub(1)
            .and_then(|idx| self.relationships.get(idx))
    }

    pub fn find_relationship(
        &self,
        left: EntityId,
        right: EntityId,
        rel_type: &RelationType,
    ) -> Option<&Relationship> {
        self.get_outgoing(left)
            .into_iter()
            .find(|rel| rel.same_assertion(left, right, rel_type))
    }

    pub fn get_outgoing(&self, id: EntityId) -> Vec<&Relationship> {
        self.adjacent(&self.outgoing, id)
    }

    pub fn get_incoming(&self, id: EntityId) -> Vec<&Relationship> {
        self.adjacent(&self.incoming, id)
    }

    pub fn entities_by_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.kind_index
            .get(&kind)
            .map(|ids| ids.iter().filter_map(|id| self.get_entity(*id)).collect())
            .unwrap_or_default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn all_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    pub fn snapshot(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            entities: self.entities.iter().collect(),
            relationships: self.relationships.iter().collect(),
        }
    }

    fn adjacent(&self, index: &HashMap<EntityId, Vec<RelationId>>, id: EntityId) -> Vec<&Relationship> {
        index
            .get(&id)
            .map(|ids| ids.iter().filter_map(|rid| self.get_relationship(*rid)).collect())
            .unwrap_or_default()
    }

    fn slot(id: EntityId) -> Option<usize> {
        (id.as_u64() as usize).checked_sub(1)
    }
}

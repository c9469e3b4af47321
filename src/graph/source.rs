//! Provenance attached to every entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One acquisition of data from a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInstance {
    pub method: String,
    pub reference: String,
    pub analyst: String,
    pub date: DateTime<Utc>,
}

/// A named source together with every instance it supplied data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    name: String,
    pub instances: Vec<SourceInstance>,
}

impl SourceAttribution {
    /// The name is fixed at construction; only instances may grow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
        }
    }

    pub fn with_instance(mut self, instance: SourceInstance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First instance, which for an import run is the run's own instance
    pub fn primary_instance(&self) -> Option<&SourceInstance> {
        self.instances.first()
    }

    /// Merge another attribution of the same name, skipping identical instances
    pub fn merge(&mut self, other: &SourceAttribution) {
        for instance in &other.instances {
            if !self.instances.contains(instance) {
                self.instances.push(instance.clone());
            }
        }
    }
}

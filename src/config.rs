//! Import configuration
//!
//! Loaded from YAML; every field has a default so a partial file is enough.
//!
//! ```yaml
//! analyst: jdoe
//! method: TAXII poll
//! make_event: true
//! known_sources: [PartnerCERT]
//! markers:
//!   campaign: MARTI Campaign
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Titles of the marker indicators that carry structure instead of data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerTitles {
    /// Indicator that only wraps an embedded observable (substring match)
    pub top_level_object: String,
    /// Indicator that switches the walk to campaign import (substring match)
    pub campaign: String,
    /// Related indicator holding an analyst comment
    pub comment: String,
    /// Related indicator holding a request for information
    pub rfi: String,
    /// Related indicator naming a relationship to an existing entity
    pub relation: String,
}

impl Default for MarkerTitles {
    fn default() -> Self {
        Self {
            top_level_object: "Top-Level Object".to_string(),
            campaign: "MARTI Campaign".to_string(),
            comment: "CRITs Comment(s)".to_string(),
            rfi: "CRITs RFI".to_string(),
            relation: "MARTI Relation".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Analyst recorded when a request does not name one
    pub analyst: String,
    /// Acquisition method recorded when a request does not name one
    pub method: String,
    /// Analyst label used by the auxiliary metadata passes
    pub metadata_analyst: String,
    /// Create an Event for each document unless the request says otherwise
    pub make_event: bool,
    /// Feed name for releasability; falls back to the resolved source name
    pub releasability_feed: Option<String>,
    /// Record dropped deferred relationships as failures
    pub record_unresolved_relationships: bool,
    pub markers: MarkerTitles,
    /// Sources the in-memory knowledge base recognizes
    pub known_sources: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            analyst: "taxii".to_string(),
            method: "TAXII".to_string(),
            metadata_analyst: "taxii".to_string(),
            make_event: false,
            releasability_feed: None,
            record_unresolved_relationships: false,
            markers: MarkerTitles::default(),
            known_sources: Vec::new(),
        }
    }
}

impl ImportConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: ImportConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        info!("Loaded import config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.metadata_analyst.trim().is_empty() {
            return Err(ConfigError::Invalid("metadata_analyst must not be empty".to_string()));
        }
        let markers = &self.markers;
        for (name, title) in [
            ("top_level_object", &markers.top_level_object),
            ("campaign", &markers.campaign),
            ("comment", &markers.comment),
            ("rfi", &markers.rfi),
            ("relation", &markers.relation),
        ] {
            if title.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("marker '{}' must not be empty", name)));
            }
        }
        Ok(())
    }
}

//! Package-level nodes: header, incidents, indicators, threat actors, campaigns

use super::observable::Observable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root of a threat-intelligence document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    #[serde(default)]
    pub header: Option<Header>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default)]
    pub observables: Vec<Observable>,
    #[serde(default)]
    pub threat_actors: Vec<ThreatActor>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
}

impl Package {
    /// Information source name declared in the header, if any
    pub fn declared_source(&self) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.information_source.as_ref())
            .and_then(InformationSource::identity_name)
    }

    /// Total number of addressable nodes, counting composition members
    pub fn node_count(&self) -> usize {
        self.incidents.len()
            + self.indicators.len()
            + self
                .observables
                .iter()
                .map(|o| o.members().len())
                .sum::<usize>()
            + self.threat_actors.len()
            + self.campaigns.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub title: Option<String>,
    pub description: Option<String>,
    pub package_intents: Vec<String>,
    pub information_source: Option<InformationSource>,
    pub handling: Vec<Marking>,
}

impl Header {
    /// TLP color from the handling markings; the last TLP structure wins
    pub fn tlp_color(&self) -> Option<&str> {
        self.handling
            .iter()
            .flat_map(|m| m.marking_structures.iter())
            .filter_map(|s| match s {
                MarkingStructure::Tlp { color } => Some(color.as_str()),
                _ => None,
            })
            .last()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Marking {
    pub controlled_structure: Option<String>,
    pub marking_structures: Vec<MarkingStructure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarkingStructure {
    #[serde(rename = "TLP")]
    Tlp { color: String },
    #[serde(rename = "Simple")]
    Simple { statement: String },
    #[serde(rename = "TermsOfUse")]
    TermsOfUse { terms_of_use: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeInfo {
    pub start_time: Option<DateTime<Utc>>,
}

/// Who produced a piece of intelligence, and how
///
/// `method` and `reference` name what older producers pack positionally into
/// `descriptions` as `[note, reference, method]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InformationSource {
    pub identity: Option<Identity>,
    pub description: Option<String>,
    pub descriptions: Vec<String>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub time: Option<TimeInfo>,
    pub contributing_sources: Vec<InformationSource>,
}

impl InformationSource {
    pub fn identity_name(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.name.as_deref())
            .filter(|name| !name.is_empty())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.time.as_ref().and_then(|t| t.start_time)
    }
}

/// Reference from one node to another by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedRef {
    pub idref: String,
    pub relationship: Option<String>,
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Incident {
    pub id: String,
    pub title: Option<String>,
    pub related_indicators: Vec<RelatedRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ttp {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sighting {
    pub timestamp: Option<DateTime<Utc>>,
    pub source: Option<InformationSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KillChainPhaseRef {
    pub phase_id: String,
    pub name: Option<String>,
}

/// An indicator embedded in another indicator's related list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedIndicator {
    pub relationship: Option<String>,
    pub confidence: Option<String>,
    pub item: Box<Indicator>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Indicator {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub descriptions: Vec<String>,
    pub short_descriptions: Vec<String>,
    pub indicator_types: Vec<String>,
    pub confidence: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub observables: Vec<Observable>,
    pub indicated_ttps: Vec<Ttp>,
    pub sightings: Vec<Sighting>,
    pub kill_chain_phases: Vec<KillChainPhaseRef>,
    pub related_indicators: Vec<RelatedIndicator>,
    pub related_campaigns: Vec<RelatedRef>,
    pub producer: Option<InformationSource>,
}

impl Indicator {
    pub fn title_contains(&self, marker: &str) -> bool {
        self.title.as_deref().is_some_and(|t| t.contains(marker))
    }

    pub fn has_title(&self, title: &str) -> bool {
        self.title.as_deref() == Some(title)
    }

    /// Related indicators whose title is exactly `title`
    pub fn related_titled<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a Indicator> + 'a {
        self.related_indicators
            .iter()
            .map(|rel| rel.item.as_ref())
            .filter(move |item| item.has_title(title))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatActor {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sophistications: Vec<String>,
    pub motivations: Vec<String>,
    pub types: Vec<String>,
    pub intended_effects: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Campaign {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
}

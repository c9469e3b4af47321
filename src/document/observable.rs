//! Observable nodes and their object property payloads

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accept either a single string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// A concrete artifact, or a composition of other observables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Observable {
    pub id: String,
    pub object: Option<CyboxObject>,
    pub composition: Vec<Observable>,
}

impl Observable {
    /// Composition members, or the observable itself when it is not composite
    pub fn members(&self) -> Vec<&Observable> {
        if self.composition.is_empty() {
            vec![self]
        } else {
            self.composition.iter().collect()
        }
    }

    pub fn properties(&self) -> Option<&ObjectProperties> {
        self.object.as_ref().and_then(|o| o.properties.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CyboxObject {
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_properties")]
    pub properties: Option<ObjectProperties>,
    pub related_objects: Vec<RelatedObject>,
}

impl CyboxObject {
    /// Artifacts attached to this object through its related objects
    pub fn related_artifacts(&self) -> impl Iterator<Item = &ArtifactProperties> {
        self.related_objects
            .iter()
            .filter_map(|r| match &r.properties {
                Some(ObjectProperties::Artifact(artifact)) => Some(artifact),
                _ => None,
            })
    }

    /// Last related artifact of the given type
    pub fn last_artifact_of(&self, artifact_type: ArtifactType) -> Option<&ArtifactProperties> {
        self.related_artifacts()
            .filter(|a| a.artifact_type == artifact_type)
            .last()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedObject {
    pub id: Option<String>,
    pub relationship: Option<String>,
    #[serde(deserialize_with = "lenient_properties")]
    pub properties: Option<ObjectProperties>,
}

/// Decode a property payload without failing the enclosing document
fn lenient_properties<'de, D>(deserializer: D) -> Result<Option<ObjectProperties>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.map(ObjectProperties::from_value))
}

/// Object property payload, tagged by `type`
///
/// Payloads of unknown types, and payloads of known types that do not
/// decode, are kept as `Unsupported` so the failure stays with their node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectProperties {
    Address(AddressProperties),
    DomainName(ValueProperties),
    #[serde(rename = "URI")]
    Uri(UriProperties),
    Hostname(ValueProperties),
    Mutex(ValueProperties),
    Port(ValueProperties),
    File(FileProperties),
    Artifact(ArtifactProperties),
    EmailMessage(EmailMessageProperties),
    Custom(CustomObjectProperties),
    #[serde(skip_deserializing)]
    Unsupported(UnsupportedProperties),
}

impl ObjectProperties {
    pub const KNOWN_TYPES: [&'static str; 10] = [
        "Address",
        "DomainName",
        "URI",
        "Hostname",
        "Mutex",
        "Port",
        "File",
        "Artifact",
        "EmailMessage",
        "Custom",
    ];

    /// Decode a raw payload, falling back to `Unsupported`
    pub fn from_value(raw: Value) -> Self {
        match serde_json::from_value::<ObjectProperties>(raw.clone()) {
            Ok(properties) => properties,
            Err(e) => ObjectProperties::Unsupported(UnsupportedProperties::new(raw, e.to_string())),
        }
    }

    /// Type label used in failure records
    pub fn type_name(&self) -> &str {
        match self {
            ObjectProperties::Address(_) => "Address",
            ObjectProperties::DomainName(_) => "DomainName",
            ObjectProperties::Uri(_) => "URI",
            ObjectProperties::Hostname(_) => "Hostname",
            ObjectProperties::Mutex(_) => "Mutex",
            ObjectProperties::Port(_) => "Port",
            ObjectProperties::File(_) => "File",
            ObjectProperties::Artifact(_) => "Artifact",
            ObjectProperties::EmailMessage(_) => "EmailMessage",
            ObjectProperties::Custom(_) => "Custom",
            ObjectProperties::Unsupported(u) => u.type_name.as_str(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressProperties {
    pub category: String,
    #[serde(deserialize_with = "one_or_many")]
    pub address_value: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueProperties {
    #[serde(deserialize_with = "one_or_many")]
    pub value: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UriProperties {
    pub uri_type: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub value: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProperties {
    pub file_name: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub size_in_bytes: Option<u64>,
    pub custom_properties: Vec<CustomProperty>,
    /// String features extracted from the file
    pub extracted_strings: Vec<String>,
}

impl FileProperties {
    pub const TYPE_TAG: &'static str = "crits_type";

    /// Value of the explicit type-tag custom property
    pub fn type_tag(&self) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|p| p.name == Self::TYPE_TAG)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactType {
    #[serde(rename = "File")]
    File,
    #[serde(rename = "Memory Region")]
    MemoryRegion,
    #[serde(rename = "File System Fragment")]
    FileSystemFragment,
    #[serde(rename = "Network Traffic")]
    NetworkTraffic,
    #[default]
    #[serde(rename = "Generic Data Region")]
    Generic,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    #[default]
    Base64,
    Raw,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactProperties {
    pub artifact_type: ArtifactType,
    pub packaging: Packaging,
    pub data: String,
}

impl ArtifactProperties {
    /// Unpack the payload bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.packaging {
            Packaging::Base64 => {
                let compact: String = self.data.split_whitespace().collect();
                STANDARD.decode(compact)
            }
            Packaging::Raw => Ok(self.data.as_bytes().to_vec()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailHeader {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub reply_to: Option<String>,
    pub x_originating_ip: Option<String>,
    pub x_mailer: Option<String>,
    pub boundary: Option<String>,
    #[serde(rename = "from")]
    pub from_address: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailMessageProperties {
    pub header: Option<EmailHeader>,
    pub raw_body: Option<String>,
    pub raw_header: Option<String>,
    pub email_server: Option<String>,
    /// Object references of attached files
    pub attachments: Vec<String>,
}

/// Any other object type that exposes a type tag and one or more values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomObjectProperties {
    pub object_type: String,
    #[serde(deserialize_with = "one_or_many")]
    pub value: Vec<String>,
}

/// Payload that did not decode into one of the modeled object types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsupportedProperties {
    /// Declared `type` tag, `"Object"` when absent
    pub type_name: String,
    /// Decode error for a payload of a modeled type; `None` for unknown types
    pub error: Option<String>,
    /// Values found under `value`
    pub value: Vec<String>,
    pub raw: Value,
}

impl UnsupportedProperties {
    pub const UNTYPED: &'static str = "Object";

    fn new(raw: Value, error: String) -> Self {
        let declared = raw.get("type").and_then(Value::as_str);
        let known = declared.map_or(true, |t| ObjectProperties::KNOWN_TYPES.contains(&t));
        let value = match raw.get("value") {
            Some(Value::String(v)) => vec![v.clone()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        };
        UnsupportedProperties {
            type_name: declared.unwrap_or(Self::UNTYPED).to_string(),
            error: known.then_some(error),
            value,
            raw,
        }
    }

    /// A modeled type whose payload is malformed
    pub fn is_malformed(&self) -> bool {
        self.error.is_some()
    }
}

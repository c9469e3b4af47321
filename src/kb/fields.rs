//! Field sets handed to the persistence handlers
//!
//! Each field set knows its entity kind, an optional natural key used for
//! upsert semantics, a validation step, and how to flatten itself into a
//! property map.

use crate::graph::{EntityKind, PropertyMap, PropertyValue};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Common behaviour of every handler field set
pub trait EntityFields {
    const KIND: EntityKind;

    /// Key under which an existing entity is reused instead of duplicated
    fn natural_key(&self) -> Option<String> {
        None
    }

    /// Human-readable rejection reason, if the field set is unusable
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn into_properties(self) -> PropertyMap;
}

fn props<const N: usize>(entries: [(&str, PropertyValue); N]) -> PropertyMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn require(value: &str, what: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("No {} provided", what))
    } else {
        Ok(())
    }
}

fn parse_network<A: std::str::FromStr>(value: &str, max_prefix: u8) -> bool {
    match value.split_once('/') {
        Some((addr, prefix)) => {
            addr.parse::<A>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= max_prefix)
        }
        None => value.parse::<A>().is_ok(),
    }
}

/// Whether `value` is a well-formed instance of an IP type label
pub fn valid_ip_value(ip_type: &str, value: &str) -> bool {
    match ip_type {
        "IPv4 Address" => value.parse::<Ipv4Addr>().is_ok(),
        "IPv6 Address" => value.parse::<Ipv6Addr>().is_ok(),
        "IPv4 Subnet" => parse_network::<Ipv4Addr>(value, 32),
        "IPv6 Subnet" => parse_network::<Ipv6Addr>(value, 128),
        _ => value.parse::<IpAddr>().is_ok(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub date: DateTime<Utc>,
}

impl EntityFields for EventFields {
    const KIND: EntityKind = EntityKind::Event;

    fn validate(&self) -> Result<(), String> {
        require(&self.title, "event title")?;
        require(&self.event_type, "event type")
    }

    fn into_properties(self) -> PropertyMap {
        props([
            ("title", self.title.into()),
            ("description", self.description.into()),
            ("event_type", self.event_type.into()),
            ("event_date", self.date.into()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFields {
    pub value: String,
    pub indicator_type: String,
    pub threat_type: String,
    pub attack_type: String,
}

impl IndicatorFields {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new(value: impl Into<String>, indicator_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            indicator_type: indicator_type.into(),
            threat_type: Self::UNKNOWN.to_string(),
            attack_type: Self::UNKNOWN.to_string(),
        }
    }
}

impl EntityFields for IndicatorFields {
    const KIND: EntityKind = EntityKind::Indicator;

    fn natural_key(&self) -> Option<String> {
        Some(format!("{}|{}", self.indicator_type, self.value.to_lowercase()))
    }

    fn validate(&self) -> Result<(), String> {
        require(&self.value, "indicator value")?;
        require(&self.indicator_type, "indicator type")?;
        let is_ip_type = self.indicator_type.ends_with("Address") || self.indicator_type.ends_with("Subnet");
        if is_ip_type
            && self.indicator_type.starts_with("IPv")
            && !valid_ip_value(&self.indicator_type, &self.value)
        {
            return Err(format!("Invalid {} indicator: {}", self.indicator_type, self.value));
        }
        Ok(())
    }

    fn into_properties(self) -> PropertyMap {
        props([
            ("value", self.value.into()),
            ("indicator_type", self.indicator_type.into()),
            ("threat_type", self.threat_type.into()),
            ("attack_type", self.attack_type.into()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpFields {
    pub ip: String,
    pub ip_type: String,
}

impl EntityFields for IpFields {
    const KIND: EntityKind = EntityKind::IP;

    fn natural_key(&self) -> Option<String> {
        Some(self.ip.to_lowercase())
    }

    fn validate(&self) -> Result<(), String> {
        if valid_ip_value(&self.ip_type, &self.ip) {
            Ok(())
        } else {
            Err(format!("Invalid {}: {}", self.ip_type, self.ip))
        }
    }

    fn into_properties(self) -> PropertyMap {
        props([("ip", self.ip.into()), ("ip_type", self.ip_type.into())])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainFields {
    pub domain: String,
}

impl DomainFields {
    pub fn normalized(&self) -> String {
        self.domain.trim().trim_end_matches('.').to_lowercase()
    }
}

impl EntityFields for DomainFields {
    const KIND: EntityKind = EntityKind::Domain;

    fn natural_key(&self) -> Option<String> {
        Some(self.normalized())
    }

    fn validate(&self) -> Result<(), String> {
        let domain = self.normalized();
        let well_formed = !domain.is_empty()
            && domain.len() <= 253
            && domain.contains('.')
            && domain.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            });
        if well_formed {
            Ok(())
        } else {
            Err(format!("Invalid domain: {}", self.domain))
        }
    }

    fn into_properties(self) -> PropertyMap {
        let normalized = self.normalized();
        props([("domain", normalized.into())])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDataFields {
    pub data: String,
    pub title: String,
    pub description: String,
    pub data_type: String,
    pub tool_name: String,
    pub tool_version: Option<String>,
}

impl EntityFields for RawDataFields {
    const KIND: EntityKind = EntityKind::RawData;

    fn natural_key(&self) -> Option<String> {
        Some(sha256_hex(self.data.as_bytes()))
    }

    fn validate(&self) -> Result<(), String> {
        require(&self.data, "raw data")?;
        require(&self.title, "title")
    }

    fn into_properties(self) -> PropertyMap {
        let digest = sha256_hex(self.data.as_bytes());
        props([
            ("data", self.data.into()),
            ("sha256", digest.into()),
            ("title", self.title.into()),
            ("description", self.description.into()),
            ("data_type", self.data_type.into()),
            ("tool_name", self.tool_name.into()),
            ("tool_version", self.tool_version.into()),
        ])
    }
}

/// Field set shared by the file-backed kinds (Certificate, PCAP)
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlobFields<const CERT: bool> {
    pub filename: String,
    pub data: Option<Vec<u8>>,
    pub description: String,
}

pub type CertificateFields = FileBlobFields<true>;
pub type PcapFields = FileBlobFields<false>;

impl<const CERT: bool> FileBlobFields<CERT> {
    fn label() -> &'static str {
        if CERT {
            "certificate"
        } else {
            "PCAP"
        }
    }
}

impl EntityFields for FileBlobFields<true> {
    const KIND: EntityKind = EntityKind::Certificate;

    fn natural_key(&self) -> Option<String> {
        self.data.as_deref().map(sha256_hex)
    }

    fn validate(&self) -> Result<(), String> {
        let data = match self.data.as_deref() {
            Some(data) if !data.is_empty() => data,
            _ => return Err(format!("No {} data provided", Self::label())),
        };
        if data[0] == 0x30 || data.starts_with(b"-----BEGIN") {
            Ok(())
        } else {
            Err(format!("{} is not a DER or PEM certificate", self.filename))
        }
    }

    fn into_properties(self) -> PropertyMap {
        blob_properties(self.filename, self.data, self.description)
    }
}

impl EntityFields for FileBlobFields<false> {
    const KIND: EntityKind = EntityKind::PCAP;

    fn natural_key(&self) -> Option<String> {
        self.data.as_deref().map(sha256_hex)
    }

    fn validate(&self) -> Result<(), String> {
        match self.data.as_deref() {
            Some(data) if !data.is_empty() => Ok(()),
            _ => Err(format!("No {} data provided", Self::label())),
        }
    }

    fn into_properties(self) -> PropertyMap {
        blob_properties(self.filename, self.data, self.description)
    }
}

fn blob_properties(filename: String, data: Option<Vec<u8>>, description: String) -> PropertyMap {
    let digest = data.as_deref().map(sha256_hex);
    let size = data.as_ref().map(|d| d.len() as i64);
    props([
        ("filename", filename.into()),
        ("description", description.into()),
        ("sha256", digest.into()),
        ("size", size.into()),
        ("data", data.into()),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleFields {
    pub filename: String,
    pub data: Option<Vec<u8>>,
    pub md5: Option<String>,
}

impl EntityFields for SampleFields {
    const KIND: EntityKind = EntityKind::Sample;

    /// MD5 when given, otherwise the payload digest
    fn natural_key(&self) -> Option<String> {
        match (&self.md5, &self.data) {
            (Some(md5), _) => Some(format!("md5:{}", md5.to_lowercase())),
            (None, Some(data)) => Some(format!("sha256:{}", sha256_hex(data))),
            (None, None) => None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(md5) = &self.md5 {
            if md5.len() != 32 || !md5.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!("Invalid MD5: {}", md5));
            }
        }
        if self.md5.is_none() && self.data.as_ref().map_or(true, Vec::is_empty) {
            return Err("No data or MD5 provided for sample".to_string());
        }
        Ok(())
    }

    fn into_properties(self) -> PropertyMap {
        let digest = self.data.as_deref().map(sha256_hex);
        let size = self.data.as_ref().map(|d| d.len() as i64);
        props([
            ("filename", self.filename.into()),
            ("md5", self.md5.map(|m| m.to_lowercase()).into()),
            ("sha256", digest.into()),
            ("size", size.into()),
            ("data", self.data.into()),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailFields {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub reply_to: Option<String>,
    pub x_originating_ip: Option<String>,
    pub x_mailer: Option<String>,
    pub boundary: Option<String>,
    pub from_address: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub raw_body: Option<String>,
    pub raw_header: Option<String>,
    pub helo: Option<String>,
}

impl EntityFields for EmailFields {
    const KIND: EntityKind = EntityKind::Email;

    fn natural_key(&self) -> Option<String> {
        self.message_id.clone()
    }

    fn validate(&self) -> Result<(), String> {
        let has_content = self.message_id.is_some()
            || self.subject.is_some()
            || self.from_address.is_some()
            || self.raw_body.is_some()
            || self.raw_header.is_some();
        if has_content {
            Ok(())
        } else {
            Err("Email has no header or body".to_string())
        }
    }

    fn into_properties(self) -> PropertyMap {
        props([
            ("message_id", self.message_id.into()),
            ("subject", self.subject.into()),
            ("sender", self.sender.into()),
            ("reply_to", self.reply_to.into()),
            ("x_originating_ip", self.x_originating_ip.into()),
            ("x_mailer", self.x_mailer.into()),
            ("boundary", self.boundary.into()),
            ("from_address", self.from_address.into()),
            ("date", self.date.into()),
            ("to", self.to.into()),
            ("cc", self.cc.into()),
            ("raw_body", self.raw_body.into()),
            ("raw_header", self.raw_header.into()),
            ("helo", self.helo.into()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorFields {
    pub name: String,
    pub description: Option<String>,
}

impl EntityFields for ActorFields {
    const KIND: EntityKind = EntityKind::Actor;

    fn natural_key(&self) -> Option<String> {
        Some(self.name.trim().to_string())
    }

    fn validate(&self) -> Result<(), String> {
        require(&self.name, "actor name")
    }

    fn into_properties(self) -> PropertyMap {
        props([
            ("name", self.name.trim().to_string().into()),
            ("description", self.description.into()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignFields {
    pub name: String,
    pub description: Option<String>,
}

impl EntityFields for CampaignFields {
    const KIND: EntityKind = EntityKind::Campaign;

    fn natural_key(&self) -> Option<String> {
        Some(self.name.trim().to_string())
    }

    fn validate(&self) -> Result<(), String> {
        require(&self.name, "campaign name")
    }

    fn into_properties(self) -> PropertyMap {
        props([
            ("name", self.name.trim().to_string().into()),
            ("description", self.description.into()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_validation() {
        assert!(valid_ip_value("IPv4 Address", "203.0.113.5"));
        assert!(!valid_ip_value("IPv4 Address", "bad value"));
        assert!(valid_ip_value("IPv4 Subnet", "10.0.0.0/8"));
        assert!(!valid_ip_value("IPv4 Subnet", "10.0.0.0/33"));
        assert!(valid_ip_value("IPv6 Address", "2001:db8::1"));
        assert!(valid_ip_value("IPv6 Subnet", "2001:db8::/32"));
    }

    #[test]
    fn test_indicator_validation_checks_ip_types_only() {
        assert!(IndicatorFields::new("1.2.3.4", "IPv4 Address").validate().is_ok());
        assert_eq!(
            IndicatorFields::new("bad value", "IPv4 Address").validate(),
            Err("Invalid IPv4 Address indicator: bad value".to_string())
        );
        assert!(IndicatorFields::new("bad value", "Mutex").validate().is_ok());
        assert!(IndicatorFields::new("  ", "Mutex").validate().is_err());
        assert!(IndicatorFields::new("x@example.com", "Email Address").validate().is_ok());
    }

    #[test]
    fn test_domain_normalization() {
        let fields = DomainFields { domain: " Evil.Example. ".to_string() };
        assert!(fields.validate().is_ok());
        assert_eq!(fields.natural_key().as_deref(), Some("evil.example"));
        assert!(DomainFields { domain: "not a domain".to_string() }.validate().is_err());
        assert!(DomainFields { domain: "localhost".to_string() }.validate().is_err());
    }

    #[test]
    fn test_certificate_requires_der_or_pem() {
        let der = CertificateFields {
            filename: "c.der".to_string(),
            data: Some(vec![0x30, 0x82, 0x01]),
            description: "None".to_string(),
        };
        assert!(der.validate().is_ok());
        assert_eq!(der.natural_key(), Some(sha256_hex(&[0x30, 0x82, 0x01])));

        let missing = CertificateFields { data: None, ..der.clone() };
        assert_eq!(missing.validate(), Err("No certificate data provided".to_string()));

        let garbage = CertificateFields { data: Some(b"hello".to_vec()), ..der };
        assert!(garbage.validate().is_err());
    }

    #[test]
    fn test_sample_key_prefers_md5() {
        let sample = SampleFields {
            filename: "a.exe".to_string(),
            data: Some(b"MZ".to_vec()),
            md5: Some("D41D8CD98F00B204E9800998ECF8427E".to_string()),
        };
        assert_eq!(
            sample.natural_key().as_deref(),
            Some("md5:d41d8cd98f00b204e9800998ecf8427e")
        );
        assert!(sample.validate().is_ok());

        let empty = SampleFields { filename: "b.exe".to_string(), data: None, md5: None };
        assert!(empty.validate().is_err());
        assert!(empty.natural_key().is_none());
    }

    #[test]
    fn test_email_properties_flatten_lists() {
        let fields = EmailFields {
            subject: Some("Invoice".to_string()),
            to: vec!["a@example.com".to_string()],
            ..Default::default()
        };
        assert!(fields.validate().is_ok());
        let props = fields.into_properties();
        assert_eq!(props["subject"].as_string(), Some("Invoice"));
        assert_eq!(props["to"].as_list().unwrap().len(), 1);
        assert!(props["message_id"].is_null());
        assert!(EmailFields::default().validate().is_err());
    }
}

//! Vocabulary and category lookup tables
//!
//! Pure functions translating document-native enumerations into the
//! knowledge base's categories. A missing mapping is never an error: the
//! caller skips the node or sub-field it was translating.

use crate::document::ObjectProperties;
use crate::graph::EntityKind;

/// Indicator type and values derived from an object property payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorForm {
    pub indicator_type: String,
    pub values: Vec<String>,
}

impl IndicatorForm {
    fn new(indicator_type: &str, values: Vec<String>) -> Option<Self> {
        if indicator_type.is_empty() {
            return None;
        }
        Some(IndicatorForm {
            indicator_type: indicator_type.to_string(),
            values,
        })
    }
}

pub trait Vocabulary {
    /// IP subtype for an address category
    fn ip_type(&self, category: &str) -> Option<&str>;

    /// Event type for a declared package intent
    fn event_type(&self, package_intent: &str) -> Option<&str>;

    /// Canonical actor tag for a sophistication/motivation/type/effect term
    fn actor_tag(&self, value: &str) -> Option<&str>;

    /// Indicator type and values for an object, if it has an indicator form
    fn indicator_form(&self, properties: &ObjectProperties) -> Option<IndicatorForm>;

    /// Display label (`"<ordinality>. <name>"`) of a kill chain phase id
    fn kill_chain_phase(&self, phase_id: &str) -> Option<String>;

    /// Entity kind implied by a related indicator's declared types
    fn relation_target_kind(&self, indicator_types: &[String]) -> Option<EntityKind>;
}

pub const DEFAULT_EVENT_TYPE: &str = "Intel Sharing";

const IP_TYPES: &[(&str, &str)] = &[
    ("ipv4-addr", "IPv4 Address"),
    ("ipv4-net", "IPv4 Subnet"),
    ("ipv4-netmask", "IPv4 Subnet"),
    ("cidr", "IPv4 Subnet"),
    ("ipv6-addr", "IPv6 Address"),
    ("ipv6-net", "IPv6 Subnet"),
    ("ipv6-netmask", "IPv6 Subnet"),
    ("ipv6-subnet", "IPv6 Subnet"),
];

const ADDRESS_INDICATOR_TYPES: &[(&str, &str)] = &[
    ("ipv4-addr", "IPv4 Address"),
    ("ipv4-net", "IPv4 Subnet"),
    ("ipv4-netmask", "IPv4 Subnet"),
    ("cidr", "IPv4 Subnet"),
    ("ipv6-addr", "IPv6 Address"),
    ("ipv6-net", "IPv6 Subnet"),
    ("ipv6-netmask", "IPv6 Subnet"),
    ("ipv6-subnet", "IPv6 Subnet"),
    ("e-mail", "Email Address"),
    ("mac", "MAC Address"),
    ("asn", "AS Number"),
];

const EVENT_TYPES: &[(&str, &str)] = &[
    ("Collective Threat Intelligence", "Intel Sharing"),
    ("Threat Report", "Intel Sharing"),
    ("Indicators", "Intel Sharing"),
    ("Indicators - Watchlist", "Intel Sharing"),
    ("Indicators - Phishing", "Phishing"),
    ("Indicators - Malware Artifacts", "Malicious Code"),
    ("Indicators - Network Activity", "Sensor Alert"),
    ("Indicators - Endpoint Characteristics", "Sensor Alert"),
    ("Campaign Characterization", "Intel Sharing"),
    ("Threat Actor Characterization", "Intel Sharing"),
    ("Exploit Characterization", "Exploitation"),
    ("Attack Pattern Characterization", "Intel Sharing"),
    ("Malware Characterization", "Malicious Code"),
    ("Observations", "Sensor Alert"),
    ("Observations - Email", "Phishing"),
    ("Incident", "Unknown"),
    ("Courses of Action", "Intel Sharing"),
];

const ACTOR_TAGS: &[&str] = &[
    // sophistication
    "Innovator",
    "Expert",
    "Practitioner",
    "Novice",
    "Aspirant",
    // motivation
    "Ideological",
    "Ideological - Anti-Corruption",
    "Ideological - Anti-Establishment",
    "Ideological - Environmental",
    "Ideological - Ethnic / Nationalist",
    "Ideological - Information Freedom",
    "Ideological - Religious",
    "Ideological - Security Awareness",
    "Ideological - Human Rights",
    "Ego",
    "Financial or Economic",
    "Military",
    "Opportunistic",
    "Political",
    // threat actor type
    "Cyber Espionage Operations",
    "Hacker",
    "Hacker - White hat",
    "Hacker - Gray hat",
    "Hacker - Black hat",
    "Hacktivist",
    "State Actor / Agency",
    "eCrime Actor - Credential Theft Botnet Operator",
    "eCrime Actor - Credential Theft Botnet Service",
    "eCrime Actor - Malware Developer",
    "eCrime Actor - Money Laundering Network",
    "eCrime Actor - Organized Crime Actor",
    "eCrime Actor - Spam Service",
    "eCrime Actor - Traffic Service",
    "eCrime Actor - Underground Call Service",
    "Insider Threat",
    "Disgruntled Customer / User",
    // intended effect
    "Advantage",
    "Advantage - Economic",
    "Advantage - Military",
    "Advantage - Political",
    "Theft",
    "Theft - Intellectual Property",
    "Theft - Credential Theft",
    "Theft - Identity Theft",
    "Theft - Theft of Proprietary Information",
    "Account Takeover",
    "Brand Damage",
    "Competitive Advantage",
    "Degradation of Service",
    "Denial and Deception",
    "Destruction",
    "Disruption",
    "Embarrassment",
    "Exposure",
    "Extortion",
    "Fraud",
    "Harassment",
    "ICS Control",
    "Traffic Diversion",
    "Unauthorized Access",
];

/// Lockheed Martin kill chain: (phase id, ordinality, name)
const KILL_CHAIN_PHASES: &[(&str, u8, &str)] = &[
    ("stix:TTP-af1016d6-a744-4ed7-ac91-00fe2272185a", 1, "Reconnaissance"),
    ("stix:TTP-445b4827-3cca-42bd-8421-f2e947133c16", 2, "Weaponization"),
    ("stix:TTP-79a0e041-9d5f-49bb-ada4-8322622b162d", 3, "Delivery"),
    ("stix:TTP-f706e4e7-53d8-44ef-967f-81535c9db7d0", 4, "Exploitation"),
    ("stix:TTP-e1e4e3f7-be3b-4b39-b80a-a593cfd99a4f", 5, "Installation"),
    ("stix:TTP-d6dc32b9-2538-4951-8733-3cb9ef1daae2", 6, "Command and Control"),
    ("stix:TTP-786ca8f9-2d9a-4213-b38e-399af4a2e5d6", 7, "Actions on Objectives"),
];

const RELATION_TARGET_KINDS: &[(&str, EntityKind)] = &[
    ("File Hash Watchlist", EntityKind::Sample),
    ("Malicious E-mail", EntityKind::Email),
    ("Domain Watchlist", EntityKind::Domain),
    ("IP Watchlist", EntityKind::IP),
    ("Anonymization", EntityKind::Campaign),
];

fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Built-in tables
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVocabulary;

impl Vocabulary for DefaultVocabulary {
    fn ip_type(&self, category: &str) -> Option<&str> {
        lookup(IP_TYPES, category)
    }

    fn event_type(&self, package_intent: &str) -> Option<&str> {
        lookup(EVENT_TYPES, package_intent.trim())
    }

    fn actor_tag(&self, value: &str) -> Option<&str> {
        let value = value.trim();
        ACTOR_TAGS
            .iter()
            .find(|tag| tag.eq_ignore_ascii_case(value))
            .copied()
    }

    fn indicator_form(&self, properties: &ObjectProperties) -> Option<IndicatorForm> {
        match properties {
            ObjectProperties::Address(a) => IndicatorForm::new(
                lookup(ADDRESS_INDICATOR_TYPES, &a.category)?,
                a.address_value.clone(),
            ),
            ObjectProperties::DomainName(d) => IndicatorForm::new("Domain", d.value.clone()),
            ObjectProperties::Uri(u) => IndicatorForm::new("URI", u.value.clone()),
            ObjectProperties::Hostname(h) => IndicatorForm::new("Hostname", h.value.clone()),
            ObjectProperties::Mutex(m) => IndicatorForm::new("Mutex", m.value.clone()),
            ObjectProperties::Port(p) => IndicatorForm::new("Port", p.value.clone()),
            ObjectProperties::File(f) => {
                let (indicator_type, value) = [
                    ("MD5", &f.md5),
                    ("SHA1", &f.sha1),
                    ("SHA256", &f.sha256),
                    ("Filename", &f.file_name),
                ]
                .into_iter()
                .find_map(|(t, v)| v.as_ref().map(|v| (t, v.clone())))?;
                IndicatorForm::new(indicator_type, vec![value])
            }
            ObjectProperties::EmailMessage(e) => {
                let header = e.header.as_ref()?;
                if let Some(subject) = &header.subject {
                    IndicatorForm::new("Email Subject", vec![subject.clone()])
                } else {
                    IndicatorForm::new("Email Address", vec![header.from_address.clone()?])
                }
            }
            ObjectProperties::Artifact(_) => None,
            ObjectProperties::Custom(c) => IndicatorForm::new(&c.object_type, c.value.clone()),
            ObjectProperties::Unsupported(u) if !u.is_malformed() && !u.value.is_empty() => {
                IndicatorForm::new(&u.type_name, u.value.clone())
            }
            ObjectProperties::Unsupported(_) => None,
        }
    }

    fn kill_chain_phase(&self, phase_id: &str) -> Option<String> {
        KILL_CHAIN_PHASES
            .iter()
            .find(|(id, _, _)| *id == phase_id)
            .map(|(_, ordinality, name)| format!("{}. {}", ordinality, name))
    }

    fn relation_target_kind(&self, indicator_types: &[String]) -> Option<EntityKind> {
        indicator_types.iter().find_map(|t| {
            RELATION_TARGET_KINDS
                .iter()
                .find(|(name, _)| *name == t.as_str())
                .map(|(_, kind)| *kind)
        })
    }
}

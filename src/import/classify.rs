//! Node classifier
//!
//! Maps one observable object to a target entity kind and the field set its
//! persistence handler needs. Classification is an ordered list of rules and
//! the first rule whose predicate matches builds the result, so the order of
//! `RULES` decides ambiguous shapes (a File can be a Certificate, a PCAP or a
//! Sample depending on its custom properties and related artifacts).

use super::NodeError;
use crate::document::{
    ArtifactProperties, ArtifactType, CyboxObject, EmailMessageProperties, FileProperties,
    ObjectProperties,
};
use crate::graph::{EntityId, EntityKind};
use crate::kb::{
    CertificateFields, DomainFields, EmailFields, HandlerContext, IndicatorFields, IpFields,
    KnowledgeBase, PcapFields, RawDataFields, SampleFields,
};
use crate::vocab::Vocabulary;

/// Address categories that denote network addresses
pub const NETWORK_ADDRESS_CATEGORIES: [&str; 8] = [
    "cidr",
    "ipv4-addr",
    "ipv4-net",
    "ipv4-netmask",
    "ipv6-addr",
    "ipv6-net",
    "ipv6-netmask",
    "ipv6-subnet",
];

pub const CERTIFICATE_TAG: &str = "Certificate";

/// Everything a rule may look at
#[derive(Clone, Copy)]
pub struct ClassifyInput<'a> {
    pub object: &'a CyboxObject,
    pub properties: &'a ObjectProperties,
    pub vocab: &'a dyn Vocabulary,
    pub package_id: &'a str,
}

/// Target kind plus handler field sets, one per handler call
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Ip(Vec<IpFields>),
    Domain(Vec<DomainFields>),
    RawData(RawDataFields),
    Certificate(CertificateFields),
    Pcap(PcapFields),
    Sample {
        fields: SampleFields,
        /// Alternate filenames applied after the sample is created
        filenames: Vec<String>,
    },
    Email {
        fields: EmailFields,
        /// Object references of attachments, related after creation
        attachments: Vec<String>,
    },
    Indicator(Vec<IndicatorFields>),
}

/// Work left for the walk once a handler call succeeded
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    None,
    SampleFilenames(Vec<String>),
    EmailAttachments(Vec<String>),
}

/// Outcome of one successful handler call
#[derive(Debug, Clone, PartialEq)]
pub struct Persisted {
    pub kind: EntityKind,
    pub entity: EntityId,
    pub follow_up: FollowUp,
}

impl Classification {
    pub fn kind(&self) -> EntityKind {
        match self {
            Classification::Ip(_) => EntityKind::IP,
            Classification::Domain(_) => EntityKind::Domain,
            Classification::RawData(_) => EntityKind::RawData,
            Classification::Certificate(_) => EntityKind::Certificate,
            Classification::Pcap(_) => EntityKind::PCAP,
            Classification::Sample { .. } => EntityKind::Sample,
            Classification::Email { .. } => EntityKind::Email,
            Classification::Indicator(_) => EntityKind::Indicator,
        }
    }

    /// Issue the handler calls, one result per call in document order
    pub fn persist<K: KnowledgeBase + ?Sized>(
        self,
        kb: &mut K,
        ctx: &HandlerContext<'_>,
    ) -> Vec<Result<Persisted, NodeError>> {
        let kind = self.kind();
        let done = |result: crate::kb::HandlerResult, follow_up: FollowUp| {
            result
                .map(|entity| Persisted { kind, entity, follow_up })
                .map_err(NodeError::from)
        };

        match self {
            Classification::Ip(values) => values
                .into_iter()
                .map(|fields| done(kb.upsert_ip(fields, ctx), FollowUp::None))
                .collect(),
            Classification::Domain(values) => values
                .into_iter()
                .map(|fields| done(kb.upsert_domain(fields, ctx), FollowUp::None))
                .collect(),
            Classification::Indicator(values) => values
                .into_iter()
                .map(|fields| done(kb.add_indicator(fields, ctx), FollowUp::None))
                .collect(),
            Classification::RawData(fields) => vec![done(kb.add_raw_data(fields, ctx), FollowUp::None)],
            Classification::Certificate(fields) => {
                vec![done(kb.add_certificate(fields, ctx), FollowUp::None)]
            }
            Classification::Pcap(fields) => vec![done(kb.add_pcap(fields, ctx), FollowUp::None)],
            Classification::Sample { fields, filenames } => {
                vec![done(kb.add_sample(fields, ctx), FollowUp::SampleFilenames(filenames))]
            }
            Classification::Email { fields, attachments } => {
                vec![done(kb.add_email(fields, ctx), FollowUp::EmailAttachments(attachments))]
            }
        }
    }
}

type Predicate = fn(&ClassifyInput<'_>) -> bool;
type Build = fn(&ClassifyInput<'_>) -> Result<Classification, NodeError>;

/// One `(predicate, build)` pair of the classification chain
pub struct Rule {
    pub name: &'static str,
    pub matches: Predicate,
    pub build: Build,
}

/// The classification chain, in priority order
pub const RULES: [Rule; 9] = [
    Rule { name: "malformed", matches: is_malformed, build: reject_malformed },
    Rule { name: "address", matches: is_address, build: build_ip },
    Rule { name: "domain", matches: is_domain, build: build_domain },
    Rule { name: "artifact", matches: is_artifact, build: build_raw_data },
    Rule { name: "certificate", matches: is_certificate_file, build: build_certificate },
    Rule { name: "pcap", matches: is_network_capture_file, build: build_pcap },
    Rule { name: "sample", matches: is_file, build: build_sample },
    Rule { name: "email", matches: is_email, build: build_email },
    Rule { name: "indicator", matches: any_object, build: build_indicator },
];

/// Run the chain; the first matching rule decides
pub fn classify(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let rule = RULES
        .iter()
        .find(|rule| (rule.matches)(input))
        .ok_or_else(|| unmapped(input))?;
    tracing::debug!(rule = rule.name, object = input.properties.type_name(), "Classified object");
    (rule.build)(input)
}

fn unmapped(input: &ClassifyInput<'_>) -> NodeError {
    NodeError::Unmapped(input.properties.type_name().to_string())
}

/// Fails when the payload claims a modeled type but did not decode
pub fn check_payload(properties: &ObjectProperties) -> Result<(), NodeError> {
    match properties {
        ObjectProperties::Unsupported(u) => match &u.error {
            Some(reason) => Err(NodeError::Malformed {
                type_name: u.type_name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn is_malformed(input: &ClassifyInput<'_>) -> bool {
    matches!(input.properties, ObjectProperties::Unsupported(u) if u.is_malformed())
}

fn reject_malformed(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    check_payload(input.properties)?;
    Err(unmapped(input))
}

fn file_properties<'a>(input: &ClassifyInput<'a>) -> Option<&'a FileProperties> {
    match input.properties {
        ObjectProperties::File(file) => Some(file),
        _ => None,
    }
}

fn is_address(input: &ClassifyInput<'_>) -> bool {
    matches!(input.properties, ObjectProperties::Address(_))
}

fn is_domain(input: &ClassifyInput<'_>) -> bool {
    matches!(input.properties, ObjectProperties::DomainName(_))
}

fn is_artifact(input: &ClassifyInput<'_>) -> bool {
    matches!(input.properties, ObjectProperties::Artifact(_))
}

fn is_certificate_file(input: &ClassifyInput<'_>) -> bool {
    file_properties(input).is_some_and(|f| f.type_tag() == Some(CERTIFICATE_TAG))
}

fn is_network_capture_file(input: &ClassifyInput<'_>) -> bool {
    file_properties(input).is_some()
        && input
            .object
            .last_artifact_of(ArtifactType::NetworkTraffic)
            .is_some()
}

fn is_file(input: &ClassifyInput<'_>) -> bool {
    file_properties(input).is_some()
}

fn is_email(input: &ClassifyInput<'_>) -> bool {
    matches!(input.properties, ObjectProperties::EmailMessage(_))
}

fn any_object(_: &ClassifyInput<'_>) -> bool {
    true
}

fn trimmed_values(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Values whose category has no IP subtype are skipped without a failure
fn build_ip(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let ObjectProperties::Address(address) = input.properties else {
        return Err(unmapped(input));
    };
    let category = address.category.as_str();
    if !NETWORK_ADDRESS_CATEGORIES.contains(&category) {
        return Err(NodeError::UnsupportedAddressCategory(category.to_string()));
    }
    let Some(ip_type) = input.vocab.ip_type(category) else {
        return Ok(Classification::Ip(Vec::new()));
    };
    Ok(Classification::Ip(
        trimmed_values(&address.address_value)
            .map(|ip| IpFields { ip, ip_type: ip_type.to_string() })
            .collect(),
    ))
}

fn build_domain(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let ObjectProperties::DomainName(domain) = input.properties else {
        return Err(unmapped(input));
    };
    Ok(Classification::Domain(
        trimmed_values(&domain.value)
            .map(|domain| DomainFields { domain })
            .collect(),
    ))
}

fn build_raw_data(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let ObjectProperties::Artifact(artifact) = input.properties else {
        return Err(unmapped(input));
    };
    let data = String::from_utf8(artifact.decode()?)?;
    Ok(Classification::RawData(RawDataFields {
        data,
        title: format!("Artifact for Event: STIX Document {}", input.package_id),
        description: "None".to_string(),
        data_type: "Text".to_string(),
        tool_name: "STIX".to_string(),
        tool_version: None,
    }))
}

fn decode_payload(artifact: Option<&ArtifactProperties>) -> Result<Option<Vec<u8>>, NodeError> {
    artifact.map(|a| a.decode()).transpose().map_err(NodeError::from)
}

fn file_name(file: &FileProperties) -> String {
    file.file_name.clone().unwrap_or_default()
}

fn build_certificate(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let file = file_properties(input).ok_or_else(|| unmapped(input))?;
    Ok(Classification::Certificate(CertificateFields {
        filename: file_name(file),
        data: decode_payload(input.object.related_artifacts().last())?,
        description: "None".to_string(),
    }))
}

fn build_pcap(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let file = file_properties(input).ok_or_else(|| unmapped(input))?;
    Ok(Classification::Pcap(PcapFields {
        filename: file_name(file),
        data: decode_payload(input.object.last_artifact_of(ArtifactType::NetworkTraffic))?,
        description: "None".to_string(),
    }))
}

fn build_sample(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let file = file_properties(input).ok_or_else(|| unmapped(input))?;
    Ok(Classification::Sample {
        fields: SampleFields {
            filename: file_name(file),
            data: decode_payload(input.object.last_artifact_of(ArtifactType::File))?,
            md5: file.md5.clone(),
        },
        filenames: trimmed_values(&file.extracted_strings).collect(),
    })
}

fn email_fields(email: &EmailMessageProperties) -> EmailFields {
    let mut fields = EmailFields {
        raw_body: email.raw_body.clone(),
        raw_header: email.raw_header.clone(),
        helo: email.email_server.clone(),
        ..Default::default()
    };
    if let Some(header) = &email.header {
        fields.message_id = header.message_id.clone();
        fields.subject = header.subject.clone();
        fields.sender = header.sender.clone();
        fields.reply_to = header.reply_to.clone();
        fields.x_originating_ip = header.x_originating_ip.clone();
        fields.x_mailer = header.x_mailer.clone();
        fields.boundary = header.boundary.clone();
        fields.from_address = header.from_address.clone();
        fields.date = header.date;
        fields.to = header.to.clone();
        fields.cc = header.cc.clone();
    }
    fields
}

fn build_email(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let ObjectProperties::EmailMessage(email) = input.properties else {
        return Err(unmapped(input));
    };
    Ok(Classification::Email {
        fields: email_fields(email),
        attachments: trimmed_values(&email.attachments).collect(),
    })
}

fn build_indicator(input: &ClassifyInput<'_>) -> Result<Classification, NodeError> {
    let form = input
        .vocab
        .indicator_form(input.properties)
        .ok_or_else(|| unmapped(input))?;
    Ok(Classification::Indicator(indicator_fields(&form.indicator_type, &form.values)))
}

/// One indicator field set per non-empty trimmed value
pub fn indicator_fields(indicator_type: &str, values: &[String]) -> Vec<IndicatorFields> {
    trimmed_values(values)
        .map(|value| IndicatorFields::new(value, indicator_type))
        .collect()
}

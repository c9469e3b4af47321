//! Source attribution
//!
//! Every entity an import creates carries the same provenance. It is
//! resolved once per run, before anything is written.

use super::{ImportError, ImportRequest, ImportResult};
use crate::document::InformationSource;
use crate::graph::{SourceAttribution, SourceInstance};
use crate::kb::PersistenceHandlers;
use chrono::{DateTime, Utc};
use tracing::debug;

pub const DECLARED_SOURCE_PREFIX: &str = "STIX Source: ";

/// Pick the source name and build the run's single source instance.
///
/// The caller's override wins if the knowledge base knows it, then the
/// name the document declares. A document-declared name that differs from
/// the chosen one is noted in the instance reference.
pub fn resolve_source<K: PersistenceHandlers + ?Sized>(
    kb: &K,
    request: &ImportRequest,
    declared: Option<&str>,
    started_at: DateTime<Utc>,
) -> ImportResult<SourceAttribution> {
    let name = request
        .source_override
        .as_deref()
        .filter(|name| kb.source_exists(name))
        .or_else(|| declared.filter(|name| kb.source_exists(name)))
        .ok_or(ImportError::NoSource)?;

    let mut reference = request.reference.clone().unwrap_or_default();
    if let Some(declared) = declared.filter(|d| *d != name) {
        if !reference.is_empty() {
            reference.push_str(", ");
        }
        reference.push_str(DECLARED_SOURCE_PREFIX);
        reference.push_str(declared);
    }

    debug!(source = name, reference = %reference, "Resolved source attribution");
    Ok(SourceAttribution::new(name).with_instance(SourceInstance {
        method: request.method.clone(),
        reference,
        analyst: request.analyst.clone(),
        date: started_at,
    }))
}

/// Attribution for a contributing source named in the document itself
///
/// Method and reference come from the named fields; producers that only
/// fill `descriptions` lay them out as `[note, reference, method]`.
pub fn contributing_source(
    item: &InformationSource,
    analyst: &str,
    fallback_date: DateTime<Utc>,
) -> Result<SourceAttribution, String> {
    let name = item
        .identity_name()
        .ok_or_else(|| "Contributing source has no identity name".to_string())?;

    let positional = |index: usize| {
        if item.descriptions.len() >= 3 {
            item.descriptions.get(index).cloned()
        } else {
            None
        }
    };
    let method = item.method.clone().or_else(|| positional(2));
    let reference = item.reference.clone().or_else(|| positional(1));
    let (Some(method), Some(reference)) = (method, reference) else {
        return Err(format!(
            "Contributing source {} has no method and reference (expected [note, reference, method], got {} descriptions)",
            name,
            item.descriptions.len()
        ));
    };

    Ok(SourceAttribution::new(name).with_instance(SourceInstance {
        method,
        reference,
        analyst: analyst.to_string(),
        date: item.start_time().unwrap_or(fallback_date),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::GraphKnowledgeBase;
    use serde_json::json;

    fn request() -> ImportRequest {
        ImportRequest::new("jdoe", "TAXII")
    }

    #[test]
    fn test_override_wins_when_known() {
        let kb = GraphKnowledgeBase::with_sources(["Override", "Declared"]);
        let req = request().with_source("Override").with_reference("poll-7");
        let source = resolve_source(&kb, &req, Some("Declared"), Utc::now()).unwrap();

        assert_eq!(source.name(), "Override");
        let instance = source.primary_instance().unwrap();
        assert_eq!(instance.reference, "poll-7, STIX Source: Declared");
        assert_eq!(instance.method, "TAXII");
        assert_eq!(instance.analyst, "jdoe");
    }

    #[test]
    fn test_falls_back_to_declared_source() {
        let kb = GraphKnowledgeBase::with_sources(["Declared"]);
        let req = request().with_source("Unknown");
        let source = resolve_source(&kb, &req, Some("Declared"), Utc::now()).unwrap();

        assert_eq!(source.name(), "Declared");
        assert_eq!(source.primary_instance().unwrap().reference, "");
    }

    #[test]
    fn test_declared_note_without_caller_reference() {
        let kb = GraphKnowledgeBase::with_sources(["Override"]);
        let req = request().with_source("Override");
        let source = resolve_source(&kb, &req, Some("Declared"), Utc::now()).unwrap();
        assert_eq!(source.primary_instance().unwrap().reference, "STIX Source: Declared");
    }

    #[test]
    fn test_no_source_is_fatal() {
        let kb = GraphKnowledgeBase::with_sources(["Someone"]);
        let err = resolve_source(&kb, &request(), Some("Declared"), Utc::now()).unwrap_err();
        assert!(matches!(err, ImportError::NoSource));
        assert_eq!(err.to_string(), "No source to attribute data to.");
    }

    #[test]
    fn test_contributing_source_named_and_positional() {
        let now = Utc::now();
        let named: InformationSource = serde_json::from_value(json!({
            "identity": {"name": "Partner"}, "method": "Email", "reference": "ticket-9"
        }))
        .unwrap();
        let source = contributing_source(&named, "taxii", now).unwrap();
        assert_eq!(source.name(), "Partner");
        assert_eq!(source.primary_instance().unwrap().method, "Email");

        let positional: InformationSource = serde_json::from_value(json!({
            "identity": {"name": "Partner"},
            "descriptions": ["note", "ref-1", "Phone"],
            "time": {"start_time": "2024-03-01T12:00:00Z"}
        }))
        .unwrap();
        let instance = contributing_source(&positional, "taxii", now)
            .unwrap()
            .primary_instance()
            .cloned()
            .unwrap();
        assert_eq!(instance.reference, "ref-1");
        assert_eq!(instance.method, "Phone");
        assert_eq!(instance.date.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let short: InformationSource = serde_json::from_value(json!({
            "identity": {"name": "Partner"}, "descriptions": ["note"]
        }))
        .unwrap();
        let err = contributing_source(&short, "taxii", now).unwrap_err();
        assert!(err.contains("got 1 descriptions"));

        let anonymous = InformationSource::default();
        assert!(contributing_source(&anonymous, "taxii", now).is_err());
    }
}

//! End-to-end import tests
//!
//! Each test feeds a JSON document through `Importer` into an in-memory
//! knowledge base and checks the ledgers, the persisted entities and the
//! stitched relationships.

use intelgraph::graph::Entity;
use intelgraph::kb::DomainFields;
use intelgraph::*;
use serde_json::{json, Value};

const SOURCE: &str = "PartnerCERT";

fn knowledge_base() -> GraphKnowledgeBase {
    GraphKnowledgeBase::with_sources([SOURCE])
}

fn document(package_id: &str, body: Value) -> Value {
    let mut doc = json!({
        "id": package_id,
        "header": {"information_source": {"identity": {"name": SOURCE}}}
    });
    if let (Some(doc), Value::Object(body)) = (doc.as_object_mut(), body) {
        for (key, value) in body {
            if key == "header" {
                if let Some(header) = doc.get_mut("header").and_then(Value::as_object_mut) {
                    if let Value::Object(extra) = value {
                        header.extend(extra);
                    }
                }
            } else {
                doc.insert(key, value);
            }
        }
    }
    doc
}

fn request() -> ImportRequest {
    ImportRequest::new("jdoe", "TAXII")
}

fn import(kb: &mut GraphKnowledgeBase, doc: &Value, request: &ImportRequest) -> ImportRun {
    Importer::new(kb)
        .import(doc.to_string().as_bytes(), request)
        .unwrap()
}

fn import_and_stitch(
    kb: &mut GraphKnowledgeBase,
    doc: &Value,
    request: &ImportRequest,
    config: ImportConfig,
) -> (ImportRun, StitchReport) {
    Importer::new(kb)
        .with_config(config)
        .import_and_stitch(doc.to_string().as_bytes(), request)
        .unwrap()
}

fn entity<'a>(kb: &'a GraphKnowledgeBase, run: &ImportRun, node: &str) -> &'a Entity {
    let entry = run.ledger.get(node).unwrap_or_else(|| panic!("{} was not imported", node));
    kb.entity(entry.entity).unwrap()
}

fn address(id: &str, values: Value) -> Value {
    json!({
        "id": id,
        "object": {
            "id": format!("{}-object", id),
            "properties": {"type": "Address", "category": "ipv4-addr", "address_value": values}
        }
    })
}

fn domain(id: &str, value: &str) -> Value {
    json!({"id": id, "object": {"properties": {"type": "DomainName", "value": value}}})
}

#[test]
fn test_ipv4_address_observable_becomes_ip() {
    let mut kb = knowledge_base();
    let doc = document("pkg-1", json!({"observables": [address("obs-1", json!("203.0.113.5"))]}));

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert_eq!(run.ledger.len(), 1);
    let ip = entity(&kb, &run, "obs-1");
    assert_eq!(ip.kind, EntityKind::IP);
    assert_eq!(ip.property_str("ip"), Some("203.0.113.5"));
    assert_eq!(ip.property_str("ip_type"), Some("IPv4 Address"));
    assert!(ip.has_source(SOURCE));
    assert_eq!(run.phase, ImportPhase::StitchingPending);
}

#[test]
fn test_certificate_file_uses_related_artifact_bytes() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"observables": [{
            "id": "obs-cert",
            "object": {
                "properties": {
                    "type": "File",
                    "file_name": "server.der",
                    "custom_properties": [{"name": "crits_type", "value": "Certificate"}]
                },
                "related_objects": [
                    {"properties": {"type": "Artifact", "data": "MIIBCg=="}}
                ]
            }
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    let cert = entity(&kb, &run, "obs-cert");
    assert_eq!(cert.kind, EntityKind::Certificate);
    assert_eq!(cert.property_str("filename"), Some("server.der"));
    assert_eq!(
        cert.get_property("data").and_then(|v| v.as_bytes()),
        Some(&[0x30u8, 0x82, 0x01, 0x0a][..])
    );
}

#[test]
fn test_no_attributable_source_is_fatal() {
    let mut kb = GraphKnowledgeBase::with_sources(["SomeoneElse"]);
    let doc = document("pkg-1", json!({"observables": [address("obs-1", json!("203.0.113.5"))]}));

    let err = Importer::new(&mut kb)
        .import(doc.to_string().as_bytes(), &request().with_source("NotRegistered"))
        .unwrap_err();

    assert!(matches!(err, ImportError::NoSource));
    assert_eq!(err.to_string(), "No source to attribute data to.");
    assert_eq!(kb.store().entity_count(), 0);
}

#[test]
fn test_unparseable_document_is_fatal() {
    let mut kb = knowledge_base();
    let err = Importer::new(&mut kb)
        .import(b"{not json", &request())
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse(_)));

    let err = Importer::new(&mut kb).import(b"   ", &request()).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse document"));
    assert_eq!(kb.store().entity_count(), 0);
}

#[test]
fn test_failing_indicator_value_is_recorded_and_skipped() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "observables": [address("obs-1", json!(["1.2.3.4", "bad value"]))]
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    assert_eq!(run.failures.len(), 1);
    let failure = &run.failures.records()[0];
    assert_eq!(failure.message, "Invalid IPv4 Address indicator: bad value");
    assert_eq!(failure.node_type, "Address");
    assert_eq!(failure.node_id, "obs-1-object");

    let indicator = entity(&kb, &run, "ind-1");
    assert_eq!(indicator.kind, EntityKind::Indicator);
    assert_eq!(indicator.property_str("value"), Some("1.2.3.4"));
    assert_eq!(indicator.property_str("indicator_type"), Some("IPv4 Address"));
}

/// Multi-valued indicators keep only the last value in the ledger. The
/// earlier entities still exist but receive no metadata or relationships.
#[test]
fn test_multi_valued_indicator_keeps_last_value_in_ledger() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "short_descriptions": ["Energy"],
            "observables": [address("obs-1", json!(["1.2.3.4", "5.6.7.8"]))]
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty());
    assert_eq!(run.ledger.len(), 1);
    assert_eq!(kb.store().entities_by_kind(EntityKind::Indicator).len(), 2);

    let kept = entity(&kb, &run, "ind-1");
    assert_eq!(kept.property_str("value"), Some("5.6.7.8"));
    assert_eq!(kept.tag_list("sectors"), ["Energy".to_string()]);

    let dropped = kb
        .store()
        .entities_by_kind(EntityKind::Indicator)
        .into_iter()
        .find(|e| e.property_str("value") == Some("1.2.3.4"))
        .unwrap();
    assert!(dropped.tag_list("sectors").is_empty());
}

#[test]
fn test_wrapper_indicator_takes_over_embedded_observable() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-wrap",
            "title": "Top-Level Object",
            "observables": [domain("obs-embedded", "Evil.Example.")]
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert_eq!(run.ledger.len(), 1);
    assert!(run.ledger.was_imported("ind-wrap"));
    assert!(!run.ledger.was_imported("obs-embedded"));
    let domain = entity(&kb, &run, "ind-wrap");
    assert_eq!(domain.kind, EntityKind::Domain);
    assert_eq!(domain.property_str("domain"), Some("evil.example"));
}

#[test]
fn test_every_unhinted_entity_gets_one_default_event_edge() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({
            "header": {"package_intents": ["Indicators - Phishing"]},
            "incidents": [{
                "id": "inc-1",
                "related_indicators": [
                    {"idref": "obs-ip", "relationship": "Indicated By", "confidence": "High"}
                ]
            }],
            "observables": [
                address("obs-ip", json!("203.0.113.5")),
                domain("obs-domain", "evil.example"),
                domain("obs-other", "other.example")
            ]
        }),
    );

    let (run, report) = import_and_stitch(&mut kb, &doc, &request().with_event(true), ImportConfig::default());

    assert_eq!(run.phase, ImportPhase::Stitched);
    assert_eq!(report.hinted_edges, 1);
    assert_eq!(report.default_edges, 2);
    assert_eq!(report.saved, 4);

    let event = entity(&kb, &run, "pkg-1");
    assert_eq!(event.kind, EntityKind::Event);
    assert_eq!(event.property_str("title"), Some("STIX Document pkg-1"));
    assert_eq!(event.property_str("event_type"), Some("Phishing"));
    assert_eq!(run.event, Some(event.id));

    let store = kb.store();
    let hinted = store
        .find_relationship(event.id, entity(&kb, &run, "obs-ip").id, &RelationType::new("Indicated By"))
        .unwrap();
    assert_eq!(hinted.confidence, "High");
    for node in ["obs-domain", "obs-other"] {
        let edges: Vec<_> = store
            .get_outgoing(event.id)
            .into_iter()
            .filter(|r| r.right == entity(&kb, &run, node).id)
            .collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].rel_type, RelationType::related_to());
        assert_eq!(edges[0].confidence, "Unknown");
    }
    assert_eq!(store.get_outgoing(event.id).len(), 3);
}

fn email_with_attachments() -> Value {
    document(
        "pkg-1",
        json!({"observables": [
            {
                "id": "obs-email",
                "object": {"properties": {
                    "type": "EmailMessage",
                    "header": {"subject": "Invoice", "from": "billing@evil.example"},
                    "attachments": ["obs-file", "obs-missing"]
                }}
            },
            {
                "id": "obs-file",
                "object": {"properties": {
                    "type": "File",
                    "file_name": "invoice.exe",
                    "md5": "d41d8cd98f00b204e9800998ecf8427e",
                    "extracted_strings": ["invoice_final.exe"]
                }}
            }
        ]}),
    )
}

#[test]
fn test_deferred_relationships_resolve_or_drop_silently() {
    let mut kb = knowledge_base();
    let (run, report) = import_and_stitch(&mut kb, &email_with_attachments(), &request(), ImportConfig::default());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert_eq!(run.deferred.len(), 2);
    assert_eq!(report.deferred_edges, 1);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].right_id, "obs-missing");

    let email = entity(&kb, &run, "obs-email");
    let sample = entity(&kb, &run, "obs-file");
    assert_eq!(email.kind, EntityKind::Email);
    assert_eq!(sample.kind, EntityKind::Sample);
    assert_eq!(sample.tag_list("filenames"), ["invoice_final.exe".to_string()]);

    let contains = kb
        .store()
        .find_relationship(email.id, sample.id, &RelationType::new(RelationType::CONTAINS))
        .unwrap();
    assert_eq!(contains.confidence, "High");
    assert_eq!(kb.store().relationship_count(), 1);
}

#[test]
fn test_unresolved_relationships_recorded_when_configured() {
    let mut kb = knowledge_base();
    let config = ImportConfig {
        record_unresolved_relationships: true,
        ..ImportConfig::default()
    };
    let (run, report) = import_and_stitch(&mut kb, &email_with_attachments(), &request(), config);

    assert_eq!(report.dropped.len(), 1);
    assert_eq!(run.failures.len(), 1);
    let failure = &run.failures.records()[0];
    assert_eq!(failure.node_type, "Relationship");
    assert_eq!(failure.node_id, "obs-email");
    assert!(failure.message.contains("obs-missing was not imported"));
}

#[test]
fn test_stitching_is_explicit_and_runs_once() {
    let mut kb = knowledge_base();
    let doc = document("pkg-1", json!({"observables": [domain("obs-1", "evil.example")]}));
    let mut importer = Importer::new(&mut kb);

    let mut run = importer
        .import(doc.to_string().as_bytes(), &request().with_event(true))
        .unwrap();
    assert_eq!(run.phase, ImportPhase::StitchingPending);
    assert_eq!(importer.knowledge_base().store().relationship_count(), 0);

    let first = importer.stitch(&mut run);
    assert_eq!(first.default_edges, 1);
    assert!(run.is_stitched());

    let second = importer.stitch(&mut run);
    assert_eq!(second.edges_created(), 0);
    assert_eq!(second.saved, 0);
    assert_eq!(importer.knowledge_base().store().relationship_count(), 1);
}

fn commented_indicator() -> Value {
    document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "observables": [domain("obs-1", "evil.example")],
            "related_indicators": [
                {"item": {
                    "id": "comment-1",
                    "title": "CRITs Comment(s)",
                    "description": "Seen in the March phishing wave\r\n",
                    "short_description": "march-wave",
                    "timestamp": "2024-03-01T12:00:00Z",
                    "producer": {"contributing_sources": [{"identity": {"name": "alice"}}]}
                }},
                {"item": {
                    "id": "comment-2",
                    "title": "CRITs Comment(s)",
                    "description": "Seen in the March phishing wave",
                    "timestamp": "2024-03-01T12:00:00Z"
                }}
            ]
        }]}),
    )
}

#[test]
fn test_comment_pass_is_idempotent() {
    let mut kb = knowledge_base();
    let doc = commented_indicator();

    let first = import(&mut kb, &doc, &request());
    let second = import(&mut kb, &doc, &request());

    assert!(first.failures.is_empty(), "{:?}", first.failures.records());
    assert_eq!(first.ledger.get("ind-1").unwrap().entity, second.ledger.get("ind-1").unwrap().entity);

    let indicator = entity(&kb, &second, "ind-1");
    assert_eq!(indicator.comments.len(), 1);
    let comment = &indicator.comments[0];
    assert_eq!(comment.url_key, "march-wave");
    assert_eq!(comment.analyst, "taxii");
    assert_eq!(comment.source_analyst.as_deref(), Some("alice"));
}

#[test]
fn test_rfi_thread_is_built_once() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "observables": [domain("obs-1", "evil.example")],
            "related_indicators": [{"item": {
                "id": "rfi-1",
                "title": "CRITs RFI",
                "description": "Who operates this domain?",
                "producer": {
                    "identity": {"name": "PartnerCERT"},
                    "description": "Attribution",
                    "contributing_sources": [
                        {"identity": {"name": "Analyst1"}, "description": "APT0"}
                    ]
                }
            }}]
        }]}),
    );

    import(&mut kb, &doc, &request());
    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    let rfis = &entity(&kb, &run, "ind-1").rfis;
    assert_eq!(rfis.len(), 1);
    assert_eq!(rfis[0].topic, "Who operates this domain?");
    assert_eq!(rfis[0].requests.len(), 1);
    assert_eq!(rfis[0].requests[0].source, "PartnerCERT");
    assert_eq!(rfis[0].requests[0].responses.len(), 1);
    assert_eq!(rfis[0].requests[0].responses[0].response, "APT0");
}

#[test]
fn test_metadata_passes_apply_to_imported_indicators() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({
            "header": {"handling": [{"marking_structures": [{"type": "TLP", "color": "green"}]}]},
            "indicators": [
                {
                    "id": "ind-1",
                    "observables": [domain("obs-1", "evil.example")],
                    "short_descriptions": ["Energy", " "],
                    "kill_chain_phases": [
                        {"phase_id": "stix:TTP-79a0e041-9d5f-49bb-ada4-8322622b162d"},
                        {"phase_id": "stix:TTP-unknown"}
                    ],
                    "sightings": [{"source": {"contributing_sources": [
                        {"identity": {"name": "SensorNet"}, "time": {"start_time": "2024-02-01T00:00:00Z"}}
                    ]}}],
                    "producer": {"contributing_sources": [
                        {"identity": {"name": "Partner B"}, "method": "Email", "reference": "ticket-9"}
                    ]}
                },
                {
                    "id": "ind-never",
                    "short_descriptions": ["Finance"]
                }
            ]
        }),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert!(!run.ledger.was_imported("ind-never"));

    let indicator = entity(&kb, &run, "ind-1");
    assert_eq!(indicator.tag_list("sectors"), ["Energy".to_string()]);
    assert_eq!(indicator.tag_list("kill_chain"), ["3. Delivery".to_string()]);
    assert_eq!(indicator.tlp.as_deref(), Some("GREEN"));
    assert_eq!(indicator.sightings.len(), 1);
    assert_eq!(indicator.sightings[0].name, "SensorNet");
    assert!(indicator.has_source(SOURCE));
    assert!(indicator.has_source("Partner B"));
    assert_eq!(indicator.releasability.len(), 1);
    assert_eq!(indicator.releasability[0].name, SOURCE);
    assert_eq!(indicator.releasability[0].note, "pkg-1");
}

#[test]
fn test_malformed_contributing_source_is_a_node_failure() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "observables": [domain("obs-1", "evil.example")],
            "producer": {"contributing_sources": [
                {"identity": {"name": "Partner B"}, "descriptions": ["only a note"]}
            ]}
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures.records()[0].node_type, "Indicator");
    assert_eq!(run.failures.records()[0].node_id, "ind-1");
    assert!(!entity(&kb, &run, "ind-1").has_source("Partner B"));
}

#[test]
fn test_relation_marker_links_existing_entity() {
    let mut kb = knowledge_base();
    let existing = {
        let source = SourceAttribution::new(SOURCE);
        let ctx = HandlerContext { source: &source, analyst: "jdoe", correlation_id: "earlier" };
        kb.upsert_domain(DomainFields { domain: "infra.example".to_string() }, &ctx)
            .unwrap()
    };
    let doc = document(
        "pkg-1",
        json!({"indicators": [{
            "id": "ind-1",
            "observables": [domain("obs-1", "evil.example")],
            "related_indicators": [
                {"item": {
                    "id": existing.to_string(),
                    "title": "MARTI Relation",
                    "short_description": "Related To",
                    "description": "shared hosting",
                    "confidence": "Medium",
                    "indicator_types": ["Domain Watchlist"]
                }},
                {"item": {
                    "id": existing.to_string(),
                    "title": "MARTI Relation",
                    "short_description": "Related To",
                    "indicator_types": ["IP Watchlist"]
                }}
            ]
        }]}),
    );

    let run = import(&mut kb, &doc, &request());

    let indicator = entity(&kb, &run, "ind-1");
    let rel = kb
        .store()
        .find_relationship(indicator.id, existing, &RelationType::related_to())
        .unwrap();
    assert_eq!(rel.confidence, "Medium");
    assert_eq!(rel.reason, "shared hosting");

    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures.records()[0].node_id, "ind-1");
    assert!(run.failures.records()[0].message.contains("not a IP"));
}

#[test]
fn test_campaign_marker_switches_to_campaign_import() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({
            "indicators": [
                {
                    "id": "ind-campaign",
                    "title": "MARTI Campaign",
                    "descriptions": ["APT-X", "Group Y"],
                    "indicated_ttps": [
                        {"description": "Spearphishing", "timestamp": "2024-01-05T00:00:00Z"},
                        {"description": " "}
                    ]
                },
                {
                    "id": "ind-after",
                    "observables": [domain("obs-1", "evil.example")]
                }
            ],
            "campaigns": [{"id": "camp-1", "title": "Operation Z", "description": "long running"}]
        }),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert!(run.campaign_mode);
    assert!(!run.ledger.was_imported("ind-after"));

    let campaign = entity(&kb, &run, "ind-campaign");
    assert_eq!(campaign.kind, EntityKind::Campaign);
    assert_eq!(campaign.property_str("name"), Some("Operation Z"));
    assert_eq!(campaign.tag_list("aliases"), ["APT-X".to_string(), "Group Y".to_string()]);
    assert_eq!(campaign.tag_list("ttps"), ["Spearphishing".to_string()]);
    assert!(campaign.get_property("ttps_updated").is_some());
}

#[test]
fn test_related_campaigns_are_attached() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({
            "indicators": [{
                "id": "ind-1",
                "observables": [domain("obs-1", "evil.example")],
                "related_campaigns": [{"idref": "camp-1"}, {"idref": "camp-unknown"}]
            }],
            "campaigns": [{"id": "camp-1", "title": "Operation Z"}]
        }),
    );

    let run = import(&mut kb, &doc, &request());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert_eq!(entity(&kb, &run, "ind-1").tag_list("campaigns"), ["Operation Z".to_string()]);
    assert_eq!(kb.store().entities_by_kind(EntityKind::Campaign).len(), 1);
}

#[test]
fn test_threat_actor_tags_by_category() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"threat_actors": [
            {
                "id": "ta-1",
                "title": "Fancy Actor",
                "sophistications": ["expert"],
                "motivations": ["Political", "Not A Tag"],
                "intended_effects": ["Theft - Intellectual Property"]
            },
            {"id": "ta-nameless"}
        ]}),
    );

    let run = import(&mut kb, &doc, &request());

    let actor = entity(&kb, &run, "ta-1");
    assert_eq!(actor.kind, EntityKind::Actor);
    assert_eq!(actor.tag_list("ActorSophistication"), ["Expert".to_string()]);
    assert_eq!(actor.tag_list("ActorMotivation"), ["Political".to_string()]);
    assert!(actor.tag_list("ActorThreatType").is_empty());
    assert_eq!(actor.tag_list("ActorIntendedEffect"), ["Theft - Intellectual Property".to_string()]);

    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures.records()[0].node_type, "ThreatActor");
    assert_eq!(run.failures.records()[0].node_id, "ta-nameless");
}

#[test]
fn test_observable_failures_do_not_affect_siblings() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"observables": [
            {"id": "obs-empty"},
            {
                "id": "obs-mail-address",
                "object": {"properties": {"type": "Address", "category": "e-mail", "address_value": "a@b.example"}}
            },
            {
                "id": "obs-composite",
                "composition": [
                    domain("member-1", "one.example"),
                    {"id": "member-bad", "object": {"properties": {"type": "Artifact", "data": "%%%"}}}
                ]
            },
            address("obs-ok", json!("198.51.100.7"))
        ]}),
    );

    let run = import(&mut kb, &doc, &request());

    let failed: Vec<(&str, &str)> = run
        .failures
        .iter()
        .map(|f| (f.node_type.as_str(), f.node_id.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("Observable", "obs-empty"),
            ("Address", "obs-mail-address"),
            ("Artifact", "member-bad"),
        ]
    );
    assert_eq!(run.failures.records()[0].message, "No valid object_properties was found!");
    assert_eq!(entity(&kb, &run, "obs-composite").kind, EntityKind::Domain);
    assert_eq!(entity(&kb, &run, "obs-ok").kind, EntityKind::IP);
}

#[test]
fn test_unsupported_object_types_fail_alone() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"observables": [
            address("obs-ip", json!("203.0.113.5")),
            {"id": "obs-reg", "object": {"properties": {"type": "WinRegistryKey", "key": "HKLM\\Run"}}},
            {"id": "obs-bad", "object": {"properties": {"type": "Address", "category": "ipv4-addr", "address_value": 42}}},
            {"id": "obs-link", "object": {"properties": {"type": "Link", "value": "hxxp://evil.example/a"}}}
        ]}),
    );

    let run = import(&mut kb, &doc, &request());

    let failed: Vec<(&str, &str)> = run
        .failures
        .iter()
        .map(|f| (f.node_type.as_str(), f.node_id.as_str()))
        .collect();
    assert_eq!(failed, vec![("WinRegistryKey", "obs-reg"), ("Address", "obs-bad")]);
    assert_eq!(run.failures.records()[0].message, "No mapping for WinRegistryKey objects");
    assert!(run.failures.records()[1].message.starts_with("Malformed Address object: "));

    assert_eq!(entity(&kb, &run, "obs-ip").kind, EntityKind::IP);
    let link = entity(&kb, &run, "obs-link");
    assert_eq!(link.kind, EntityKind::Indicator);
    assert_eq!(link.property_str("indicator_type"), Some("Link"));
    assert_eq!(link.property_str("value"), Some("hxxp://evil.example/a"));
}

#[test]
fn test_wrapped_email_keeps_its_attachment_relationship() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({
            "indicators": [{
                "id": "ind-wrap",
                "title": "Top-Level Object",
                "observables": [{
                    "id": "obs-email",
                    "object": {"properties": {
                        "type": "EmailMessage",
                        "header": {"subject": "Invoice", "from": "billing@evil.example"},
                        "attachments": ["obs-file"]
                    }}
                }]
            }],
            "observables": [{
                "id": "obs-file",
                "object": {"properties": {"type": "File", "file_name": "invoice.exe", "md5": "d41d8cd98f00b204e9800998ecf8427e"}}
            }]
        }),
    );

    let (run, report) = import_and_stitch(&mut kb, &doc, &request(), ImportConfig::default());

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert!(!run.ledger.was_imported("obs-email"));
    assert_eq!(run.deferred[0].left_id, "ind-wrap");
    assert_eq!(report.deferred_edges, 1);
    assert!(report.dropped.is_empty());

    let email = entity(&kb, &run, "ind-wrap");
    let sample = entity(&kb, &run, "obs-file");
    assert_eq!(email.kind, EntityKind::Email);
    assert!(kb
        .store()
        .find_relationship(email.id, sample.id, &RelationType::new(RelationType::CONTAINS))
        .is_some());
}

/// Delegates to the default tables but knows no IP subtypes
struct NoIpTypes;

impl intelgraph::vocab::Vocabulary for NoIpTypes {
    fn ip_type(&self, _category: &str) -> Option<&str> {
        None
    }

    fn event_type(&self, package_intent: &str) -> Option<&str> {
        DefaultVocabulary.event_type(package_intent)
    }

    fn actor_tag(&self, value: &str) -> Option<&str> {
        DefaultVocabulary.actor_tag(value)
    }

    fn indicator_form(&self, properties: &intelgraph::document::ObjectProperties) -> Option<intelgraph::vocab::IndicatorForm> {
        DefaultVocabulary.indicator_form(properties)
    }

    fn kill_chain_phase(&self, phase_id: &str) -> Option<String> {
        DefaultVocabulary.kill_chain_phase(phase_id)
    }

    fn relation_target_kind(&self, indicator_types: &[String]) -> Option<EntityKind> {
        DefaultVocabulary.relation_target_kind(indicator_types)
    }
}

/// Hands out an already parsed package whatever the input bytes
struct PreparsedDocument(Package);

impl DocumentParser for PreparsedDocument {
    fn parse(&self, _data: &[u8]) -> Result<Package, ParseError> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_injected_collaborators_skip_unmapped_values() {
    let mut kb = knowledge_base();
    let doc = document(
        "pkg-1",
        json!({"observables": [address("obs-ip", json!("203.0.113.5")), domain("obs-domain", "evil.example")]}),
    );
    let package = JsonDocumentParser::new().parse(doc.to_string().as_bytes()).unwrap();

    let run = Importer::new(&mut kb)
        .with_parser(PreparsedDocument(package))
        .with_vocabulary(NoIpTypes)
        .import(b"not a document", &request())
        .unwrap();

    assert!(run.failures.is_empty(), "{:?}", run.failures.records());
    assert!(!run.ledger.was_imported("obs-ip"));
    assert!(run.ledger.was_imported("obs-domain"));
    assert!(kb.store().entities_by_kind(EntityKind::IP).is_empty());
}

#[test]
fn test_source_override_and_declared_note() {
    let mut kb = GraphKnowledgeBase::with_sources([SOURCE, "Override"]);
    let doc = document("pkg-1", json!({"observables": [domain("obs-1", "evil.example")]}));

    let run = import(&mut kb, &doc, &request().with_source("Override").with_reference("poll-7"));

    assert_eq!(run.attribution.name(), "Override");
    let domain = entity(&kb, &run, "obs-1");
    assert!(domain.has_source("Override"));
    assert!(!domain.has_source(SOURCE));
    let instance = domain.sources[0].primary_instance().unwrap();
    assert_eq!(instance.reference, "poll-7, STIX Source: PartnerCERT");
    assert_eq!(instance.analyst, "jdoe");
    assert_eq!(instance.method, "TAXII");
}

#[test]
fn test_run_serializes_for_reporting() {
    let mut kb = knowledge_base();
    let doc = document("pkg-1", json!({"observables": [domain("obs-1", "evil.example"), {"id": "obs-2"}]}));
    let run = import(&mut kb, &doc, &request());

    let json = serde_json::to_value(&run).unwrap();
    assert_eq!(json["package_id"], "pkg-1");
    assert_eq!(json["phase"], "StitchingPending");
    assert_eq!(json["failures"]["records"][0]["node_id"], "obs-2");
}

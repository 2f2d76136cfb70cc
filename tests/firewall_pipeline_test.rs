//! End-to-end firewall pipeline tests
//!
//! These tests exercise the complete flow over one document:
//! - Fuzzy entity linking of subject mentions
//! - Per-policy decisions (ALLOW / DENY / TOKENIZE)
//! - Merging all tokenize replacements into one final text

use firewall_core::{
    merge_replacements, DecisionAction, DecisionEngine, Detections, EntityLinker, EntityStore,
    Policy, PredicateMention, Span, SubjectMention, TokenFormat,
};

const TEXT: &str = "Alen Rubilar joined Acme. Later, Alen sold shares in Acme.";
// Offsets:
//   "Alen Rubilar"  0..12
//   "Acme"          20..24
//   "Alen"          33..37
//   "sold shares"   38..49
//   "Acme"          53..57

fn subject(id: &str, label: &str, text: &str, start: usize, end: usize) -> SubjectMention {
    SubjectMention {
        id: id.to_string(),
        label: label.to_string(),
        text: text.to_string(),
        spans: vec![Span::new(start, end)],
        confidence: 0.93,
        entity_id: None,
        canonical_surface: None,
    }
}

fn detections() -> Detections {
    Detections {
        doc_id: "doc-42".to_string(),
        subjects: vec![
            subject("s1", "PERSON", "Alen Rubilar", 0, 12),
            subject("s2", "COMPANY", "Acme", 20, 24),
            subject("s3", "PERSON", "Alen", 33, 37),
            subject("s4", "COMPANY", "Acme", 53, 57),
        ],
        predicates: vec![PredicateMention {
            id: "p1".to_string(),
            label: "FINANCIAL_EVENT".to_string(),
            text: "sold shares".to_string(),
            spans: vec![Span::new(38, 49)],
            confidence: 0.9,
        }],
        sentences: vec![Span::new(0, 25), Span::new(26, 58)],
    }
}

/// Link all subject mentions, the way a host middleware would before
/// evaluating policies.
fn link_subjects(detections: &mut Detections, store: &mut EntityStore) {
    EntityLinker::default().link_detections(store, detections, None);
}

fn policy(json: &str) -> Policy {
    serde_json::from_str(json).expect("policy json")
}

#[test]
fn test_linked_variants_mint_the_same_token() {
    let mut detections = detections();
    let mut store = EntityStore::new();
    link_subjects(&mut detections, &mut store);

    // "Alen Rubilar" and "Alen" resolve to one entity
    assert_eq!(
        detections.subjects[0].entity_id,
        detections.subjects[2].entity_id
    );
    assert_eq!(
        detections.subjects[2].canonical_surface.as_deref(),
        Some("Alen Rubilar")
    );

    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);
    let mask_people = policy(
        r#"{"id": "mask-people",
            "when": {"subjects": ["PERSON"]},
            "then": {"TOKENIZE": {"targets": "subjects"}}}"#,
    );
    let decision = engine.decide(&mask_people, &detections, TEXT).unwrap();
    assert_eq!(decision.action, DecisionAction::Tokenize);
    assert_eq!(decision.tokens.len(), 2);
    assert_eq!(
        decision.tokens[0], decision.tokens[1],
        "all variants of one entity share a token"
    );
}

#[test]
fn test_multiple_policies_merge_into_one_text() {
    let mut detections = detections();
    let mut store = EntityStore::new();
    link_subjects(&mut detections, &mut store);

    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);
    let mask_people = policy(
        r#"{"id": "mask-people",
            "when": {"subjects": ["PERSON"]},
            "then": {"TOKENIZE": {"targets": "subjects"}}}"#,
    );
    let mask_events = policy(
        r#"{"id": "mask-events",
            "when": {"predicate": "FINANCIAL_EVENT",
                     "bind": {"subjects": ["COMPANY"], "proximity": "sentence"}},
            "then": {"TOKENIZE": {"targets": "both"}}}"#,
    );

    let decisions = vec![
        engine.decide(&mask_people, &detections, TEXT).unwrap(),
        engine.decide(&mask_events, &detections, TEXT).unwrap(),
    ];
    let merged = merge_replacements(TEXT, &decisions);

    assert!(!merged.contains("Alen"), "people masked: {merged}");
    assert!(!merged.contains("sold shares"), "event masked: {merged}");
    assert!(
        !merged.contains("in Acme"),
        "bound company masked: {merged}"
    );
    assert!(merged.contains("[[SUBJ:PERSON:"));
    assert!(merged.contains("[[PRED:FINANCIAL_EVENT:"));
    // The unbound first-sentence Acme was no policy's target
    assert!(merged.starts_with("[[SUBJ:PERSON:"));
}

#[test]
fn test_deny_policy_reports_weakest_link_confidence() {
    let mut detections = detections();
    detections.subjects[1].confidence = 0.81;
    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);

    let deny = policy(
        r#"{"id": "deny-events",
            "when": {"predicate": "FINANCIAL_EVENT",
                     "bind": {"subjects": ["COMPANY"], "proximity": "sentence"},
                     "min_confidence": {"predicate": 0.8, "subjects": 0.7}},
            "then": "DENY"}"#,
    );
    let decision = engine.decide(&deny, &detections, TEXT).unwrap();
    assert_eq!(decision.action, DecisionAction::Deny);
    // Bound company s4 (0.93) and predicate (0.9): weakest is 0.9
    assert_eq!(decision.confidence, 0.9);
    assert_eq!(decision.applies_to_spans, vec![Span::new(38, 49)]);
}

#[test]
fn test_unless_rule_suppresses_deny() {
    let detections = detections();
    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);

    let deny_unless_person = policy(
        r#"{"id": "deny-events-unless-person",
            "when": {"predicate": "FINANCIAL_EVENT",
                     "bind": {"subjects": ["COMPANY"], "proximity": "sentence"}},
            "unless": [{"subjects": ["PERSON"]}],
            "then": "DENY"}"#,
    );
    let decision = engine.decide(&deny_unless_person, &detections, TEXT).unwrap();
    assert_eq!(decision.action, DecisionAction::Allow);
    assert_eq!(decision.confidence, 1.0);
    assert!(decision.explanations.contains(&"Exception matched".to_string()));
}

#[test]
fn test_cross_document_store_keeps_identity() {
    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);
    let mask_people = policy(
        r#"{"id": "mask-people",
            "when": {"subjects": ["PERSON"]},
            "then": {"TOKENIZE": {"targets": "subjects"}}}"#,
    );

    // Same store across two documents: the person keeps one identity,
    // so both documents mint the same token.
    let mut store = EntityStore::new();

    let mut first = detections();
    link_subjects(&mut first, &mut store);
    let d1 = engine.decide(&mask_people, &first, TEXT).unwrap();

    let text2 = "Alen Rubilar resigned.";
    let mut second = Detections {
        doc_id: "doc-43".to_string(),
        subjects: vec![subject("s1", "PERSON", "Alen Rubilar", 0, 12)],
        predicates: vec![],
        sentences: vec![Span::new(0, 22)],
    };
    link_subjects(&mut second, &mut store);
    let d2 = engine.decide(&mask_people, &second, text2).unwrap();

    assert_eq!(d1.tokens[0], d2.tokens[0]);
}

#[test]
fn test_decisions_serialize_for_audit() {
    let detections = detections();
    let engine = DecisionEngine::new("tenant-secret", TokenFormat::Linked);
    let mask = policy(
        r#"{"id": "mask-companies",
            "when": {"subjects": ["COMPANY"]},
            "then": {"TOKENIZE": {"targets": "subjects"}}}"#,
    );
    let decision = engine.decide(&mask, &detections, TEXT).unwrap();
    assert!(decision.tokens[0].contains("firewall://"));

    let json = serde_json::to_string(&decision).expect("decision serializes");
    let back: firewall_core::Decision = serde_json::from_str(&json).expect("roundtrips");
    assert_eq!(back.policy_id, "mask-companies");
    assert_eq!(back.action, DecisionAction::Tokenize);
    assert_eq!(back.tokens.len(), 2);
}

//! Content firewall core for text passed to and from language models.
//!
//! Given a document, externally-detected subject/predicate mentions, and
//! a set of declarative policies, this crate decides per policy whether
//! to ALLOW, DENY, or TOKENIZE the document, and produces edited text
//! with sensitive spans replaced by deterministic, self-describing
//! tokens.
//!
//! # Architecture
//!
//! ```text
//! Detections (external) ──► EntityLinker ──► DecisionEngine ──► Decision*
//!                              │                  │                │
//!                         EntityStore        Tokenizer        ReplacementMerger
//!                       (identity dedup)   (keyed BLAKE3)    (final edited text)
//! ```
//!
//! The linker runs once per document over all subject mentions, stamping
//! each with a stable entity id; the engine evaluates each policy
//! independently and purely; the merger combines every TOKENIZE
//! decision's replacements into one edited document.
//!
//! # Example
//!
//! ```
//! use firewall_core::{
//!     DecisionEngine, Detections, Policy, Span, SubjectMention, TokenFormat,
//! };
//!
//! let text = "Contact bob@example.com today.";
//! let detections = Detections {
//!     doc_id: "doc-1".into(),
//!     subjects: vec![SubjectMention {
//!         id: "s1".into(),
//!         label: "EMAIL".into(),
//!         text: "bob@example.com".into(),
//!         spans: vec![Span::new(8, 23)],
//!         confidence: 0.95,
//!         entity_id: None,
//!         canonical_surface: None,
//!     }],
//!     predicates: vec![],
//!     sentences: vec![Span::new(0, 30)],
//! };
//! let policy: Policy = serde_json::from_str(
//!     r#"{"id": "mask-email",
//!         "when": {"subjects": ["EMAIL"]},
//!         "then": {"TOKENIZE": {"targets": "subjects"}}}"#,
//! ).unwrap();
//!
//! let engine = DecisionEngine::new("tenant-secret", TokenFormat::Bracketed);
//! let decision = engine.decide(&policy, &detections, text).unwrap();
//! assert!(!decision.text_tokenized.unwrap().contains("bob@example.com"));
//! ```

pub mod decide;
pub mod entity;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod policy;
pub mod resolve_span;
pub mod similarity;
pub mod token;
pub mod types;

pub use decide::{bind, paragraph_spans, DecisionEngine};
pub use entity::{
    EntityLinker, EntityRecord, EntityStore, Judgment, JudgmentCall, LabelThresholds, LinkInput,
    LinkedSurface, LinkerConfig, NoJudgment, StoreStats,
};
pub use error::FirewallError;
pub use merge::{merge_replacements, Replacement};
pub use policy::{
    BindSpec, Cardinality, ConfidenceGate, Policy, PolicyAction, Proximity, TokenizeTargets,
    WhenRule,
};
pub use resolve_span::resolve_quote;
pub use token::{
    contains_token_marker, parse_token_marker, Matter, ParsedToken, SurfaceRef, TokenFormat,
    TokenKind, Tokenizer,
};
pub use types::{
    Binding, Decision, DecisionAction, Detections, PredicateMention, Span, SubjectMention,
    TriggeredItem,
};

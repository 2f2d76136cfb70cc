//! Core data types shared across the firewall
//!
//! Mentions arrive from the external extractor and are read-only here;
//! the engine never writes back into them. Per-evaluation state (predicate
//! bindings) lives in maps owned by the evaluation, not on the mentions.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::token::TokenKind;

/// Half-open byte-offset span into one document's text.
///
/// Valid spans satisfy `start < end <= text.len()` and fall on char
/// boundaries; zero-length spans are invalid everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether this span can safely slice `text`.
    pub fn is_valid_for(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }

    /// Whether `self` lies fully inside `outer`.
    pub fn within(&self, outer: &Span) -> bool {
        self.start >= outer.start && self.end <= outer.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One subject occurrence in a document, produced by the extractor.
///
/// `entity_id` and `canonical_surface` are filled in by the fuzzy linker
/// before decisions run; they are the only fields the core writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubjectMention {
    pub id: String,
    /// Subject label, e.g. "PERSON" or "EMAIL".
    pub label: String,
    /// Verbatim surface text.
    pub text: String,
    /// Ordered occurrence spans; the first is primary.
    pub spans: Vec<Span>,
    /// Extractor confidence in [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_surface: Option<String>,
}

impl SubjectMention {
    pub fn primary_span(&self) -> Option<Span> {
        self.spans.first().copied()
    }
}

/// One predicate occurrence in a document, produced by the extractor.
///
/// Predicates arrive unbound; the decision engine computes bindings per
/// evaluation and keeps them off the mention entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PredicateMention {
    pub id: String,
    pub label: String,
    pub text: String,
    pub spans: Vec<Span>,
    pub confidence: f64,
}

impl PredicateMention {
    pub fn primary_span(&self) -> Option<Span> {
        self.spans.first().copied()
    }
}

/// Everything the extractor found in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Detections {
    pub doc_id: String,
    pub subjects: Vec<SubjectMention>,
    pub predicates: Vec<PredicateMention>,
    /// Non-overlapping, ordered cover of the text; the finest proximity
    /// scope for binding.
    pub sentences: Vec<Span>,
}

/// Subjects bound to one predicate during one policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Ids of bound subject mentions, in detection order.
    pub subject_ids: SmallVec<[String; 4]>,
    /// Scope that produced the binding.
    pub mode: crate::policy::Proximity,
}

/// The verdict of one policy over one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Allow,
    Deny,
    Tokenize,
}

/// One matched mention recorded for audit, with its minted token preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggeredItem {
    pub kind: TokenKind,
    pub label: String,
    pub text: String,
    pub token: String,
    /// For predicates: ids of the subjects bound at match time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bound_subject_ids: Vec<String>,
}

/// Exactly one `Decision` is produced per (policy, document) evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Decision {
    pub policy_id: String,
    pub doc_id: String,
    pub action: DecisionAction,
    /// Minimum confidence among all contributing mentions; 1.0 when the
    /// policy did not fire.
    pub confidence: f64,
    /// Spans the decision applies to, in source order.
    pub applies_to_spans: Vec<Span>,
    /// Edited text, present only for TOKENIZE decisions that replaced
    /// at least one span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_tokenized: Option<String>,
    /// Token strings, positionally aligned with `applies_to_spans`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_kinds: Vec<TokenKind>,
    pub explanations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggered_by: Vec<TriggeredItem>,
}

//! Policy decision engine
//!
//! One policy plus one document's detections in, exactly one `Decision`
//! out. Evaluation is pure: binding is computed fresh per call and
//! returned in a map keyed by predicate mention id, never written back
//! onto the mentions, so evaluating many policies over one `Detections`
//! cannot interfere.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::error::FirewallError;
use crate::merge::{apply_replacements, select_non_overlapping, Replacement};
use crate::policy::{
    BindSpec, Policy, PolicyAction, Proximity, TokenizeTargets, WhenRule,
    DEFAULT_PREDICATE_MIN_CONFIDENCE, DEFAULT_SUBJECT_MIN_CONFIDENCE,
};
use crate::token::{contains_token_marker, Matter, SurfaceRef, TokenFormat, TokenKind, Tokenizer};
use crate::types::{
    Binding, Decision, DecisionAction, Detections, PredicateMention, Span, SubjectMention,
    TriggeredItem,
};

/// Evaluates policies over detections and mints replacement tokens.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    tokenizer: Tokenizer,
}

/// One match produced by a policy's `when` rule.
enum PolicyMatch<'a> {
    Subject(&'a SubjectMention),
    Predicate {
        predicate: &'a PredicateMention,
        bound: Vec<&'a SubjectMention>,
    },
}

impl DecisionEngine {
    pub fn new(secret: &str, format: TokenFormat) -> Self {
        Self {
            tokenizer: Tokenizer::new(secret, format),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Evaluate one policy against one document.
    ///
    /// Fails fast on a structurally invalid policy; everything after
    /// validation is total.
    pub fn decide(
        &self,
        policy: &Policy,
        detections: &Detections,
        text: &str,
    ) -> Result<Decision, FirewallError> {
        policy.validate()?;

        let mut explanations: Vec<String> = Vec::new();
        let mut matches = match_when(&policy.when, detections, text);

        if !matches.is_empty() && exception_matches(&policy.unless, detections) {
            debug!(policy_id = %policy.id, "exception suppressed {} match(es)", matches.len());
            explanations.push("Exception matched".to_string());
            matches.clear();
        }

        let triggered_by = self.triggered_items(&matches);

        if matches.is_empty() {
            if explanations.is_empty() {
                explanations.push("No matches".to_string());
            }
            return Ok(Decision {
                policy_id: policy.id.clone(),
                doc_id: detections.doc_id.clone(),
                action: DecisionAction::Allow,
                confidence: 1.0,
                applies_to_spans: Vec::new(),
                text_tokenized: None,
                tokens: Vec::new(),
                token_kinds: Vec::new(),
                explanations,
                triggered_by,
            });
        }

        let confidence = aggregate_confidence(&matches);
        explanations.push(format!("Matched {} mention(s)", matches.len()));

        let decision = match policy.then {
            PolicyAction::Allow => Decision {
                policy_id: policy.id.clone(),
                doc_id: detections.doc_id.clone(),
                action: DecisionAction::Allow,
                confidence: 1.0,
                applies_to_spans: Vec::new(),
                text_tokenized: None,
                tokens: Vec::new(),
                token_kinds: Vec::new(),
                explanations,
                triggered_by,
            },
            PolicyAction::Deny => {
                let mut spans = deny_spans(&matches);
                spans.sort_by_key(|s| (s.start, s.end));
                Decision {
                    policy_id: policy.id.clone(),
                    doc_id: detections.doc_id.clone(),
                    action: DecisionAction::Deny,
                    confidence,
                    applies_to_spans: spans,
                    text_tokenized: None,
                    tokens: Vec::new(),
                    token_kinds: Vec::new(),
                    explanations,
                    triggered_by,
                }
            }
            PolicyAction::Tokenize { targets } => self.tokenize_decision(
                policy,
                detections,
                text,
                &matches,
                targets,
                confidence,
                explanations,
                triggered_by,
            ),
        };
        Ok(decision)
    }

    #[allow(clippy::too_many_arguments)]
    fn tokenize_decision(
        &self,
        policy: &Policy,
        detections: &Detections,
        text: &str,
        matches: &[PolicyMatch<'_>],
        targets: TokenizeTargets,
        confidence: f64,
        mut explanations: Vec<String>,
        triggered_by: Vec<TriggeredItem>,
    ) -> Decision {
        let mut items: Vec<Replacement> = Vec::new();
        let mut skipped = 0usize;

        let mut push_item = |span: Option<Span>, matter: &Matter, items: &mut Vec<Replacement>| {
            let Some(span) = span else { return };
            if !span.is_valid_for(text) {
                return;
            }
            // Never double-tokenize: a span already holding a token
            // marker is left alone.
            if contains_token_marker(&text[span.start..span.end]) {
                skipped += 1;
                return;
            }
            items.push(Replacement {
                span,
                token: self.tokenizer.token(matter),
                kind: matter.kind(),
            });
        };

        for m in matches {
            match m {
                PolicyMatch::Subject(subject) => {
                    push_item(subject.primary_span(), &subject_matter(subject), &mut items);
                }
                PolicyMatch::Predicate { predicate, bound } => {
                    if targets.includes_predicates() {
                        push_item(
                            predicate.primary_span(),
                            &predicate_matter(predicate, bound),
                            &mut items,
                        );
                    }
                    if targets.includes_subjects() {
                        for subject in bound {
                            push_item(
                                subject.primary_span(),
                                &subject_matter(subject),
                                &mut items,
                            );
                        }
                    }
                }
            }
        }

        if skipped > 0 {
            explanations.push(format!("Skipped {skipped} already-tokenized span(s)"));
        }

        // Duplicate spans (one subject bound to two matched predicates)
        // collapse here; overlap priority matches the document merger.
        let mut kept = select_non_overlapping(items);
        kept.sort_by_key(|r| (r.span.start, r.span.end));

        let text_tokenized = if kept.is_empty() {
            None
        } else {
            Some(apply_replacements(text, &kept))
        };
        debug!(
            policy_id = %policy.id,
            doc_id = %detections.doc_id,
            replacements = kept.len(),
            "tokenize decision"
        );

        Decision {
            policy_id: policy.id.clone(),
            doc_id: detections.doc_id.clone(),
            action: DecisionAction::Tokenize,
            confidence,
            applies_to_spans: kept.iter().map(|r| r.span).collect(),
            text_tokenized,
            tokens: kept.iter().map(|r| r.token.clone()).collect(),
            token_kinds: kept.iter().map(|r| r.kind).collect(),
            explanations,
            triggered_by,
        }
    }

    /// Flattened audit trail: every matched mention with its minted
    /// token preview, plus bound subjects for predicates.
    fn triggered_items(&self, matches: &[PolicyMatch<'_>]) -> Vec<TriggeredItem> {
        let mut out = Vec::new();
        for m in matches {
            match m {
                PolicyMatch::Subject(subject) => out.push(TriggeredItem {
                    kind: TokenKind::Subj,
                    label: subject.label.clone(),
                    text: subject.text.clone(),
                    token: self.tokenizer.token(&subject_matter(subject)),
                    bound_subject_ids: Vec::new(),
                }),
                PolicyMatch::Predicate { predicate, bound } => {
                    out.push(TriggeredItem {
                        kind: TokenKind::Pred,
                        label: predicate.label.clone(),
                        text: predicate.text.clone(),
                        token: self.tokenizer.token(&predicate_matter(predicate, bound)),
                        bound_subject_ids: bound.iter().map(|s| s.id.clone()).collect(),
                    });
                    for subject in bound {
                        out.push(TriggeredItem {
                            kind: TokenKind::Subj,
                            label: subject.label.clone(),
                            text: subject.text.clone(),
                            token: self.tokenizer.token(&subject_matter(subject)),
                            bound_subject_ids: Vec::new(),
                        });
                    }
                }
            }
        }
        out
    }
}

fn subject_matter(subject: &SubjectMention) -> Matter {
    Matter::Subject {
        label: subject.label.clone(),
        surface: subject_surface(subject),
    }
}

fn subject_surface(subject: &SubjectMention) -> SurfaceRef {
    match subject.entity_id {
        Some(id) => SurfaceRef::Entity(id),
        None => SurfaceRef::Surface(subject.text.clone()),
    }
}

fn predicate_matter(predicate: &PredicateMention, bound: &[&SubjectMention]) -> Matter {
    Matter::Predicate {
        label: predicate.label.clone(),
        surface: SurfaceRef::Surface(predicate.text.clone()),
        subjects: bound
            .iter()
            .map(|s| (s.label.clone(), subject_surface(s)))
            .collect(),
    }
}

/// Bind nearby subjects to every predicate mention under `spec`.
///
/// Pure: returns a fresh map per call, keyed by predicate mention id.
/// The scope is the sentence (or paragraph) containing the predicate's
/// primary span, falling back to the whole text.
pub fn bind(detections: &Detections, spec: &BindSpec, text: &str) -> HashMap<String, Binding> {
    let paragraphs = match spec.proximity {
        Proximity::Paragraph => paragraph_spans(text),
        Proximity::Sentence => Vec::new(),
    };

    let mut bindings = HashMap::new();
    for predicate in &detections.predicates {
        let Some(primary) = predicate.primary_span() else {
            continue;
        };
        let scope = match spec.proximity {
            Proximity::Sentence => enclosing_span(&detections.sentences, primary),
            Proximity::Paragraph => enclosing_span(&paragraphs, primary),
        }
        .unwrap_or(Span::new(0, text.len()));

        let mut subject_ids: SmallVec<[String; 4]> = SmallVec::new();
        for subject in &detections.subjects {
            if !spec.subjects.is_empty() && !spec.subjects.contains(&subject.label) {
                continue;
            }
            let Some(subject_primary) = subject.primary_span() else {
                continue;
            };
            if subject_primary.within(&scope) {
                subject_ids.push(subject.id.clone());
            }
        }
        bindings.insert(
            predicate.id.clone(),
            Binding {
                subject_ids,
                mode: spec.proximity,
            },
        );
    }
    bindings
}

/// First listed span that fully contains `inner`.
fn enclosing_span(spans: &[Span], inner: Span) -> Option<Span> {
    spans.iter().find(|s| inner.within(s)).copied()
}

/// Maximal runs of non-blank lines, as byte spans.
pub fn paragraph_spans(text: &str) -> Vec<Span> {
    let mut paragraphs = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_end = offset + line.len();
        if line.trim().is_empty() {
            if let Some((start, end)) = current.take() {
                paragraphs.push(Span::new(start, end));
            }
        } else {
            let content_end = offset + line.trim_end_matches(['\n', '\r']).len();
            current = Some(match current {
                Some((start, _)) => (start, content_end),
                None => (offset, content_end),
            });
        }
        offset = line_end;
    }
    if let Some((start, end)) = current {
        paragraphs.push(Span::new(start, end));
    }
    paragraphs
}

/// Evaluate the `when` rule against the detections.
fn match_when<'a>(
    rule: &WhenRule,
    detections: &'a Detections,
    text: &str,
) -> Vec<PolicyMatch<'a>> {
    match rule {
        WhenRule::Subject {
            subjects,
            min_confidence,
        } => {
            let threshold = min_confidence.unwrap_or(DEFAULT_SUBJECT_MIN_CONFIDENCE);
            detections
                .subjects
                .iter()
                .filter(|s| subjects.contains(&s.label) && s.confidence >= threshold)
                .map(PolicyMatch::Subject)
                .collect()
        }
        WhenRule::Predicate {
            predicate,
            bind: bind_spec,
            min_confidence,
        } => {
            let (pred_threshold, subj_threshold) = match min_confidence {
                Some(gate) => (gate.predicate_threshold(), gate.subject_threshold()),
                None => (
                    DEFAULT_PREDICATE_MIN_CONFIDENCE,
                    DEFAULT_SUBJECT_MIN_CONFIDENCE,
                ),
            };
            let bindings = bind_spec.as_ref().map(|spec| bind(detections, spec, text));

            let mut matched = Vec::new();
            for p in &detections.predicates {
                if &p.label != predicate || p.confidence < pred_threshold {
                    continue;
                }
                let bound: Vec<&SubjectMention> = match &bindings {
                    Some(map) => map
                        .get(&p.id)
                        .map(|b| {
                            b.subject_ids
                                .iter()
                                .filter_map(|id| detections.subjects.iter().find(|s| &s.id == id))
                                .collect()
                        })
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                if let Some(spec) = bind_spec {
                    if !spec.effective_cardinality().is_satisfied_by(bound.len()) {
                        continue;
                    }
                    if bound.iter().any(|s| s.confidence < subj_threshold) {
                        continue;
                    }
                }
                matched.push(PolicyMatch::Predicate {
                    predicate: p,
                    bound,
                });
            }
            matched
        }
    }
}

/// Whether any `unless` rule matches the full detection set.
fn exception_matches(unless: &[WhenRule], detections: &Detections) -> bool {
    unless.iter().any(|rule| match rule {
        WhenRule::Subject {
            subjects,
            min_confidence,
        } => {
            let threshold = min_confidence.unwrap_or(DEFAULT_SUBJECT_MIN_CONFIDENCE);
            detections
                .subjects
                .iter()
                .any(|s| subjects.contains(&s.label) && s.confidence >= threshold)
        }
        WhenRule::Predicate {
            predicate,
            min_confidence,
            ..
        } => {
            let threshold = min_confidence
                .map(|g| g.predicate_threshold())
                .unwrap_or(DEFAULT_PREDICATE_MIN_CONFIDENCE);
            detections
                .predicates
                .iter()
                .any(|p| &p.label == predicate && p.confidence >= threshold)
        }
    })
}

/// Weakest link: the minimum confidence across every contributing
/// mention, bound subjects included.
fn aggregate_confidence(matches: &[PolicyMatch<'_>]) -> f64 {
    let mut min = f64::INFINITY;
    for m in matches {
        match m {
            PolicyMatch::Subject(s) => min = min.min(s.confidence),
            PolicyMatch::Predicate { predicate, bound } => {
                min = min.min(predicate.confidence);
                for s in bound {
                    min = min.min(s.confidence);
                }
            }
        }
    }
    if min.is_finite() {
        min
    } else {
        1.0
    }
}

/// Spans a DENY covers: every span of each matched mention; predicate
/// matches contribute the predicate's own spans, not bound subjects'.
fn deny_spans(matches: &[PolicyMatch<'_>]) -> Vec<Span> {
    let mut spans = Vec::new();
    for m in matches {
        match m {
            PolicyMatch::Subject(s) => spans.extend(s.spans.iter().copied()),
            PolicyMatch::Predicate { predicate, .. } => {
                spans.extend(predicate.spans.iter().copied())
            }
        }
    }
    spans
}

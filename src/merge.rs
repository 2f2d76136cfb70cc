//! Overlap-safe replacement merger
//!
//! Each TOKENIZE decision produces replacements independently; this module
//! combines them onto one document. Overlaps are resolved by priority
//! (SUBJ beats PRED, longer beats shorter, later start breaks ties) and
//! the survivors are spliced in descending start order so offsets of
//! not-yet-applied replacements never shift.

use tracing::debug;

use crate::token::TokenKind;
use crate::types::{Decision, DecisionAction, Span};

/// One token replacement over a document span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub span: Span,
    pub token: String,
    pub kind: TokenKind,
}

/// Merge every TOKENIZE decision's replacements into one edited text.
///
/// Malformed spans (inverted, zero-width, out of bounds, mid-character)
/// are dropped rather than corrupting the document.
pub fn merge_replacements(text: &str, decisions: &[Decision]) -> String {
    let mut candidates: Vec<Replacement> = Vec::new();
    for decision in decisions {
        if decision.action != DecisionAction::Tokenize {
            continue;
        }
        // Spans, tokens and kinds are positionally aligned; zip drops any
        // trailing unmatched entries from a malformed decision.
        for ((span, token), kind) in decision
            .applies_to_spans
            .iter()
            .zip(decision.tokens.iter())
            .zip(decision.token_kinds.iter())
        {
            if !span.is_valid_for(text) {
                debug!(start = span.start, end = span.end, "dropping malformed span");
                continue;
            }
            candidates.push(Replacement {
                span: *span,
                token: token.clone(),
                kind: *kind,
            });
        }
    }

    let kept = select_non_overlapping(candidates);
    apply_replacements(text, &kept)
}

/// Resolve overlaps by priority: SUBJ over PRED, then longer span, then
/// later start. Greedy keep in that order; a candidate survives only if
/// it overlaps no already-kept span.
pub fn select_non_overlapping(mut candidates: Vec<Replacement>) -> Vec<Replacement> {
    candidates.sort_by(|a, b| {
        kind_rank(a.kind)
            .cmp(&kind_rank(b.kind))
            .then_with(|| b.span.len().cmp(&a.span.len()))
            .then_with(|| b.span.start.cmp(&a.span.start))
    });

    let mut kept: Vec<Replacement> = Vec::new();
    for candidate in candidates {
        if !kept.iter().any(|k| k.span.overlaps(&candidate.span)) {
            kept.push(candidate);
        }
    }
    kept
}

fn kind_rank(kind: TokenKind) -> u8 {
    match kind {
        TokenKind::Subj => 0,
        TokenKind::Pred => 1,
    }
}

/// Splice `items` into `text`, processing spans in descending start order
/// so earlier replacements never shift later offsets.
///
/// Callers must pass non-overlapping, valid spans; anything else was
/// filtered upstream.
pub fn apply_replacements(text: &str, items: &[Replacement]) -> String {
    let mut ordered: Vec<&Replacement> = items.iter().collect();
    ordered.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    let mut out = text.to_string();
    for item in ordered {
        if !item.span.is_valid_for(text) {
            continue;
        }
        out.replace_range(item.span.start..item.span.end, &item.token);
    }
    out
}

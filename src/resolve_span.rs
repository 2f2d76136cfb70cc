//! Quote-to-span resolution with anchor disambiguation
//!
//! Upstream extraction sometimes yields a verbatim quote instead of
//! offsets. A quote that appears once resolves trivially; a repeated
//! quote is disambiguated by short context anchors scored against the
//! text surrounding each occurrence. Ties are refused, never guessed.

use crate::types::Span;

/// How far before/after an occurrence anchor scoring may look.
const ANCHOR_WINDOW: usize = 64;

/// Resolve `quote` to one exact span in `text`.
///
/// Returns `None` when the quote is absent, or when multiple occurrences
/// cannot be disambiguated (no usable anchors, or tied anchor scores).
pub fn resolve_quote(
    text: &str,
    quote: &str,
    pre_anchors: &[&str],
    post_anchors: &[&str],
) -> Option<Span> {
    if quote.is_empty() {
        return None;
    }

    let occurrences: Vec<usize> = text.match_indices(quote).map(|(i, _)| i).collect();
    match occurrences.len() {
        0 => return None,
        1 => return Some(Span::new(occurrences[0], occurrences[0] + quote.len())),
        _ => {}
    }

    let (pre, post) = normalize_anchors(quote, pre_anchors, post_anchors);
    if pre.is_empty() && post.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize)> = None; // (score, start)
    let mut tied = false;
    for &start in &occurrences {
        let score = score_occurrence(text, start, quote.len(), &pre, &post);
        match best {
            Some((best_score, _)) if score == best_score => tied = true,
            Some((best_score, _)) if score > best_score => {
                best = Some((score, start));
                tied = false;
            }
            None => best = Some((score, start)),
            _ => {}
        }
    }

    match best {
        Some((score, start)) if !tied && score > 0 => {
            Some(Span::new(start, start + quote.len()))
        }
        _ => None,
    }
}

/// Normalize anchor lists: split off quote-adjacent remainders onto the
/// correct side, drop anchors that trim to empty, dedupe.
fn normalize_anchors(
    quote: &str,
    pre_anchors: &[&str],
    post_anchors: &[&str],
) -> (Vec<String>, Vec<String>) {
    let mut pre: Vec<String> = Vec::new();
    let mut post: Vec<String> = Vec::new();

    let mut push = |list: &mut Vec<String>, anchor: &str| {
        if !anchor.trim().is_empty() && !list.iter().any(|a| a == anchor) {
            list.push(anchor.to_string());
        }
    };

    for &anchor in pre_anchors.iter().chain(post_anchors.iter()) {
        if anchor == quote {
            continue;
        }
        if let Some(rest) = anchor.strip_prefix(quote) {
            // Anchor begins with the quote itself; the remainder is
            // context that follows the quote.
            push(&mut post, rest);
        } else if let Some(rest) = anchor.strip_suffix(quote) {
            push(&mut pre, rest);
        } else if pre_anchors.contains(&anchor) {
            push(&mut pre, anchor);
        } else {
            push(&mut post, anchor);
        }
    }

    (pre, post)
}

fn score_occurrence(
    text: &str,
    start: usize,
    quote_len: usize,
    pre: &[String],
    post: &[String],
) -> usize {
    let window_start = floor_char_boundary(text, start.saturating_sub(ANCHOR_WINDOW));
    let before = &text[window_start..start];
    let window_end = ceil_char_boundary(text, (start + quote_len + ANCHOR_WINDOW).min(text.len()));
    let after = &text[start + quote_len..window_end];

    let pre_score = pre
        .iter()
        .map(|a| common_suffix_len(a, before))
        .max()
        .unwrap_or(0);
    let post_score = post
        .iter()
        .map(|a| common_prefix_len(a, after))
        .max()
        .unwrap_or(0);
    pre_score + post_score
}

/// Length in chars of the longest shared suffix of `anchor` and `text`.
fn common_suffix_len(anchor: &str, text: &str) -> usize {
    anchor
        .chars()
        .rev()
        .zip(text.chars().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Length in chars of the longest shared prefix of `anchor` and `text`.
fn common_prefix_len(anchor: &str, text: &str) -> usize {
    anchor
        .chars()
        .zip(text.chars())
        .take_while(|(a, b)| a == b)
        .count()
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Apple released a new Apple product.";

    #[test]
    fn test_unique_quote_resolves_directly() {
        let span = resolve_quote(TEXT, "released", &[], &[]).unwrap();
        assert_eq!(span, Span::new(6, 14));
    }

    #[test]
    fn test_missing_quote_is_none() {
        assert!(resolve_quote(TEXT, "banana", &[], &[]).is_none());
    }

    #[test]
    fn test_repeated_quote_without_anchors_is_ambiguous() {
        assert!(resolve_quote(TEXT, "Apple", &[], &[]).is_none());
    }

    #[test]
    fn test_pre_anchor_picks_second_occurrence() {
        let span = resolve_quote(TEXT, "Apple", &["new "], &[]).unwrap();
        assert_eq!(span.start, 21);
        assert_eq!(&TEXT[span.start..span.end], "Apple");
    }

    #[test]
    fn test_post_anchor_picks_first_occurrence() {
        let span = resolve_quote(TEXT, "Apple", &[], &[" released"]).unwrap();
        assert_eq!(span.start, 0);
    }

    #[test]
    fn test_anchor_containing_quote_is_split() {
        // "a new Apple" ends with the quote; the remainder "a new " acts
        // as a pre-anchor.
        let span = resolve_quote(TEXT, "Apple", &["a new Apple"], &[]).unwrap();
        assert_eq!(span.start, 21);

        // "Apple product" starts with the quote; remainder is post context.
        let span = resolve_quote(TEXT, "Apple", &["Apple product"], &[]).unwrap();
        assert_eq!(span.start, 21);
    }

    #[test]
    fn test_tied_scores_refuse_to_guess() {
        let text = "x Apple y ... x Apple y";
        assert!(resolve_quote(text, "Apple", &["x "], &[]).is_none());
    }

    #[test]
    fn test_anchor_equal_to_quote_is_dropped() {
        assert!(resolve_quote(TEXT, "Apple", &["Apple"], &[]).is_none());
    }
}

//! Surface normalization for entity matching and token canonicalization
//!
//! Two folds live here:
//! - `fold_surface`: aggressive fold used by the fuzzy linker
//!   (transliteration, NFKD, mark stripping, alphanumerics only)
//! - `canonical_token_surface`: light fold used by the tokenizer
//!   (NFKC, trim, lowercase) so token payloads stay human-recognizable

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Latin approximation for a Greek letter, lowercase input.
fn greek_to_latin(c: char) -> Option<&'static str> {
    Some(match c {
        'α' => "a",
        'β' => "v",
        'γ' => "g",
        'δ' => "d",
        'ε' => "e",
        'ζ' => "z",
        'η' => "i",
        'θ' => "th",
        'ι' => "i",
        'κ' => "k",
        'λ' => "l",
        'μ' => "m",
        'ν' => "n",
        'ξ' => "x",
        'ο' => "o",
        'π' => "p",
        'ρ' => "r",
        'σ' | 'ς' => "s",
        'τ' => "t",
        'υ' => "y",
        'φ' => "f",
        'χ' => "ch",
        'ψ' => "ps",
        'ω' => "o",
        _ => return None,
    })
}

/// Latin approximation for a Cyrillic letter, lowercase input.
fn cyrillic_to_latin(c: char) -> Option<&'static str> {
    Some(match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'э' => "e",
        'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    })
}

/// Transliterate Greek and Cyrillic letters to Latin approximations,
/// passing everything else through unchanged.
pub fn transliterate(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let lower = c.to_lowercase().next().unwrap_or(c);
        if let Some(latin) = greek_to_latin(lower).or_else(|| cyrillic_to_latin(lower)) {
            out.push_str(latin);
        } else {
            out.push(c);
        }
    }
    out
}

/// Fold a surface string for fuzzy identity matching.
///
/// Transliterates Greek/Cyrillic to Latin, applies Unicode compatibility
/// decomposition (NFKD), strips combining marks, lowercases, and keeps
/// alphanumerics only. The result contains no whitespace or punctuation,
/// so `"Alen Rubilar"` folds to `"alenrubilar"`.
pub fn fold_surface(s: &str) -> String {
    // Decompose first so accented Greek/Cyrillic letters reduce to their
    // base form before the transliteration table sees them.
    let decomposed: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    transliterate(&decomposed)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonicalize a surface for token payloads: NFKC fold, trim, lowercase.
///
/// Deliberately gentler than `fold_surface`: diacritics survive, so a
/// payload still reads as the surface it came from.
pub fn canonical_token_surface(s: &str) -> String {
    s.nfkc().collect::<String>().trim().to_lowercase()
}

//! Deterministic token minting
//!
//! A token is a pure function of `(secret, matter)`: the matched matter is
//! canonicalized into a payload string, hashed with a key derived from the
//! caller's secret, and rendered as a self-describing marker. Identical
//! matter always mints the identical token, which is what makes
//! idempotence checks and per-entity token reuse work.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::canonical_token_surface;

/// Key-derivation context string; changing it invalidates every token.
const KEY_CONTEXT: &str = "firewall-core v1 token id";

/// Hex chars of keyed-hash output kept as the token id.
const TOKEN_ID_LEN: usize = 16;

/// Bracketed inline marker: `[[SUBJ:EMAIL:a1b2...]]`
static BRACKETED_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(SUBJ|PRED):([^:\[\]]+):([0-9a-f]{16})\]\]").unwrap()
});

/// Link-style marker: `[SUBJ:EMAIL:a1b2...](firewall://subj/EMAIL/a1b2...)`
static LINKED_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(SUBJ|PRED):([^:\[\]]+):([0-9a-f]{16})\]\(firewall://[^)]+\)").unwrap()
});

/// Whether matter is a subject or a predicate-with-bound-subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Subj,
    Pred,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subj => "SUBJ",
            Self::Pred => "PRED",
        }
    }
}

/// Surface identity carried into a payload: the literal surface, or the
/// linked entity id so every variant of one entity mints the same token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceRef {
    Surface(String),
    Entity(Uuid),
}

impl SurfaceRef {
    fn canonical(&self) -> String {
        match self {
            Self::Surface(s) => canonical_token_surface(s),
            Self::Entity(id) => format!("EID:{id}"),
        }
    }
}

/// Canonical payload for one tokenization call. Never persisted;
/// recomputed per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matter {
    Subject {
        label: String,
        surface: SurfaceRef,
    },
    Predicate {
        label: String,
        surface: SurfaceRef,
        /// `(label, surface)` of every bound subject; order-insensitive.
        subjects: Vec<(String, SurfaceRef)>,
    },
}

impl Matter {
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Subject { .. } => TokenKind::Subj,
            Self::Predicate { .. } => TokenKind::Pred,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Subject { label, .. } | Self::Predicate { label, .. } => label,
        }
    }

    /// Canonical payload string fed to the keyed hash.
    ///
    /// Bound subjects are sorted before joining, so the payload is
    /// invariant to discovery order.
    fn payload(&self) -> String {
        match self {
            Self::Subject { label, surface } => {
                format!("SUBJ|{}|{}", label, surface.canonical())
            }
            Self::Predicate {
                label,
                surface,
                subjects,
            } => {
                let mut head = format!("PRED|{}|{}", label, surface.canonical());
                if !subjects.is_empty() {
                    let mut parts: Vec<String> = subjects
                        .iter()
                        .map(|(l, s)| format!("{}={}", l, s.canonical()))
                        .collect();
                    parts.sort_unstable();
                    head.push_str("|SUBJ:");
                    head.push_str(&parts.join(";"));
                }
                head
            }
        }
    }
}

/// Token rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFormat {
    /// `[[SUBJ:EMAIL:a1b2c3d4e5f60718]]`
    #[default]
    Bracketed,
    /// `[SUBJ:EMAIL:a1b2...](firewall://subj/EMAIL/a1b2...)`
    Linked,
}

/// A token marker parsed back out of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub kind: TokenKind,
    pub label: String,
    pub id: String,
}

/// Mints deterministic tokens from matter under one secret.
#[derive(Clone)]
pub struct Tokenizer {
    key: [u8; 32],
    format: TokenFormat,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of debug output
        f.debug_struct("Tokenizer")
            .field("format", &self.format)
            .finish()
    }
}

impl Tokenizer {
    pub fn new(secret: &str, format: TokenFormat) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            format,
        }
    }

    /// Compact fixed-length id for the matter: keyed BLAKE3 of the
    /// canonical payload, truncated hex.
    pub fn id(&self, matter: &Matter) -> String {
        let hash = blake3::keyed_hash(&self.key, matter.payload().as_bytes());
        hash.to_hex().as_str()[..TOKEN_ID_LEN].to_string()
    }

    /// Full rendered token marker for the matter.
    pub fn token(&self, matter: &Matter) -> String {
        let id = self.id(matter);
        let kind = matter.kind().as_str();
        let label = matter.label();
        match self.format {
            TokenFormat::Bracketed => format!("[[{kind}:{label}:{id}]]"),
            TokenFormat::Linked => format!(
                "[{kind}:{label}:{id}](firewall://{}/{label}/{id})",
                kind.to_lowercase()
            ),
        }
    }
}

/// Whether `text` already contains a token marker in either format.
pub fn contains_token_marker(text: &str) -> bool {
    BRACKETED_MARKER_RE.is_match(text) || LINKED_MARKER_RE.is_match(text)
}

/// Parse the first token marker in `text`, if any. Tokens are
/// self-describing: kind, label, and id come from the marker alone.
pub fn parse_token_marker(text: &str) -> Option<ParsedToken> {
    let caps = BRACKETED_MARKER_RE
        .captures(text)
        .or_else(|| LINKED_MARKER_RE.captures(text))?;
    let kind = match &caps[1] {
        "SUBJ" => TokenKind::Subj,
        _ => TokenKind::Pred,
    };
    Some(ParsedToken {
        kind,
        label: caps[2].to_string(),
        id: caps[3].to_string(),
    })
}

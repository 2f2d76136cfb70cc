//! Fuzzy entity linker
//!
//! Deduplicates surface variants of one real-world entity (typos,
//! abbreviations, transliterations) into a single identity. Inputs are
//! processed strictly in order: later inputs may match entries created
//! earlier in the same batch. Ambiguous near-misses can be escalated to
//! an injected judgment call, serially and under a per-batch budget.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use super::judgment::JudgmentCall;
use super::store::{EntityRecord, EntityStore};
use crate::normalize::fold_surface;
use crate::similarity::SimilarityScores;
use crate::types::Detections;

/// Minimum share of the longer string a containment match must cover.
const CONTAINMENT_MIN_COVERAGE: f64 = 0.30;

/// Thresholds for one subject label.
#[derive(Debug, Clone, Copy)]
pub struct LabelThresholds {
    /// Score two-of-three metrics must reach for an outright merge.
    pub accept: f64,
    /// Lower bar that marks a pair as worth escalating.
    pub ambiguous: f64,
    /// Normalized surfaces shorter than this are never fuzzy-merged.
    pub min_fuzzy_len: usize,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            accept: 0.9,
            ambiguous: 0.84,
            min_fuzzy_len: 3,
        }
    }
}

/// Linker configuration: default thresholds, per-label overrides, and
/// the per-batch escalation budget.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    pub default_thresholds: LabelThresholds,
    pub per_label: HashMap<String, LabelThresholds>,
    /// Maximum judgment calls per `resolve_many` batch.
    pub max_pairs: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            default_thresholds: LabelThresholds::default(),
            per_label: HashMap::new(),
            max_pairs: 5,
        }
    }
}

impl LinkerConfig {
    fn thresholds_for(&self, label: &str) -> LabelThresholds {
        self.per_label
            .get(label)
            .copied()
            .unwrap_or(self.default_thresholds)
    }
}

/// One surface to resolve.
#[derive(Debug, Clone)]
pub struct LinkInput {
    pub label: String,
    pub surface: String,
    /// Isolation key; surfaces under different namespaces never share an
    /// entity id. `None` means the default namespace.
    pub namespace: Option<String>,
}

/// Resolution result, one per input, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSurface {
    pub label: String,
    pub surface: String,
    pub canonical_surface: String,
    pub entity_id: Uuid,
}

/// Assigns stable entity identities to incoming surfaces.
#[derive(Default)]
pub struct EntityLinker {
    config: LinkerConfig,
    judgment: Option<Box<dyn JudgmentCall>>,
}

impl std::fmt::Debug for EntityLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLinker")
            .field("config", &self.config)
            .field("has_judgment", &self.judgment.is_some())
            .finish()
    }
}

impl EntityLinker {
    pub fn new(config: LinkerConfig) -> Self {
        Self {
            config,
            judgment: None,
        }
    }

    /// Attach an external arbiter for ambiguous pairs.
    pub fn with_judgment(mut self, judgment: Box<dyn JudgmentCall>) -> Self {
        self.judgment = Some(judgment);
        self
    }

    /// Resolve every input to an entity identity, in input order.
    ///
    /// Must run over the whole batch serially: entries created for early
    /// inputs are candidates for later ones.
    pub fn resolve_many(
        &self,
        store: &mut EntityStore,
        inputs: &[LinkInput],
    ) -> Vec<LinkedSurface> {
        let mut judgment_budget = self.config.max_pairs;
        inputs
            .iter()
            .map(|input| self.resolve_one(store, input, &mut judgment_budget))
            .collect()
    }

    /// Link every subject mention in `detections`, stamping entity ids
    /// and canonical surfaces in place. Runs once per document, before
    /// any policy is evaluated.
    pub fn link_detections(
        &self,
        store: &mut EntityStore,
        detections: &mut Detections,
        namespace: Option<&str>,
    ) {
        let inputs: Vec<LinkInput> = detections
            .subjects
            .iter()
            .map(|s| LinkInput {
                label: s.label.clone(),
                surface: s.text.clone(),
                namespace: namespace.map(str::to_string),
            })
            .collect();
        let linked = self.resolve_many(store, &inputs);
        for (subject, link) in detections.subjects.iter_mut().zip(linked) {
            subject.entity_id = Some(link.entity_id);
            subject.canonical_surface = Some(link.canonical_surface);
        }
    }

    fn resolve_one(
        &self,
        store: &mut EntityStore,
        input: &LinkInput,
        judgment_budget: &mut usize,
    ) -> LinkedSurface {
        let namespace = input.namespace.as_deref().unwrap_or("");
        let normalized = fold_surface(&input.surface);
        let thresholds = self.config.thresholds_for(&input.label);

        // Short surfaces are never fuzzy-merged; each becomes its own
        // entity.
        if normalized.chars().count() < thresholds.min_fuzzy_len {
            return self.create_entity(store, namespace, input, &normalized);
        }

        let entries = store.entries(namespace, &input.label);

        // First pass: outright accepts, first hit wins.
        let mut accepted: Option<usize> = None;
        let mut ambiguous: Vec<usize> = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            if accepts(&normalized, entry, thresholds) {
                accepted = Some(idx);
                break;
            }
            if is_ambiguous(&normalized, entry, thresholds) {
                ambiguous.push(idx);
            }
        }

        if let Some(idx) = accepted {
            return self.merge_into(store, namespace, input, &normalized, idx, None);
        }

        // Second pass: escalate ambiguous candidates under the batch
        // budget, strictly serially.
        if let Some(judge) = self.judgment.as_deref() {
            for idx in ambiguous {
                if *judgment_budget == 0 {
                    break;
                }
                *judgment_budget -= 1;
                let existing = store.entries(namespace, &input.label)[idx]
                    .canonical_surface
                    .clone();
                match judge.judge(&input.label, &existing, &input.surface) {
                    Ok(verdict) if verdict.same_entity => {
                        debug!(
                            label = %input.label,
                            existing = %existing,
                            candidate = %input.surface,
                            confidence = verdict.confidence,
                            "judgment affirmed entity merge"
                        );
                        return self.merge_into(
                            store,
                            namespace,
                            input,
                            &normalized,
                            idx,
                            verdict.canonical,
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Fail open: unresolved ambiguity becomes a new,
                        // smaller entity rather than a wrong merge.
                        warn!(label = %input.label, error = %e, "judgment call failed");
                        break;
                    }
                }
            }
        }

        self.create_entity(store, namespace, input, &normalized)
    }

    fn merge_into(
        &self,
        store: &mut EntityStore,
        namespace: &str,
        input: &LinkInput,
        normalized: &str,
        idx: usize,
        suggested_canonical: Option<String>,
    ) -> LinkedSurface {
        let entry = &mut store.entries_mut(namespace, &input.label)[idx];
        entry.observe(&input.surface, normalized);
        if let Some(canonical) = suggested_canonical.filter(|c| !c.trim().is_empty()) {
            entry.canonical_surface = canonical;
        }
        debug!(
            label = %input.label,
            surface = %input.surface,
            canonical = %entry.canonical_surface,
            entity_id = %entry.id,
            "merged surface into existing entity"
        );
        LinkedSurface {
            label: input.label.clone(),
            surface: input.surface.clone(),
            canonical_surface: entry.canonical_surface.clone(),
            entity_id: entry.id,
        }
    }

    fn create_entity(
        &self,
        store: &mut EntityStore,
        namespace: &str,
        input: &LinkInput,
        normalized: &str,
    ) -> LinkedSurface {
        let record = EntityRecord::new(&input.label, &input.surface, normalized);
        let entity_id = store.insert(namespace, record);
        debug!(
            label = %input.label,
            surface = %input.surface,
            entity_id = %entity_id,
            "created new entity"
        );
        LinkedSurface {
            label: input.label.clone(),
            surface: input.surface.clone(),
            canonical_surface: input.surface.clone(),
            entity_id,
        }
    }
}

/// Outright accept: containment with enough coverage, or two of three
/// similarity metrics over the accept threshold.
fn accepts(normalized: &str, entry: &EntityRecord, thresholds: LabelThresholds) -> bool {
    if entry.surfaces.keys().any(|known| contains_with_coverage(normalized, known)) {
        return true;
    }
    best_scores(normalized, entry).votes_at(thresholds.accept) >= 2
}

/// Worth escalating: at least two metrics over the ambiguous bar.
fn is_ambiguous(normalized: &str, entry: &EntityRecord, thresholds: LabelThresholds) -> bool {
    best_scores(normalized, entry).votes_at(thresholds.ambiguous) >= 2
}

/// One normalized string is a prefix or suffix of the other, and the
/// shorter covers at least 30% of the longer's length.
fn contains_with_coverage(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if !(long.starts_with(short) || long.ends_with(short)) {
        return false;
    }
    short.chars().count() as f64 >= CONTAINMENT_MIN_COVERAGE * long.chars().count() as f64
}

/// Best similarity against any known variant of the entry.
fn best_scores(normalized: &str, entry: &EntityRecord) -> SimilarityScores {
    let mut best = SimilarityScores::of(normalized, &entry.normalized);
    for known in entry.surfaces.keys() {
        let scores = SimilarityScores::of(normalized, known);
        if scores.edit + scores.prefix_weighted + scores.trigram
            > best.edit + best.prefix_weighted + best.trigram
        {
            best = scores;
        }
    }
    best
}

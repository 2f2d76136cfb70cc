use crate::error::FirewallError;

/// Verdict from the external arbiter on one ambiguous surface pair.
#[derive(Debug, Clone)]
pub struct Judgment {
    /// Whether the two surfaces name the same real-world entity.
    pub same_entity: bool,
    /// Arbiter confidence in [0, 1].
    pub confidence: f64,
    /// Preferred canonical surface, when the arbiter has one.
    pub canonical: Option<String>,
}

/// Injected capability for resolving ambiguous identity pairs.
///
/// The linker calls this strictly serially and at most `max_pairs` times
/// per batch. Implementations backed by a model should wrap their own
/// deadline; a returned error means "no merge" and the candidate becomes
/// its own entity.
pub trait JudgmentCall {
    fn judge(
        &self,
        label: &str,
        existing_surface: &str,
        candidate_surface: &str,
    ) -> Result<Judgment, FirewallError>;
}

/// Judgment that always declines to merge. Useful in tests and as the
/// behavior when no arbiter is configured.
#[derive(Debug, Default)]
pub struct NoJudgment;

impl JudgmentCall for NoJudgment {
    fn judge(&self, _: &str, _: &str, _: &str) -> Result<Judgment, FirewallError> {
        Ok(Judgment {
            same_entity: false,
            confidence: 1.0,
            canonical: None,
        })
    }
}

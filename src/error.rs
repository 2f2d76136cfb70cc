use thiserror::Error;

/// Failure classes surfaced at the firewall boundary.
///
/// Core computation is total: given well-formed inputs every function
/// returns a value. Errors exist only for shape violations at the
/// boundary (malformed policies) and for the injected judgment call.
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("invalid policy '{policy_id}': {reason}")]
    InvalidPolicy { policy_id: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("judgment call failed: {0}")]
    Judgment(String),
}

//! Policy model: declarative rules the decision engine evaluates
//!
//! A policy's `when` is an explicit sum type with two constructors
//! (subject rule, predicate rule) rather than duck-typed key presence;
//! serde's untagged representation keeps the wire shape, where the rule
//! kind is distinguished by which key appears.

use serde::{Deserialize, Serialize};

use crate::error::FirewallError;

/// Default gate for subject mentions (rule subjects and bound subjects).
pub const DEFAULT_SUBJECT_MIN_CONFIDENCE: f64 = 0.7;
/// Default gate for predicate mentions.
pub const DEFAULT_PREDICATE_MIN_CONFIDENCE: f64 = 0.8;

/// Scope granularity used when binding subjects to a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    Sentence,
    Paragraph,
}

/// Required count of bound subjects for a predicate match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = ">=1")]
    AtLeastOne,
    #[serde(rename = "==1")]
    ExactlyOne,
    #[serde(rename = ">=2")]
    AtLeastTwo,
}

impl Cardinality {
    pub fn is_satisfied_by(&self, bound_count: usize) -> bool {
        match self {
            Self::AtLeastOne => bound_count >= 1,
            Self::ExactlyOne => bound_count == 1,
            Self::AtLeastTwo => bound_count >= 2,
        }
    }
}

/// How a predicate collects nearby subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BindSpec {
    /// Subject-label allow-list; empty means any label may bind.
    #[serde(default)]
    pub subjects: Vec<String>,
    pub proximity: Proximity,
    /// Missing cardinality on a rule that binds is treated as `>=1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
}

impl BindSpec {
    pub fn effective_cardinality(&self) -> Cardinality {
        self.cardinality.unwrap_or(Cardinality::AtLeastOne)
    }
}

/// Confidence gate for a predicate rule: one number for both sides, or
/// split thresholds for the predicate and its bound subjects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfidenceGate {
    Uniform(f64),
    Split {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subjects: Option<f64>,
    },
}

impl ConfidenceGate {
    pub fn predicate_threshold(&self) -> f64 {
        match self {
            Self::Uniform(v) => *v,
            Self::Split { predicate, .. } => {
                predicate.unwrap_or(DEFAULT_PREDICATE_MIN_CONFIDENCE)
            }
        }
    }

    pub fn subject_threshold(&self) -> f64 {
        match self {
            Self::Uniform(v) => *v,
            Self::Split { subjects, .. } => subjects.unwrap_or(DEFAULT_SUBJECT_MIN_CONFIDENCE),
        }
    }
}

/// One matching rule, used both for `when` and for `unless` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenRule {
    Subject {
        /// Subject labels this rule selects.
        subjects: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_confidence: Option<f64>,
    },
    Predicate {
        predicate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<BindSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_confidence: Option<ConfidenceGate>,
    },
}

impl WhenRule {
    fn validate(&self, policy_id: &str) -> Result<(), FirewallError> {
        let invalid = |reason: &str| FirewallError::InvalidPolicy {
            policy_id: policy_id.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::Subject {
                subjects,
                min_confidence,
            } => {
                if subjects.is_empty() {
                    return Err(invalid("subject rule with empty label list"));
                }
                if let Some(c) = min_confidence {
                    if !(0.0..=1.0).contains(c) {
                        return Err(invalid("min_confidence outside [0, 1]"));
                    }
                }
            }
            Self::Predicate {
                predicate,
                min_confidence,
                ..
            } => {
                if predicate.trim().is_empty() {
                    return Err(invalid("predicate rule with empty label"));
                }
                if let Some(gate) = min_confidence {
                    let (p, s) = (gate.predicate_threshold(), gate.subject_threshold());
                    if !(0.0..=1.0).contains(&p) || !(0.0..=1.0).contains(&s) {
                        return Err(invalid("min_confidence outside [0, 1]"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// What a matched policy does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
    Tokenize { targets: TokenizeTargets },
}

/// Which side of a predicate match gets tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizeTargets {
    Subjects,
    Predicates,
    Both,
}

impl TokenizeTargets {
    pub fn includes_subjects(&self) -> bool {
        matches!(self, Self::Subjects | Self::Both)
    }

    pub fn includes_predicates(&self) -> bool {
        matches!(self, Self::Predicates | Self::Both)
    }
}

/// A declarative firewall policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Policy {
    pub id: String,
    pub when: WhenRule,
    /// If ANY unless rule matches, `then` is suppressed entirely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unless: Vec<WhenRule>,
    pub then: PolicyAction,
}

impl Policy {
    /// Structural validation, run before any evaluation work begins.
    pub fn validate(&self) -> Result<(), FirewallError> {
        if self.id.trim().is_empty() {
            return Err(FirewallError::InvalidPolicy {
                policy_id: self.id.clone(),
                reason: "empty policy id".to_string(),
            });
        }
        self.when.validate(&self.id)?;
        for rule in &self.unless {
            rule.validate(&self.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_when_rule_deserializes_by_shape() {
        let subject: WhenRule =
            serde_json::from_str(r#"{"subjects": ["EMAIL"], "min_confidence": 0.9}"#).unwrap();
        assert!(matches!(subject, WhenRule::Subject { .. }));

        let predicate: WhenRule = serde_json::from_str(
            r#"{"predicate": "FINANCIAL_EVENT",
                "bind": {"subjects": ["COMPANY"], "proximity": "sentence", "cardinality": ">=2"}}"#,
        )
        .unwrap();
        match predicate {
            WhenRule::Predicate { bind: Some(b), .. } => {
                assert_eq!(b.effective_cardinality(), Cardinality::AtLeastTwo);
            }
            other => panic!("expected predicate rule, got {other:?}"),
        }
    }

    #[test]
    fn test_confidence_gate_forms() {
        let uniform: ConfidenceGate = serde_json::from_str("0.85").unwrap();
        assert_eq!(uniform.predicate_threshold(), 0.85);
        assert_eq!(uniform.subject_threshold(), 0.85);

        let split: ConfidenceGate = serde_json::from_str(r#"{"predicate": 0.9}"#).unwrap();
        assert_eq!(split.predicate_threshold(), 0.9);
        assert_eq!(split.subject_threshold(), DEFAULT_SUBJECT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_cardinality_gates() {
        assert!(Cardinality::AtLeastOne.is_satisfied_by(3));
        assert!(!Cardinality::ExactlyOne.is_satisfied_by(2));
        assert!(!Cardinality::AtLeastTwo.is_satisfied_by(1));
    }

    #[test]
    fn test_validate_rejects_empty_subject_list() {
        let policy = Policy {
            id: "p1".to_string(),
            when: WhenRule::Subject {
                subjects: vec![],
                min_confidence: None,
            },
            unless: vec![],
            then: PolicyAction::Deny,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let policy = Policy {
            id: "p2".to_string(),
            when: WhenRule::Subject {
                subjects: vec!["EMAIL".to_string()],
                min_confidence: Some(1.5),
            },
            unless: vec![],
            then: PolicyAction::Deny,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_action_wire_shape() {
        let allow: PolicyAction = serde_json::from_str(r#""ALLOW""#).unwrap();
        assert_eq!(allow, PolicyAction::Allow);
        let tok: PolicyAction =
            serde_json::from_str(r#"{"TOKENIZE": {"targets": "both"}}"#).unwrap();
        assert_eq!(
            tok,
            PolicyAction::Tokenize {
                targets: TokenizeTargets::Both
            }
        );
    }
}

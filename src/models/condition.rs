// Condition expressions guarding automatic transitions

//! # Transition Conditions
//!
//! Automatic transitions fire when their conditions hold. Conditions are stored
//! as configuration and evaluated at runtime as a pre-parsed boolean expression
//! tree against a [`ConditionContext`], a flat map built fresh for every
//! evaluation by the resolver.
//!
//! ## Key Concepts
//!
//! - **Leaf predicates**: `Flag`, `Equals`, `Exists`, `GreaterThan`, `LessThan`,
//!   `Contains` read one context key each
//! - **Combinators**: `All`, `Any`, `Not` nest arbitrarily
//! - **Reserved keys**: the resolver always fills the keys in [`keys`], so
//!   workflow authors can write `{"type": "Flag", "key": "all_documents_verified"}`
//!
//! ## Rust Learning Notes:
//!
//! ### Recursive Enums
//! `All` and `Any` hold `Vec<Condition>` and `Not` holds `Box<Condition>`.
//! The `Box` gives the enum a known size even though it contains itself.
//!
//! ### Serde Tag for JSON Serialization
//! `#[serde(tag = "type")]` produces flat tagged JSON:
//! `{"type": "Equals", "field": "decision", "value": "admit"}`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Evaluation context: key → JSON value, built per evaluation call
pub type ConditionContext = HashMap<String, serde_json::Value>;

/// Context keys the resolver always populates
pub mod keys {
    /// Every required document and action of the current stage is satisfied
    pub const REQUIREMENTS_MET: &str = "requirements_met";
    /// Every required document of the current stage has been uploaded
    pub const ALL_DOCUMENTS_UPLOADED: &str = "all_documents_uploaded";
    /// Every required document of the current stage has been verified
    pub const ALL_DOCUMENTS_VERIFIED: &str = "all_documents_verified";
    /// The application has left draft state
    pub const IS_SUBMITTED: &str = "is_submitted";
    /// Id of the stage the application is in
    pub const CURRENT_STAGE: &str = "current_stage";
    /// Conventional attribute carrying the admissions decision
    pub const DECISION: &str = "decision";

    /// Per-document upload flag, e.g. `documents.transcript.uploaded`
    pub fn document_uploaded(document_type: &str) -> String {
        format!("documents.{}.uploaded", document_type)
    }

    /// Per-document verification flag, e.g. `documents.transcript.verified`
    pub fn document_verified(document_type: &str) -> String {
        format!("documents.{}.verified", document_type)
    }
}

/// A boolean expression over the condition context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    /// Passes when the key holds JSON `true`
    ///
    /// Example: `{"type": "Flag", "key": "requirements_met"}`
    Flag { key: String },

    /// Passes when the field equals the value exactly
    ///
    /// Example: `{"type": "Equals", "field": "decision", "value": "admit"}`
    Equals {
        field: String,
        value: serde_json::Value,
    },

    /// Passes when the field is present and not null
    Exists { field: String },

    /// Numeric comparison; non-numeric or missing fields fail
    GreaterThan { field: String, value: f64 },

    /// Numeric comparison; non-numeric or missing fields fail
    LessThan { field: String, value: f64 },

    /// Substring match on strings, element match on arrays of strings
    Contains { field: String, value: String },

    /// Every nested condition must pass (empty ⇒ true)
    All { conditions: Vec<Condition> },

    /// At least one nested condition must pass (empty ⇒ false)
    Any { conditions: Vec<Condition> },

    /// Nested condition must fail
    Not { condition: Box<Condition> },
}

/// Detailed outcome of evaluating one condition node
///
/// Used to tell administrators why an automatic transition did not fire.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionEvaluation {
    pub passed: bool,
    pub explanation: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionEvaluation>,
}

impl Condition {
    /// Evaluate the condition against a context map
    ///
    /// ## Rust Learning Notes:
    ///
    /// ### Pattern Matching on Enums
    /// The `match` must cover every variant, so adding a new predicate kind
    /// forces this function (and `explain`/`validate`) to be updated.
    pub fn evaluate(&self, context: &ConditionContext) -> bool {
        match self {
            Condition::Flag { key } => context.get(key).and_then(|v| v.as_bool()).unwrap_or(false),

            Condition::Equals { field, value } => context.get(field) == Some(value),

            Condition::Exists { field } => context.get(field).map_or(false, |v| !v.is_null()),

            Condition::GreaterThan { field, value } => context
                .get(field)
                .and_then(|v| v.as_f64())
                .map_or(false, |v| v > *value),

            Condition::LessThan { field, value } => context
                .get(field)
                .and_then(|v| v.as_f64())
                .map_or(false, |v| v < *value),

            Condition::Contains { field, value } => match context.get(field) {
                Some(serde_json::Value::String(s)) => s.contains(value.as_str()),
                Some(serde_json::Value::Array(items)) => {
                    items.iter().any(|item| item.as_str() == Some(value.as_str()))
                }
                _ => false,
            },

            Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(context)),

            Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(context)),

            Condition::Not { condition } => !condition.evaluate(context),
        }
    }

    /// Evaluate with a human-readable explanation for every node
    pub fn explain(&self, context: &ConditionContext) -> ConditionEvaluation {
        let passed = self.evaluate(context);

        let (explanation, children) = match self {
            Condition::Flag { key } => (
                match context.get(key) {
                    Some(v) => format!("Flag '{}' is {}", key, v),
                    None => format!("Flag '{}' is not set", key),
                },
                vec![],
            ),

            Condition::Equals { field, value } => (
                match context.get(field) {
                    Some(actual) if passed => format!("Field '{}' equals {}", field, actual),
                    Some(actual) => format!("Field '{}' is {}, expected {}", field, actual, value),
                    None => format!("Field '{}' is missing, expected {}", field, value),
                },
                vec![],
            ),

            Condition::Exists { field } => (
                if passed {
                    format!("Field '{}' exists", field)
                } else {
                    format!("Field '{}' does not exist", field)
                },
                vec![],
            ),

            Condition::GreaterThan { field, value } => (
                match context.get(field).and_then(|v| v.as_f64()) {
                    Some(v) if passed => format!("Field '{}' ({}) > {}", field, v, value),
                    Some(v) => format!("Field '{}' ({}) <= {}", field, v, value),
                    None => format!("Field '{}' is not a number", field),
                },
                vec![],
            ),

            Condition::LessThan { field, value } => (
                match context.get(field).and_then(|v| v.as_f64()) {
                    Some(v) if passed => format!("Field '{}' ({}) < {}", field, v, value),
                    Some(v) => format!("Field '{}' ({}) >= {}", field, v, value),
                    None => format!("Field '{}' is not a number", field),
                },
                vec![],
            ),

            Condition::Contains { field, value } => (
                if passed {
                    format!("Field '{}' contains '{}'", field, value)
                } else {
                    format!("Field '{}' does not contain '{}'", field, value)
                },
                vec![],
            ),

            Condition::All { conditions } => {
                let children: Vec<_> = conditions.iter().map(|c| c.explain(context)).collect();
                let ok = children.iter().filter(|c| c.passed).count();
                (format!("ALL: {} of {} conditions passed", ok, children.len()), children)
            }

            Condition::Any { conditions } => {
                let children: Vec<_> = conditions.iter().map(|c| c.explain(context)).collect();
                let ok = children.iter().filter(|c| c.passed).count();
                (format!("ANY: {} of {} conditions passed", ok, children.len()), children)
            }

            Condition::Not { condition } => {
                let inner = condition.explain(context);
                let text = if inner.passed {
                    "NOT: nested condition passed (so NOT fails)".to_string()
                } else {
                    "NOT: nested condition failed (so NOT passes)".to_string()
                };
                (text, vec![inner])
            }
        };

        ConditionEvaluation {
            passed,
            explanation,
            children,
        }
    }

    /// Reject expressions that cannot be meaningfully evaluated
    ///
    /// An empty key always reads as missing and an empty `Any` can never pass;
    /// both indicate a broken configuration rather than a real business rule.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Condition::Flag { key } if key.trim().is_empty() => {
                Err("Flag condition has an empty key".to_string())
            }
            Condition::Equals { field, .. }
            | Condition::Exists { field }
            | Condition::Contains { field, .. }
                if field.trim().is_empty() =>
            {
                Err("condition has an empty field name".to_string())
            }
            Condition::GreaterThan { field, value } | Condition::LessThan { field, value } => {
                if field.trim().is_empty() {
                    Err("numeric condition has an empty field name".to_string())
                } else if !value.is_finite() {
                    Err(format!("numeric condition on '{}' has a non-finite bound", field))
                } else {
                    Ok(())
                }
            }
            Condition::All { conditions } => conditions.iter().try_for_each(|c| c.validate()),
            Condition::Any { conditions } => {
                if conditions.is_empty() {
                    return Err("Any condition has no alternatives".to_string());
                }
                conditions.iter().try_for_each(|c| c.validate())
            }
            Condition::Not { condition } => condition.validate(),
            _ => Ok(()),
        }
    }
}

// Builder helpers for readable workflow definitions
impl Condition {
    pub fn flag(key: &str) -> Self {
        Condition::Flag { key: key.to_string() }
    }

    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Condition::Equals {
            field: field.to_string(),
            value,
        }
    }

    pub fn exists(field: &str) -> Self {
        Condition::Exists { field: field.to_string() }
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Condition::GreaterThan {
            field: field.to_string(),
            value,
        }
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Condition::LessThan {
            field: field.to_string(),
            value,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { conditions }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// Shorthand for `Flag { key: "requirements_met" }`
    pub fn requirements_met() -> Self {
        Self::flag(keys::REQUIREMENTS_MET)
    }

    /// Shorthand for `Flag { key: "all_documents_verified" }`
    pub fn all_documents_verified() -> Self {
        Self::flag(keys::ALL_DOCUMENTS_VERIFIED)
    }

    /// Shorthand for `Equals { field: "decision", value }`
    pub fn decision_is(decision: &str) -> Self {
        Self::equals(keys::DECISION, serde_json::json!(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, serde_json::Value)]) -> ConditionContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_flag_requires_literal_true() {
        let cond = Condition::all_documents_verified();

        assert!(cond.evaluate(&context(&[("all_documents_verified", json!(true))])));
        assert!(!cond.evaluate(&context(&[("all_documents_verified", json!(false))])));
        assert!(!cond.evaluate(&context(&[("all_documents_verified", json!("true"))])));
        assert!(!cond.evaluate(&ConditionContext::new()));
    }

    #[test]
    fn test_equals_and_exists() {
        let ctx = context(&[("decision", json!("admit")), ("notes", serde_json::Value::Null)]);

        assert!(Condition::decision_is("admit").evaluate(&ctx));
        assert!(!Condition::decision_is("reject").evaluate(&ctx));
        assert!(Condition::exists("decision").evaluate(&ctx));
        assert!(!Condition::exists("notes").evaluate(&ctx));
        assert!(!Condition::exists("missing").evaluate(&ctx));
    }

    #[test]
    fn test_numeric_comparisons() {
        let ctx = context(&[("gpa", json!(3.7)), ("essay", json!("n/a"))]);

        assert!(Condition::greater_than("gpa", 3.5).evaluate(&ctx));
        assert!(!Condition::greater_than("gpa", 3.9).evaluate(&ctx));
        assert!(Condition::less_than("gpa", 4.0).evaluate(&ctx));
        assert!(!Condition::greater_than("essay", 1.0).evaluate(&ctx));
    }

    #[test]
    fn test_contains_on_strings_and_arrays() {
        let ctx = context(&[
            ("program", json!("Computer Science")),
            ("flags", json!(["legacy", "athlete"])),
        ]);

        assert!(Condition::Contains { field: "program".into(), value: "Science".into() }.evaluate(&ctx));
        assert!(Condition::Contains { field: "flags".into(), value: "athlete".into() }.evaluate(&ctx));
        assert!(!Condition::Contains { field: "flags".into(), value: "veteran".into() }.evaluate(&ctx));
    }

    #[test]
    fn test_combinators() {
        let ctx = context(&[("requirements_met", json!(true)), ("decision", json!("waitlist"))]);

        let admit = Condition::all(vec![Condition::requirements_met(), Condition::decision_is("admit")]);
        let undecided = Condition::not(Condition::any(vec![
            Condition::decision_is("admit"),
            Condition::decision_is("reject"),
        ]));

        assert!(!admit.evaluate(&ctx));
        assert!(undecided.evaluate(&ctx));
        assert!(Condition::all(vec![]).evaluate(&ctx));
        assert!(!Condition::any(vec![]).evaluate(&ctx));
    }

    #[test]
    fn test_explain_reports_children() {
        let ctx = context(&[("requirements_met", json!(true))]);
        let cond = Condition::all(vec![Condition::requirements_met(), Condition::decision_is("admit")]);

        let report = cond.explain(&ctx);
        assert!(!report.passed);
        assert_eq!(report.children.len(), 2);
        assert!(report.children[0].passed);
        assert!(!report.children[1].passed);
        assert!(report.children[1].explanation.contains("missing"));
    }

    #[test]
    fn test_validate_rejects_malformed_trees() {
        assert!(Condition::requirements_met().validate().is_ok());
        assert!(Condition::flag("").validate().is_err());
        assert!(Condition::any(vec![]).validate().is_err());
        assert!(Condition::greater_than("gpa", f64::NAN).validate().is_err());
        assert!(Condition::not(Condition::all(vec![Condition::exists(" ")])).validate().is_err());
    }

    #[test]
    fn test_tagged_json_shape() {
        let json = json!({
            "type": "All",
            "conditions": [
                {"type": "Flag", "key": "all_documents_verified"},
                {"type": "Equals", "field": "decision", "value": "admit"}
            ]
        });

        let cond: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(
            cond,
            Condition::all(vec![Condition::all_documents_verified(), Condition::decision_is("admit")])
        );
    }
}

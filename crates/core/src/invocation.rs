//! Request-scoped artifacts: intent candidates, extracted fields, and the
//! result of reconciliation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::value::ParamValue;

/// How a field's value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Stated in the conversation
    Explicit,
    /// Derived from the personalization context
    Inferred,
    /// Static schema default
    Default,
    /// No value
    Unresolved,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Explicit => "explicit",
            Self::Inferred => "inferred",
            Self::Default => "default",
            Self::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}

/// A ranked tool suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub tool_id: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// One schema field's candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: Option<ParamValue>,
    pub provenance: Provenance,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl ExtractedField {
    pub fn explicit(name: impl Into<String>, value: ParamValue, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            provenance: Provenance::Explicit,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn resolved(name: impl Into<String>, value: ParamValue, provenance: Provenance, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            provenance,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            provenance: Provenance::Unresolved,
            confidence: 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.provenance != Provenance::Unresolved && self.value.is_some()
    }
}

/// A fully validated tool call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInvocation {
    pub tool_id: String,
    pub parameters: BTreeMap<String, ParamValue>,
    /// Weakest-link aggregate over required fields.
    pub confidence: f64,
    /// The fields that produced `parameters`, after reconciliation.
    pub fields: Vec<ExtractedField>,
}

impl ResolvedInvocation {
    /// Parameters as a JSON object for the tool request body.
    pub fn parameters_json(&self) -> serde_json::Value {
        let map = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// A field that failed its constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub name: String,
    pub reason: String,
}

/// Reconciliation could not produce a valid invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub tool_id: String,
    /// Required fields with no value.
    pub missing: Vec<String>,
    /// Explicit values that violate their constraint, or unknown field names.
    pub invalid: Vec<FieldIssue>,
}

impl ValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// A sentence a conversational agent can use to ask a follow-up.
    pub fn clarification_prompt(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!(
                "Could you tell me the {} you'd like?",
                join_human(&self.missing.iter().map(|m| m.replace('_', " ")).collect::<Vec<_>>())
            ));
        }
        for issue in &self.invalid {
            parts.push(format!("The {} {}.", issue.name.replace('_', " "), issue.reason));
        }
        parts.join(" ")
    }
}

fn join_human(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_field_has_zero_confidence() {
        let f = ExtractedField::unresolved("topic");
        assert!(!f.is_resolved());
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn explicit_confidence_is_clamped() {
        let f = ExtractedField::explicit("topic", ParamValue::from("x"), 1.7);
        assert_eq!(f.confidence, 1.0);
    }

    #[test]
    fn clarification_names_missing_fields() {
        let failure = ValidationFailure {
            tool_id: "note_maker".into(),
            missing: vec!["topic".into(), "subject".into()],
            invalid: vec![FieldIssue {
                name: "count".into(),
                reason: "25 is outside 1..=20".into(),
            }],
        };
        let prompt = failure.clarification_prompt();
        assert!(prompt.contains("topic and subject"));
        assert!(prompt.contains("count 25 is outside"));
    }

    #[test]
    fn parameters_json_is_plain_object() {
        let mut parameters = BTreeMap::new();
        parameters.insert("count".to_string(), ParamValue::Int(5));
        let inv = ResolvedInvocation {
            tool_id: "flashcard_generator".into(),
            parameters,
            confidence: 1.0,
            fields: vec![],
        };
        assert_eq!(inv.parameters_json(), serde_json::json!({"count": 5}));
    }
}

//! Reconciliation and validation: extracted fields to a
//! [`ResolvedInvocation`] or a [`ValidationFailure`].
//!
//! Required fields are never fabricated. A constraint violation on an
//! explicit value is reported back to the caller; one on an inferred or
//! default value is corrected in place.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use tutorlink_core::invocation::{
    ExtractedField, FieldIssue, Provenance, ResolvedInvocation, ValidationFailure,
};
use tutorlink_core::schema::{ParameterSpec, ToolSchema};

use crate::context::ConversationContext;
use crate::extractor::fallback_field;

pub struct Reconciler {
    inferred_confidence: f64,
}

impl Reconciler {
    pub fn new(inferred_confidence: f64) -> Self {
        Self { inferred_confidence }
    }

    pub fn reconcile(
        &self,
        schema: &ToolSchema,
        fields: &[ExtractedField],
        ctx: &ConversationContext,
    ) -> Result<ResolvedInvocation, ValidationFailure> {
        let mut failure = ValidationFailure {
            tool_id: schema.id.clone(),
            missing: Vec::new(),
            invalid: Vec::new(),
        };

        let mut by_name: HashMap<&str, &ExtractedField> = HashMap::new();
        for field in fields {
            if schema.parameter(&field.name).is_none() {
                failure.invalid.push(FieldIssue {
                    name: field.name.clone(),
                    reason: format!("is not a parameter of {}", schema.id),
                });
                continue;
            }
            by_name.entry(field.name.as_str()).or_insert(field);
        }

        let mut reconciled = Vec::with_capacity(schema.parameters.len());
        for spec in &schema.parameters {
            let field = by_name
                .get(spec.name.as_str())
                .map(|f| (*f).clone())
                .unwrap_or_else(|| ExtractedField::unresolved(&spec.name));

            let field = if field.is_resolved() {
                field
            } else if spec.required {
                failure.missing.push(spec.name.clone());
                reconciled.push(field);
                continue;
            } else {
                fallback_field(spec, ctx, self.inferred_confidence)
            };

            match self.validate_field(spec, field, ctx) {
                Ok(field) => reconciled.push(field),
                Err(Violation::Explicit(field, reason)) => {
                    failure.invalid.push(FieldIssue {
                        name: spec.name.clone(),
                        reason,
                    });
                    reconciled.push(field);
                }
                Err(Violation::Uncorrectable(field)) => {
                    if spec.required {
                        failure.missing.push(spec.name.clone());
                    }
                    reconciled.push(field);
                }
            }
        }

        if !failure.is_empty() {
            info!(
                tool_id = %schema.id,
                missing = failure.missing.len(),
                invalid = failure.invalid.len(),
                "Reconciliation needs clarification"
            );
            return Err(failure);
        }

        let confidence = weakest_link(schema, &reconciled);
        let parameters: BTreeMap<_, _> = reconciled
            .iter()
            .filter_map(|f| f.value.clone().map(|v| (f.name.clone(), v)))
            .collect();

        Ok(ResolvedInvocation {
            tool_id: schema.id.clone(),
            parameters,
            confidence,
            fields: reconciled,
        })
    }

    /// Check one resolved field, correcting non-explicit violations.
    fn validate_field(
        &self,
        spec: &ParameterSpec,
        field: ExtractedField,
        ctx: &ConversationContext,
    ) -> Result<ExtractedField, Violation> {
        let Some(value) = field.value.as_ref() else {
            return Ok(field);
        };
        let reason = match spec.param_type.check(value) {
            Ok(()) => return Ok(field),
            Err(reason) => reason,
        };

        if field.provenance == Provenance::Explicit {
            return Err(Violation::Explicit(field, reason));
        }

        if let Some(corrected) = spec.param_type.correct(value) {
            debug!(field = %spec.name, %reason, "Corrected non-explicit value");
            return Ok(ExtractedField {
                value: Some(corrected),
                ..field
            });
        }

        let rederived = fallback_field(spec, ctx, self.inferred_confidence);
        match rederived.value.as_ref() {
            Some(v) if spec.param_type.check(v).is_ok() => {
                debug!(field = %spec.name, %reason, "Re-derived default for non-explicit value");
                Ok(rederived)
            }
            _ => {
                debug!(field = %spec.name, %reason, "Non-explicit value could not be corrected");
                Err(Violation::Uncorrectable(ExtractedField::unresolved(&spec.name)))
            }
        }
    }
}

enum Violation {
    Explicit(ExtractedField, String),
    Uncorrectable(ExtractedField),
}

/// Minimum confidence over required fields; 1.0 when there are none.
pub fn weakest_link(schema: &ToolSchema, fields: &[ExtractedField]) -> f64 {
    schema
        .required_parameters()
        .filter_map(|spec| fields.iter().find(|f| f.name == spec.name))
        .map(|f| f.confidence)
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))
        .unwrap_or(1.0)
}

//! Parameter extractor: one candidate value per schema field.
//!
//! Per field, in order:
//! 1. explicit value from the conversation (oracle), with the oracle's confidence
//! 2. a personalization derivation, at the configured inferred confidence
//! 3. a static default, at confidence 1.0
//! 4. unresolved, at confidence 0.0
//!
//! A value the oracle reports that cannot be coerced to the field's type
//! demotes the field to unresolved. Fields are independent, so per-field
//! calls run concurrently and results come back in schema order.

use std::sync::Arc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tutorlink_config::ExtractionStrategy;
use tutorlink_core::error::OracleError;
use tutorlink_core::invocation::{ExtractedField, Provenance};
use tutorlink_core::provider::Oracle;
use tutorlink_core::schema::{DefaultRule, ParameterSpec, ToolSchema};

use crate::context::ConversationContext;
use crate::prompt::{self, json_number, parse_json_object};
use crate::{complete_or_cancel, OracleSettings};

/// Confidence used when the oracle reports a value without one.
pub const UNSTATED_CONFIDENCE: f64 = 0.7;

/// Extractor tuning, from the `[extractor]` config section.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub strategy: ExtractionStrategy,
    pub max_concurrency: usize,
    pub inferred_confidence: f64,
    pub history_window: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        let cfg = tutorlink_config::ExtractorConfig::default();
        Self::from(&cfg)
    }
}

impl From<&tutorlink_config::ExtractorConfig> for ExtractorSettings {
    fn from(cfg: &tutorlink_config::ExtractorConfig) -> Self {
        Self {
            strategy: cfg.strategy,
            max_concurrency: cfg.max_concurrency.max(1),
            inferred_confidence: cfg.inferred_confidence,
            history_window: cfg.history_window,
        }
    }
}

/// Every field of one schema, plus oracle call accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    /// One entry per parameter, in schema order
    pub fields: Vec<ExtractedField>,
    pub oracle_calls: usize,
    pub oracle_failures: usize,
    pub cancelled: bool,
}

impl Extraction {
    /// Every oracle call of this extraction failed.
    pub fn oracle_unavailable(&self) -> bool {
        self.oracle_calls > 0 && self.oracle_failures == self.oracle_calls
    }
}

/// What the oracle said about one field.
#[derive(Debug, Clone, PartialEq)]
enum Evidence {
    Stated { raw: serde_json::Value, confidence: f64 },
    Absent,
}

pub struct ParameterExtractor {
    oracle: Arc<dyn Oracle>,
    oracle_settings: OracleSettings,
    settings: ExtractorSettings,
}

impl ParameterExtractor {
    pub fn new(oracle: Arc<dyn Oracle>, oracle_settings: OracleSettings, settings: ExtractorSettings) -> Self {
        Self {
            oracle,
            oracle_settings,
            settings,
        }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    pub async fn extract(
        &self,
        schema: &ToolSchema,
        ctx: &ConversationContext,
        cancel: &CancellationToken,
    ) -> Extraction {
        if schema.parameters.is_empty() {
            return Extraction {
                fields: Vec::new(),
                oracle_calls: 0,
                oracle_failures: 0,
                cancelled: false,
            };
        }

        let (evidence, calls, failures) = match self.settings.strategy {
            ExtractionStrategy::PerField => self.per_field_evidence(schema, ctx, cancel).await,
            ExtractionStrategy::Batched => self.batched_evidence(schema, ctx, cancel).await,
        };

        let fields = schema
            .parameters
            .iter()
            .zip(evidence)
            .map(|(spec, evidence)| self.resolve_field(spec, evidence, ctx))
            .collect();

        Extraction {
            fields,
            oracle_calls: calls,
            oracle_failures: failures,
            cancelled: cancel.is_cancelled(),
        }
    }

    /// One oracle call per field, at most `max_concurrency` in flight.
    async fn per_field_evidence(
        &self,
        schema: &ToolSchema,
        ctx: &ConversationContext,
        cancel: &CancellationToken,
    ) -> (Vec<Evidence>, usize, usize) {
        let window = self.settings.history_window;
        let field_calls: Vec<_> = schema
            .parameters
            .iter()
            .map(|spec| async move {
                let request = self.oracle_settings.request(
                    prompt::FIELD_SYSTEM,
                    prompt::field_prompt(schema, spec, ctx, window),
                );
                let response = complete_or_cancel(self.oracle.as_ref(), request, cancel).await?;
                Ok(parse_field_answer(
                    parse_json_object(&response.content).as_ref(),
                ))
            })
            .collect();
        let results: Vec<Result<Evidence, OracleError>> = stream::iter(field_calls)
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let calls = results.len();
        let mut failures = 0;
        let evidence = results
            .into_iter()
            .zip(&schema.parameters)
            .map(|(result, spec)| match result {
                Ok(evidence) => evidence,
                Err(e) => {
                    failures += 1;
                    warn!(tool_id = %schema.id, field = %spec.name, error = %e, "Field extraction call failed");
                    Evidence::Absent
                }
            })
            .collect();
        (evidence, calls, failures)
    }

    /// One combined oracle call for every field.
    async fn batched_evidence(
        &self,
        schema: &ToolSchema,
        ctx: &ConversationContext,
        cancel: &CancellationToken,
    ) -> (Vec<Evidence>, usize, usize) {
        let request = self.oracle_settings.request(
            prompt::BATCH_SYSTEM,
            prompt::batch_prompt(schema, ctx, self.settings.history_window),
        );
        match complete_or_cancel(self.oracle.as_ref(), request, cancel).await {
            Ok(response) => {
                let object = parse_json_object(&response.content);
                let fields = object.as_ref().and_then(|o| o.get("fields")).and_then(|f| f.as_object());
                let evidence = schema
                    .parameters
                    .iter()
                    .map(|spec| {
                        let entry = fields.and_then(|f| f.get(&spec.name)).and_then(|v| v.as_object());
                        parse_field_answer(entry)
                    })
                    .collect();
                (evidence, 1, 0)
            }
            Err(e) => {
                warn!(tool_id = %schema.id, error = %e, "Batched extraction call failed");
                (vec![Evidence::Absent; schema.parameters.len()], 1, 1)
            }
        }
    }

    fn resolve_field(&self, spec: &ParameterSpec, evidence: Evidence, ctx: &ConversationContext) -> ExtractedField {
        if let Evidence::Stated { raw, confidence } = evidence {
            return match spec.param_type.coerce(&raw) {
                Ok(value) => {
                    debug!(field = %spec.name, confidence, "Explicit value extracted");
                    ExtractedField::explicit(&spec.name, value, confidence)
                }
                Err(e) => {
                    warn!(field = %spec.name, error = %e, "Coercion failed, field unresolved");
                    ExtractedField::unresolved(&spec.name)
                }
            };
        }
        fallback_field(spec, ctx, self.settings.inferred_confidence)
    }
}

/// Steps 2 to 4: derivation, static default, or unresolved.
pub fn fallback_field(spec: &ParameterSpec, ctx: &ConversationContext, inferred_confidence: f64) -> ExtractedField {
    match spec.default.resolve(&ctx.personalization) {
        Some((value, Provenance::Inferred)) => {
            ExtractedField::resolved(&spec.name, value, Provenance::Inferred, inferred_confidence)
        }
        Some((value, provenance)) => ExtractedField::resolved(&spec.name, value, provenance, 1.0),
        None => {
            debug_assert!(matches!(spec.default, DefaultRule::None));
            ExtractedField::unresolved(&spec.name)
        }
    }
}

/// Interpret `{"found", "value", "confidence"}`. Anything malformed means
/// nothing was found.
fn parse_field_answer(object: Option<&serde_json::Map<String, serde_json::Value>>) -> Evidence {
    let Some(object) = object else {
        return Evidence::Absent;
    };
    let value = object.get("value").cloned().unwrap_or(serde_json::Value::Null);
    let found = object
        .get("found")
        .and_then(|f| f.as_bool())
        .unwrap_or(!value.is_null());
    let blank = value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty());
    if !found || blank {
        return Evidence::Absent;
    }
    let confidence = object
        .get("confidence")
        .and_then(json_number)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(UNSTATED_CONFIDENCE);
    Evidence::Stated { raw: value, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingOracle, RuleOracle};
    use tutorlink_core::message::Message;
    use tutorlink_core::personalization::PersonalizationContext;
    use tutorlink_core::schema::{Derivation, ParamType};
    use tutorlink_core::value::ParamValue;

    fn flashcards() -> ToolSchema {
        ToolSchema::new("flashcard_generator", "Flashcards")
            .param(ParameterSpec::required("topic", "Topic", ParamType::text(1, 200)))
            .param(ParameterSpec::required("count", "Cards", ParamType::int_range(1, 20)).with_static(5))
            .param(
                ParameterSpec::required("difficulty", "Level", ParamType::one_of(&["easy", "medium", "hard"]))
                    .with_derivation(Derivation::DifficultyFromProfile),
            )
    }

    fn ctx(mastery: u8) -> ConversationContext {
        ConversationContext::new(
            &[Message::user("hi")],
            "Can you create flashcards for derivatives?",
            PersonalizationContext {
                mastery_level: mastery,
                ..Default::default()
            },
        )
    }

    fn topic_oracle() -> RuleOracle {
        RuleOracle::new().rule(
            "Parameter: \"topic\"",
            r#"{"found": true, "value": "derivatives", "confidence": 0.9}"#,
        )
    }

    fn extractor(oracle: Arc<dyn Oracle>, strategy: ExtractionStrategy) -> ParameterExtractor {
        ParameterExtractor::new(
            oracle,
            OracleSettings::default(),
            ExtractorSettings {
                strategy,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn provenance_ladder() {
        let ex = extractor(Arc::new(topic_oracle()), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(6), &CancellationToken::new()).await;

        assert_eq!(out.fields.len(), 3);
        assert_eq!(out.fields[0].provenance, Provenance::Explicit);
        assert_eq!(out.fields[0].value, Some(ParamValue::from("derivatives")));
        assert!((out.fields[0].confidence - 0.9).abs() < 1e-9);

        assert_eq!(out.fields[1].provenance, Provenance::Default);
        assert_eq!(out.fields[1].value, Some(ParamValue::Int(5)));
        assert_eq!(out.fields[1].confidence, 1.0);

        assert_eq!(out.fields[2].provenance, Provenance::Inferred);
        assert_eq!(out.fields[2].value, Some(ParamValue::from("medium")));
        assert!((out.fields[2].confidence - 0.6).abs() < 1e-9);

        assert_eq!(out.oracle_calls, 3);
        assert_eq!(out.oracle_failures, 0);
    }

    #[tokio::test]
    async fn missing_value_without_default_is_unresolved() {
        let ex = extractor(Arc::new(RuleOracle::new()), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(6), &CancellationToken::new()).await;
        assert_eq!(out.fields[0].provenance, Provenance::Unresolved);
        assert_eq!(out.fields[0].confidence, 0.0);
        assert!(out.fields[0].value.is_none());
    }

    #[tokio::test]
    async fn coercion_failure_demotes_to_unresolved() {
        let oracle = topic_oracle().rule(
            "Parameter: \"count\"",
            r#"{"found": true, "value": "a whole bunch", "confidence": 0.8}"#,
        );
        let ex = extractor(Arc::new(oracle), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(6), &CancellationToken::new()).await;
        assert_eq!(out.fields[1].provenance, Provenance::Unresolved);
    }

    #[tokio::test]
    async fn explicit_value_overrides_default() {
        let oracle = topic_oracle().rule("Parameter: \"count\"", r#"{"value": "12 cards"}"#);
        let ex = extractor(Arc::new(oracle), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(6), &CancellationToken::new()).await;
        assert_eq!(out.fields[1].provenance, Provenance::Explicit);
        assert_eq!(out.fields[1].value, Some(ParamValue::Int(12)));
        assert!((out.fields[1].confidence - UNSTATED_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn extraction_is_idempotent() {
        let ex = extractor(Arc::new(topic_oracle()), ExtractionStrategy::PerField);
        let schema = flashcards();
        let first = ex.extract(&schema, &ctx(6), &CancellationToken::new()).await;
        let second = ex.extract(&schema, &ctx(6), &CancellationToken::new()).await;
        assert_eq!(first.fields, second.fields);
    }

    #[tokio::test]
    async fn batched_matches_per_field() {
        let per_field = extractor(Arc::new(topic_oracle()), ExtractionStrategy::PerField)
            .extract(&flashcards(), &ctx(6), &CancellationToken::new())
            .await;

        let batch_oracle = RuleOracle::new().rule(
            "Parameters:\n",
            r#"```json
{"fields": {"topic": {"found": true, "value": "derivatives", "confidence": 0.9},
            "count": {"found": false, "value": null},
            "difficulty": {"found": false}}}
```"#,
        );
        let batched = extractor(Arc::new(batch_oracle), ExtractionStrategy::Batched)
            .extract(&flashcards(), &ctx(6), &CancellationToken::new())
            .await;

        assert_eq!(per_field.fields, batched.fields);
        assert_eq!(batched.oracle_calls, 1);
    }

    /// Tracks how many calls are in flight at once.
    #[derive(Default)]
    struct PeakOracle {
        in_flight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Oracle for PeakOracle {
        fn name(&self) -> &str {
            "peak"
        }

        async fn complete(
            &self,
            request: tutorlink_core::provider::OracleRequest,
        ) -> Result<tutorlink_core::provider::OracleResponse, OracleError> {
            use std::sync::atomic::Ordering;
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(tutorlink_core::provider::OracleResponse {
                content: r#"{"found": false}"#.into(),
                model: request.model,
                usage: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn per_field_calls_respect_max_concurrency() {
        use std::sync::atomic::Ordering;
        let schema = ToolSchema::new("quiz_generator", "Quiz")
            .param(ParameterSpec::required("topic", "Topic", ParamType::text(1, 200)))
            .param(ParameterSpec::optional("subject", "Subject", ParamType::text(1, 100)))
            .param(ParameterSpec::required("question_count", "Questions", ParamType::int_range(1, 20)).with_static(5))
            .param(
                ParameterSpec::required("difficulty", "Level", ParamType::one_of(&["easy", "medium", "hard"]))
                    .with_derivation(Derivation::DifficultyFromProfile),
            )
            .param(ParameterSpec::optional("include_examples", "Examples", ParamType::Boolean).with_static(true));

        let oracle = Arc::new(PeakOracle::default());
        let ex = ParameterExtractor::new(
            oracle.clone(),
            OracleSettings::default(),
            ExtractorSettings {
                strategy: ExtractionStrategy::PerField,
                max_concurrency: 2,
                ..Default::default()
            },
        );
        let out = ex.extract(&schema, &ctx(6), &CancellationToken::new()).await;

        assert_eq!(out.fields.len(), 5);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 5);
        assert_eq!(oracle.peak.load(Ordering::SeqCst), 2);
        assert_eq!(oracle.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oracle_failures_fall_back_and_are_counted() {
        let ex = extractor(Arc::new(FailingOracle::new()), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(2), &CancellationToken::new()).await;
        assert!(out.oracle_unavailable());
        assert_eq!(out.fields[0].provenance, Provenance::Unresolved);
        assert_eq!(out.fields[1].provenance, Provenance::Default);
        assert_eq!(out.fields[2].value, Some(ParamValue::from("easy")));
    }

    #[tokio::test]
    async fn cancelled_extraction_is_flagged() {
        let token = CancellationToken::new();
        token.cancel();
        let ex = extractor(Arc::new(topic_oracle()), ExtractionStrategy::PerField);
        let out = ex.extract(&flashcards(), &ctx(6), &token).await;
        assert!(out.cancelled);
        assert!(out.oracle_unavailable());
    }

    #[test]
    fn field_answer_parsing() {
        let parse = |s: &str| parse_field_answer(parse_json_object(s).as_ref());
        assert_eq!(parse(r#"{"found": false, "value": "x"}"#), Evidence::Absent);
        assert_eq!(parse(r#"{"found": true, "value": "  "}"#), Evidence::Absent);
        assert_eq!(parse("nonsense"), Evidence::Absent);
        assert_eq!(
            parse(r#"{"value": 3, "confidence": "1.4"}"#),
            Evidence::Stated { raw: serde_json::json!(3), confidence: 1.0 }
        );
    }
}

//! Intent classifier: ranks candidate tools for the current message.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tutorlink_core::error::ClassificationError;
use tutorlink_core::invocation::IntentCandidate;
use tutorlink_core::provider::{Oracle, OracleRequest};
use tutorlink_core::schema::ToolSchema;

use crate::context::ConversationContext;
use crate::prompt::{self, json_number, parse_json_object};
use crate::{complete_or_cancel, OracleSettings};

/// Ranked candidates plus the threshold they were judged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Sorted by confidence, descending; ties in registration order.
    pub candidates: Vec<IntentCandidate>,
    pub threshold: f64,
}

impl Classification {
    pub fn top(&self) -> Option<&IntentCandidate> {
        self.candidates.first()
    }

    /// Whether the top candidate reaches the threshold.
    pub fn is_confident(&self) -> bool {
        self.top().is_some_and(|c| c.confidence >= self.threshold)
    }
}

pub struct IntentClassifier {
    oracle: Arc<dyn Oracle>,
    settings: OracleSettings,
    history_window: usize,
    threshold: f64,
}

impl IntentClassifier {
    pub fn new(oracle: Arc<dyn Oracle>, settings: OracleSettings, history_window: usize, threshold: f64) -> Self {
        Self {
            oracle,
            settings,
            history_window,
            threshold,
        }
    }

    /// Score every candidate. `candidates` must be in registration order.
    pub async fn classify(
        &self,
        ctx: &ConversationContext,
        candidates: &[Arc<ToolSchema>],
        cancel: &CancellationToken,
    ) -> Result<Classification, ClassificationError> {
        if candidates.is_empty() {
            return Ok(Classification {
                candidates: Vec::new(),
                threshold: self.threshold,
            });
        }

        let schemas: Vec<&ToolSchema> = candidates.iter().map(|s| s.as_ref()).collect();
        let request = self.settings.request(
            prompt::CLASSIFIER_SYSTEM,
            prompt::classification_prompt(ctx, &schemas, self.history_window),
        );

        let response = complete_or_cancel(self.oracle.as_ref(), request, cancel)
            .await
            .map_err(|e| {
                warn!(error = %e, "Classification oracle call failed");
                ClassificationError::Unavailable(e.to_string())
            })?;

        let scores = parse_scores(&response.content, &schemas).ok_or_else(|| {
            warn!(len = response.content.len(), "Classification answer was not a score object");
            ClassificationError::Unavailable("unparseable classifier response".into())
        })?;

        let ranked = rank(&schemas, &scores);
        debug!(
            top = ranked.first().map(|c| c.tool_id.as_str()).unwrap_or("-"),
            confidence = ranked.first().map(|c| c.confidence).unwrap_or(0.0),
            "Classified intent"
        );

        Ok(Classification {
            candidates: ranked,
            threshold: self.threshold,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Raw scores in candidate order. Accepts `{"scores": {...}}` or a flat
/// object; unknown ids are ignored and missing ones score 0.
fn parse_scores(content: &str, schemas: &[&ToolSchema]) -> Option<Vec<f64>> {
    let object = parse_json_object(content)?;
    let scores = match object.get("scores") {
        Some(serde_json::Value::Object(inner)) => inner.clone(),
        Some(_) => return None,
        None => object,
    };

    let raw: Vec<Option<f64>> = schemas
        .iter()
        .map(|s| scores.get(&s.id).and_then(json_number))
        .collect();
    if raw.iter().all(Option::is_none) {
        return None;
    }
    Some(raw.into_iter().map(|s| s.unwrap_or(0.0)).collect())
}

/// Clean, normalize if needed, and stable-sort descending.
fn rank(schemas: &[&ToolSchema], raw: &[f64]) -> Vec<IntentCandidate> {
    let cleaned: Vec<f64> = raw
        .iter()
        .map(|s| if s.is_finite() && *s > 0.0 { *s } else { 0.0 })
        .collect();

    let sum: f64 = cleaned.iter().sum();
    let unnormalized = cleaned.iter().any(|s| *s > 1.0) || sum > 1.0 + 1e-9;
    let scores: Vec<f64> = if unnormalized && sum > 0.0 {
        cleaned.iter().map(|s| s / sum).collect()
    } else {
        cleaned
    };

    let mut ranked: Vec<IntentCandidate> = schemas
        .iter()
        .zip(scores)
        .map(|(schema, confidence)| IntentCandidate {
            tool_id: schema.id.clone(),
            confidence: confidence.clamp(0.0, 1.0),
        })
        .collect();
    // Stable: equal scores keep registration order.
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingOracle, HangingOracle, RuleOracle};
    use std::time::Duration;
    use tutorlink_core::message::Message;
    use tutorlink_core::personalization::PersonalizationContext;

    fn schemas() -> Vec<Arc<ToolSchema>> {
        ["note_maker", "flashcard_generator", "concept_explainer"]
            .into_iter()
            .map(|id| Arc::new(ToolSchema::new(id, format!("{id} description"))))
            .collect()
    }

    fn ctx() -> ConversationContext {
        ConversationContext::new(
            &[Message::user("we're doing calculus")],
            "Can you create flashcards for derivatives?",
            PersonalizationContext::default(),
        )
    }

    fn classifier(oracle: Arc<dyn Oracle>) -> IntentClassifier {
        IntentClassifier::new(oracle, OracleSettings::default(), 6, 0.5)
    }

    #[tokio::test]
    async fn ranks_by_score() {
        let oracle = Arc::new(RuleOracle::new().rule(
            "Available tools:",
            r#"{"scores": {"note_maker": 0.1, "flashcard_generator": 0.85, "concept_explainer": 0.05}}"#,
        ));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.top().unwrap().tool_id, "flashcard_generator");
        assert!((result.top().unwrap().confidence - 0.85).abs() < 1e-9);
        assert!(result.is_confident());
    }

    #[tokio::test]
    async fn unnormalized_scores_are_normalized() {
        let oracle = Arc::new(RuleOracle::new().rule(
            "Available tools:",
            r#"{"note_maker": 2, "flashcard_generator": 6, "concept_explainer": 2}"#,
        ));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await
            .unwrap();
        let total: f64 = result.candidates.iter().map(|c| c.confidence).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((result.top().unwrap().confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ties_follow_registration_order() {
        let oracle = Arc::new(RuleOracle::new().rule(
            "Available tools:",
            r#"{"scores": {"concept_explainer": 0.4, "flashcard_generator": 0.4, "note_maker": 0.2}}"#,
        ));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await
            .unwrap();
        let order: Vec<&str> = result.candidates.iter().map(|c| c.tool_id.as_str()).collect();
        assert_eq!(order, vec!["flashcard_generator", "concept_explainer", "note_maker"]);
        assert!(!result.is_confident());
    }

    #[tokio::test]
    async fn low_confidence_still_returns_top() {
        let oracle = Arc::new(RuleOracle::new().rule(
            "Available tools:",
            r#"{"scores": {"note_maker": 0.3, "flashcard_generator": -1, "concept_explainer": "NaN"}}"#,
        ));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.top().unwrap().tool_id, "note_maker");
        assert!(!result.is_confident());
        assert!(result.candidates.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_oracle() {
        let oracle = Arc::new(FailingOracle::new());
        let result = classifier(oracle.clone())
            .classify(&ctx(), &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn oracle_failure_is_unavailable() {
        let result = classifier(Arc::new(FailingOracle::new()))
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ClassificationError::Unavailable(_))));
    }

    #[tokio::test]
    async fn garbage_answer_is_unavailable() {
        let oracle = Arc::new(RuleOracle::new().rule("Available tools:", "I think flashcards!"));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ClassificationError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_unavailable() {
        let oracle = crate::test_helpers::with_timeout(Arc::new(HangingOracle), Duration::from_secs(1));
        let result = classifier(oracle)
            .classify(&ctx(), &schemas(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ClassificationError::Unavailable(_))));
    }

    #[test]
    fn prompt_weights_current_message() {
        let s = schemas();
        let refs: Vec<&ToolSchema> = s.iter().map(|a| a.as_ref()).collect();
        let text = prompt::classification_prompt(&ctx(), &refs, 6);
        assert!(text.contains("- flashcard_generator: flashcard_generator description"));
        assert!(text.contains("Current message (most important):\nCan you create flashcards"));
    }
}

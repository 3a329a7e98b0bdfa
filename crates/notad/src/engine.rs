//! Fan-out orchestration of a notation run.
//!
//! One aggregation request spawns exactly four concurrent evaluator calls
//! (one per rubric kind) and joins on all four - no early return on first
//! failure, no early return on first success, no streaming of partials. The
//! engine is stateless between invocations.

use crate::aggregator;
use crate::evaluator::{EvaluationRequest, RubricEvaluator};
use crate::provider::TranscriptProvider;
use crate::store::FileResultStore;
use nota_common::rubric::{AggregationResult, RubricKind};
use nota_common::transcript::ConversationRef;
use nota_common::NotaError;
use serde::Serialize;
use tracing::{error, info};

/// Outcome of one notation run: every successful rubric plus the ordered
/// error list. `store_error` is set when the result could not be persisted;
/// the computed result is still returned in memory.
#[derive(Debug, Serialize)]
pub struct NotationOutcome {
    pub session_id: String,
    pub processed_kinds: Vec<RubricKind>,
    pub errors: Vec<String>,
    pub resultat: AggregationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

/// The notation engine: provider -> fan-out -> aggregation -> store.
pub struct NotationEngine<E, P> {
    evaluator: E,
    provider: P,
    store: FileResultStore,
}

impl<E: RubricEvaluator, P: TranscriptProvider> NotationEngine<E, P> {
    pub fn new(evaluator: E, provider: P, store: FileResultStore) -> Self {
        Self {
            evaluator,
            provider,
            store,
        }
    }

    /// Run one full notation for the referenced conversation.
    pub async fn compute_notation(
        &self,
        conversation: &ConversationRef,
    ) -> Result<NotationOutcome, NotaError> {
        let session = self.provider.resolve(conversation)?;
        if session.turns.is_empty() {
            return Err(NotaError::InputResolution(format!(
                "session {} has no transcript turns",
                session.session_id
            )));
        }
        info!(
            "Scoring session {} ({} turns, scenario {})",
            session.session_id,
            session.turns.len(),
            session.scenario_id
        );

        let request = EvaluationRequest {
            reference_document: self
                .provider
                .reference_document(&session.scenario_id)
                .unwrap_or_default(),
            transcript: session.render_transcript(),
            scenario_context: session.contexte.clone().unwrap_or_default(),
        };

        let mut result = self.fan_out(&request).await;

        if result.all_failed() {
            return Err(NotaError::AllEvaluatorsFailed {
                errors: result.errors(),
            });
        }

        // captured before injection: processed_kinds reports what the
        // evaluators did, not what the aggregator synthesized
        let processed_kinds = result.successful_kinds();
        let errors = result.errors();

        aggregator::inject_composite(&mut result);

        let mut outcome = NotationOutcome {
            session_id: session.session_id.clone(),
            processed_kinds,
            errors,
            resultat: result,
            store_error: None,
        };

        if let Err(e) = self
            .store
            .persist(&session.session_id, &outcome.resultat)
            .await
        {
            error!(
                "Failed to persist notation for {}: {}",
                session.session_id, e
            );
            outcome.store_error = Some(e.to_string());
        }

        Ok(outcome)
    }

    /// Issue all four rubric evaluations concurrently and join on all of
    /// them. A failed call becomes an error entry, nothing more.
    async fn fan_out(&self, request: &EvaluationRequest) -> AggregationResult {
        let (synthese, methodologie, discours, transcription) = tokio::join!(
            self.evaluator.evaluate(RubricKind::Synthese, request),
            self.evaluator.evaluate(RubricKind::Methodologie, request),
            self.evaluator.evaluate(RubricKind::Discours, request),
            self.evaluator.evaluate(RubricKind::Transcription, request),
        );

        let mut result = AggregationResult::default();
        for rubric in [synthese, methodologie, discours, transcription] {
            result.insert(rubric);
        }
        result
    }
}

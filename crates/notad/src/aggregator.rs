//! Composite score injection.
//!
//! Reads the methodology rubric's step breakdown, computes the weighted
//! composite, and merges it into the synthesis payload. A pure function of
//! already-collected rubric results: no I/O, cannot fail.

use nota_common::rubric::AggregationResult;
use nota_common::scoring::compute_score_global;
use tracing::{debug, info};

/// Compute and attach the composite score block.
///
/// When the methodology evaluation failed, or returned no step with a
/// resolvable code, the composite is genuinely omitted - not zeroed - and no
/// error is added for that alone.
pub fn inject_composite(result: &mut AggregationResult) {
    let steps = match result.methodologie() {
        Some(payload) => payload.resolved_steps(),
        None => {
            debug!("No methodology payload; composite omitted");
            return;
        }
    };
    if steps.is_empty() {
        debug!("No resolvable methodology steps; composite omitted");
        return;
    }

    let score = compute_score_global(&steps);
    info!(
        "Composite score {} ({}) from {} resolved steps",
        score.valeur,
        score.niveau_performance,
        steps.len()
    );
    result.attach_score_global(score);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nota_common::rubric::{RubricKind, RubricPayload, RubricResult};
    use serde_json::json;

    fn methodologie_result(etapes: serde_json::Value) -> RubricResult {
        RubricResult::ok(
            RubricKind::Methodologie,
            RubricPayload::from_value(RubricKind::Methodologie, json!({ "etapes": etapes }))
                .unwrap(),
        )
    }

    #[test]
    fn test_composite_from_methodology_steps() {
        let mut result = AggregationResult::default();
        result.insert(methodologie_result(json!([
            {"code": "D", "titre": "1. Découverte", "score": 80},
            {"code": "A", "titre": "2. Accroche", "score": 0},
            {"code": "G", "titre": "3. Gestion des objections", "score": 60},
            {"code": "O", "titre": "4. Obtenir l'engagement", "score": 0}
        ])));

        inject_composite(&mut result);

        let score = result.score_global().unwrap();
        assert_eq!(score.valeur, 30.0);
        assert!(result.errors().is_empty());
    }

    #[test]
    fn test_missing_methodology_omits_composite() {
        let mut result = AggregationResult::default();
        result.insert(RubricResult::failed(RubricKind::Methodologie, "down"));

        inject_composite(&mut result);

        assert!(result.score_global().is_none());
        // the evaluator failure is already on record; injection adds nothing
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_no_resolvable_steps_omits_composite() {
        let mut result = AggregationResult::default();
        result.insert(methodologie_result(json!([
            {"titre": "Intro", "score": 90}
        ])));

        inject_composite(&mut result);

        assert!(result.score_global().is_none());
        assert!(result.errors().is_empty());
    }
}

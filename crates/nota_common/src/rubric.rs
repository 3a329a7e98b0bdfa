//! Rubric kinds, per-rubric results, and typed evaluator payloads.
//!
//! Evaluator output is validated into one payload type per rubric kind at
//! the client boundary. Unknown fields are kept in flattened extras so a
//! notation never silently drops what the evaluator said.

use crate::scoring::{score_from_value, ResolvedStep, ScoreGlobal, StepCode};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The four evaluation rubrics, in canonical order.
///
/// Order matters: error lists and persisted rubric maps are always reported
/// in this order, whatever the completion order of the evaluator calls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RubricKind {
    Synthese,
    Methodologie,
    Discours,
    Transcription,
}

impl RubricKind {
    pub const ALL: [RubricKind; 4] = [
        RubricKind::Synthese,
        RubricKind::Methodologie,
        RubricKind::Discours,
        RubricKind::Transcription,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RubricKind::Synthese => "synthese",
            RubricKind::Methodologie => "methodologie",
            RubricKind::Discours => "discours",
            RubricKind::Transcription => "transcription",
        }
    }
}

impl fmt::Display for RubricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One methodology step as returned by the evaluator.
///
/// `code` is the explicit step tag when the evaluator provides one;
/// otherwise the step is matched by the numeric prefix of its title. A step
/// that resolves to no code stays in the payload but never feeds the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtapeMethodologie {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub titre: String,
    #[serde(default)]
    pub score: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentaire: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EtapeMethodologie {
    /// Resolve the step code: explicit tag first, then numeric title prefix.
    pub fn resolved_code(&self) -> Option<StepCode> {
        if let Some(tag) = &self.code {
            if let Some(code) = StepCode::from_tag(tag) {
                return Some(code);
            }
        }
        StepCode::from_title_prefix(&self.titre)
    }

    pub fn resolved_score(&self) -> f64 {
        score_from_value(&self.score)
    }
}

/// Step breakdown returned by the methodology evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodologiePayload {
    #[serde(default)]
    pub etapes: Vec<EtapeMethodologie>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MethodologiePayload {
    /// Steps carrying a resolvable code, in payload order.
    pub fn resolved_steps(&self) -> Vec<ResolvedStep> {
        self.etapes
            .iter()
            .filter_map(|etape| {
                etape.resolved_code().map(|code| ResolvedStep {
                    code,
                    score: etape.resolved_score(),
                })
            })
            .collect()
    }
}

/// Qualitative synthesis of the call. Also the carrier of the injected
/// composite score block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesePayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resume: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points_forts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axes_amelioration: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_global: Option<ScoreGlobal>,
    /// Rubrics that do not feed the numeric score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rubriques_hors_calcul: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Observations on wording, tone and pacing. Never feeds the score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoursPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transcription review notes (misheard words, attribution fixes). Never
/// feeds the score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed payload per rubric kind, validated at the evaluator boundary.
#[derive(Debug, Clone)]
pub enum RubricPayload {
    Synthese(SynthesePayload),
    Methodologie(MethodologiePayload),
    Discours(DiscoursPayload),
    Transcription(TranscriptionPayload),
}

impl RubricPayload {
    /// Validate raw evaluator JSON into the payload type for `kind`.
    pub fn from_value(kind: RubricKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RubricKind::Synthese => RubricPayload::Synthese(serde_json::from_value(value)?),
            RubricKind::Methodologie => {
                RubricPayload::Methodologie(serde_json::from_value(value)?)
            }
            RubricKind::Discours => RubricPayload::Discours(serde_json::from_value(value)?),
            RubricKind::Transcription => {
                RubricPayload::Transcription(serde_json::from_value(value)?)
            }
        })
    }

    pub fn kind(&self) -> RubricKind {
        match self {
            RubricPayload::Synthese(_) => RubricKind::Synthese,
            RubricPayload::Methodologie(_) => RubricKind::Methodologie,
            RubricPayload::Discours(_) => RubricKind::Discours,
            RubricPayload::Transcription(_) => RubricKind::Transcription,
        }
    }

    pub fn as_methodologie(&self) -> Option<&MethodologiePayload> {
        match self {
            RubricPayload::Methodologie(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn as_synthese(&self) -> Option<&SynthesePayload> {
        match self {
            RubricPayload::Synthese(payload) => Some(payload),
            _ => None,
        }
    }
}

// Payloads serialize as their inner object: the rubric kind is already the
// key of the surrounding map.
impl Serialize for RubricPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RubricPayload::Synthese(payload) => payload.serialize(serializer),
            RubricPayload::Methodologie(payload) => payload.serialize(serializer),
            RubricPayload::Discours(payload) => payload.serialize(serializer),
            RubricPayload::Transcription(payload) => payload.serialize(serializer),
        }
    }
}

/// Outcome of one rubric evaluation. Built exactly once per kind per run,
/// immutable afterwards: either a payload or an error message, never
/// neither.
#[derive(Debug, Clone, Serialize)]
pub struct RubricResult {
    pub kind: RubricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<RubricPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RubricResult {
    pub fn ok(kind: RubricKind, payload: RubricPayload) -> Self {
        Self {
            kind,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(kind: RubricKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.payload.is_some()
    }
}

/// Full result of one aggregation run.
///
/// Holds the evaluation attempt for every requested kind; only kinds whose
/// call produced a payload appear in the persisted rubric map. The stored
/// value is replaced wholesale on each recomputation, never merged with a
/// prior run.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    results: BTreeMap<RubricKind, RubricResult>,
}

impl AggregationResult {
    pub fn insert(&mut self, result: RubricResult) {
        self.results.insert(result.kind, result);
    }

    pub fn get(&self, kind: RubricKind) -> Option<&RubricResult> {
        self.results.get(&kind)
    }

    /// Error list in canonical kind order, one `"{kind}: {message}"` entry
    /// per failed rubric, whatever order the evaluations completed in.
    pub fn errors(&self) -> Vec<String> {
        RubricKind::ALL
            .iter()
            .filter_map(|kind| {
                self.results
                    .get(kind)
                    .and_then(|r| r.error.as_ref())
                    .map(|e| format!("{}: {}", kind, e))
            })
            .collect()
    }

    /// Kinds whose evaluation produced a payload, in canonical order.
    pub fn successful_kinds(&self) -> Vec<RubricKind> {
        RubricKind::ALL
            .into_iter()
            .filter(|kind| self.results.get(kind).is_some_and(RubricResult::is_ok))
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        self.successful_kinds().is_empty()
    }

    pub fn methodologie(&self) -> Option<&MethodologiePayload> {
        self.results
            .get(&RubricKind::Methodologie)
            .and_then(|r| r.payload.as_ref())
            .and_then(RubricPayload::as_methodologie)
    }

    pub fn score_global(&self) -> Option<&ScoreGlobal> {
        self.results
            .get(&RubricKind::Synthese)
            .and_then(|r| r.payload.as_ref())
            .and_then(RubricPayload::as_synthese)
            .and_then(|s| s.score_global.as_ref())
    }

    /// Merge the computed score block into the synthesis payload, creating a
    /// minimal one when the synthesis evaluation failed. Also stamps the
    /// exclusion list naming the rubrics that never feed the number.
    pub fn attach_score_global(&mut self, score: ScoreGlobal) {
        let hors_calcul: Vec<String> = RubricKind::ALL
            .iter()
            .filter(|kind| **kind != RubricKind::Methodologie)
            .map(|kind| kind.as_str().to_string())
            .collect();

        let entry = self
            .results
            .entry(RubricKind::Synthese)
            .or_insert_with(|| {
                RubricResult::ok(
                    RubricKind::Synthese,
                    RubricPayload::Synthese(SynthesePayload::default()),
                )
            });
        let payload = entry
            .payload
            .get_or_insert_with(|| RubricPayload::Synthese(SynthesePayload::default()));
        if let RubricPayload::Synthese(synthese) = payload {
            synthese.score_global = Some(score);
            synthese.rubriques_hors_calcul = hors_calcul;
        }
    }
}

// Persisted shape: `rubriques` maps each successful kind to its payload, in
// canonical order; `erreurs` carries the failures.
impl Serialize for AggregationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Rubriques<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            synthese: Option<&'a RubricPayload>,
            #[serde(skip_serializing_if = "Option::is_none")]
            methodologie: Option<&'a RubricPayload>,
            #[serde(skip_serializing_if = "Option::is_none")]
            discours: Option<&'a RubricPayload>,
            #[serde(skip_serializing_if = "Option::is_none")]
            transcription: Option<&'a RubricPayload>,
        }

        let payload_for = |kind: RubricKind| {
            self.results.get(&kind).and_then(|r| r.payload.as_ref())
        };

        let rubriques = Rubriques {
            synthese: payload_for(RubricKind::Synthese),
            methodologie: payload_for(RubricKind::Methodologie),
            discours: payload_for(RubricKind::Discours),
            transcription: payload_for(RubricKind::Transcription),
        };

        let mut state = serializer.serialize_struct("AggregationResult", 2)?;
        state.serialize_field("rubriques", &rubriques)?;
        state.serialize_field("erreurs", &self.errors())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_canonical_order() {
        let names: Vec<&str> = RubricKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["synthese", "methodologie", "discours", "transcription"]
        );
    }

    #[test]
    fn test_step_code_from_explicit_tag() {
        let etape: EtapeMethodologie =
            serde_json::from_value(json!({"code": "g", "titre": "Objections", "score": 70}))
                .unwrap();
        assert_eq!(etape.resolved_code(), Some(StepCode::G));
    }

    #[test]
    fn test_step_code_from_title_prefix() {
        let etape: EtapeMethodologie =
            serde_json::from_value(json!({"titre": "2. Accroche", "score": 55})).unwrap();
        assert_eq!(etape.resolved_code(), Some(StepCode::A));
    }

    #[test]
    fn test_step_without_resolvable_code_is_ignored() {
        let payload: MethodologiePayload = serde_json::from_value(json!({
            "etapes": [
                {"titre": "Introduction", "score": 90},
                {"code": "D", "titre": "Découverte", "score": 80}
            ]
        }))
        .unwrap();
        let steps = payload.resolved_steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].code, StepCode::D);
        // the unresolvable step stays in the payload untouched
        assert_eq!(payload.etapes.len(), 2);
    }

    #[test]
    fn test_payload_extras_survive_reserialization() {
        let payload = RubricPayload::from_value(
            RubricKind::Methodologie,
            json!({"etapes": [], "duree_appel": "4m32s"}),
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["duree_appel"], "4m32s");
    }

    #[test]
    fn test_errors_in_canonical_order() {
        let mut result = AggregationResult::default();
        // inserted out of order on purpose
        result.insert(RubricResult::failed(RubricKind::Transcription, "late"));
        result.insert(RubricResult::failed(RubricKind::Synthese, "early"));
        assert_eq!(
            result.errors(),
            vec!["synthese: early".to_string(), "transcription: late".to_string()]
        );
    }

    #[test]
    fn test_attach_score_creates_minimal_synthese() {
        use crate::scoring::{compute_score_global, ResolvedStep};

        let mut result = AggregationResult::default();
        result.insert(RubricResult::failed(RubricKind::Synthese, "boom"));
        let score = compute_score_global(&[ResolvedStep {
            code: StepCode::A,
            score: 100.0,
        }]);
        result.attach_score_global(score);

        assert!(result.score_global().is_some());
        // the evaluation failure stays on record
        assert_eq!(result.errors(), vec!["synthese: boom".to_string()]);

        let value = serde_json::to_value(&result).unwrap();
        assert!(value["rubriques"]["synthese"]["score_global"].is_object());
        assert_eq!(
            value["rubriques"]["synthese"]["rubriques_hors_calcul"],
            json!(["synthese", "discours", "transcription"])
        );
    }

    #[test]
    fn test_serialized_map_omits_failed_kinds() {
        let mut result = AggregationResult::default();
        result.insert(RubricResult::ok(
            RubricKind::Discours,
            RubricPayload::from_value(RubricKind::Discours, json!({"observations": []})).unwrap(),
        ));
        result.insert(RubricResult::failed(RubricKind::Methodologie, "timeout"));

        let value = serde_json::to_value(&result).unwrap();
        assert!(value["rubriques"].get("methodologie").is_none());
        assert!(value["rubriques"].get("discours").is_some());
        assert_eq!(value["erreurs"], json!(["methodologie: timeout"]));
    }
}

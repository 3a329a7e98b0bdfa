//! Deterministic scoring for the methodology rubric.
//!
//! Calculates the composite score from concrete step results, not vibes:
//! fixed weights per step, rounding to an explicit granularity, threshold
//! classification, templated narrative. No I/O and no randomness - identical
//! inputs always produce the identical score block, down to the narrative.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Weight table version. Bump this when the weights change: every derived
/// score changes with them, so a silent edit would corrupt comparisons
/// between stored notations.
pub const WEIGHT_TABLE_VERSION: &str = "2025-03";

/// Calculation method tag carried in the persisted score block.
pub const METHODE_CALCUL: &str = "moyenne_ponderee_etapes_methodologiques";

/// Rounding granularity for the composite score.
pub const COMPOSITE_STEP: f64 = 5.0;

/// Rounding granularity for per-step point allocations (the grading-grid
/// display variant).
pub const POINT_STEP: f64 = 0.5;

/// One of the four fixed methodology steps of a prospection call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StepCode {
    D,
    A,
    G,
    O,
}

impl StepCode {
    /// Canonical step order (call chronology).
    pub const ALL: [StepCode; 4] = [StepCode::D, StepCode::A, StepCode::G, StepCode::O];

    /// Fixed weight of this step in the composite. The four weights sum to
    /// exactly 1.00.
    pub fn weight(self) -> f64 {
        match self {
            StepCode::D => 0.20,
            StepCode::A => 0.30,
            StepCode::G => 0.25,
            StepCode::O => 0.25,
        }
    }

    /// Step label as it appears in narrative feedback.
    pub fn label(self) -> &'static str {
        match self {
            StepCode::D => "découverte",
            StepCode::A => "accroche",
            StepCode::G => "gestion des objections",
            StepCode::O => "obtenir l'engagement",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepCode::D => "D",
            StepCode::A => "A",
            StepCode::G => "G",
            StepCode::O => "O",
        }
    }

    /// Resolve a code from an explicit tag ("d", "A", ...).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "D" => Some(StepCode::D),
            "A" => Some(StepCode::A),
            "G" => Some(StepCode::G),
            "O" => Some(StepCode::O),
            _ => None,
        }
    }

    /// Resolve a code from the numeric position prefix of a step title
    /// ("1. Découverte" -> D, "3) Objections" -> G).
    pub fn from_title_prefix(title: &str) -> Option<Self> {
        let digits: String = title
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        match digits.parse::<u32>().ok()? {
            1 => Some(StepCode::D),
            2 => Some(StepCode::A),
            3 => Some(StepCode::G),
            4 => Some(StepCode::O),
            _ => None,
        }
    }
}

impl fmt::Display for StepCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp a raw score into [0, 100]. NaN and non-finite values map to 0.
pub fn clamp_score(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Extract a step score from evaluator JSON. Accepts numbers and numeric
/// strings; anything else counts as 0.
pub fn score_from_value(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    clamp_score(raw)
}

/// Round to the nearest multiple of `step`.
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Convert a 0-100 step score into points on a grading grid of `bareme`
/// points, rounded to the half point.
pub fn points_sur(score: f64, bareme: f64) -> f64 {
    round_to_step(clamp_score(score) / 100.0 * bareme, POINT_STEP)
}

/// Performance band of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NiveauPerformance {
    Faible,
    Moyen,
    Bon,
    Excellent,
}

impl NiveauPerformance {
    /// Band for a composite score. Boundary values belong to the lower band:
    /// 40 is faible, 41 is moyen, 85 is bon, 86 is excellent.
    pub fn classify(score: f64) -> Self {
        if score <= 40.0 {
            NiveauPerformance::Faible
        } else if score <= 65.0 {
            NiveauPerformance::Moyen
        } else if score <= 85.0 {
            NiveauPerformance::Bon
        } else {
            NiveauPerformance::Excellent
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NiveauPerformance::Faible => "faible",
            NiveauPerformance::Moyen => "moyen",
            NiveauPerformance::Bon => "bon",
            NiveauPerformance::Excellent => "excellent",
        }
    }
}

impl fmt::Display for NiveauPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A methodology step with a resolved code and clamped score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStep {
    pub code: StepCode,
    pub score: f64,
}

/// Per-step line of the persisted calculation detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailCalcul {
    pub code: String,
    pub score_etape: f64,
    pub poids: f64,
    pub contribution: f64,
}

/// Weight snapshot embedded in the persisted score block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ponderations {
    #[serde(rename = "D")]
    pub d: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "G")]
    pub g: f64,
    #[serde(rename = "O")]
    pub o: f64,
}

impl Default for Ponderations {
    fn default() -> Self {
        Self {
            d: StepCode::D.weight(),
            a: StepCode::A.weight(),
            g: StepCode::G.weight(),
            o: StepCode::O.weight(),
        }
    }
}

/// Fixed thresholds block of the persisted score block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seuils {
    pub faible: String,
    pub moyen: String,
    pub bon: String,
    pub excellent: String,
}

impl Default for Seuils {
    fn default() -> Self {
        Self {
            faible: "0-40".to_string(),
            moyen: "41-65".to_string(),
            bon: "66-85".to_string(),
            excellent: "86-100".to_string(),
        }
    }
}

/// The `score_global` block persisted with every notation.
///
/// WIRE COMPATIBILITY: field names and layout are a stable contract parsed
/// as-is by downstream consumers. Extend, never rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreGlobal {
    pub valeur: f64,
    pub methode_calcul: String,
    pub ponderations: Ponderations,
    pub detail_calcul: Vec<DetailCalcul>,
    pub niveau_performance: NiveauPerformance,
    pub seuils: Seuils,
    pub commentaire: String,
}

/// Compute the composite score block from resolved methodology steps.
///
/// A code missing from `steps` contributes 0 but keeps its weight in the
/// model: the denominator never shrinks based on what the evaluator chose to
/// return. When the same code appears twice, the first occurrence wins.
pub fn compute_score_global(steps: &[ResolvedStep]) -> ScoreGlobal {
    let mut by_code: BTreeMap<StepCode, f64> = BTreeMap::new();
    for step in steps {
        by_code.entry(step.code).or_insert(step.score);
    }

    let mut detail = Vec::with_capacity(StepCode::ALL.len());
    let mut total = 0.0;
    for code in StepCode::ALL {
        let raw = clamp_score(by_code.get(&code).copied().unwrap_or(0.0));
        let contribution = raw * code.weight();
        total += contribution;
        detail.push(DetailCalcul {
            code: code.as_str().to_string(),
            score_etape: raw,
            poids: code.weight(),
            contribution,
        });
    }

    let valeur = clamp_score(round_to_step(total, COMPOSITE_STEP));
    let niveau = NiveauPerformance::classify(valeur);
    let commentaire = narrative(niveau, &detail);

    ScoreGlobal {
        valeur,
        methode_calcul: METHODE_CALCUL.to_string(),
        ponderations: Ponderations::default(),
        detail_calcul: detail,
        niveau_performance: niveau,
        seuils: Seuils::default(),
        commentaire,
    }
}

/// Deterministic narrative for a computed score. Pure template: identical
/// step results yield identical text.
fn narrative(niveau: NiveauPerformance, detail: &[DetailCalcul]) -> String {
    let mut out = match niveau {
        NiveauPerformance::Faible => {
            "Niveau faible : la méthodologie n'est pas encore acquise sur cet appel."
        }
        NiveauPerformance::Moyen => {
            "Niveau moyen : la trame de l'appel est suivie en partie mais manque de constance."
        }
        NiveauPerformance::Bon => {
            "Bon niveau : la méthodologie est appliquée avec régularité."
        }
        NiveauPerformance::Excellent => {
            "Excellent niveau : la méthodologie est maîtrisée de bout en bout."
        }
    }
    .to_string();

    let zeros: Vec<StepCode> = StepCode::ALL
        .into_iter()
        .filter(|code| {
            detail
                .iter()
                .any(|d| d.code == code.as_str() && d.score_etape == 0.0)
        })
        .collect();

    if zeros.is_empty() {
        return out;
    }

    // The hook and the commitment are the steps a coach cares most about:
    // when one of them collapses to zero, the narrative names every voided
    // step and the share of the weighting lost with them.
    if zeros.contains(&StepCode::A) || zeros.contains(&StepCode::O) {
        let void: f64 = zeros.iter().map(|c| c.weight()).sum();
        let pct = (void * 100.0).round() as u32;
        let labels: Vec<&str> = zeros.iter().map(|c| c.label()).collect();
        if labels.len() == 1 {
            out.push_str(&format!(
                " L'étape {} n'a rapporté aucun point : {}% de la pondération totale est restée inexploitée.",
                labels[0], pct
            ));
        } else {
            out.push_str(&format!(
                " Les étapes {} n'ont rapporté aucun point : {}% de la pondération totale est restée inexploitée.",
                join_labels(&labels),
                pct
            ));
        }
    } else {
        let labels: Vec<&str> = zeros.iter().map(|c| c.label()).collect();
        out.push_str(&format!(
            " Aucun point n'a été obtenu sur : {}.",
            join_labels(&labels)
        ));
    }

    out
}

/// "a", "a et b", "a, b et c"
fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [single] => (*single).to_string(),
        [head @ .., last] => format!("{} et {}", head.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f64 = StepCode::ALL.iter().map(|c| c.weight()).sum();
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clamp_score_bounds() {
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(250.0), 100.0);
        assert_eq!(clamp_score(55.5), 55.5);
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_score_from_value_variants() {
        assert_eq!(score_from_value(&json!(85)), 85.0);
        assert_eq!(score_from_value(&json!("72.5")), 72.5);
        assert_eq!(score_from_value(&json!(" 40 ")), 40.0);
        assert_eq!(score_from_value(&json!(null)), 0.0);
        assert_eq!(score_from_value(&json!("n/a")), 0.0);
        assert_eq!(score_from_value(&json!([10])), 0.0);
        assert_eq!(score_from_value(&json!(140)), 100.0);
    }

    #[test]
    fn test_round_to_step_granularities() {
        assert_eq!(round_to_step(31.0, 5.0), 30.0);
        assert_eq!(round_to_step(32.5, 5.0), 35.0);
        assert_eq!(round_to_step(3.3, 0.5), 3.5);
        assert_eq!(round_to_step(3.2, 0.5), 3.0);
        // zero step is a no-op, not a division by zero
        assert_eq!(round_to_step(31.0, 0.0), 31.0);
    }

    #[test]
    fn test_points_sur_half_point_grid() {
        assert_eq!(points_sur(80.0, 5.0), 4.0);
        assert_eq!(points_sur(47.0, 5.0), 2.5);
        assert_eq!(points_sur(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(NiveauPerformance::classify(0.0), NiveauPerformance::Faible);
        assert_eq!(NiveauPerformance::classify(40.0), NiveauPerformance::Faible);
        assert_eq!(NiveauPerformance::classify(41.0), NiveauPerformance::Moyen);
        assert_eq!(NiveauPerformance::classify(65.0), NiveauPerformance::Moyen);
        assert_eq!(NiveauPerformance::classify(66.0), NiveauPerformance::Bon);
        assert_eq!(NiveauPerformance::classify(85.0), NiveauPerformance::Bon);
        assert_eq!(
            NiveauPerformance::classify(86.0),
            NiveauPerformance::Excellent
        );
        assert_eq!(
            NiveauPerformance::classify(100.0),
            NiveauPerformance::Excellent
        );
    }

    fn steps(d: f64, a: f64, g: f64, o: f64) -> Vec<ResolvedStep> {
        vec![
            ResolvedStep { code: StepCode::D, score: d },
            ResolvedStep { code: StepCode::A, score: a },
            ResolvedStep { code: StepCode::G, score: g },
            ResolvedStep { code: StepCode::O, score: o },
        ]
    }

    #[test]
    fn test_all_zero_steps() {
        let score = compute_score_global(&steps(0.0, 0.0, 0.0, 0.0));
        assert_eq!(score.valeur, 0.0);
        assert_eq!(score.niveau_performance, NiveauPerformance::Faible);
    }

    #[test]
    fn test_all_hundred_steps() {
        let score = compute_score_global(&steps(100.0, 100.0, 100.0, 100.0));
        assert_eq!(score.valeur, 100.0);
        assert_eq!(score.niveau_performance, NiveauPerformance::Excellent);
    }

    #[test]
    fn test_worked_example() {
        // D=80, A=0, G=60, O=0 -> 16 + 0 + 15 + 0 = 31 -> rounded to 30
        let score = compute_score_global(&steps(80.0, 0.0, 60.0, 0.0));
        assert_eq!(score.valeur, 30.0);
        assert_eq!(score.niveau_performance, NiveauPerformance::Faible);
        assert_eq!(score.detail_calcul[0].contribution, 16.0);
        assert_eq!(score.detail_calcul[2].contribution, 15.0);
        assert!(score.commentaire.contains("accroche"));
        assert!(score.commentaire.contains("obtenir"));
        assert!(score.commentaire.contains("55%"));
    }

    #[test]
    fn test_missing_code_keeps_denominator() {
        // Only D returned: the other three weigh in at zero, they are not
        // dropped from the model.
        let only_d = vec![ResolvedStep { code: StepCode::D, score: 100.0 }];
        let score = compute_score_global(&only_d);
        assert_eq!(score.valeur, 20.0);
        assert_eq!(score.detail_calcul.len(), 4);
    }

    #[test]
    fn test_duplicate_code_first_wins() {
        let dup = vec![
            ResolvedStep { code: StepCode::D, score: 100.0 },
            ResolvedStep { code: StepCode::D, score: 0.0 },
        ];
        let score = compute_score_global(&dup);
        assert_eq!(score.detail_calcul[0].score_etape, 100.0);
    }

    #[test]
    fn test_determinism() {
        let a = compute_score_global(&steps(70.0, 55.0, 80.0, 90.0));
        let b = compute_score_global(&steps(70.0, 55.0, 80.0, 90.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_narrative_zero_without_hook_or_commitment() {
        let score = compute_score_global(&steps(0.0, 50.0, 60.0, 70.0));
        assert!(score.commentaire.contains("découverte"));
        assert!(!score.commentaire.contains('%'));
    }

    #[test]
    fn test_wire_shape() {
        let score = compute_score_global(&steps(80.0, 0.0, 60.0, 0.0));
        let value = serde_json::to_value(&score).unwrap();
        assert_eq!(value["valeur"], 30.0);
        assert_eq!(
            value["methode_calcul"],
            "moyenne_ponderee_etapes_methodologiques"
        );
        assert_eq!(value["ponderations"]["D"], 0.2);
        assert_eq!(value["ponderations"]["A"], 0.3);
        assert_eq!(value["detail_calcul"][1]["code"], "A");
        assert_eq!(value["detail_calcul"][1]["poids"], 0.3);
        assert_eq!(value["niveau_performance"], "faible");
        assert_eq!(value["seuils"]["faible"], "0-40");
        assert_eq!(value["seuils"]["excellent"], "86-100");
    }
}

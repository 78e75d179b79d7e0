use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{HotspotId, LifeList, SpeciesCode};

/// A historical "as-of" snapshot used to score a recommender
///
/// `life_list_before` only holds species seen strictly before `as_of_date`;
/// `newly_observed_species` only holds species first seen on or after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub observer_id: String,
    pub as_of_date: NaiveDate,
    pub hotspot: HotspotId,
    pub life_list_before: LifeList,
    pub newly_observed_species: Vec<SpeciesCode>,
}

/// Outcome of replaying a single evaluation case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMetrics {
    pub observer_id: String,
    pub hotspot: HotspotId,
    pub as_of_date: NaiveDate,
    /// Top-K recommended species, in rank order
    pub recommended: Vec<SpeciesCode>,
    pub hit: bool,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    /// 1-based rank of the first correct species; `None` when none of the top-K were seen
    pub first_hit_rank: Option<usize>,
    pub predicted_score: f64,
    pub abs_score_error: f64,
}

/// Aggregate metrics over a set of evaluation cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub recommender: String,
    pub top_k: usize,
    pub cases: usize,
    pub hit_rate: f64,
    pub mean_precision_at_k: f64,
    pub mean_recall_at_k: f64,
    pub mean_reciprocal_rank: f64,
    pub mean_abs_score_error: f64,
    pub per_case: Vec<CaseMetrics>,
}

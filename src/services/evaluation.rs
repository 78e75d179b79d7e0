use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{CaseMetrics, EvaluationCase, EvaluationReport, Recommendation, SpeciesCode},
    services::recommender::HotspotRecommender,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationConfig {
    /// Number of recommended species judged per case
    pub top_k: usize,
    /// Cases replayed at the same time
    pub max_concurrency: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_concurrency: 8,
        }
    }
}

/// Replays every case through `recommender` and scores it against what was actually seen
///
/// Cases run concurrently; the report lists them in input order. A single failing
/// case fails the whole evaluation.
#[instrument(skip_all, fields(recommender = recommender.name(), cases = cases.len()))]
pub async fn evaluate(
    recommender: Arc<dyn HotspotRecommender>,
    cases: &[EvaluationCase],
    config: EvaluationConfig,
) -> AppResult<EvaluationReport> {
    if config.top_k == 0 {
        return Err(AppError::invalid_config("top_k", "must be positive"));
    }
    if config.max_concurrency == 0 {
        return Err(AppError::invalid_config("max_concurrency", "must be positive"));
    }

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let mut tasks = JoinSet::new();

    for (index, case) in cases.iter().cloned().enumerate() {
        let recommender = Arc::clone(&recommender);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            let recommendations = recommender
                .recommend(
                    std::slice::from_ref(&case.hotspot),
                    case.as_of_date,
                    &case.life_list_before,
                )
                .await?;
            Ok::<_, AppError>((index, score_case(&recommendations, &case, config.top_k)))
        });
    }

    let mut results: Vec<Option<CaseMetrics>> = vec![None; cases.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, metrics))) => results[index] = Some(metrics),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Evaluation case failed");
                return Err(e);
            }
            Err(e) => return Err(AppError::Internal(e.to_string())),
        }
    }

    let per_case = results
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| AppError::Internal("evaluation case produced no result".to_string()))?;

    let report = summarize(recommender.name(), config.top_k, per_case);

    tracing::info!(
        hit_rate = report.hit_rate,
        mean_precision_at_k = report.mean_precision_at_k,
        mean_reciprocal_rank = report.mean_reciprocal_rank,
        "Evaluation complete"
    );

    Ok(report)
}

/// Scores one case
///
/// The recommended species are the species of each recommendation in rank order,
/// first occurrence kept, cut to `top_k`.
pub fn score_case(
    recommendations: &[Recommendation],
    case: &EvaluationCase,
    top_k: usize,
) -> CaseMetrics {
    let mut seen: HashSet<&SpeciesCode> = HashSet::new();
    let recommended: Vec<SpeciesCode> = recommendations
        .iter()
        .flat_map(|r| r.species_codes())
        .filter(|code| seen.insert(*code))
        .take(top_k)
        .cloned()
        .collect();

    let actual: HashSet<&SpeciesCode> = case.newly_observed_species.iter().collect();
    let hits = recommended.iter().filter(|code| actual.contains(code)).count();
    let first_hit_rank = recommended
        .iter()
        .position(|code| actual.contains(code))
        .map(|position| position + 1);

    let recall_at_k = if actual.is_empty() {
        0.0
    } else {
        hits as f64 / actual.len() as f64
    };

    let predicted_score = recommendations
        .iter()
        .find(|r| r.hotspot == case.hotspot)
        .map_or(0.0, |r| r.score);

    CaseMetrics {
        observer_id: case.observer_id.clone(),
        hotspot: case.hotspot.clone(),
        as_of_date: case.as_of_date,
        recommended,
        hit: hits > 0,
        precision_at_k: hits as f64 / top_k as f64,
        recall_at_k,
        first_hit_rank,
        predicted_score,
        abs_score_error: (predicted_score - actual.len() as f64).abs(),
    }
}

/// Averages per-case metrics; no cases gives an all-zero report
pub fn summarize(recommender: &str, top_k: usize, per_case: Vec<CaseMetrics>) -> EvaluationReport {
    let cases = per_case.len();
    let mean = |value: fn(&CaseMetrics) -> f64| {
        if cases == 0 {
            0.0
        } else {
            per_case.iter().map(value).fold(0.0, |total, v| total + v) / cases as f64
        }
    };

    EvaluationReport {
        recommender: recommender.to_string(),
        top_k,
        cases,
        hit_rate: mean(|m| if m.hit { 1.0 } else { 0.0 }),
        mean_precision_at_k: mean(|m| m.precision_at_k),
        mean_recall_at_k: mean(|m| m.recall_at_k),
        mean_reciprocal_rank: mean(|m| m.first_hit_rank.map_or(0.0, |rank| 1.0 / rank as f64)),
        mean_abs_score_error: mean(|m| m.abs_score_error),
        per_case,
    }
}

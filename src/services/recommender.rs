use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{Checklist, HotspotId, LifeList, Recommendation},
    services::{
        providers::SightingStore,
        scorer::{self, Aggregation},
        windowing::{WindowConfig, WindowingStrategy},
    },
};

/// Order of hotspots whose scores are equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HotspotTieBreak {
    /// Hotspot id ascending
    #[default]
    HotspotId,
    /// Hotspot with more window checklists first, then hotspot id
    MoreChecklists,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderConfig {
    pub historical_years: i32,
    pub day_window: i32,
    pub max_results: usize,
    /// Keep hotspots that offer no new species (score 0)
    pub include_empty_hotspots: bool,
    pub aggregation: Aggregation,
    pub tie_break: HotspotTieBreak,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            historical_years: 5,
            day_window: 7,
            max_results: 10,
            include_empty_hotspots: false,
            aggregation: Aggregation::All,
            tie_break: HotspotTieBreak::HotspotId,
        }
    }
}

impl RecommenderConfig {
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            historical_years: self.historical_years,
            day_window: self.day_window,
        }
    }
}

/// A strategy for ranking hotspots by the lifers they are likely to produce
///
/// Implementations are shared across tasks behind `Arc<dyn HotspotRecommender>`.
#[async_trait::async_trait]
pub trait HotspotRecommender: Send + Sync {
    /// Strategy name used in logs and evaluation reports
    fn name(&self) -> &str;

    /// Ranks `hotspots` for a visit on `target_date` by a birder with `life_list`
    ///
    /// Best hotspot first. Species already on the life list never appear.
    async fn recommend(
        &self,
        hotspots: &[HotspotId],
        target_date: NaiveDate,
        life_list: &LifeList,
    ) -> AppResult<Vec<Recommendation>>;
}

/// Recommends for a visit on `target_date` using the life list as it stood that morning
///
/// Species first observed on or after `target_date` were still lifers then and
/// stay eligible. Undated life-list entries always count as seen.
pub async fn recommend_as_of(
    recommender: &dyn HotspotRecommender,
    hotspots: &[HotspotId],
    target_date: NaiveDate,
    life_list: &LifeList,
) -> AppResult<Vec<Recommendation>> {
    let seen = life_list.before(target_date);
    if seen.len() < life_list.len() {
        tracing::debug!(
            ignored = life_list.len() - seen.len(),
            target_date = %target_date,
            "Ignoring life-list species first observed on or after the visit"
        );
    }
    recommender.recommend(hotspots, target_date, &seen).await
}

/// Recommends hotspots from what was reported there around the same time in prior years
pub struct HistoricalSightingRecommender {
    strategy: WindowingStrategy,
    config: RecommenderConfig,
    store: Arc<dyn SightingStore>,
}

impl HistoricalSightingRecommender {
    pub fn new(
        strategy: WindowingStrategy,
        store: Arc<dyn SightingStore>,
        config: RecommenderConfig,
    ) -> Self {
        Self {
            strategy,
            config,
            store,
        }
    }

    pub fn day_window(store: Arc<dyn SightingStore>, config: RecommenderConfig) -> Self {
        Self::new(WindowingStrategy::DayWindow, store, config)
    }

    pub fn calendar_month(store: Arc<dyn SightingStore>, config: RecommenderConfig) -> Self {
        Self::new(WindowingStrategy::CalendarMonth, store, config)
    }

    fn rank(&self, a: &Recommendation, b: &Recommendation) -> Ordering {
        b.score.total_cmp(&a.score).then_with(|| match self.config.tie_break {
            HotspotTieBreak::HotspotId => a.hotspot.cmp(&b.hotspot),
            HotspotTieBreak::MoreChecklists => b
                .checklist_count
                .cmp(&a.checklist_count)
                .then_with(|| a.hotspot.cmp(&b.hotspot)),
        })
    }
}

#[async_trait::async_trait]
impl HotspotRecommender for HistoricalSightingRecommender {
    fn name(&self) -> &str {
        self.strategy.name()
    }

    #[instrument(
        skip_all,
        fields(strategy = self.strategy.name(), hotspots = hotspots.len(), target_date = %target_date)
    )]
    async fn recommend(
        &self,
        hotspots: &[HotspotId],
        target_date: NaiveDate,
        life_list: &LifeList,
    ) -> AppResult<Vec<Recommendation>> {
        if hotspots.is_empty() {
            return Err(AppError::invalid_config(
                "hotspots",
                "at least one hotspot is required",
            ));
        }
        if self.config.max_results == 0 {
            return Err(AppError::invalid_config("max_results", "must be positive"));
        }
        if self.config.aggregation == Aggregation::TopK(0) {
            return Err(AppError::invalid_config("aggregate_top_k", "must be positive"));
        }

        let window = self
            .strategy
            .window(target_date, &self.config.window_config())?;
        let requested: BTreeSet<HotspotId> = hotspots.iter().cloned().collect();

        let checklists = self
            .store
            .fetch_checklists(&requested, window.dates())
            .await
            .map_err(|e| {
                AppError::DataUnavailable(format!("{} store failed: {}", self.store.name(), e))
            })?;

        let mut by_hotspot: BTreeMap<&HotspotId, Vec<&Checklist>> =
            requested.iter().map(|hotspot| (hotspot, Vec::new())).collect();
        for checklist in &checklists {
            if !window.contains(&checklist.date) {
                continue;
            }
            let Some(bucket) = by_hotspot.get_mut(&checklist.hotspot) else {
                continue;
            };
            if checklist.species.is_empty() {
                return Err(AppError::DataUnavailable(format!(
                    "checklist {} at {} on {} reports no species",
                    checklist.id, checklist.hotspot, checklist.date
                )));
            }
            bucket.push(checklist);
        }

        let mut recommendations: Vec<Recommendation> = by_hotspot
            .into_iter()
            .map(|(hotspot, hotspot_checklists)| {
                let scored = scorer::score(hotspot_checklists, life_list, self.config.aggregation);
                Recommendation {
                    hotspot: hotspot.clone(),
                    score: scored.score,
                    checklist_count: scored.checklist_count,
                    species: scored.species,
                }
            })
            .filter(|r| self.config.include_empty_hotspots || !r.species.is_empty())
            .collect();

        recommendations.sort_by(|a, b| self.rank(a, b));
        recommendations.truncate(self.config.max_results);

        tracing::info!(
            window_days = window.len(),
            checklists = checklists.len(),
            recommendations = recommendations.len(),
            "Recommendations ranked"
        );

        Ok(recommendations)
    }
}

use std::sync::Arc;

use crate::services::{
    providers::SightingStore, EvaluationConfig, HistoricalSightingRecommender, HotspotRecommender,
    RecommenderConfig, WindowingStrategy,
};

/// Shared application state
///
/// Both strategies read from the same sighting store.
#[derive(Clone)]
pub struct AppState {
    pub day_window: Arc<dyn HotspotRecommender>,
    pub calendar_month: Arc<dyn HotspotRecommender>,
    pub evaluation: EvaluationConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SightingStore>,
        recommender: RecommenderConfig,
        evaluation: EvaluationConfig,
    ) -> Self {
        Self {
            day_window: Arc::new(HistoricalSightingRecommender::day_window(
                Arc::clone(&store),
                recommender.clone(),
            )),
            calendar_month: Arc::new(HistoricalSightingRecommender::calendar_month(
                store,
                recommender,
            )),
            evaluation,
        }
    }

    pub fn recommender(&self, strategy: WindowingStrategy) -> Arc<dyn HotspotRecommender> {
        match strategy {
            WindowingStrategy::DayWindow => Arc::clone(&self.day_window),
            WindowingStrategy::CalendarMonth => Arc::clone(&self.calendar_month),
        }
    }
}

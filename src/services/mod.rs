pub mod datasets;
pub mod eval_data;
pub mod evaluation;
pub mod providers;
pub mod recommender;
pub mod scorer;
pub mod windowing;

pub use evaluation::{evaluate, EvaluationConfig};
pub use recommender::{
    recommend_as_of, HistoricalSightingRecommender, HotspotRecommender, RecommenderConfig,
};
pub use windowing::WindowingStrategy;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{EvaluationCase, EvaluationReport, HotspotId, LifeList, Recommendation},
    services::{evaluation, recommend_as_of, EvaluationConfig, WindowingStrategy},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub hotspots: Vec<HotspotId>,
    pub date: NaiveDate,
    #[serde(default)]
    pub life_list: LifeList,
    #[serde(default = "default_strategy")]
    pub strategy: WindowingStrategy,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub strategy: String,
    pub date: NaiveDate,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    pub cases: Vec<EvaluationCase>,
    #[serde(default = "default_strategy")]
    pub strategy: WindowingStrategy,
    pub top_k: Option<usize>,
}

fn default_strategy() -> WindowingStrategy {
    WindowingStrategy::DayWindow
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ranks the requested hotspots for a birder's life list
pub async fn recommend(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> AppResult<Json<RecommendationResponse>> {
    let request = json_body(payload)?;
    let recommender = state.recommender(request.strategy);

    tracing::info!(
        request_id = %request_id,
        strategy = recommender.name(),
        hotspots = request.hotspots.len(),
        life_list = request.life_list.len(),
        "Recommendation requested"
    );

    let recommendations = recommend_as_of(
        recommender.as_ref(),
        &request.hotspots,
        request.date,
        &request.life_list,
    )
    .await?;

    Ok(Json(RecommendationResponse {
        strategy: recommender.name().to_string(),
        date: request.date,
        recommendations,
    }))
}

/// Scores a strategy against submitted evaluation cases
pub async fn evaluate(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<EvaluationRequest>, JsonRejection>,
) -> AppResult<Json<EvaluationReport>> {
    let request = json_body(payload)?;

    tracing::info!(request_id = %request_id, cases = request.cases.len(), "Evaluation requested");

    let config = EvaluationConfig {
        top_k: request.top_k.unwrap_or(state.evaluation.top_k),
        ..state.evaluation
    };

    let report =
        evaluation::evaluate(state.recommender(request.strategy), &request.cases, config).await?;

    Ok(Json(report))
}

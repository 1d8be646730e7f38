//! Route handlers behind the admission middleware stack (spec.md section
//! 4.7/6): one handler per in-scope privileged route, plus the placeholder
//! `GET /api/info` that proves the stack runs for an unauthenticated route.

use crate::api::error::{ApiError, ApiResult};
use crate::api::validation;
use crate::app::AppState;
use crate::pipelines::{PipelineSummary, backfill, discovery, update};
use crate::vector::VectorMatch;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

pub async fn info() -> Json<serde_json::Value> {
    Json(json!({ "service": "archivist", "status": "ok" }))
}

/// `POST /trigger/{pipeline}` (spec.md section 6): runs the named pipeline
/// on demand and returns its [`PipelineSummary`], the same shape the
/// scheduler logs after every scheduled tick.
pub async fn trigger(State(state): State<AppState>, Path(pipeline): Path<String>) -> ApiResult<Json<PipelineSummary>> {
    let summary = match pipeline.as_str() {
        "discovery" => discovery::run(state.upstream.as_ref(), &state.store, &state.config).await,
        "updates" => update::run(state.upstream.as_ref(), &state.store, &state.config).await,
        "backfill" => backfill::run(state.upstream.as_ref(), &state.ai, &state.vector_store, &state.store, &state.config).await,
        "ai-backfill" => backfill::run_ai_only(&state.ai, &state.vector_store, &state.store, &state.config).await,
        other => return Err(ApiError::UnknownPipeline(other.to_owned())),
    };
    Ok(Json(summary))
}

/// `GET /api/similar/{id}` (spec.md section 6): looks up the item's stored
/// embedding, then queries the vector store for its nearest neighbors,
/// excluding the item itself.
pub async fn similar(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Vec<VectorMatch>>> {
    let id = validation::validate_item_id(id)?;
    const NEIGHBOR_COUNT: usize = 10;

    let stored = state.vector_store.get_by_ids(&[id]).await.map_err(|_| ApiError::VectorStoreUnavailable)?;
    let Some(query_vector) = stored.into_iter().find_map(|record| record.values) else {
        return Err(ApiError::NotFound);
    };

    let neighbors =
        state.vector_store.query(&query_vector, NEIGHBOR_COUNT, true).await.map_err(|_| ApiError::VectorStoreUnavailable)?;
    let id_str = id.to_string();
    Ok(Json(neighbors.into_iter().filter(|neighbor| neighbor.id != id_str).collect()))
}

/// `POST /api/compute-topic-similarity` (spec.md section 6): the actual
/// aggregation is out-of-scope analytics SQL (spec.md section 1); this
/// handler only records that a recompute was requested, proving the
/// middleware stack runs in front of a privileged mutation.
pub async fn compute_topic_similarity(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.store.upsert_analytics_cache("topic_similarity", json!({ "status": "queued" }))?;
    Ok(Json(json!({ "status": "accepted" })))
}

//! # API Handlers
//!
//! JSON endpoints for operators and scripts. They expose the same engine
//! the Slack flows use, without going through chat.

use crate::error::HubError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sf_core::{
    fingerprint, pqm_link, CriteriaTypeSpec, EmptyValuePolicy, Engine, NodePredicate,
    PlacementFilterQuery, PlacementId, ReportRequest, SkippedNode,
};
use std::sync::Arc;

#[derive(Serialize)]
pub struct Status {
    version: &'static str,
    uptime_seconds: u64,
    criteria_types: usize,
    empty_values: EmptyValuePolicy,
    warehouse: String,
    operational_warehouse: Option<String>,
    signature_verification: bool,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        criteria_types: state.resolver.catalog().len(),
        empty_values: state.resolver.policy(),
        warehouse: state.config.warehouse.url.clone(),
        operational_warehouse: state.config.snowflake.base_url(),
        signature_verification: state.signature.is_some(),
    })
}

pub async fn catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CriteriaTypeSpec>> {
    Json(state.resolver.catalog().iter().cloned().collect())
}

#[derive(Debug, Serialize)]
pub struct PlacementFilterResponse {
    pub placement_id: PlacementId,
    /// `None` when the tree produced no predicates.
    pub where_clause: Option<String>,
    pub predicates: Vec<NodePredicate>,
    pub skipped: Vec<SkippedNode>,
}

pub async fn placement_filter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlacementFilterResponse>, (StatusCode, String)> {
    let placement_id: PlacementId = id
        .parse()
        .map_err(|e: sf_core::ParamError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let resolution = state.resolve(placement_id).await.map_err(|e| {
        tracing::warn!("Filter for placement {} failed: {}", placement_id, e);
        <(StatusCode, String)>::from(e)
    })?;

    Ok(Json(PlacementFilterResponse {
        placement_id,
        where_clause: PlacementFilterQuery::from_resolution(placement_id, &resolution)
            .map(|q| q.where_clause),
        predicates: resolution
            .filter()
            .map(|f| f.predicates.clone())
            .unwrap_or_default(),
        skipped: resolution.skipped().to_vec(),
    }))
}

#[derive(Debug, Serialize)]
pub struct RenderedReport {
    pub title: &'static str,
    pub engine: Engine,
    pub sql: String,
    pub fingerprint: String,
    pub pqm_link: Option<String>,
}

pub async fn render_report(
    Json(request): Json<ReportRequest>,
) -> Result<Json<RenderedReport>, (StatusCode, String)> {
    let sql = request.render().map_err(HubError::from)?;
    Ok(Json(RenderedReport {
        title: request.title(),
        engine: request.engine(),
        fingerprint: fingerprint(&sql),
        pqm_link: request.placement().map(pqm_link),
        sql,
    }))
}

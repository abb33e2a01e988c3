//! Violation review surface.
//!
//! Purely administrative: nothing here feeds back into the attendance
//! pipeline.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use muster_core::{
  store::AttendanceStore,
  violation::{
    ReviewStatus, ReviewUpdate, ViolationPage, ViolationQuery, ViolationRecord, ViolationStats,
    ViolationType,
  },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::Operator, error::ApiError};

/// Upper bound on one page.
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status:             Option<String>,
  pub violation_type:     Option<String>,
  pub student_identifier: Option<String>,
  pub session_id:         Option<String>,
  pub limit:              Option<usize>,
  pub offset:             Option<usize>,
}

impl TryFrom<ListParams> for ViolationQuery {
  type Error = ApiError;

  fn try_from(p: ListParams) -> Result<Self, Self::Error> {
    let blank_to_none = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    Ok(ViolationQuery {
      status:             blank_to_none(p.status).as_deref().map(ReviewStatus::parse).transpose()?,
      violation_type:     blank_to_none(p.violation_type)
        .as_deref()
        .map(ViolationType::parse)
        .transpose()?,
      student_identifier: blank_to_none(p.student_identifier),
      session_id:         blank_to_none(p.session_id),
      limit:              p.limit.map(|l| l.min(MAX_LIMIT)),
      offset:             p.offset,
    })
  }
}

/// `GET /violations`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Query(params): Query<ListParams>,
) -> Result<Json<ViolationPage>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let page = state
    .store
    .list_violations(ViolationQuery::try_from(params)?)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(page))
}

/// `GET /violations/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(id): Path<Uuid>,
) -> Result<Json<ViolationRecord>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let violation = state
    .store
    .get_violation(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("violation {id} not found")))?;
  Ok(Json(violation))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
  pub status:       ReviewStatus,
  pub review_notes: Option<String>,
}

/// `PATCH /violations/{id}`; the reviewer is the authenticated operator.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Operator(operator): Operator,
  Path(id): Path<Uuid>,
  Json(body): Json<ReviewBody>,
) -> Result<Json<ViolationRecord>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let update = ReviewUpdate {
    status:         body.status,
    review_notes:   body.review_notes,
    reviewed_by:    operator,
    reviewed_at_ms: state.now_ms(),
  };
  let violation = state
    .store
    .review_violation(id, update)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("violation {id} not found")))?;
  tracing::info!(violation = %id, status = %violation.status, "violation reviewed");
  Ok(Json(violation))
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub violation_ids: Vec<Uuid>,
  pub status:        ReviewStatus,
  pub review_notes:  Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
  pub updated: usize,
}

/// `POST /violations/bulk`
pub async fn bulk<S>(
  State(state): State<AppState<S>>,
  Operator(operator): Operator,
  Json(body): Json<BulkBody>,
) -> Result<Json<BulkResponse>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  if body.violation_ids.is_empty() {
    return Err(ApiError::BadRequest("violation_ids must not be empty".into()));
  }
  let update = ReviewUpdate {
    status:         body.status,
    review_notes:   body.review_notes,
    reviewed_by:    operator,
    reviewed_at_ms: state.now_ms(),
  };
  update.check_bulk()?;

  let updated = state
    .store
    .bulk_review(body.violation_ids, update)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(BulkResponse { updated }))
}

/// `GET /violations/stats`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
) -> Result<Json<ViolationStats>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let stats = state.store.violation_stats().await.map_err(ApiError::store)?;
  Ok(Json(stats))
}

//! `GET /sessions/{id}/attendance`

use axum::{
  Json,
  extract::{Path, State},
};
use muster_core::{attendance::AttendanceRecord, store::AttendanceStore};

use crate::{AppState, auth::Operator, error::ApiError};

pub async fn list<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let records = state
    .store
    .list_attendance(session_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(records))
}

//! Live roster and the per-session event stream.

use std::convert::Infallible;

use axum::{
  Json,
  extract::{Path, State},
  response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use muster_core::{presence::Roster, store::AttendanceStore};

use crate::{AppState, auth::Operator, error::ApiError};

/// `GET /sessions/{id}/presence`
pub async fn roster<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Result<Json<Roster>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let roster = state
    .tracker()
    .list_active(&session_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(roster))
}

/// `GET /sessions/{id}/events`: server-sent events for dashboards.
pub async fn events<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
  S: AttendanceStore + Clone + 'static,
{
  Sse::new(state.hub.session_stream(session_id)).keep_alive(KeepAlive::default())
}

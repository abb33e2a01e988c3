//! Token display and feed control.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/sessions/{id}/token` | Current token, or a stateless fresh one |
//! | `POST`   | `/sessions/{id}/feed`  | Start rotating tokens; idempotent |
//! | `DELETE` | `/sessions/{id}/feed`  | Stop rotating; 404 if not running |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use muster_core::store::AttendanceStore;

use crate::{AppState, auth::Operator, error::ApiError, feed::TokenIssue};

pub async fn current<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Json<TokenIssue>
where
  S: AttendanceStore + Clone + 'static,
{
  Json(state.feed.current(&session_id))
}

pub async fn start<S>(
  State(state): State<AppState<S>>,
  Operator(operator): Operator,
  Path(session_id): Path<String>,
) -> Json<TokenIssue>
where
  S: AttendanceStore + Clone + 'static,
{
  tracing::info!(session = %session_id, %operator, "feed start requested");
  Json(state.feed.start(&session_id))
}

pub async fn stop<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  if state.feed.stop(&session_id) {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("no token feed running for {session_id}")))
  }
}

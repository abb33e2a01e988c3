//! `POST /attendance/submit`: the scanned-token submission endpoint.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use muster_core::{
  attendance::{RejectReason, Submission},
  event::LiveEvent,
  store::AttendanceStore,
};
use serde::{Deserialize, Serialize};

use super::{location_from, require_non_blank, round_m};
use crate::{AppState, error::ApiError, fingerprint::DeviceHints};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
  pub session_id:         Option<String>,
  /// Whatever the scanned code carried; a number or a numeric string.
  pub timestamp:          Option<serde_json::Value>,
  pub student_identifier: String,
  pub latitude:           Option<f64>,
  pub longitude:          Option<f64>,
  pub accuracy_meters:    Option<f64>,
  pub device_fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
  pub accepted:          bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distance_meters:   Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location_verified: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason:            Option<RejectReason>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expired:           Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hint:              Option<&'static str>,
}

fn timestamp_text(raw: Option<serde_json::Value>) -> Option<String> {
  match raw? {
    serde_json::Value::Null => None,
    serde_json::Value::String(s) => Some(s),
    other => Some(other.to_string()),
  }
}

/// 201 when accepted, 200 for an idempotent `ALREADY_MARKED`, 422 for every
/// other rejection.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  hints: DeviceHints,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let submission = Submission {
    session_id:         body.session_id.filter(|s| !s.trim().is_empty()),
    timestamp:          timestamp_text(body.timestamp),
    student_identifier: require_non_blank("studentIdentifier", &body.student_identifier)?,
    device_fingerprint: hints.resolve(body.device_fingerprint),
    location:           location_from(body.latitude, body.longitude, body.accuracy_meters)?,
  };

  let report = state.pipeline.submit(submission).await.map_err(ApiError::store)?;

  if let Some(record) = &report.presence {
    state.hub.publish(LiveEvent::PresenceUpdated { record: record.clone() });
  }
  // Findings go to operators only; the response below never names them.
  for violation in &report.violations {
    state.hub.publish(LiveEvent::ViolationFlagged { violation: violation.clone() });
  }

  let verdict = report.finalization;
  if verdict.accepted
    && let Some(record) = verdict.record
  {
    let response = SubmitResponse {
      accepted:          true,
      distance_meters:   record.distance_meters.map(round_m),
      location_verified: Some(record.location_verified),
      reason:            None,
      expired:           None,
      hint:              None,
    };
    state.hub.publish(LiveEvent::AttendanceMarked { record });
    return Ok((StatusCode::CREATED, Json(response)));
  }

  let reason = verdict.reason.unwrap_or(RejectReason::MalformedToken);
  let status = match reason {
    RejectReason::AlreadyMarked => StatusCode::OK,
    _ => StatusCode::UNPROCESSABLE_ENTITY,
  };
  Ok((
    status,
    Json(SubmitResponse {
      accepted:          false,
      distance_meters:   None,
      location_verified: None,
      reason:            Some(reason),
      expired:           Some(reason == RejectReason::ExpiredToken),
      hint:              Some(reason.hint()),
    }),
  ))
}

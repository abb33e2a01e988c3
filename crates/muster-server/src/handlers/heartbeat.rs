//! `POST /presence/heartbeat`: location updates from devices mid-scan.

use axum::{Json, extract::State, http::StatusCode};
use muster_core::{
  event::LiveEvent, geo::Location, store::AttendanceStore, tracker::Heartbeat,
};
use serde::Deserialize;

use super::require_non_blank;
use crate::{AppState, error::ApiError, fingerprint::DeviceHints};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
  pub session_id:         String,
  pub device_fingerprint: Option<String>,
  pub student_identifier: Option<String>,
  pub latitude:           f64,
  pub longitude:          f64,
  pub accuracy_meters:    f64,
  /// Device time of the fix, epoch ms. Orders out-of-order deliveries.
  pub timestamp:          Option<i64>,
}

/// Fire-and-forget: 202 with no body.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  hints: DeviceHints,
  Json(body): Json<HeartbeatBody>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let heartbeat = Heartbeat {
    session_id:         require_non_blank("sessionId", &body.session_id)?,
    device_fingerprint: hints.resolve(body.device_fingerprint),
    student_identifier: body
      .student_identifier
      .map(|s| s.trim().to_owned())
      .filter(|s| !s.is_empty()),
    location:           Location::new(body.latitude, body.longitude, body.accuracy_meters)?,
    timestamp_ms:       body.timestamp,
  };

  let record = state
    .tracker()
    .record_heartbeat(heartbeat)
    .await
    .map_err(ApiError::store)?;
  state.hub.publish(LiveEvent::PresenceUpdated { record });

  Ok(StatusCode::ACCEPTED)
}

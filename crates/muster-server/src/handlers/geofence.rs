//! Zone management and the geofence operator tools.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sessions/{id}/zones` | `?include_inactive=true` to list disabled zones |
//! | `POST` | `/sessions/{id}/zones` | Body: [`ZoneBody`]; returns 201 + zone |
//! | `GET`  | `/sessions/{id}/zones/stats` | Coverage of active zones |
//! | `POST` | `/zones/{id}/active` | Body: `{"active": bool}` |
//! | `POST` | `/geofence/validate` | Best match for a raw point |
//! | `GET`  | `/geofence/nearby` | `?latitude&longitude[&max_distance]` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use muster_core::{
  geo::{GeoPoint, Location},
  geofence::{self, FenceEvaluation, GeofenceZone, NearbyZone, NewZone, ZoneStats},
  store::AttendanceStore,
};
use serde::Deserialize;
use uuid::Uuid;

use super::require_non_blank;
use crate::{AppState, auth::Operator, error::ApiError};

const DEFAULT_NEARBY_M: f64 = 1_000.0;

// ─── Zones ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_inactive: bool,
}

pub async fn list<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<GeofenceZone>>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let zones = state
    .store
    .list_zones(session_id, params.include_inactive)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(zones))
}

#[derive(Debug, Deserialize)]
pub struct ZoneBody {
  pub location_name: String,
  pub college_name:  Option<String>,
  pub latitude:      f64,
  pub longitude:     f64,
  pub radius_meters: f64,
  pub batch_scope:   Option<String>,
}

pub async fn create<S>(
  State(state): State<AppState<S>>,
  Operator(operator): Operator,
  Path(session_id): Path<String>,
  Json(body): Json<ZoneBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let zone = NewZone {
    session_id,
    location_name: require_non_blank("location_name", &body.location_name)?,
    college_name:  body.college_name,
    latitude:      body.latitude,
    longitude:     body.longitude,
    radius_meters: body.radius_meters,
    batch_scope:   body.batch_scope,
  };
  zone.validate()?;

  let zone = state.store.add_zone(zone).await.map_err(ApiError::store)?;
  tracing::info!(
    session = %zone.session_id,
    zone = %zone.zone_id,
    radius = zone.radius_meters,
    %operator,
    "geofence zone created"
  );
  Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn stats<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(session_id): Path<String>,
) -> Result<Json<ZoneStats>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let zones = state
    .store
    .list_zones(session_id.clone(), false)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(geofence::zone_stats(&session_id, &zones)))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

pub async fn set_active<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Path(zone_id): Path<Uuid>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<GeofenceZone>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let zone = state
    .store
    .set_zone_active(zone_id, body.active)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("zone {zone_id} not found")))?;
  Ok(Json(zone))
}

// ─── Operator tools ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
  pub latitude:           f64,
  pub longitude:          f64,
  /// Restrict to one session's zones; all active zones otherwise.
  pub session_id:         Option<String>,
  /// Apply batch scoping as it would be for this student.
  pub student_identifier: Option<String>,
}

pub async fn validate<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Json(body): Json<ValidateBody>,
) -> Result<Json<FenceEvaluation>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let point = GeoPoint::new(body.latitude, body.longitude)?;
  let evaluation = match body.session_id {
    Some(session_id) => {
      let location = Location { point, accuracy_meters: 0.0 };
      state
        .tracker()
        .evaluate(&session_id, body.student_identifier.as_deref(), &location)
        .await
        .map_err(ApiError::store)?
    }
    None => {
      let zones = state.store.all_active_zones().await.map_err(ApiError::store)?;
      geofence::evaluate(&point, &zones)
    }
  };
  Ok(Json(evaluation))
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
  pub latitude:     f64,
  pub longitude:    f64,
  pub max_distance: Option<f64>,
}

pub async fn nearby<S>(
  State(state): State<AppState<S>>,
  _op: Operator,
  Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<NearbyZone>>, ApiError>
where
  S: AttendanceStore + Clone + 'static,
{
  let point = GeoPoint::new(params.latitude, params.longitude)?;
  let max = params.max_distance.unwrap_or(DEFAULT_NEARBY_M);
  if !max.is_finite() || max < 0.0 {
    return Err(ApiError::BadRequest(format!("invalid max_distance {max}")));
  }
  let zones = state.store.all_active_zones().await.map_err(ApiError::store)?;
  Ok(Json(geofence::nearby(&point, &zones, max)))
}

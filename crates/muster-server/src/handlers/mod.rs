//! Route handlers, one module per resource.

pub mod attendance;
pub mod geofence;
pub mod heartbeat;
pub mod presence;
pub mod submit;
pub mod token;
pub mod violations;

use muster_core::geo::Location;

use crate::error::ApiError;

/// Build a location from optional body fields.
///
/// Any missing component means the device had no usable fix (`Ok(None)`);
/// present but invalid values are malformed input.
pub(crate) fn location_from(
  latitude: Option<f64>,
  longitude: Option<f64>,
  accuracy_meters: Option<f64>,
) -> Result<Option<Location>, ApiError> {
  match (latitude, longitude, accuracy_meters) {
    (Some(lat), Some(lon), Some(acc)) => Ok(Some(Location::new(lat, lon, acc)?)),
    _ => Ok(None),
  }
}

/// Distances are reported to the nearest meter.
pub(crate) fn round_m(meters: f64) -> f64 { meters.round() }

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<String, ApiError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ApiError::BadRequest(format!("{field} must not be empty")));
  }
  Ok(trimmed.to_owned())
}

//! Geofence zones and containment evaluation.
//!
//! A zone is a circle (center + radius). A point is inside a zone iff its
//! haversine distance to the center is at most the radius. When several zones
//! contain the point the nearest one wins. An empty zone list is a definitive
//! "outside": the absence of a fence never passes a submission.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  geo::{GeoPoint, Location},
};

// ─── Zones ───────────────────────────────────────────────────────────────────

/// A circular zone configured by a session organizer. Read-only to the
/// attendance pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceZone {
  pub zone_id:       Uuid,
  pub session_id:    String,
  pub location_name: String,
  pub college_name:  Option<String>,
  pub latitude:      f64,
  pub longitude:     f64,
  pub radius_meters: f64,
  pub is_active:     bool,
  /// When set, the zone applies only to students of this batch.
  pub batch_scope:   Option<String>,
  pub created_at_ms: i64,
}

impl GeofenceZone {
  pub fn center(&self) -> GeoPoint {
    GeoPoint { latitude: self.latitude, longitude: self.longitude }
  }

  /// Whether the zone applies to a student whose batch is `batch`.
  pub fn applies_to(&self, batch: Option<&str>) -> bool {
    match self.batch_scope.as_deref() {
      None => true,
      Some(scope) => batch == Some(scope),
    }
  }

  pub fn coverage_area_m2(&self) -> f64 { PI * self.radius_meters.powi(2) }
}

/// Input for creating a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewZone {
  pub session_id:    String,
  pub location_name: String,
  pub college_name:  Option<String>,
  pub latitude:      f64,
  pub longitude:     f64,
  pub radius_meters: f64,
  pub batch_scope:   Option<String>,
}

impl NewZone {
  /// Reject zones that could never be evaluated meaningfully.
  pub fn validate(&self) -> Result<()> {
    if self.session_id.trim().is_empty() {
      return Err(Error::MissingField("session_id"));
    }
    GeoPoint::new(self.latitude, self.longitude)?;
    if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
      return Err(Error::InvalidRadius(self.radius_meters));
    }
    Ok(())
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Distance from a point to one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDistance {
  pub zone_id:         Uuid,
  pub location_name:   String,
  pub college_name:    Option<String>,
  pub distance_meters: f64,
  pub fence_radius:    f64,
  pub is_within_fence: bool,
  /// `max(0, 1 - distance / radius)`.
  pub accuracy_score:  f64,
}

impl ZoneDistance {
  fn measure(point: &GeoPoint, zone: &GeofenceZone) -> Self {
    let distance = point.distance_to(&zone.center());
    // A zero-radius zone never matches and scores zero.
    let (is_within, score) = if zone.radius_meters > 0.0 {
      (
        distance <= zone.radius_meters,
        (1.0 - distance / zone.radius_meters).max(0.0),
      )
    } else {
      (false, 0.0)
    };
    Self {
      zone_id:         zone.zone_id,
      location_name:   zone.location_name.clone(),
      college_name:    zone.college_name.clone(),
      distance_meters: distance,
      fence_radius:    zone.radius_meters,
      is_within_fence: is_within,
      accuracy_score:  score,
    }
  }

  /// How far outside the fence edge the point lies; zero when inside.
  pub fn excess_meters(&self) -> f64 {
    (self.distance_meters - self.fence_radius).max(0.0)
  }
}

/// The best match of a point against a set of zones.
///
/// `zone` is the nearest containing zone when `is_within_fence`, otherwise the
/// zone whose edge is closest (for reporting how far off the point was), or
/// `None` when no zones were configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceEvaluation {
  pub is_within_fence: bool,
  pub zone:            Option<ZoneDistance>,
  pub zones_checked:   usize,
}

impl FenceEvaluation {
  pub fn distance_meters(&self) -> Option<f64> {
    self.zone.as_ref().map(|z| z.distance_meters)
  }

  pub fn fence_radius(&self) -> Option<f64> {
    self.zone.as_ref().map(|z| z.fence_radius)
  }

  pub fn accuracy_score(&self) -> f64 {
    self.zone.as_ref().map_or(0.0, |z| z.accuracy_score)
  }

  /// Distance beyond the nearest fence edge; `None` when no zone exists.
  pub fn excess_meters(&self) -> Option<f64> {
    self.zone.as_ref().map(ZoneDistance::excess_meters)
  }
}

/// Evaluate `point` against `zones`. Inactive zones are ignored.
pub fn evaluate(point: &GeoPoint, zones: &[GeofenceZone]) -> FenceEvaluation {
  let measured: Vec<ZoneDistance> = zones
    .iter()
    .filter(|z| z.is_active)
    .map(|z| ZoneDistance::measure(point, z))
    .collect();

  let zones_checked = measured.len();

  let inside = measured
    .iter()
    .filter(|m| m.is_within_fence)
    .min_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters))
    .cloned();

  if let Some(zone) = inside {
    return FenceEvaluation { is_within_fence: true, zone: Some(zone), zones_checked };
  }

  let nearest_edge = measured
    .into_iter()
    .min_by(|a, b| a.excess_meters().total_cmp(&b.excess_meters()));

  FenceEvaluation { is_within_fence: false, zone: nearest_edge, zones_checked }
}

/// Evaluate a device location against the zones that apply to `batch`.
pub fn evaluate_for(
  location: &Location,
  zones: &[GeofenceZone],
  batch: Option<&str>,
) -> FenceEvaluation {
  let scoped: Vec<GeofenceZone> = zones
    .iter()
    .filter(|z| z.applies_to(batch))
    .cloned()
    .collect();
  evaluate(&location.point, &scoped)
}

// ─── Operator views ──────────────────────────────────────────────────────────

/// Coverage summary for one zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneCoverage {
  pub zone_id:                      Uuid,
  pub location_name:                String,
  pub college_name:                 Option<String>,
  pub radius_meters:                f64,
  pub coverage_area_meters_squared: f64,
  pub batch_scope:                  Option<String>,
}

/// Coverage summary for every active zone of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStats {
  pub session_id:                         String,
  pub total_fences:                       usize,
  pub total_coverage_area_meters_squared: f64,
  pub fences:                             Vec<ZoneCoverage>,
}

pub fn zone_stats(session_id: &str, zones: &[GeofenceZone]) -> ZoneStats {
  let fences: Vec<ZoneCoverage> = zones
    .iter()
    .filter(|z| z.is_active)
    .map(|z| ZoneCoverage {
      zone_id:                      z.zone_id,
      location_name:                z.location_name.clone(),
      college_name:                 z.college_name.clone(),
      radius_meters:                z.radius_meters,
      coverage_area_meters_squared: z.coverage_area_m2(),
      batch_scope:                  z.batch_scope.clone(),
    })
    .collect();

  ZoneStats {
    session_id:                         session_id.to_owned(),
    total_fences:                       fences.len(),
    total_coverage_area_meters_squared: fences
      .iter()
      .map(|f| f.coverage_area_meters_squared)
      .sum(),
    fences,
  }
}

/// A zone near a probe point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyZone {
  pub zone:            GeofenceZone,
  pub distance_meters: f64,
  pub is_within_fence: bool,
}

/// Active zones whose center lies within `max_distance_m` of `point`,
/// nearest first.
pub fn nearby(point: &GeoPoint, zones: &[GeofenceZone], max_distance_m: f64) -> Vec<NearbyZone> {
  let mut found: Vec<NearbyZone> = zones
    .iter()
    .filter(|z| z.is_active)
    .map(|z| {
      let distance = point.distance_to(&z.center());
      NearbyZone {
        zone:            z.clone(),
        distance_meters: distance,
        is_within_fence: z.radius_meters > 0.0 && distance <= z.radius_meters,
      }
    })
    .filter(|n| n.distance_meters <= max_distance_m)
    .collect();
  found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
  found
}

//! Great-circle geometry.
//!
//! Coordinates are WGS84 degrees; every distance is in meters.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub latitude:  f64,
  pub longitude: f64,
}

impl GeoPoint {
  /// Build a point, rejecting non-finite or out-of-range coordinates.
  pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
      return Err(Error::InvalidLatitude(latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
      return Err(Error::InvalidLongitude(longitude));
    }
    Ok(Self { latitude, longitude })
  }

  /// Haversine distance to `other` in meters.
  pub fn distance_to(&self, other: &GeoPoint) -> f64 {
    haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
  }

  /// Whether two points carry the same coordinates to seven decimal places
  /// (about one centimeter), the resolution a phone actually reports.
  pub fn same_fix(&self, other: &GeoPoint) -> bool {
    let q = |v: f64| (v * 1e7).round() as i64;
    q(self.latitude) == q(other.latitude) && q(self.longitude) == q(other.longitude)
  }
}

/// A device-reported position: a point plus the reported accuracy radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
  pub point:           GeoPoint,
  pub accuracy_meters: f64,
}

impl Location {
  pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Result<Self> {
    let point = GeoPoint::new(latitude, longitude)?;
    if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
      return Err(Error::InvalidAccuracy(accuracy_meters));
    }
    Ok(Self { point, accuracy_meters })
  }
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
  let p1 = lat1.to_radians();
  let p2 = lat2.to_radians();
  let d_lat = (lat2 - lat1).to_radians();
  let d_lon = (lon2 - lon1).to_radians();

  let a = (d_lat / 2.0).sin().powi(2)
    + p1.cos() * p2.cos() * (d_lon / 2.0).sin().powi(2);
  let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

  EARTH_RADIUS_M * c
}

/// The point `meters` due north of `origin`. Used to build fixtures at an
/// exact distance.
pub fn offset_north(origin: GeoPoint, meters: f64) -> GeoPoint {
  GeoPoint {
    latitude:  origin.latitude + (meters / EARTH_RADIUS_M).to_degrees(),
    longitude: origin.longitude,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_distance_to_self() {
    let p = GeoPoint::new(18.5204, 73.8567).unwrap();
    assert_eq!(p.distance_to(&p), 0.0);
  }

  #[test]
  fn short_hop_in_pune_is_about_fifteen_meters() {
    let a = GeoPoint::new(18.5204, 73.8567).unwrap();
    let b = GeoPoint::new(18.5205, 73.8568).unwrap();
    let d = a.distance_to(&b);
    assert!((13.0..17.0).contains(&d), "distance was {d}");
  }

  #[test]
  fn distance_is_symmetric() {
    let a = GeoPoint::new(18.5204, 73.8567).unwrap();
    let b = GeoPoint::new(18.5300, 73.8700).unwrap();
    assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
  }

  #[test]
  fn offset_north_lands_at_requested_distance() {
    let origin = GeoPoint::new(18.5204, 73.8567).unwrap();
    let moved = offset_north(origin, 250.0);
    assert!((origin.distance_to(&moved) - 250.0).abs() < 1e-6);
  }

  #[test]
  fn rejects_bad_coordinates() {
    assert!(matches!(GeoPoint::new(f64::NAN, 0.0), Err(Error::InvalidLatitude(_))));
    assert!(matches!(GeoPoint::new(91.0, 0.0), Err(Error::InvalidLatitude(_))));
    assert!(matches!(GeoPoint::new(0.0, 180.5), Err(Error::InvalidLongitude(_))));
    assert!(matches!(
      Location::new(0.0, 0.0, -1.0),
      Err(Error::InvalidAccuracy(_))
    ));
  }

  #[test]
  fn same_fix_ignores_sub_centimeter_noise() {
    let a = GeoPoint::new(18.520_400_01, 73.856_7).unwrap();
    let b = GeoPoint::new(18.520_400_02, 73.856_7).unwrap();
    let c = GeoPoint::new(18.520_41, 73.856_7).unwrap();
    assert!(a.same_fix(&b));
    assert!(!a.same_fix(&c));
  }
}

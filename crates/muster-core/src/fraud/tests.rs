use uuid::Uuid;

use super::*;
use crate::{
  geo::{GeoPoint, offset_north},
  geofence::{GeofenceZone, evaluate},
  presence::PresenceStatus,
};

const NOW: i64 = 1_700_000_000_000;

fn center() -> GeoPoint { GeoPoint { latitude: 18.5204, longitude: 73.8567 } }

fn hall() -> GeofenceZone {
  GeofenceZone {
    zone_id:       Uuid::new_v4(),
    session_id:    "s1".into(),
    location_name: "Main Hall".into(),
    college_name:  None,
    latitude:      center().latitude,
    longitude:     center().longitude,
    radius_meters: 50.0,
    is_active:     true,
    batch_scope:   None,
    created_at_ms: 0,
  }
}

fn at(point: GeoPoint, accuracy: f64) -> Location { Location { point, accuracy_meters: accuracy } }

fn attendance(student: &str, device: &str) -> AttendanceRecord {
  AttendanceRecord {
    record_id:          Uuid::new_v4(),
    session_id:         "s1".into(),
    student_identifier: student.into(),
    device_fingerprint: device.into(),
    marked_at_ms:       NOW - 30_000,
    location_verified:  true,
    distance_meters:    Some(4.0),
    risk_score:         0,
  }
}

fn presence(device: &str, student: Option<&str>, point: GeoPoint, seen: i64) -> PresenceRecord {
  PresenceRecord {
    session_id:           "s1".into(),
    device_fingerprint:   device.into(),
    student_identifier:   student.map(str::to_owned),
    status:               PresenceStatus::Active,
    last_location:        point,
    last_accuracy_meters: 5.0,
    last_seen_at_ms:      seen,
    last_received_at_ms:  seen,
    first_seen_at_ms:     seen,
    submitted_at_ms:      None,
    is_inside_geofence:   true,
    distance_meters:      Some(1.0),
    peak_speed_kmh:       None,
  }
}

struct Case {
  location: Location,
  history:  History,
  student:  &'static str,
  device:   &'static str,
  zones:    Vec<GeofenceZone>,
  policy:   FraudPolicy,
}

impl Case {
  fn new() -> Self {
    Self {
      location: at(center(), 8.0),
      history:  History::default(),
      student:  "PRN001",
      device:   "dev-a",
      zones:    vec![hall()],
      policy:   FraudPolicy::default(),
    }
  }

  fn run(&self, registry: &RuleRegistry) -> Assessment {
    let fence = evaluate(&self.location.point, &self.zones);
    let presence_policy = PresencePolicy::default();
    let ctx = RuleContext {
      session_id:         "s1",
      student_identifier: self.student,
      device_fingerprint: self.device,
      location:           &self.location,
      now_ms:             NOW,
      fence:              &fence,
      history:            &self.history,
      policy:             &self.policy,
      presence_policy:    &presence_policy,
    };
    registry.assess(&ctx)
  }

  fn assess(&self) -> Assessment { self.run(&RuleRegistry::standard()) }
}

// ─── Individual rules ────────────────────────────────────────────────────────

#[test]
fn clean_submission_scores_zero() {
  let a = Case::new().assess();
  assert!(a.is_clean(), "{:?}", a.findings);
  assert_eq!(a.risk_score, 0);
}

#[test]
fn accuracy_threshold_is_exclusive() {
  let mut case = Case::new();
  case.location.accuracy_meters = 21.0;
  assert!(case.assess().has(ViolationType::LowGpsAccuracy));

  case.location.accuracy_meters = 20.0;
  assert!(!case.assess().has(ViolationType::LowGpsAccuracy));

  case.location.accuracy_meters = 19.0;
  assert!(!case.assess().has(ViolationType::LowGpsAccuracy));
}

#[test]
fn farther_misses_score_higher() {
  let mut near = Case::new();
  near.location = at(offset_north(center(), 80.0), 8.0);
  let mut far = Case::new();
  far.location = at(offset_north(center(), 600.0), 8.0);

  let near = near.assess();
  let far = far.assess();
  assert!(near.has(ViolationType::OutsideGeofence));
  assert!(far.has(ViolationType::OutsideGeofence));
  assert!(far.risk_score > near.risk_score);

  let excess = near.findings[0].distance_from_geofence.unwrap();
  assert!((excess - 30.0).abs() < 0.01);
}

#[test]
fn missing_zones_count_as_outside() {
  let mut case = Case::new();
  case.zones.clear();
  let a = case.assess();
  assert!(a.has(ViolationType::OutsideGeofence));
  assert_eq!(a.risk_score, 50);
}

#[test]
fn device_reused_for_another_student() {
  let mut case = Case::new();
  case.student = "PRN002";
  case.history.session_attendance.push(attendance("PRN001", "dev-a"));
  assert!(case.assess().has(ViolationType::DuplicateDevice));
}

#[test]
fn same_student_from_another_device_is_flagged() {
  let mut case = Case::new();
  case.device = "dev-b";
  case.history.session_attendance.push(attendance("PRN001", "dev-a"));
  let a = case.assess();
  assert!(a.has(ViolationType::DuplicatePrn));
  assert!(!a.has(ViolationType::DuplicateDevice));
}

#[test]
fn same_device_retry_is_not_a_duplicate() {
  let mut case = Case::new();
  case.history.session_attendance.push(attendance("PRN001", "dev-a"));
  assert!(case.assess().is_clean());
}

#[test]
fn multiple_identifiers_on_one_live_device() {
  let mut case = Case::new();
  case.student = "PRN002";
  case
    .history
    .session_presence
    .push(presence("dev-a", Some("PRN001"), center(), NOW - 5_000));
  let a = case.assess();
  assert!(a.has(ViolationType::MultiplePrnsSameDevice));
  assert!(a.findings[0].details.contains("PRN001"));
}

#[test]
fn expired_presence_does_not_count_as_sweeping() {
  let mut case = Case::new();
  case.student = "PRN002";
  case
    .history
    .session_presence
    .push(presence("dev-a", Some("PRN001"), center(), NOW - 600_000));
  assert!(!case.assess().has(ViolationType::MultiplePrnsSameDevice));
}

#[test]
fn two_hundred_kmh_is_impossible_but_a_walk_is_not() {
  let start = center();
  let end = offset_north(start, 278.0);

  let mut fast = Case::new();
  fast.location = at(end, 5.0);
  fast.zones = vec![];
  fast.history.device_last_seen = Some(presence("dev-a", None, start, NOW - 5_000));
  let finding = fast
    .run(&RuleRegistry::empty().with(ImpossibleTravel))
    .findings
    .pop()
    .expect("impossible travel");
  assert!(finding.details.contains("km/h"));

  let mut slow = Case::new();
  slow.location = at(end, 5.0);
  slow.history.device_last_seen = Some(presence("dev-a", None, start, NOW - 300_000));
  assert!(!slow.assess().has(ViolationType::ImpossibleTravel));
}

#[test]
fn fast_hop_between_heartbeats_is_impossible_travel() {
  let mut case = Case::new();
  // The device already sits at the submitted fix; the jump happened earlier.
  let mut current = presence("dev-a", Some("PRN001"), center(), NOW - 1_000);
  current.peak_speed_kmh = Some(201.6);
  case.history.device_last_seen = Some(current.clone());
  case.history.session_presence = vec![current.clone()];
  assert!(case.assess().has(ViolationType::ImpossibleTravel));

  current.peak_speed_kmh = Some(40.0);
  case.history.device_last_seen = Some(current.clone());
  case.history.session_presence = vec![current];
  assert!(!case.assess().has(ViolationType::ImpossibleTravel));
}

#[test]
fn jitter_within_accuracy_is_not_travel() {
  let mut case = Case::new();
  case.location = at(offset_north(center(), 12.0), 8.0);
  case.history.device_last_seen = Some(presence("dev-a", None, center(), NOW - 1_000));
  assert!(!case.assess().has(ViolationType::ImpossibleTravel));
}

#[test]
fn identical_fix_on_another_device_is_suspicious() {
  let mut case = Case::new();
  let mut twin = presence("dev-z", Some("PRN999"), center(), NOW - 3_600_000);
  twin.session_id = "other-session".into();
  case.history.coordinate_twins.push(twin);
  let a = case.assess();
  assert!(a.has(ViolationType::GpsSpoofingSuspected));
  assert_eq!(a.risk_score, 60);
}

#[test]
fn perfect_precision_is_suspicious() {
  let mut case = Case::new();
  case.location.accuracy_meters = 0.0;
  assert!(case.assess().has(ViolationType::GpsSpoofingSuspected));
}

#[test]
fn frozen_fix_over_time_is_suspicious() {
  let mut case = Case::new();
  let mut prev = presence("dev-a", None, center(), NOW - 30_000);
  prev.last_accuracy_meters = 8.0;
  case.history.device_last_seen = Some(prev);
  let a = case.assess();
  assert!(a.has(ViolationType::GpsSpoofingSuspected));
  assert!(a.findings[0].details.contains("zero jitter"));
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

#[test]
fn scores_add_up_and_cap_at_one_hundred() {
  let mut case = Case::new();
  case.student = "PRN002";
  case.location = at(offset_north(center(), 2_000.0), 30.0);
  case.history.session_attendance.push(attendance("PRN001", "dev-a"));
  let a = case.assess();
  assert!(a.findings.len() >= 3);
  assert_eq!(a.risk_score, 100);
}

#[test]
fn weights_scale_contributions() {
  let mut case = Case::new();
  case.zones.clear();
  case.policy.weights.insert(ViolationType::OutsideGeofence, 0.5);
  assert_eq!(case.assess().risk_score, 25);
}

#[test]
fn rules_can_be_removed_from_the_registry() {
  let mut case = Case::new();
  case.zones.clear();
  let registry = RuleRegistry::standard().without(ViolationType::OutsideGeofence);
  assert!(!registry.kinds().contains(&ViolationType::OutsideGeofence));
  assert!(case.run(&registry).is_clean());
}

#[test]
fn standard_registry_covers_every_violation_type() {
  use strum::IntoEnumIterator;

  let kinds = RuleRegistry::standard().kinds();
  for kind in ViolationType::iter() {
    assert!(kinds.contains(&kind), "no rule produces {kind}");
  }
}

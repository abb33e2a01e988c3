//! Live presence: one record per (session, device), superseded in place by
//! every heartbeat and never duplicated.
//!
//! `Expired` is never stored. An `Active` record that has been silent longer
//! than [`PresencePolicy::expire_after_ms`] is reported as expired on read and
//! kept for audit.
//!
//! Two clocks are involved. The device's own timestamp orders heartbeats
//! (last write wins); the server's receipt time measures silence.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
  geo::{GeoPoint, Location},
  geofence::FenceEvaluation,
  policy::PresencePolicy,
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
  Active,
  Submitted,
  Expired,
}

/// The stored state of one device's scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
  pub session_id:           String,
  pub device_fingerprint:   String,
  pub student_identifier:   Option<String>,
  pub status:               PresenceStatus,
  pub last_location:        GeoPoint,
  pub last_accuracy_meters: f64,
  /// Device-side timestamp of the newest heartbeat applied.
  pub last_seen_at_ms:      i64,
  /// Server time at which the device was last heard from, late or not.
  pub last_received_at_ms:  i64,
  pub first_seen_at_ms:     i64,
  pub submitted_at_ms:      Option<i64>,
  pub is_inside_geofence:   bool,
  /// Distance to the best-matching zone center; `None` without zones.
  pub distance_meters:      Option<f64>,
  /// Fastest movement between consecutive fixes of this record, in km/h.
  pub peak_speed_kmh:       Option<f64>,
}

impl PresenceRecord {
  pub fn last_fix(&self) -> Location {
    Location { point: self.last_location, accuracy_meters: self.last_accuracy_meters }
  }

  pub fn silent_for_ms(&self, now_ms: i64) -> i64 { (now_ms - self.last_received_at_ms).max(0) }

  /// Speed implied by moving from the last fix to `to`, reported at the
  /// device time `at_ms`. `None` when `at_ms` is not later than the last fix
  /// or the move stays inside the two error circles.
  pub fn implied_speed_kmh(&self, to: &Location, at_ms: i64) -> Option<f64> {
    if at_ms <= self.last_seen_at_ms {
      return None;
    }
    let distance = self.last_location.distance_to(&to.point);
    if distance <= self.last_accuracy_meters + to.accuracy_meters {
      return None;
    }
    let elapsed_s = (at_ms - self.last_seen_at_ms).max(1_000) as f64 / 1_000.0;
    Some(distance / elapsed_s * 3.6)
  }

  /// The status as it should be presented at `now_ms`.
  pub fn effective_status(&self, policy: &PresencePolicy, now_ms: i64) -> PresenceStatus {
    match self.status {
      PresenceStatus::Active if self.silent_for_ms(now_ms) > policy.expire_after_ms => {
        PresenceStatus::Expired
      }
      other => other,
    }
  }

  /// Whether the record belongs in the instructor's live view: active, or
  /// submitted within the grace window.
  pub fn is_live(&self, policy: &PresencePolicy, now_ms: i64) -> bool {
    match self.effective_status(policy, now_ms) {
      PresenceStatus::Active => true,
      PresenceStatus::Submitted => self
        .submitted_at_ms
        .is_some_and(|at| now_ms - at <= policy.grace_ms),
      PresenceStatus::Expired => false,
    }
  }
}

/// A heartbeat after geofence evaluation, ready to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
  pub session_id:         String,
  pub device_fingerprint: String,
  /// Only set when the device has told us who is scanning; an update with
  /// `None` keeps whatever identifier the record already carries.
  pub student_identifier: Option<String>,
  pub location:           Location,
  /// Device-side timestamp; orders writes.
  pub seen_at_ms:         i64,
  /// Server receipt time; measures silence.
  pub received_at_ms:     i64,
  pub is_inside_geofence: bool,
  pub distance_meters:    Option<f64>,
  /// Speed implied by the move from the previous fix, if any.
  pub implied_speed_kmh:  Option<f64>,
}

impl PresenceUpdate {
  pub fn new(
    session_id: String,
    device_fingerprint: String,
    student_identifier: Option<String>,
    location: Location,
    seen_at_ms: i64,
    fence: &FenceEvaluation,
  ) -> Self {
    Self {
      session_id,
      device_fingerprint,
      student_identifier,
      location,
      seen_at_ms,
      received_at_ms: seen_at_ms,
      is_inside_geofence: fence.is_within_fence,
      distance_meters: fence.distance_meters(),
      implied_speed_kmh: None,
    }
  }

  pub fn received_at(mut self, received_at_ms: i64) -> Self {
    self.received_at_ms = received_at_ms;
    self
  }
}

/// One roster row as shown to an instructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceView {
  #[serde(flatten)]
  pub record:         PresenceRecord,
  pub display_status: PresenceStatus,
  pub is_stale:       bool,
  pub silent_for_ms:  i64,
}

/// The live roster of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
  pub session_id:      String,
  pub as_of_ms:        i64,
  pub active_count:    usize,
  pub submitted_count: usize,
  pub outside_count:   usize,
  pub entries:         Vec<PresenceView>,
}

impl Roster {
  /// Build the live view from every stored record of a session.
  pub fn build(
    session_id: &str,
    records: Vec<PresenceRecord>,
    policy: &PresencePolicy,
    now_ms: i64,
  ) -> Self {
    let mut entries: Vec<PresenceView> = records
      .into_iter()
      .filter(|r| r.is_live(policy, now_ms))
      .map(|record| {
        let silent = record.silent_for_ms(now_ms);
        PresenceView {
          display_status: record.effective_status(policy, now_ms),
          is_stale: record.status == PresenceStatus::Active && silent > policy.stale_after_ms,
          silent_for_ms: silent,
          record,
        }
      })
      .collect();
    entries.sort_by(|a, b| b.record.last_received_at_ms.cmp(&a.record.last_received_at_ms));

    let count = |s: PresenceStatus| entries.iter().filter(|e| e.display_status == s).count();
    Self {
      session_id:      session_id.to_owned(),
      as_of_ms:        now_ms,
      active_count:    count(PresenceStatus::Active),
      submitted_count: count(PresenceStatus::Submitted),
      outside_count:   entries.iter().filter(|e| !e.record.is_inside_geofence).count(),
      entries,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const NOW: i64 = 1_700_000_000_000;

  fn record(status: PresenceStatus, last_seen: i64, submitted: Option<i64>) -> PresenceRecord {
    PresenceRecord {
      session_id:           "s1".into(),
      device_fingerprint:   format!("dev-{last_seen}"),
      student_identifier:   Some("PRN001".into()),
      status,
      last_location:        GeoPoint { latitude: 18.5204, longitude: 73.8567 },
      last_accuracy_meters: 8.0,
      last_seen_at_ms:      last_seen,
      last_received_at_ms:  last_seen,
      first_seen_at_ms:     last_seen,
      submitted_at_ms:      submitted,
      is_inside_geofence:   true,
      distance_meters:      Some(3.0),
      peak_speed_kmh:       None,
    }
  }

  #[test]
  fn submitted_records_stay_for_the_grace_window() {
    let p = PresencePolicy::default();
    let fresh = record(PresenceStatus::Submitted, NOW - 60_000, Some(NOW - 60_000));
    let old = record(PresenceStatus::Submitted, NOW - 301_000, Some(NOW - 301_000));
    assert!(fresh.is_live(&p, NOW));
    assert!(!old.is_live(&p, NOW));
  }

  #[test]
  fn silence_marks_stale_then_expired() {
    let p = PresencePolicy::default();
    let roster = Roster::build(
      "s1",
      vec![
        record(PresenceStatus::Active, NOW - 5_000, None),
        record(PresenceStatus::Active, NOW - 30_000, None),
        record(PresenceStatus::Active, NOW - 200_000, None),
      ],
      &p,
      NOW,
    );
    assert_eq!(roster.entries.len(), 2);
    assert_eq!(roster.active_count, 2);
    assert!(!roster.entries[0].is_stale);
    assert!(roster.entries[1].is_stale);

    let expired = record(PresenceStatus::Active, NOW - 200_000, None);
    assert_eq!(expired.effective_status(&p, NOW), PresenceStatus::Expired);
  }

  #[test]
  fn counts_split_by_status_and_fence() {
    let p = PresencePolicy::default();
    let mut outside = record(PresenceStatus::Active, NOW - 1_000, None);
    outside.is_inside_geofence = false;
    let roster = Roster::build(
      "s1",
      vec![outside, record(PresenceStatus::Submitted, NOW - 2_000, Some(NOW - 2_000))],
      &p,
      NOW,
    );
    assert_eq!(roster.active_count, 1);
    assert_eq!(roster.submitted_count, 1);
    assert_eq!(roster.outside_count, 1);
  }

  #[test]
  fn silence_is_measured_by_receipt_not_device_clock() {
    let p = PresencePolicy::default();
    // A device clock four minutes slow, heard from just now.
    let mut slow = record(PresenceStatus::Active, NOW - 240_000, None);
    slow.last_received_at_ms = NOW;
    assert_eq!(slow.effective_status(&p, NOW), PresenceStatus::Active);
    let roster = Roster::build("s1", vec![slow], &p, NOW);
    assert_eq!(roster.entries.len(), 1);
    assert!(!roster.entries[0].is_stale);
    assert_eq!(roster.entries[0].silent_for_ms, 0);
  }

  #[test]
  fn implied_speed_ignores_noise_and_stale_fixes() {
    let prev = record(PresenceStatus::Active, NOW, None);
    let north = |m: f64| Location {
      point:           crate::geo::offset_north(prev.last_location, m),
      accuracy_meters: 6.0,
    };
    // 280 m in 5 s.
    let kmh = prev.implied_speed_kmh(&north(280.0), NOW + 5_000).unwrap();
    assert!((195.0..210.0).contains(&kmh), "{kmh}");
    // Same move over five minutes.
    assert!(prev.implied_speed_kmh(&north(280.0), NOW + 300_000).unwrap() < 5.0);
    // Inside the error circles.
    assert!(prev.implied_speed_kmh(&north(10.0), NOW + 1_000).is_none());
    // Not newer than the stored fix.
    assert!(prev.implied_speed_kmh(&north(280.0), NOW).is_none());
  }
}

//! Attendance records and submission outcomes.
//!
//! An [`AttendanceRecord`] is unique on `(session_id, student_identifier)` and
//! immutable once written. Corrections happen out of band.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use uuid::Uuid;

use crate::{geo::Location, token::TokenRejection};

/// The committed proof that a student attended a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
  pub record_id:          Uuid,
  pub session_id:         String,
  pub student_identifier: String,
  pub device_fingerprint: String,
  pub marked_at_ms:       i64,
  pub location_verified:  bool,
  pub distance_meters:    Option<f64>,
  pub risk_score:         u8,
}

/// A scanned-token submission after boundary validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
  pub session_id:         Option<String>,
  /// The raw `timestamp` query value from the scanned code.
  pub timestamp:          Option<String>,
  pub student_identifier: String,
  pub device_fingerprint: String,
  /// `None` when the device could not obtain a fix.
  pub location:           Option<Location>,
}

/// Why a submission was not committed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
  MalformedToken,
  ExpiredToken,
  LocationUnavailable,
  LocationInsufficientAccuracy,
  AlreadyMarked,
  GeofenceViolation,
  FraudThresholdExceeded,
}

impl RejectReason {
  /// What the submitter should do next. Deliberately silent about which
  /// fraud heuristic fired.
  pub fn hint(self) -> &'static str {
    match self {
      Self::MalformedToken => {
        "This code could not be read. Check your device clock and scan the current code again."
      }
      Self::ExpiredToken => "This code has expired. Scan the code currently on screen.",
      Self::LocationUnavailable => "Location access is required. Enable GPS and try again.",
      Self::LocationInsufficientAccuracy => {
        "GPS accuracy is too low. Move near a window or outdoors and try again."
      }
      Self::AlreadyMarked => "Attendance is already marked for this session.",
      Self::GeofenceViolation => "You do not appear to be at the session location.",
      Self::FraudThresholdExceeded => {
        "Attendance could not be verified. Contact your instructor."
      }
    }
  }

  /// Terminal reasons surface immediately; the rest are outcomes of the
  /// evaluation.
  pub fn is_token_error(self) -> bool {
    matches!(self, Self::MalformedToken | Self::ExpiredToken)
  }
}

impl From<&TokenRejection> for RejectReason {
  fn from(r: &TokenRejection) -> Self {
    if r.is_expired() { Self::ExpiredToken } else { Self::MalformedToken }
  }
}

/// Result of the atomic check-and-create on `(session_id, student)`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
  Created(AttendanceRecord),
  /// Another writer got there first; carries the record that won.
  AlreadyMarked(AttendanceRecord),
}

/// The finalizer's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalization {
  pub accepted: bool,
  pub record:   Option<AttendanceRecord>,
  pub reason:   Option<RejectReason>,
}

impl Finalization {
  pub fn accepted(record: AttendanceRecord) -> Self {
    Self { accepted: true, record: Some(record), reason: None }
  }

  pub fn rejected(reason: RejectReason) -> Self {
    Self { accepted: false, record: None, reason: Some(reason) }
  }

  /// An idempotent repeat: not accepted, but the existing record is returned.
  pub fn already_marked(existing: AttendanceRecord) -> Self {
    Self { accepted: false, record: Some(existing), reason: Some(RejectReason::AlreadyMarked) }
  }

  pub fn is_expired(&self) -> bool { self.reason == Some(RejectReason::ExpiredToken) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_rejections_map_to_distinct_reasons() {
    let expired = TokenRejection::Expired { overdue_ms: 1 };
    let future = TokenRejection::FromTheFuture { ahead_ms: 9_000 };
    assert_eq!(RejectReason::from(&expired), RejectReason::ExpiredToken);
    assert_eq!(RejectReason::from(&future), RejectReason::MalformedToken);
    assert!(Finalization::rejected(RejectReason::ExpiredToken).is_expired());
  }

  #[test]
  fn reasons_use_screaming_snake_case_on_the_wire() {
    assert_eq!(
      serde_json::to_string(&RejectReason::FraudThresholdExceeded).unwrap(),
      "\"FRAUD_THRESHOLD_EXCEEDED\""
    );
    assert_eq!(RejectReason::AlreadyMarked.to_string(), "ALREADY_MARKED");
  }
}

//! Proxy-detection violation records.
//!
//! Violations are an append-only audit trail written by the fraud engine.
//! Afterwards only the review fields (`status`, `reviewed_by`,
//! `review_notes`, `reviewed_at_ms`) ever change, and only by a human.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

/// The heuristic that produced a finding.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationType {
  LowGpsAccuracy,
  OutsideGeofence,
  DuplicateDevice,
  DuplicatePrn,
  MultiplePrnsSameDevice,
  ImpossibleTravel,
  GpsSpoofingSuspected,
}

impl ViolationType {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownViolationType(s.to_owned()))
  }
}

/// Human review state of a violation.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReviewStatus {
  #[default]
  Flagged,
  Reviewed,
  Confirmed,
  Cleared,
}

impl ReviewStatus {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownReviewStatus(s.to_owned()))
  }
}

/// One persisted finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
  pub violation_id:           Uuid,
  pub session_id:             String,
  /// The attendance record this finding was attached to, when accepted.
  pub attendance_record_id:   Option<Uuid>,
  pub student_identifier:     String,
  pub device_fingerprint:     Option<String>,
  pub violation_type:         ViolationType,
  /// Aggregate risk of the whole evaluation, 0–100; identical on every
  /// record written by the same evaluation.
  pub risk_score:             u8,
  pub details:                String,
  pub distance_from_geofence: Option<f64>,
  pub latitude:               Option<f64>,
  pub longitude:              Option<f64>,
  pub accuracy_meters:        Option<f64>,
  pub status:                 ReviewStatus,
  pub reviewed_by:            Option<String>,
  pub review_notes:           Option<String>,
  pub recorded_at_ms:         i64,
  pub reviewed_at_ms:         Option<i64>,
}

/// A review decision applied to one or many violations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewUpdate {
  pub status:         ReviewStatus,
  pub review_notes:   Option<String>,
  pub reviewed_by:    String,
  pub reviewed_at_ms: i64,
}

impl ReviewUpdate {
  /// Bulk review may not push records back into the automated `flagged`
  /// state.
  pub fn check_bulk(&self) -> Result<()> {
    if self.status == ReviewStatus::Flagged {
      return Err(Error::InvalidBulkStatus(self.status.to_string()));
    }
    Ok(())
  }
}

/// Filters for listing violations.
#[derive(Debug, Clone, Default)]
pub struct ViolationQuery {
  pub status:             Option<ReviewStatus>,
  pub violation_type:     Option<ViolationType>,
  /// Case-insensitive substring match.
  pub student_identifier: Option<String>,
  pub session_id:         Option<String>,
  pub limit:              Option<usize>,
  pub offset:             Option<usize>,
}

/// A page of violations plus the unpaged total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationPage {
  pub violations: Vec<ViolationRecord>,
  pub total:      usize,
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationStats {
  pub total:     usize,
  pub by_status: BTreeMap<ReviewStatus, usize>,
  pub by_type:   BTreeMap<ViolationType, usize>,
  pub recent:    Vec<ViolationRecord>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_names_match_the_audit_log() {
    assert_eq!(ViolationType::MultiplePrnsSameDevice.to_string(), "multiple_prns_same_device");
    assert_eq!(
      ViolationType::parse("gps_spoofing_suspected").unwrap(),
      ViolationType::GpsSpoofingSuspected
    );
    assert!(ViolationType::parse("ml_high_risk").is_err());
    assert_eq!(ReviewStatus::parse("cleared").unwrap(), ReviewStatus::Cleared);
    assert_eq!(
      serde_json::to_string(&ReviewStatus::Confirmed).unwrap(),
      "\"confirmed\""
    );
  }

  #[test]
  fn bulk_review_cannot_reflag() {
    let update = ReviewUpdate {
      status:         ReviewStatus::Flagged,
      review_notes:   None,
      reviewed_by:    "ops".into(),
      reviewed_at_ms: 0,
    };
    assert!(update.check_bulk().is_err());
  }
}

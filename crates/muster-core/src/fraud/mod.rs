//! Proxy/fraud detection.
//!
//! A [`RuleRegistry`] holds independent [`Rule`] evaluators. Each one looks at
//! a candidate submission plus the session's history and either stays quiet
//! or yields a [`Finding`] with a raw score. The registry sums the weighted
//! scores and caps the total at 100. The engine is advisory: it never decides
//! accept/reject, that is the pipeline's job.

mod rules;

use serde::{Deserialize, Serialize};

pub use rules::{
  DuplicateDevice, DuplicatePrn, GpsSpoofingSuspected, ImpossibleTravel, LowGpsAccuracy,
  MultiplePrnsSameDevice, OutsideGeofence,
};

use crate::{
  attendance::AttendanceRecord,
  geo::Location,
  geofence::FenceEvaluation,
  policy::{FraudPolicy, PresencePolicy},
  presence::PresenceRecord,
  violation::ViolationType,
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Everything the store knows that a rule may need.
#[derive(Debug, Clone, Default)]
pub struct History {
  /// Committed attendance for the session.
  pub session_attendance: Vec<AttendanceRecord>,
  /// Every presence record of the session, live or not.
  pub session_presence:   Vec<PresenceRecord>,
  /// The device's most recent presence in any session.
  pub device_last_seen:   Option<PresenceRecord>,
  /// Presence records of other devices, in any session, that reported the
  /// exact same fix as the submission.
  pub coordinate_twins:   Vec<PresenceRecord>,
}

/// A candidate submission as seen by the rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
  pub session_id:         &'a str,
  pub student_identifier: &'a str,
  pub device_fingerprint: &'a str,
  pub location:           &'a Location,
  pub now_ms:             i64,
  pub fence:              &'a FenceEvaluation,
  pub history:            &'a History,
  pub policy:             &'a FraudPolicy,
  pub presence_policy:    &'a PresencePolicy,
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// One triggered heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
  pub violation_type:         ViolationType,
  /// Unweighted score contribution, 0–100.
  pub score:                  f64,
  pub details:                String,
  pub distance_from_geofence: Option<f64>,
}

impl Finding {
  pub fn new(violation_type: ViolationType, score: f64, details: impl Into<String>) -> Self {
    Self {
      violation_type,
      score: score.clamp(0.0, 100.0),
      details: details.into(),
      distance_from_geofence: None,
    }
  }
}

/// The findings of one evaluation and their aggregate risk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
  pub findings:   Vec<Finding>,
  pub risk_score: u8,
}

impl Assessment {
  pub fn has(&self, kind: ViolationType) -> bool {
    self.findings.iter().any(|f| f.violation_type == kind)
  }

  pub fn is_clean(&self) -> bool { self.findings.is_empty() }

  pub fn kinds(&self) -> Vec<ViolationType> {
    self.findings.iter().map(|f| f.violation_type).collect()
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// A single, pure fraud heuristic.
pub trait Rule: Send + Sync {
  fn kind(&self) -> ViolationType;

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding>;
}

/// An ordered set of rules combined by a weighted sum.
pub struct RuleRegistry {
  rules: Vec<Box<dyn Rule>>,
}

impl Default for RuleRegistry {
  fn default() -> Self { Self::standard() }
}

impl RuleRegistry {
  pub fn empty() -> Self { Self { rules: Vec::new() } }

  /// Every built-in heuristic.
  pub fn standard() -> Self {
    Self::empty()
      .with(LowGpsAccuracy)
      .with(OutsideGeofence)
      .with(DuplicateDevice)
      .with(DuplicatePrn)
      .with(MultiplePrnsSameDevice)
      .with(ImpossibleTravel)
      .with(GpsSpoofingSuspected)
  }

  pub fn with(mut self, rule: impl Rule + 'static) -> Self {
    self.rules.push(Box::new(rule));
    self
  }

  pub fn without(mut self, kind: ViolationType) -> Self {
    self.rules.retain(|r| r.kind() != kind);
    self
  }

  pub fn kinds(&self) -> Vec<ViolationType> { self.rules.iter().map(|r| r.kind()).collect() }

  /// Run every rule and aggregate.
  pub fn assess(&self, ctx: &RuleContext<'_>) -> Assessment {
    let findings: Vec<Finding> = self.rules.iter().filter_map(|r| r.evaluate(ctx)).collect();

    let total: f64 = findings
      .iter()
      .map(|f| f.score * ctx.policy.weight(f.violation_type).max(0.0))
      .sum();

    Assessment { findings, risk_score: total.round().clamp(0.0, 100.0) as u8 }
  }
}

#[cfg(test)]
mod tests;

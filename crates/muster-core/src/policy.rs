//! Tunable policy, deserialised from the server configuration.
//!
//! Every field has a serde default so a config file only needs to name what
//! it overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::violation::ViolationType;

/// Token lifetime rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
  /// How long a token stays valid after issue; also the issuer's cadence.
  pub ttl_ms:        i64,
  /// How far in the future a token timestamp may be before it is refused.
  pub clock_skew_ms: i64,
}

impl Default for TokenPolicy {
  fn default() -> Self { Self { ttl_ms: 120_000, clock_skew_ms: 5_000 } }
}

/// Live-roster timing. None of these values ever reject a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresencePolicy {
  /// How long a submitted device stays in the live view.
  pub grace_ms:        i64,
  /// Silence after which a record is shown as stale.
  pub stale_after_ms:  i64,
  /// Silence after which an active record is treated as expired.
  pub expire_after_ms: i64,
}

impl Default for PresencePolicy {
  fn default() -> Self {
    Self { grace_ms: 300_000, stale_after_ms: 20_000, expire_after_ms: 180_000 }
  }
}

/// Thresholds and weights for the fraud rule registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudPolicy {
  pub low_accuracy_threshold_m: f64,
  pub max_speed_kmh:            f64,
  /// Risk at or above which an out-of-fence submission is refused.
  pub hard_block_score:         u8,
  /// Reported accuracy at or below which a fix is implausibly precise.
  pub min_plausible_accuracy_m: f64,
  /// Multiplier applied to each rule's score; missing entries weigh 1.0.
  pub weights:                  BTreeMap<ViolationType, f64>,
}

impl Default for FraudPolicy {
  fn default() -> Self {
    Self {
      low_accuracy_threshold_m: 20.0,
      max_speed_kmh:            150.0,
      hard_block_score:         80,
      min_plausible_accuracy_m: 1.0,
      weights:                  BTreeMap::new(),
    }
  }
}

impl FraudPolicy {
  pub fn weight(&self, kind: ViolationType) -> f64 {
    self.weights.get(&kind).copied().unwrap_or(1.0)
  }
}

/// What a soft finding does to the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingAction {
  /// Record the violation and still accept.
  Flag,
  /// Record the violation and refuse the submission.
  Reject,
}

/// Explicit accept/reject choices for findings whose handling is a product
/// decision rather than a correctness one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
  /// Handling of a submission outside every applicable zone.
  pub geofence:     FindingAction,
  /// Handling of a fix whose reported accuracy exceeds the threshold.
  pub low_accuracy: FindingAction,
}

impl Default for DecisionPolicy {
  fn default() -> Self {
    Self { geofence: FindingAction::Flag, low_accuracy: FindingAction::Reject }
  }
}

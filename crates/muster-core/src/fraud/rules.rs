//! The built-in heuristics.

use super::{Finding, Rule, RuleContext};
use crate::violation::ViolationType;

/// Accuracy past the threshold makes every geofence result unreliable.
pub struct LowGpsAccuracy;

impl Rule for LowGpsAccuracy {
  fn kind(&self) -> ViolationType { ViolationType::LowGpsAccuracy }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let accuracy = ctx.location.accuracy_meters;
    let threshold = ctx.policy.low_accuracy_threshold_m;
    if accuracy <= threshold {
      return None;
    }
    Some(Finding::new(
      self.kind(),
      (40.0 + (accuracy - threshold) / 5.0).min(60.0),
      format!("GPS accuracy too low: ±{}m (limit ±{}m)", accuracy.round(), threshold),
    ))
  }
}

/// Outside every applicable zone. The score grows with the miss distance, and
/// a session without zones is treated as a miss.
pub struct OutsideGeofence;

impl Rule for OutsideGeofence {
  fn kind(&self) -> ViolationType { ViolationType::OutsideGeofence }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    if ctx.fence.is_within_fence {
      return None;
    }
    let Some(zone) = ctx.fence.zone.as_ref() else {
      return Some(Finding::new(
        self.kind(),
        50.0,
        "No geofence zone applies to this submission",
      ));
    };
    let excess = zone.excess_meters();
    let mut finding = Finding::new(
      self.kind(),
      (50.0 + excess / 10.0).min(90.0),
      format!(
        "Location {}m from {} center, outside its {}m fence",
        zone.distance_meters.round(),
        zone.location_name,
        zone.fence_radius
      ),
    );
    finding.distance_from_geofence = Some(excess);
    Some(finding)
  }
}

/// This device already marked attendance for somebody else.
pub struct DuplicateDevice;

impl Rule for DuplicateDevice {
  fn kind(&self) -> ViolationType { ViolationType::DuplicateDevice }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let others: Vec<&str> = ctx
      .history
      .session_attendance
      .iter()
      .filter(|r| {
        r.device_fingerprint == ctx.device_fingerprint
          && r.student_identifier != ctx.student_identifier
      })
      .map(|r| r.student_identifier.as_str())
      .collect();
    if others.is_empty() {
      return None;
    }
    Some(Finding::new(
      self.kind(),
      70.0,
      format!("Device already marked attendance for {}", others.join(", ")),
    ))
  }
}

/// This student already marked attendance from another device. A retry from
/// the same device is an idempotent repeat and is ignored.
pub struct DuplicatePrn;

impl Rule for DuplicatePrn {
  fn kind(&self) -> ViolationType { ViolationType::DuplicatePrn }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let existing = ctx
      .history
      .session_attendance
      .iter()
      .find(|r| r.student_identifier == ctx.student_identifier)?;
    if existing.device_fingerprint == ctx.device_fingerprint {
      return None;
    }
    Some(Finding::new(
      self.kind(),
      80.0,
      format!("{} already marked from a different device", ctx.student_identifier),
    ))
  }
}

/// Several identifiers are being swept through one phone.
pub struct MultiplePrnsSameDevice;

impl Rule for MultiplePrnsSameDevice {
  fn kind(&self) -> ViolationType { ViolationType::MultiplePrnsSameDevice }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let mut others: Vec<&str> = ctx
      .history
      .session_presence
      .iter()
      .filter(|p| {
        p.device_fingerprint == ctx.device_fingerprint
          && p.is_live(ctx.presence_policy, ctx.now_ms)
      })
      .filter_map(|p| p.student_identifier.as_deref())
      .filter(|id| *id != ctx.student_identifier)
      .collect();
    others.sort_unstable();
    others.dedup();
    if others.is_empty() {
      return None;
    }
    Some(Finding::new(
      self.kind(),
      85.0,
      format!(
        "Device in use for {} identifiers this session ({} and {})",
        others.len() + 1,
        ctx.student_identifier,
        others.join(", ")
      ),
    ))
  }
}

/// Implied speed is not humanly possible, either on the jump from the
/// device's last known fix to the submission or between two of its
/// heartbeats this session.
pub struct ImpossibleTravel;

impl ImpossibleTravel {
  fn jump_to_submission(ctx: &RuleContext<'_>) -> Option<(f64, String)> {
    let prev = ctx.history.device_last_seen.as_ref()?;
    let distance = prev.last_location.distance_to(&ctx.location.point);
    // Movement within the combined error circles is noise, not travel.
    if distance <= prev.last_accuracy_meters + ctx.location.accuracy_meters {
      return None;
    }
    let elapsed_s = (ctx.now_ms - prev.last_received_at_ms).max(1_000) as f64 / 1_000.0;
    let kmh = distance / elapsed_s * 3.6;
    Some((
      kmh,
      format!(
        "Impossible travel: {}m in {:.0}s ({:.1} km/h)",
        distance.round(),
        elapsed_s,
        kmh
      ),
    ))
  }

  fn between_heartbeats(ctx: &RuleContext<'_>) -> Option<(f64, String)> {
    let kmh = ctx
      .history
      .session_presence
      .iter()
      .find(|p| p.device_fingerprint == ctx.device_fingerprint)?
      .peak_speed_kmh?;
    Some((kmh, format!("Impossible travel between heartbeats ({kmh:.1} km/h)")))
  }
}

impl Rule for ImpossibleTravel {
  fn kind(&self) -> ViolationType { ViolationType::ImpossibleTravel }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let (kmh, details) = [Self::jump_to_submission(ctx), Self::between_heartbeats(ctx)]
      .into_iter()
      .flatten()
      .filter(|(kmh, _)| *kmh > ctx.policy.max_speed_kmh)
      .max_by(|a, b| a.0.total_cmp(&b.0))?;
    Some(Finding::new(self.kind(), (50.0 + kmh / 10.0).min(95.0), details))
  }
}

/// Composite plausibility check on the fix itself.
pub struct GpsSpoofingSuspected;

/// A stationary real receiver still wobbles; this long without any change is
/// suspicious.
const ZERO_JITTER_MIN_MS: i64 = 10_000;

impl Rule for GpsSpoofingSuspected {
  fn kind(&self) -> ViolationType { ViolationType::GpsSpoofingSuspected }

  fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
    let mut score: f64 = 0.0;
    let mut reasons = Vec::new();

    let twins: Vec<&str> = ctx
      .history
      .coordinate_twins
      .iter()
      .filter(|p| p.device_fingerprint != ctx.device_fingerprint)
      .map(|p| p.device_fingerprint.as_str())
      .collect();
    if !twins.is_empty() {
      score = score.max(60.0);
      reasons.push(format!(
        "identical coordinates reported by {} other device(s)",
        twins.len()
      ));
    }

    if ctx.location.accuracy_meters <= ctx.policy.min_plausible_accuracy_m {
      score = score.max(45.0);
      reasons.push(format!(
        "implausibly precise fix (±{}m)",
        ctx.location.accuracy_meters
      ));
    }

    if let Some(prev) = ctx.history.device_last_seen.as_ref() {
      let elapsed = ctx.now_ms - prev.last_received_at_ms;
      if elapsed >= ZERO_JITTER_MIN_MS
        && prev.last_location.same_fix(&ctx.location.point)
        && prev.last_accuracy_meters == ctx.location.accuracy_meters
      {
        score = score.max(45.0);
        reasons.push(format!("zero jitter over {}s", elapsed / 1_000));
      }
    }

    if reasons.is_empty() {
      return None;
    }
    Some(Finding::new(self.kind(), score, format!("GPS spoofing suspected: {}", reasons.join("; "))))
  }
}

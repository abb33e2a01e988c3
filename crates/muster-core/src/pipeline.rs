//! The attendance pipeline and its finalizer.
//!
//! `submit` runs a scanned-token submission through token validation, the
//! geofence engine, the fraud rules and the presence tracker, then hands the
//! result to [`Pipeline::finalize`], the only code path that creates
//! attendance records.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::{
  attendance::{
    AttendanceRecord, CommitOutcome, Finalization, RejectReason, Submission,
  },
  clock::Clock,
  fraud::{Assessment, History, RuleContext, RuleRegistry},
  geo::Location,
  geofence::FenceEvaluation,
  policy::{DecisionPolicy, FindingAction, FraudPolicy, PresencePolicy, TokenPolicy},
  presence::{PresenceRecord, PresenceUpdate},
  store::AttendanceStore,
  token::{self, TokenRejection, ValidToken},
  tracker::Tracker,
  violation::{ReviewStatus, ViolationRecord, ViolationType},
};

/// Every policy knob the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub token:    TokenPolicy,
  pub presence: PresencePolicy,
  pub fraud:    FraudPolicy,
  pub policy:   DecisionPolicy,
}

/// Everything one submission produced, for the caller to report and publish.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
  pub finalization: Finalization,
  /// Why the token was refused, when it was.
  pub token_error:  Option<TokenRejection>,
  pub fence:        Option<FenceEvaluation>,
  pub assessment:   Assessment,
  pub violations:   Vec<ViolationRecord>,
  pub presence:     Option<PresenceRecord>,
}

/// A verdict and the violation rows written with it.
#[derive(Debug, Clone)]
pub struct Finalized {
  pub finalization: Finalization,
  /// Empty for token refusals and idempotent repeats, which record nothing.
  pub violations:   Vec<ViolationRecord>,
}

impl Finalized {
  fn unrecorded(finalization: Finalization) -> Self {
    Self { finalization, violations: Vec::new() }
  }
}

impl SubmissionReport {
  fn rejected_early(reason: RejectReason, token_error: Option<TokenRejection>) -> Self {
    Self {
      finalization: Finalization::rejected(reason),
      token_error,
      fence: None,
      assessment: Assessment::default(),
      violations: Vec::new(),
      presence: None,
    }
  }
}

pub struct Pipeline<S> {
  store:   Arc<S>,
  clock:   Arc<dyn Clock>,
  tracker: Tracker<S>,
  rules:   RuleRegistry,
  config:  PipelineConfig,
}

impl<S: AttendanceStore> Pipeline<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: PipelineConfig) -> Self {
    Self::with_rules(store, clock, config, RuleRegistry::standard())
  }

  pub fn with_rules(
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    rules: RuleRegistry,
  ) -> Self {
    let tracker = Tracker::new(store.clone(), clock.clone(), config.presence.clone());
    Self { store, clock, tracker, rules, config }
  }

  pub fn tracker(&self) -> &Tracker<S> { &self.tracker }

  pub fn config(&self) -> &PipelineConfig { &self.config }

  pub fn clock(&self) -> &Arc<dyn Clock> { &self.clock }

  fn check_token(&self, sub: &Submission) -> Result<ValidToken, TokenRejection> {
    token::validate(
      &self.config.token,
      sub.session_id.as_deref(),
      sub.timestamp.as_deref(),
      self.clock.now_ms(),
    )
  }

  /// Run one submission end to end.
  pub async fn submit(&self, sub: Submission) -> Result<SubmissionReport, S::Error> {
    let token = match self.check_token(&sub) {
      Ok(t) => t,
      Err(rejection) => {
        tracing::info!(
          student = %sub.student_identifier,
          %rejection,
          "submission refused at token check"
        );
        let reason = RejectReason::from(&rejection);
        return Ok(SubmissionReport::rejected_early(reason, Some(rejection)));
      }
    };
    let session_id = token.session_id.as_str();

    let Some(location) = sub.location else {
      return Ok(SubmissionReport::rejected_early(RejectReason::LocationUnavailable, None));
    };

    let now = self.clock.now_ms();
    let fence = self
      .tracker
      .evaluate(session_id, Some(&sub.student_identifier), &location)
      .await?;

    let history = self.history(session_id, &sub.device_fingerprint, &location).await?;
    let ctx = RuleContext {
      session_id,
      student_identifier: &sub.student_identifier,
      device_fingerprint: &sub.device_fingerprint,
      location: &location,
      now_ms: now,
      fence: &fence,
      history: &history,
      policy: &self.config.fraud,
      presence_policy: &self.config.presence,
    };
    let assessment = self.rules.assess(&ctx);

    // The in-progress attempt joins the live roster before the commit.
    let update = PresenceUpdate::new(
      session_id.to_owned(),
      sub.device_fingerprint.clone(),
      Some(sub.student_identifier.clone()),
      location,
      now,
      &fence,
    )
    .received_at(now);
    let presence = self.tracker.record_evaluated(update).await?;

    let Finalized { finalization, violations } =
      self.finalize(&sub, &location, &fence, &assessment).await?;

    let presence = if finalization.accepted {
      self
        .store
        .list_presence(session_id.to_owned())
        .await?
        .into_iter()
        .find(|p| p.device_fingerprint == sub.device_fingerprint)
        .or(Some(presence))
    } else {
      Some(presence)
    };

    Ok(SubmissionReport {
      finalization,
      token_error: None,
      fence: Some(fence),
      assessment,
      violations,
      presence,
    })
  }

  /// Decide and, when allowed, commit. The only writer of attendance records.
  ///
  /// Steps: token still valid; no existing record (idempotent
  /// `ALREADY_MARKED`); accuracy, hard-block and geofence policy; token
  /// re-checked against the clock immediately before the atomic
  /// check-and-create. Findings are written with the verdict: inside the
  /// commit when accepted, on their own when rejected by policy, and not at
  /// all for token refusals or idempotent repeats.
  pub async fn finalize(
    &self,
    sub: &Submission,
    location: &Location,
    fence: &FenceEvaluation,
    assessment: &Assessment,
  ) -> Result<Finalized, S::Error> {
    let token = match self.check_token(sub) {
      Ok(t) => t,
      Err(rejection) => {
        return Ok(Finalized::unrecorded(Finalization::rejected(RejectReason::from(&rejection))));
      }
    };

    if let Some(existing) = self
      .store
      .find_attendance(token.session_id.clone(), sub.student_identifier.clone())
      .await?
    {
      return Ok(Finalized::unrecorded(Finalization::already_marked(existing)));
    }

    if let Some(reason) = self.policy_rejection(location, fence, assessment) {
      tracing::info!(
        session = %token.session_id,
        student = %sub.student_identifier,
        %reason,
        risk = assessment.risk_score,
        "submission rejected by policy"
      );
      let violations =
        self.violation_records(&token.session_id, sub, location, assessment, None);
      if !violations.is_empty() {
        self.warn_findings(&token.session_id, sub, assessment, false);
        self.store.append_violations(violations.clone()).await?;
      }
      return Ok(Finalized { finalization: Finalization::rejected(reason), violations });
    }

    // A slow request must not commit under a token that aged out meanwhile.
    let token = match self.check_token(sub) {
      Ok(t) => t,
      Err(rejection) => {
        return Ok(Finalized::unrecorded(Finalization::rejected(RejectReason::from(&rejection))));
      }
    };

    let record = AttendanceRecord {
      record_id:          Uuid::new_v4(),
      session_id:         token.session_id,
      student_identifier: sub.student_identifier.clone(),
      device_fingerprint: sub.device_fingerprint.clone(),
      marked_at_ms:       self.clock.now_ms(),
      location_verified:  fence.is_within_fence,
      distance_meters:    fence.distance_meters(),
      risk_score:         assessment.risk_score,
    };
    // Findings of an accepted submission are committed with the record, so
    // neither exists without the other.
    let violations = self.violation_records(
      &record.session_id,
      sub,
      location,
      assessment,
      Some(record.record_id),
    );

    match self.store.commit_attendance(record, violations.clone()).await? {
      CommitOutcome::Created(record) => {
        tracing::info!(
          session = %record.session_id,
          student = %record.student_identifier,
          verified = record.location_verified,
          risk = record.risk_score,
          "attendance marked"
        );
        if !violations.is_empty() {
          self.warn_findings(&record.session_id, sub, assessment, true);
        }
        Ok(Finalized { finalization: Finalization::accepted(record), violations })
      }
      CommitOutcome::AlreadyMarked(existing) => {
        Ok(Finalized::unrecorded(Finalization::already_marked(existing)))
      }
    }
  }

  fn warn_findings(
    &self,
    session_id: &str,
    sub: &Submission,
    assessment: &Assessment,
    accepted: bool,
  ) {
    tracing::warn!(
      session = %session_id,
      student = %sub.student_identifier,
      device = %sub.device_fingerprint,
      risk = assessment.risk_score,
      kinds = ?assessment.kinds(),
      accepted,
      "proxy detection flagged submission"
    );
  }

  fn policy_rejection(
    &self,
    location: &Location,
    fence: &FenceEvaluation,
    assessment: &Assessment,
  ) -> Option<RejectReason> {
    let decision = &self.config.policy;
    if location.accuracy_meters > self.config.fraud.low_accuracy_threshold_m
      && decision.low_accuracy == FindingAction::Reject
    {
      return Some(RejectReason::LocationInsufficientAccuracy);
    }
    if assessment.has(ViolationType::OutsideGeofence)
      && assessment.risk_score >= self.config.fraud.hard_block_score
    {
      return Some(RejectReason::FraudThresholdExceeded);
    }
    if !fence.is_within_fence && decision.geofence == FindingAction::Reject {
      return Some(RejectReason::GeofenceViolation);
    }
    None
  }

  async fn history(
    &self,
    session_id: &str,
    device_fingerprint: &str,
    location: &Location,
  ) -> Result<History, S::Error> {
    Ok(History {
      session_attendance: self.store.list_attendance(session_id.to_owned()).await?,
      session_presence:   self.store.list_presence(session_id.to_owned()).await?,
      device_last_seen:   self
        .store
        .latest_device_presence(device_fingerprint.to_owned())
        .await?,
      coordinate_twins:   self
        .store
        .presence_at_fix(location.point, device_fingerprint.to_owned())
        .await?,
    })
  }

  fn violation_records(
    &self,
    session_id: &str,
    sub: &Submission,
    location: &Location,
    assessment: &Assessment,
    attendance_record_id: Option<Uuid>,
  ) -> Vec<ViolationRecord> {
    let now = self.clock.now_ms();
    assessment
      .findings
      .iter()
      .map(|f| ViolationRecord {
        violation_id:           Uuid::new_v4(),
        session_id:             session_id.to_owned(),
        attendance_record_id,
        student_identifier:     sub.student_identifier.clone(),
        device_fingerprint:     Some(sub.device_fingerprint.clone()),
        violation_type:         f.violation_type,
        risk_score:             assessment.risk_score,
        details:                f.details.clone(),
        distance_from_geofence: f.distance_from_geofence,
        latitude:               Some(location.point.latitude),
        longitude:              Some(location.point.longitude),
        accuracy_meters:        Some(location.accuracy_meters),
        status:                 ReviewStatus::Flagged,
        reviewed_by:            None,
        review_notes:           None,
        recorded_at_ms:         now,
        reviewed_at_ms:         None,
      })
      .collect()
  }
}

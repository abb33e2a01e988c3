//! The presence tracker: ingests heartbeats and serves the live roster.

use std::sync::Arc;

use crate::{
  clock::Clock,
  geo::Location,
  geofence::{FenceEvaluation, evaluate_for},
  policy::PresencePolicy,
  presence::{PresenceRecord, PresenceUpdate, Roster},
  store::AttendanceStore,
};

/// A location report from a device that is mid-scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
  pub session_id:         String,
  pub device_fingerprint: String,
  pub student_identifier: Option<String>,
  pub location:           Location,
  /// Device-side timestamp. Falls back to server time when absent.
  pub timestamp_ms:       Option<i64>,
}

/// Keeps one presence record per (session, device) current.
pub struct Tracker<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  policy: PresencePolicy,
}

impl<S: AttendanceStore> Tracker<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: PresencePolicy) -> Self {
    Self { store, clock, policy }
  }

  pub fn policy(&self) -> &PresencePolicy { &self.policy }

  /// Re-evaluate the geofence for this fix and upsert the record.
  pub async fn record_heartbeat(&self, hb: Heartbeat) -> Result<PresenceRecord, S::Error> {
    let now = self.clock.now_ms();
    let fence = self
      .evaluate(&hb.session_id, hb.student_identifier.as_deref(), &hb.location)
      .await?;
    // A device clock running ahead must not pin the record against later
    // heartbeats.
    let seen_at = hb.timestamp_ms.map_or(now, |ts| ts.min(now));

    let update = PresenceUpdate::new(
      hb.session_id,
      hb.device_fingerprint,
      hb.student_identifier,
      hb.location,
      seen_at,
      &fence,
    )
    .received_at(now);
    let record = self.upsert(update).await?;
    tracing::debug!(
      session = %record.session_id,
      device = %record.device_fingerprint,
      inside = record.is_inside_geofence,
      "heartbeat recorded"
    );
    Ok(record)
  }

  /// Upsert a record whose fence has already been evaluated.
  pub async fn record_evaluated(
    &self,
    update: PresenceUpdate,
  ) -> Result<PresenceRecord, S::Error> {
    self.upsert(update).await
  }

  /// Upsert, noting how fast the device must have moved since its previous
  /// fix so travel between heartbeats is not lost when the fix is replaced.
  async fn upsert(&self, mut update: PresenceUpdate) -> Result<PresenceRecord, S::Error> {
    let previous = self
      .store
      .latest_device_presence(update.device_fingerprint.clone())
      .await?;
    update.implied_speed_kmh = previous
      .as_ref()
      .and_then(|prev| prev.implied_speed_kmh(&update.location, update.seen_at_ms));
    if let Some(kmh) = update.implied_speed_kmh {
      tracing::debug!(
        session = %update.session_id,
        device = %update.device_fingerprint,
        kmh,
        "implied speed since previous fix"
      );
    }
    self.store.upsert_presence(update).await
  }

  /// Mark the device as done. The record stays in the live view for the
  /// grace window.
  pub async fn mark_submitted(
    &self,
    session_id: &str,
    device_fingerprint: &str,
  ) -> Result<Option<PresenceRecord>, S::Error> {
    self
      .store
      .mark_presence_submitted(
        session_id.to_owned(),
        device_fingerprint.to_owned(),
        self.clock.now_ms(),
      )
      .await
  }

  /// Active records plus recently submitted ones.
  pub async fn list_active(&self, session_id: &str) -> Result<Roster, S::Error> {
    let records = self.store.list_presence(session_id.to_owned()).await?;
    Ok(Roster::build(session_id, records, &self.policy, self.clock.now_ms()))
  }

  /// Evaluate `location` against the zones that apply to this student.
  pub async fn evaluate(
    &self,
    session_id: &str,
    student_identifier: Option<&str>,
    location: &Location,
  ) -> Result<FenceEvaluation, S::Error> {
    let batch = match student_identifier {
      Some(id) => self.store.student_batch(id.to_owned()).await?,
      None => None,
    };
    let zones = self.store.list_zones(session_id.to_owned(), false).await?;
    Ok(evaluate_for(location, &zones, batch.as_deref()))
  }
}

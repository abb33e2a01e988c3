//! The `AttendanceStore` trait.
//!
//! Implemented by storage backends (e.g. `muster-store-sqlite`). The
//! [`Tracker`](crate::tracker::Tracker) and
//! [`Pipeline`](crate::pipeline::Pipeline) depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  attendance::{AttendanceRecord, CommitOutcome},
  geo::GeoPoint,
  geofence::{GeofenceZone, NewZone},
  presence::{PresenceRecord, PresenceUpdate},
  violation::{ReviewUpdate, ViolationPage, ViolationQuery, ViolationRecord, ViolationStats},
};

/// Abstraction over a Muster storage backend.
///
/// Zones and the student directory are read-only to the pipeline. Presence is
/// a per-key upsert. Attendance is insert-once. Violations are append-only
/// apart from their review fields.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Zones ─────────────────────────────────────────────────────────────

  /// Persist a new, active zone.
  fn add_zone(
    &self,
    zone: NewZone,
  ) -> impl Future<Output = Result<GeofenceZone, Self::Error>> + Send + '_;

  /// Zones of one session. Inactive zones are included only on request.
  fn list_zones(
    &self,
    session_id: String,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<GeofenceZone>, Self::Error>> + Send + '_;

  /// Every active zone across all sessions.
  fn all_active_zones(
    &self,
  ) -> impl Future<Output = Result<Vec<GeofenceZone>, Self::Error>> + Send + '_;

  /// Toggle a zone. Returns `None` if it does not exist.
  fn set_zone_active(
    &self,
    zone_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Option<GeofenceZone>, Self::Error>> + Send + '_;

  // ── Directory ─────────────────────────────────────────────────────────

  /// The batch a student belongs to, if the directory knows them.
  fn student_batch(
    &self,
    student_identifier: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  // ── Presence ──────────────────────────────────────────────────────────

  /// Insert or supersede the record for `(session_id, device_fingerprint)`.
  ///
  /// Last write wins by `seen_at_ms`, not by arrival: an update older than the
  /// stored one leaves the fix untouched but still advances the receipt time.
  /// A submitted record keeps its status and student identifier. Returns the
  /// record as stored after the call.
  fn upsert_presence(
    &self,
    update: PresenceUpdate,
  ) -> impl Future<Output = Result<PresenceRecord, Self::Error>> + Send + '_;

  /// Transition a record to `Submitted` without deleting it.
  fn mark_presence_submitted(
    &self,
    session_id: String,
    device_fingerprint: String,
    at_ms: i64,
  ) -> impl Future<Output = Result<Option<PresenceRecord>, Self::Error>> + Send + '_;

  /// Every presence record of a session, live or not.
  fn list_presence(
    &self,
    session_id: String,
  ) -> impl Future<Output = Result<Vec<PresenceRecord>, Self::Error>> + Send + '_;

  /// The device's most recently seen record in any session.
  fn latest_device_presence(
    &self,
    device_fingerprint: String,
  ) -> impl Future<Output = Result<Option<PresenceRecord>, Self::Error>> + Send + '_;

  /// Records of other devices, in any session, whose last fix equals `point`
  /// to seven decimal places.
  fn presence_at_fix(
    &self,
    point: GeoPoint,
    exclude_device: String,
  ) -> impl Future<Output = Result<Vec<PresenceRecord>, Self::Error>> + Send + '_;

  // ── Attendance ────────────────────────────────────────────────────────

  fn find_attendance(
    &self,
    session_id: String,
    student_identifier: String,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  fn list_attendance(
    &self,
    session_id: String,
  ) -> impl Future<Output = Result<Vec<AttendanceRecord>, Self::Error>> + Send + '_;

  /// Atomically create `record` unless one already exists for its
  /// `(session_id, student_identifier)`. In the same transaction, mark the
  /// submitting device's presence as submitted and append `violations`.
  ///
  /// Two racing commits for the same pair yield exactly one
  /// [`CommitOutcome::Created`]; the loser gets
  /// [`CommitOutcome::AlreadyMarked`] with the winning record and writes
  /// nothing.
  fn commit_attendance(
    &self,
    record: AttendanceRecord,
    violations: Vec<ViolationRecord>,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  // ── Violations ────────────────────────────────────────────────────────

  fn append_violations(
    &self,
    records: Vec<ViolationRecord>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_violations(
    &self,
    query: ViolationQuery,
  ) -> impl Future<Output = Result<ViolationPage, Self::Error>> + Send + '_;

  fn get_violation(
    &self,
    violation_id: Uuid,
  ) -> impl Future<Output = Result<Option<ViolationRecord>, Self::Error>> + Send + '_;

  /// Apply a review decision. Returns `None` if the violation does not exist.
  fn review_violation(
    &self,
    violation_id: Uuid,
    update: ReviewUpdate,
  ) -> impl Future<Output = Result<Option<ViolationRecord>, Self::Error>> + Send + '_;

  /// Apply one review decision to many violations; returns how many changed.
  fn bulk_review(
    &self,
    violation_ids: Vec<Uuid>,
    update: ReviewUpdate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn violation_stats(
    &self,
  ) -> impl Future<Output = Result<ViolationStats, Self::Error>> + Send + '_;
}

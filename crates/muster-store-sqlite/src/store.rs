//! [`SqliteStore`]: the SQLite implementation of [`AttendanceStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use muster_core::{
  attendance::{AttendanceRecord, CommitOutcome},
  geo::GeoPoint,
  geofence::{GeofenceZone, NewZone},
  presence::{PresenceRecord, PresenceUpdate},
  store::AttendanceStore,
  violation::{ReviewUpdate, ViolationPage, ViolationQuery, ViolationRecord, ViolationStats},
};

use crate::{
  encode::{
    decode_review_status, decode_violation_type, encode_uuid, RawAttendance, RawPresence,
    RawViolation, RawZone, ATTENDANCE_COLUMNS, PRESENCE_COLUMNS, VIOLATION_COLUMNS,
    ZONE_COLUMNS,
  },
  schema::SCHEMA,
  Result,
};

const DEFAULT_PAGE: usize = 50;
const RECENT_VIOLATIONS: i64 = 10;

/// Shared `WHERE` clause of the violation listing; unused filters bind NULL.
const VIOLATION_FILTER: &str = "
  (?1 IS NULL OR status = ?1)
  AND (?2 IS NULL OR violation_type = ?2)
  AND (?3 IS NULL OR instr(lower(student_identifier), lower(?3)) > 0)
  AND (?4 IS NULL OR session_id = ?4)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Muster attendance store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Register a student in the directory. The directory is maintained out of
  /// band; this exists for seeding and tests.
  pub async fn put_student(
    &self,
    student_identifier: impl Into<String>,
    batch_id: Option<String>,
  ) -> Result<()> {
    let student_identifier = student_identifier.into();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_identifier, batch_id) VALUES (?1, ?2)
           ON CONFLICT (student_identifier) DO UPDATE SET batch_id = excluded.batch_id",
          rusqlite::params![student_identifier, batch_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_zone(&self, zone_id: Uuid) -> Result<Option<GeofenceZone>> {
    let id_str = encode_uuid(zone_id);
    let raw: Option<RawZone> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ZONE_COLUMNS} FROM zones WHERE zone_id = ?1"),
            rusqlite::params![id_str],
            RawZone::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawZone::into_zone).transpose()
  }

  async fn get_presence(
    &self,
    session_id: String,
    device_fingerprint: String,
  ) -> Result<Option<PresenceRecord>> {
    let raw: Option<RawPresence> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {PRESENCE_COLUMNS} FROM presence
               WHERE session_id = ?1 AND device_fingerprint = ?2"
            ),
            rusqlite::params![session_id, device_fingerprint],
            RawPresence::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawPresence::into_record).transpose()
  }

  async fn query_presence(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<PresenceRecord>> {
    let raws: Vec<RawPresence> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawPresence::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPresence::into_record).collect()
  }
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = crate::Error;

  // ── Zones ─────────────────────────────────────────────────────────────────

  async fn add_zone(&self, zone: NewZone) -> Result<GeofenceZone> {
    zone.validate()?;
    let zone = GeofenceZone {
      zone_id:       Uuid::new_v4(),
      session_id:    zone.session_id,
      location_name: zone.location_name,
      college_name:  zone.college_name,
      latitude:      zone.latitude,
      longitude:     zone.longitude,
      radius_meters: zone.radius_meters,
      is_active:     true,
      batch_scope:   zone.batch_scope,
      created_at_ms: Utc::now().timestamp_millis(),
    };

    let row = zone.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!("INSERT INTO zones ({ZONE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
          rusqlite::params![
            encode_uuid(row.zone_id),
            row.session_id,
            row.location_name,
            row.college_name,
            row.latitude,
            row.longitude,
            row.radius_meters,
            row.is_active,
            row.batch_scope,
            row.created_at_ms,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(zone)
  }

  async fn list_zones(
    &self,
    session_id: String,
    include_inactive: bool,
  ) -> Result<Vec<GeofenceZone>> {
    let raws: Vec<RawZone> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ZONE_COLUMNS} FROM zones
           WHERE session_id = ?1 AND (?2 OR is_active)
           ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![session_id, include_inactive], RawZone::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawZone::into_zone).collect()
  }

  async fn all_active_zones(&self) -> Result<Vec<GeofenceZone>> {
    let raws: Vec<RawZone> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ZONE_COLUMNS} FROM zones WHERE is_active ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map([], RawZone::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawZone::into_zone).collect()
  }

  async fn set_zone_active(&self, zone_id: Uuid, active: bool) -> Result<Option<GeofenceZone>> {
    let id_str = encode_uuid(zone_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE zones SET is_active = ?2 WHERE zone_id = ?1",
          rusqlite::params![id_str, active],
        )?)
      })
      .await?;
    if changed == 0 {
      return Ok(None);
    }
    self.get_zone(zone_id).await
  }

  // ── Directory ─────────────────────────────────────────────────────────────

  async fn student_batch(&self, student_identifier: String) -> Result<Option<String>> {
    let batch: Option<Option<String>> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT batch_id FROM students WHERE student_identifier = ?1",
            rusqlite::params![student_identifier],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(batch.flatten())
  }

  // ── Presence ──────────────────────────────────────────────────────────────

  async fn upsert_presence(&self, update: PresenceUpdate) -> Result<PresenceRecord> {
    let session_id = update.session_id.clone();
    let device = update.device_fingerprint.clone();

    // Older heartbeats arriving late leave the fix alone but still count as
    // contact. A SUBMITTED record keeps its status and the identifier of the
    // student who submitted.
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO presence (
             session_id, device_fingerprint, student_identifier, status,
             latitude, longitude, accuracy_meters, last_seen_at, received_at,
             first_seen_at, submitted_at, is_inside_geofence, distance_meters,
             peak_speed_kmh
           ) VALUES (?1, ?2, ?3, 'ACTIVE', ?4, ?5, ?6, ?7, ?8, ?7, NULL, ?9, ?10, ?11)
           ON CONFLICT (session_id, device_fingerprint) DO UPDATE SET
             student_identifier = CASE presence.status
               WHEN 'SUBMITTED' THEN presence.student_identifier
               ELSE coalesce(excluded.student_identifier, presence.student_identifier)
             END,
             latitude           = excluded.latitude,
             longitude          = excluded.longitude,
             accuracy_meters    = excluded.accuracy_meters,
             last_seen_at       = excluded.last_seen_at,
             is_inside_geofence = excluded.is_inside_geofence,
             distance_meters    = excluded.distance_meters,
             peak_speed_kmh     = max(
               coalesce(presence.peak_speed_kmh, excluded.peak_speed_kmh),
               coalesce(excluded.peak_speed_kmh, presence.peak_speed_kmh)
             )
           WHERE excluded.last_seen_at >= presence.last_seen_at",
          rusqlite::params![
            update.session_id,
            update.device_fingerprint,
            update.student_identifier,
            update.location.point.latitude,
            update.location.point.longitude,
            update.location.accuracy_meters,
            update.seen_at_ms,
            update.received_at_ms,
            update.is_inside_geofence,
            update.distance_meters,
            update.implied_speed_kmh,
          ],
        )?;
        tx.execute(
          "UPDATE presence SET received_at = max(received_at, ?3)
           WHERE session_id = ?1 AND device_fingerprint = ?2",
          rusqlite::params![update.session_id, update.device_fingerprint, update.received_at_ms],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    match self.get_presence(session_id.clone(), device.clone()).await? {
      Some(record) => Ok(record),
      None => Err(crate::Error::Corrupt { column: "presence", value: format!("{session_id}/{device}") }),
    }
  }

  async fn mark_presence_submitted(
    &self,
    session_id: String,
    device_fingerprint: String,
    at_ms: i64,
  ) -> Result<Option<PresenceRecord>> {
    let (s, d) = (session_id.clone(), device_fingerprint.clone());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE presence SET status = 'SUBMITTED', submitted_at = ?3
           WHERE session_id = ?1 AND device_fingerprint = ?2",
          rusqlite::params![s, d, at_ms],
        )?;
        Ok(())
      })
      .await?;
    self.get_presence(session_id, device_fingerprint).await
  }

  async fn list_presence(&self, session_id: String) -> Result<Vec<PresenceRecord>> {
    self
      .query_presence(
        format!(
          "SELECT {PRESENCE_COLUMNS} FROM presence WHERE session_id = ?1
           ORDER BY received_at DESC"
        ),
        vec![session_id.into()],
      )
      .await
  }

  async fn latest_device_presence(
    &self,
    device_fingerprint: String,
  ) -> Result<Option<PresenceRecord>> {
    let mut rows = self
      .query_presence(
        format!(
          "SELECT {PRESENCE_COLUMNS} FROM presence WHERE device_fingerprint = ?1
           ORDER BY received_at DESC, last_seen_at DESC LIMIT 1"
        ),
        vec![device_fingerprint.into()],
      )
      .await?;
    Ok(rows.pop())
  }

  async fn presence_at_fix(
    &self,
    point: GeoPoint,
    exclude_device: String,
  ) -> Result<Vec<PresenceRecord>> {
    self
      .query_presence(
        format!(
          "SELECT {PRESENCE_COLUMNS} FROM presence
           WHERE round(latitude, 7) = round(?1, 7)
             AND round(longitude, 7) = round(?2, 7)
             AND device_fingerprint != ?3"
        ),
        vec![point.latitude.into(), point.longitude.into(), exclude_device.into()],
      )
      .await
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  async fn find_attendance(
    &self,
    session_id: String,
    student_identifier: String,
  ) -> Result<Option<AttendanceRecord>> {
    let raw: Option<RawAttendance> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ATTENDANCE_COLUMNS} FROM attendance
               WHERE session_id = ?1 AND student_identifier = ?2"
            ),
            rusqlite::params![session_id, student_identifier],
            RawAttendance::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawAttendance::into_record).transpose()
  }

  async fn list_attendance(&self, session_id: String) -> Result<Vec<AttendanceRecord>> {
    let raws: Vec<RawAttendance> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE session_id = ?1
           ORDER BY marked_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![session_id], RawAttendance::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAttendance::into_record).collect()
  }

  async fn commit_attendance(
    &self,
    record: AttendanceRecord,
    violations: Vec<ViolationRecord>,
  ) -> Result<CommitOutcome> {
    let (created, raw): (bool, RawAttendance) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          &format!(
            "INSERT INTO attendance ({ATTENDANCE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (session_id, student_identifier) DO NOTHING"
          ),
          rusqlite::params![
            encode_uuid(record.record_id),
            record.session_id,
            record.student_identifier,
            record.device_fingerprint,
            record.marked_at_ms,
            record.location_verified,
            record.distance_meters,
            record.risk_score,
          ],
        )?;
        if inserted == 1 {
          tx.execute(
            "UPDATE presence SET status = 'SUBMITTED', submitted_at = ?3
             WHERE session_id = ?1 AND device_fingerprint = ?2",
            rusqlite::params![record.session_id, record.device_fingerprint, record.marked_at_ms],
          )?;
          insert_violations(&tx, violations)?;
        }
        let stored = tx.query_row(
          &format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance
             WHERE session_id = ?1 AND student_identifier = ?2"
          ),
          rusqlite::params![record.session_id, record.student_identifier],
          RawAttendance::from_row,
        )?;
        tx.commit()?;
        Ok((inserted == 1, stored))
      })
      .await?;

    let stored = raw.into_record()?;
    if created {
      Ok(CommitOutcome::Created(stored))
    } else {
      tracing::debug!(
        session = %stored.session_id,
        student = %stored.student_identifier,
        "attendance insert lost to an existing record"
      );
      Ok(CommitOutcome::AlreadyMarked(stored))
    }
  }

  // ── Violations ────────────────────────────────────────────────────────────

  async fn append_violations(&self, records: Vec<ViolationRecord>) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_violations(&tx, records)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_violations(&self, query: ViolationQuery) -> Result<ViolationPage> {
    let status = query.status.map(|s| s.to_string());
    let kind = query.violation_type.map(|k| k.to_string());
    let student = query.student_identifier;
    let session = query.session_id;
    let limit = i64::try_from(query.limit.unwrap_or(DEFAULT_PAGE)).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);

    let (total, raws): (i64, Vec<RawViolation>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM violations WHERE {VIOLATION_FILTER}"),
          rusqlite::params![status, kind, student, session],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {VIOLATION_COLUMNS} FROM violations WHERE {VIOLATION_FILTER}
           ORDER BY recorded_at DESC, violation_id
           LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![status, kind, student, session, limit, offset],
            RawViolation::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(ViolationPage {
      violations: raws.into_iter().map(RawViolation::into_record).collect::<Result<_>>()?,
      total:      total as usize,
    })
  }

  async fn get_violation(&self, violation_id: Uuid) -> Result<Option<ViolationRecord>> {
    let id_str = encode_uuid(violation_id);
    let raw: Option<RawViolation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {VIOLATION_COLUMNS} FROM violations WHERE violation_id = ?1"),
            rusqlite::params![id_str],
            RawViolation::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawViolation::into_record).transpose()
  }

  async fn review_violation(
    &self,
    violation_id: Uuid,
    update: ReviewUpdate,
  ) -> Result<Option<ViolationRecord>> {
    let changed = self.bulk_review(vec![violation_id], update).await?;
    if changed == 0 {
      return Ok(None);
    }
    self.get_violation(violation_id).await
  }

  async fn bulk_review(&self, violation_ids: Vec<Uuid>, update: ReviewUpdate) -> Result<usize> {
    let status = update.status.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
          let mut stmt = tx.prepare(
            "UPDATE violations
             SET status = ?2, review_notes = ?3, reviewed_by = ?4, reviewed_at = ?5
             WHERE violation_id = ?1",
          )?;
          for id in violation_ids {
            changed += stmt.execute(rusqlite::params![
              encode_uuid(id),
              status,
              update.review_notes,
              update.reviewed_by,
              update.reviewed_at_ms,
            ])?;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed)
  }

  async fn violation_stats(&self) -> Result<ViolationStats> {
    let (by_status, by_type, recent) = self
      .conn
      .call(|conn| {
        let grouped = |sql: &str| -> rusqlite::Result<Vec<(String, i64)>> {
          let mut stmt = conn.prepare(sql)?;
          let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        };
        let by_status = grouped("SELECT status, COUNT(*) FROM violations GROUP BY status")?;
        let by_type =
          grouped("SELECT violation_type, COUNT(*) FROM violations GROUP BY violation_type")?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {VIOLATION_COLUMNS} FROM violations
           ORDER BY recorded_at DESC, violation_id LIMIT ?1"
        ))?;
        let recent = stmt
          .query_map(rusqlite::params![RECENT_VIOLATIONS], RawViolation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((by_status, by_type, recent))
      })
      .await?;

    let mut stats = ViolationStats::default();
    for (status, count) in by_status {
      stats.total += count as usize;
      stats.by_status.insert(decode_review_status(status)?, count as usize);
    }
    let mut types = BTreeMap::new();
    for (kind, count) in by_type {
      types.insert(decode_violation_type(kind)?, count as usize);
    }
    stats.by_type = types;
    stats.recent = recent.into_iter().map(RawViolation::into_record).collect::<Result<_>>()?;
    Ok(stats)
  }
}

fn insert_violations(
  conn: &rusqlite::Connection,
  records: Vec<ViolationRecord>,
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare(&format!(
    "INSERT INTO violations ({VIOLATION_COLUMNS})
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
  ))?;
  for v in records {
    stmt.execute(rusqlite::params![
      encode_uuid(v.violation_id),
      v.session_id,
      v.attendance_record_id.map(encode_uuid),
      v.student_identifier,
      v.device_fingerprint,
      v.violation_type.to_string(),
      v.risk_score,
      v.details,
      v.distance_from_geofence,
      v.latitude,
      v.longitude,
      v.accuracy_meters,
      v.status.to_string(),
      v.reviewed_by,
      v.review_notes,
      v.recorded_at_ms,
      v.reviewed_at_ms,
    ])?;
  }
  Ok(())
}

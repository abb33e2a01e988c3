//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! UUIDs are stored as hyphenated lowercase strings, enums by their wire
//! names, timestamps as epoch milliseconds.

use std::str::FromStr;

use muster_core::{
  attendance::AttendanceRecord,
  geo::GeoPoint,
  geofence::GeofenceZone,
  presence::{PresenceRecord, PresenceStatus},
  violation::{ReviewStatus, ViolationRecord, ViolationType},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Enums ───────────────────────────────────────────────────────────────────

fn decode_enum<T: FromStr>(column: &'static str, s: String) -> Result<T> {
  s.parse().map_err(|_| Error::Corrupt { column, value: s })
}

pub fn decode_presence_status(s: String) -> Result<PresenceStatus> {
  decode_enum("presence.status", s)
}

pub fn decode_violation_type(s: String) -> Result<ViolationType> {
  Ok(ViolationType::parse(&s)?)
}

pub fn decode_review_status(s: String) -> Result<ReviewStatus> {
  Ok(ReviewStatus::parse(&s)?)
}

fn decode_score(column: &'static str, v: i64) -> Result<u8> {
  u8::try_from(v).map_err(|_| Error::Corrupt { column, value: v.to_string() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ZONE_COLUMNS: &str = "zone_id, session_id, location_name, college_name, latitude, \
                                longitude, radius_meters, is_active, batch_scope, created_at";

/// Raw values read directly from a `zones` row.
pub struct RawZone {
  pub zone_id:       String,
  pub session_id:    String,
  pub location_name: String,
  pub college_name:  Option<String>,
  pub latitude:      f64,
  pub longitude:     f64,
  pub radius_meters: f64,
  pub is_active:     bool,
  pub batch_scope:   Option<String>,
  pub created_at:    i64,
}

impl RawZone {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      zone_id:       row.get(0)?,
      session_id:    row.get(1)?,
      location_name: row.get(2)?,
      college_name:  row.get(3)?,
      latitude:      row.get(4)?,
      longitude:     row.get(5)?,
      radius_meters: row.get(6)?,
      is_active:     row.get(7)?,
      batch_scope:   row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_zone(self) -> Result<GeofenceZone> {
    Ok(GeofenceZone {
      zone_id:       decode_uuid(&self.zone_id)?,
      session_id:    self.session_id,
      location_name: self.location_name,
      college_name:  self.college_name,
      latitude:      self.latitude,
      longitude:     self.longitude,
      radius_meters: self.radius_meters,
      is_active:     self.is_active,
      batch_scope:   self.batch_scope,
      created_at_ms: self.created_at,
    })
  }
}

pub const PRESENCE_COLUMNS: &str = "session_id, device_fingerprint, student_identifier, status, \
                                    latitude, longitude, accuracy_meters, last_seen_at, \
                                    received_at, first_seen_at, submitted_at, \
                                    is_inside_geofence, distance_meters, peak_speed_kmh";

/// Raw values read directly from a `presence` row.
pub struct RawPresence {
  pub session_id:         String,
  pub device_fingerprint: String,
  pub student_identifier: Option<String>,
  pub status:             String,
  pub latitude:           f64,
  pub longitude:          f64,
  pub accuracy_meters:    f64,
  pub last_seen_at:       i64,
  pub received_at:        i64,
  pub first_seen_at:      i64,
  pub submitted_at:       Option<i64>,
  pub is_inside_geofence: bool,
  pub distance_meters:    Option<f64>,
  pub peak_speed_kmh:     Option<f64>,
}

impl RawPresence {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:         row.get(0)?,
      device_fingerprint: row.get(1)?,
      student_identifier: row.get(2)?,
      status:             row.get(3)?,
      latitude:           row.get(4)?,
      longitude:          row.get(5)?,
      accuracy_meters:    row.get(6)?,
      last_seen_at:       row.get(7)?,
      received_at:        row.get(8)?,
      first_seen_at:      row.get(9)?,
      submitted_at:       row.get(10)?,
      is_inside_geofence: row.get(11)?,
      distance_meters:    row.get(12)?,
      peak_speed_kmh:     row.get(13)?,
    })
  }

  pub fn into_record(self) -> Result<PresenceRecord> {
    Ok(PresenceRecord {
      session_id:           self.session_id,
      device_fingerprint:   self.device_fingerprint,
      student_identifier:   self.student_identifier,
      status:               decode_presence_status(self.status)?,
      last_location:        GeoPoint { latitude: self.latitude, longitude: self.longitude },
      last_accuracy_meters: self.accuracy_meters,
      last_seen_at_ms:      self.last_seen_at,
      last_received_at_ms:  self.received_at,
      first_seen_at_ms:     self.first_seen_at,
      submitted_at_ms:      self.submitted_at,
      is_inside_geofence:   self.is_inside_geofence,
      distance_meters:      self.distance_meters,
      peak_speed_kmh:       self.peak_speed_kmh,
    })
  }
}

pub const ATTENDANCE_COLUMNS: &str = "record_id, session_id, student_identifier, \
                                      device_fingerprint, marked_at, location_verified, \
                                      distance_meters, risk_score";

/// Raw values read directly from an `attendance` row.
pub struct RawAttendance {
  pub record_id:          String,
  pub session_id:         String,
  pub student_identifier: String,
  pub device_fingerprint: String,
  pub marked_at:          i64,
  pub location_verified:  bool,
  pub distance_meters:    Option<f64>,
  pub risk_score:         i64,
}

impl RawAttendance {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:          row.get(0)?,
      session_id:         row.get(1)?,
      student_identifier: row.get(2)?,
      device_fingerprint: row.get(3)?,
      marked_at:          row.get(4)?,
      location_verified:  row.get(5)?,
      distance_meters:    row.get(6)?,
      risk_score:         row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
      record_id:          decode_uuid(&self.record_id)?,
      session_id:         self.session_id,
      student_identifier: self.student_identifier,
      device_fingerprint: self.device_fingerprint,
      marked_at_ms:       self.marked_at,
      location_verified:  self.location_verified,
      distance_meters:    self.distance_meters,
      risk_score:         decode_score("attendance.risk_score", self.risk_score)?,
    })
  }
}

pub const VIOLATION_COLUMNS: &str = "violation_id, session_id, attendance_record_id, \
                                     student_identifier, device_fingerprint, violation_type, \
                                     risk_score, details, distance_from_geofence, latitude, \
                                     longitude, accuracy_meters, status, reviewed_by, \
                                     review_notes, recorded_at, reviewed_at";

/// Raw values read directly from a `violations` row.
pub struct RawViolation {
  pub violation_id:           String,
  pub session_id:             String,
  pub attendance_record_id:   Option<String>,
  pub student_identifier:     String,
  pub device_fingerprint:     Option<String>,
  pub violation_type:         String,
  pub risk_score:             i64,
  pub details:                String,
  pub distance_from_geofence: Option<f64>,
  pub latitude:               Option<f64>,
  pub longitude:              Option<f64>,
  pub accuracy_meters:        Option<f64>,
  pub status:                 String,
  pub reviewed_by:            Option<String>,
  pub review_notes:           Option<String>,
  pub recorded_at:            i64,
  pub reviewed_at:            Option<i64>,
}

impl RawViolation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      violation_id:           row.get(0)?,
      session_id:             row.get(1)?,
      attendance_record_id:   row.get(2)?,
      student_identifier:     row.get(3)?,
      device_fingerprint:     row.get(4)?,
      violation_type:         row.get(5)?,
      risk_score:             row.get(6)?,
      details:                row.get(7)?,
      distance_from_geofence: row.get(8)?,
      latitude:               row.get(9)?,
      longitude:              row.get(10)?,
      accuracy_meters:        row.get(11)?,
      status:                 row.get(12)?,
      reviewed_by:            row.get(13)?,
      review_notes:           row.get(14)?,
      recorded_at:            row.get(15)?,
      reviewed_at:            row.get(16)?,
    })
  }

  pub fn into_record(self) -> Result<ViolationRecord> {
    Ok(ViolationRecord {
      violation_id:           decode_uuid(&self.violation_id)?,
      session_id:             self.session_id,
      attendance_record_id:   self
        .attendance_record_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      student_identifier:     self.student_identifier,
      device_fingerprint:     self.device_fingerprint,
      violation_type:         decode_violation_type(self.violation_type)?,
      risk_score:             decode_score("violations.risk_score", self.risk_score)?,
      details:                self.details,
      distance_from_geofence: self.distance_from_geofence,
      latitude:               self.latitude,
      longitude:              self.longitude,
      accuracy_meters:        self.accuracy_meters,
      status:                 decode_review_status(self.status)?,
      reviewed_by:            self.reviewed_by,
      review_notes:           self.review_notes,
      recorded_at_ms:         self.recorded_at,
      reviewed_at_ms:         self.reviewed_at,
    })
  }
}

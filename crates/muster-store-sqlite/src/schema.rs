//! SQL schema for the Muster SQLite store.
//!
//! Executed once at connection startup. Timestamps are epoch milliseconds.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS zones (
    zone_id       TEXT PRIMARY KEY,
    session_id    TEXT NOT NULL,
    location_name TEXT NOT NULL,
    college_name  TEXT,
    latitude      REAL NOT NULL,
    longitude     REAL NOT NULL,
    radius_meters REAL NOT NULL CHECK (radius_meters > 0),
    is_active     INTEGER NOT NULL DEFAULT 1,
    batch_scope   TEXT,
    created_at    INTEGER NOT NULL
);

-- Read-only directory used for batch-scoped zones.
CREATE TABLE IF NOT EXISTS students (
    student_identifier TEXT PRIMARY KEY,
    batch_id           TEXT
);

-- One row per (session, device). Superseded in place, never deleted by the
-- pipeline. EXPIRED is derived on read and never stored.
CREATE TABLE IF NOT EXISTS presence (
    session_id         TEXT NOT NULL,
    device_fingerprint TEXT NOT NULL,
    student_identifier TEXT,
    status             TEXT NOT NULL DEFAULT 'ACTIVE',  -- 'ACTIVE' | 'SUBMITTED'
    latitude           REAL NOT NULL,
    longitude          REAL NOT NULL,
    accuracy_meters    REAL NOT NULL,
    last_seen_at       INTEGER NOT NULL,  -- device clock; orders writes
    received_at        INTEGER NOT NULL,  -- server clock; measures silence
    first_seen_at      INTEGER NOT NULL,
    submitted_at       INTEGER,
    is_inside_geofence INTEGER NOT NULL,
    distance_meters    REAL,
    peak_speed_kmh     REAL,
    PRIMARY KEY (session_id, device_fingerprint)
);

-- Insert-once. The unique pair is the single-use guarantee.
CREATE TABLE IF NOT EXISTS attendance (
    record_id          TEXT PRIMARY KEY,
    session_id         TEXT NOT NULL,
    student_identifier TEXT NOT NULL,
    device_fingerprint TEXT NOT NULL,
    marked_at          INTEGER NOT NULL,
    location_verified  INTEGER NOT NULL,
    distance_meters    REAL,
    risk_score         INTEGER NOT NULL,
    UNIQUE (session_id, student_identifier)
);

-- Append-only apart from the review columns.
CREATE TABLE IF NOT EXISTS violations (
    violation_id           TEXT PRIMARY KEY,
    session_id             TEXT NOT NULL,
    attendance_record_id   TEXT REFERENCES attendance(record_id),
    student_identifier     TEXT NOT NULL,
    device_fingerprint     TEXT,
    violation_type         TEXT NOT NULL,
    risk_score             INTEGER NOT NULL,
    details                TEXT NOT NULL,
    distance_from_geofence REAL,
    latitude               REAL,
    longitude              REAL,
    accuracy_meters        REAL,
    status                 TEXT NOT NULL DEFAULT 'flagged',
    reviewed_by            TEXT,
    review_notes           TEXT,
    recorded_at            INTEGER NOT NULL,
    reviewed_at            INTEGER
);

CREATE INDEX IF NOT EXISTS zones_session_idx       ON zones(session_id);
CREATE INDEX IF NOT EXISTS presence_device_idx     ON presence(device_fingerprint, received_at);
CREATE INDEX IF NOT EXISTS attendance_session_idx  ON attendance(session_id);
CREATE INDEX IF NOT EXISTS violations_session_idx  ON violations(session_id);
CREATE INDEX IF NOT EXISTS violations_status_idx   ON violations(status);
CREATE INDEX IF NOT EXISTS violations_recorded_idx ON violations(recorded_at);

PRAGMA user_version = 1;
";

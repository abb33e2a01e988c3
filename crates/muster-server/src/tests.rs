//! Router tests against an in-memory store and a pinned clock.

use std::{path::PathBuf, sync::Arc};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use muster_core::{
  clock::ManualClock,
  geofence::NewZone,
  policy::{DecisionPolicy, FraudPolicy, PresencePolicy, TokenPolicy},
  store::AttendanceStore,
};
use muster_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;

const NOW: i64 = 1_700_000_000_000;

struct Fixture {
  state: AppState<SqliteStore>,
  clock: Arc<ManualClock>,
}

async fn fixture() -> Fixture {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store
    .add_zone(NewZone {
      session_id:    "cs101".into(),
      location_name: "Main Hall".into(),
      college_name:  None,
      latitude:      18.5204,
      longitude:     73.8567,
      radius_meters: 50.0,
      batch_scope:   None,
    })
    .await
    .unwrap();

  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(b"secret", &salt)
    .unwrap()
    .to_string();
  let config = ServerConfig {
    host:               "127.0.0.1".to_string(),
    port:               8080,
    base_url:           "http://localhost:8080".to_string(),
    store_path:         PathBuf::from(":memory:"),
    auth_username:      "admin".to_string(),
    auth_password_hash: hash,
    token:              TokenPolicy::default(),
    presence:           PresencePolicy::default(),
    fraud:              FraudPolicy::default(),
    policy:             DecisionPolicy::default(),
  };
  let clock = Arc::new(ManualClock::new(NOW));
  Fixture { state: AppState::new(Arc::new(store), config, clock.clone()), clock }
}

fn basic() -> String { format!("Basic {}", B64.encode("admin:secret")) }

async fn send(
  state: &AppState<SqliteStore>,
  method: &str,
  uri: &str,
  auth: bool,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::USER_AGENT, "test-agent");
  if auth {
    builder = builder.header(header::AUTHORIZATION, basic());
  }
  let req = match body {
    Some(b) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = router(state.clone()).oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

fn submission(student: &str, lat: f64, lon: f64, issued: i64) -> Value {
  json!({
    "sessionId": "cs101",
    "timestamp": issued.to_string(),
    "studentIdentifier": student,
    "latitude": lat,
    "longitude": lon,
    "accuracyMeters": 8.0,
    "deviceFingerprint": format!("dev-{student}"),
  })
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn accepted_submission_reports_distance_to_the_meter() {
  let f = fixture().await;
  let (status, body) = send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("PRN001", 18.5205, 73.8568, NOW - 5_000)),
  )
  .await;

  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["accepted"], true);
  assert_eq!(body["locationVerified"], true);
  let distance = body["distanceMeters"].as_f64().unwrap();
  assert_eq!(distance, distance.round());
  assert!((13.0..=17.0).contains(&distance), "distance was {distance}");
}

#[tokio::test]
async fn resubmission_is_idempotent() {
  let f = fixture().await;
  let sub = submission("PRN001", 18.5204, 73.8567, NOW - 5_000);
  send(&f.state, "POST", "/attendance/submit", false, Some(sub.clone())).await;
  f.clock.advance(1_000);
  let (status, body) = send(&f.state, "POST", "/attendance/submit", false, Some(sub)).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["accepted"], false);
  assert_eq!(body["reason"], "ALREADY_MARKED");

  let (_, records) = send(&f.state, "GET", "/sessions/cs101/attendance", true, None).await;
  assert_eq!(records.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn expired_token_says_so() {
  let f = fixture().await;
  let (status, body) = send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("PRN001", 18.5204, 73.8567, NOW - 121_000)),
  )
  .await;

  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["reason"], "EXPIRED_TOKEN");
  assert_eq!(body["expired"], true);
  assert!(body["hint"].as_str().unwrap().contains("Scan"));
}

#[tokio::test]
async fn numeric_and_garbage_timestamps() {
  let f = fixture().await;
  let mut sub = submission("PRN001", 18.5204, 73.8567, 0);
  sub["timestamp"] = json!(NOW - 1_000);
  let (status, _) = send(&f.state, "POST", "/attendance/submit", false, Some(sub.clone())).await;
  assert_eq!(status, StatusCode::CREATED);

  sub["studentIdentifier"] = json!("PRN002");
  sub["timestamp"] = json!("yesterday");
  let (_, body) = send(&f.state, "POST", "/attendance/submit", false, Some(sub)).await;
  assert_eq!(body["reason"], "MALFORMED_TOKEN");
  assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn missing_fix_is_location_unavailable() {
  let f = fixture().await;
  let mut sub = submission("PRN001", 0.0, 0.0, NOW - 1_000);
  sub["latitude"] = Value::Null;
  let (status, body) = send(&f.state, "POST", "/attendance/submit", false, Some(sub)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["reason"], "LOCATION_UNAVAILABLE");
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
  let f = fixture().await;
  let (status, _) = send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("PRN001", 91.0, 73.8567, NOW - 1_000)),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("   ", 18.5204, 73.8567, NOW - 1_000)),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn findings_reach_operators_but_not_the_submitter() {
  let f = fixture().await;
  // About 1.7 km away: far past the hard-block score.
  let (status, body) = send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("PRN001", 18.5300, 73.8700, NOW - 1_000)),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["reason"], "FRAUD_THRESHOLD_EXCEEDED");
  assert!(!body.to_string().contains("outside_geofence"));

  let (_, page) = send(&f.state, "GET", "/violations", true, None).await;
  assert_eq!(page["total"], 1);
  assert_eq!(page["violations"][0]["violation_type"], "outside_geofence");
}

#[tokio::test]
async fn missing_fingerprint_is_derived_from_the_request() {
  let f = fixture().await;
  let mut sub = submission("PRN001", 18.5204, 73.8567, NOW - 1_000);
  sub.as_object_mut().unwrap().remove("deviceFingerprint");
  let (status, _) = send(&f.state, "POST", "/attendance/submit", false, Some(sub)).await;
  assert_eq!(status, StatusCode::CREATED);

  let (_, records) = send(&f.state, "GET", "/sessions/cs101/attendance", true, None).await;
  assert_eq!(records[0]["device_fingerprint"].as_str().unwrap().len(), 32);
}

// ── Presence ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn heartbeat_is_acknowledged_and_shows_on_the_roster() {
  let f = fixture().await;
  let (status, _) = send(
    &f.state,
    "POST",
    "/presence/heartbeat",
    false,
    Some(json!({
      "sessionId": "cs101",
      "deviceFingerprint": "dev-a",
      "latitude": 18.5204,
      "longitude": 73.8567,
      "accuracyMeters": 6.0,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);

  let (status, roster) = send(&f.state, "GET", "/sessions/cs101/presence", true, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(roster["active_count"], 1);
  assert_eq!(roster["entries"][0]["display_status"], "ACTIVE");
}

#[tokio::test]
async fn heartbeat_with_negative_accuracy_is_rejected() {
  let f = fixture().await;
  let (status, _) = send(
    &f.state,
    "POST",
    "/presence/heartbeat",
    false,
    Some(json!({
      "sessionId": "cs101",
      "latitude": 18.5204,
      "longitude": 73.8567,
      "accuracyMeters": -1.0,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Operator surface ─────────────────────────────────────────────────────────

#[tokio::test]
async fn operator_routes_require_credentials() {
  let f = fixture().await;
  for uri in ["/violations", "/sessions/cs101/presence", "/sessions/cs101/token"] {
    let (status, _) = send(&f.state, "GET", uri, false, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
  }
}

#[tokio::test]
async fn token_endpoint_returns_a_scan_url() {
  let f = fixture().await;
  let (status, body) = send(&f.state, "GET", "/sessions/cs101/token", true, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["expires_at_ms"], NOW + 120_000);
  let url = body["scan_url"].as_str().unwrap();
  assert!(url.starts_with(&format!("http://localhost:8080/scan?session_id=cs101&timestamp={NOW}")));
}

#[tokio::test]
async fn feed_start_and_stop() {
  let f = fixture().await;
  let (status, started) = send(&f.state, "POST", "/sessions/cs101/feed", true, None).await;
  assert_eq!(status, StatusCode::OK);

  f.clock.advance(10);
  let (_, current) = send(&f.state, "GET", "/sessions/cs101/token", true, None).await;
  assert_eq!(current["token"], started["token"]);

  let (status, _) = send(&f.state, "DELETE", "/sessions/cs101/feed", true, None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = send(&f.state, "DELETE", "/sessions/cs101/feed", true, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zones_can_be_managed_and_probed() {
  let f = fixture().await;
  let (status, zone) = send(
    &f.state,
    "POST",
    "/sessions/cs101/zones",
    true,
    Some(json!({
      "location_name": "Annex",
      "latitude": 18.5300,
      "longitude": 73.8700,
      "radius_meters": 30.0,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);

  let (_, stats) = send(&f.state, "GET", "/sessions/cs101/zones/stats", true, None).await;
  assert_eq!(stats["total_fences"], 2);

  let (_, probe) = send(
    &f.state,
    "POST",
    "/geofence/validate",
    true,
    Some(json!({ "latitude": 18.5300, "longitude": 73.8700, "session_id": "cs101" })),
  )
  .await;
  assert_eq!(probe["is_within_fence"], true);
  assert_eq!(probe["zone"]["location_name"], "Annex");

  let id = zone["zone_id"].as_str().unwrap();
  let (status, off) = send(
    &f.state,
    "POST",
    &format!("/zones/{id}/active"),
    true,
    Some(json!({ "active": false })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(off["is_active"], false);

  let (_, near) = send(
    &f.state,
    "GET",
    "/geofence/nearby?latitude=18.5204&longitude=73.8567&max_distance=5000",
    true,
    None,
  )
  .await;
  assert_eq!(near.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_radius_zone_is_a_bad_request() {
  let f = fixture().await;
  let (status, _) = send(
    &f.state,
    "POST",
    "/sessions/cs101/zones",
    true,
    Some(json!({
      "location_name": "Nowhere",
      "latitude": 18.5,
      "longitude": 73.8,
      "radius_meters": 0.0,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn violations_can_be_reviewed() {
  let f = fixture().await;
  // About 100 m north of the hall: flagged, still accepted.
  send(
    &f.state,
    "POST",
    "/attendance/submit",
    false,
    Some(submission("PRN001", 18.5213, 73.8567, NOW - 1_000)),
  )
  .await;

  let (_, page) = send(&f.state, "GET", "/violations?status=flagged", true, None).await;
  assert_eq!(page["total"], 1);
  let id = page["violations"][0]["violation_id"].as_str().unwrap().to_owned();

  let (status, reviewed) = send(
    &f.state,
    "PATCH",
    &format!("/violations/{id}"),
    true,
    Some(json!({ "status": "confirmed", "review_notes": "seen in corridor" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(reviewed["status"], "confirmed");
  assert_eq!(reviewed["reviewed_by"], "admin");

  let (status, _) = send(
    &f.state,
    "POST",
    "/violations/bulk",
    true,
    Some(json!({ "violation_ids": [id], "status": "flagged" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, bulk) = send(
    &f.state,
    "POST",
    "/violations/bulk",
    true,
    Some(json!({ "violation_ids": [id], "status": "cleared" })),
  )
  .await;
  assert_eq!(bulk["updated"], 1);

  let (_, stats) = send(&f.state, "GET", "/violations/stats", true, None).await;
  assert_eq!(stats["total"], 1);
  assert_eq!(stats["by_status"]["cleared"], 1);

  let (status, _) = send(&f.state, "GET", "/violations?violation_type=ml_risk", true, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

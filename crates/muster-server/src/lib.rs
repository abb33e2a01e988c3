//! HTTP surface for Muster.
//!
//! Exposes an axum [`Router`] backed by any [`AttendanceStore`]: the public
//! submission and heartbeat endpoints, plus operator endpoints behind HTTP
//! Basic auth for tokens, live rosters, zones and violation review.

pub mod auth;
pub mod error;
pub mod events;
pub mod feed;
pub mod fingerprint;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use muster_core::{
  clock::Clock,
  pipeline::{Pipeline, PipelineConfig},
  policy::{DecisionPolicy, FraudPolicy, PresencePolicy, TokenPolicy},
  store::AttendanceStore,
  tracker::Tracker,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;
use events::Hub;
use feed::TokenFeed;
use handlers::{attendance, geofence, heartbeat, presence, submit, token, violations};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MUSTER__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  /// Public origin embedded in scan URLs.
  pub base_url:           String,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub token:              TokenPolicy,
  #[serde(default)]
  pub presence:           PresencePolicy,
  #[serde(default)]
  pub fraud:              FraudPolicy,
  #[serde(default)]
  pub policy:             DecisionPolicy,
}

impl ServerConfig {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      token:    self.token.clone(),
      presence: self.presence.clone(),
      fraud:    self.fraud.clone(),
      policy:   self.policy.clone(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: AttendanceStore> {
  pub store:    Arc<S>,
  pub config:   Arc<ServerConfig>,
  pub auth:     Arc<AuthConfig>,
  pub pipeline: Arc<Pipeline<S>>,
  pub hub:      Hub,
  pub feed:     TokenFeed,
}

impl<S: AttendanceStore> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
    let hub = Hub::default();
    let pipeline = Pipeline::new(store.clone(), clock.clone(), config.pipeline_config());
    let feed = TokenFeed::new(hub.clone(), clock, config.token.clone(), config.base_url.clone());
    Self {
      store,
      auth: Arc::new(AuthConfig {
        username:      config.auth_username.clone(),
        password_hash: config.auth_password_hash.clone(),
      }),
      config: Arc::new(config),
      pipeline: Arc::new(pipeline),
      hub,
      feed,
    }
  }

  pub fn tracker(&self) -> &Tracker<S> { self.pipeline.tracker() }

  pub fn now_ms(&self) -> i64 { self.pipeline.clock().now_ms() }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Muster server.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AttendanceStore + Clone + 'static,
{
  Router::new()
    // Public
    .route("/attendance/submit",           post(submit::handler::<S>))
    .route("/presence/heartbeat",          post(heartbeat::handler::<S>))
    // Sessions
    .route("/sessions/{id}/token",         get(token::current::<S>))
    .route("/sessions/{id}/feed",          post(token::start::<S>).delete(token::stop::<S>))
    .route("/sessions/{id}/presence",      get(presence::roster::<S>))
    .route("/sessions/{id}/events",        get(presence::events::<S>))
    .route("/sessions/{id}/attendance",    get(attendance::list::<S>))
    // Geofences
    .route("/sessions/{id}/zones",         get(geofence::list::<S>).post(geofence::create::<S>))
    .route("/sessions/{id}/zones/stats",   get(geofence::stats::<S>))
    .route("/zones/{id}/active",           post(geofence::set_active::<S>))
    .route("/geofence/validate",           post(geofence::validate::<S>))
    .route("/geofence/nearby",             get(geofence::nearby::<S>))
    // Violations
    .route("/violations",                  get(violations::list::<S>))
    .route("/violations/stats",            get(violations::stats::<S>))
    .route("/violations/bulk",             post(violations::bulk::<S>))
    .route("/violations/{id}",             get(violations::get_one::<S>).patch(violations::update::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;

//! The token issuance feed.
//!
//! While a feed runs for a session, a background task mints a fresh token
//! every TTL and publishes it as a `token_issued` event for the display.
//! Validation never consults this state: a token stays valid for its TTL
//! whether or not a newer one has been minted.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use muster_core::{
  clock::Clock, event::LiveEvent, policy::TokenPolicy, token::SessionToken,
};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::events::Hub;

/// A token as handed to a display: the token, the URL to encode, and when it
/// stops being accepted.
#[derive(Debug, Clone, Serialize)]
pub struct TokenIssue {
  pub token:         SessionToken,
  pub scan_url:      String,
  pub expires_at_ms: i64,
}

struct Running {
  latest: SessionToken,
  task:   JoinHandle<()>,
}

#[derive(Clone)]
pub struct TokenFeed {
  running:  Arc<Mutex<HashMap<String, Running>>>,
  hub:      Hub,
  clock:    Arc<dyn Clock>,
  policy:   TokenPolicy,
  base_url: String,
}

impl TokenFeed {
  pub fn new(hub: Hub, clock: Arc<dyn Clock>, policy: TokenPolicy, base_url: String) -> Self {
    Self { running: Arc::default(), hub, clock, policy, base_url }
  }

  fn issue_of(&self, token: SessionToken) -> TokenIssue {
    TokenIssue {
      scan_url:      token.scan_url(&self.base_url),
      expires_at_ms: token.expires_at_ms(&self.policy),
      token,
    }
  }

  fn announce(&self, token: &SessionToken) {
    let issue = self.issue_of(token.clone());
    self.hub.publish(LiveEvent::TokenIssued {
      token:         issue.token,
      scan_url:      issue.scan_url,
      expires_at_ms: issue.expires_at_ms,
    });
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Running>> {
    // A panic while holding the lock cannot leave the map half-updated.
    self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn is_running(&self, session_id: &str) -> bool { self.lock().contains_key(session_id) }

  /// The token currently on display, or a freshly minted one when no feed
  /// runs. Minting here stores nothing.
  pub fn current(&self, session_id: &str) -> TokenIssue {
    let latest = self.lock().get(session_id).map(|r| r.latest.clone());
    let token = latest.unwrap_or_else(|| SessionToken::mint(session_id, self.clock.now_ms()));
    self.issue_of(token)
  }

  /// Start the periodic issuer. Idempotent: a running feed is left alone.
  pub fn start(&self, session_id: &str) -> TokenIssue {
    let mut running = self.lock();
    if let Some(r) = running.get(session_id) {
      return self.issue_of(r.latest.clone());
    }

    let first = SessionToken::mint(session_id, self.clock.now_ms());
    self.announce(&first);

    let task = tokio::spawn(self.clone().rotate(session_id.to_owned()));
    running.insert(session_id.to_owned(), Running { latest: first.clone(), task });
    tracing::info!(session = %session_id, "token feed started");
    self.issue_of(first)
  }

  /// Stop the issuer. Returns whether one was running.
  pub fn stop(&self, session_id: &str) -> bool {
    // Dropping the entry aborts its task.
    let stopped = self.lock().remove(session_id).is_some();
    if stopped {
      tracing::info!(session = %session_id, "token feed stopped");
    }
    stopped
  }

  async fn rotate(self, session_id: String) {
    let period = Duration::from_millis(self.policy.ttl_ms.max(1) as u64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; `start` already minted for it.
    ticker.tick().await;

    loop {
      ticker.tick().await;
      let token = SessionToken::mint(session_id.as_str(), self.clock.now_ms());
      {
        let mut running = self.lock();
        let Some(entry) = running.get_mut(&session_id) else { return };
        entry.latest = token.clone();
      }
      tracing::debug!(session = %session_id, issued_at = token.issued_at_ms, "token rotated");
      self.announce(&token);
    }
  }
}

impl Drop for Running {
  fn drop(&mut self) { self.task.abort(); }
}

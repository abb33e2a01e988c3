//! Session scan tokens.
//!
//! A token is `{session_id, issued_at_ms, nonce}` and is valid only while
//! `now - issued_at_ms <= ttl`. Validation is a pure function of elapsed time,
//! so no "current token" needs to be shared between server instances: minting
//! a newer token does not have to revoke anything, the older one simply ages
//! out. Single use per (session, student) is enforced by the attendance
//! store's uniqueness constraint, not here.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

use crate::policy::TokenPolicy;

/// A freshly minted scan token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
  pub session_id:   String,
  pub issued_at_ms: i64,
  pub nonce:        String,
}

impl SessionToken {
  /// Mint a token for `session_id` at `now_ms` with a random 64-bit nonce.
  pub fn mint(session_id: impl Into<String>, now_ms: i64) -> Self {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    Self {
      session_id:   session_id.into(),
      issued_at_ms: now_ms,
      nonce:        hex::encode(bytes),
    }
  }

  pub fn expires_at_ms(&self, policy: &TokenPolicy) -> i64 {
    self.issued_at_ms + policy.ttl_ms
  }

  /// The URL a scannable code should embed.
  pub fn scan_url(&self, base_url: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
      .append_pair("session_id", &self.session_id)
      .append_pair("timestamp", &self.issued_at_ms.to_string())
      .append_pair("nonce", &self.nonce)
      .finish();
    format!("{}/scan?{query}", base_url.trim_end_matches('/'))
  }
}

/// Why a presented token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
  #[error("token is missing {0}")]
  MissingField(&'static str),

  #[error("token timestamp {0:?} is not a positive integer")]
  BadTimestamp(String),

  #[error("token was issued {ahead_ms} ms in the future")]
  FromTheFuture { ahead_ms: i64 },

  #[error("token expired {overdue_ms} ms ago")]
  Expired { overdue_ms: i64 },
}

impl TokenRejection {
  /// Expiry calls for a rescan; everything else points at a broken code or a
  /// tampered device clock.
  pub fn is_expired(&self) -> bool { matches!(self, Self::Expired { .. }) }
}

/// A token that passed validation at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidToken {
  pub session_id:   String,
  pub issued_at_ms: i64,
  pub age_ms:       i64,
  pub remaining_ms: i64,
}

/// Validate the raw `session_id` / `timestamp` pair carried by a scanned code.
///
/// Checks run in order: required fields, positive integer timestamp, not
/// further in the future than the skew tolerance, age within the TTL
/// (inclusive).
pub fn validate(
  policy: &TokenPolicy,
  session_id: Option<&str>,
  timestamp: Option<&str>,
  now_ms: i64,
) -> Result<ValidToken, TokenRejection> {
  let session_id = session_id
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(TokenRejection::MissingField("session_id"))?;
  let raw = timestamp
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(TokenRejection::MissingField("timestamp"))?;

  let issued_at_ms: i64 = raw
    .parse()
    .ok()
    .filter(|v: &i64| *v > 0)
    .ok_or_else(|| TokenRejection::BadTimestamp(raw.to_owned()))?;

  let age_ms = now_ms - issued_at_ms;
  if -age_ms > policy.clock_skew_ms {
    return Err(TokenRejection::FromTheFuture { ahead_ms: -age_ms });
  }
  if age_ms > policy.ttl_ms {
    return Err(TokenRejection::Expired { overdue_ms: age_ms - policy.ttl_ms });
  }

  Ok(ValidToken {
    session_id: session_id.to_owned(),
    issued_at_ms,
    age_ms,
    remaining_ms: (policy.ttl_ms - age_ms).min(policy.ttl_ms),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const NOW: i64 = 1_700_000_000_000;

  fn check(ts: &str) -> Result<ValidToken, TokenRejection> {
    validate(&TokenPolicy::default(), Some("s1"), Some(ts), NOW)
  }

  #[test]
  fn boundary_is_inclusive_at_ttl() {
    assert!(check(&(NOW - 119_000).to_string()).is_ok());
    assert!(check(&(NOW - 120_000).to_string()).is_ok());
    let err = check(&(NOW - 121_000).to_string()).unwrap_err();
    assert!(err.is_expired());
    assert_eq!(err, TokenRejection::Expired { overdue_ms: 1_000 });
  }

  #[test]
  fn small_forward_skew_is_tolerated() {
    assert!(check(&(NOW + 5_000).to_string()).is_ok());
    let err = check(&(NOW + 5_001).to_string()).unwrap_err();
    assert!(matches!(err, TokenRejection::FromTheFuture { ahead_ms: 5_001 }));
    assert!(!err.is_expired());
  }

  #[test]
  fn garbage_timestamps_are_malformed_not_expired() {
    for ts in ["abc", "0", "-5", "12.5", "1e12"] {
      let err = check(ts).unwrap_err();
      assert!(matches!(err, TokenRejection::BadTimestamp(_)), "{ts}: {err:?}");
    }
  }

  #[test]
  fn missing_fields_come_first() {
    let p = TokenPolicy::default();
    assert_eq!(
      validate(&p, None, Some("abc"), NOW).unwrap_err(),
      TokenRejection::MissingField("session_id")
    );
    assert_eq!(
      validate(&p, Some("s1"), None, NOW).unwrap_err(),
      TokenRejection::MissingField("timestamp")
    );
    assert_eq!(
      validate(&p, Some("s1"), Some("  "), NOW).unwrap_err(),
      TokenRejection::MissingField("timestamp")
    );
  }

  #[test]
  fn remaining_time_counts_down() {
    let ok = check(&(NOW - 30_000).to_string()).unwrap();
    assert_eq!(ok.age_ms, 30_000);
    assert_eq!(ok.remaining_ms, 90_000);
  }

  #[test]
  fn minted_tokens_validate_and_carry_distinct_nonces() {
    let p = TokenPolicy::default();
    let a = SessionToken::mint("s1", NOW);
    let b = SessionToken::mint("s1", NOW);
    assert_ne!(a.nonce, b.nonce);
    assert_eq!(a.expires_at_ms(&p), NOW + 120_000);
    let ts = a.issued_at_ms.to_string();
    assert!(validate(&p, Some(&a.session_id), Some(&ts), NOW + 60_000).is_ok());
  }

  #[test]
  fn scan_url_embeds_query_parameters() {
    let t = SessionToken {
      session_id:   "cs 101/a".into(),
      issued_at_ms: NOW,
      nonce:        "ab12".into(),
    };
    assert_eq!(
      t.scan_url("https://muster.example/"),
      format!("https://muster.example/scan?session_id=cs+101%2Fa&timestamp={NOW}&nonce=ab12")
    );
  }
}

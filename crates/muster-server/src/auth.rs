//! Operator authentication.
//!
//! Review, geofence and token endpoints sit behind a single operator account
//! checked with HTTP Basic credentials against an argon2 PHC hash from the
//! server config. Student-facing endpoints (submit, heartbeat) take no
//! credentials.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use muster_core::store::AttendanceStore;

use crate::{AppState, error::ApiError};

/// The operator account this server accepts.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// A username and password lifted from an `Authorization: Basic` header.
#[derive(Debug, PartialEq, Eq)]
struct BasicCredentials {
  username: String,
  password: String,
}

impl BasicCredentials {
  /// `None` for a missing header, another scheme, or an undecodable value.
  fn from_headers(headers: &HeaderMap) -> Option<Self> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, payload) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
      return None;
    }
    let raw = String::from_utf8(STANDARD.decode(payload.trim()).ok()?).ok()?;
    let (username, password) = raw.split_once(':')?;
    Some(Self { username: username.to_owned(), password: password.to_owned() })
  }
}

impl AuthConfig {
  fn accepts(&self, creds: &BasicCredentials) -> bool {
    if creds.username != self.username {
      return false;
    }
    let Ok(hash) = PasswordHash::new(&self.password_hash) else {
      tracing::error!("configured operator password hash is not a PHC string");
      return false;
    };
    Argon2::default().verify_password(creds.password.as_bytes(), &hash).is_ok()
  }

  /// The operator named by `headers`, if their credentials check out.
  pub fn authenticate(&self, headers: &HeaderMap) -> Result<Operator, ApiError> {
    match BasicCredentials::from_headers(headers) {
      Some(creds) if self.accepts(&creds) => Ok(Operator(creds.username)),
      Some(creds) => {
        tracing::debug!(username = %creds.username, "operator credentials refused");
        Err(ApiError::Unauthorized)
      }
      None => Err(ApiError::Unauthorized),
    }
  }
}

/// An authenticated operator. The name is written into review decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl<S> FromRequestParts<AppState<S>> for Operator
where
  S: AttendanceStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self, ApiError> {
    state.auth.authenticate(&parts.headers)
  }
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::HeaderValue;
  use rand_core::OsRng;

  use super::*;

  fn operator_account(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash =
      Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string();
    AuthConfig { username: "registrar".into(), password_hash }
  }

  fn authorization(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  fn basic(user: &str, pass: &str) -> HeaderMap {
    authorization(&format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
  }

  #[test]
  fn registrar_is_recognised() {
    let account = operator_account("hunter2");
    let operator = account.authenticate(&basic("registrar", "hunter2")).unwrap();
    assert_eq!(operator, Operator("registrar".into()));
  }

  #[test]
  fn scheme_name_is_case_insensitive() {
    let account = operator_account("hunter2");
    let value = format!("basic {}", STANDARD.encode("registrar:hunter2"));
    assert!(account.authenticate(&authorization(&value)).is_ok());
  }

  #[test]
  fn password_may_contain_colons() {
    let account = operator_account("a:b:c");
    assert!(account.authenticate(&basic("registrar", "a:b:c")).is_ok());
  }

  #[test]
  fn refusals_are_all_unauthorized() {
    let account = operator_account("hunter2");
    let refused = [
      basic("registrar", "hunter3"),
      basic("student", "hunter2"),
      authorization("Bearer abc"),
      authorization("Basic !!!"),
      HeaderMap::new(),
    ];
    for headers in refused {
      assert!(matches!(account.authenticate(&headers), Err(ApiError::Unauthorized)));
    }
  }

  #[test]
  fn unusable_configured_hash_refuses_everyone() {
    let account = AuthConfig { username: "registrar".into(), password_hash: "plain".into() };
    assert!(account.authenticate(&basic("registrar", "plain")).is_err());
  }
}

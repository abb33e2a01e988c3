//! Server-side device fingerprint fallback.
//!
//! When a client sends no fingerprint, one is derived from request metadata.
//! It is trivially spoofable and only ever feeds the risk score.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, header, request::Parts},
};
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 32;

/// Request metadata that identifies a device loosely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHints {
  pub user_agent:      String,
  pub client_ip:       String,
  pub accept_language: String,
}

impl DeviceHints {
  pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
    let text = |name: header::HeaderName| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
    };
    let forwarded = headers
      .get("x-forwarded-for")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(|ip| ip.trim().to_owned());
    Self {
      user_agent:      text(header::USER_AGENT),
      client_ip:       forwarded
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_default(),
      accept_language: text(header::ACCEPT_LANGUAGE),
    }
  }

  /// First 32 hex characters of SHA-256 over `ua|ip|lang`.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(self.client_ip.as_bytes());
    hasher.update(b"|");
    hasher.update(self.accept_language.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
  }

  /// The client-supplied fingerprint if non-blank, else the derived one.
  pub fn resolve(&self, supplied: Option<String>) -> String {
    supplied
      .map(|s| s.trim().to_owned())
      .filter(|s| !s.is_empty())
      .unwrap_or_else(|| self.fingerprint())
  }
}

impl<S: Send + Sync> FromRequestParts<S> for DeviceHints {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let peer = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| *addr);
    Ok(Self::from_headers(&parts.headers, peer))
  }
}

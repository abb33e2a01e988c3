//! Error types for `muster-core`.

use thiserror::Error;

/// Input that was rejected before reaching any engine.
#[derive(Debug, Error)]
pub enum Error {
  #[error("latitude {0} is out of range or not finite")]
  InvalidLatitude(f64),

  #[error("longitude {0} is out of range or not finite")]
  InvalidLongitude(f64),

  #[error("accuracy {0} must be a finite, non-negative number of meters")]
  InvalidAccuracy(f64),

  #[error("zone radius {0} must be a finite, positive number of meters")]
  InvalidRadius(f64),

  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("unknown violation type: {0:?}")]
  UnknownViolationType(String),

  #[error("unknown review status: {0:?}")]
  UnknownReviewStatus(String),

  #[error("cannot bulk-transition violations back to {0}")]
  InvalidBulkStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

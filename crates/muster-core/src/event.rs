//! Live events pushed to instructor dashboards.

use serde::{Deserialize, Serialize};

use crate::{
  attendance::AttendanceRecord, presence::PresenceRecord, token::SessionToken,
  violation::ViolationRecord,
};

/// One change a dashboard may want to render without polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
  TokenIssued {
    token:         SessionToken,
    scan_url:      String,
    expires_at_ms: i64,
  },
  PresenceUpdated {
    record: PresenceRecord,
  },
  AttendanceMarked {
    record: AttendanceRecord,
  },
  ViolationFlagged {
    violation: ViolationRecord,
  },
}

impl LiveEvent {
  pub fn session_id(&self) -> &str {
    match self {
      Self::TokenIssued { token, .. } => &token.session_id,
      Self::PresenceUpdated { record } => &record.session_id,
      Self::AttendanceMarked { record } => &record.session_id,
      Self::ViolationFlagged { violation } => &violation.session_id,
    }
  }

  /// The SSE event name.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::TokenIssued { .. } => "token_issued",
      Self::PresenceUpdated { .. } => "presence_updated",
      Self::AttendanceMarked { .. } => "attendance_marked",
      Self::ViolationFlagged { .. } => "violation_flagged",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn events_are_tagged_by_kind() {
    let token = SessionToken::mint("cs101", 1_000);
    let event = LiveEvent::TokenIssued {
      scan_url:      token.scan_url("https://muster.example"),
      expires_at_ms: 121_000,
      token,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.kind());
    assert_eq!(event.session_id(), "cs101");
  }
}

//! Publish/subscribe hub for live dashboard events.
//!
//! Every event goes through one [`tokio::sync::broadcast`] channel; each SSE
//! subscriber filters for its own session. A slow subscriber loses the oldest
//! events rather than holding up publishers.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::Stream;
use muster_core::event::LiveEvent;
use tokio::sync::broadcast::{self, error::RecvError};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Hub {
  tx: broadcast::Sender<LiveEvent>,
}

impl Default for Hub {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl Hub {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  /// Fan an event out to current subscribers. Having none is not an error.
  pub fn publish(&self, event: LiveEvent) {
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> { self.tx.subscribe() }

  /// An SSE stream of the events for one session.
  pub fn session_stream(
    &self,
    session_id: String,
  ) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static + use<> {
    futures::stream::unfold((self.subscribe(), session_id), |(mut rx, session_id)| async move {
      loop {
        match rx.recv().await {
          Ok(event) if event.session_id() == session_id => {
            let Some(sse) = to_sse(&event) else { continue };
            return Some((Ok(sse), (rx, session_id)));
          }
          Ok(_) => continue,
          Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(session = %session_id, skipped, "live event subscriber lagged");
          }
          Err(RecvError::Closed) => return None,
        }
      }
    })
  }
}

fn to_sse(event: &LiveEvent) -> Option<Event> {
  match Event::default().event(event.kind()).json_data(event) {
    Ok(sse) => Some(sse),
    Err(e) => {
      tracing::error!(error = %e, kind = event.kind(), "failed to encode live event");
      None
    }
  }
}

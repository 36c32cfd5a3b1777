//! Delivery of streamed text to the front end.
//!
//! The conversation loop pushes deltas into an unbounded channel and never
//! waits on the consumer.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// New text; empty after a tool-only iteration.
    pub fragment: String,
    /// Everything streamed so far in the turn.
    pub full_text: String,
}

#[derive(Debug, Clone)]
pub struct DeltaRelay {
    tx: UnboundedSender<Delta>,
}

impl DeltaRelay {
    pub fn channel() -> (Self, UnboundedReceiver<Delta>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Drain deltas into `consumer` on a spawned task. The task ends once
    /// every clone of the relay is dropped.
    pub fn spawn<F>(mut consumer: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut(Delta) + Send + 'static,
    {
        let (relay, mut rx) = Self::channel();
        let handle = tokio::spawn(async move {
            while let Some(delta) = rx.recv().await {
                consumer(delta);
            }
        });
        (relay, handle)
    }

    /// Non-blocking; a gone consumer is ignored.
    pub fn send(&self, fragment: &str, full_text: &str) {
        let _ = self.tx.send(Delta {
            fragment: fragment.to_string(),
            full_text: full_text.to_string(),
        });
    }
}

/*!
 * Session progress events.
 *
 * Background work publishes immutable snapshots on an unbounded channel.
 * The core never depends on anyone listening: a missing or closed receiver
 * is ignored.
 */

use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::dispatcher::DispatchOutcome;
use crate::fixer::report::{FixResult, FixSummary};

/// Snapshot published while a session runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// First pass admitted its work
    DispatchStarted { total: usize },
    /// One first-pass task ended
    ItemFinished {
        item_id: String,
        outcome: DispatchOutcome,
        completed: usize,
        total: usize,
    },
    /// First pass ended
    DispatchFinished {
        translated: usize,
        failed: usize,
        skipped: usize,
    },
    /// Repair pass started
    FixStarted { total: usize },
    /// One repair ended
    FixProgress {
        result: Box<FixResult>,
        completed: usize,
        total: usize,
    },
    /// Repair pass ended
    FixFinished { summary: FixSummary },
}

/// Optional sending side of the event channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// Sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Publish an event; never fails
    pub fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

/// Create a connected sink and receiver
pub fn channel() -> (EventSink, UnboundedReceiver<SessionEvent>) {
    let (sender, receiver) = unbounded_channel();
    (EventSink::new(sender), receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_shouldDeliverToReceiver() {
        let (sink, mut receiver) = channel();
        sink.emit(SessionEvent::FixStarted { total: 3 });
        assert_eq!(receiver.try_recv().unwrap(), SessionEvent::FixStarted { total: 3 });
    }

    #[test]
    fn test_emit_withoutReceiver_shouldNotFail() {
        let (sink, receiver) = channel();
        drop(receiver);
        sink.emit(SessionEvent::DispatchStarted { total: 1 });
        EventSink::disabled().emit(SessionEvent::DispatchStarted { total: 1 });
    }
}

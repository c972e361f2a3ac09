// Status channel between a running task and whoever is listening

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Free-form notification emitted while a task runs or when it ends badly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum TaskEvent {
    /// Percentage of work done, 0..=100, never decreasing within one run.
    Progress(u8),
    Message(String),
    Failed(String),
    Cancelled,
}

/// Narrow capability a caller hands to a task to hear back from it.
///
/// Both methods are called from the worker thread. Implementations that
/// drive a UI must marshal onto the UI thread themselves.
pub trait StatusChannel: Send + Sync {
    /// Called exactly once per execution, after the task reached a terminal state.
    fn done(&self);

    fn notify(&self, event: TaskEvent);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "event", rename_all = "camelCase")]
pub enum ListenerMessage {
    Event(TaskEvent),
    Done,
}

/// Status channel that forwards everything into an unbounded queue, so the
/// receiving side can drain it on whichever thread it owns.
#[derive(Clone)]
pub struct ChannelListener {
    tx: UnboundedSender<ListenerMessage>,
}

impl ChannelListener {
    pub fn new() -> (Self, UnboundedReceiver<ListenerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusChannel for ChannelListener {
    fn done(&self) {
        // Receiver gone means nobody cares any more
        let _ = self.tx.send(ListenerMessage::Done);
    }

    fn notify(&self, event: TaskEvent) {
        let _ = self.tx.send(ListenerMessage::Event(event));
    }
}

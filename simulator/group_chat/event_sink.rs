//! Event collection for the scenario runner

use crossbeam::channel::Sender;

use gr_rust::{EventSink, SessionEvent};

/// Sink that forwards every session event to the runner's collector. Each
/// session thread owns one clone; the collector validates and prints after
/// all sessions join (the validation role of the original log consumer).
pub struct ChannelSink {
    tx: Sender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn log(&mut self, event: SessionEvent) {
        // Collector gone means the run is being torn down; drop silently.
        let _ = self.tx.send(event);
    }
}

//! Event fan-out from ingest workers.
//!
//! Every worker sends through a clone of one [`EventSender`]. The queue is
//! unbounded so a slow sink never stalls a copy; a run nobody listens to
//! drops events as they are sent.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Cloneable handle the scanner and workers send through
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Forward an event. Without a receiver it is discarded.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// The sink's end of a run's event channel
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone and the queue is drained
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    /// Events in arrival order, ending when the run drops its senders
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Constructor for a run's event channel
pub struct EventChannel;

impl EventChannel {
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender for runs without a sink
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

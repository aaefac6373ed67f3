// src/runtime/bus.rs

//! Fire-and-forget message bus.
//!
//! Page automation and the UI send to the coordinator's inbox; the
//! coordinator publishes status to whoever subscribed. Neither direction
//! blocks or fails: a closed inbox or an outbox without subscribers drops the
//! message. Ordering holds per sender only.

use tokio::sync::{broadcast, mpsc};

use crate::models::{Envelope, Message, Origin};

const OUTBOX_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbox: mpsc::UnboundedSender<Envelope>,
    outbox: broadcast::Sender<Message>,
}

impl EventBus {
    /// A bus and the coordinator's end of its inbox.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let (outbox, _) = broadcast::channel(OUTBOX_CAPACITY);
        (Self { inbox, outbox }, receiver)
    }

    /// To the coordinator.
    pub fn send(&self, message: Message, origin: Origin) {
        let action = message.action();
        if self.inbox.send(Envelope::new(message, origin)).is_err() {
            log::debug!("Coordinator gone, dropped {}", action);
        }
    }

    /// To the UI.
    pub fn publish(&self, message: Message) {
        let action = message.action();
        if self.outbox.send(message).is_err() {
            log::debug!("No listener for {}", action);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.outbox.subscribe()
    }
}

// src/runtime/mod.rs

//! Message-driven runtime.
//!
//! [`Runtime::start`] wires the stores, the dispatcher and the periodic
//! trigger around one coordinator task. Callers talk to it only through
//! messages: [`Runtime::send`] in, [`Runtime::subscribe`] out.

pub mod bus;
pub mod coordinator;
pub mod dispatcher;
pub mod host;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{Config, Message, Origin};
use crate::notify::Notifier;
use crate::storage::KvStore;
use crate::surface::Browser;

// Re-export for convenience
pub use bus::EventBus;
pub use coordinator::Coordinator;
pub use dispatcher::{Dispatch, Dispatcher, PageKind, classify};
pub use scheduler::{Scheduler, run_scheduled};

pub struct Runtime {
    bus: EventBus,
    coordinator: JoinHandle<()>,
}

impl Runtime {
    pub async fn start(
        config: Config,
        browser: Arc<dyn Browser>,
        kv: Arc<dyn KvStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let (bus, inbox) = EventBus::new();
        let mut coordinator = Coordinator::new(Arc::new(config), browser, kv, notifier, bus.clone());
        coordinator.restore_schedule().await?;
        let coordinator = tokio::spawn(coordinator.run(inbox));
        Ok(Self { bus, coordinator })
    }

    /// Send as the UI.
    pub fn send(&self, message: Message) {
        self.bus.send(message, Origin::Ui);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn shutdown(self) {
        self.coordinator.abort();
        let _ = self.coordinator.await;
        log::debug!("Runtime shut down");
    }
}

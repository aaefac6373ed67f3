// src/runtime/host.rs

//! Per-surface load loop.
//!
//! Stands in for a content script: every completed document load of the
//! surface invokes the dispatcher once, in load order. A load that completes
//! while the previous one is still being handled is picked up afterwards;
//! intermediate loads superseded by a newer one are skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use super::dispatcher::{Dispatch, Dispatcher};
use crate::steps::StepOutcome;
use crate::surface::Surface;

/// A running load loop. Aborted on drop.
pub struct Host {
    handle: JoinHandle<()>,
    orphaned: Arc<AtomicBool>,
}

impl Host {
    /// The loop stopped without handing its task's outcome to the
    /// coordinator, so no results or error step will follow.
    pub fn is_orphaned(&self) -> bool {
        self.orphaned.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn spawn(surface: Arc<dyn Surface>, dispatcher: Arc<Dispatcher>, task_id: u64) -> Host {
    let orphaned = Arc::new(AtomicBool::new(false));
    let handle = tokio::spawn(run(surface, dispatcher, task_id, orphaned.clone()));
    Host { handle, orphaned }
}

async fn run(surface: Arc<dyn Surface>, dispatcher: Arc<Dispatcher>, task_id: u64, orphaned: Arc<AtomicBool>) {
    let mut loads = surface.loads();
    let mut last_seq = 0;
    // Reported and Aborted runs have sent their message; everything else
    // that stops the loop leaves the coordinator waiting.
    let reported = loop {
        let current = loads.borrow_and_update().clone();
        if let Some(load) = current.filter(|l| l.seq > last_seq) {
            last_seq = load.seq;
            match dispatcher.on_page_load(surface.clone(), &load, task_id).await {
                Ok(Dispatch::Idle) => break false,
                Ok(Dispatch::Ran(_, outcome)) if outcome.ends_run() => {
                    break !matches!(outcome, StepOutcome::Superseded);
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("Surface {} stopped: {}", surface.id(), e);
                    break false;
                }
            }
        }
        if loads.changed().await.is_err() {
            break false;
        }
    };
    if !reported {
        orphaned.store(true, Ordering::Release);
    }
    log::debug!("Host for surface {} finished (task {})", surface.id(), task_id);
}

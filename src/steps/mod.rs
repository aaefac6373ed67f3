//! Step executors.
//!
//! One procedure per page of the reservation flow. Each runs against a single
//! document load, reads the task's criteria, drives the resolver and decides
//! what comes next. Executors are re-run whenever the same page reloads, so
//! every page mutation checks the current state first and the final page
//! action is claimed on the task before it is performed.

pub mod calendar;
pub mod dictionary;
pub mod facility;
pub mod home;
pub mod login;
pub mod scan;
pub mod timeslot;

use crate::dom::{ElementHandle, Page};
use crate::error::Result;
use crate::locale::{Catalog, Text};
use crate::models::{Claim, Message, Origin, SearchCriteria, Step, Task, TimingConfig};
use crate::runtime::bus::EventBus;
use crate::storage::{Settings, TaskStore};

/// What an executor did with its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The page action leading to `Step` was performed
    Advanced(Step),
    /// Availability was reported with this many slots
    Reported(usize),
    /// Unrecoverable for this task; carries the user-facing status
    Aborted(String),
    /// Nothing to do until the user acts on the page
    AwaitingUser,
    /// The task was replaced or cleared while running
    Superseded,
    /// This load's action was already claimed by an earlier run
    Skipped,
}

impl StepOutcome {
    /// Whether the surface's task is over after this outcome.
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            StepOutcome::Reported(_) | StepOutcome::Aborted(_) | StepOutcome::Superseded
        )
    }
}

/// Everything an executor may touch.
pub struct StepContext {
    pub page: Page,
    pub task: Task,
    pub tasks: TaskStore,
    pub settings: Settings,
    pub catalog: Catalog,
    bus: EventBus,
}

impl StepContext {
    pub fn new(page: Page, task: Task, tasks: TaskStore, settings: Settings, bus: EventBus) -> Self {
        let catalog = Catalog::new(settings.language);
        Self {
            page,
            task,
            tasks,
            settings,
            catalog,
            bus,
        }
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.task.parameters
    }

    pub fn timing(&self) -> &TimingConfig {
        self.page.timing()
    }

    pub fn send(&self, message: Message) {
        self.bus.send(message, Origin::Surface(self.page.surface_id()));
    }

    /// Progress line for the UI.
    pub fn report(&self, step: Step, key: Text) {
        self.send(Message::StepComplete {
            step,
            status_text: self.catalog.text(key).to_string(),
        });
    }

    pub async fn claim(&self, step: Step) -> Result<Claim> {
        self.tasks
            .claim(self.task.id, step, self.page.load_id())
            .await
    }

    /// Claim `step` on this load, then click `target`.
    pub async fn commit(&self, step: Step, target: &ElementHandle) -> Result<StepOutcome> {
        match self.claim(step).await? {
            Claim::Granted => {
                self.page.click(target).await?;
                log::info!("Task {} advancing to {}", self.task.id, step);
                Ok(StepOutcome::Advanced(step))
            }
            Claim::AlreadyClaimed => Ok(StepOutcome::Skipped),
            Claim::Stale => Ok(StepOutcome::Superseded),
        }
    }
}

/// Bring a checkbox or radio to `want`; true when it was toggled.
pub async fn set_checked(page: &Page, control: &ElementHandle, want: bool, settle_ms: u64) -> Result<bool> {
    if control.checked == want {
        return Ok(false);
    }
    page.toggle(control).await?;
    page.pause(settle_ms).await;
    Ok(true)
}

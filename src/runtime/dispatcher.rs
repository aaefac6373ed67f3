// src/runtime/dispatcher.rs

//! Step Dispatcher.
//!
//! Runs afresh on every document load. All task state comes from the store;
//! nothing survives in memory between loads.

use std::fmt;
use std::sync::Arc;

use tokio::time::sleep;

use super::bus::EventBus;
use crate::dom::Page;
use crate::error::Result;
use crate::locale::{Catalog, Text};
use crate::models::{Config, Message, Origin, Step};
use crate::steps::{self, StepContext, StepOutcome};
use crate::storage::{SettingsStore, TaskStore};
use crate::surface::{PageLoad, Surface};

/// Page of the reservation flow a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Home,
    FacilitySelect,
    AvailabilityCalendar,
    TimeSlotSelect,
    Login,
    /// Not part of the flow; the task is left untouched
    Unknown,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageKind::Home => "home",
            PageKind::FacilitySelect => "facilitySelect",
            PageKind::AvailabilityCalendar => "availabilityCalendar",
            PageKind::TimeSlotSelect => "timeSlotSelect",
            PageKind::Login => "login",
            PageKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Case-insensitive substring patterns, checked in order.
const PATTERNS: [(PageKind, &[&str]); 5] = [
    (PageKind::Home, &["/user/home"]),
    (PageKind::FacilitySelect, &["availabilitycheckapplyselectfacility"]),
    (
        PageKind::AvailabilityCalendar,
        &["vacantframefacilitystatus", "availabilitycheckday"],
    ),
    (
        PageKind::TimeSlotSelect,
        &["availabilitychecktime", "vacantframetimestatus"],
    ),
    (PageKind::Login, &["login", "signin"]),
];

/// Classify a URL. Total and pure: the first matching pattern wins.
pub fn classify(url: &str) -> PageKind {
    let url = url.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| url.contains(n)))
        .map(|(kind, _)| *kind)
        .unwrap_or(PageKind::Unknown)
}

/// What a page load amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No active task for this surface
    Idle,
    /// Page outside the flow or outside the site
    Ignored,
    Ran(PageKind, StepOutcome),
}

pub struct Dispatcher {
    config: Arc<Config>,
    tasks: TaskStore,
    settings: SettingsStore,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, tasks: TaskStore, settings: SettingsStore, bus: EventBus) -> Self {
        Self {
            config,
            tasks,
            settings,
            bus,
        }
    }

    /// Handle one completed load of a surface opened for task `task_id`.
    ///
    /// Executor failures are reported as a terminal step and never returned;
    /// only store failures are.
    pub async fn on_page_load(
        &self,
        surface: Arc<dyn Surface>,
        load: &PageLoad,
        task_id: u64,
    ) -> Result<Dispatch> {
        let Some(task) = self.tasks.active().await?.filter(|t| t.id == task_id) else {
            log::debug!("No active task {} for {}", task_id, load.url);
            return Ok(Dispatch::Idle);
        };
        if !self.config.site.is_same_origin(&load.url) {
            log::debug!("Ignoring off-site page {}", load.url);
            return Ok(Dispatch::Ignored);
        }
        let kind = classify(&load.url);
        if kind == PageKind::Unknown {
            log::info!("Unknown page, no action taken: {}", load.url);
            return Ok(Dispatch::Ignored);
        }
        log::info!("Task {} on {} page (step {})", task.id, kind, task.step);

        sleep(self.config.timing.settle()).await;
        let settings = self.settings.get().await?;
        let catalog = Catalog::new(settings.language);
        let page = Page::new(surface.clone(), load.load_id.clone(), self.config.timing.clone());
        let ctx = StepContext::new(page, task, self.tasks.clone(), settings, self.bus.clone());

        let outcome = match execute(kind, &ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{} step failed on {}: {}", kind, load.url, e);
                StepOutcome::Aborted(catalog.text(Text::SearchFail).to_string())
            }
        };
        if let StepOutcome::Aborted(text) = &outcome {
            if self.tasks.advance(task_id, Step::Error).await? {
                self.bus.send(
                    Message::StepComplete {
                        step: Step::Error,
                        status_text: text.clone(),
                    },
                    Origin::Surface(surface.id()),
                );
            }
        }
        log::debug!("{} step finished: {:?}", kind, outcome);
        Ok(Dispatch::Ran(kind, outcome))
    }
}

async fn execute(kind: PageKind, ctx: &StepContext) -> Result<StepOutcome> {
    match kind {
        PageKind::Home => steps::home::run(ctx).await,
        PageKind::FacilitySelect => steps::facility::run(ctx).await,
        PageKind::AvailabilityCalendar => steps::calendar::run(ctx).await,
        PageKind::TimeSlotSelect => steps::timeslot::run(ctx).await,
        PageKind::Login => steps::login::run(ctx).await,
        PageKind::Unknown => Ok(StepOutcome::Skipped),
    }
}

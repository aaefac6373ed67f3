// src/runtime/coordinator.rs

//! Coordinator.
//!
//! Owns the inbox. Starts searches and dictionary syncs, restores and
//! replaces the periodic trigger, and turns step reports coming back from
//! page automation into status for the UI, notifications and surface
//! housekeeping. Every handler runs to completion before the next message is
//! taken.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use super::bus::EventBus;
use super::dispatcher::Dispatcher;
use super::host::{self, Host};
use super::scheduler::Scheduler;
use crate::dom::Page;
use crate::error::{AppError, Result};
use crate::locale::{Catalog, Text};
use crate::models::{
    AvailabilityResult, Collected, Config, Dictionary, Envelope, Message, Origin, SearchCriteria,
    StatusKind, Step, TimingConfig, Trigger,
};
use crate::notify::{Notification, Notifier};
use crate::steps;
use crate::storage::{DictionaryStore, KvStore, ProfileStore, SettingsStore, TaskStore};
use crate::surface::{Browser, OpenOptions, Surface};
use crate::utils::now_millis;

/// A search surface and the host driving it.
struct Run {
    surface: Arc<dyn Surface>,
    task_id: u64,
    trigger: Trigger,
    host: Host,
}

pub struct Coordinator {
    config: Arc<Config>,
    browser: Arc<dyn Browser>,
    tasks: TaskStore,
    dictionary: DictionaryStore,
    profiles: ProfileStore,
    settings: SettingsStore,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
    dispatcher: Arc<Dispatcher>,
    scheduler: Scheduler,
    /// Keyed by surface id
    runs: HashMap<u64, Run>,
    syncs: HashMap<u64, Arc<dyn Surface>>,
}

impl Coordinator {
    pub fn new(
        config: Arc<Config>,
        browser: Arc<dyn Browser>,
        kv: Arc<dyn KvStore>,
        notifier: Arc<dyn Notifier>,
        bus: EventBus,
    ) -> Self {
        let tasks = TaskStore::new(kv.clone());
        let settings = SettingsStore::new(kv.clone());
        let profiles = ProfileStore::new(kv.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            tasks.clone(),
            settings.clone(),
            bus.clone(),
        ));
        let scheduler = Scheduler::new(
            bus.clone(),
            profiles.clone(),
            Duration::from_secs(config.schedule.profile_delay_secs),
        );
        Self {
            config,
            browser,
            tasks,
            dictionary: DictionaryStore::new(kv),
            profiles,
            settings,
            notifier,
            bus,
            dispatcher,
            scheduler,
            runs: HashMap::new(),
            syncs: HashMap::new(),
        }
    }

    /// Arm the periodic trigger from stored settings, falling back to the
    /// configured interval when none was ever stored.
    pub async fn restore_schedule(&mut self) -> Result<()> {
        let interval = self
            .settings
            .get()
            .await?
            .check_interval
            .unwrap_or(self.config.schedule.interval_minutes);
        if interval > 0 {
            self.scheduler.setup(interval);
        }
        log::debug!("Schedule restored: {} minute(s)", self.scheduler.interval_minutes());
        Ok(())
    }

    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
        log::info!("Coordinator started");
        while let Some(envelope) = inbox.recv().await {
            let action = envelope.message.action();
            if let Err(e) = self.handle(envelope).await {
                log::error!("Handling {} failed: {}", action, e);
            }
        }
        log::info!("Coordinator stopped");
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<()> {
        let Envelope { message, origin } = envelope;
        match (message, origin) {
            (Message::StartSearch { params }, Origin::Ui) => {
                self.start_search(params, Trigger::Manual).await
            }
            (Message::StartSearch { params }, Origin::Scheduler) => {
                self.start_search(params, Trigger::Scheduled).await
            }
            (Message::SyncDictionary, Origin::Ui) => self.sync_dictionary().await,
            (Message::SetupPeriodicCheck { interval_minutes }, Origin::Ui) => {
                self.set_check_interval(interval_minutes).await
            }
            (Message::ClearPeriodicCheck, Origin::Ui) => self.set_check_interval(0).await,
            (Message::DictionaryCollected { purposes, areas }, Origin::Surface(id)) => {
                self.on_dictionary(id, Collected { purposes, areas }).await
            }
            (Message::StepComplete { step, status_text }, Origin::Surface(id)) => {
                self.on_step(id, step, status_text).await
            }
            (Message::AvailabilityResults { results }, Origin::Surface(id)) => {
                self.on_results(id, results).await
            }
            (
                message @ (Message::StatusUpdate { .. }
                | Message::DictionarySynced
                | Message::SearchComplete { .. }),
                _,
            ) => {
                self.bus.publish(message);
                Ok(())
            }
            (message, origin) => {
                log::warn!("Ignoring {} from {:?}", message.action(), origin);
                Ok(())
            }
        }
    }

    async fn catalog(&self) -> Catalog {
        match self.settings.get().await {
            Ok(settings) => Catalog::new(settings.language),
            Err(e) => {
                log::warn!("Settings unreadable, using default language: {}", e);
                Catalog::default()
            }
        }
    }

    fn status(&self, text: impl Into<String>, kind: StatusKind) {
        self.bus.publish(Message::status(text, kind));
    }

    async fn start_search(&mut self, params: SearchCriteria, trigger: Trigger) -> Result<()> {
        let catalog = self.catalog().await;
        let params = if params.purposes.is_empty() {
            self.default_criteria().await?.unwrap_or(params)
        } else {
            params
        };
        if let Err(e) = params.validate() {
            let reason = match e {
                AppError::Validation(reason) => reason,
                other => other.to_string(),
            };
            log::warn!("Rejected search: {}", reason);
            self.status(
                catalog.format(Text::InvalidCriteria, &[("reason", reason)]),
                StatusKind::Error,
            );
            return Ok(());
        }
        if let Some(dictionary) = self.dictionary.get().await? {
            for choice in dictionary.unknown_codes(&params) {
                log::warn!("Code {} ({}) is not in the dictionary", choice.value, choice.label);
            }
        }

        self.status(catalog.text(Text::SearchStart), StatusKind::Busy);
        // A finished host may still have results queued behind this message;
        // only runs that will never report are dropped.
        self.runs.retain(|_, run| !run.host.is_orphaned());

        let task = self.tasks.begin(params, trigger).await?;
        let home = self.config.site.home_url()?;
        let options = OpenOptions {
            active: trigger == Trigger::Manual,
            pinned: true,
        };
        let surface = match self.browser.open(home.as_str(), options).await {
            Ok(surface) => surface,
            Err(e) => {
                log::error!("Could not open {}: {}", home, e);
                self.status(catalog.text(Text::SearchFail), StatusKind::Error);
                self.tasks.clear_if(task.id).await?;
                return Ok(());
            }
        };
        log::info!("Task {} running in surface {}", task.id, surface.id());
        let host = host::spawn(surface.clone(), self.dispatcher.clone(), task.id);
        self.runs.insert(
            surface.id(),
            Run {
                surface,
                task_id: task.id,
                trigger,
                host,
            },
        );
        Ok(())
    }

    /// Criteria of the first saved profile, for a start without purposes.
    async fn default_criteria(&self) -> Result<Option<SearchCriteria>> {
        let Some(profile) = self.profiles.list().await?.into_iter().next() else {
            return Ok(None);
        };
        log::info!("No purposes given, using profile '{}'", profile.name);
        Ok(Some(profile.resolve(Local::now().date_naive())))
    }

    async fn set_check_interval(&mut self, interval_minutes: u64) -> Result<()> {
        let mut settings = self.settings.get().await?;
        settings.check_interval = Some(interval_minutes);
        self.settings.save(&settings).await?;
        if interval_minutes == 0 {
            self.scheduler.clear();
        } else {
            self.scheduler.setup(interval_minutes);
        }
        Ok(())
    }

    async fn on_step(&mut self, surface_id: u64, step: Step, text: String) -> Result<()> {
        if step != Step::Error {
            self.status(format!("🔄 {text}"), StatusKind::Busy);
            return Ok(());
        }
        self.status(text, StatusKind::Error);
        let Some(run) = self.runs.remove(&surface_id) else {
            log::warn!("Error step from unknown surface {}", surface_id);
            return Ok(());
        };
        // The tab stays open so the user can see where the flow stopped.
        unpin(run.surface.as_ref()).await;
        self.tasks.clear_if(run.task_id).await?;
        Ok(())
    }

    async fn on_results(&mut self, surface_id: u64, results: AvailabilityResult) -> Result<()> {
        let Some(run) = self.runs.remove(&surface_id) else {
            log::warn!("Results from unknown surface {}, dropped", surface_id);
            return Ok(());
        };
        self.tasks.clear_if(run.task_id).await?;
        let catalog = self.catalog().await;
        let total = results.total_slots();
        log::info!(
            "Task {} found {} slot(s) in {} facility(ies)",
            run.task_id,
            total,
            results.facilities_with_slots()
        );

        if total > 0 {
            let args = [
                ("facilities", results.facilities_with_slots().to_string()),
                ("slots", total.to_string()),
            ];
            self.notifier
                .notify(Notification {
                    title: catalog.text(Text::NotifyTitle).to_string(),
                    body: catalog.format(Text::NotifyBody, &args),
                })
                .await;
            if let Err(e) = run.surface.focus().await {
                log::warn!("Could not focus surface {}: {}", surface_id, e);
            }
            unpin(run.surface.as_ref()).await;
            self.status(
                catalog.format(Text::FoundStatus, &[("count", total.to_string())]),
                StatusKind::Success,
            );
        } else {
            self.status(catalog.text(Text::NotFoundStatus), StatusKind::Success);
            match run.trigger {
                Trigger::Scheduled => {
                    let surface = run.surface.clone();
                    let delay = self.config.timing.close_delay();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        if let Err(e) = surface.close().await {
                            log::warn!("Could not close surface {}: {}", surface.id(), e);
                        }
                    });
                }
                Trigger::Manual => unpin(run.surface.as_ref()).await,
            }
        }
        self.bus.publish(Message::SearchComplete { result_count: total });
        Ok(())
    }

    async fn sync_dictionary(&mut self) -> Result<()> {
        let catalog = self.catalog().await;
        self.status(catalog.text(Text::SyncStart), StatusKind::Busy);
        let home = self.config.site.home_url()?;
        let options = OpenOptions {
            active: false,
            pinned: true,
        };
        let surface = match self.browser.open(home.as_str(), options).await {
            Ok(surface) => surface,
            Err(e) => {
                log::error!("Could not open {} for sync: {}", home, e);
                self.status(catalog.text(Text::SyncError), StatusKind::Error);
                return Ok(());
            }
        };
        self.syncs.insert(surface.id(), surface.clone());

        let bus = self.bus.clone();
        let timing = self.config.timing.clone();
        tokio::spawn(async move {
            let collected = match collect_from(surface.clone(), &timing).await {
                Ok(collected) => collected,
                Err(e) => {
                    log::error!("Dictionary collection failed: {}", e);
                    Collected::default()
                }
            };
            bus.send(
                Message::DictionaryCollected {
                    purposes: collected.purposes,
                    areas: collected.areas,
                },
                Origin::Surface(surface.id()),
            );
        });
        Ok(())
    }

    async fn on_dictionary(&mut self, surface_id: u64, collected: Collected) -> Result<()> {
        let Some(surface) = self.syncs.remove(&surface_id) else {
            log::warn!("Dictionary from unknown surface {}, dropped", surface_id);
            return Ok(());
        };
        let saved = self.save_dictionary(collected).await;
        if let Err(e) = surface.close().await {
            log::warn!("Could not close sync surface {}: {}", surface_id, e);
        }
        saved
    }

    async fn save_dictionary(&self, collected: Collected) -> Result<()> {
        let catalog = self.catalog().await;
        if !collected.is_usable() {
            log::warn!("Dictionary sync found no purposes, keeping the stored one");
            self.status(catalog.text(Text::SyncFail), StatusKind::Error);
            return Ok(());
        }
        let dictionary = Dictionary::from_collected(collected, now_millis());
        self.dictionary.save(&dictionary).await?;
        log::info!(
            "Dictionary saved: {} purpose(s), {} area(s)",
            dictionary.purposes.len(),
            dictionary.areas.len()
        );
        self.status(catalog.text(Text::SyncDone), StatusKind::Success);
        self.bus.publish(Message::DictionarySynced);
        Ok(())
    }
}

async fn unpin(surface: &dyn Surface) {
    if let Err(e) = surface.set_pinned(false).await {
        log::warn!("Could not unpin surface {}: {}", surface.id(), e);
    }
}

/// Wait for the first load of a sync surface, then read the home page.
async fn collect_from(surface: Arc<dyn Surface>, timing: &TimingConfig) -> Result<Collected> {
    let mut loads = surface.loads();
    let wait = Duration::from_millis(timing.sync_load_timeout_ms);
    let load = {
        let current = timeout(wait, loads.wait_for(|load| load.is_some()))
            .await
            .map_err(|_| AppError::surface("dictionary sync", "home page did not load"))?
            .map_err(|_| AppError::surface("dictionary sync", "surface closed"))?;
        current.clone()
    }
    .ok_or_else(|| AppError::surface("dictionary sync", "no load recorded"))?;
    sleep(Duration::from_millis(timing.sync_settle_ms)).await;
    let page = Page::new(surface, load.load_id, timing.clone());
    steps::dictionary::collect(&page, timing).await
}

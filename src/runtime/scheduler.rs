// src/runtime/scheduler.rs

//! Periodic trigger.
//!
//! On every tick each profile flagged for scheduled checks is started in
//! turn, with a fixed delay between starts so runs do not overlap.

use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

use super::bus::EventBus;
use crate::error::Result;
use crate::models::{Message, Origin};
use crate::storage::ProfileStore;

pub struct Scheduler {
    bus: EventBus,
    profiles: ProfileStore,
    profile_delay: Duration,
    timer: Option<JoinHandle<()>>,
    interval_minutes: u64,
}

impl Scheduler {
    pub fn new(bus: EventBus, profiles: ProfileStore, profile_delay: Duration) -> Self {
        Self {
            bus,
            profiles,
            profile_delay,
            timer: None,
            interval_minutes: 0,
        }
    }

    /// Replace the timer. Zero disables it.
    pub fn setup(&mut self, interval_minutes: u64) {
        self.clear();
        if interval_minutes == 0 {
            log::info!("Periodic check disabled");
            return;
        }
        let period = Duration::from_secs(interval_minutes * 60);
        let bus = self.bus.clone();
        let profiles = self.profiles.clone();
        let delay = self.profile_delay;
        self.interval_minutes = interval_minutes;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                log::info!("Periodic check triggered");
                if let Err(e) = run_scheduled(&bus, &profiles, delay).await {
                    log::error!("Periodic check failed: {}", e);
                }
            }
        }));
        log::info!("Periodic check every {} minute(s)", interval_minutes);
    }

    pub fn clear(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            log::info!("Periodic check cleared");
        }
        self.interval_minutes = 0;
    }

    /// Current interval; zero when disabled.
    pub fn interval_minutes(&self) -> u64 {
        self.interval_minutes
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Start every scheduled profile, resolving its dates against today.
///
/// Returns how many runs were started.
pub async fn run_scheduled(bus: &EventBus, profiles: &ProfileStore, delay: Duration) -> Result<usize> {
    let scheduled = profiles.scheduled().await?;
    if scheduled.is_empty() {
        log::info!("No profiles with scheduled check enabled, skipping");
        return Ok(0);
    }
    log::info!("Running {} scheduled profile(s)", scheduled.len());
    for (i, profile) in scheduled.iter().enumerate() {
        if i > 0 {
            sleep(delay).await;
        }
        let params = profile.resolve(Local::now().date_naive());
        log::info!("Scheduled run for profile '{}'", profile.name);
        bus.send(Message::StartSearch { params }, Origin::Scheduler);
    }
    Ok(scheduled.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Choice, DateRange, Profile, SearchCriteria};
    use crate::storage::MemoryStorage;

    fn profile(name: &str, scheduled: bool) -> Profile {
        Profile {
            name: name.to_string(),
            criteria: SearchCriteria {
                purposes: vec![Choice::new("P1", "テニス")],
                ..SearchCriteria::default()
            },
            date_range_days: DateRange::Days(7),
            scheduled_check: scheduled,
        }
    }

    #[tokio::test]
    async fn test_runs_only_scheduled_profiles_in_order() {
        let profiles = ProfileStore::new(Arc::new(MemoryStorage::new()));
        profiles.add(profile("morning", true)).await.unwrap();
        profiles.add(profile("manual", false)).await.unwrap();
        profiles.add(profile("evening", true)).await.unwrap();
        let (bus, mut inbox) = EventBus::new();

        let started = run_scheduled(&bus, &profiles, Duration::ZERO).await.unwrap();
        assert_eq!(started, 2);

        let today = Local::now().date_naive();
        for _ in 0..2 {
            let envelope = inbox.recv().await.unwrap();
            assert_eq!(envelope.origin, Origin::Scheduler);
            let Message::StartSearch { params } = envelope.message else {
                panic!("unexpected message");
            };
            assert_eq!(params.date_from, Some(today));
            assert_eq!(params.date_to, today.checked_add_days(chrono::Days::new(7)));
        }
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_one_period() {
        let profiles = ProfileStore::new(Arc::new(MemoryStorage::new()));
        profiles.add(profile("morning", true)).await.unwrap();
        let (bus, mut inbox) = EventBus::new();
        let mut scheduler = Scheduler::new(bus, profiles, Duration::ZERO);

        scheduler.setup(5);
        assert_eq!(scheduler.interval_minutes(), 5);
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(inbox.try_recv().is_err());

        let envelope = inbox.recv().await.unwrap();
        assert!(matches!(envelope.message, Message::StartSearch { .. }));

        scheduler.clear();
        assert_eq!(scheduler.interval_minutes(), 0);
    }
}

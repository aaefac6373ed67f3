//! Typed stores over a [`KvStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::locale::Language;
use crate::models::{
    ActionClaim, Claim, Dictionary, Profile, SearchCriteria, Step, Task, Trigger,
};
use crate::storage::{KvStore, read, write};
use crate::utils::now_millis;

const TASK_KEY: &str = "currentTask";
const TASK_SEQ_KEY: &str = "taskSeq";
const DICTIONARY_KEY: &str = "dictionary";
const PROFILES_KEY: &str = "profiles";
const SETTINGS_KEY: &str = "settings";

/// The single task slot.
///
/// Read-modify-write sequences hold an async lock so executors in different
/// surfaces serialize their claims within one process.
#[derive(Clone)]
pub struct TaskStore {
    kv: Arc<dyn KvStore>,
    lock: Arc<Mutex<()>>,
}

impl TaskStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The stored task, active or not.
    pub async fn get(&self) -> Result<Option<Task>> {
        read(self.kv.as_ref(), TASK_KEY).await
    }

    pub async fn active(&self) -> Result<Option<Task>> {
        Ok(self.get().await?.filter(|t| t.active))
    }

    /// Write a fresh active task, overwriting whatever is stored.
    pub async fn begin(&self, parameters: SearchCriteria, trigger: Trigger) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let id = read::<u64>(self.kv.as_ref(), TASK_SEQ_KEY)
            .await?
            .unwrap_or(0)
            + 1;
        write(self.kv.as_ref(), TASK_SEQ_KEY, &id).await?;

        if let Some(previous) = self.active().await? {
            log::warn!(
                "Task {} at step {} superseded by task {}",
                previous.id,
                previous.step,
                id
            );
        }

        let task = Task::new(id, parameters, trigger, now_millis());
        write(self.kv.as_ref(), TASK_KEY, &task).await?;
        log::info!("Task {} started ({:?})", id, trigger);
        Ok(task)
    }

    /// Claim the page action that advances task `id` to `step` on `load_id`.
    ///
    /// On [`Claim::Granted`] the stored step is advanced as well.
    pub async fn claim(&self, id: u64, step: Step, load_id: &str) -> Result<Claim> {
        let _guard = self.lock.lock().await;
        let Some(mut task) = self.active().await?.filter(|t| t.id == id) else {
            log::debug!("Claim for {} by task {} is stale", step, id);
            return Ok(Claim::Stale);
        };
        if task.has_claimed(step, load_id) {
            log::debug!("Task {} already claimed {} on {}", id, step, load_id);
            return Ok(Claim::AlreadyClaimed);
        }
        task.step = step;
        task.claimed = Some(ActionClaim {
            step,
            load_id: load_id.to_string(),
        });
        write(self.kv.as_ref(), TASK_KEY, &task).await?;
        Ok(Claim::Granted)
    }

    /// Move task `id` to `step` without recording an action. False when stale.
    pub async fn advance(&self, id: u64, step: Step) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let Some(mut task) = self.active().await?.filter(|t| t.id == id) else {
            return Ok(false);
        };
        task.step = step;
        write(self.kv.as_ref(), TASK_KEY, &task).await?;
        Ok(true)
    }

    /// Mark task `id` inactive unless a newer task replaced it.
    pub async fn clear_if(&self, id: u64) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match self.get().await? {
            Some(mut task) if task.id == id && task.active => {
                task.active = false;
                write(self.kv.as_ref(), TASK_KEY, &task).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone)]
pub struct DictionaryStore {
    kv: Arc<dyn KvStore>,
}

impl DictionaryStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self) -> Result<Option<Dictionary>> {
        read(self.kv.as_ref(), DICTIONARY_KEY).await
    }

    pub async fn save(&self, dictionary: &Dictionary) -> Result<()> {
        write(self.kv.as_ref(), DICTIONARY_KEY, dictionary).await
    }
}

#[derive(Clone)]
pub struct ProfileStore {
    kv: Arc<dyn KvStore>,
}

impl ProfileStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn list(&self) -> Result<Vec<Profile>> {
        Ok(read(self.kv.as_ref(), PROFILES_KEY).await?.unwrap_or_default())
    }

    pub async fn find(&self, name: &str) -> Result<Option<Profile>> {
        Ok(self.list().await?.into_iter().find(|p| p.name == name))
    }

    /// Profiles flagged for the periodic trigger, in saved order.
    pub async fn scheduled(&self) -> Result<Vec<Profile>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.scheduled_check)
            .collect())
    }

    /// Add a profile, replacing one with the same name in place.
    pub async fn add(&self, profile: Profile) -> Result<()> {
        let mut profiles = self.list().await?;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        write(self.kv.as_ref(), PROFILES_KEY, &profiles).await
    }

    /// Remove by name; false when no such profile existed.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut profiles = self.list().await?;
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        if profiles.len() == before {
            return Ok(false);
        }
        write(self.kv.as_ref(), PROFILES_KEY, &profiles).await?;
        Ok(true)
    }
}

/// User settings record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_pw: Option<String>,
    /// Minutes between periodic checks. `Some(0)` is an explicit off that
    /// outranks the configured default; `None` was never set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u64>,
    #[serde(default)]
    pub language: Language,
}

impl Settings {
    /// Both credentials, when present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.login_id.as_deref(), self.login_pw.as_deref()) {
            (Some(id), Some(pw)) if !id.is_empty() && !pw.is_empty() => Some((id, pw)),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KvStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self) -> Result<Settings> {
        Ok(read(self.kv.as_ref(), SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        write(self.kv.as_ref(), SETTINGS_KEY, settings).await
    }
}

// src/models/task.rs

//! The single in-flight search task and its step machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::criteria::SearchCriteria;

/// Named stage of the reservation site's flow a task is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Written by the coordinator before the entry page opens
    Init,
    Home,
    FacilitySelect,
    Calendar,
    TimeSlot,
    Login,
    /// Results were reported
    Done,
    /// An executor gave up; the coordinator clears the task
    Error,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Home => "home",
            Step::FacilitySelect => "facilitySelect",
            Step::Calendar => "calendar",
            Step::TimeSlot => "timeSlot",
            Step::Login => "login",
            Step::Done => "done",
            Step::Error => "error",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    #[default]
    Manual,
    Scheduled,
}

/// Record of the last page action an executor committed to.
///
/// `load_id` identifies one document load, so a re-invocation against the
/// same document sees its own claim and skips the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionClaim {
    pub step: Step,
    pub load_id: String,
}

/// One logical search run spanning multiple page loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Monotonic id; step writes carrying an older id are stale
    #[serde(default)]
    pub id: u64,
    pub active: bool,
    pub step: Step,
    pub parameters: SearchCriteria,
    /// Epoch milliseconds
    pub started_at: i64,
    #[serde(default)]
    pub triggered_by: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed: Option<ActionClaim>,
}

impl Task {
    pub fn new(id: u64, parameters: SearchCriteria, triggered_by: Trigger, started_at: i64) -> Self {
        Self {
            id,
            active: true,
            step: Step::Init,
            parameters,
            started_at,
            triggered_by,
            claimed: None,
        }
    }

    /// Whether this task already claimed `step` on the given document load.
    pub fn has_claimed(&self, step: Step, load_id: &str) -> bool {
        self.claimed
            .as_ref()
            .is_some_and(|c| c.step == step && c.load_id == load_id)
    }
}

/// Outcome of a compare-and-swap claim on the stored task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The claim was recorded; perform the action
    Granted,
    /// Same step on the same document load was claimed earlier
    AlreadyClaimed,
    /// The stored task is gone or belongs to a newer run
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Choice;

    fn sample() -> Task {
        let criteria = SearchCriteria {
            purposes: vec![Choice::new("P1", "Tennis")],
            ..SearchCriteria::default()
        };
        Task::new(3, criteria, Trigger::Scheduled, 1_717_200_000_000)
    }

    #[test]
    fn test_new_task_is_active_init() {
        let task = sample();
        assert!(task.active);
        assert_eq!(task.step, Step::Init);
        assert_eq!(task.triggered_by, Trigger::Scheduled);
    }

    #[test]
    fn test_record_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["step"], "init");
        assert_eq!(value["triggeredBy"], "scheduled");
        assert_eq!(value["startedAt"], 1_717_200_000_000_i64);
        assert!(value.get("claimed").is_none());
    }

    #[test]
    fn test_has_claimed() {
        let mut task = sample();
        task.claimed = Some(ActionClaim {
            step: Step::FacilitySelect,
            load_id: "load-1".to_string(),
        });
        assert!(task.has_claimed(Step::FacilitySelect, "load-1"));
        assert!(!task.has_claimed(Step::FacilitySelect, "load-2"));
        assert!(!task.has_claimed(Step::Calendar, "load-1"));
    }

    #[test]
    fn test_step_display() {
        assert_eq!(Step::FacilitySelect.to_string(), "facilitySelect");
        assert_eq!(Step::TimeSlot.to_string(), "timeSlot");
    }
}

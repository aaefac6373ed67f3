// src/models/message.rs

//! Messages exchanged between the coordinator, page automation and the UI.
//!
//! Every message is a JSON object tagged by `action`. Delivery is one-way and
//! best-effort; see [`crate::runtime::bus`].

use serde::{Deserialize, Serialize};

use super::availability::AvailabilityResult;
use super::criteria::{Choice, SearchCriteria};
use super::task::Step;

/// Kind of a status line, used by the UI for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Busy,
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    StartSearch {
        params: SearchCriteria,
    },
    SyncDictionary,
    SetupPeriodicCheck {
        interval_minutes: u64,
    },
    ClearPeriodicCheck,
    DictionaryCollected {
        #[serde(default)]
        purposes: Vec<Choice>,
        #[serde(default)]
        areas: Vec<Choice>,
    },
    StepComplete {
        step: Step,
        status_text: String,
    },
    AvailabilityResults {
        results: AvailabilityResult,
    },
    StatusUpdate {
        text: String,
        kind: StatusKind,
    },
    DictionarySynced,
    SearchComplete {
        result_count: usize,
    },
}

impl Message {
    pub fn status(text: impl Into<String>, kind: StatusKind) -> Self {
        Message::StatusUpdate {
            text: text.into(),
            kind,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Message::StartSearch { .. } => "startSearch",
            Message::SyncDictionary => "syncDictionary",
            Message::SetupPeriodicCheck { .. } => "setupPeriodicCheck",
            Message::ClearPeriodicCheck => "clearPeriodicCheck",
            Message::DictionaryCollected { .. } => "dictionaryCollected",
            Message::StepComplete { .. } => "stepComplete",
            Message::AvailabilityResults { .. } => "availabilityResults",
            Message::StatusUpdate { .. } => "statusUpdate",
            Message::DictionarySynced => "dictionarySynced",
            Message::SearchComplete { .. } => "searchComplete",
        }
    }
}

/// Where a message entered the coordinator from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Ui,
    Scheduler,
    /// Page automation running in the given surface
    Surface(u64),
}

/// A message together with its sender.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: Message,
    pub origin: Origin,
}

impl Envelope {
    pub fn new(message: Message, origin: Origin) -> Self {
        Self { message, origin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tag() {
        let value = serde_json::to_value(Message::SearchComplete { result_count: 3 }).unwrap();
        assert_eq!(value["action"], "searchComplete");
        assert_eq!(value["resultCount"], 3);
    }

    #[test]
    fn test_unit_variant_shape() {
        let message: Message = serde_json::from_str(r#"{"action":"syncDictionary"}"#).unwrap();
        assert_eq!(message, Message::SyncDictionary);
    }

    #[test]
    fn test_step_complete_fields() {
        let json = r#"{"action":"stepComplete","step":"facilitySelect","statusText":"施設を選択中..."}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(
            message,
            Message::StepComplete {
                step: Step::FacilitySelect,
                status_text: "施設を選択中...".to_string(),
            }
        );
        assert_eq!(message.action(), "stepComplete");
    }

    #[test]
    fn test_periodic_interval() {
        let json = r#"{"action":"setupPeriodicCheck","intervalMinutes":30}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(
            message,
            Message::SetupPeriodicCheck {
                interval_minutes: 30
            }
        );
    }
}

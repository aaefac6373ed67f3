// src/models/dictionary.rs

//! Cached purpose/area vocabulary scraped from the site.

use serde::{Deserialize, Serialize};

use super::criteria::{Choice, SearchCriteria};

/// Values collected in-page during a dictionary sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collected {
    #[serde(default)]
    pub purposes: Vec<Choice>,
    #[serde(default)]
    pub areas: Vec<Choice>,
}

impl Collected {
    /// A sync is usable only when at least one purpose was found.
    pub fn is_usable(&self) -> bool {
        !self.purposes.is_empty()
    }
}

/// Persisted dictionary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dictionary {
    pub purposes: Vec<Choice>,
    pub areas: Vec<Choice>,
    /// Epoch milliseconds of the sync
    pub synced_at: i64,
}

impl Dictionary {
    pub fn from_collected(collected: Collected, synced_at: i64) -> Self {
        Self {
            purposes: collected.purposes,
            areas: collected.areas,
            synced_at,
        }
    }

    pub fn purpose(&self, value: &str) -> Option<&Choice> {
        self.purposes.iter().find(|p| p.value == value)
    }

    pub fn area(&self, value: &str) -> Option<&Choice> {
        self.areas.iter().find(|a| a.value == value)
    }

    /// Criteria codes absent from this dictionary.
    ///
    /// Such codes are not rejected; they simply fail to match during the home step.
    pub fn unknown_codes<'a>(&self, criteria: &'a SearchCriteria) -> Vec<&'a Choice> {
        let purposes = criteria
            .purposes
            .iter()
            .filter(|p| self.purpose(&p.value).is_none());
        let areas = criteria
            .areas
            .iter()
            .filter(|a| self.area(&a.value).is_none());
        purposes.chain(areas).collect()
    }
}

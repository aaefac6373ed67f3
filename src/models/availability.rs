// src/models/availability.rs

//! Availability scraped from the calendar and time-slot pages.

use serde::{Deserialize, Serialize};

/// Heading used when slots cannot be attributed to a facility.
pub const GENERIC_FACILITY: &str = "検索結果";

/// One available slot as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Raw marker text (〇, △, ...)
    pub text: String,
    /// Short context, usually the start of the enclosing table row
    pub info: String,
}

/// Slots grouped under one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityAvailability {
    pub facility: String,
    #[serde(default)]
    pub available: Vec<Slot>,
}

/// Result reported once per task; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityResult {
    pub facilities: Vec<FacilityAvailability>,
}

impl AvailabilityResult {
    pub fn new(facilities: Vec<FacilityAvailability>) -> Self {
        Self { facilities }
    }

    pub fn total_slots(&self) -> usize {
        self.facilities.iter().map(|f| f.available.len()).sum()
    }

    /// Number of facilities with at least one slot.
    pub fn facilities_with_slots(&self) -> usize {
        self.facilities
            .iter()
            .filter(|f| !f.available.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_slots() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(text: &str) -> Slot {
        Slot {
            text: text.to_string(),
            info: String::new(),
        }
    }

    #[test]
    fn test_counts_ignore_empty_facilities() {
        let result = AvailabilityResult::new(vec![
            FacilityAvailability {
                facility: "中スポーツセンター".to_string(),
                available: vec![slot("〇"), slot("△")],
            },
            FacilityAvailability {
                facility: "西スポーツセンター".to_string(),
                available: Vec::new(),
            },
        ]);
        assert_eq!(result.total_slots(), 2);
        assert_eq!(result.facilities_with_slots(), 1);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_serializes_as_array() {
        let value = serde_json::to_value(AvailabilityResult::default()).unwrap();
        assert!(value.is_array());
    }
}

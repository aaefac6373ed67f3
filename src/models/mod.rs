// src/models/mod.rs

//! Domain models for the reservation automation.
//!
//! Persisted records use camelCase field names so stored JSON matches what
//! the page automation and UI exchange.

mod availability;
pub mod config;
mod criteria;
mod dictionary;
mod message;
mod profile;
mod task;

// Re-export all public types
pub use availability::{AvailabilityResult, FacilityAvailability, GENERIC_FACILITY, Slot};
pub use config::{CdpConfig, Config, ScheduleConfig, SiteConfig, StorageConfig, TimingConfig};
pub use criteria::{
    Choice, HOLIDAY_LABEL, SearchCriteria, WEEKDAY_LABELS, WEEKDAY_MARKS, format_hhmm,
    weekday_from_mark,
};
pub use dictionary::{Collected, Dictionary};
pub use message::{Envelope, Message, Origin, StatusKind};
pub use profile::{DateRange, Profile};
pub use task::{ActionClaim, Claim, Step, Task, Trigger};

// src/steps/scan.rs

//! Availability extraction from result pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

use crate::dom::Document;
use crate::dom::document::locator;
use crate::dom::resolver::{Intent, marker_text, resolve};
use crate::error::Result;
use crate::models::{
    AvailabilityResult, FacilityAvailability, GENERIC_FACILITY, SearchCriteria, Slot,
    weekday_from_mark,
};
use crate::utils::truncate_graphemes;

const INFO_LIMIT: usize = 100;
const TIME_SLOT_FACILITY: &str = "施設";

/// Weekday in parentheses, as in `6/3(月)`.
static BRACKETED_DAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[(（]([月火水木金土日])[)）]").ok());
static ANY_DAY: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[月火水木金土日]").ok());

/// Availability found on a page, plus the locators of the markers behind it.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub result: AvailabilityResult,
    pub found: Vec<String>,
}

/// Weekday 0 (Sunday) through 6 named by a column header.
pub fn header_weekday(header: &str) -> Option<u8> {
    let mark = BRACKETED_DAY
        .as_ref()
        .and_then(|re| re.captures(header))
        .and_then(|c| c.get(1))
        .or_else(|| ANY_DAY.as_ref().and_then(|re| re.find(header)))?;
    mark.as_str().chars().next().and_then(weekday_from_mark)
}

fn slot(doc: &Document, el: ElementRef<'_>, text: String) -> Result<Slot> {
    let info = doc
        .closest(el, "tr")?
        .map(|row| truncate_graphemes(&doc.text(row), INFO_LIMIT))
        .unwrap_or_default();
    Ok(Slot { text, info })
}

/// Scan an availability calendar.
///
/// Markers are grouped under the nearest facility heading before them in
/// document order; markers with no heading before them fall under
/// [`GENERIC_FACILITY`]. The weekday filter drops markers whose column names
/// an unwanted day and keeps those whose day cannot be read.
pub fn calendar(doc: &Document, criteria: &SearchCriteria) -> Result<Scan> {
    let mut markers = resolve(doc, &Intent::CalendarMarkers)?;
    let total = markers.len();
    if criteria.filters_weekdays() {
        markers.retain(|el| {
            match doc.column_header(*el).as_deref().and_then(header_weekday) {
                Some(day) => criteria.wants_day(day),
                None => true,
            }
        });
        log::debug!("Weekday filter kept {} of {} marker(s)", markers.len(), total);
    }

    let headings: HashSet<_> = resolve(doc, &Intent::FacilityHeadings)?
        .into_iter()
        .map(|h| h.id())
        .collect();
    let wanted: HashSet<_> = markers.iter().map(|m| m.id()).collect();

    let mut generic: Vec<Slot> = Vec::new();
    let mut facilities: Vec<FacilityAvailability> = Vec::new();
    let mut found = Vec::new();
    for el in doc.elements() {
        if headings.contains(&el.id()) {
            facilities.push(FacilityAvailability {
                facility: doc.text(el),
                available: Vec::new(),
            });
        } else if wanted.contains(&el.id()) {
            let text = marker_text(doc, el)?.unwrap_or_default();
            let entry = slot(doc, el, text)?;
            match facilities.last_mut() {
                Some(current) => current.available.push(entry),
                None => generic.push(entry),
            }
            found.push(locator(el));
        }
    }
    if !generic.is_empty() {
        facilities.insert(
            0,
            FacilityAvailability {
                facility: GENERIC_FACILITY.to_string(),
                available: generic,
            },
        );
    }

    Ok(Scan {
        result: AvailabilityResult::new(facilities),
        found,
    })
}

/// Scan a single facility's time-slot grid.
pub fn time_slots(doc: &Document) -> Result<Scan> {
    let facility = resolve(doc, &Intent::TimeSlotHeading)?
        .first()
        .map(|h| doc.text(*h))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| TIME_SLOT_FACILITY.to_string());

    let mut available = Vec::new();
    let mut found = Vec::new();
    for el in resolve(doc, &Intent::TimeSlotMarkers)? {
        available.push(slot(doc, el, doc.text(el))?);
        found.push(locator(el));
    }

    Ok(Scan {
        result: AvailabilityResult::new(vec![FacilityAvailability {
            facility,
            available,
        }]),
        found,
    })
}

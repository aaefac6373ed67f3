// src/dom/resolver.rs

//! Element Resolver.
//!
//! Every [`Intent`] maps to an ordered list of [`Strategy`]s. Strategies run
//! in priority order and the first one yielding at least one element wins;
//! lower-priority matches are never merged in. No match is an empty vector,
//! never an error. Only a malformed selector fails.

use scraper::ElementRef;

use super::document::{Document, ancestors_or_self, locator};
use crate::error::Result;
use crate::models::{Choice, HOLIDAY_LABEL};

const PURPOSE_INPUT: &str = r#"input[name="HomeModel.SearchByDateTimeModel.SelectedPurpose"]"#;
const AREA_INPUT: &str = r#"input[name="HomeModel.SearchByDateTimeModel.SelectedArea"]"#;
const TAB: &str = r#"[role="tab"], .nav-link, [data-toggle="tab"]"#;
const ACTIVE_PANE: &str = r#".tab-pane.active, .tab-pane.show, [role="tabpanel"][class*="active"]"#;
const CLICKABLE: &str = r#"button, a, input[type="submit"], input[type="button"]"#;
const FACILITY_INPUT: &str = concat!(
    r#"input[type="checkbox"][name*="facility"], input[type="radio"][name*="facility"], "#,
    r#"input[type="checkbox"][name*="Facility"], input[type="radio"][name*="Facility"]"#
);
const DAY_INPUT: &str = concat!(
    r#"input[type="checkbox"][name*="DayOfWeek"], input[type="checkbox"][name*="dayofweek"], "#,
    r#"input[type="checkbox"][name*="Dayofweek"]"#
);
const LOGIN_USER: &str = concat!(
    r#"input[name*="userId"], input[name*="UserId"], input[name*="loginId"], input[name*="LoginId"]"#
);
const LOGIN_USER_BY_ID: &str =
    r#"input[type="text"][id*="user"], input[type="text"][id*="User"], input[type="text"][id*="login"]"#;
const CIRCLE_ICON: &str = r#".fa-circle-o, .fa-circle, [class*="circle"]"#;
const TRIANGLE_ICON: &str = r#".fa-triangle, [class*="triangle"]"#;

/// Glyphs marking an open slot.
pub const OPEN_MARKS: [&str; 3] = ["〇", "○", "O"];
/// Glyph marking a nearly full slot.
pub const LIMITED_MARK: &str = "△";
const CLOSED_MARKS: [&str; 4] = ["✕", "×", "―", "-"];

/// Facility-type vocabulary used when controls carry no structural hint.
pub const FACILITY_WORDS: [&str; 5] = ["センター", "体育館", "スポーツ", "公園", "施設"];
/// Words that identify a facility heading on result pages.
pub const HEADING_WORDS: [&str; 3] = ["センター", "スポーツ", "体育"];

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    PurposeOptions,
    Purpose(Choice),
    AreaOptions,
    Area(Choice),
    /// Tabs leading to the criteria form
    SearchTabs,
    /// Tab listing every purpose, used by the dictionary sync
    PurposeTab,
    AreaFilterReveal,
    DateFrom,
    DateTo,
    TimeFrom,
    TimeTo,
    DayOfWeekOptions,
    /// The "available slots" search mode radio
    SearchModeRadio,
    SearchAction,
    FacilityOptions,
    NextAction,
    LoginUser,
    LoginPassword,
    LoginAction,
    FacilityHeadings,
    TimeSlotHeading,
    /// Open or limited availability markers on the calendar
    CalendarMarkers,
    /// Open markers in a time-slot grid
    TimeSlotMarkers,
}

/// Element test used by text-based strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Test {
    /// Own text contains any word
    TextAny(Vec<String>),
    /// Own text contains every word
    TextAll(Vec<String>),
    /// Own text, or the `value` attribute, contains any word
    TextOrValueAny(Vec<String>),
    /// Label text contains any word
    LabelAny(Vec<String>),
    CalendarMarker,
    TimeSlotMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Structural match on a stable attribute
    Css(String),
    /// Elements matching `within` inside any `scope` element that pass `test`
    Scoped {
        scope: String,
        within: String,
        test: Test,
    },
    /// Elements matching `within` anywhere that pass `test`
    Broad { within: String, test: Test },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    DocumentOrder,
    /// Visible matches first, then hidden ones, each in document order
    PreferVisible,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub strategies: Vec<Strategy>,
    pub tie_break: TieBreak,
    /// Drop matches that contain another match
    pub innermost: bool,
}

impl Plan {
    fn new(strategies: Vec<Strategy>) -> Self {
        Self {
            strategies,
            tie_break: TieBreak::DocumentOrder,
            innermost: false,
        }
    }

    fn prefer_visible(mut self) -> Self {
        self.tie_break = TieBreak::PreferVisible;
        self
    }

    fn innermost(mut self) -> Self {
        self.innermost = true;
        self
    }
}

fn css(selector: &str) -> Strategy {
    Strategy::Css(selector.to_string())
}

fn broad(within: &str, test: Test) -> Strategy {
    Strategy::Broad {
        within: within.to_string(),
        test,
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn value_selector(base: &str, value: &str) -> String {
    format!(r#"{base}[value="{}"]"#, value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Intent {
    /// Strategies in priority order.
    pub fn plan(&self) -> Plan {
        match self {
            Intent::PurposeOptions => Plan::new(vec![css(PURPOSE_INPUT)]),
            Intent::Purpose(choice) => Plan::new(vec![
                css(&value_selector(PURPOSE_INPUT, &choice.value)),
                broad(PURPOSE_INPUT, Test::LabelAny(vec![choice.label.clone()])),
            ]),
            Intent::AreaOptions => Plan::new(vec![css(AREA_INPUT)]),
            Intent::Area(choice) => Plan::new(vec![
                css(&value_selector(AREA_INPUT, &choice.value)),
                broad(AREA_INPUT, Test::LabelAny(vec![choice.label.clone()])),
            ]),
            Intent::SearchTabs => Plan::new(vec![broad(
                TAB,
                Test::TextAny(words(&["日時から", "目的から"])),
            )]),
            Intent::PurposeTab => Plan::new(vec![
                broad(r#"[role="tab"]"#, Test::TextAny(words(&["利用目的から探す"]))),
                broad(TAB, Test::TextAny(words(&["目的から"]))),
            ]),
            Intent::AreaFilterReveal => Plan::new(vec![
                broad("button, a", Test::TextAll(words(&["区名", "絞"]))),
                broad("span, div", Test::TextAll(words(&["区名", "絞"]))),
            ])
            .innermost(),
            Intent::DateFrom => Plan::new(vec![css(r#"input[name="HomeModel.DateFrom"]"#)]),
            Intent::DateTo => Plan::new(vec![css(r#"input[name="HomeModel.DateTo"]"#)]),
            Intent::TimeFrom => Plan::new(vec![
                css("#HomeModel_TimeFrom"),
                css(r#"select[name*="TimeFrom"]"#),
            ]),
            Intent::TimeTo => Plan::new(vec![
                css("#HomeModel_TimeTo"),
                css(r#"select[name*="TimeTo"]"#),
            ]),
            Intent::DayOfWeekOptions => Plan::new(vec![
                css(DAY_INPUT),
                broad(
                    r#"input[type="checkbox"]"#,
                    Test::LabelAny(
                        crate::models::WEEKDAY_LABELS
                            .iter()
                            .chain(std::iter::once(&HOLIDAY_LABEL))
                            .map(|w| w.to_string())
                            .collect(),
                    ),
                ),
            ]),
            Intent::SearchModeRadio => Plan::new(vec![broad(
                r#"input[type="radio"]"#,
                Test::LabelAny(words(&["空きコマ"])),
            )]),
            Intent::SearchAction => Plan::new(vec![
                Strategy::Scoped {
                    scope: ACTIVE_PANE.to_string(),
                    within: "button".to_string(),
                    test: Test::TextAny(words(&["検索"])),
                },
                broad(
                    "button.btn-secondary, button.btn-primary",
                    Test::TextAny(words(&["検索"])),
                ),
                broad(
                    r#"button, input[type="submit"], a, [role="button"]"#,
                    Test::TextOrValueAny(words(&["検索"])),
                ),
            ])
            .prefer_visible(),
            Intent::FacilityOptions => Plan::new(vec![
                css(FACILITY_INPUT),
                broad(
                    r#"input[type="checkbox"]"#,
                    Test::LabelAny(words(&FACILITY_WORDS)),
                ),
                css(r#"input[type="checkbox"]"#),
            ]),
            Intent::NextAction => Plan::new(vec![
                broad(CLICKABLE, Test::TextOrValueAny(words(&["次へ進む"]))),
                broad(CLICKABLE, Test::TextOrValueAny(words(&["次へ"]))),
            ])
            .prefer_visible(),
            Intent::LoginUser => Plan::new(vec![css(LOGIN_USER), css(LOGIN_USER_BY_ID)]),
            Intent::LoginPassword => Plan::new(vec![css(r#"input[type="password"]"#)]),
            Intent::LoginAction => Plan::new(vec![
                broad(CLICKABLE, Test::TextOrValueAny(words(&["ログイン"]))),
                broad(CLICKABLE, Test::TextOrValueAny(words(&["Login"]))),
            ])
            .prefer_visible(),
            Intent::FacilityHeadings => Plan::new(vec![broad(
                "h2, h3, h4",
                Test::TextAny(words(&HEADING_WORDS)),
            )]),
            Intent::TimeSlotHeading => Plan::new(vec![css("h2, h3")]),
            Intent::CalendarMarkers => Plan::new(vec![broad(
                r#"label, td, a, .btn-toggle, [class*="btn-toggle"]"#,
                Test::CalendarMarker,
            )])
            .innermost(),
            Intent::TimeSlotMarkers => Plan::new(vec![broad(
                ".btn-toggle:not(.disabled), label:not(.disabled)",
                Test::TimeSlotMarker,
            )])
            .innermost(),
        }
    }
}

/// Resolve `intent` against a parsed document.
pub fn resolve<'a>(doc: &'a Document, intent: &Intent) -> Result<Vec<ElementRef<'a>>> {
    let plan = intent.plan();
    for (rank, strategy) in plan.strategies.iter().enumerate() {
        let mut found = run(doc, strategy)?;
        if found.is_empty() {
            continue;
        }
        if plan.innermost {
            found = innermost(found);
        }
        if plan.tie_break == TieBreak::PreferVisible {
            let (visible, hidden): (Vec<_>, Vec<_>) =
                found.into_iter().partition(|el| !doc.is_hidden(*el));
            found = visible.into_iter().chain(hidden).collect();
        }
        log::debug!(
            "Resolved {:?} via strategy {} ({} match(es))",
            intent,
            rank + 1,
            found.len()
        );
        return Ok(found);
    }
    log::debug!("Resolved {:?}: no match", intent);
    Ok(Vec::new())
}

fn run<'a>(doc: &'a Document, strategy: &Strategy) -> Result<Vec<ElementRef<'a>>> {
    match strategy {
        Strategy::Css(selector) => doc.select(selector),
        Strategy::Scoped {
            scope,
            within,
            test,
        } => {
            let mut found = Vec::new();
            for container in doc.select(scope)? {
                for el in doc.select_within(container, within)? {
                    if !found.contains(&el) && passes(doc, el, test)? {
                        found.push(el);
                    }
                }
            }
            Ok(found)
        }
        Strategy::Broad { within, test } => {
            let mut found = Vec::new();
            for el in doc.select(within)? {
                if passes(doc, el, test)? {
                    found.push(el);
                }
            }
            Ok(found)
        }
    }
}

fn passes(doc: &Document, el: ElementRef<'_>, test: &Test) -> Result<bool> {
    let contains_any = |text: &str, list: &[String]| list.iter().any(|w| text.contains(w.as_str()));
    Ok(match test {
        Test::TextAny(list) => contains_any(&doc.text(el), list),
        Test::TextAll(list) => {
            let text = doc.text(el);
            list.iter().all(|w| text.contains(w.as_str()))
        }
        Test::TextOrValueAny(list) => {
            contains_any(&doc.text(el), list)
                || el.value().attr("value").is_some_and(|v| contains_any(v, list))
        }
        Test::LabelAny(list) => contains_any(&doc.label_text(el), list),
        Test::CalendarMarker => marker_text(doc, el)?.is_some(),
        Test::TimeSlotMarker => {
            let text = doc.text(el);
            text.contains("〇") || text.contains("○") || text == "O"
        }
    })
}

/// Displayed marker text when `el` marks an open or limited slot.
///
/// Disabled markers (property or a `disabled` class on the marker or an
/// ancestor) never count.
pub fn marker_text(doc: &Document, el: ElementRef<'_>) -> Result<Option<String>> {
    if doc.in_disabled_region(el) {
        return Ok(None);
    }
    let text = doc.text(el);
    let has_circle = !doc.select_within(el, CIRCLE_ICON)?.is_empty();
    if OPEN_MARKS.contains(&text.as_str()) || has_circle || text == "空き" || text.contains("空きあり") {
        return Ok(Some(if text.is_empty() { OPEN_MARKS[0].to_string() } else { text }));
    }
    if text == LIMITED_MARK || !doc.select_within(el, TRIANGLE_ICON)?.is_empty() {
        return Ok(Some(LIMITED_MARK.to_string()));
    }
    let is_toggle = el.value().classes().any(|c| c.contains("btn-toggle"));
    if is_toggle && !CLOSED_MARKS.contains(&text.as_str()) {
        return Ok(Some(if text.is_empty() { OPEN_MARKS[0].to_string() } else { text }));
    }
    Ok(None)
}

fn innermost(found: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    found
        .iter()
        .copied()
        .filter(|outer| {
            !found
                .iter()
                .any(|inner| inner != outer && ancestors_or_self(*inner).skip(1).any(|a| a == *outer))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse(&format!("<html><head></head><body>{body}</body></html>"))
    }

    #[test]
    fn test_structural_match_wins_over_label() {
        let page = doc(r#"
            <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P9"> テニス</label>
            <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P1"> 硬式テニス</label>
        "#);
        let found = resolve(&page, &Intent::Purpose(Choice::new("P1", "テニス"))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().attr("value"), Some("P1"));
    }

    #[test]
    fn test_label_fallback_when_code_is_stale() {
        let page = doc(r#"
            <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="X1"> テニス</label>
        "#);
        let found = resolve(&page, &Intent::Purpose(Choice::new("P1", "テニス"))).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_purpose_label_ignores_other_checkboxes() {
        let page = doc(r#"
            <label><input type="checkbox" name="Newsletter" value="N"> テニス教室のお知らせ</label>
            <label><input type="checkbox" name="HomeModel.DayOfWeek" value="1"> テニス</label>
        "#);
        assert!(resolve(&page, &Intent::Purpose(Choice::new("P1", "テニス"))).unwrap().is_empty());
    }

    #[test]
    fn test_miss_is_empty_not_error() {
        let page = doc("<p>メンテナンス中</p>");
        assert!(resolve(&page, &Intent::SearchAction).unwrap().is_empty());
        assert!(resolve(&page, &Intent::CalendarMarkers).unwrap().is_empty());
    }

    #[test]
    fn test_search_action_prefers_active_pane() {
        let page = doc(r#"
            <button class="btn-primary">検索</button>
            <div class="tab-content">
              <div class="tab-pane" id="a"><button class="btn-secondary">検索する</button></div>
              <div class="tab-pane active" id="b"><button class="btn-secondary" id="hit">検索</button></div>
            </div>
        "#);
        let found = resolve(&page, &Intent::SearchAction).unwrap();
        assert_eq!(found[0].value().id(), Some("hit"));
    }

    #[test]
    fn test_search_action_prefers_visible_candidate() {
        let page = doc(r#"
            <div style="display: none"><button class="btn-secondary" id="hidden">検索</button></div>
            <button class="btn-primary" id="shown">検索</button>
        "#);
        let found = resolve(&page, &Intent::SearchAction).unwrap();
        assert_eq!(found[0].value().id(), Some("shown"));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_search_action_broad_fallback() {
        let page = doc(r#"<input type="submit" value="この条件で検索"><a href="/help">ヘルプ</a>"#);
        let found = resolve(&page, &Intent::SearchAction).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().name(), "input");
    }

    #[test]
    fn test_next_action_priority() {
        let page = doc(r#"<a href="/n1">次へ</a><button>次へ進む</button>"#);
        let found = resolve(&page, &Intent::NextAction).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().name(), "button");
    }

    #[test]
    fn test_area_reveal_picks_innermost() {
        let page = doc(r#"<div class="outer"><div class="row"><span>区名で絞り込む</span></div></div>"#);
        let found = resolve(&page, &Intent::AreaFilterReveal).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().name(), "span");
    }

    #[test]
    fn test_facility_tiers() {
        let structural = doc(r#"<input type="checkbox" name="SelectedFacility" value="1" disabled>"#);
        assert_eq!(resolve(&structural, &Intent::FacilityOptions).unwrap().len(), 1);

        let vocabulary = doc(r#"
            <label><input type="checkbox" value="a"> 中スポーツセンター</label>
            <label><input type="checkbox" value="b"> メール配信を希望する</label>
        "#);
        let found = resolve(&vocabulary, &Intent::FacilityOptions).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().attr("value"), Some("a"));

        let fallback = doc(r#"<label><input type="checkbox" value="x"> 第1会場</label>"#);
        assert_eq!(resolve(&fallback, &Intent::FacilityOptions).unwrap().len(), 1);
    }

    #[test]
    fn test_calendar_markers() {
        let page = doc(r##"
            <table>
              <tr><th>施設</th><th>6/3(月)</th><th>6/4(火)</th><th>6/5(水)</th><th>6/6(木)</th><th>6/7(金)</th></tr>
              <tr>
                <td>中</td>
                <td><a href="#">〇</a></td>
                <td class="disabled"><a href="#">〇</a></td>
                <td><span class="fa fa-circle-o"></span></td>
                <td>△</td>
                <td>×</td>
              </tr>
            </table>
            <button class="btn-toggle">9:00</button>
            <button class="btn-toggle">✕</button>
            <button class="btn-toggle disabled">11:00</button>
        "##);
        let found = resolve(&page, &Intent::CalendarMarkers).unwrap();
        let texts: Vec<String> = found
            .iter()
            .map(|el| marker_text(&page, *el).unwrap().unwrap())
            .collect();
        assert_eq!(texts, vec!["〇", "〇", "△", "9:00"]);
    }

    #[test]
    fn test_time_slot_markers() {
        let page = doc(r#"
            <label class="btn-toggle">〇 9:00-11:00</label>
            <label class="btn-toggle disabled">〇 11:00-13:00</label>
            <label>× 13:00-15:00</label>
        "#);
        let found = resolve(&page, &Intent::TimeSlotMarkers).unwrap();
        assert_eq!(found.len(), 1);
    }
}

// src/steps/home.rs

//! Criteria form on the home page.

use chrono::NaiveDate;

use super::{StepContext, StepOutcome, set_checked};
use crate::dom::{ElementHandle, Intent, Page};
use crate::error::Result;
use crate::locale::Text;
use crate::models::{HOLIDAY_LABEL, SearchCriteria, Step, WEEKDAY_LABELS};

pub async fn run(ctx: &StepContext) -> Result<StepOutcome> {
    log::info!("Home step for task {}", ctx.task.id);
    ctx.report(Step::Home, Text::StepHome);

    let page = &ctx.page;
    let timing = ctx.timing();
    let criteria = ctx.criteria();

    if reveal_purposes(page).await?.is_empty() {
        log::warn!("No purpose controls on the form");
    }

    let mut matched = 0;
    for purpose in &criteria.purposes {
        match page.first(&Intent::Purpose(purpose.clone())).await? {
            Some(control) => {
                set_checked(page, &control, true, timing.toggle_ms).await?;
                matched += 1;
                log::info!("Selected purpose {} ({})", purpose.label, purpose.value);
            }
            None => log::warn!("Purpose not found: {} ({})", purpose.label, purpose.value),
        }
    }
    let checked = page
        .resolve(&Intent::PurposeOptions)
        .await?
        .iter()
        .filter(|c| c.checked)
        .count();
    log::debug!("{} purpose(s) checked, {} matched", checked, matched);
    if checked == 0 && matched == 0 {
        log::error!("No purpose could be selected for task {}", ctx.task.id);
        return Ok(StepOutcome::Aborted(
            ctx.catalog.text(Text::PurposeSelectFailed).to_string(),
        ));
    }

    if !criteria.areas.is_empty() {
        reveal_areas(page, timing.reveal_wait_ms).await?;
        for area in &criteria.areas {
            match page.first(&Intent::Area(area.clone())).await? {
                Some(control) => {
                    set_checked(page, &control, true, timing.toggle_ms).await?;
                    log::info!("Selected area {}", area.label);
                }
                None => log::warn!("Area not found: {} ({})", area.label, area.value),
            }
        }
    }

    set_date(page, &Intent::DateFrom, criteria.date_from).await?;
    set_date(page, &Intent::DateTo, criteria.date_to).await?;
    set_time(page, &Intent::TimeFrom, criteria.time_from.as_deref()).await?;
    set_time(page, &Intent::TimeTo, criteria.time_to.as_deref()).await?;

    if criteria.has_day_filter() {
        apply_day_filter(page, criteria, timing.day_toggle_ms).await?;
    }

    if let Some(mode) = page.first(&Intent::SearchModeRadio).await? {
        if set_checked(page, &mode, true, 0).await? {
            log::info!("Search mode set to available slots");
        }
    }

    page.pause(timing.submit_wait_ms).await;
    let Some(search) = page.wait_for(&Intent::SearchAction).await?.into_iter().next() else {
        log::error!("Search action not found");
        return Ok(StepOutcome::Aborted(
            ctx.catalog.text(Text::SearchActionMissing).to_string(),
        ));
    };
    ctx.commit(Step::FacilitySelect, &search).await
}

/// Purpose controls, clicking through the search tabs when none are rendered.
///
/// A tab's panel may fill in late, so each click waits up to the element
/// timeout for controls to appear.
async fn reveal_purposes(page: &Page) -> Result<Vec<ElementHandle>> {
    let found = page.resolve(&Intent::PurposeOptions).await?;
    if !found.is_empty() {
        return Ok(found);
    }
    for tab in page.resolve(&Intent::SearchTabs).await? {
        page.click(&tab).await?;
        page.pause(page.timing().tab_wait_ms).await;
        let found = page.wait_for(&Intent::PurposeOptions).await?;
        if !found.is_empty() {
            log::debug!("Purpose controls appeared after tab '{}'", tab.text);
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Open the area filter unless its controls are already shown.
async fn reveal_areas(page: &Page, wait_ms: u64) -> Result<()> {
    let areas = page.resolve(&Intent::AreaOptions).await?;
    if areas.iter().any(|a| !a.hidden) {
        return Ok(());
    }
    if let Some(reveal) = page.first(&Intent::AreaFilterReveal).await? {
        page.click(&reveal).await?;
        page.pause(wait_ms).await;
        log::debug!("Opened area filter");
    }
    Ok(())
}

async fn set_date(page: &Page, intent: &Intent, date: Option<NaiveDate>) -> Result<()> {
    let Some(date) = date else {
        return Ok(());
    };
    if let Some(input) = page.first(intent).await? {
        let value = date.format("%Y-%m-%d").to_string();
        if page.set_value(&input, &value).await? {
            log::info!("Set {:?} to {}", intent, value);
        }
    }
    Ok(())
}

async fn set_time(page: &Page, intent: &Intent, time: Option<&str>) -> Result<()> {
    let Some(time) = time else {
        return Ok(());
    };
    if let Some(input) = page.first(intent).await? {
        if page.set_value(&input, time).await? {
            log::info!("Set {:?} to {}", intent, time);
        }
    }
    Ok(())
}

/// Whether the day control labelled `label` should end up checked.
///
/// Unrecognised day controls are cleared.
fn wants_day_control(criteria: &SearchCriteria, label: &str) -> bool {
    if label.contains(HOLIDAY_LABEL) {
        return criteria.include_holiday;
    }
    WEEKDAY_LABELS
        .iter()
        .position(|day| label.contains(day))
        .is_some_and(|day| criteria.wants_day(day as u8))
}

async fn apply_day_filter(page: &Page, criteria: &SearchCriteria, settle_ms: u64) -> Result<()> {
    let controls = page.resolve(&Intent::DayOfWeekOptions).await?;
    if controls.is_empty() {
        log::debug!("No day-of-week controls, skipping day filter");
        return Ok(());
    }
    let mut toggled = 0;
    for control in &controls {
        if set_checked(page, control, wants_day_control(criteria, &control.label), settle_ms).await? {
            toggled += 1;
        }
    }
    log::info!("Day filter applied ({} control(s) changed)", toggled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::models::{Choice, Message, Step};
    use crate::steps::testing::{BASE, Harness, tennis};
    use crate::storage::Settings;
    use crate::surface::{PageAction, Surface};

    const PURPOSE_NAME: &str = "HomeModel.SearchByDateTimeModel.SelectedPurpose";

    fn home_page(search_type: &str) -> String {
        format!(
            r##"<html><head></head><body>
            <form action="/user/AvailabilityCheckApplySelectFacility">
              <div class="tab-content"><div class="tab-pane active" id="datetime">
                <label><input type="checkbox" name="{PURPOSE_NAME}" value="P1"> テニス</label>
                <label><input type="checkbox" name="{PURPOSE_NAME}" value="P2" checked> 野球</label>
                <button type="button" data-toggle="collapse" data-target="#areas">区名で絞り込む</button>
                <div id="areas" style="display:none">
                  <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedArea" value="A1"> 中区</label>
                </div>
                <input type="date" name="HomeModel.DateFrom">
                <input type="date" name="HomeModel.DateTo">
                <select id="HomeModel_TimeFrom" name="HomeModel.TimeFrom"><option value="0900">9:00</option><option value="1800">18:00</option></select>
                <label><input type="checkbox" name="HomeModel.DayOfWeek" value="1" checked> 月曜日</label>
                <label><input type="checkbox" name="HomeModel.DayOfWeek" value="2"> 火曜日</label>
                <label><input type="checkbox" name="HomeModel.DayOfWeek" value="3"> 水曜日</label>
                <label><input type="checkbox" name="HomeModel.DayOfWeek" value="5"> 金曜日</label>
                <label><input type="checkbox" name="HomeModel.DayOfWeek" value="7"> 祝日</label>
                <label><input type="radio" name="SearchTarget" value="0" checked> 施設</label>
                <label><input type="radio" name="SearchTarget" value="1"> 空きコマ</label>
                <button class="btn-secondary" type="{search_type}">検索</button>
              </div></div>
            </form>
            </body></html>"##
        )
    }

    async fn checked(h: &Harness, css: &str) -> bool {
        let snapshot = h.surface.snapshot().await.unwrap();
        let doc = Document::from_snapshot(&snapshot);
        let el = doc.select(css).unwrap()[0];
        doc.is_checked(el)
    }

    async fn locator_of(h: &Harness, css: &str) -> String {
        let snapshot = h.surface.snapshot().await.unwrap();
        let doc = Document::from_snapshot(&snapshot);
        crate::dom::locator(doc.select(css).unwrap()[0])
    }

    #[tokio::test]
    async fn test_fills_form_and_submits() {
        let mut h = Harness::open("/user/Home", &home_page("submit")).await;
        h.browser
            .site()
            .set_page("/user/AvailabilityCheckApplySelectFacility", "<html><body>facility</body></html>");
        let criteria = SearchCriteria {
            areas: vec![Choice::new("A1", "中区")],
            date_from: NaiveDate::from_ymd_opt(2024, 6, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 6, 14),
            time_from: Some("1800".to_string()),
            days_of_week: [1, 3, 5].into_iter().collect(),
            include_holiday: true,
            ..tennis()
        };
        let date_from = locator_of(&h, r#"input[name="HomeModel.DateFrom"]"#).await;
        let area = locator_of(&h, r#"input[value="A1"]"#).await;

        let ctx = h.context(criteria, Settings::default()).await;
        let outcome = run(&ctx).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(Step::FacilitySelect));

        let actions: Vec<PageAction> = h.surface.actions().into_iter().map(|(_, a)| a).collect();
        assert!(actions.contains(&PageAction::SetValue {
            locator: date_from,
            value: "2024-06-01".to_string()
        }));
        assert!(actions.contains(&PageAction::Toggle(area)));
        assert!(matches!(actions.last(), Some(PageAction::Click(_))));
        assert_eq!(
            h.surface.url(),
            format!("{BASE}/user/AvailabilityCheckApplySelectFacility")
        );
        assert_eq!(
            h.tasks.active().await.unwrap().unwrap().step,
            Step::FacilitySelect
        );

        let messages: Vec<Message> = h.messages();
        assert!(matches!(
            &messages[0],
            Message::StepComplete { step: Step::Home, .. }
        ));
    }

    #[tokio::test]
    async fn test_day_filter_final_state() {
        let h = Harness::open("/user/Home", &home_page("submit")).await;
        let criteria = SearchCriteria {
            days_of_week: [1, 3, 5].into_iter().collect(),
            ..tennis()
        };
        let ctx = h.context(criteria.clone(), Settings::default()).await;
        apply_day_filter(&ctx.page, &criteria, 0).await.unwrap();

        let mut on = Vec::new();
        for value in ["1", "2", "3", "5", "7"] {
            if checked(&h, &format!(r#"input[name="HomeModel.DayOfWeek"][value="{value}"]"#)).await {
                on.push(value);
            }
        }
        assert_eq!(on, vec!["1", "3", "5"]);
    }

    #[tokio::test]
    async fn test_day_filter_with_holiday() {
        let h = Harness::open("/user/Home", &home_page("submit")).await;
        let criteria = SearchCriteria {
            days_of_week: [1, 3, 5].into_iter().collect(),
            include_holiday: true,
            ..tennis()
        };
        let ctx = h.context(criteria.clone(), Settings::default()).await;
        apply_day_filter(&ctx.page, &criteria, 0).await.unwrap();

        let mut on = Vec::new();
        for value in ["1", "2", "3", "5", "7"] {
            if checked(&h, &format!(r#"input[name="HomeModel.DayOfWeek"][value="{value}"]"#)).await {
                on.push(value);
            }
        }
        assert_eq!(on, vec!["1", "3", "5", "7"]);
    }

    #[tokio::test]
    async fn test_only_requested_purpose_is_toggled() {
        let h = Harness::open("/user/Home", &home_page("submit")).await;
        let p1 = locator_of(&h, &format!(r#"input[name="{PURPOSE_NAME}"][value="P1"]"#)).await;
        let p2 = locator_of(&h, &format!(r#"input[name="{PURPOSE_NAME}"][value="P2"]"#)).await;
        h.browser
            .site()
            .set_page("/user/AvailabilityCheckApplySelectFacility", "<html><body>facility</body></html>");

        let ctx = h.context(tennis(), Settings::default()).await;
        run(&ctx).await.unwrap();

        let toggled: Vec<PageAction> = h.surface.actions().into_iter().map(|(_, a)| a).collect();
        assert!(toggled.contains(&PageAction::Toggle(p1)));
        // Already checked on the page, so it is left alone.
        assert!(!toggled.contains(&PageAction::Toggle(p2)));
    }

    #[tokio::test]
    async fn test_rerun_on_same_document_is_idempotent() {
        // A script-driven search button does not navigate, so a second run
        // sees the same document load as the first.
        let h = Harness::open("/user/Home", &home_page("button")).await;
        let ctx = h.context(tennis(), Settings::default()).await;

        let first = run(&ctx).await.unwrap();
        let second = run(&ctx).await.unwrap();
        assert_eq!(first, StepOutcome::Advanced(Step::FacilitySelect));
        assert_eq!(second, StepOutcome::Skipped);

        let actions = h.surface.actions();
        let toggles = actions
            .iter()
            .filter(|(_, a)| matches!(a, PageAction::Toggle(_)))
            .count();
        let clicks = actions
            .iter()
            .filter(|(_, a)| matches!(a, PageAction::Click(_)))
            .count();
        // P1 and the search mode radio
        assert_eq!(toggles, 2);
        assert_eq!(clicks, 1);
        assert!(checked(&h, &format!(r#"input[name="{PURPOSE_NAME}"][value="P1"]"#)).await);
        assert!(checked(&h, &format!(r#"input[name="{PURPOSE_NAME}"][value="P2"]"#)).await);
    }

    #[tokio::test]
    async fn test_unknown_purpose_aborts() {
        let page = r#"<html><body><form>
            <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P1"> テニス</label>
            <button class="btn-primary">検索</button></form></body></html>"#;
        let h = Harness::open("/user/Home", page).await;
        let criteria = SearchCriteria {
            purposes: vec![Choice::new("X9", "カバディ")],
            ..SearchCriteria::default()
        };
        let ctx = h.context(criteria, Settings::default()).await;
        let outcome = run(&ctx).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Aborted(ref text) if text.contains("利用目的")));
        assert!(h.surface.actions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_search_action_aborts() {
        let page = r#"<html><body>
            <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P1"> テニス</label>
            </body></html>"#;
        let h = Harness::open("/user/Home", page).await;
        let ctx = h.context(tennis(), Settings::default()).await;
        let outcome = run(&ctx).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Aborted(ref text) if text.contains("検索ボタン")));
    }

    #[tokio::test]
    async fn test_tries_search_tabs_when_form_is_empty() {
        let page = r##"<html><body>
            <a role="tab" href="#facility" aria-controls="facility">施設から探す</a>
            <a role="tab" href="#purpose" aria-controls="purpose">利用目的から探す</a>
            <div class="tab-content">
              <div class="tab-pane active" id="facility"><p>施設</p></div>
              <div class="tab-pane" id="purpose"></div>
            </div>
            </body></html>"##;
        let h = Harness::open("/user/Home", page).await;
        let ctx = h.context(tennis(), Settings::default()).await;
        let outcome = run(&ctx).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Aborted(_)));
        let clicks: Vec<PageAction> = h.surface.actions().into_iter().map(|(_, a)| a).collect();
        assert_eq!(clicks.len(), 1);
    }

    #[test]
    fn test_wants_day_control() {
        let criteria = SearchCriteria {
            days_of_week: [0, 6].into_iter().collect(),
            include_holiday: false,
            ..tennis()
        };
        assert!(wants_day_control(&criteria, "日曜日"));
        assert!(wants_day_control(&criteria, "土曜日"));
        assert!(!wants_day_control(&criteria, "月曜日"));
        assert!(!wants_day_control(&criteria, "祝日"));
        assert!(!wants_day_control(&criteria, "その他"));
    }
}

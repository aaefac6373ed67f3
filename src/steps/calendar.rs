// src/steps/calendar.rs

//! Availability calendar.

use super::scan::{self, Scan};
use super::{StepContext, StepOutcome};
use crate::error::Result;
use crate::locale::Text;
use crate::models::{Claim, Message, Step};

pub async fn run(ctx: &StepContext) -> Result<StepOutcome> {
    log::info!("Calendar step for task {}", ctx.task.id);
    ctx.report(Step::Calendar, Text::StepCalendar);

    let criteria = ctx.criteria().clone();
    let found = ctx.page.inspect(|doc| scan::calendar(doc, &criteria)).await?;
    log::info!(
        "Calendar shows {} slot(s) across {} facility heading(s)",
        found.result.total_slots(),
        found.result.facilities.len()
    );
    report(ctx, found).await
}

/// Send one scan result for this load, then point the user at the slots.
pub(super) async fn report(ctx: &StepContext, found: Scan) -> Result<StepOutcome> {
    match ctx.claim(Step::Done).await? {
        Claim::Granted => {}
        Claim::AlreadyClaimed => return Ok(StepOutcome::Skipped),
        Claim::Stale => return Ok(StepOutcome::Superseded),
    }
    let total = found.result.total_slots();
    ctx.send(Message::AvailabilityResults {
        results: found.result,
    });
    for locator in &found.found {
        ctx.page.highlight(locator).await?;
    }
    Ok(StepOutcome::Reported(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchCriteria;
    use crate::steps::testing::{Harness, tennis};
    use crate::storage::Settings;
    use crate::surface::PageAction;

    const PAGE: &str = r##"<html><body>
        <h3>中スポーツセンター</h3>
        <table>
          <tr><th>室場</th><th>6/3(月)</th><th>6/4(火)</th><th>6/5(水)</th><th>6/6(木)</th></tr>
          <tr><td>体育室</td><td><a href="#">〇</a></td><td>〇</td><td>△</td><td>×</td></tr>
        </table>
    </body></html>"##;

    #[tokio::test]
    async fn test_reports_once_per_load() {
        let mut h = Harness::open("/user/VacantFrameFacilityStatus", PAGE).await;
        let ctx = h.context(tennis(), Settings::default()).await;

        assert_eq!(run(&ctx).await.unwrap(), StepOutcome::Reported(3));
        assert_eq!(run(&ctx).await.unwrap(), StepOutcome::Skipped);

        let results: Vec<_> = h
            .messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::AvailabilityResults { results } => Some(results),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].facilities[0].facility, "中スポーツセンター");
        assert_eq!(results[0].total_slots(), 3);

        let highlights = h
            .surface
            .actions()
            .iter()
            .filter(|(_, a)| matches!(a, PageAction::Highlight(_)))
            .count();
        assert_eq!(highlights, 3);
        assert_eq!(h.tasks.active().await.unwrap().unwrap().step, Step::Done);
    }

    #[tokio::test]
    async fn test_weekday_filter_applies() {
        let mut h = Harness::open("/user/VacantFrameFacilityStatus", PAGE).await;
        let criteria = SearchCriteria {
            days_of_week: [2].into_iter().collect(),
            ..tennis()
        };
        let ctx = h.context(criteria, Settings::default()).await;
        assert_eq!(run(&ctx).await.unwrap(), StepOutcome::Reported(1));
        assert!(h
            .messages()
            .iter()
            .any(|m| matches!(m, Message::AvailabilityResults { results } if results.total_slots() == 1)));
    }

    #[tokio::test]
    async fn test_empty_calendar_still_reports() {
        let mut h = Harness::open(
            "/user/VacantFrameFacilityStatus",
            "<html><body><h3>中スポーツセンター</h3><p>空きはありません</p></body></html>",
        )
        .await;
        let ctx = h.context(tennis(), Settings::default()).await;
        assert_eq!(run(&ctx).await.unwrap(), StepOutcome::Reported(0));
        assert!(h
            .messages()
            .iter()
            .any(|m| matches!(m, Message::AvailabilityResults { results } if results.is_empty())));
    }

    #[tokio::test]
    async fn test_superseded_task_does_not_report() {
        let mut h = Harness::open("/user/VacantFrameFacilityStatus", PAGE).await;
        let ctx = h.context(tennis(), Settings::default()).await;
        h.tasks
            .begin(tennis(), crate::models::Trigger::Scheduled)
            .await
            .unwrap();
        assert_eq!(run(&ctx).await.unwrap(), StepOutcome::Superseded);
        assert!(!h
            .messages()
            .iter()
            .any(|m| matches!(m, Message::AvailabilityResults { .. })));
    }
}

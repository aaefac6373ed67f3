// src/steps/timeslot.rs

//! Time-slot grid of a single facility.

use super::calendar::report;
use super::scan;
use super::{StepContext, StepOutcome};
use crate::error::Result;
use crate::locale::Text;
use crate::models::Step;

pub async fn run(ctx: &StepContext) -> Result<StepOutcome> {
    log::info!("Time slot step for task {}", ctx.task.id);
    ctx.report(Step::TimeSlot, Text::StepTimeSlot);

    let found = ctx.page.inspect(scan::time_slots).await?;
    log::info!("Time grid shows {} open slot(s)", found.result.total_slots());
    report(ctx, found).await
}

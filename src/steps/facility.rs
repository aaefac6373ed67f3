// src/steps/facility.rs

//! Facility selection.
//!
//! The facility list is already narrowed to the requested areas by the
//! criteria form, so every enabled option is selected. Which controls count
//! as facility options is decided by the resolver's tiers: named facility
//! inputs, then checkboxes labelled with facility vocabulary, then every
//! checkbox.

use super::{StepContext, StepOutcome, set_checked};
use crate::dom::Intent;
use crate::error::Result;
use crate::locale::Text;
use crate::models::Step;

pub async fn run(ctx: &StepContext) -> Result<StepOutcome> {
    log::info!("Facility step for task {}", ctx.task.id);
    ctx.report(Step::FacilitySelect, Text::StepFacility);

    let page = &ctx.page;
    let options = page.wait_for(&Intent::FacilityOptions).await?;
    let mut selected = 0;
    for option in options.iter().filter(|o| !o.disabled) {
        if set_checked(page, option, true, 0).await? {
            selected += 1;
        }
    }
    log::info!(
        "Selected {} of {} facility option(s)",
        selected,
        options.len()
    );

    page.pause(ctx.timing().submit_wait_ms).await;
    let Some(next) = page.wait_for(&Intent::NextAction).await?.into_iter().next() else {
        log::error!("Next action not found");
        return Ok(StepOutcome::Aborted(
            ctx.catalog.text(Text::NextActionMissing).to_string(),
        ));
    };
    ctx.commit(Step::Calendar, &next).await
}

// src/steps/login.rs

//! Login page.
//!
//! Without stored credentials, or when the form cannot be driven, the user
//! is asked to log in by hand and the task stays active.

use super::{StepContext, StepOutcome};
use crate::dom::Intent;
use crate::error::Result;
use crate::locale::Text;
use crate::models::Step;

pub async fn run(ctx: &StepContext) -> Result<StepOutcome> {
    log::info!("Login step for task {}", ctx.task.id);
    ctx.report(Step::Login, Text::StepLogin);

    let Some((login_id, login_pw)) = ctx.settings.credentials() else {
        log::info!("No stored credentials, waiting for manual login");
        ctx.report(Step::Login, Text::LoginMissing);
        return Ok(StepOutcome::AwaitingUser);
    };

    let page = &ctx.page;
    let (Some(user), Some(password)) = (
        page.first(&Intent::LoginUser).await?,
        page.first(&Intent::LoginPassword).await?,
    ) else {
        log::warn!("Login form fields not found");
        ctx.report(Step::Login, Text::LoginFormMissing);
        return Ok(StepOutcome::AwaitingUser);
    };

    let settle = ctx.timing().toggle_ms;
    page.set_value(&user, login_id).await?;
    page.pause(settle).await;
    page.set_value(&password, login_pw).await?;
    page.pause(settle).await;

    let Some(action) = page.first(&Intent::LoginAction).await? else {
        log::warn!("Login action not found");
        ctx.report(Step::Login, Text::LoginFormMissing);
        return Ok(StepOutcome::AwaitingUser);
    };
    ctx.commit(Step::Login, &action).await
}

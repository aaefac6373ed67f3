// src/steps/dictionary.rs

//! Purpose and area enumeration for the dictionary sync.

use crate::dom::{ElementHandle, Intent, Page};
use crate::error::Result;
use crate::models::{Choice, Collected, TimingConfig};

fn choices(controls: &[ElementHandle]) -> Vec<Choice> {
    let mut out: Vec<Choice> = Vec::new();
    for control in controls {
        let Some(value) = control.value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        if control.label.is_empty() || out.iter().any(|c| c.value == value) {
            continue;
        }
        out.push(Choice::new(value, control.label.clone()));
    }
    out
}

/// Read every purpose and area the home page offers.
///
/// Opens the purpose tab and the area filter first; both are optional.
pub async fn collect(page: &Page, timing: &TimingConfig) -> Result<Collected> {
    match page.first(&Intent::PurposeTab).await? {
        Some(tab) => page.click(&tab).await?,
        None => log::debug!("Purpose tab not found, reading the current form"),
    }
    page.pause(timing.sync_purpose_wait_ms).await;
    let purposes = choices(&page.resolve(&Intent::PurposeOptions).await?);

    if let Some(reveal) = page.first(&Intent::AreaFilterReveal).await? {
        page.click(&reveal).await?;
    }
    page.pause(timing.sync_area_wait_ms).await;
    let areas = choices(&page.resolve(&Intent::AreaOptions).await?);

    log::info!(
        "Collected {} purpose(s) and {} area(s)",
        purposes.len(),
        areas.len()
    );
    Ok(Collected { purposes, areas })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::Harness;
    use crate::storage::Settings;

    #[tokio::test]
    async fn test_collects_purposes_and_areas() {
        let page = r##"<html><body>
            <a role="tab" href="#p" aria-controls="p">利用目的から探す</a>
            <div class="tab-content">
              <div class="tab-pane" id="p">
                <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P1"> テニス</label>
                <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P2"> 野球</label>
                <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value="P2"> 野球</label>
                <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedPurpose" value=""> 未設定</label>
              </div>
            </div>
            <button type="button" data-toggle="collapse" data-target="#a">区名で絞り込む</button>
            <div id="a" style="display:none">
              <label><input type="checkbox" name="HomeModel.SearchByDateTimeModel.SelectedArea" value="A1"> 中区</label>
            </div>
        </body></html>"##;
        let h = Harness::open("/user/Home", page).await;
        let ctx = h.context(crate::steps::testing::tennis(), Settings::default()).await;
        let collected = collect(&ctx.page, &TimingConfig::instant()).await.unwrap();
        assert_eq!(
            collected.purposes,
            vec![Choice::new("P1", "テニス"), Choice::new("P2", "野球")]
        );
        assert_eq!(collected.areas, vec![Choice::new("A1", "中区")]);
        assert!(collected.is_usable());
    }

    #[tokio::test]
    async fn test_empty_page_collects_nothing() {
        let h = Harness::open("/user/Home", "<html><body><p>メンテナンス中</p></body></html>").await;
        let ctx = h.context(crate::steps::testing::tennis(), Settings::default()).await;
        let collected = collect(&ctx.page, &TimingConfig::instant()).await.unwrap();
        assert!(!collected.is_usable());
    }
}

// src/dom/page.rs

//! Async access to one document load of a surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use super::document::{Document, ElementHandle};
use super::resolver::{Intent, resolve};
use crate::error::{AppError, Result};
use crate::models::TimingConfig;
use crate::surface::{PageAction, PageSnapshot, Surface};

/// A surface pinned to the document load an executor was invoked for.
///
/// Every read re-snapshots the page; a snapshot from a different load means
/// the page navigated underneath the executor and is reported as an error.
#[derive(Clone)]
pub struct Page {
    surface: Arc<dyn Surface>,
    load_id: String,
    timing: TimingConfig,
}

impl Page {
    pub fn new(surface: Arc<dyn Surface>, load_id: impl Into<String>, timing: TimingConfig) -> Self {
        Self {
            surface,
            load_id: load_id.into(),
            timing,
        }
    }

    pub fn load_id(&self) -> &str {
        &self.load_id
    }

    pub fn surface_id(&self) -> u64 {
        self.surface.id()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot> {
        let snapshot = self.surface.snapshot().await?;
        if snapshot.load_id != self.load_id {
            return Err(AppError::surface(
                format!("surface {}", self.surface.id()),
                format!("page navigated away (expected {}, now {})", self.load_id, snapshot.load_id),
            ));
        }
        Ok(snapshot)
    }

    /// Run a synchronous inspection against a fresh snapshot.
    pub async fn inspect<T>(&self, f: impl FnOnce(&Document) -> Result<T>) -> Result<T> {
        let snapshot = self.snapshot().await?;
        let doc = Document::from_snapshot(&snapshot);
        f(&doc)
    }

    pub async fn resolve(&self, intent: &Intent) -> Result<Vec<ElementHandle>> {
        self.inspect(|doc| {
            Ok(resolve(doc, intent)?
                .into_iter()
                .map(|el| doc.handle(el))
                .collect())
        })
        .await
    }

    pub async fn first(&self, intent: &Intent) -> Result<Option<ElementHandle>> {
        Ok(self.resolve(intent).await?.into_iter().next())
    }

    /// Poll until `intent` resolves or the element timeout elapses.
    ///
    /// Gives up with an empty vector rather than an error.
    pub async fn wait_for(&self, intent: &Intent) -> Result<Vec<ElementHandle>> {
        let deadline = Instant::now() + self.timing.element_timeout();
        loop {
            let found = self.resolve(intent).await?;
            if !found.is_empty() || Instant::now() >= deadline {
                if found.is_empty() {
                    log::debug!("Gave up waiting for {:?}", intent);
                }
                return Ok(found);
            }
            sleep(self.timing.poll()).await;
        }
    }

    pub async fn click(&self, target: &ElementHandle) -> Result<()> {
        log::debug!("Click {} ({})", target.locator, target.text);
        self.surface
            .perform(PageAction::Click(target.locator.clone()))
            .await
    }

    pub async fn toggle(&self, target: &ElementHandle) -> Result<()> {
        log::debug!("Toggle {} ({})", target.locator, target.label);
        self.surface
            .perform(PageAction::Toggle(target.locator.clone()))
            .await
    }

    /// Set a value unless it already holds it; true when changed.
    pub async fn set_value(&self, target: &ElementHandle, value: &str) -> Result<bool> {
        if target.value.as_deref() == Some(value) {
            return Ok(false);
        }
        log::debug!("Set {} = {}", target.locator, value);
        self.surface
            .perform(PageAction::SetValue {
                locator: target.locator.clone(),
                value: value.to_string(),
            })
            .await?;
        Ok(true)
    }

    pub async fn highlight(&self, locator: &str) -> Result<()> {
        self.surface
            .perform(PageAction::Highlight(locator.to_string()))
            .await
    }

    pub async fn pause(&self, millis: u64) {
        if millis > 0 {
            sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::{Harness, tennis};
    use crate::storage::Settings;

    #[tokio::test]
    async fn test_wait_for_returns_present_element() {
        let h = Harness::open("/user/Home", r#"<html><body><button>検索</button></body></html>"#).await;
        let ctx = h.context(tennis(), Settings::default()).await;
        let found = ctx.page.wait_for(&Intent::SearchAction).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "検索");
    }

    #[tokio::test]
    async fn test_wait_for_gives_up_after_timeout() {
        let h = Harness::open("/user/Home", "<html><body><p>読み込み中</p></body></html>").await;
        let ctx = h.context(tennis(), Settings::default()).await;
        let started = Instant::now();
        let found = ctx.page.wait_for(&Intent::NextAction).await.unwrap();
        assert!(found.is_empty());
        assert!(started.elapsed() >= ctx.page.timing().element_timeout());
    }
}

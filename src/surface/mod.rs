//! Browser surfaces (tabs) hosting the automated site.
//!
//! A surface exposes the page as a serialized [`PageSnapshot`] plus a small
//! set of [`PageAction`]s addressed by locator. Elements are never held across
//! an await; every interaction re-reads the page.
//!
//! ## Locators
//!
//! A locator is a CSS path from the root element: `html`, then one
//! `tag:nth-child(n)` segment per level joined by ` > `, where `n` counts
//! element siblings from 1. The memory backend and the page-side script of the
//! DevTools backend compute it the same way.

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;

/// DOM properties that serialized HTML does not reflect.
///
/// A `Some` here wins over the corresponding attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Rendered hidden (display:none on itself or an ancestor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// The page at one instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    /// Identifies the document load this snapshot belongs to
    pub load_id: String,
    pub html: String,
    /// Keyed by locator
    #[serde(default)]
    pub live: HashMap<String, LiveState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// Plain click
    Click(String),
    /// Flip a checkbox or select a radio through its label when it has one,
    /// then fire input and change
    Toggle(String),
    /// Set a value through the native setter, then fire input and change
    SetValue { locator: String, value: String },
    /// Outline an element to point the user at it
    Highlight(String),
}

impl PageAction {
    pub fn locator(&self) -> &str {
        match self {
            PageAction::Click(l) | PageAction::Toggle(l) | PageAction::Highlight(l) => l,
            PageAction::SetValue { locator, .. } => locator,
        }
    }
}

/// A completed document load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoad {
    /// Increments on every load within the surface
    pub seq: u64,
    pub url: String,
    pub load_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Foreground tab; scheduled runs open in the background
    pub active: bool,
    pub pinned: bool,
}

/// One tab.
#[async_trait]
pub trait Surface: Send + Sync {
    fn id(&self) -> u64;

    async fn snapshot(&self) -> Result<PageSnapshot>;

    async fn perform(&self, action: PageAction) -> Result<()>;

    /// Latest completed load; `None` until the first one.
    fn loads(&self) -> watch::Receiver<Option<PageLoad>>;

    async fn focus(&self) -> Result<()>;

    async fn set_pinned(&self, pinned: bool) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Opens surfaces.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self, url: &str, options: OpenOptions) -> Result<Arc<dyn Surface>>;
}

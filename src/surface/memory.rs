// src/surface/memory.rs

//! In-process scripted site.
//!
//! A [`MemorySite`] maps URL paths to HTML. Surfaces opened on it interpret
//! actions the way a browser would for plain markup:
//!
//! - a label drives its control (`for` or a descendant input)
//! - a checkbox flips; a radio selects itself and clears its group
//! - a tab (`role=tab`, `data-toggle=tab`) shows the pane it names and hides
//!   the pane's siblings
//! - a collapse toggle (`data-toggle=collapse`) shows its target
//! - `a[href]`, `data-href` and submit buttons inside `form[action]` navigate
//!
//! Navigation replaces the document and discards all live state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scraper::ElementRef;
use tokio::sync::watch;
use url::Url;

use super::{Browser, LiveState, OpenOptions, PageAction, PageLoad, PageSnapshot, Surface};
use crate::dom::document::{Document, ancestors_or_self, locator};
use crate::error::{AppError, Result};

const NOT_FOUND: &str = "<html><head><title>404</title></head><body><h1>Not Found</h1></body></html>";

/// URL path to page markup.
#[derive(Debug, Default)]
pub struct MemorySite {
    pages: Mutex<HashMap<String, String>>,
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `path` (matched case-insensitively, query ignored).
    pub fn with_page(self, path: &str, html: impl Into<String>) -> Self {
        self.set_page(path, html);
        self
    }

    pub fn set_page(&self, path: &str, html: impl Into<String>) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(path.to_lowercase(), html.into());
        }
    }

    fn page(&self, url: &str) -> String {
        let path = Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());
        self.pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(&path).cloned())
            .unwrap_or_else(|| NOT_FOUND.to_string())
    }
}

/// Opens [`MemorySurface`]s and keeps every one it opened.
pub struct MemoryBrowser {
    site: Arc<MemorySite>,
    next_id: AtomicU64,
    opened: Mutex<Vec<Arc<MemorySurface>>>,
}

impl MemoryBrowser {
    pub fn new(site: MemorySite) -> Self {
        Self {
            site: Arc::new(site),
            next_id: AtomicU64::new(1),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn site(&self) -> &MemorySite {
        &self.site
    }

    pub fn surfaces(&self) -> Vec<Arc<MemorySurface>> {
        self.opened.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_surface(&self) -> Option<Arc<MemorySurface>> {
        self.surfaces().pop()
    }
}

#[async_trait]
impl Browser for MemoryBrowser {
    async fn open(&self, url: &str, options: OpenOptions) -> Result<Arc<dyn Surface>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let surface = Arc::new(MemorySurface::open(id, self.site.clone(), url, options));
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(surface.clone());
        }
        log::debug!("Opened memory surface {} at {}", id, url);
        Ok(surface)
    }
}

#[derive(Debug)]
struct State {
    url: String,
    html: String,
    live: HashMap<String, LiveState>,
    seq: u64,
    load_id: String,
    closed: bool,
    focused: bool,
    pinned: bool,
    actions: Vec<(u64, PageAction)>,
}

pub struct MemorySurface {
    id: u64,
    site: Arc<MemorySite>,
    state: Mutex<State>,
    loads: watch::Sender<Option<PageLoad>>,
}

/// Effect of an action on the current document.
enum Effect {
    Live(Vec<(String, LiveState)>),
    Navigate(String),
    None,
}

impl MemorySurface {
    fn open(id: u64, site: Arc<MemorySite>, url: &str, options: OpenOptions) -> Self {
        let (loads, _) = watch::channel(None);
        let surface = Self {
            id,
            site,
            state: Mutex::new(State {
                url: String::new(),
                html: String::new(),
                live: HashMap::new(),
                seq: 0,
                load_id: String::new(),
                closed: false,
                focused: options.active,
                pinned: options.pinned,
                actions: Vec::new(),
            }),
            loads,
        };
        surface.navigate(url);
        surface
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::surface(self.context(), "state lock poisoned"))
    }

    fn context(&self) -> String {
        format!("memory surface {}", self.id)
    }

    fn navigate(&self, url: &str) {
        let html = self.site.page(url);
        let load = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.seq += 1;
            state.url = url.to_string();
            state.html = html;
            state.live.clear();
            state.load_id = format!("mem-{}-{}", self.id, state.seq);
            PageLoad {
                seq: state.seq,
                url: state.url.clone(),
                load_id: state.load_id.clone(),
            }
        };
        log::debug!("Surface {} loaded {} ({})", self.id, load.url, load.load_id);
        self.loads.send_replace(Some(load));
    }

    pub fn url(&self) -> String {
        self.lock().map(|s| s.url.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed).unwrap_or(true)
    }

    pub fn is_focused(&self) -> bool {
        self.lock().map(|s| s.focused).unwrap_or(false)
    }

    pub fn is_pinned(&self) -> bool {
        self.lock().map(|s| s.pinned).unwrap_or(false)
    }

    /// Number of document loads so far.
    pub fn load_count(&self) -> u64 {
        self.lock().map(|s| s.seq).unwrap_or(0)
    }

    /// Every action performed, tagged with the load it was performed on.
    pub fn actions(&self) -> Vec<(u64, PageAction)> {
        self.lock().map(|s| s.actions.clone()).unwrap_or_default()
    }

    /// Current checked state of the control at `locator`.
    pub fn is_checked(&self, target: &str) -> bool {
        let Ok(snapshot) = self.snapshot_now() else {
            return false;
        };
        let doc = Document::from_snapshot(&snapshot);
        doc.find(target).is_some_and(|el| doc.is_checked(el))
    }

    fn snapshot_now(&self) -> Result<PageSnapshot> {
        let state = self.lock()?;
        if state.closed {
            return Err(AppError::surface(self.context(), "surface is closed"));
        }
        Ok(PageSnapshot {
            url: state.url.clone(),
            load_id: state.load_id.clone(),
            html: state.html.clone(),
            live: state.live.clone(),
        })
    }

    fn effect(&self, snapshot: &PageSnapshot, action: &PageAction) -> Result<Effect> {
        let doc = Document::from_snapshot(snapshot);
        let el = doc.find(action.locator()).ok_or_else(|| {
            AppError::surface(self.context(), format!("no element at {}", action.locator()))
        })?;
        Ok(match action {
            PageAction::Toggle(_) | PageAction::Click(_) => click_effect(&doc, el, &snapshot.url)?,
            PageAction::SetValue { locator, value } => Effect::Live(vec![(
                locator.clone(),
                LiveState {
                    value: Some(value.clone()),
                    ..LiveState::default()
                },
            )]),
            PageAction::Highlight(_) => Effect::None,
        })
    }
}

fn click_effect(doc: &Document, el: ElementRef<'_>, url: &str) -> Result<Effect> {
    let element = el.value();
    if element.name() == "label" {
        return match label_control(doc, el)? {
            Some(control) => Ok(check_effect(doc, control)),
            None => Ok(Effect::None),
        };
    }
    if is_check_control(el) {
        return Ok(check_effect(doc, el));
    }
    if doc.in_disabled_region(el) {
        return Ok(Effect::None);
    }

    let toggle = element
        .attr("data-bs-toggle")
        .or_else(|| element.attr("data-toggle"));
    let target = element
        .attr("aria-controls")
        .map(|id| format!("#{id}"))
        .or_else(|| element.attr("data-bs-target").map(str::to_string))
        .or_else(|| element.attr("data-target").map(str::to_string))
        .or_else(|| element.attr("href").filter(|h| h.starts_with('#')).map(str::to_string));

    if element.attr("role") == Some("tab") || toggle == Some("tab") || toggle == Some("pill") {
        if let Some(target) = target.as_deref() {
            return tab_effect(doc, target);
        }
    }
    if toggle == Some("collapse") {
        if let Some(target) = target.as_deref() {
            let shown = doc
                .select(target)?
                .into_iter()
                .map(|pane| (locator(pane), visible(false)))
                .collect();
            return Ok(Effect::Live(shown));
        }
    }

    let href = element
        .attr("data-href")
        .or_else(|| element.attr("href").filter(|h| !h.starts_with('#') && !h.starts_with("javascript:")));
    if let Some(href) = href {
        return Ok(Effect::Navigate(join(url, href)));
    }

    let submits = match element.name() {
        "button" => element.attr("type").is_none_or(|t| t.eq_ignore_ascii_case("submit")),
        "input" => element.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("submit")),
        _ => false,
    };
    if submits {
        if let Some(form) = ancestors_or_self(el).find(|n| n.value().name() == "form") {
            let action = element
                .attr("formaction")
                .or_else(|| form.value().attr("action"))
                .unwrap_or("");
            return Ok(Effect::Navigate(join(url, action)));
        }
    }
    Ok(Effect::None)
}

fn join(base: &str, href: &str) -> String {
    crate::utils::resolve(base, href).unwrap_or_else(|| href.to_string())
}

fn visible(hidden: bool) -> LiveState {
    LiveState {
        hidden: Some(hidden),
        ..LiveState::default()
    }
}

fn tab_effect(doc: &Document, target: &str) -> Result<Effect> {
    let mut changes = Vec::new();
    for pane in doc.select(target)? {
        if let Some(parent) = pane.parent().and_then(ElementRef::wrap) {
            for sibling in parent.children().filter_map(ElementRef::wrap) {
                if sibling != pane && sibling.value().classes().any(|c| c == "tab-pane") {
                    changes.push((locator(sibling), visible(true)));
                }
            }
        }
        changes.push((locator(pane), visible(false)));
    }
    Ok(Effect::Live(changes))
}

fn is_check_control(el: ElementRef<'_>) -> bool {
    el.value().name() == "input"
        && el
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("checkbox") || t.eq_ignore_ascii_case("radio"))
}

fn label_control<'a>(doc: &'a Document, label: ElementRef<'a>) -> Result<Option<ElementRef<'a>>> {
    if let Some(id) = label.value().attr("for") {
        let by_id = doc
            .elements()
            .find(|el| el.value().id() == Some(id));
        if by_id.is_some() {
            return Ok(by_id);
        }
    }
    Ok(doc.select_within(label, "input")?.into_iter().next())
}

fn check_effect(doc: &Document, control: ElementRef<'_>) -> Effect {
    if doc.is_disabled(control) || !is_check_control(control) {
        return Effect::None;
    }
    let is_radio = control
        .value()
        .attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case("radio"));
    let checked = |value: bool| LiveState {
        checked: Some(value),
        ..LiveState::default()
    };
    if !is_radio {
        return Effect::Live(vec![(locator(control), checked(!doc.is_checked(control)))]);
    }
    let mut changes = Vec::new();
    if let Some(name) = control.value().attr("name") {
        for other in doc.elements().filter(|el| {
            is_check_control(*el) && *el != control && el.value().attr("name") == Some(name)
        }) {
            changes.push((locator(other), checked(false)));
        }
    }
    changes.push((locator(control), checked(true)));
    Effect::Live(changes)
}

#[async_trait]
impl Surface for MemorySurface {
    fn id(&self) -> u64 {
        self.id
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        self.snapshot_now()
    }

    async fn perform(&self, action: PageAction) -> Result<()> {
        let snapshot = self.snapshot_now()?;
        let effect = self.effect(&snapshot, &action)?;
        {
            let mut state = self.lock()?;
            let seq = state.seq;
            state.actions.push((seq, action));
            if let Effect::Live(changes) = &effect {
                for (target, change) in changes {
                    let entry = state.live.entry(target.clone()).or_default();
                    if change.checked.is_some() {
                        entry.checked = change.checked;
                    }
                    if change.value.is_some() {
                        entry.value.clone_from(&change.value);
                    }
                    if change.hidden.is_some() {
                        entry.hidden = change.hidden;
                    }
                    if change.disabled.is_some() {
                        entry.disabled = change.disabled;
                    }
                }
            }
        }
        if let Effect::Navigate(url) = effect {
            self.navigate(&url);
        }
        Ok(())
    }

    fn loads(&self) -> watch::Receiver<Option<PageLoad>> {
        self.loads.subscribe()
    }

    async fn focus(&self) -> Result<()> {
        self.lock()?.focused = true;
        Ok(())
    }

    async fn set_pinned(&self, pinned: bool) -> Result<()> {
        self.lock()?.pinned = pinned;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.closed = true;
        state.focused = false;
        log::debug!("Closed memory surface {}", self.id);
        Ok(())
    }
}

// src/dom/document.rs

//! A parsed page snapshot with live form state applied on top.
//!
//! [`Document`] borrows nothing from the surface and is not `Send`; build it,
//! query it and drop it before the next await.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::surface::{LiveState, PageSnapshot};
use crate::utils::normalize_whitespace;

/// Parse a CSS selector.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, e))
}

/// Locator of an element; see [`crate::surface`].
pub fn locator(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    let mut current = Some(el);
    while let Some(node) = current {
        let tag = node.value().name();
        if tag == "html" {
            parts.push("html".to_string());
            break;
        }
        let index = 1 + node
            .prev_siblings()
            .filter(|s| s.value().is_element())
            .count();
        parts.push(format!("{tag}:nth-child({index})"));
        current = node.parent().and_then(ElementRef::wrap);
    }
    parts.reverse();
    parts.join(" > ")
}

/// Owned summary of an element, safe to keep across awaits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub locator: String,
    pub tag: String,
    /// Normalized text content
    pub text: String,
    /// Text of the associated label, or the element's own text
    pub label: String,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub value: Option<String>,
    pub checked: bool,
    pub disabled: bool,
    pub hidden: bool,
}

pub struct Document {
    html: Html,
    live: HashMap<String, LiveState>,
}

impl Document {
    pub fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        Self {
            html: Html::parse_document(&snapshot.html),
            live: snapshot.live.clone(),
        }
    }

    /// Parse markup without live state.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            live: HashMap::new(),
        }
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    pub fn select(&self, css: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).collect())
    }

    pub fn select_within<'a>(&'a self, scope: ElementRef<'a>, css: &str) -> Result<Vec<ElementRef<'a>>> {
        let selector = parse_selector(css)?;
        Ok(scope.select(&selector).collect())
    }

    pub fn find(&self, target: &str) -> Option<ElementRef<'_>> {
        let selector = Selector::parse(target).ok()?;
        self.html
            .select(&selector)
            .find(|el| locator(*el) == target)
    }

    /// Nearest ancestor-or-self matching `css`.
    pub fn closest<'a>(&'a self, el: ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>> {
        let selector = parse_selector(css)?;
        Ok(ancestors_or_self(el).find(|node| selector.matches(node)))
    }

    pub fn text(&self, el: ElementRef<'_>) -> String {
        normalize_whitespace(&el.text().collect::<String>())
    }

    /// Text a user would read next to a form control.
    ///
    /// `label[for=id]`, then the enclosing label, then the parent element.
    pub fn label_text(&self, el: ElementRef<'_>) -> String {
        if !is_form_control(el) {
            return self.text(el);
        }
        if let Some(id) = el.value().id() {
            if let Ok(selector) = Selector::parse(&format!("label[for=\"{}\"]", css_escape(id))) {
                if let Some(label) = self.html.select(&selector).next() {
                    return self.text(label);
                }
            }
        }
        if let Some(label) = ancestors_or_self(el).skip(1).find(|n| n.value().name() == "label") {
            return self.text(label);
        }
        el.parent()
            .and_then(ElementRef::wrap)
            .map(|p| self.text(p))
            .unwrap_or_default()
    }

    fn live(&self, el: ElementRef<'_>) -> Option<&LiveState> {
        if self.live.is_empty() {
            return None;
        }
        self.live.get(&locator(el))
    }

    pub fn is_checked(&self, el: ElementRef<'_>) -> bool {
        self.live(el)
            .and_then(|l| l.checked)
            .unwrap_or_else(|| el.value().attr("checked").is_some())
    }

    pub fn value(&self, el: ElementRef<'_>) -> Option<String> {
        if let Some(value) = self.live(el).and_then(|l| l.value.clone()) {
            return Some(value);
        }
        if el.value().name() == "select" {
            let options: Vec<ElementRef<'_>> = el
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|o| o.value().name() == "option")
                .collect();
            let chosen = options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.first())?;
            return Some(
                chosen
                    .value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| self.text(*chosen)),
            );
        }
        el.value().attr("value").map(str::to_string)
    }

    /// The `disabled` property.
    pub fn is_disabled(&self, el: ElementRef<'_>) -> bool {
        self.live(el)
            .and_then(|l| l.disabled)
            .unwrap_or_else(|| el.value().attr("disabled").is_some())
    }

    /// Disabled property, or a `disabled` class on the element or an ancestor.
    pub fn in_disabled_region(&self, el: ElementRef<'_>) -> bool {
        self.is_disabled(el)
            || ancestors_or_self(el).any(|n| n.value().classes().any(|c| c == "disabled"))
    }

    /// Rendered hidden, judged from live state where available and from
    /// markup (`hidden`, `display:none`, inactive tab panes) elsewhere.
    pub fn is_hidden(&self, el: ElementRef<'_>) -> bool {
        for node in ancestors_or_self(el) {
            if let Some(hidden) = self.live(node).and_then(|l| l.hidden) {
                return hidden;
            }
            if statically_hidden(node) {
                return true;
            }
        }
        false
    }

    /// Text of the table header cell above `el`'s cell.
    pub fn column_header(&self, el: ElementRef<'_>) -> Option<String> {
        let cell = ancestors_or_self(el).find(|n| n.value().name() == "td")?;
        let row = ancestors_or_self(cell).find(|n| n.value().name() == "tr")?;
        let index = row
            .children()
            .filter_map(ElementRef::wrap)
            .position(|c| c == cell)?;
        let table = ancestors_or_self(row).find(|n| n.value().name() == "table")?;
        let header_row = self
            .select_within(table, "thead tr")
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .or_else(|| {
                self.select_within(table, "tr")
                    .ok()
                    .and_then(|rows| rows.into_iter().next())
            })?;
        header_row
            .children()
            .filter_map(ElementRef::wrap)
            .nth(index)
            .map(|h| self.text(h))
    }

    pub fn handle(&self, el: ElementRef<'_>) -> ElementHandle {
        let element = el.value();
        ElementHandle {
            locator: locator(el),
            tag: element.name().to_string(),
            text: self.text(el),
            label: self.label_text(el),
            name: element.attr("name").map(str::to_string),
            input_type: element.attr("type").map(|t| t.to_ascii_lowercase()),
            value: self.value(el),
            checked: self.is_checked(el),
            disabled: self.is_disabled(el),
            hidden: self.is_hidden(el),
        }
    }
}

/// The element then its element ancestors, innermost first.
pub fn ancestors_or_self(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::successors(Some(el), |node| node.parent().and_then(ElementRef::wrap))
}

fn is_form_control(el: ElementRef<'_>) -> bool {
    matches!(el.value().name(), "input" | "select" | "textarea")
}

fn statically_hidden(el: ElementRef<'_>) -> bool {
    let element = el.value();
    if element.attr("hidden").is_some() {
        return true;
    }
    if element.name() == "input"
        && element
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
    {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    let classes: Vec<&str> = element.classes().collect();
    if classes.contains(&"d-none") {
        return true;
    }
    classes.contains(&"tab-pane") && !classes.contains(&"active") && !classes.contains(&"show")
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

//! Page model: parsed documents, the element resolver and async page access.

pub mod document;
pub mod page;
pub mod resolver;

pub use document::{Document, ElementHandle, locator, parse_selector};
pub use page::Page;
pub use resolver::{Intent, resolve};

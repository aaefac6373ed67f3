// src/lib.rs

//! Shisetsu: availability watcher for the Yokohama facility reservation site.
//!
//! Drives a browser tab through the site's search flow (home, facility
//! selection, availability calendar) and reports open slots. Page automation
//! re-runs on every document load with all state kept in a durable store, so a
//! run survives full page navigations between steps.

pub mod dom;
pub mod error;
pub mod locale;
pub mod models;
pub mod notify;
pub mod runtime;
pub mod steps;
pub mod storage;
pub mod surface;
pub mod utils;

pub use error::{AppError, Result};
pub use runtime::Runtime;

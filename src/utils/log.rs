// src/utils/log.rs

//! Console formatting for CLI output.
//!
//! Diagnostics go through the `log` facade; this module only renders
//! user-facing sections (headers, status lines, result summaries) with the
//! same timestamped prefix.

use chrono::Local;

use crate::models::StatusKind;

fn stamp(message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{timestamp}] {message}")
}

/// Print a separator line.
pub fn separator() {
    println!("{}", stamp(&"─".repeat(60)));
}

/// Print a boxed header.
pub fn header(title: &str) {
    let border = "═".repeat(60);
    println!("{}", stamp(&border));
    println!("{}", stamp(&format!("  {title}")));
    println!("{}", stamp(&border));
}

/// Print an indented line.
pub fn sub_item(message: &str) {
    println!("{}", stamp(&format!("    {message}")));
}

/// Print a titled list of key/value lines.
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("{}", stamp(&format!("[SUMMARY] {title}")));
    for (key, value) in items {
        sub_item(&format!("{key}: {value}"));
    }
}

/// Print a status update as relayed to the UI.
pub fn status(kind: StatusKind, text: &str) {
    let tag = match kind {
        StatusKind::Busy => "BUSY",
        StatusKind::Success => "OK",
        StatusKind::Error => "ERROR",
        StatusKind::Info => "INFO",
    };
    let line = stamp(&format!("[{tag}] {text}"));
    if kind == StatusKind::Error {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

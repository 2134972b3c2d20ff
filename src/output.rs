//! CLI output formatting for every command.
//!
//! Each command has a `format_*` function returning lines (pure, testable)
//! and a `print_*` wrapper that writes them to stdout.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Scanned media/ (3 items)
//! 001 3f9c0a1b22d4e5f6 1.500
//!     Source: 2024/a.jpg (1500x1000)
//! 002 81d2aa90c3b1f7e4 1.000
//!     Source: broken.webp
//!     Warning: Failed to read dimensions of media/broken.webp: ...
//! ```
//!
//! ## Layout
//!
//! ```text
//! Column 1 (height 2.33)
//!     001 a (1.500)
//!     003 c (1.000)
//! Column 2 (height 2.00)
//!     002 b (0.500)
//! ```
//!
//! ## Classify / Resolve
//!
//! ```text
//! sign  images/foo.png
//! pass  /local/logo.png
//!
//! images/foo.png → https://cdn.example.com/images/foo.png?Signature=…
//! images/bad.png ✗ signing endpoint returned 500: boom
//! ```

use crate::generate::PreviewSummary;
use crate::scan::ScanReport;
use crate::signing::{CacheStats, PrefetchSummary, SignError};
use crate::types::FeedItem;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn item_line(index: usize, item: &FeedItem) -> String {
    format!(
        "{} {} ({:.3})",
        format_index(index),
        item.id,
        item.effective_aspect_ratio()
    )
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_output(report: &ScanReport, root: &Path) -> Vec<String> {
    let items = &report.manifest.items;
    let mut lines = vec![format!(
        "Scanned {} ({} items)",
        root.display(),
        items.len()
    )];

    for (i, item) in items.iter().enumerate() {
        lines.push(item_line(i + 1, item));
        let size = match (item.width, item.height) {
            (Some(w), Some(h)) => format!(" ({w}x{h})"),
            _ => String::new(),
        };
        lines.push(format!("{}Source: {}{}", indent(1), item.source, size));
        if let Some(problem) = report.unreadable.iter().find(|u| u.source == item.source) {
            lines.push(format!("{}Warning: {}", indent(1), problem.reason));
        }
    }

    if !report.unreadable.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{} of {} items kept the default ratio",
            report.unreadable.len(),
            items.len()
        ));
    }
    lines
}

pub fn print_scan_output(report: &ScanReport, root: &Path) {
    for line in format_scan_output(report, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Format columns with their accumulated heights.
///
/// Items keep their feed position as the index, so gaps show where the
/// layout moved things between columns.
pub fn format_layout(columns: &[Vec<&FeedItem>], items: &[FeedItem], heights: &[f64]) -> Vec<String> {
    let mut lines = Vec::new();
    for (c, column) in columns.iter().enumerate() {
        let height = heights.get(c).copied().unwrap_or(0.0);
        lines.push(format!("Column {} (height {:.2})", c + 1, height));
        for item in column {
            let position = items.iter().position(|i| i.id == item.id).unwrap_or(0);
            lines.push(format!("{}{}", indent(1), item_line(position + 1, item)));
        }
    }
    lines
}

pub fn print_layout(columns: &[Vec<&FeedItem>], items: &[FeedItem], heights: &[f64]) {
    for line in format_layout(columns, items, heights) {
        println!("{}", line);
    }
}

// ============================================================================
// Signing
// ============================================================================

pub fn format_classification(results: &[(String, bool)]) -> Vec<String> {
    results
        .iter()
        .map(|(reference, needs)| {
            let label = if *needs { "sign" } else { "pass" };
            format!("{label}  {reference}")
        })
        .collect()
}

pub fn print_classification(results: &[(String, bool)]) {
    for line in format_classification(results) {
        println!("{}", line);
    }
}

pub fn format_resolution(results: &[(String, Result<String, SignError>)]) -> Vec<String> {
    results
        .iter()
        .map(|(reference, result)| match result {
            Ok(url) => format!("{reference} → {url}"),
            Err(e) => format!("{reference} ✗ {}", truncate(&e.to_string(), 120)),
        })
        .collect()
}

pub fn print_resolution(results: &[(String, Result<String, SignError>)]) {
    for line in format_resolution(results) {
        println!("{}", line);
    }
}

pub fn format_prefetch(summary: &PrefetchSummary, stats: &CacheStats) -> Vec<String> {
    let mut lines = vec![format!(
        "Prefetched {} references ({} failed)",
        summary.scheduled, summary.failed
    )];
    lines.push(format!("Cache: {}", stats));
    lines
}

pub fn print_prefetch(summary: &PrefetchSummary, stats: &CacheStats) {
    for line in format_prefetch(summary, stats) {
        println!("{}", line);
    }
}

// ============================================================================
// Preview
// ============================================================================

pub fn format_preview(summary: &PreviewSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Preview → {} ({} items in {} columns)",
        summary.path.display(),
        summary.items,
        summary.columns
    )];
    if summary.unresolved > 0 {
        lines.push(format!(
            "{}{} items rendered as placeholders",
            indent(1),
            summary.unresolved
        ));
    }
    lines
}

pub fn print_preview(summary: &PreviewSummary) {
    for line in format_preview(summary) {
        println!("{}", line);
    }
}

//! CLI output formatting for export, import and inspect.
//!
//! # Field-First Display
//!
//! Every command lists the bundle's fields in bundle order, each led by its
//! 1-based position and name, with the detected encoding in parentheses.
//! Details (asset URLs, failures) follow as indented context lines.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! Exported 3 fields of 42 → elementor-content-42.json
//! 001 _elementor_data (json)
//! 002 _elementor_page_settings (serialized)
//! 003 _wp_page_template (plain)
//! ```
//!
//! ## Import
//!
//! ```text
//! Import 42
//! 001 _elementor_data (json): 2 URLs rewritten
//! 002 _elementor_page_settings (serialized): unchanged
//! 003 _elementor_css (plain): skipped
//!
//! Assets
//!     fetched 2023/01/photo_1a2b3c4d.png
//!         Source: https://old.example.com/wp-content/uploads/2023/01/photo.png
//!     failed https://old.example.com/wp-content/uploads/gone.png
//!         HTTP 404 from https://old.example.com/wp-content/uploads/gone.png
//!
//! Committed 2 of 2 fields; 1 fetched, 1 failed (2 total)
//! ```
//!
//! ## Inspect
//!
//! ```text
//! 001 _elementor_data (json, 1 asset)
//!     https://old.example.com/wp-content/uploads/2023/01/photo.png
//! 002 _title (plain)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::codec;
use crate::materialize::Outcome;
use crate::store::Bundle;
use crate::transfer::{FieldAction, FieldSummary, ImportReport};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

// ============================================================================
// Export
// ============================================================================

pub fn format_export_summary(id: &str, bundle: &Bundle, path: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Exported {} of {} → {}",
        plural(bundle.len(), "field", "fields"),
        id,
        path.display()
    )];
    for (i, (name, value)) in bundle.iter().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            name,
            codec::detect(value)
        ));
    }
    lines
}

pub fn print_export_summary(id: &str, bundle: &Bundle, path: &Path) {
    for line in format_export_summary(id, bundle, path) {
        println!("{}", line);
    }
}

// ============================================================================
// Import
// ============================================================================

fn action_label(action: &FieldAction) -> String {
    match action {
        FieldAction::Rewritten(n) => format!("{} rewritten", plural(*n, "URL", "URLs")),
        FieldAction::Unchanged => "unchanged".to_string(),
        FieldAction::KeptRaw(reason) => format!("kept as is ({})", reason),
        FieldAction::Skipped => "skipped".to_string(),
    }
}

pub fn format_import_report(report: &ImportReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.dry_run {
        lines.push(format!("Import {} (dry run, nothing written)", report.id));
    } else {
        lines.push(format!("Import {}", report.id));
    }

    for (i, field) in report.fields.iter().enumerate() {
        lines.push(format!(
            "{} {} ({}): {}",
            format_index(i + 1),
            field.name,
            field.encoding,
            action_label(&field.action)
        ));
    }

    if !report.events.is_empty() {
        lines.push(String::new());
        lines.push("Assets".to_string());
        for event in &report.events {
            let target = event.relative.as_deref().unwrap_or(&event.url);
            match &event.outcome {
                Outcome::Fetched => lines.push(format!("    fetched {}", target)),
                Outcome::Reused => lines.push(format!("    reused {}", target)),
                Outcome::Planned => lines.push(format!("    would fetch {}", target)),
                Outcome::Failed(reason) => {
                    lines.push(format!("    failed {}", event.url));
                    lines.push(format!("        {}", reason));
                    continue;
                }
            }
            if event.relative.is_some() {
                lines.push(format!("        Source: {}", event.url));
            }
        }
    }

    lines.push(String::new());
    let importable = report
        .fields
        .iter()
        .filter(|f| f.action != FieldAction::Skipped)
        .count();
    if report.dry_run {
        lines.push(format!(
            "Would commit {}; {}",
            plural(importable, "field", "fields"),
            report.assets
        ));
    } else {
        lines.push(format!(
            "Committed {} of {} fields; {}",
            report.committed, importable, report.assets
        ));
    }
    for (name, error) in &report.failed_commits {
        lines.push(format!("    Write failed: {} ({})", name, error));
    }
    if let Some(error) = &report.invalidation_error {
        lines.push(format!("    Cache invalidation failed: {}", error));
    }
    lines
}

pub fn print_import_report(report: &ImportReport) {
    for line in format_import_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

pub fn format_inspect(fields: &[FieldSummary]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if field.assets.is_empty() {
            lines.push(format!(
                "{} {} ({})",
                format_index(i + 1),
                field.name,
                field.encoding
            ));
        } else {
            lines.push(format!(
                "{} {} ({}, {})",
                format_index(i + 1),
                field.name,
                field.encoding,
                plural(field.assets.len(), "asset", "assets")
            ));
        }
        for url in &field.assets {
            lines.push(format!("    {}", url));
        }
        for url in &field.disallowed {
            lines.push(format!("    Not allowed: {}", url));
        }
    }
    let total: usize = fields.iter().map(|f| f.assets.len()).sum();
    lines.push(format!(
        "{} in {}",
        plural(total, "asset reference", "asset references"),
        plural(fields.len(), "field", "fields")
    ));
    lines
}

pub fn print_inspect(fields: &[FieldSummary]) {
    for line in format_inspect(fields) {
        println!("{}", line);
    }
}

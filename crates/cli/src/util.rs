//! Formatting and prompt helpers shared by the commands

use chrono::{DateTime, Local, Utc};
use ledger_journal::SnapshotRef;
use owo_colors::OwoColorize;
use std::io::Write;

/// Format a time as relative to `now` ("2 hours ago")
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = match (now - at).to_std() {
        Ok(elapsed) => elapsed.as_secs(),
        Err(_) => return "in the future".to_string(),
    };

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format a time in the local zone ("2025-07-10 14:34:03")
pub fn format_absolute_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Print one snapshot as a single listing line
pub fn display_snapshot_line(snapshot: &SnapshotRef, now: DateTime<Utc>) {
    let location = if snapshot.is_replicated() {
        "local + remote".green().to_string()
    } else {
        "local".yellow().to_string()
    };

    println!(
        "{}  {:<6}  {:>10}  {:>6} rows  {}  ({})",
        snapshot.filename().cyan(),
        snapshot.origin.to_string(),
        format_size(snapshot.size_bytes),
        snapshot.row_counts.ledger,
        location,
        format_relative_time(snapshot.created_at, now).dimmed()
    );
}

/// Ask a yes/no question on stdin; anything but "y" is a no
pub fn confirm(prompt: &str) -> std::io::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Divider under command headings
pub const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

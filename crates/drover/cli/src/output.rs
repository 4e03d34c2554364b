//! Output formatting utilities

use crate::error::CliResult;
use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    Table,
    /// JSON format
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Table
    }
}

/// Render rows as a table, or `data` as JSON
pub fn render<R: Tabled, T: Serialize + ?Sized>(
    rows: Vec<R>,
    data: &T,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                Ok("No hosts".dimmed().to_string())
            } else {
                Ok(Table::new(rows).to_string())
            }
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
    }
}

/// Print rows as a table, or `data` as JSON
pub fn print_output<R: Tabled, T: Serialize + ?Sized>(
    rows: Vec<R>,
    data: &T,
    format: OutputFormat,
) -> CliResult<()> {
    println!("{}", render(rows, data, format)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message);
}

/// Comma-joined list, or a dash when empty
pub fn join_or_dash<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

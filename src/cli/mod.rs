//! CLI Module
//!
//! Exit codes and output helpers shared by the command-line binary.

pub mod exit_codes;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};

use crate::core::screen::{Field, Screen};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

#[derive(Serialize)]
struct ScreenReport<'a> {
    text: &'a str,
    main_menu: bool,
    selection_list: bool,
    errors: Vec<String>,
}

/// Render a screen
pub fn format_screen(screen: &Screen, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => screen.text().to_string(),
        OutputFormat::Json => {
            let report = ScreenReport {
                text: screen.text(),
                main_menu: screen.is_main_menu(),
                selection_list: screen.is_selection_list(),
                errors: screen.error_messages(),
            };
            serde_json::to_string_pretty(&report).unwrap_or_default()
        }
    }
}

/// Render a field list, with row and column for `width`
pub fn format_fields(fields: &[Field], width: usize, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => fields
            .iter()
            .map(|f| format!("{:>3}:{:<3} {}", f.row(width) + 1, f.column(width) + 1, f))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(fields).unwrap_or_default(),
    }
}

//! Rendering of the final stack using comfy-table or JSON

use crate::machine::{Rendered, StackEntry};
use anyhow::{Context, Result};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
    /// JSON Lines (one stack entry per line)
    Jsonl,
}

pub fn render(entries: &[StackEntry], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_stack_table(entries)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(entries).context("Failed to serialize stack")
        }
        OutputFormat::Jsonl => entries
            .iter()
            .map(|entry| serde_json::to_string(entry).context("Failed to serialize stack entry"))
            .collect::<Result<Vec<_>>>()
            .map(|lines| lines.join("\n")),
    }
}

/// Formats the stack bottom first, one row per entry.
pub fn format_stack_table(entries: &[StackEntry]) -> String {
    if entries.is_empty() {
        return "Stack is empty".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("#"), Cell::new("instruction"), Cell::new("item")]);

    for (position, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            Cell::new(position),
            Cell::new(entry.instruction),
            Cell::new(format_item(&entry.item)),
        ]);
    }

    table.to_string()
}

fn format_item(item: &Rendered) -> String {
    match item {
        // Ranges get one pair per line so wide ranges stay readable
        Rendered::Range(pairs) if !pairs.is_empty() => pairs
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

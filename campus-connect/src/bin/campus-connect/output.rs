use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;

use campus_connect::{EventListing, Society};

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table or a single line
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    fn line(&self, icon: &str, message: &str, color: colored::Color) -> String {
        if self.options.no_color {
            format!("{icon} {message}")
        } else {
            format!("{} {}", icon.color(color), message.color(color))
        }
    }

    /// Display a success message with color and icon
    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.success, message, THEME.success));
        }
    }

    /// Display an error message with color and icon
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.line(ICONS.error, message, THEME.error));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.warning, message, THEME.warning));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.info, message, THEME.info));
        }
    }

    /// Display a heading (skipped for JSON output so it stays parseable)
    pub fn heading(&self, text: &str) {
        if self.options.quiet || self.options.output_format == OutputFormat::Json {
            return;
        }
        let output = if self.options.no_color {
            format!("\n{text}\n{}", "=".repeat(text.chars().count()))
        } else {
            format!("\n{}", text.color(THEME.primary).bold())
        };
        println!("{output}");
    }

    /// Display a key-value pair
    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("{key}: {value}")
            } else {
                format!("{}: {}", key.color(THEME.key).bold(), value.color(THEME.value))
            };
            println!("{output}");
        }
    }

    /// Display indented text with a prefix icon
    pub fn indented(&self, icon: &str, text: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("  {icon} {text}")
            } else {
                format!("  {} {text}", icon.color(THEME.muted))
            };
            println!("{output}");
        }
    }
}

fn themed_table(options: &GlobalOptions, headers: &[&str]) -> Table {
    let mut table = Table::new();
    if options.no_color {
        table.load_preset(comfy_table::presets::ASCII_FULL);
    } else {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    }
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| {
            let cell = Cell::new(h).add_attribute(Attribute::Bold);
            if options.no_color { cell } else { cell.fg(TableColor::Cyan) }
        })
        .collect();
    table.set_header(header_cells);
    table
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: String,
    pub name: String,
    pub time: String,
    pub location: String,
    pub fee: f64,
    pub society: Option<String>,
}

impl From<&EventListing> for EventRow {
    fn from(listing: &EventListing) -> Self {
        Self {
            id: listing.event.id.clone(),
            name: listing.event.name.clone(),
            time: listing.event.time.format("%Y-%m-%d %H:%M").to_string(),
            location: listing.event.location.clone(),
            fee: listing.event.fee,
            society: listing.society_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRows(pub Vec<EventRow>);

impl TableDisplay for EventRows {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Time", "Event", "Society", "Location", "Fee", "Id"]);
        if self.0.is_empty() {
            table.add_row(vec![Cell::new("No events found")]);
        }
        for row in &self.0 {
            table.add_row(vec![
                Cell::new(&row.time),
                Cell::new(&row.name),
                Cell::new(row.society.as_deref().unwrap_or("-")),
                Cell::new(&row.location),
                Cell::new(format_fee(row.fee)),
                Cell::new(&row.id),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.0
            .iter()
            .map(|row| format!("{} {} ({})", row.time, row.name, row.id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SocietyRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub members: u64,
    pub events: usize,
}

impl From<&Society> for SocietyRow {
    fn from(society: &Society) -> Self {
        Self {
            id: society.id.clone(),
            name: society.name.clone(),
            category: society.category.clone(),
            members: society.members,
            events: society.events.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SocietyRows(pub Vec<SocietyRow>);

impl TableDisplay for SocietyRows {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Society", "Category", "Members", "Events", "Id"]);
        if self.0.is_empty() {
            table.add_row(vec![Cell::new("No societies found")]);
        }
        for row in &self.0 {
            table.add_row(vec![
                Cell::new(&row.name),
                Cell::new(&row.category),
                Cell::new(row.members),
                Cell::new(row.events),
                Cell::new(&row.id),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.0
            .iter()
            .map(|row| format!("{} ({})", row.name, row.id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary(pub Vec<(String, usize)>);

impl TableDisplay for SeedSummary {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Collection", "Documents"]);
        for (collection, count) in &self.0 {
            table.add_row(vec![Cell::new(collection), Cell::new(count)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.0
            .iter()
            .map(|(collection, count)| format!("{collection}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn format_fee(fee: f64) -> String {
    if fee == 0.0 { "Free".to_string() } else { format!("HK${fee:.2}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fees_render_free_or_amount() {
        assert_eq!(format_fee(0.0), "Free");
        assert_eq!(format_fee(25.0), "HK$25.00");
    }

    #[test]
    fn empty_rows_still_render() {
        let options = GlobalOptions {
            no_color: true,
            ..Default::default()
        };
        let rendered = EventRows(Vec::new()).to_table(&options).to_string();
        assert!(rendered.contains("No events found"));
        assert_eq!(EventRows(Vec::new()).to_compact(), "");
    }

    #[test]
    fn seed_summary_compact() {
        let summary = SeedSummary(vec![("events".into(), 2), ("users".into(), 1)]);
        assert_eq!(summary.to_compact(), "events=2 users=1");
    }
}

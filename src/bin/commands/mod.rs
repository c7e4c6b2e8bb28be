pub mod config;
pub mod migrate;
pub mod status;
pub mod tables;

use clap::ValueEnum;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format of listing commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Markdown,
    Json,
    JsonPretty,
}

pub(crate) fn print_records<T: Tabled + Serialize>(records: &[T], output_format: OutputFormat) {
    match output_format {
        OutputFormat::Table => {
            println!("{}", Table::new(records).with(Style::rounded()));
        }
        OutputFormat::Markdown => {
            println!("{}", Table::new(records).with(Style::markdown()));
        }
        OutputFormat::Json => match serde_json::to_string(records) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        OutputFormat::JsonPretty => match serde_json::to_string_pretty(records) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
    }
}

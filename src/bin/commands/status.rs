use super::{print_records, OutputFormat};
use dbregistry::Registry;

/// List every database recorded by the manager
pub fn run(registry: &Registry, output_format: OutputFormat) {
    match registry.manager().list() {
        Ok(records) if records.is_empty() => println!("no databases recorded"),
        Ok(records) => print_records(&records, output_format),
        Err(e) => eprintln!("ERROR: {}", e),
    }
}

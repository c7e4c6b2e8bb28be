use super::{print_records, OutputFormat};
use clap::Args;
use dbregistry::Registry;

/// Arguments for the Tables command
#[derive(Args)]
pub struct TablesArgs {
    /// Database name as recorded by the manager, e.g. app.db
    #[clap(value_name = "DB_NAME")]
    pub database: String,
}

/// List the recorded version of every table of one database
pub fn run(registry: &Registry, args: TablesArgs, output_format: OutputFormat) {
    match registry.manager().table_records(&args.database) {
        Ok(records) if records.is_empty() => {
            println!("no tables recorded for {}", args.database)
        }
        Ok(records) => print_records(&records, output_format),
        Err(e) => eprintln!("ERROR: {}", e),
    }
}

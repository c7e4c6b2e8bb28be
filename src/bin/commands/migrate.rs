use clap::Args;
use dbregistry::{DatabaseDescriptor, Registry, RegistryConfig, TableDescriptor};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the Migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Database name (also its file name)
    #[clap(value_name = "DB_NAME")]
    pub database: String,

    /// Version the database should be at
    #[clap(short, long)]
    pub version: u32,

    /// Directory of the database file, defaults to the data directory
    #[clap(short, long)]
    pub dir: Option<PathBuf>,

    /// Tables in dependency order, each backed by scripts in the script directory
    #[clap(short, long, value_delimiter = ',', required = true)]
    pub tables: Vec<String>,
}

/// Create or upgrade one script-backed database and print the outcome
pub fn run(config: &RegistryConfig, registry: &Registry, args: MigrateArgs) {
    let scripts = match config.scripts() {
        Some(scripts) => Arc::new(scripts),
        None => {
            eprintln!("ERROR: script_dir is not configured");
            return;
        }
    };

    let directory = args
        .dir
        .unwrap_or_else(|| PathBuf::from(config.data_dir.as_str()));
    let descriptor = DatabaseDescriptor::new(args.database.as_str(), args.version, directory)
        .with_tables(
            args.tables
                .iter()
                .map(|t| TableDescriptor::from_scripts(t.as_str(), scripts.clone())),
        );

    if let Err(e) = registry.register(descriptor) {
        eprintln!("ERROR: {}", e);
        return;
    }

    match registry.report(&args.database) {
        Some(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
        },
        None => eprintln!("ERROR: no report recorded for {}", args.database),
    }
}

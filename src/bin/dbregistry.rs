use clap::{Parser, Subcommand};
use dbregistry::{Registry, RegistryConfig};
use tracing::Level;

mod commands;

use commands::migrate::MigrateArgs;
use commands::tables::TablesArgs;
use commands::OutputFormat;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.dbregistry/dbregistry.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format for listings
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases recorded by the manager
    Status,

    /// List the recorded table versions of a database
    Tables(TablesArgs),

    /// Create or upgrade a database from the configured migration scripts
    Migrate(MigrateArgs),

    /// Show the effective configuration
    Config,
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level INFO or higher.
            .with_max_level(Level::INFO)
            .init();
    }

    let config = match RegistryConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Config = cli.command {
        commands::config::run(&config);
        return;
    }

    let registry = match Registry::builder()
        .configure_directory(config.data_dir.as_str())
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: cannot open the manager database: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Status => commands::status::run(&registry, cli.format),
        Commands::Tables(args) => commands::tables::run(&registry, args, cli.format),
        Commands::Migrate(args) => commands::migrate::run(&config, &registry, args),
        Commands::Config => commands::config::run(&config),
    }
}

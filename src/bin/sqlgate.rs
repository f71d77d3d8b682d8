use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlgate::*;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.sqlgate/sqlgate.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output as JSON
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single SQL statement through the write gate.
    Query(commands::query::QueryArgs),

    /// Load a SQL dump file, prefixing every table name.
    Load(commands::load::LoadArgs),

    /// Export the live schema as JSON.
    Export(commands::export::ExportArgs),

    /// Show the statements that would bring the database in line with a schema file.
    Diff(commands::schema::SchemaArgs),

    /// Apply the statements that bring the database in line with a schema file.
    Sync(commands::schema::SchemaArgs),
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match GateConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!("configuration:\n{}", config.summary());

    let conn = match Connection::open(&config, Arc::new(TracingPublisher)) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Query(args) => commands::query::run(&conn, args, cli.json),
        Commands::Load(args) => commands::load::run(&conn, args, cli.json),
        Commands::Export(args) => commands::export::run(&conn, args),
        Commands::Diff(args) => commands::schema::run_diff(&conn, args, cli.json),
        Commands::Sync(args) => commands::schema::run_sync(&conn, args, cli.json),
    }
}

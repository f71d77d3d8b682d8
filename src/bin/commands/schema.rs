use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::json;
use sqlgate::database::schema::import_schema;
use sqlgate::database::{Connection, Schema};

use super::print_json;

/// Arguments for the Diff and Sync commands
#[derive(Args)]
pub struct SchemaArgs {
    /// Target schema, as written by `sqlgate export`
    #[clap(name = "SCHEMA_JSON")]
    pub schema_path: PathBuf,

    /// Leave out statements starting with DROP
    #[clap(long)]
    pub no_drop: bool,
}

fn load_target(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read schema file {}: {}", path.display(), e))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse schema file {}: {}", path.display(), e))?;
    import_schema(&value)
}

fn target_or_exit(path: &Path) -> Schema {
    match load_target(path) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn run_diff(conn: &Connection, args: SchemaArgs, json_output: bool) {
    let target = target_or_exit(&args.schema_path);

    let statements = match conn
        .schema_synchronizer()
        .get_update_schema(&target, args.no_drop)
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        print_json(&statements, false);
        return;
    }

    if statements.is_empty() {
        println!("Schema is up to date");
    }
    for sql in statements {
        println!("{};", sql);
    }
}

pub fn run_sync(conn: &Connection, args: SchemaArgs, json_output: bool) {
    let target = target_or_exit(&args.schema_path);
    let sync = conn.schema_synchronizer();

    let count = match sync.get_update_schema(&target, args.no_drop) {
        Ok(s) => s.len(),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = sync.update_schema(&target, args.no_drop) {
        eprintln!("ERROR: Schema update failed: {}", e);
        std::process::exit(1);
    }

    if json_output {
        print_json(&json!({ "statements": count }), false);
    } else {
        println!("Schema updated: {} statement(s) executed", count);
    }
}

use clap::Args;
use sqlgate::database::{Connection, ExportVisitor};

use super::print_json;

/// Arguments for the Export command
#[derive(Args)]
pub struct ExportArgs {
    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

pub fn run(conn: &Connection, args: ExportArgs) {
    let schema = match conn.introspect_schema() {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("ERROR: Failed to read schema: {}", e);
            std::process::exit(1);
        }
    };

    print_json(&ExportVisitor::export(&schema), args.pretty);
}

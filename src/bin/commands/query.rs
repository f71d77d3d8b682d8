use clap::Args;
use serde_json::json;
use sqlgate::database::{Connection, ParamTypes, QueryOutcome};

use super::print_json;

/// Arguments for the Query command
#[derive(Args)]
pub struct QueryArgs {
    /// SQL statement to run; table names are used as given
    #[clap()]
    pub sql: String,

    /// Allow writes for the whole session
    #[clap(long)]
    pub safe: bool,

    /// Allow this one write
    #[clap(long)]
    pub force: bool,
}

pub fn run(conn: &Connection, args: QueryArgs, json_output: bool) {
    let QueryArgs { sql, safe, force } = args;

    if safe {
        conn.set_safe(true);
    }
    if force {
        conn.set_force(true);
    }

    match conn.safe_query(&sql, &[], &ParamTypes::none()) {
        QueryOutcome::Rows(rows) => {
            if json_output {
                print_json(&rows, false);
            } else if rows.columns.is_empty() {
                println!("(no rows)");
            } else {
                println!("{}", rows.to_table());
            }
        }
        QueryOutcome::Affected(affected) => {
            if json_output {
                print_json(&json!({ "rows_affected": affected }), false);
            } else {
                println!("{} row(s) affected", affected);
            }
        }
        QueryOutcome::Denied => {
            eprintln!("ERROR: write denied, rerun with --safe or --force");
            std::process::exit(1);
        }
        QueryOutcome::Failed(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

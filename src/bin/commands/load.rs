use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use sqlgate::database::Connection;

use super::print_json;

/// Arguments for the Load command
#[derive(Args)]
pub struct LoadArgs {
    /// SQL dump file with semicolon-terminated statements
    #[clap(name = "FILE")]
    pub file_path: PathBuf,
}

pub fn run(conn: &Connection, args: LoadArgs, json_output: bool) {
    let LoadArgs { file_path } = args;

    // loading a dump is an explicit write request
    conn.set_safe(true);

    // the logger counts the statements that reached the driver
    let logger = conn.logger();
    let logging = logger.is_enabled();
    logger.set_enabled(true);
    let before = logger.current_index();
    let loaded = conn.query_from_file(&file_path);
    let executed = logger.current_index() - before;
    logger.set_enabled(logging);

    if !loaded {
        eprintln!("ERROR: cannot read SQL file {}", file_path.display());
        std::process::exit(1);
    }

    if json_output {
        print_json(
            &json!({
                "file": file_path.to_string_lossy(),
                "statements": executed,
            }),
            false,
        );
    } else {
        println!(
            "Loaded {}: {} statement(s) executed",
            file_path.display(),
            executed
        );
    }
}

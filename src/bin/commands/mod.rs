pub mod export;
pub mod load;
pub mod query;
pub mod schema;

/// Print a JSON value, exiting on serialization failure
pub(crate) fn print_json<T: serde::Serialize>(value: &T, pretty: bool) {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("ERROR: Failed to serialize to JSON: {}", e);
            std::process::exit(1);
        }
    }
}

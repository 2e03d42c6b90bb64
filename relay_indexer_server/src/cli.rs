use std::{env, env::VarError};

/// The indexer is configured entirely through `RELAY_*` environment variables.
const CONFIG_VARS: [&str; 13] = [
    "RUST_LOG",
    "RELAY_HOST",
    "RELAY_PORT",
    "RELAY_DATABASE_URL",
    "RELAY_DB_MAX_CONNECTIONS",
    "RELAY_RUN_MIGRATIONS",
    "RELAY_FILL_CONCURRENCY",
    "RELAY_SPEND_CONCURRENCY",
    "RELAY_INDEX_CONCURRENCY",
    "RELAY_INITIAL_STATUS",
    "RELAY_UNFUNDED_STATUS",
    "RELAY_MAX_REDELIVERIES",
    "RELAY_CHANNEL_BUFFER_SIZE",
];

/// Prints the usage notes and the indexer's environment when the binary is given any argument at all. Returns true
/// if it did, in which case the server should not start.
pub fn handle_command_line_args() -> bool {
    if env::args().len() <= 1 {
        return false;
    }
    println!("\n{}\n", include_str!("./cli-help.txt"));
    println!("Current environment values:");
    for name in CONFIG_VARS {
        println!("  {name:<35} {}", describe_var(name));
    }
    true
}

fn describe_var(name: &str) -> String {
    match env::var(name) {
        Ok(value) => value,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(raw)) => format!("Invalid value: {}", raw.to_string_lossy()),
    }
}

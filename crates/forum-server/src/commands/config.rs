//! `forum config get|set|reset`

use colored::Colorize;
use forum_extensions::ExtensionConfigRecord;
use serde_json::{Map, Value};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::state::open_lifecycle;

/// Parse `KEY=VALUE` pairs into a config patch.
///
/// Values are read as JSON when they parse, otherwise taken as strings, so
/// `limit=10` sets a number and `label=Accept all` sets a string.
pub fn parse_assignments(assignments: &[String]) -> Result<Map<String, Value>> {
    let mut patch = Map::new();
    for assignment in assignments {
        let Some((key, raw)) = assignment.split_once('=') else {
            return Err(Error::user(format!(
                "expected KEY=VALUE, got '{assignment}'"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::user(format!("missing key in '{assignment}'")));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        patch.insert(key.to_string(), value);
    }
    Ok(patch)
}

fn print_record(record: &ExtensionConfigRecord) -> Result<()> {
    let rendered = serde_json::to_string_pretty(record)
        .map_err(|e| Error::user(format!("failed to render configuration: {e}")))?;
    println!("{rendered}");
    Ok(())
}

/// Handle `forum config get <ID>`
pub fn run_config_get(config: &ServerConfig, id: &str) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;
    print_record(&lifecycle.configs().get(id)?)
}

/// Handle `forum config set <ID> KEY=VALUE...`
pub fn run_config_set(config: &ServerConfig, id: &str, assignments: &[String]) -> Result<()> {
    let patch = parse_assignments(assignments)?;
    let lifecycle = open_lifecycle(config)?;
    let record = lifecycle.configs().set(id, patch)?;
    eprintln!("{} Updated configuration for '{}'", "=>".blue().bold(), id.cyan());
    print_record(&record)
}

/// Handle `forum config reset <ID>`
pub fn run_config_reset(config: &ServerConfig, id: &str) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;
    let record = lifecycle.configs().reset(id)?;
    eprintln!("{} Reset configuration for '{}'", "=>".blue().bold(), id.cyan());
    print_record(&record)
}

//! Print the effective configuration

use crate::system_config::LedgerConfig;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(config: &LedgerConfig, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) => println!("{}", format!("# loaded from {}", path.display()).dimmed()),
        None => println!("{}", "# defaults (no config file found)".dimmed()),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

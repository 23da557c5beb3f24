//! Application settings loaded from config.toml
//!
//! Holds the identity used for system-initiated work (seeding and the startup
//! reconciliation pass) and optional budget items to seed.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
pub struct Settings {
    /// System identity
    #[serde(default)]
    pub system: SystemSettings,
    /// Budget items to create on startup when missing
    #[serde(default)]
    pub budget_items: Vec<BudgetItemSeed>,
}

/// Identity used for work the system performs on its own behalf
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SystemSettings {
    /// User id recorded as the actor of startup reconciliation and seeding
    pub actor_id: Option<i64>,
}

/// A budget item to seed
#[derive(Debug, Deserialize, Clone)]
pub struct BudgetItemSeed {
    /// Unique name
    pub name: String,
    /// Allocation
    pub allocation: f64,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A field has the wrong type
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_settings(&contents)
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from ./config.toml, or defaults when the file is absent.
pub fn load_default_settings() -> Result<Settings> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_settings(path)
    } else {
        tracing::info!("No config.toml found, using default settings");
        Ok(Settings::default())
    }
}

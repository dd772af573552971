//! Console configuration.
//!
//! Precedence: environment (`DEVDUO__*`) > file at `DEVDUO_CONFIG`
//! (default `config/console.toml`) > built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dashboard::DashboardOptions;
use crate::error::ConsoleResult;

const DEFAULT_CONFIG_PATH: &str = "config/console.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub app_name: String,
    pub port: u16,
    pub storage_path: PathBuf,
    /// Operator emails that hold the admin claim.
    #[serde(default)]
    pub admin_emails: Vec<String>,
    pub activity_per_source: usize,
    pub activity_total: usize,
    pub filter_transition_ms: u64,
    /// Where a signed-in non-admin is sent.
    pub public_root: String,
    /// Populate an empty store with demo rows on startup.
    pub seed_demo: bool,
}

impl ConsoleConfig {
    pub fn load() -> ConsoleResult<Self> {
        let path = std::env::var("DEVDUO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Loads with `path` as the file layer. A missing file is skipped.
    pub fn load_from(path: &Path) -> ConsoleResult<Self> {
        let builder = config::Config::builder()
            .set_default("app_name", "DevDuo Console")?
            .set_default("port", 8000_i64)?
            .set_default("storage_path", "./data/devduo_store")?
            .set_default("admin_emails", Vec::<String>::new())?
            .set_default("activity_per_source", 2_i64)?
            .set_default("activity_total", 4_i64)?
            .set_default("filter_transition_ms", 200_i64)?
            .set_default("public_root", "/")?
            .set_default("seed_demo", false)?;

        let builder = if path.exists() {
            tracing::debug!("[CONFIG] Reading {}", path.display());
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("DEVDUO")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admin_emails"),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn filter_transition(&self) -> Duration {
        Duration::from_millis(self.filter_transition_ms)
    }

    pub fn dashboard_options(&self) -> DashboardOptions {
        DashboardOptions {
            activity_per_source: self.activity_per_source,
            activity_total: self.activity_total,
            filter_transition: self.filter_transition(),
        }
    }
}

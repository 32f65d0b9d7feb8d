//! Runtime configuration.
//!
//! Built from environment variables; per-plugin settings come from an
//! optional TOML file:
//!
//! ```toml
//! [plugins.midnight]
//! accent = "#7f5af0"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PluginError;

/// Default plugin search directory, relative to the working directory.
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory scanned by `load_all_plugins` at startup.
    pub plugin_dir: PathBuf,
    /// TOML file holding `[plugins.<name>]` tables.
    pub settings_file: Option<PathBuf>,
    /// Whether the host loads `plugin_dir` on startup.
    pub autoload: bool,
    /// Per-plugin settings applied after a successful `initialize()`.
    pub plugin_settings: HashMap<String, serde_json::Value>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            settings_file: None,
            autoload: true,
            plugin_settings: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    plugins: HashMap<String, toml::Table>,
}

impl RuntimeConfig {
    /// Build config from environment variables.
    ///
    /// Does not read the settings file; call
    /// [`load_settings`](Self::load_settings) for that.
    pub fn from_env() -> Self {
        Self {
            plugin_dir: std::env::var_os("DARKPLAY_PLUGIN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN_DIR)),
            settings_file: std::env::var_os("DARKPLAY_PLUGIN_CONFIG").map(PathBuf::from),
            autoload: std::env::var("DARKPLAY_PLUGIN_AUTOLOAD")
                .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
                .unwrap_or(true),
            plugin_settings: HashMap::new(),
        }
    }

    /// Read `settings_file`, if configured, into `plugin_settings`.
    pub async fn load_settings(&mut self) -> Result<(), PluginError> {
        let Some(path) = self.settings_file.clone() else {
            return Ok(());
        };
        let content = tokio::fs::read_to_string(&path).await?;
        self.plugin_settings = parse_settings(&content)?;
        tracing::info!(
            path = %path.display(),
            plugins = self.plugin_settings.len(),
            "plugin settings loaded"
        );
        Ok(())
    }

    pub fn settings_for(&self, plugin_name: &str) -> Option<&serde_json::Value> {
        self.plugin_settings.get(plugin_name)
    }

    pub fn with_plugin_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.plugin_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Parse a settings document into JSON values keyed by plugin name.
pub fn parse_settings(content: &str) -> Result<HashMap<String, serde_json::Value>, PluginError> {
    let file: SettingsFile = toml::from_str(content)?;
    file.plugins
        .into_iter()
        .map(|(name, table)| {
            let value = serde_json::to_value(table)
                .map_err(|e| PluginError::Config(format!("settings for {name}: {e}")))?;
            Ok((name, value))
        })
        .collect()
}

//! Midnight — a dark theme shipped as a loadable plugin.
//!
//! Build with `cargo build -p darkplay-theme-midnight` and copy the
//! resulting shared library into the host's plugin directory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use darkplay_plugin::{declare_plugin, Plugin, PluginSignals, ThemePlugin};
use serde_json::{json, Value};

const DEFAULT_ACCENT: &str = "#7f5af0";

pub struct Midnight {
    enabled: AtomicBool,
    accent: RwLock<String>,
    signals: RwLock<Option<PluginSignals>>,
}

impl Default for Midnight {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            accent: RwLock::new(DEFAULT_ACCENT.to_string()),
            signals: RwLock::new(None),
        }
    }
}

impl Midnight {
    fn accent(&self) -> String {
        self.accent
            .read()
            .map(|a| a.clone())
            .unwrap_or_else(|_| DEFAULT_ACCENT.to_string())
    }

    fn report(&self, message: &str) {
        if let Ok(signals) = self.signals.read() {
            if let Some(signals) = signals.as_ref() {
                signals.error_occurred(message);
            }
        }
    }
}

/// Accepts `#rgb` and `#rrggbb`.
fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

impl Plugin for Midnight {
    fn name(&self) -> String {
        "midnight".to_string()
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn description(&self) -> String {
        "Low-glare dark theme with a violet accent".to_string()
    }

    fn initialize(&self) -> bool {
        self.enabled.store(true, Ordering::Release);
        tracing::debug!(accent = %self.accent(), "midnight theme initialized");
        true
    }

    fn shutdown(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn default_config(&self) -> Value {
        json!({ "accent": DEFAULT_ACCENT })
    }

    fn apply_config(&self, config: &Value) {
        let Some(accent) = config.get("accent") else {
            return;
        };
        match accent.as_str().filter(|a| is_hex_color(a)) {
            Some(accent) => {
                if let Ok(mut current) = self.accent.write() {
                    *current = accent.to_string();
                }
            }
            None => self.report(&format!("ignoring invalid accent color {accent}")),
        }
    }

    fn bind_signals(&self, signals: PluginSignals) {
        if let Ok(mut slot) = self.signals.write() {
            *slot = Some(signals);
        }
    }

    fn as_theme(&self) -> Option<&(dyn ThemePlugin + 'static)> {
        Some(self)
    }
}

impl ThemePlugin for Midnight {
    fn theme_name(&self) -> String {
        "Midnight".to_string()
    }

    fn theme_style_sheet(&self) -> String {
        format!(
            "QWidget {{ background-color: #16161a; color: #fffffe; }}\n\
             QPushButton {{ background-color: {accent}; border-radius: 4px; }}\n\
             QSlider::handle {{ background: {accent}; }}\n",
            accent = self.accent()
        )
    }

    fn theme_colors(&self) -> Value {
        json!({
            "background": "#16161a",
            "surface": "#242629",
            "text": "#fffffe",
            "muted": "#94a1b2",
            "accent": self.accent(),
        })
    }
}

declare_plugin!(Midnight, Midnight::default);

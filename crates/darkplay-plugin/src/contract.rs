//! The capability contract every plugin implements.
//!
//! A plugin is a value implementing [`Plugin`]. Dynamic plugins are built as
//! `cdylib` crates against this crate and export a single
//! [`PluginDeclaration`] through [`declare_plugin!`](crate::declare_plugin):
//!
//! ```rust,ignore
//! use darkplay_plugin::{declare_plugin, Plugin};
//!
//! #[derive(Default)]
//! pub struct Visualizer { enabled: AtomicBool }
//!
//! impl Plugin for Visualizer {
//!     fn name(&self) -> String { "visualizer".into() }
//!     fn version(&self) -> String { "1.0.0".into() }
//!     fn description(&self) -> String { "Spectrum visualizer".into() }
//!     fn initialize(&self) -> bool { self.enabled.store(true, Ordering::Release); true }
//!     fn shutdown(&self) { self.enabled.store(false, Ordering::Release); }
//!     fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }
//! }
//!
//! declare_plugin!(Visualizer, Visualizer::default);
//! ```
//!
//! All methods take `&self`: the runtime shares one instance between the
//! registry and every handle it gives out, so plugins keep mutable state
//! behind atomics or locks.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::events::{EventBus, PluginEvent};

/// Name of the static every plugin library exports.
pub const PLUGIN_DECLARATION_SYMBOL: &str = "darkplay_plugin_declaration";

/// Bumped whenever [`Plugin`] or [`PluginDeclaration`] change shape.
pub const ABI_VERSION: u32 = 1;

/// Version of this crate, baked into every declaration at plugin build time.
pub const PLUGIN_API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The single entry point exported by a plugin library.
///
/// Both version fields are compared against the host before `create` is
/// ever called; a mismatch means the vtable layout cannot be trusted.
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub api_version: &'static str,
    pub create: fn() -> Box<dyn Plugin>,
}

/// Export `$plugin_type` from a `cdylib` crate.
///
/// `$constructor` is any `fn() -> $plugin_type` path, e.g. `Type::default`.
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static darkplay_plugin_declaration: $crate::PluginDeclaration =
            $crate::PluginDeclaration {
                abi_version: $crate::ABI_VERSION,
                api_version: $crate::PLUGIN_API_VERSION,
                create: __darkplay_plugin_create,
            };

        fn __darkplay_plugin_create() -> ::std::boxed::Box<dyn $crate::Plugin> {
            let constructor: fn() -> $plugin_type = $constructor;
            ::std::boxed::Box::new(constructor())
        }
    };
}

/// Base contract for every loadable module.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> String;
    fn version(&self) -> String;
    fn description(&self) -> String;

    /// Names of plugins this one expects to be loaded alongside it.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// One-time setup. Returning `false` rejects the plugin.
    fn initialize(&self) -> bool;

    /// Release resources. Must tolerate being called without a prior
    /// successful [`initialize`](Plugin::initialize).
    fn shutdown(&self);

    fn is_enabled(&self) -> bool;

    fn default_config(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    fn apply_config(&self, _config: &serde_json::Value) {}

    /// Receives the handle used to raise `status_changed` and
    /// `error_occurred`. Called once per load, before `initialize`.
    fn bind_signals(&self, _signals: PluginSignals) {}

    fn as_media_codec(&self) -> Option<&(dyn MediaCodecPlugin + 'static)> {
        None
    }

    fn as_theme(&self) -> Option<&(dyn ThemePlugin + 'static)> {
        None
    }

    fn as_audio_effect(&self) -> Option<&(dyn AudioEffectPlugin + 'static)> {
        None
    }
}

// ─── Specialized variants ───────────────────────────────────────────────

/// Codec plugins advertise which container/stream formats they handle.
pub trait MediaCodecPlugin: Plugin {
    fn supported_formats(&self) -> Vec<String>;
    fn can_decode(&self, format: &str) -> bool;
    fn can_encode(&self, format: &str) -> bool;
}

pub trait ThemePlugin: Plugin {
    fn theme_name(&self) -> String;
    fn theme_style_sheet(&self) -> String;
    /// Role → color map, e.g. `{"background": "#16161a"}`.
    fn theme_colors(&self) -> serde_json::Value;
}

/// In-place effect over interleaved `f32` samples.
pub trait AudioEffectPlugin: Plugin {
    fn process_audio(&self, buffer: &mut [f32], channels: usize);

    /// Controls the UI layer should render for this effect.
    fn control_parameters(&self) -> Vec<ControlParameter> {
        Vec::new()
    }
}

/// One user-adjustable knob of an audio effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParameter {
    pub id: String,
    pub label: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Maps a variant trait object to its query on the base contract.
///
/// Lets callers ask the registry for `dyn ThemePlugin` without the registry
/// knowing about any variant.
pub trait Capability {
    fn query(plugin: &dyn Plugin) -> Option<&Self>;
}

impl Capability for dyn MediaCodecPlugin {
    fn query(plugin: &dyn Plugin) -> Option<&Self> {
        plugin.as_media_codec()
    }
}

impl Capability for dyn ThemePlugin {
    fn query(plugin: &dyn Plugin) -> Option<&Self> {
        plugin.as_theme()
    }
}

impl Capability for dyn AudioEffectPlugin {
    fn query(plugin: &dyn Plugin) -> Option<&Self> {
        plugin.as_audio_effect()
    }
}

// ─── Signals ────────────────────────────────────────────────────────────

/// Handle a plugin uses to report status and errors.
///
/// Emissions are queued on the manager's event bus under the plugin's
/// name; they never call back into the registry synchronously.
#[derive(Debug, Clone)]
pub struct PluginSignals {
    plugin_name: String,
    bus: EventBus,
}

impl PluginSignals {
    pub(crate) fn new(plugin_name: impl Into<String>, bus: EventBus) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            bus,
        }
    }

    pub fn status_changed(&self, enabled: bool) {
        let name = self.plugin_name.clone();
        self.bus.publish(if enabled {
            PluginEvent::Enabled { name }
        } else {
            PluginEvent::Disabled { name }
        });
    }

    pub fn error_occurred(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(plugin = %self.plugin_name, "plugin reported error: {message}");
        self.bus.publish(PluginEvent::Error {
            plugin: Some(self.plugin_name.clone()),
            kind: ErrorKind::PluginReported,
            message,
        });
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }
}

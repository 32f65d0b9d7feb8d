//! DarkPlay Plugin Runtime
//!
//! Loads native plugin libraries (`cdylib` crates built with
//! [`declare_plugin!`]) at runtime, tracks them in a shared registry, and
//! drives their lifecycle: load, enable, disable, unload. Every state change
//! and failure is published as a [`PluginEvent`]; public operations report
//! through events and return a success flag instead of propagating errors.
//!
//! Plugins run in-process with full host privileges. There is no sandbox.

pub mod config;
pub mod contract;
pub mod discovery;
pub mod error;
pub mod events;
pub mod loader;
pub mod manager;
pub mod registry;

pub use config::RuntimeConfig;
pub use contract::{
    AudioEffectPlugin, Capability, ControlParameter, MediaCodecPlugin, Plugin, PluginDeclaration,
    PluginSignals, ThemePlugin, ABI_VERSION, PLUGIN_API_VERSION, PLUGIN_DECLARATION_SYMBOL,
};
pub use discovery::{discover_candidates, PLUGIN_EXTENSION};
pub use error::{ErrorKind, LoadError, PluginError};
pub use events::{EventBus, PluginEvent};
pub use loader::{LoadedModule, ModuleLoader, NativeLoader};
pub use manager::PluginManager;
pub use registry::{PluginHandle, PluginInfo, PluginRecord, PluginRegistry};

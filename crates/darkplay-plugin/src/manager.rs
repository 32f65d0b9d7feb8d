//! Plugin manager — lifecycle controller and public API.
//!
//! The `PluginManager` drives every transition (load, enable, disable,
//! unload) and funnels every failure into one error event stream. Public
//! operations never return `Err` or panic: they report through the event
//! bus and return a success flag.
//!
//! Lock discipline: the registry lock is only held to read or commit.
//! Plugin code (factory, `initialize`, `shutdown`, config hooks) runs on
//! the blocking pool with no registry lock held, so a plugin may call back
//! into the manager without deadlocking it.

use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RuntimeConfig;
use crate::contract::{Capability, PluginSignals};
use crate::discovery::discover_candidates;
use crate::error::{LoadError, PluginError};
use crate::events::{EventBus, PluginEvent};
use crate::loader::{ModuleLoader, NativeLoader};
use crate::registry::{PluginHandle, PluginInfo, PluginRecord, PluginRegistry};

/// Why a call into plugin code did not return normally.
#[derive(Debug)]
enum PluginCallError {
    Panicked(String),
    Cancelled,
}

impl std::fmt::Display for PluginCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginCallError::Panicked(msg) => write!(f, "panicked: {msg}"),
            PluginCallError::Cancelled => write!(f, "call was cancelled"),
        }
    }
}

/// A failed load, with the plugin name when it was known.
struct LoadFailure {
    plugin: Option<String>,
    error: PluginError,
}

impl LoadFailure {
    fn anonymous(error: impl Into<PluginError>) -> Self {
        Self {
            plugin: None,
            error: error.into(),
        }
    }

    fn named(name: &str, error: PluginError) -> Self {
        Self {
            plugin: Some(name.to_string()),
            error,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run plugin code on the blocking pool, converting a panic into an error.
async fn call_plugin<F, R>(f: F) -> Result<R, PluginCallError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        if e.is_panic() {
            PluginCallError::Panicked(panic_message(e.into_panic()))
        } else {
            PluginCallError::Cancelled
        }
    })
}

// ─── Manager ────────────────────────────────────────────────────────────

/// Thread-safe plugin lifecycle controller.
///
/// Share it behind an `Arc`. Dropping the last reference tears down any
/// plugins still loaded; prefer awaiting
/// [`unload_all_plugins`](Self::unload_all_plugins) on application shutdown
/// so teardown happens off the async workers.
pub struct PluginManager {
    registry: PluginRegistry,
    loader: Arc<dyn ModuleLoader>,
    events: EventBus,
    config: RuntimeConfig,
    next_load_order: AtomicU64,
    failed_loads: AtomicUsize,
}

impl PluginManager {
    /// Create a manager that loads native libraries.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_loader(config, Arc::new(NativeLoader::new()))
    }

    /// Create a manager with a custom module loader.
    pub fn with_loader(config: RuntimeConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            registry: PluginRegistry::new(),
            loader,
            events: EventBus::new(),
            config,
            next_load_order: AtomicU64::new(0),
            failed_loads: AtomicUsize::new(0),
        }
    }

    /// Subscribe to lifecycle and error events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PluginEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn report(&self, plugin: Option<&str>, err: &PluginError) {
        tracing::error!(
            plugin = plugin.unwrap_or("-"),
            kind = ?err.kind(),
            "{err}"
        );
        self.events.publish(PluginEvent::error(plugin, err));
    }

    /// Drop the manager's reference to a record on the blocking pool; when
    /// it is the last one the library is closed there.
    async fn release(&self, record: Arc<PluginRecord>) {
        let name = record.name().to_string();
        let outstanding = Arc::strong_count(&record) - 1;
        if outstanding > 0 {
            tracing::warn!(
                plugin = %name,
                outstanding,
                "plugin handles still held; module release deferred until they drop"
            );
        }
        if call_plugin(move || drop(record)).await.is_err() {
            tracing::warn!(plugin = %name, "module release did not complete cleanly");
        }
    }

    // ── Load ─────────────────────────────────────────────────────────

    /// Load, validate, and initialize the plugin library at `path`.
    ///
    /// On success the plugin is registered enabled and `Loaded` then
    /// `Enabled` are published.
    pub async fn load_plugin(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_load(path).await {
            Ok(name) => {
                tracing::info!(plugin = %name, path = %path.display(), "plugin loaded");
                true
            }
            Err(failure) => {
                self.report(failure.plugin.as_deref(), &failure.error);
                false
            }
        }
    }

    async fn try_load(&self, path: &Path) -> Result<String, LoadFailure> {
        if path.as_os_str().is_empty() {
            return Err(LoadFailure::anonymous(PluginError::ValidationFailure(
                "empty file path provided".to_string(),
            )));
        }

        let loader = Arc::clone(&self.loader);
        let owned_path = path.to_path_buf();
        let load_order = self.next_load_order.fetch_add(1, Ordering::Relaxed);
        let record = call_plugin(move || {
            loader
                .load(&owned_path)
                .map(|module| Arc::new(PluginRecord::new(module, load_order, false)))
        })
        .await
        .map_err(|e| {
            LoadFailure::anonymous(LoadError::InvalidInterface {
                path: path.to_path_buf(),
                reason: format!("loading {e}"),
            })
        })?
        .map_err(LoadFailure::anonymous)?;

        let name = record.name().to_string();
        if name.trim().is_empty() || record.version().trim().is_empty() {
            let error = PluginError::ValidationFailure(format!(
                "{} reports an empty name or version",
                path.display()
            ));
            self.release(record).await;
            return Err(LoadFailure::anonymous(error));
        }

        if self.registry.contains(&name).await {
            self.release(record).await;
            return Err(LoadFailure::named(&name, PluginError::DuplicateName(name.clone())));
        }

        for dependency in record.dependencies() {
            if !self.registry.contains(dependency).await {
                tracing::warn!(plugin = %name, %dependency, "declared dependency is not loaded");
            }
        }

        let signals = PluginSignals::new(name.clone(), self.events.clone());
        let rec = Arc::clone(&record);
        let initialized = call_plugin(move || {
            let plugin = rec.plugin();
            plugin.bind_signals(signals);
            plugin.initialize()
        })
        .await;

        let reason = match initialized {
            Ok(true) => None,
            Ok(false) => Some("initialize() returned false".to_string()),
            Err(e) => Some(format!("initialize() {e}")),
        };
        if let Some(reason) = reason {
            self.failed_loads.fetch_add(1, Ordering::Relaxed);
            self.release(record).await;
            return Err(LoadFailure::named(
                &name,
                PluginError::InitializationFailure {
                    name: name.clone(),
                    reason,
                },
            ));
        }

        if let Some(settings) = self.config.settings_for(&name).cloned() {
            let rec = Arc::clone(&record);
            if let Err(e) = call_plugin(move || rec.plugin().apply_config(&settings)).await {
                self.report(
                    Some(&name),
                    &PluginError::Config(format!("apply_config for {name} {e}")),
                );
            }
        }

        // Held across insert and publish so a concurrent unload of this
        // record cannot emit `Unloaded` ahead of `Loaded`.
        let guard = record.lifecycle.lock().await;
        record.set_enabled(true);
        if !self.registry.insert(Arc::clone(&record)).await {
            // Another load registered the same name while this one was
            // initializing.
            record.set_enabled(false);
            let rec = Arc::clone(&record);
            if let Err(e) = call_plugin(move || rec.plugin().shutdown()).await {
                tracing::warn!(plugin = %name, "shutdown of duplicate instance {e}");
            }
            drop(guard);
            self.release(record).await;
            return Err(LoadFailure::named(&name, PluginError::DuplicateName(name.clone())));
        }

        self.events.publish(PluginEvent::Loaded { name: name.clone() });
        self.events.publish(PluginEvent::Enabled { name: name.clone() });
        drop(guard);
        Ok(name)
    }

    /// Load every plugin library in `dir`, in file-name order.
    ///
    /// Each failure is reported on its own and does not stop the scan.
    /// Returns the number of plugins loaded.
    pub async fn load_all_plugins(&self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        let candidates = match discover_candidates(dir).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.report(None, &e);
                return 0;
            }
        };

        tracing::info!(dir = %dir.display(), candidates = candidates.len(), "loading plugins");

        let mut loaded = 0;
        for path in candidates {
            if self.load_plugin(&path).await {
                loaded += 1;
            }
        }
        loaded
    }

    // ── Unload ───────────────────────────────────────────────────────

    /// Shut down and unregister `name`, releasing its module last.
    ///
    /// A panicking `shutdown()` is reported but does not prevent the
    /// unload.
    pub async fn unload_plugin(&self, name: &str) -> bool {
        match self.try_unload(name).await {
            Ok(()) => {
                tracing::info!(plugin = %name, "plugin unloaded");
                self.events.publish(PluginEvent::Unloaded {
                    name: name.to_string(),
                });
                true
            }
            Err(e) => {
                self.report(Some(name), &e);
                false
            }
        }
    }

    async fn try_unload(&self, name: &str) -> Result<(), PluginError> {
        let record = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        let guard = record.lifecycle.lock().await;
        if !self.is_registered(&record).await {
            return Err(PluginError::NotFound(name.to_string()));
        }

        if record.is_enabled() {
            self.shutdown_record(&record).await?;
        }

        self.registry.remove(name).await;
        drop(guard);
        self.release(record).await;
        Ok(())
    }

    /// Whether `record` is still the registered instance for its name.
    ///
    /// Checked after taking a record's lifecycle lock: an unload may have
    /// removed it, or a reload replaced it, while the caller waited.
    async fn is_registered(&self, record: &Arc<PluginRecord>) -> bool {
        self.registry
            .get(record.name())
            .await
            .is_some_and(|current| Arc::ptr_eq(&current, record))
    }

    /// Call `shutdown()` and clear the enabled flag.
    ///
    /// A panic is reported as a non-fatal `ShutdownError`; only a cancelled
    /// call fails, leaving the plugin enabled.
    async fn shutdown_record(&self, record: &Arc<PluginRecord>) -> Result<(), PluginError> {
        let rec = Arc::clone(record);
        match call_plugin(move || rec.plugin().shutdown()).await {
            Ok(()) => {}
            Err(PluginCallError::Panicked(msg)) => {
                self.report(
                    Some(record.name()),
                    &PluginError::ShutdownError {
                        name: record.name().to_string(),
                        reason: msg,
                    },
                );
            }
            Err(e @ PluginCallError::Cancelled) => {
                return Err(PluginError::ShutdownError {
                    name: record.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        record.set_enabled(false);
        Ok(())
    }

    /// Unload every plugin, newest first.
    ///
    /// Names are snapshotted up front; each unload runs with no registry
    /// lock held.
    pub async fn unload_all_plugins(&self) {
        let mut names = self.registry.names().await;
        names.reverse();
        tracing::info!(count = names.len(), "unloading all plugins");
        for name in names {
            self.unload_plugin(&name).await;
        }
    }

    // ── Enable / disable ─────────────────────────────────────────────

    /// Re-initialize a disabled plugin. Idempotent.
    pub async fn enable_plugin(&self, name: &str) -> bool {
        let Some(record) = self.registry.get(name).await else {
            self.report(Some(name), &PluginError::NotFound(name.to_string()));
            return false;
        };

        let _guard = record.lifecycle.lock().await;
        if !self.is_registered(&record).await {
            self.report(Some(name), &PluginError::NotFound(name.to_string()));
            return false;
        }
        if record.is_enabled() {
            return true;
        }

        let rec = Arc::clone(&record);
        let reason = match call_plugin(move || rec.plugin().initialize()).await {
            Ok(true) => None,
            Ok(false) => Some("initialize() returned false".to_string()),
            Err(e) => Some(format!("initialize() {e}")),
        };
        if let Some(reason) = reason {
            self.report(
                Some(name),
                &PluginError::InitializationFailure {
                    name: name.to_string(),
                    reason,
                },
            );
            return false;
        }

        record.set_enabled(true);
        tracing::info!(plugin = %name, "plugin enabled");
        self.events.publish(PluginEvent::Enabled {
            name: name.to_string(),
        });
        true
    }

    /// Shut a plugin down while keeping it registered. Idempotent.
    pub async fn disable_plugin(&self, name: &str) -> bool {
        let Some(record) = self.registry.get(name).await else {
            self.report(Some(name), &PluginError::NotFound(name.to_string()));
            return false;
        };

        let _guard = record.lifecycle.lock().await;
        if !self.is_registered(&record).await {
            self.report(Some(name), &PluginError::NotFound(name.to_string()));
            return false;
        }
        if !record.is_enabled() {
            return true;
        }

        if let Err(e) = self.shutdown_record(&record).await {
            self.report(Some(name), &e);
            return false;
        }

        tracing::info!(plugin = %name, "plugin disabled");
        self.events.publish(PluginEvent::Disabled {
            name: name.to_string(),
        });
        true
    }

    // ── Configuration ────────────────────────────────────────────────

    pub async fn plugin_default_config(&self, name: &str) -> Option<serde_json::Value> {
        let record = self.registry.get(name).await?;
        match call_plugin(move || record.plugin().default_config()).await {
            Ok(config) => Some(config),
            Err(e) => {
                self.report(
                    Some(name),
                    &PluginError::Config(format!("default_config for {name} {e}")),
                );
                None
            }
        }
    }

    pub async fn apply_plugin_config(&self, name: &str, config: serde_json::Value) -> bool {
        let Some(record) = self.registry.get(name).await else {
            self.report(Some(name), &PluginError::NotFound(name.to_string()));
            return false;
        };
        match call_plugin(move || record.plugin().apply_config(&config)).await {
            Ok(()) => true,
            Err(e) => {
                self.report(
                    Some(name),
                    &PluginError::Config(format!("apply_config for {name} {e}")),
                );
                false
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Names of loaded plugins, in load order.
    pub async fn available_plugins(&self) -> Vec<String> {
        self.registry.names().await
    }

    pub async fn get_plugin(&self, name: &str) -> Option<PluginHandle> {
        self.registry.get(name).await.map(PluginHandle::new)
    }

    /// Enabled plugins exposing capability `C`, e.g.
    /// `manager.plugins_of_type::<dyn ThemePlugin>()`.
    pub async fn plugins_of_type<C: Capability + ?Sized>(&self) -> Vec<PluginHandle> {
        self.registry
            .snapshot()
            .await
            .into_iter()
            .map(PluginHandle::new)
            .filter(|handle| handle.is_enabled() && handle.capability::<C>().is_some())
            .collect()
    }

    pub async fn is_plugin_loaded(&self, name: &str) -> bool {
        self.registry.contains(name).await
    }

    pub async fn is_plugin_enabled(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .await
            .is_some_and(|record| record.is_enabled())
    }

    pub async fn loaded_plugin_count(&self) -> usize {
        self.registry.count().await
    }

    pub async fn enabled_plugin_count(&self) -> usize {
        self.registry.enabled_count().await
    }

    pub async fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.get_plugin(name).await.map(|handle| handle.info())
    }

    pub async fn plugin_infos(&self) -> Vec<PluginInfo> {
        self.registry
            .snapshot()
            .await
            .into_iter()
            .map(|record| PluginHandle::new(record).info())
            .collect()
    }

    /// Loads rejected because `initialize()` failed.
    pub fn failed_load_count(&self) -> usize {
        self.failed_loads.load(Ordering::Relaxed)
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        let records = self.registry.take_all();
        if records.is_empty() {
            return;
        }
        tracing::info!(count = records.len(), "tearing down remaining plugins");

        for record in records.into_iter().rev() {
            let name = record.name().to_string();
            if record.is_enabled() {
                let plugin = record.plugin();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    plugin.shutdown();
                }));
                if let Err(payload) = result {
                    tracing::warn!(
                        plugin = %name,
                        "shutdown panicked during teardown: {}",
                        panic_message(payload)
                    );
                }
                record.set_enabled(false);
            }
            drop(record);
            self.events.publish(PluginEvent::Unloaded { name });
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────

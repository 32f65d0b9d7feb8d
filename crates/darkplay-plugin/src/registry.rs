//! Plugin registry — the shared map of loaded plugins.
//!
//! The registry only stores and hands out records. It never calls into
//! plugin code; the manager copies out what it needs, drops the lock, and
//! comes back to commit. Every query returns an owned snapshot.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::contract::{Capability, Plugin};
use crate::loader::LoadedModule;

// ─── Record ─────────────────────────────────────────────────────────────

/// One loaded plugin.
pub struct PluginRecord {
    name: String,
    version: String,
    description: String,
    dependencies: Vec<String>,
    module: LoadedModule,
    enabled: AtomicBool,
    loaded_at: DateTime<Utc>,
    load_order: u64,
    /// Serializes initialize/shutdown for this plugin only.
    pub(crate) lifecycle: Mutex<()>,
}

impl PluginRecord {
    /// Build a record from a module whose metadata was already validated.
    pub(crate) fn new(module: LoadedModule, load_order: u64, enabled: bool) -> Self {
        let plugin = module.plugin();
        Self {
            name: plugin.name(),
            version: plugin.version(),
            description: plugin.description(),
            dependencies: plugin.dependencies(),
            module,
            enabled: AtomicBool::new(enabled),
            loaded_at: Utc::now(),
            load_order,
            lifecycle: Mutex::new(()),
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn load_order(&self) -> u64 {
        self.load_order
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
            file_path: self.module.path().to_path_buf(),
            enabled: self.is_enabled(),
            loaded_at: self.loaded_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn file_path(&self) -> &Path {
        self.module.path()
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.module.plugin()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("module", &self.module)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

// ─── Handle ─────────────────────────────────────────────────────────────

/// Shared reference to a loaded plugin.
///
/// Holding a handle keeps the plugin's library mapped even after the
/// plugin is unloaded from the registry; the library is released when the
/// last handle drops.
#[derive(Clone)]
pub struct PluginHandle(Arc<PluginRecord>);

impl PluginHandle {
    pub(crate) fn new(record: Arc<PluginRecord>) -> Self {
        Self(record)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn version(&self) -> &str {
        self.0.version()
    }

    pub fn file_path(&self) -> &Path {
        self.0.file_path()
    }

    /// Lock-free read of the enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.0.plugin()
    }

    /// Query a specialized variant, e.g. `handle.capability::<dyn ThemePlugin>()`.
    pub fn capability<C: Capability + ?Sized>(&self) -> Option<&C> {
        C::query(self.plugin())
    }

    pub fn info(&self) -> PluginInfo {
        self.0.info()
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginHandle").field(&self.0).finish()
    }
}

/// Point-in-time description of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub file_path: PathBuf,
    pub enabled: bool,
    pub loaded_at: DateTime<Utc>,
}

// ─── Registry ───────────────────────────────────────────────────────────

/// Name-keyed map of loaded plugins behind a reader/writer lock.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<PluginRecord>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the record's name. Returns `false` without touching the
    /// map if the name is taken.
    pub async fn insert(&self, record: Arc<PluginRecord>) -> bool {
        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(record.name()) {
            return false;
        }
        plugins.insert(record.name().to_string(), record);
        true
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<PluginRecord>> {
        self.plugins.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<PluginRecord>> {
        self.plugins.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// All records, oldest load first.
    pub async fn snapshot(&self) -> Vec<Arc<PluginRecord>> {
        let mut records: Vec<_> = self.plugins.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.load_order());
        records
    }

    /// Names in load order.
    pub async fn names(&self) -> Vec<String> {
        self.snapshot()
            .await
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn enabled_count(&self) -> usize {
        self.plugins
            .read()
            .await
            .values()
            .filter(|r| r.is_enabled())
            .count()
    }

    /// Take every record out without awaiting. Only usable with exclusive
    /// access, i.e. during teardown.
    pub(crate) fn take_all(&mut self) -> Vec<Arc<PluginRecord>> {
        let mut records: Vec<_> = self.plugins.get_mut().drain().map(|(_, r)| r).collect();
        records.sort_by_key(|r| r.load_order());
        records
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────

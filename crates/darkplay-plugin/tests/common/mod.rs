//! Shared fixtures: an in-memory module loader and a configurable plugin.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use darkplay_plugin::{
    LoadError, LoadedModule, ModuleLoader, Plugin, PluginEvent, PluginManager, PluginSignals,
    RuntimeConfig, ThemePlugin,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// What `initialize()` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    Succeed,
    Fail,
    Panic,
}

/// Counters shared between a test and every instance built from a fixture.
#[derive(Debug, Default)]
pub struct Probe {
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub drops: AtomicUsize,
    pub last_config: Mutex<Option<serde_json::Value>>,
}

impl Probe {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<serde_json::Value> {
        self.last_config.lock().unwrap().clone()
    }
}

pub type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct Fixture {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub init: Init,
    pub panic_on_shutdown: bool,
    pub theme: bool,
    /// Raise `error_occurred` from inside `initialize()`.
    pub report_error: bool,
    /// Runs inside `initialize()`, e.g. to call back into the manager.
    pub on_init: Option<Hook>,
    /// Runs inside `shutdown()`, e.g. to hold it open while a test races it.
    pub on_shutdown: Option<Hook>,
    pub probe: Arc<Probe>,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            dependencies: Vec::new(),
            init: Init::Succeed,
            panic_on_shutdown: false,
            theme: false,
            report_error: false,
            on_init: None,
            on_shutdown: None,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn depends_on(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }

    pub fn theme(mut self) -> Self {
        self.theme = true;
        self
    }

    pub fn panic_on_shutdown(mut self) -> Self {
        self.panic_on_shutdown = true;
        self
    }

    pub fn report_error(mut self) -> Self {
        self.report_error = true;
        self
    }

    pub fn on_init(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_init = Some(Arc::new(hook));
        self
    }

    pub fn on_shutdown(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_shutdown = Some(Arc::new(hook));
        self
    }
}

pub struct TestPlugin {
    fixture: Fixture,
    enabled: AtomicBool,
    signals: Mutex<Option<PluginSignals>>,
}

impl TestPlugin {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            enabled: AtomicBool::new(false),
            signals: Mutex::new(None),
        }
    }
}

impl Drop for TestPlugin {
    fn drop(&mut self) {
        self.fixture.probe.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Plugin for TestPlugin {
    fn name(&self) -> String {
        self.fixture.name.clone()
    }

    fn version(&self) -> String {
        self.fixture.version.clone()
    }

    fn description(&self) -> String {
        format!("test plugin {}", self.fixture.name)
    }

    fn dependencies(&self) -> Vec<String> {
        self.fixture.dependencies.clone()
    }

    fn initialize(&self) -> bool {
        self.fixture.probe.inits.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.fixture.on_init {
            hook();
        }
        if self.fixture.report_error {
            if let Some(signals) = self.signals.lock().unwrap().as_ref() {
                signals.error_occurred("codec table is stale");
            }
        }
        match self.fixture.init {
            Init::Succeed => {
                self.enabled.store(true, Ordering::SeqCst);
                true
            }
            Init::Fail => false,
            Init::Panic => panic!("initialize exploded"),
        }
    }

    fn shutdown(&self) {
        self.fixture.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.fixture.on_shutdown {
            hook();
        }
        self.enabled.store(false, Ordering::SeqCst);
        if self.fixture.panic_on_shutdown {
            panic!("shutdown exploded");
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn default_config(&self) -> serde_json::Value {
        serde_json::json!({ "accent": "#ffffff" })
    }

    fn apply_config(&self, config: &serde_json::Value) {
        *self.fixture.probe.last_config.lock().unwrap() = Some(config.clone());
    }

    fn bind_signals(&self, signals: PluginSignals) {
        *self.signals.lock().unwrap() = Some(signals);
    }

    fn as_theme(&self) -> Option<&(dyn ThemePlugin + 'static)> {
        if self.fixture.theme {
            Some(self)
        } else {
            None
        }
    }
}

impl ThemePlugin for TestPlugin {
    fn theme_name(&self) -> String {
        self.fixture.name.clone()
    }

    fn theme_style_sheet(&self) -> String {
        "QWidget { background: #000; }".to_string()
    }

    fn theme_colors(&self) -> serde_json::Value {
        serde_json::json!({ "background": "#000000" })
    }
}

/// Builds a fresh [`TestPlugin`] for every load of a registered path.
/// Unknown paths fail the way an unreadable library would.
#[derive(Default)]
pub struct MockLoader {
    fixtures: Mutex<HashMap<PathBuf, Fixture>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, fixture: Fixture) {
        self.fixtures.lock().unwrap().insert(path.into(), fixture);
    }
}

impl ModuleLoader for MockLoader {
    fn load(&self, path: &Path) -> Result<LoadedModule, LoadError> {
        let fixture = self
            .fixtures
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::OpenFailed {
                path: path.to_path_buf(),
                reason: "no such mock module".to_string(),
            })?;
        Ok(LoadedModule::from_instance(
            Box::new(TestPlugin::new(fixture)),
            path,
        ))
    }
}

pub fn manager_with(loader: Arc<MockLoader>) -> PluginManager {
    PluginManager::with_loader(RuntimeConfig::default(), loader)
}

/// Path under which [`load_fixture`] registers a fixture.
pub fn path_for(name: &str) -> PathBuf {
    PathBuf::from(format!("/plugins/{name}.so"))
}

/// Register `fixture` at its default path and load it.
pub async fn load_fixture(manager: &PluginManager, loader: &MockLoader, fixture: Fixture) -> bool {
    let path = path_for(&fixture.name);
    loader.register(&path, fixture);
    manager.load_plugin(&path).await
}

/// Everything queued on `rx` so far.
pub fn drain(rx: &mut UnboundedReceiver<PluginEvent>) -> Vec<PluginEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn errors(events: &[PluginEvent]) -> Vec<&PluginEvent> {
    events.iter().filter(|e| e.is_error()).collect()
}

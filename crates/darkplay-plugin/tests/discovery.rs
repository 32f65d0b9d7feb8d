mod common;

use std::path::Path;
use std::sync::Arc;

use common::{drain, manager_with, MockLoader, Fixture};
use darkplay_plugin::{ErrorKind, PluginEvent, PluginManager, RuntimeConfig, PLUGIN_EXTENSION};

fn library_name(stem: &str) -> String {
    format!("{stem}.{PLUGIN_EXTENSION}")
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"").expect("failed to write");
}

#[tokio::test]
async fn test_missing_directory_reports_once() {
    let manager = manager_with(Arc::new(MockLoader::new()));
    let mut rx = manager.subscribe();

    let loaded = manager
        .load_all_plugins("/nonexistent/darkplay/plugins")
        .await;

    assert_eq!(loaded, 0);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        PluginEvent::Error { plugin, kind, .. } => {
            assert!(plugin.is_none());
            assert_eq!(*kind, ErrorKind::DirectoryNotFound);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_directory_is_silent() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let manager = manager_with(Arc::new(MockLoader::new()));
    let mut rx = manager.subscribe();

    assert_eq!(manager.load_all_plugins(dir.path()).await, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_loads_candidates_in_file_name_order() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let loader = Arc::new(MockLoader::new());

    for (file, plugin) in [("b-visualizer", "visualizer"), ("a-midnight", "midnight")] {
        touch(dir.path(), &library_name(file));
        loader.register(dir.path().join(library_name(file)), Fixture::new(plugin));
    }
    // Unknown to the loader: fails to open but does not stop the scan.
    touch(dir.path(), &library_name("c-corrupt"));
    // Not a library: never offered to the loader.
    touch(dir.path(), "README.txt");

    let manager = manager_with(loader);
    let mut rx = manager.subscribe();

    assert_eq!(manager.load_all_plugins(dir.path()).await, 2);
    assert_eq!(
        manager.available_plugins().await,
        vec!["midnight", "visualizer"]
    );

    let events = drain(&mut rx);
    let failures: Vec<_> = events.iter().filter(|e| e.is_error()).collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        PluginEvent::Error {
            kind: ErrorKind::OpenFailed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_plugin_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let loader = Arc::new(MockLoader::new());

    let broken = Fixture::new("broken").init(common::Init::Fail);
    touch(dir.path(), &library_name("a"));
    loader.register(dir.path().join(library_name("a")), broken);
    touch(dir.path(), &library_name("b"));
    loader.register(dir.path().join(library_name("b")), Fixture::new("working"));

    let manager = manager_with(loader);
    assert_eq!(manager.load_all_plugins(dir.path()).await, 1);
    assert_eq!(manager.available_plugins().await, vec!["working"]);
    assert_eq!(manager.failed_load_count(), 1);
}

#[tokio::test]
async fn test_native_loader_rejects_non_library_files() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(
        dir.path().join(library_name("garbage")),
        b"definitely not an ELF",
    )
    .expect("failed to write");

    let manager = PluginManager::new(RuntimeConfig::default());
    let mut rx = manager.subscribe();

    assert_eq!(manager.load_all_plugins(dir.path()).await, 0);
    assert_eq!(manager.loaded_plugin_count().await, 0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        PluginEvent::Error {
            kind: ErrorKind::OpenFailed,
            ..
        }
    ));
}

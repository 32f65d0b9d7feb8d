use std::sync::Arc;

use darkplay_plugin::{PluginManager, RuntimeConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod event_log;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = RuntimeConfig::from_env();
    if let Err(e) = config.load_settings().await {
        tracing::error!("failed to load plugin settings, continuing without them: {e}");
    }

    let plugin_dir = config.plugin_dir.clone();
    let autoload = config.autoload;
    let manager = Arc::new(PluginManager::new(config));
    let events = event_log::spawn(&manager);

    if autoload {
        tracing::info!(dir = %plugin_dir.display(), "loading plugins...");
        let loaded = manager.load_all_plugins(&plugin_dir).await;
        tracing::info!(
            loaded,
            failed = manager.failed_load_count(),
            "plugin scan complete"
        );
    } else {
        tracing::info!("plugin autoload disabled (DARKPLAY_PLUGIN_AUTOLOAD=false)");
    }

    for info in manager.plugin_infos().await {
        tracing::info!(
            plugin = %info.name,
            version = %info.version,
            enabled = info.enabled,
            path = %info.file_path.display(),
            "{}",
            info.description
        );
    }

    tracing::info!("host running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }

    tracing::info!("shutting down...");
    manager.unload_all_plugins().await;
    drop(manager);
    if let Err(e) = events.await {
        tracing::warn!("event log worker ended abnormally: {e}");
    }
    tracing::info!("shutdown complete");
}

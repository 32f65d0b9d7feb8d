//! Event log worker — mirrors plugin events into the tracing output.

use darkplay_plugin::{PluginEvent, PluginManager};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Subscribe to `manager` and log every event until the manager is gone.
pub fn spawn(manager: &PluginManager) -> JoinHandle<()> {
    let rx = manager.subscribe();
    tokio::spawn(run(rx))
}

async fn run(mut rx: UnboundedReceiver<PluginEvent>) {
    tracing::debug!("event log worker started");
    while let Some(event) = rx.recv().await {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{event:?}"));
        match &event {
            PluginEvent::Error { .. } => tracing::warn!(target: "darkplay::events", "{payload}"),
            _ => tracing::info!(target: "darkplay::events", "{payload}"),
        }
    }
    tracing::debug!("event log worker stopped");
}

//! Plugin event system — lifecycle events and their queued fan-out.
//!
//! Every signal the runtime or a plugin raises goes through one
//! [`EventBus`]. Publishing pushes onto unbounded per-subscriber queues and
//! never waits on a listener, so a slow or re-entrant observer cannot stall
//! registry operations.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ErrorKind, PluginError};

/// A lifecycle or error notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PluginEvent {
    Loaded {
        name: String,
    },
    Unloaded {
        name: String,
    },
    Enabled {
        name: String,
    },
    Disabled {
        name: String,
    },
    Error {
        /// `None` when the failure happened before a name was known
        /// (unreadable file, missing directory).
        plugin: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl PluginEvent {
    pub fn error(plugin: Option<&str>, err: &PluginError) -> Self {
        PluginEvent::Error {
            plugin: plugin.map(str::to_string),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Name of the plugin the event concerns, if any.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            PluginEvent::Loaded { name }
            | PluginEvent::Unloaded { name }
            | PluginEvent::Enabled { name }
            | PluginEvent::Disabled { name } => Some(name),
            PluginEvent::Error { plugin, .. } => plugin.as_deref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PluginEvent::Error { .. })
    }
}

/// Observer list of queued subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<PluginEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. Events published afterwards are queued on
    /// the returned receiver until it is read or dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PluginEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Queue `event` for every live subscriber. Subscribers whose receiver
    /// was dropped are pruned.
    pub fn publish(&self, event: PluginEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

//! Server configuration
//!
//! Every field has a default. Values come from, in increasing precedence:
//! the defaults, the command line, and the client's `initializationOptions`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::pipeline::StageCaps;
use crate::query::hierarchy::HierarchyLimits;

pub const DEFAULT_ENGINE_HOST: &str = "127.0.0.1";
pub const DEFAULT_ENGINE_PORT: u16 = 27099;

/// Per-tick caps of the scheduler's stage queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueCaps {
    pub load: usize,
    pub parse: usize,
    pub post_process: usize,
    pub resolve: usize,
}

impl Default for QueueCaps {
    fn default() -> Self {
        let caps = StageCaps::default();
        Self { load: caps.load, parse: caps.parse, post_process: caps.post_process, resolve: caps.resolve }
    }
}

impl From<QueueCaps> for StageCaps {
    fn from(caps: QueueCaps) -> Self {
        StageCaps {
            load: caps.load.max(1),
            parse: caps.parse.max(1),
            post_process: caps.post_process.max(1),
            resolve: caps.resolve.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Connect to the engine at all
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Fixed wait between reconnect attempts
    pub reconnect_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_ENGINE_HOST.to_string(),
            port: DEFAULT_ENGINE_PORT,
            reconnect_interval_ms: 3000,
        }
    }
}

impl EngineConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub queue_caps: QueueCaps,
    /// Quiet period after an edit before the module is re-parsed
    pub edit_debounce_ms: u64,
    /// Quiet period before the editor is asked to refresh semantic tokens
    pub refresh_debounce_ms: u64,
    /// Inactivity after which a type dump is finalized as partial
    pub ingestion_timeout_ms: u64,
    /// Quiet period before a snapshot save
    pub snapshot_debounce_ms: u64,
    /// Interval of the cooperative scheduling loop
    pub tick_interval_ms: u64,
    /// Modules scanned per step of a reference search
    pub reference_batch_size: usize,
    pub hierarchy: HierarchyLimits,
    /// Default result cap of symbol search when the request has none
    pub search_limit: Option<usize>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_caps: QueueCaps::default(),
            edit_debounce_ms: 250,
            refresh_debounce_ms: 500,
            ingestion_timeout_ms: 5000,
            snapshot_debounce_ms: 2000,
            tick_interval_ms: 10,
            reference_batch_size: 25,
            hierarchy: HierarchyLimits::default(),
            search_limit: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn ingestion_timeout(&self) -> Duration {
        Duration::from_millis(self.ingestion_timeout_ms)
    }

    pub fn snapshot_debounce(&self) -> Duration {
        Duration::from_millis(self.snapshot_debounce_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Overlays the client's `initializationOptions` on top of this config.
    ///
    /// Keys absent from `options` keep their current value. A malformed
    /// object is logged and ignored.
    pub fn merge_initialization_options(&mut self, options: &serde_json::Value) {
        if !options.is_object() {
            return;
        }
        let mut base = match serde_json::to_value(&*self) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize server config: {}", e);
                return;
            }
        };
        merge_json(&mut base, options);
        match serde_json::from_value::<ServerConfig>(base) {
            Ok(merged) => *self = merged,
            Err(e) => warn!("Ignoring malformed initializationOptions: {}", e),
        }
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

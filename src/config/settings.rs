// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::protocol::subjects::CH_PUBLIC_BRAIN;

/// One brain instance. A brain owns every analyzer of its typename.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Analyzer type this brain handles (e.g. "tripwire").
    pub typename: String,

    /// Message bus server.
    pub mq_host: String,

    /// Memory store holding transient analyzer/worker state.
    pub mem_db_host: String,

    /// Persistent event store.
    pub event_db_host: String,

    /// Database name in the event store.
    pub event_db_name: String,

    /// Public subject workers register on.
    pub ch_public: String,

    /// Seconds between liveness sweeps.
    pub examine_interval: u64,

    /// Heartbeat age, in seconds, past which a worker is marked down.
    pub examine_threshold: f64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            typename: String::new(),
            mq_host: "nats://localhost:4222".to_string(),
            mem_db_host: "redis://localhost:6379".to_string(),
            event_db_host: "mongodb://localhost:27017".to_string(),
            event_db_name: "argus".to_string(),
            ch_public: CH_PUBLIC_BRAIN.to_string(),
            examine_interval: 6,
            examine_threshold: 10.0,
        }
    }
}

/// One worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application name, used as the event `app_name` and in the shared
    /// directory layout.
    pub name: String,

    /// Id assigned by the resource manager at launch.
    pub worker_id: String,

    /// Root of the shared output directory; `~` expands to the home dir.
    pub shared_dir: String,

    /// Message bus server.
    pub mq_host: String,

    /// Memory store for the outbound event queue.
    pub mem_db_host: String,

    /// Seconds between heartbeats.
    pub heartbeat_interval: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            worker_id: String::new(),
            shared_dir: "~/argus_shared".to_string(),
            mq_host: "nats://localhost:4222".to_string(),
            mem_db_host: "redis://localhost:6379".to_string(),
            heartbeat_interval: 2,
        }
    }
}

impl WorkerConfig {
    /// Where this worker's pipeline writes output files:
    /// `{shared_dir}/{name}/{worker_id}`.
    pub fn files_dir(&self) -> PathBuf {
        expand_home(&self.shared_dir).join(&self.name).join(&self.worker_id)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brain_defaults_match_protocol_timing() {
        let config = BrainConfig::default();
        assert_eq!(config.examine_interval, 6);
        assert_eq!(config.examine_threshold, 10.0);
        assert_eq!(config.ch_public, "ch_brain");
    }

    #[test]
    fn test_files_dir_layout() {
        let config = WorkerConfig {
            name: "tripwire".to_string(),
            worker_id: "w1".to_string(),
            shared_dir: "/srv/shared".to_string(),
            ..WorkerConfig::default()
        };
        assert_eq!(config.files_dir(), PathBuf::from("/srv/shared/tripwire/w1"));
    }

    #[test]
    fn test_tilde_expands_to_home() {
        let config = WorkerConfig {
            name: "tripwire".to_string(),
            worker_id: "w1".to_string(),
            ..WorkerConfig::default()
        };
        if let Some(home) = dirs::home_dir() {
            assert!(config.files_dir().starts_with(home));
        }
    }
}

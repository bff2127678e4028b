// Configuration loader
// Optional JSON config file, environment variables override the hosts.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use super::settings::{BrainConfig, WorkerConfig};

/// Load a brain config: defaults, then the JSON file if given, then
/// `ARGUS_MQ_HOST` / `ARGUS_MEM_DB_HOST` / `ARGUS_EVENT_DB_HOST` overrides.
/// `typename` comes from the CLI and always wins.
pub fn load_brain_config(typename: &str, path: Option<&Path>) -> Result<BrainConfig> {
    let mut config: BrainConfig = load_file_or_default(path)?;
    config.typename = typename.to_string();

    if let Some(host) = env_nonempty("ARGUS_MQ_HOST") {
        config.mq_host = host;
    }
    if let Some(host) = env_nonempty("ARGUS_MEM_DB_HOST") {
        config.mem_db_host = host;
    }
    if let Some(host) = env_nonempty("ARGUS_EVENT_DB_HOST") {
        config.event_db_host = host;
    }
    Ok(config)
}

/// Load a worker config; `name` and `worker_id` come from the CLI (the
/// resource manager passes them at launch) and always win.
pub fn load_worker_config(name: &str, worker_id: &str, path: Option<&Path>) -> Result<WorkerConfig> {
    let mut config: WorkerConfig = load_file_or_default(path)?;
    config.name = name.to_string();
    config.worker_id = worker_id.to_string();

    if let Some(host) = env_nonempty("ARGUS_MQ_HOST") {
        config.mq_host = host;
    }
    if let Some(host) = env_nonempty("ARGUS_MEM_DB_HOST") {
        config.mem_db_host = host;
    }
    Ok(config)
}

fn load_file_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let path = match path {
        Some(path) => path,
        None => return Ok(T::default()),
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_path_yields_defaults() {
        let config = load_brain_config("tripwire", None).unwrap();
        assert_eq!(config.typename, "tripwire");
        assert_eq!(config.mq_host, "nats://localhost:4222");
    }

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mq_host": "nats://bus:4222", "examine_interval": 3}}"#).unwrap();

        let config = load_brain_config("tripwire", Some(file.path())).unwrap();
        assert_eq!(config.mq_host, "nats://bus:4222");
        assert_eq!(config.examine_interval, 3);
        // Untouched fields keep their defaults.
        assert_eq!(config.examine_threshold, 10.0);
    }

    #[test]
    fn test_cli_identity_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "other", "worker_id": "stale"}}"#).unwrap();

        let config = load_worker_config("tripwire", "w7", Some(file.path())).unwrap();
        assert_eq!(config.name, "tripwire");
        assert_eq!(config.worker_id, "w7");
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        assert!(load_brain_config("tripwire", Some(Path::new("/nonexistent/config.json"))).is_err());
    }
}

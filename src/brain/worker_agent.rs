// Worker agent — canonical store of analyzers and their workers.
//
// Keyspace, for a given typename:
//   {typename}:anal:{analyzer_id}            → worker_id
//   {typename}:worker:{worker_id}:status     → WorkerStatus wire string
//   {typename}:worker:{worker_id}:pipelines  → serialized pipeline list
//   {typename}:worker:{worker_id}:analyzerId → back-reference
//   {typename}:worker:{worker_id}:hbeat      → last heartbeat, f64 seconds
//
// Key construction stays behind these methods so the layout can evolve
// without touching callers. Operations against a missing worker return
// `Ok(None)` / `false`; the brain maps that to NOT_FOUND upstream.

use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::protocol::{unix_now_secs, PipelineSpec, WorkerStatus};
use crate::store::{KeyValueStore, StoreError};

/// Which side of the analyzer/worker binding a lookup starts from.
#[derive(Debug, Clone, Copy)]
pub enum WorkerSelector<'a> {
    Analyzer(&'a str),
    Worker(&'a str),
}

pub struct WorkerAgent {
    typename: String,
    store: Arc<dyn KeyValueStore>,
}

impl WorkerAgent {
    pub fn new(typename: &str, store: Arc<dyn KeyValueStore>) -> Self {
        Self { typename: typename.to_string(), store }
    }

    fn anal_key(&self, analyzer_id: &str) -> String {
        format!("{}:anal:{}", self.typename, analyzer_id)
    }

    fn worker_key(&self, worker_id: &str, field: &str) -> String {
        format!("{}:worker:{}:{}", self.typename, worker_id, field)
    }

    async fn resolve(&self, selector: WorkerSelector<'_>) -> Result<Option<String>, StoreError> {
        match selector {
            WorkerSelector::Worker(worker_id) => Ok(Some(worker_id.to_string())),
            WorkerSelector::Analyzer(analyzer_id) => self.get_worker_id(analyzer_id).await,
        }
    }

    /// The worker bound to an analyzer, if any.
    pub async fn get_worker_id(&self, analyzer_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.anal_key(analyzer_id)).await
    }

    /// The analyzer a worker is bound to, if the worker exists.
    pub async fn get_analyzer_id(&self, worker_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.worker_key(worker_id, "analyzerId")).await
    }

    /// Write the analyzer↔worker binding and the initial worker record in
    /// one batch: status `initial`, empty pipelines, back-reference.
    ///
    /// Idempotent: a retried resource-manager response with the same
    /// worker id rewrites identical values.
    pub async fn create_analyzer(&self, analyzer_id: &str, worker_id: &str) -> Result<(), StoreError> {
        let pairs = vec![
            (self.anal_key(analyzer_id), worker_id.to_string()),
            (self.worker_key(worker_id, "status"), WorkerStatus::Initial.as_str().to_string()),
            (self.worker_key(worker_id, "pipelines"), "[]".to_string()),
            (self.worker_key(worker_id, "analyzerId"), analyzer_id.to_string()),
        ];
        self.store.set_many(&pairs).await
    }

    /// Current status, or `None` for an unknown worker.
    pub async fn get_status(&self, selector: WorkerSelector<'_>) -> Result<Option<WorkerStatus>, StoreError> {
        let worker_id = match self.resolve(selector).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        match self.store.get(&self.worker_key(&worker_id, "status")).await? {
            Some(raw) => WorkerStatus::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Command(format!("worker {worker_id}: {e}"))),
            None => Ok(None),
        }
    }

    /// `(status, pipelines)` for an analyzer or worker, or `None` when
    /// either side of the binding is missing.
    pub async fn get_info(
        &self,
        selector: WorkerSelector<'_>,
    ) -> Result<Option<(WorkerStatus, Vec<PipelineSpec>)>, StoreError> {
        let worker_id = match self.resolve(selector).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let keys = vec![
            self.worker_key(&worker_id, "status"),
            self.worker_key(&worker_id, "pipelines"),
        ];
        let values = self.store.get_many(&keys).await?;
        let (raw_status, raw_pipelines) = match (&values[0], &values[1]) {
            (Some(s), Some(p)) => (s, p),
            _ => return Ok(None),
        };
        let status = WorkerStatus::from_str(raw_status)
            .map_err(|e| StoreError::Command(format!("worker {worker_id}: {e}")))?;
        let pipelines = serde_json::from_str(raw_pipelines)
            .map_err(|e| StoreError::Command(format!("worker {worker_id}: corrupt pipelines: {e}")))?;
        Ok(Some((status, pipelines)))
    }

    /// Write a new status. Returns `false` when the worker is unknown.
    /// Callers are responsible for honoring the status state machine.
    pub async fn update_status(
        &self,
        selector: WorkerSelector<'_>,
        status: WorkerStatus,
    ) -> Result<bool, StoreError> {
        let worker_id = match self.resolve(selector).await? {
            Some(id) => id,
            None => return Ok(false),
        };
        self.store.set(&self.worker_key(&worker_id, "status"), status.as_str()).await?;
        Ok(true)
    }

    /// Batch status write across many workers.
    pub async fn set_worker_statuses(&self, worker_ids: &[String], status: WorkerStatus) -> Result<(), StoreError> {
        let pairs: Vec<(String, String)> = worker_ids
            .iter()
            .map(|id| (self.worker_key(id, "status"), status.as_str().to_string()))
            .collect();
        self.store.set_many(&pairs).await
    }

    pub async fn update_pipelines(&self, worker_id: &str, pipelines: &[PipelineSpec]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(pipelines)
            .map_err(|e| StoreError::Command(format!("unserializable pipelines: {e}")))?;
        self.store.set(&self.worker_key(worker_id, "pipelines"), &raw).await
    }

    /// Seed the heartbeat key with the current clock. Called once, when the
    /// handshake completes; from then on `update_heartbeat` keeps it fresh.
    pub async fn start_listen_heartbeat(&self, worker_id: &str) -> Result<(), StoreError> {
        self.store
            .set(&self.worker_key(worker_id, "hbeat"), &unix_now_secs().to_string())
            .await
    }

    /// Refresh the heartbeat, but only if the key still exists. A heartbeat
    /// from a torn-down worker must not resurrect its record.
    pub async fn update_heartbeat(&self, worker_id: &str) -> Result<bool, StoreError> {
        self.store
            .set_if_present(&self.worker_key(worker_id, "hbeat"), &unix_now_secs().to_string())
            .await
    }

    /// Liveness sweep: every worker in `ready`/`running` whose heartbeat is
    /// older than `threshold_secs` is marked `down`. Returns the worker ids
    /// that were marked.
    pub async fn examine_all_workers(&self, threshold_secs: f64) -> Result<Vec<String>, StoreError> {
        let status_keys = self.store.scan_keys(&self.worker_key("*", "status")).await?;
        if status_keys.is_empty() {
            return Ok(Vec::new());
        }
        let statuses = self.store.get_many(&status_keys).await?;

        let mut monitored_status_keys = Vec::new();
        let mut hbeat_keys = Vec::new();
        for (key, raw) in status_keys.iter().zip(&statuses) {
            let monitored = raw
                .as_deref()
                .and_then(|s| WorkerStatus::from_str(s).ok())
                .map(|s| s.is_monitored())
                .unwrap_or(false);
            if monitored {
                monitored_status_keys.push(key.clone());
                hbeat_keys.push(key.replace(":status", ":hbeat"));
            }
        }
        if monitored_status_keys.is_empty() {
            return Ok(Vec::new());
        }

        let hbeats = self.store.get_many(&hbeat_keys).await?;
        let now = unix_now_secs();
        let mut marked = Vec::new();
        for (status_key, hbeat) in monitored_status_keys.iter().zip(&hbeats) {
            let last = hbeat.as_deref().and_then(|raw| raw.parse::<f64>().ok());
            let stale = match last {
                Some(ts) => now - ts > threshold_secs,
                // Monitored but no heartbeat key at all: treat as stale.
                None => true,
            };
            if stale {
                let worker_id = self.worker_id_from_status_key(status_key);
                debug!(worker_id = %worker_id, "worker missed heartbeat threshold, marking down");
                self.store.set(status_key, WorkerStatus::Down.as_str()).await?;
                marked.push(worker_id);
            }
        }
        Ok(marked)
    }

    fn worker_id_from_status_key(&self, status_key: &str) -> String {
        status_key
            .strip_prefix(&format!("{}:worker:", self.typename))
            .and_then(|rest| rest.strip_suffix(":status"))
            .unwrap_or(status_key)
            .to_string()
    }

    /// All `(analyzer_id, worker_id)` bindings for this typename.
    pub async fn get_all_analyzer_and_worker_ids(&self) -> Result<Vec<(String, String)>, StoreError> {
        let prefix = self.anal_key("");
        let keys = self.store.scan_keys(&self.anal_key("*")).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let worker_ids = self.store.get_many(&keys).await?;
        Ok(keys
            .iter()
            .zip(worker_ids)
            .filter_map(|(key, worker_id)| {
                let analyzer_id = key.strip_prefix(&prefix)?.to_string();
                Some((analyzer_id, worker_id?))
            })
            .collect())
    }

    /// Remove the binding and every worker field in one batch. Returns how
    /// many keys existed.
    pub async fn delete_analyzer_and_worker(&self, analyzer_id: &str, worker_id: &str) -> Result<u64, StoreError> {
        let keys = vec![
            self.anal_key(analyzer_id),
            self.worker_key(worker_id, "status"),
            self.worker_key(worker_id, "hbeat"),
            self.worker_key(worker_id, "pipelines"),
            self.worker_key(worker_id, "analyzerId"),
        ];
        self.store.delete(&keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn agent() -> (WorkerAgent, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (WorkerAgent::new("tripwire", store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_analyzer_writes_initial_record() {
        let (agent, _) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();

        assert_eq!(agent.get_worker_id("a1").await.unwrap().as_deref(), Some("w1"));
        assert_eq!(agent.get_analyzer_id("w1").await.unwrap().as_deref(), Some("a1"));
        let (status, pipelines) = agent.get_info(WorkerSelector::Worker("w1")).await.unwrap().unwrap();
        assert_eq!(status, WorkerStatus::Initial);
        assert!(pipelines.is_empty());
    }

    #[tokio::test]
    async fn test_create_analyzer_is_idempotent() {
        let (agent, _) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();
        agent.update_status(WorkerSelector::Worker("w1"), WorkerStatus::Hshake1).await.unwrap();
        // A retried response must not be treated as a new worker... it
        // rewrites the same binding, resetting status to initial.
        agent.create_analyzer("a1", "w1").await.unwrap();
        assert_eq!(agent.get_worker_id("a1").await.unwrap().as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_missing_worker_is_none_not_error() {
        let (agent, _) = agent();
        assert!(agent.get_status(WorkerSelector::Analyzer("ghost")).await.unwrap().is_none());
        assert!(agent.get_info(WorkerSelector::Worker("ghost")).await.unwrap().is_none());
        assert!(!agent.update_status(WorkerSelector::Analyzer("ghost"), WorkerStatus::Down).await.unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_update_cannot_resurrect() {
        let (agent, _) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();

        // No seed yet: conditional update refuses.
        assert!(!agent.update_heartbeat("w1").await.unwrap());

        agent.start_listen_heartbeat("w1").await.unwrap();
        assert!(agent.update_heartbeat("w1").await.unwrap());

        agent.delete_analyzer_and_worker("a1", "w1").await.unwrap();
        assert!(!agent.update_heartbeat("w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_examine_marks_stale_monitored_workers() {
        let (agent, store) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();
        agent.update_status(WorkerSelector::Worker("w1"), WorkerStatus::Running).await.unwrap();
        // Heartbeat 20 seconds in the past.
        store
            .set("tripwire:worker:w1:hbeat", &(unix_now_secs() - 20.0).to_string())
            .await
            .unwrap();

        // A second worker still handshaking is left alone.
        agent.create_analyzer("a2", "w2").await.unwrap();

        let marked = agent.examine_all_workers(10.0).await.unwrap();
        assert_eq!(marked, vec!["w1"]);
        assert_eq!(
            agent.get_status(WorkerSelector::Worker("w1")).await.unwrap(),
            Some(WorkerStatus::Down)
        );
        assert_eq!(
            agent.get_status(WorkerSelector::Worker("w2")).await.unwrap(),
            Some(WorkerStatus::Initial)
        );
    }

    #[tokio::test]
    async fn test_examine_spares_fresh_workers() {
        let (agent, _) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();
        agent.update_status(WorkerSelector::Worker("w1"), WorkerStatus::Ready).await.unwrap();
        agent.start_listen_heartbeat("w1").await.unwrap();

        let marked = agent.examine_all_workers(10.0).await.unwrap();
        assert!(marked.is_empty());
        assert_eq!(
            agent.get_status(WorkerSelector::Worker("w1")).await.unwrap(),
            Some(WorkerStatus::Ready)
        );
    }

    #[tokio::test]
    async fn test_delete_removes_every_key() {
        let (agent, store) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();
        agent.start_listen_heartbeat("w1").await.unwrap();

        let removed = agent.delete_analyzer_and_worker("a1", "w1").await.unwrap();
        assert_eq!(removed, 5); // binding + status + hbeat + pipelines + analyzerId
        assert!(store.scan_keys("tripwire:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_bindings_listed() {
        let (agent, _) = agent();
        agent.create_analyzer("a1", "w1").await.unwrap();
        agent.create_analyzer("a2", "w2").await.unwrap();

        let mut bindings = agent.get_all_analyzer_and_worker_ids().await.unwrap();
        bindings.sort();
        assert_eq!(
            bindings,
            vec![("a1".to_string(), "w1".to_string()), ("a2".to_string(), "w2".to_string())]
        );
    }
}

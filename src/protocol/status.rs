// Worker lifecycle status, as seen by the brain and by the worker itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a worker record.
///
/// Transitions are monotone along
/// `create → initial → hshake_1 → ready ⇄ config → running`,
/// and any state may fall to `down`. The handlers guard every transition;
/// a message that arrives in the wrong state is logged and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Worker requested from the resource manager, nothing exists yet.
    #[serde(rename = "create")]
    Create,
    /// Worker record created, waiting for the worker's `hshake-1`.
    #[serde(rename = "initial")]
    Initial,
    /// Handshake step 1 received, `hshake-2` sent.
    #[serde(rename = "hshake_1")]
    Hshake1,
    /// Configuration dispatched, waiting for `config_ok`.
    #[serde(rename = "config")]
    Config,
    /// Handshake complete, no pipeline assigned.
    #[serde(rename = "ready")]
    Ready,
    /// Pipeline running.
    #[serde(rename = "running")]
    Running,
    /// Liveness sweep gave up on the worker. Terminal.
    #[serde(rename = "down")]
    Down,
}

impl WorkerStatus {
    /// The wire string stored under `{typename}:worker:{id}:status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Create => "create",
            WorkerStatus::Initial => "initial",
            WorkerStatus::Hshake1 => "hshake_1",
            WorkerStatus::Config => "config",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Running => "running",
            WorkerStatus::Down => "down",
        }
    }

    /// States the liveness sweep watches. Workers in any other state are
    /// either still handshaking or already lost.
    pub fn is_monitored(&self) -> bool {
        matches!(self, WorkerStatus::Ready | WorkerStatus::Running)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(WorkerStatus::Create),
            "initial" => Ok(WorkerStatus::Initial),
            "hshake_1" => Ok(WorkerStatus::Hshake1),
            "config" => Ok(WorkerStatus::Config),
            "ready" => Ok(WorkerStatus::Ready),
            "running" => Ok(WorkerStatus::Running),
            "down" => Ok(WorkerStatus::Down),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string in the store that no known worker state maps to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown worker status: {0:?}")]
pub struct UnknownStatus(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_wire_string() {
        for status in [
            WorkerStatus::Create,
            WorkerStatus::Initial,
            WorkerStatus::Hshake1,
            WorkerStatus::Config,
            WorkerStatus::Ready,
            WorkerStatus::Running,
            WorkerStatus::Down,
        ] {
            assert_eq!(status.as_str().parse::<WorkerStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_serde_uses_wire_strings() {
        assert_eq!(serde_json::to_string(&WorkerStatus::Hshake1).unwrap(), "\"hshake_1\"");
        let parsed: WorkerStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, WorkerStatus::Running);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!("booting".parse::<WorkerStatus>().is_err());
    }

    #[test]
    fn test_only_ready_and_running_are_monitored() {
        assert!(WorkerStatus::Ready.is_monitored());
        assert!(WorkerStatus::Running.is_monitored());
        assert!(!WorkerStatus::Initial.is_monitored());
        assert!(!WorkerStatus::Config.is_monitored());
        assert!(!WorkerStatus::Down.is_monitored());
    }
}

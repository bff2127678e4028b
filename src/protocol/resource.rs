// Resource manager messages.
//
// The brain asks for workers to be materialized or torn down; the resource
// manager answers on `ch_res_brain`, echoing the command and analyzer id.

use serde::{Deserialize, Serialize};

/// Brain → resource manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum ResourceRequest {
    #[serde(rename = "CREATE_WORKER")]
    CreateWorker {
        #[serde(rename = "ticketId")]
        ticket_id: String,
        #[serde(rename = "analyzerId")]
        analyzer_id: String,
        params: CreateWorkerParams,
    },
    #[serde(rename = "REMOVE_WORKER")]
    RemoveWorker {
        #[serde(rename = "analyzerId")]
        analyzer_id: String,
        params: RemoveWorkerParams,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateWorkerParams {
    /// Process image the resource manager launches, e.g.
    /// `jagereye/worker_tripwire`.
    #[serde(rename = "workerName")]
    pub worker_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveWorkerParams {
    #[serde(rename = "workerId")]
    pub worker_id: String,
}

/// Raw resource manager → brain response. Error responses may omit every
/// field except `error`, so everything else is optional here; `classify`
/// turns the raw shape into the closed outcome set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(rename = "analyzerId", default)]
    pub analyzer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResourcePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResourceError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePayload {
    #[serde(rename = "workerId", default)]
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceError {
    pub code: String,
}

/// A classified resource manager response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOutcome {
    /// Worker materialized; bind it to the analyzer.
    CreateOk { analyzer_id: String, worker_id: String },
    /// Worker torn down; release the analyzer's records and ticket.
    RemoveOk { analyzer_id: String },
    /// The resource manager failed; log the code, touch nothing.
    Error { code: String },
    /// Shape didn't match any known response.
    Unrecognized,
}

impl ResourceResponse {
    pub fn classify(self) -> ResourceOutcome {
        if let Some(error) = self.error {
            return ResourceOutcome::Error { code: error.code };
        }
        let analyzer_id = match self.analyzer_id {
            Some(id) => id,
            None => return ResourceOutcome::Unrecognized,
        };
        match self.command.as_deref() {
            Some("CREATE_WORKER") => match self.response.and_then(|r| r.worker_id) {
                Some(worker_id) => ResourceOutcome::CreateOk { analyzer_id, worker_id },
                None => ResourceOutcome::Unrecognized,
            },
            Some("REMOVE_WORKER") => ResourceOutcome::RemoveOk { analyzer_id },
            _ => ResourceOutcome::Unrecognized,
        }
    }
}

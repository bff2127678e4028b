// API request/reply shapes.
//
// Requests arrive as `{command, params}` and replies leave as
// `{result: {…}}` or `{error: {code}}`. The command tag selects the variant;
// anything else fails to parse and is dropped by the contract layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::WorkerStatus;

/// An inbound API request, dispatched by its `command` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "params")]
pub enum ApiRequest {
    #[serde(rename = "START_ANALYZER")]
    Start(StartParams),
    #[serde(rename = "STOP_ANALYZER")]
    Stop(AnalyzerRef),
    #[serde(rename = "REQ_ANALYZER_STATUS")]
    Status(AnalyzerRef),
}

impl ApiRequest {
    /// The analyzer the request operates on.
    pub fn analyzer_id(&self) -> &str {
        match self {
            ApiRequest::Start(p) => &p.id,
            ApiRequest::Stop(r) | ApiRequest::Status(r) => &r.id,
        }
    }
}

/// Parameters of `START_ANALYZER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartParams {
    pub id: String,
    /// Selects which brain instance handles the analyzer.
    #[serde(rename = "type")]
    pub analyzer_type: String,
    pub source: SourceSpec,
    pub pipelines: Vec<PipelineSpec>,
}

/// Parameters of `STOP_ANALYZER` and `REQ_ANALYZER_STATUS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerRef {
    pub id: String,
}

/// The video source. Opaque to the control plane beyond the url; extra
/// fields ride along untouched for the pipeline's benefit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One enabled pipeline with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Reply codes, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyCode {
    #[serde(rename = "REPLY_ANALYZER_STATUS")]
    ReplyAnalyzerStatus,
    #[serde(rename = "NOT_AVAILABLE")]
    NotAvailable,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "NO_OP")]
    NoOp,
}

/// An outbound API reply. Serializes externally tagged, which is exactly
/// the `{"result": …}` / `{"error": …}` envelope the gateway expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiReply {
    #[serde(rename = "result")]
    Result(StatusReply),
    #[serde(rename = "error")]
    Error(ErrorReply),
}

/// Body of a successful status reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub code: ReplyCode,
    #[serde(rename = "type")]
    pub analyzer_type: String,
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<Vec<PipelineSpec>>,
}

/// Body of an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: ReplyCode,
}

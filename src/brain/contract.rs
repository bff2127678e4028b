// API contract — validates inbound requests, builds typed replies.

use crate::protocol::{ApiReply, ApiRequest, ErrorReply, PipelineSpec, ReplyCode, StatusReply, WorkerStatus};

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// Shape is fine but `params.type` names another brain. Not an error
    /// worth logging; the message simply isn't for us.
    #[error("request addressed to another analyzer type")]
    NotForUs,
    #[error("malformed api request: {0}")]
    Malformed(String),
}

pub struct ApiContract {
    typename: String,
}

impl ApiContract {
    pub fn new(typename: &str) -> Self {
        Self { typename: typename.to_string() }
    }

    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Deserialize and validate one inbound payload.
    pub fn parse(&self, payload: &[u8]) -> Result<ApiRequest, ContractError> {
        let request: ApiRequest =
            serde_json::from_slice(payload).map_err(|e| ContractError::Malformed(e.to_string()))?;
        self.validate(&request)?;
        Ok(request)
    }

    pub fn validate(&self, request: &ApiRequest) -> Result<(), ContractError> {
        match request {
            ApiRequest::Start(params) => {
                if params.analyzer_type != self.typename {
                    return Err(ContractError::NotForUs);
                }
                if params.id.is_empty() {
                    return Err(ContractError::Malformed("params.id is empty".to_string()));
                }
                if params.source.url.is_empty() {
                    return Err(ContractError::Malformed("params.source.url is empty".to_string()));
                }
                if params.pipelines.is_empty() {
                    return Err(ContractError::Malformed("params.pipelines is empty".to_string()));
                }
            }
            ApiRequest::Stop(r) | ApiRequest::Status(r) => {
                if r.id.is_empty() {
                    return Err(ContractError::Malformed("params.id is empty".to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn reply_status(&self, status: WorkerStatus, pipelines: Option<Vec<PipelineSpec>>) -> ApiReply {
        ApiReply::Result(StatusReply {
            code: ReplyCode::ReplyAnalyzerStatus,
            analyzer_type: self.typename.clone(),
            status,
            pipelines,
        })
    }

    pub fn reply_not_available(&self) -> ApiReply {
        ApiReply::Error(ErrorReply { code: ReplyCode::NotAvailable })
    }

    pub fn reply_not_found(&self) -> ApiReply {
        ApiReply::Error(ErrorReply { code: ReplyCode::NotFound })
    }

    pub fn reply_no_op(&self) -> ApiReply {
        ApiReply::Error(ErrorReply { code: ReplyCode::NoOp })
    }
}

// Wire protocol — every message shape that crosses the bus.
//
// All inbound traffic is deserialized into closed sum types; an unknown
// command or verb fails deserialization and is dropped at the boundary.

pub mod api;
pub mod messages;
pub mod resource;
pub mod status;
pub mod subjects;

pub use api::{AnalyzerRef, ApiReply, ApiRequest, ErrorReply, PipelineSpec, ReplyCode, SourceSpec, StartParams, StatusReply};
pub use messages::{
    BrainToWorker, HandshakeContext, HeartbeatContext, TicketAssignment, TicketContent, WorkerEvent, WorkerRef,
    WorkerToBrain,
};
pub use resource::{
    CreateWorkerParams, RemoveWorkerParams, ResourceError, ResourceOutcome, ResourcePayload, ResourceRequest,
    ResourceResponse,
};
pub use status::WorkerStatus;

/// Wall-clock seconds since the Unix epoch, fractional.
///
/// Heartbeats and event timestamps use this representation everywhere.
pub fn unix_now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_fractional_seconds() {
        let now = unix_now_secs();
        // Sometime after 2020, sometime before 2100.
        assert!(now > 1_577_836_800.0);
        assert!(now < 4_102_444_800.0);
    }
}

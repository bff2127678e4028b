// Worker ↔ brain messages and the event shape.
//
// Internal traffic shares the `{verb, context}` envelope. The verb tag
// selects the variant; the handshake verbs all carry the same context and
// echo it back and forth so either side can rebuild the private subjects.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::api::ApiRequest;

/// Worker → brain, on the public subject (`hshake-1`) or the worker's
/// private subject (everything else).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", content = "context")]
pub enum WorkerToBrain {
    #[serde(rename = "hshake-1")]
    Hshake1(HandshakeContext),
    #[serde(rename = "hshake-3")]
    Hshake3(HandshakeContext),
    #[serde(rename = "config_ok")]
    ConfigOk(HandshakeContext),
    #[serde(rename = "event")]
    Event(WorkerRef),
    #[serde(rename = "hbeat")]
    Heartbeat(HeartbeatContext),
}

/// Brain → worker, on the worker's private subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", content = "context")]
pub enum BrainToWorker {
    #[serde(rename = "hshake-2")]
    Hshake2(HandshakeContext),
    #[serde(rename = "config")]
    Config(HandshakeContext),
}

/// Context echoed through the handshake. The brain injects the pending
/// ticket before dispatching `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeContext {
    #[serde(rename = "workerID")]
    pub worker_id: String,
    pub ch_to_brain: String,
    pub ch_to_worker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketAssignment>,
}

impl HandshakeContext {
    pub fn new(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            ch_to_brain: super::subjects::worker_to_brain(worker_id),
            ch_to_worker: super::subjects::brain_to_worker(worker_id),
            ticket: None,
        }
    }
}

/// A ticket riding inside a `config` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAssignment {
    pub ticket_id: String,
    #[serde(flatten)]
    pub content: TicketContent,
}

/// What the brain stores under `ticket:{analyzer_id}` while a write
/// operation is in flight: the originating request, where to reply, and
/// when the ticket was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketContent {
    pub msg: ApiRequest,
    pub reply: String,
    pub timestamp: f64,
}

/// Bare worker reference, the context of `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRef {
    #[serde(rename = "workerID")]
    pub worker_id: String,
}

/// Context of `hbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatContext {
    #[serde(rename = "workerID")]
    pub worker_id: String,
    pub timestamp: f64,
}

/// An event produced by a pipeline, queued per worker in the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub app_name: String,
    #[serde(deserialize_with = "timestamp_seconds")]
    pub timestamp: f64,
    pub content: Value,
}

impl WorkerEvent {
    /// Schema check applied before persisting. Failures drop the event,
    /// nothing else.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.is_empty() {
            return Err("event type is empty".to_string());
        }
        if self.app_name.is_empty() {
            return Err("event app_name is empty".to_string());
        }
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(format!("event timestamp {} is not a valid epoch time", self.timestamp));
        }
        if !self.content.is_object() {
            return Err("event content is not an object".to_string());
        }
        Ok(())
    }
}

/// Pipelines report timestamps as whatever their clock hands them; accept a
/// float, an integer, or a numeric string, and normalize to f64 seconds.
fn timestamp_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().ok_or_else(|| D::Error::custom("timestamp out of f64 range")),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("timestamp string {s:?} is not numeric"))),
        other => Err(D::Error::custom(format!("timestamp has wrong type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verb_envelope_round_trip() {
        let msg = WorkerToBrain::Hshake1(HandshakeContext::new("w1"));
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "verb": "hshake-1",
                "context": {"workerID": "w1", "ch_to_brain": "ch_w1_brain", "ch_to_worker": "ch_brain_w1"}
            })
        );
        let back: WorkerToBrain = serde_json::from_value(wire).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_verb_is_rejected() {
        let raw = json!({"verb": "hshake-9", "context": {"workerID": "w1"}});
        assert!(serde_json::from_value::<WorkerToBrain>(raw).is_err());
    }

    #[test]
    fn test_ticket_assignment_flattens_into_context() {
        let ctx = HandshakeContext {
            ticket: Some(TicketAssignment {
                ticket_id: "a1".into(),
                content: TicketContent {
                    msg: ApiRequest::Stop(crate::protocol::AnalyzerRef { id: "a1".into() }),
                    reply: "inbox".into(),
                    timestamp: 1.5,
                },
            }),
            ..HandshakeContext::new("w1")
        };
        let wire = serde_json::to_value(&ctx).unwrap();
        assert_eq!(wire["ticket"]["ticket_id"], "a1");
        assert_eq!(wire["ticket"]["reply"], "inbox");
        assert_eq!(wire["ticket"]["msg"]["command"], "STOP_ANALYZER");
        let back: HandshakeContext = serde_json::from_value(wire).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_event_round_trips_up_to_timestamp_type() {
        let original = json!({
            "type": "intrusion",
            "app_name": "tripwire",
            "timestamp": "1700000000.25",
            "content": {"zone": "gate"}
        });
        let event: WorkerEvent = serde_json::from_value(original).unwrap();
        assert_eq!(event.timestamp, 1_700_000_000.25);

        let wire = serde_json::to_value(&event).unwrap();
        let back: WorkerEvent = serde_json::from_value(wire).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_validation_rejects_bad_fields() {
        let good = WorkerEvent {
            kind: "intrusion".into(),
            app_name: "tripwire".into(),
            timestamp: 1.0,
            content: json!({}),
        };
        assert!(good.validate().is_ok());

        let mut bad = good.clone();
        bad.kind = String::new();
        assert!(bad.validate().is_err());

        let mut bad = good.clone();
        bad.timestamp = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.content = json!("not an object");
        assert!(bad.validate().is_err());
    }
}

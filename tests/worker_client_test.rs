// Worker protocol client, driven by a scripted brain side.
//
// Strategy
// --------
// The test subscribes the brain-side subjects (`ch_brain`, `ch_w1_brain`)
// and plays the brain by hand. The worker processes brain messages
// sequentially, so ordering assertions ride on the protocol itself: if the
// worker answers a later message, the earlier one was already handled.

use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus::bus::{MemoryBus, MessageBus, MessageStream};
use argus::config::WorkerConfig;
use argus::store::{KeyValueStore, MemoryStore};
use argus::worker::{EventSender, Pipeline, PipelineParams, StopSignal, Worker};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records lifecycle observations the test can assert on.
struct TrackingPipeline {
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    emit_on_start: bool,
}

impl Pipeline for TrackingPipeline {
    fn run(
        &mut self,
        params: PipelineParams,
        _files_dir: &Path,
        events: EventSender,
        stop: &StopSignal,
    ) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        if self.emit_on_start {
            events.send("boot", 1_700_000_000.0, json!({"pipelines": params.pipelines.len()}));
        }
        while !stop.is_stopped() {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn worker_config(shared_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        name: "tripwire".to_string(),
        worker_id: "w1".to_string(),
        shared_dir: shared_dir.to_string_lossy().into_owned(),
        ..WorkerConfig::default()
    }
}

async fn recv_json(stream: &mut MessageStream) -> Value {
    let msg = tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("timed out waiting for a message")
        .expect("subscription closed");
    serde_json::from_slice(&msg.payload).expect("message payload is not JSON")
}

/// Receive messages until one carries the wanted verb, skipping heartbeats
/// and other interleaved traffic.
async fn recv_verb(stream: &mut MessageStream, verb: &str) -> Value {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        assert!(tokio::time::Instant::now() < deadline, "never saw verb {verb}");
        let msg = recv_json(stream).await;
        if msg["verb"] == verb {
            return msg;
        }
    }
}

fn handshake_context() -> Value {
    json!({"workerID": "w1", "ch_to_brain": "ch_w1_brain", "ch_to_worker": "ch_brain_w1"})
}

fn config_message(ticket_context: Value) -> Bytes {
    Bytes::from(serde_json::to_vec(&json!({"verb": "config", "context": ticket_context})).unwrap())
}

fn start_ticket_context() -> Value {
    let mut context = handshake_context();
    context["ticket"] = json!({
        "ticket_id": "a1",
        "msg": {
            "command": "START_ANALYZER",
            "params": {
                "id": "a1",
                "type": "tripwire",
                "source": {"url": "rtsp://cam/1"},
                "pipelines": [{"name": "motion"}, {"name": "recording"}]
            }
        },
        "reply": "inbox",
        "timestamp": 1.0
    });
    context
}

// ---------------------------------------------------------------------------
// Handshake and heartbeats (paused clock: heartbeat ticks fire instantly)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_handshake_then_heartbeats() {
    let bus = Arc::new(MemoryBus::new());
    let store = Arc::new(MemoryStore::new());
    let shared = tempfile::tempdir().unwrap();

    let mut public = bus.subscribe("ch_brain").await.unwrap();
    let mut to_brain = bus.subscribe("ch_w1_brain").await.unwrap();

    let mut worker = Worker::new(
        &worker_config(shared.path()),
        bus.clone() as Arc<dyn MessageBus>,
        store.clone() as Arc<dyn KeyValueStore>,
    );
    worker.register_pipeline(Box::new(TrackingPipeline {
        started: Arc::new(AtomicBool::new(false)),
        stopped: Arc::new(AtomicBool::new(false)),
        emit_on_start: false,
    }));
    let cancel = worker.cancellation_token();
    tokio::spawn(worker.run());

    // Step 1: worker announces itself with its private subjects.
    let hshake1 = recv_json(&mut public).await;
    assert_eq!(hshake1["verb"], "hshake-1");
    assert_eq!(hshake1["context"], handshake_context());

    // A config this early is a protocol violation; the worker must ignore
    // it. Sequential processing means the hshake-3 below proves it did.
    bus.publish("ch_brain_w1", config_message(start_ticket_context())).await.unwrap();

    // Step 2 → step 3.
    bus.publish(
        "ch_brain_w1",
        Bytes::from(serde_json::to_vec(&json!({"verb": "hshake-2", "context": handshake_context()})).unwrap()),
    )
    .await
    .unwrap();
    let hshake3 = recv_verb(&mut to_brain, "hshake-3").await;
    assert_eq!(hshake3["context"]["workerID"], "w1");

    // Heartbeats start after the handshake, on the private subject.
    let first = recv_verb(&mut to_brain, "hbeat").await;
    assert_eq!(first["context"]["workerID"], "w1");
    assert!(first["context"]["timestamp"].as_f64().unwrap() > 0.0);
    recv_verb(&mut to_brain, "hbeat").await;

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Config starts the pipeline and events flow out (real clock: the pipeline
// runs on a real thread)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_config_starts_pipeline_and_forwards_events() {
    let bus = Arc::new(MemoryBus::new());
    let store = Arc::new(MemoryStore::new());
    let shared = tempfile::tempdir().unwrap();

    let mut public = bus.subscribe("ch_brain").await.unwrap();
    let mut to_brain = bus.subscribe("ch_w1_brain").await.unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let mut worker = Worker::new(
        &worker_config(shared.path()),
        bus.clone() as Arc<dyn MessageBus>,
        store.clone() as Arc<dyn KeyValueStore>,
    );
    worker.register_pipeline(Box::new(TrackingPipeline {
        started: started.clone(),
        stopped: stopped.clone(),
        emit_on_start: true,
    }));
    let cancel = worker.cancellation_token();
    let run = tokio::spawn(worker.run());

    recv_json(&mut public).await; // hshake-1
    bus.publish(
        "ch_brain_w1",
        Bytes::from(serde_json::to_vec(&json!({"verb": "hshake-2", "context": handshake_context()})).unwrap()),
    )
    .await
    .unwrap();
    recv_verb(&mut to_brain, "hshake-3").await;

    // Config with the embedded start ticket.
    bus.publish("ch_brain_w1", config_message(start_ticket_context())).await.unwrap();

    let config_ok = recv_verb(&mut to_brain, "config_ok").await;
    // Context echoed back, ticket included.
    assert_eq!(config_ok["context"]["ticket"]["ticket_id"], "a1");

    // The pipeline came up and its boot event reached the queue, then the
    // drain notification.
    recv_verb(&mut to_brain, "event").await;
    assert!(started.load(Ordering::SeqCst));
    let queued = store.list_range("event:brain:w1", 0, -1).await.unwrap();
    assert_eq!(queued.len(), 1);
    let event: Value = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(event["type"], "boot");
    assert_eq!(event["app_name"], "tripwire");
    assert_eq!(event["content"]["pipelines"], 2);

    // Files dir was created per the {shared}/{name}/{worker_id} layout.
    assert!(shared.path().join("tripwire").join("w1").is_dir());

    // A second config is ignored: the worker is already running. Prove the
    // worker is still alive and processing by shutting it down cleanly.
    bus.publish("ch_brain_w1", config_message(start_ticket_context())).await.unwrap();

    cancel.cancel();
    tokio::time::timeout(WAIT, run).await.expect("worker never shut down").unwrap().unwrap();
    assert!(stopped.load(Ordering::SeqCst), "shutdown must stop the pipeline");
}

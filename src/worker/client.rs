// Worker protocol client.
//
// Lifecycle: subscribe the private brain→worker subject, announce with
// `hshake-1` on the public subject, then follow the brain's lead. Local
// status guards mirror the brain's: a verb that arrives in the wrong state
// is logged and ignored, never acted on.

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{publish_json, BusMessage, MessageBus};
use crate::config::WorkerConfig;
use crate::protocol::subjects::{event_queue_key, CH_PUBLIC_BRAIN};
use crate::protocol::{
    unix_now_secs, ApiRequest, BrainToWorker, HandshakeContext, HeartbeatContext, WorkerEvent, WorkerRef,
    WorkerStatus, WorkerToBrain,
};
use crate::store::KeyValueStore;

use super::pipeline::{spawn_pipeline, EventSender, Pipeline, PipelineHandle, PipelineParams};

pub struct Worker {
    name: String,
    worker_id: String,
    files_dir: PathBuf,
    heartbeat_interval: Duration,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn KeyValueStore>,
    status: WorkerStatus,
    pipeline: Option<Box<dyn Pipeline>>,
    ch_to_brain: String,
    ch_to_worker: String,
    cancel: CancellationToken,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    heartbeat: Option<JoinHandle<()>>,
    running_pipeline: Option<PipelineHandle>,
}

impl Worker {
    pub fn new(config: &WorkerConfig, bus: Arc<dyn MessageBus>, store: Arc<dyn KeyValueStore>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let context = HandshakeContext::new(&config.worker_id);
        Self {
            name: config.name.clone(),
            worker_id: config.worker_id.clone(),
            files_dir: config.files_dir(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval),
            bus,
            store,
            status: WorkerStatus::Initial,
            pipeline: None,
            ch_to_brain: context.ch_to_brain,
            ch_to_worker: context.ch_to_worker,
            cancel: CancellationToken::new(),
            event_tx,
            event_rx: Some(event_rx),
            heartbeat: None,
            running_pipeline: None,
        }
    }

    /// Register the pipeline to run when the brain sends config. Must be
    /// called before `run`; a config that finds no pipeline is refused.
    pub fn register_pipeline(&mut self, pipeline: Box<dyn Pipeline>) {
        self.pipeline = Some(pipeline);
    }

    /// Token that stops the protocol loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the protocol until cancelled.
    pub async fn run(mut self) -> anyhow::Result<()> {
        if self.status != WorkerStatus::Initial {
            warn!(status = %self.status, "worker started in unexpected status");
            return Ok(());
        }

        let mut brain_sub = self.bus.subscribe(&self.ch_to_worker).await?;
        let mut event_rx = self.event_rx.take().expect("worker started twice");
        let cancel = self.cancel.clone();

        publish_json(
            self.bus.as_ref(),
            CH_PUBLIC_BRAIN,
            &WorkerToBrain::Hshake1(HandshakeContext::new(&self.worker_id)),
        )
        .await;
        self.status = WorkerStatus::Hshake1;
        info!(worker_id = %self.worker_id, "handshake started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(msg) = brain_sub.next() => self.on_brain(msg).await,
                Some(event) = event_rx.recv() => self.forward_event(event).await,
            }
        }

        self.shutdown(&mut event_rx).await;
        Ok(())
    }

    async fn on_brain(&mut self, msg: BusMessage) {
        let message: BrainToWorker = match serde_json::from_slice(&msg.payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "dropping undecodable message from brain");
                return;
            }
        };

        match message {
            BrainToWorker::Hshake2(context) => self.on_hshake2(context).await,
            BrainToWorker::Config(context) => self.on_config(context).await,
        }
    }

    async fn on_hshake2(&mut self, context: HandshakeContext) {
        if self.status != WorkerStatus::Hshake1 {
            debug!(status = %self.status, "ignoring hshake-2 in unexpected status");
            return;
        }
        if context.worker_id != self.worker_id {
            debug!(worker_id = %context.worker_id, "ignoring hshake-2 for another worker");
            return;
        }

        publish_json(self.bus.as_ref(), &self.ch_to_brain, &WorkerToBrain::Hshake3(context)).await;
        self.status = WorkerStatus::Ready;
        self.start_heartbeat();
        info!(worker_id = %self.worker_id, "handshake finished, worker ready");
    }

    async fn on_config(&mut self, context: HandshakeContext) {
        if self.status != WorkerStatus::Ready {
            debug!(status = %self.status, "ignoring config in unexpected status");
            return;
        }
        if context.worker_id != self.worker_id {
            debug!(worker_id = %context.worker_id, "ignoring config for another worker");
            return;
        }
        let params = match &context.ticket {
            Some(ticket) => match &ticket.content.msg {
                ApiRequest::Start(start) => PipelineParams {
                    source: start.source.clone(),
                    pipelines: start.pipelines.clone(),
                },
                other => {
                    error!(request = ?other, "config ticket is not a start request");
                    return;
                }
            },
            None => {
                error!("config without an embedded ticket");
                return;
            }
        };
        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => {
                error!("config received but no pipeline is registered");
                return;
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.files_dir) {
            warn!(dir = %self.files_dir.display(), error = %e, "could not create files dir");
        }
        let events = EventSender::new(&self.name, self.event_tx.clone());
        match spawn_pipeline(pipeline, params, self.files_dir.clone(), events) {
            Ok(handle) => self.running_pipeline = Some(handle),
            Err(e) => {
                error!(error = %e, "failed to start pipeline thread");
                return;
            }
        }

        self.status = WorkerStatus::Running;
        publish_json(self.bus.as_ref(), &self.ch_to_brain, &WorkerToBrain::ConfigOk(context)).await;
        info!(worker_id = %self.worker_id, "pipeline started");
    }

    /// Periodic heartbeat publisher. Dies with the worker's token.
    fn start_heartbeat(&mut self) {
        let bus = self.bus.clone();
        let subject = self.ch_to_brain.clone();
        let worker_id = self.worker_id.clone();
        let interval = self.heartbeat_interval;
        let cancel = self.cancel.child_token();

        self.heartbeat = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let beat = WorkerToBrain::Heartbeat(HeartbeatContext {
                            worker_id: worker_id.clone(),
                            timestamp: unix_now_secs(),
                        });
                        publish_json(bus.as_ref(), &subject, &beat).await;
                    }
                }
            }
        }));
    }

    /// Append the event to the worker's store queue, then tell the brain to
    /// drain. Failures are logged and dropped; a queue append that failed
    /// must not produce a drain notification.
    async fn forward_event(&self, event: WorkerEvent) {
        let raw = match serde_json::to_string(&event) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "unserializable event");
                return;
            }
        };
        if let Err(e) = self.store.push_back(&event_queue_key(&self.worker_id), &raw).await {
            warn!(error = %e, "failed to queue event, dropping");
            return;
        }
        publish_json(
            self.bus.as_ref(),
            &self.ch_to_brain,
            &WorkerToBrain::Event(WorkerRef { worker_id: self.worker_id.clone() }),
        )
        .await;
    }

    /// Orderly teardown: heartbeat first, then the pipeline, then whatever
    /// events it emitted on the way out, then the bus.
    async fn shutdown(&mut self, event_rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) {
        info!(worker_id = %self.worker_id, "worker shutting down");

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }

        if let Some(mut handle) = self.running_pipeline.take() {
            let joined = tokio::task::spawn_blocking(move || handle.stop()).await;
            if joined.is_err() {
                error!("pipeline thread panicked during shutdown");
            }
        }

        while let Ok(event) = event_rx.try_recv() {
            self.forward_event(event).await;
        }

        if let Err(e) = self.bus.flush().await {
            debug!(error = %e, "bus flush failed during shutdown");
        }
    }
}

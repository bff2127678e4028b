// Pipeline runner contract.
//
// The control plane never interprets pipeline internals: anything that can
// run on a thread, emit events, and stop when asked can be plugged in.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::protocol::{PipelineSpec, SourceSpec, WorkerEvent};

/// What the brain's config message resolves to: the video source and the
/// enabled pipeline list from the originating start request.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub source: SourceSpec,
    pub pipelines: Vec<PipelineSpec>,
}

/// Cooperative stop flag shared between the protocol task and the pipeline
/// thread. Pipelines poll it between units of work.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Thread-safe event emitter handed to the pipeline. Events are forwarded
/// to the protocol task, which appends them to the worker's memory-store
/// queue and notifies the brain.
#[derive(Clone)]
pub struct EventSender {
    app_name: String,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl EventSender {
    pub(crate) fn new(app_name: &str, tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { app_name: app_name.to_string(), tx }
    }

    /// Queue one event. Callable from any thread; never blocks.
    pub fn send(&self, kind: &str, timestamp: f64, content: Value) {
        let event = WorkerEvent {
            kind: kind.to_string(),
            app_name: self.app_name.clone(),
            timestamp,
            content,
        };
        if self.tx.send(event).is_err() {
            // Protocol task is gone; the worker is shutting down.
            error!(kind, "event dropped, protocol task stopped");
        }
    }
}

/// A detection pipeline. `run` blocks on the pipeline thread until the work
/// is done or `stop` trips.
pub trait Pipeline: Send + Sync + 'static {
    fn run(
        &mut self,
        params: PipelineParams,
        files_dir: &Path,
        events: EventSender,
        stop: &StopSignal,
    ) -> anyhow::Result<()>;
}

/// Handle to a running pipeline thread.
pub struct PipelineHandle {
    stop: StopSignal,
    join: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Trip the stop flag and wait for the thread to exit. Blocking;
    /// callers on the runtime wrap this in `spawn_blocking`.
    pub fn stop(&mut self) {
        self.stop.trigger();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Start `pipeline` on its dedicated thread.
pub fn spawn_pipeline(
    mut pipeline: Box<dyn Pipeline>,
    params: PipelineParams,
    files_dir: PathBuf,
    events: EventSender,
) -> std::io::Result<PipelineHandle> {
    let stop = StopSignal::new();
    let stop_for_thread = stop.clone();
    let join = thread::Builder::new().name("pipeline".to_string()).spawn(move || {
        if let Err(e) = pipeline.run(params, &files_dir, events, &stop_for_thread) {
            error!(error = %e, "pipeline failed");
        }
    })?;
    Ok(PipelineHandle { stop, join: Some(join) })
}

/// Placeholder pipeline: processes nothing, sleeps until stopped. Lets a
/// worker binary join the control plane for wiring checks before a real
/// pipeline is registered.
#[derive(Debug, Default)]
pub struct IdlePipeline;

impl Pipeline for IdlePipeline {
    fn run(
        &mut self,
        _params: PipelineParams,
        _files_dir: &Path,
        _events: EventSender,
        stop: &StopSignal,
    ) -> anyhow::Result<()> {
        while !stop.is_stopped() {
            thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    }
}

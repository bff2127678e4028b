// Brain coordinator — the single-threaded event loop.
//
// One loop owns all state transitions. Three static subscriptions (API,
// public registration, resource manager) plus a private subject per worker;
// private subscriptions are forwarded into one internal channel so every
// message, whatever its origin, is processed sequentially on this loop.
// Sequential processing is what makes the status guards race-free.
//
// Handlers never propagate errors: a bad message is logged and the loop
// moves on. The liveness sweep is the only timeout mechanism.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{publish_json, BusMessage, MessageBus};
use crate::config::BrainConfig;
use crate::eventdb::EventStore;
use crate::protocol::subjects::{CH_API_BRAIN, CH_BRAIN_RES, CH_NOTIFICATION, CH_RES_BRAIN};
use crate::protocol::{
    unix_now_secs, ApiRequest, BrainToWorker, CreateWorkerParams, RemoveWorkerParams, ResourceOutcome,
    ResourceRequest, ResourceResponse, TicketAssignment, TicketContent, WorkerStatus, WorkerToBrain,
};
use crate::store::KeyValueStore;

use super::contract::{ApiContract, ContractError};
use super::event_agent::EventAgent;
use super::ticket::TicketAgent;
use super::worker_agent::{WorkerAgent, WorkerSelector};

pub struct Brain {
    contract: ApiContract,
    bus: Arc<dyn MessageBus>,
    tickets: TicketAgent,
    workers: WorkerAgent,
    events: EventAgent,
    ch_public: String,
    examine_interval: Duration,
    examine_threshold: f64,
    cancel: CancellationToken,
    private_tx: mpsc::UnboundedSender<BusMessage>,
    private_rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
}

impl Brain {
    pub fn new(
        config: &BrainConfig,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn KeyValueStore>,
        event_db: Arc<dyn EventStore>,
    ) -> Self {
        let (private_tx, private_rx) = mpsc::unbounded_channel();
        Self {
            contract: ApiContract::new(&config.typename),
            tickets: TicketAgent::new(store.clone()),
            workers: WorkerAgent::new(&config.typename, store.clone()),
            events: EventAgent::new(store, event_db),
            ch_public: config.ch_public.clone(),
            examine_interval: Duration::from_secs(config.examine_interval),
            examine_threshold: config.examine_threshold,
            cancel: CancellationToken::new(),
            private_tx,
            private_rx: Some(private_rx),
            bus,
        }
    }

    /// Token that stops the loop when cancelled. Clone it before `run`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe and process until cancelled. Only subscription setup can
    /// fail; once the loop is running it survives any single message.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut api_sub = self.bus.subscribe(CH_API_BRAIN).await?;
        let mut public_sub = self.bus.subscribe(&self.ch_public).await?;
        let mut res_sub = self.bus.subscribe(CH_RES_BRAIN).await?;
        let mut private_rx = self.private_rx.take().expect("brain started twice");
        let mut sweep = tokio::time::interval(self.examine_interval);

        info!(typename = self.contract.typename(), "brain started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(msg) = api_sub.next() => {
                    if let Err(e) = self.on_api(msg).await {
                        error!(error = %e, "api handler failed");
                    }
                }
                Some(msg) = public_sub.next() => {
                    if let Err(e) = self.on_public(msg).await {
                        error!(error = %e, "public handler failed");
                    }
                }
                Some(msg) = res_sub.next() => {
                    if let Err(e) = self.on_resource(msg).await {
                        error!(error = %e, "resource handler failed");
                    }
                }
                Some(msg) = private_rx.recv() => {
                    if let Err(e) = self.on_private(msg).await {
                        error!(error = %e, "private handler failed");
                    }
                }
                _ = sweep.tick() => self.on_sweep().await,
            }
        }

        info!(typename = self.contract.typename(), "brain stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // API handler
    // ------------------------------------------------------------------

    async fn on_api(&self, msg: BusMessage) -> anyhow::Result<()> {
        let request = match self.contract.parse(&msg.payload) {
            Ok(request) => request,
            // Addressed to a brain of another typename.
            Err(ContractError::NotForUs) => return Ok(()),
            Err(ContractError::Malformed(reason)) => {
                error!(%reason, "dropping malformed api request");
                return Ok(());
            }
        };
        let reply = match msg.reply {
            Some(reply) => reply,
            None => {
                error!(command = ?request, "api request without reply subject, dropping");
                return Ok(());
            }
        };

        match request {
            ApiRequest::Status(r) => self.on_api_status(&r.id, &reply).await,
            request @ ApiRequest::Start(_) => self.on_api_start(request, &reply).await,
            request @ ApiRequest::Stop(_) => self.on_api_stop(request, &reply).await,
        }
    }

    async fn on_api_status(&self, analyzer_id: &str, reply: &str) -> anyhow::Result<()> {
        let response = match self.workers.get_info(WorkerSelector::Analyzer(analyzer_id)).await? {
            Some((status, pipelines)) => self.contract.reply_status(status, Some(pipelines)),
            None => self.contract.reply_not_found(),
        };
        publish_json(self.bus.as_ref(), reply, &response).await;
        Ok(())
    }

    async fn on_api_start(&self, request: ApiRequest, reply: &str) -> anyhow::Result<()> {
        let analyzer_id = request.analyzer_id().to_string();
        let ticket = TicketContent {
            msg: request,
            reply: reply.to_string(),
            timestamp: unix_now_secs(),
        };
        if !self.tickets.set(&analyzer_id, &ticket).await? {
            // Another write operation on this analyzer is in flight.
            publish_json(self.bus.as_ref(), reply, &self.contract.reply_not_available()).await;
            return Ok(());
        }

        if self.workers.get_worker_id(&analyzer_id).await?.is_some() {
            // Hot reconfiguration has no contract yet; release the ticket so
            // future operations on this analyzer aren't blocked.
            debug!(%analyzer_id, "worker exists, reconfigure is a no-op");
            self.tickets.delete(&analyzer_id).await?;
            publish_json(self.bus.as_ref(), reply, &self.contract.reply_no_op()).await;
            return Ok(());
        }

        debug!(%analyzer_id, "requesting a worker");
        publish_json(
            self.bus.as_ref(),
            reply,
            &self.contract.reply_status(WorkerStatus::Create, None),
        )
        .await;

        let request = ResourceRequest::CreateWorker {
            ticket_id: analyzer_id.clone(),
            analyzer_id: analyzer_id.clone(),
            params: CreateWorkerParams {
                worker_name: format!("jagereye/worker_{}", self.contract.typename()),
            },
        };
        publish_json(self.bus.as_ref(), CH_BRAIN_RES, &request).await;
        Ok(())
    }

    async fn on_api_stop(&self, request: ApiRequest, reply: &str) -> anyhow::Result<()> {
        let analyzer_id = request.analyzer_id().to_string();
        let ticket = TicketContent {
            msg: request,
            reply: reply.to_string(),
            timestamp: unix_now_secs(),
        };
        if !self.tickets.set(&analyzer_id, &ticket).await? {
            publish_json(self.bus.as_ref(), reply, &self.contract.reply_not_available()).await;
            return Ok(());
        }

        let worker_id = match self.workers.get_worker_id(&analyzer_id).await? {
            Some(worker_id) => worker_id,
            None => {
                // Nothing to stop; release the ticket so the analyzer id
                // isn't locked forever.
                self.tickets.delete(&analyzer_id).await?;
                publish_json(self.bus.as_ref(), reply, &self.contract.reply_not_found()).await;
                return Ok(());
            }
        };

        let request = ResourceRequest::RemoveWorker {
            analyzer_id,
            params: RemoveWorkerParams { worker_id },
        };
        publish_json(self.bus.as_ref(), CH_BRAIN_RES, &request).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public worker handler (handshake step 1 → 2)
    // ------------------------------------------------------------------

    async fn on_public(&self, msg: BusMessage) -> anyhow::Result<()> {
        let message: WorkerToBrain = match serde_json::from_slice(&msg.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "dropping undecodable message on public subject");
                return Ok(());
            }
        };
        let context = match message {
            WorkerToBrain::Hshake1(context) => context,
            other => {
                debug!(message = ?other, "ignoring non-hshake-1 verb on public subject");
                return Ok(());
            }
        };

        let status = self.workers.get_status(WorkerSelector::Worker(&context.worker_id)).await?;
        if status != Some(WorkerStatus::Initial) {
            error!(
                worker_id = %context.worker_id,
                status = ?status,
                "hshake-1 with unexpected worker status"
            );
            return Ok(());
        }

        self.workers
            .update_status(WorkerSelector::Worker(&context.worker_id), WorkerStatus::Hshake1)
            .await?;

        // From here on the worker talks on its private subject; funnel it
        // into the loop's internal channel.
        let mut private_sub = self.bus.subscribe(&context.ch_to_brain).await?;
        let forward = self.private_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = private_sub.next().await {
                if forward.send(msg).is_err() {
                    break;
                }
            }
        });

        debug!(worker_id = %context.worker_id, "handshake step 1, replying hshake-2");
        let ch_to_worker = context.ch_to_worker.clone();
        publish_json(self.bus.as_ref(), &ch_to_worker, &BrainToWorker::Hshake2(context)).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Private worker handler
    // ------------------------------------------------------------------

    async fn on_private(&self, msg: BusMessage) -> anyhow::Result<()> {
        let message: WorkerToBrain = match serde_json::from_slice(&msg.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(subject = %msg.subject, error = %e, "dropping undecodable private message");
                return Ok(());
            }
        };

        match message {
            WorkerToBrain::Hshake3(context) => self.on_hshake3(context).await,
            WorkerToBrain::ConfigOk(context) => self.on_config_ok(context).await,
            WorkerToBrain::Event(r) => self.on_event(&r.worker_id).await,
            WorkerToBrain::Heartbeat(hb) => {
                if !self.workers.update_heartbeat(&hb.worker_id).await? {
                    debug!(worker_id = %hb.worker_id, "heartbeat for unknown worker");
                }
                Ok(())
            }
            WorkerToBrain::Hshake1(context) => {
                debug!(worker_id = %context.worker_id, "ignoring hshake-1 on private subject");
                Ok(())
            }
        }
    }

    async fn on_hshake3(&self, mut context: crate::protocol::HandshakeContext) -> anyhow::Result<()> {
        let worker_id = context.worker_id.clone();
        let status = self.workers.get_status(WorkerSelector::Worker(&worker_id)).await?;
        if status != Some(WorkerStatus::Hshake1) {
            error!(worker_id = %worker_id, status = ?status, "hshake-3 with unexpected worker status");
            return Ok(());
        }

        self.workers.update_status(WorkerSelector::Worker(&worker_id), WorkerStatus::Ready).await?;
        self.workers.start_listen_heartbeat(&worker_id).await?;
        debug!(worker_id = %worker_id, "handshake finished");

        let analyzer_id = match self.workers.get_analyzer_id(&worker_id).await? {
            Some(analyzer_id) => analyzer_id,
            None => {
                error!(worker_id = %worker_id, "worker has no analyzer binding");
                return Ok(());
            }
        };

        match self.tickets.get(&analyzer_id).await? {
            Some(content) => {
                // Pending start: hand the worker its job.
                context.ticket = Some(TicketAssignment { ticket_id: analyzer_id.clone(), content });
                self.workers.update_status(WorkerSelector::Worker(&worker_id), WorkerStatus::Config).await?;
                let ch_to_worker = context.ch_to_worker.clone();
                publish_json(self.bus.as_ref(), &ch_to_worker, &BrainToWorker::Config(context)).await;
            }
            None => {
                debug!(%analyzer_id, "no ticket pending, worker stays ready");
            }
        }
        Ok(())
    }

    async fn on_config_ok(&self, context: crate::protocol::HandshakeContext) -> anyhow::Result<()> {
        let worker_id = context.worker_id.clone();
        let status = self.workers.get_status(WorkerSelector::Worker(&worker_id)).await?;
        if status != Some(WorkerStatus::Config) {
            error!(worker_id = %worker_id, status = ?status, "config_ok with unexpected worker status");
            return Ok(());
        }
        let ticket = match context.ticket {
            Some(ticket) => ticket,
            None => {
                error!(worker_id = %worker_id, "config_ok without an embedded ticket");
                return Ok(());
            }
        };
        let pipelines = match ticket.content.msg {
            ApiRequest::Start(params) => params.pipelines,
            other => {
                error!(worker_id = %worker_id, request = ?other, "config_ok ticket is not a start request");
                return Ok(());
            }
        };

        self.workers.update_status(WorkerSelector::Worker(&worker_id), WorkerStatus::Running).await?;
        self.workers.update_pipelines(&worker_id, &pipelines).await?;
        self.tickets.delete(&ticket.ticket_id).await?;
        info!(worker_id = %worker_id, "worker running");
        Ok(())
    }

    async fn on_event(&self, worker_id: &str) -> anyhow::Result<()> {
        let analyzer_id = match self.workers.get_analyzer_id(worker_id).await? {
            Some(analyzer_id) => analyzer_id,
            None => {
                error!(worker_id, "event from a worker with no analyzer binding");
                return Ok(());
            }
        };

        let events = self.events.consume_from_worker(worker_id).await?;
        if events.is_empty() {
            return Ok(());
        }
        debug!(worker_id, count = events.len(), "draining events");

        let persisted = self.events.save_events(&events, &analyzer_id).await?;
        if !persisted.is_empty() {
            publish_json(self.bus.as_ref(), CH_NOTIFICATION, &persisted).await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resource manager handler
    // ------------------------------------------------------------------

    async fn on_resource(&self, msg: BusMessage) -> anyhow::Result<()> {
        let response: ResourceResponse = match serde_json::from_slice(&msg.payload) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "dropping undecodable resource manager response");
                return Ok(());
            }
        };

        match response.classify() {
            ResourceOutcome::Error { code } => {
                error!(%code, "resource manager reported an error");
            }
            ResourceOutcome::CreateOk { analyzer_id, worker_id } => {
                info!(%analyzer_id, %worker_id, "worker materialized");
                self.workers.create_analyzer(&analyzer_id, &worker_id).await?;
                // Now wait for the worker's hshake-1 on the public subject.
            }
            ResourceOutcome::RemoveOk { analyzer_id } => {
                if let Some(worker_id) = self.workers.get_worker_id(&analyzer_id).await? {
                    self.workers.delete_analyzer_and_worker(&analyzer_id, &worker_id).await?;
                    info!(%analyzer_id, %worker_id, "worker removed");
                } else {
                    warn!(%analyzer_id, "remove confirmed for an unknown analyzer");
                }
                self.tickets.delete(&analyzer_id).await?;
            }
            ResourceOutcome::Unrecognized => {
                error!("unrecognized resource manager response");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Liveness sweep
    // ------------------------------------------------------------------

    async fn on_sweep(&self) {
        match self.workers.examine_all_workers(self.examine_threshold).await {
            Ok(marked) if !marked.is_empty() => {
                warn!(workers = ?marked, "liveness sweep marked workers down");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "liveness sweep failed"),
        }
    }
}

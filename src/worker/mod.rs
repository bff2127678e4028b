// Worker — the protocol client that runs on every worker process.
//
// Two cooperating tasks: the protocol task on the shared runtime (handshake,
// config, heartbeats, event forwarding) and the pipeline on a dedicated
// thread, free to block.

pub mod client;
pub mod pipeline;

pub use client::Worker;
pub use pipeline::{EventSender, IdlePipeline, Pipeline, PipelineHandle, PipelineParams, StopSignal};

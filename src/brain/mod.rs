// Brain — the coordination engine.
//
// The coordinator composes four agents over the injected bus/store/eventdb
// clients: tickets gate concurrent writes per analyzer, the worker agent
// owns the canonical analyzer/worker records, the event agent drains and
// persists worker events, and the contract validates API traffic.

pub mod contract;
pub mod coordinator;
pub mod event_agent;
pub mod ticket;
pub mod worker_agent;

pub use contract::{ApiContract, ContractError};
pub use coordinator::Brain;
pub use event_agent::EventAgent;
pub use ticket::TicketAgent;
pub use worker_agent::{WorkerAgent, WorkerSelector};

// Argus - Distributed video-analytics control plane
// Library exports

pub mod brain; // Coordinator, ticket/worker/event agents, API contract
pub mod bus; // Message bus seam (NATS, in-process)
pub mod config;
pub mod eventdb; // Persistent event store seam (MongoDB, in-memory)
pub mod protocol; // Wire shapes, worker status, subject names
pub mod store; // Memory store seam (Redis, in-memory)
pub mod worker; // Worker protocol client and pipeline contract

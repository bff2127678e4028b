// Configuration module
// Public interface for configuration loading

mod loader;
mod settings;

pub use loader::{load_brain_config, load_worker_config};
pub use settings::{BrainConfig, WorkerConfig};

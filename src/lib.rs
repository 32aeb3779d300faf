pub mod api;
pub mod artifacts;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod tasks;
pub mod types;

pub use api::{ApiResponse, FleetApi};
pub use artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FleetConfig, StoreBackend};
pub use db::FleetDb;
pub use error::{FleetError, Result};
pub use orchestrator::FleetServices;
pub use store::{FleetStore, MemoryStore};
pub use tasks::BackgroundTasks;
pub use types::*;

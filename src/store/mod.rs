mod memory;
mod ports;

pub use memory::MemoryStore;
pub use ports::{
    AgentDirectory, CatalogStore, FleetStore, PatchStore, PortFuture, RebootStore, ScheduleStore,
};

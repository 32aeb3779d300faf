#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fleetops::orchestrator::ScriptUpload;
use fleetops::store::{AgentDirectory, CatalogStore};
use fleetops::{
    Agent, AgentId, Clock, Container, ContainerId, ExceptionScope, FleetApi, FleetServices,
    Identity, ManualClock, MemoryArtifactStore, MemoryStore, PackageException, PlatformFamily, Script,
};
use std::sync::Arc;

pub const OWNER: &str = "user-1";
pub const OTHER_OWNER: &str = "user-2";

/// In-memory fleet with a hand-driven clock.
pub struct Fleet {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub services: FleetServices,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().unwrap()
}

impl Fleet {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let services = FleetServices::new(store.clone(), clock.clone(), artifacts.clone(), 300);
        services.scripts.seed_default_os_types().await.unwrap();
        Self {
            store,
            clock,
            artifacts,
            services,
        }
    }

    pub fn api(&self) -> FleetApi {
        FleetApi::new(self.services.clone())
    }

    pub fn user() -> Identity {
        Identity::user(OWNER)
    }

    pub fn agent_identity(agent_id: &str) -> Identity {
        Identity::agent(agent_id, OWNER)
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    pub async fn add_agent(&self, agent_id: &str, family: &str) -> Agent {
        self.add_agent_for(agent_id, OWNER, family).await
    }

    pub async fn add_agent_for(&self, agent_id: &str, owner: &str, family: &str) -> Agent {
        let agent = Agent::new(
            AgentId::new(agent_id),
            owner.into(),
            PlatformFamily::new(family),
        )
        .with_last_seen(self.clock.now());
        self.store.upsert_agent(agent.clone()).await.unwrap();
        agent
    }

    pub async fn add_container(&self, container_id: &str, agent_id: &str, vmid: u32, os_type: &str) {
        self.store
            .upsert_container(Container::new(
                ContainerId::new(container_id),
                AgentId::new(agent_id),
                vmid,
                os_type,
            ))
            .await
            .unwrap();
    }

    pub async fn register_script(&self, family: &str, os_version: Option<&str>) -> Script {
        self.services
            .scripts
            .register(ScriptUpload {
                name: format!("{family} patch"),
                platform_family: PlatformFamily::new(family),
                os_version: os_version.map(str::to_string),
                file_name: format!("{family}.sh"),
                body: format!("#!/bin/sh\n# patch {family}\n").into_bytes(),
            })
            .await
            .unwrap()
    }

    pub async fn exclude_for_agent(&self, agent_id: &str, package: &str) {
        let exception =
            PackageException::new(ExceptionScope::Agent(AgentId::new(agent_id)), package).unwrap();
        self.store.insert_exception(exception).await.unwrap();
    }

    pub async fn exclude_for_container(&self, container_id: &str, package: &str) {
        let exception = PackageException::new(
            ExceptionScope::Container(ContainerId::new(container_id)),
            package,
        )
        .unwrap();
        self.store.insert_exception(exception).await.unwrap();
    }

    pub async fn heartbeat(&self, agent_id: &str) {
        self.store
            .record_heartbeat(&AgentId::new(agent_id), self.clock.now())
            .await
            .unwrap();
    }

    pub async fn agent(&self, agent_id: &str) -> Agent {
        self.store
            .get_agent(&AgentId::new(agent_id))
            .await
            .unwrap()
            .expect("agent exists")
    }
}

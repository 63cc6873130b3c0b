//! State shared by the orchestration components

use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::jobs::JobRegistry;
use crate::protocol::RemoteApi;
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything a component needs; owned once, handed around as `Arc<Shared>`
pub(crate) struct Shared {
    pub config: OrchestratorConfig,
    pub api: Arc<dyn RemoteApi>,
    pub registry: JobRegistry,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

impl Shared {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

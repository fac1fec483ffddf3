//! The long-lived bridge context shared by every task.

use std::sync::Arc;

use crate::application::Dispatcher;
use crate::domain::{BridgeConfig, HealthReport};
use crate::infrastructure::device_gateway::DeviceGateway;
use crate::infrastructure::session_hub::SessionHub;

/// Everything a session, route or background task needs.  Built once in
/// `main` and shared by `Arc`.
#[derive(Debug)]
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub gateway: DeviceGateway,
    pub hub: Arc<SessionHub>,
    pub dispatcher: Dispatcher<DeviceGateway>,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig, gateway: DeviceGateway) -> Arc<Self> {
        let dispatcher = Dispatcher::new(gateway.clone(), config.timeouts);
        Arc::new(Self {
            config,
            gateway,
            hub: Arc::new(SessionHub::new()),
            dispatcher,
        })
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport::new(self.gateway.is_link_open(), self.hub.len().await)
    }
}

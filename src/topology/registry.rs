use std::sync::Arc;

use crate::config::EnvironmentConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::external::{AuthService, BrokerService, HttpAuthClient, HttpBrokerClient, HttpLedger, Ledger};

/// One service node: an Auth endpoint paired with a Broker endpoint.
#[derive(Clone)]
pub struct Node {
    pub index: usize,
    pub auth: Arc<dyn AuthService>,
    pub broker: Arc<dyn BrokerService>,
}

/// The static node set plus the coordinator Auth endpoint and the ledger
/// handle. Built once and shared read-only by every workflow run.
#[derive(Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    coordinator: Arc<dyn AuthService>,
    ledger: Arc<dyn Ledger>,
}

impl Topology {
    pub fn new(
        services: Vec<(Arc<dyn AuthService>, Arc<dyn BrokerService>)>,
        coordinator: Arc<dyn AuthService>,
        ledger: Arc<dyn Ledger>,
    ) -> HarnessResult<Self> {
        if services.is_empty() {
            return Err(HarnessError::Config("topology needs at least one node".into()));
        }
        let nodes = services
            .into_iter()
            .enumerate()
            .map(|(index, (auth, broker))| Node { index, auth, broker })
            .collect();
        Ok(Self {
            nodes,
            coordinator,
            ledger,
        })
    }

    /// HTTP clients for every configured endpoint.
    pub fn connect(env: &EnvironmentConfig) -> HarnessResult<Self> {
        let timeout = env.request_timeout;
        let mut services: Vec<(Arc<dyn AuthService>, Arc<dyn BrokerService>)> = Vec::with_capacity(env.nodes.len());
        for endpoint in &env.nodes {
            let auth = HttpAuthClient::new(&endpoint.auth_url, timeout)?;
            let broker = HttpBrokerClient::new(&endpoint.broker_url, timeout)?;
            log::info!(
                "Node {}: auth {} broker {}",
                services.len(),
                auth.base_url(),
                broker.base_url()
            );
            services.push((Arc::new(auth), Arc::new(broker)));
        }
        let coordinator = Arc::new(HttpAuthClient::new(&env.coordinator_auth_url, timeout)?);
        let ledger = Arc::new(HttpLedger::new(&env.ledger_url, timeout)?);
        Self::new(services, coordinator, ledger)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn coordinator(&self) -> &dyn AuthService {
        self.coordinator.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }
}

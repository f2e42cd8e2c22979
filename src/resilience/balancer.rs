//! Server nodes and the load balancer fronting them.

use crate::client::Endpoint;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
};
use std::time::Instant;
use tracing::info;

/// Consecutive failures after which a node is marked unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

struct NodeState {
    healthy: bool,
    consecutive_failures: u32,
    last_check_at: Option<Instant>,
}

/// One configured server endpoint with its health record.
pub struct ServerNode {
    endpoint: Endpoint,
    state: Mutex<NodeState>,
}

impl ServerNode {
    /// Create a node, initially healthy.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: Mutex::new(NodeState {
                healthy: true,
                consecutive_failures: 0,
                last_check_at: None,
            }),
        }
    }

    /// The node's address.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the node is currently considered healthy.
    pub fn is_healthy(&self) -> bool {
        self.state.lock().expect("node lock poisoned").healthy
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .expect("node lock poisoned")
            .consecutive_failures
    }

    /// When the node was last probed.
    pub fn last_check_at(&self) -> Option<Instant> {
        self.state.lock().expect("node lock poisoned").last_check_at
    }

    /// Record a failed operation or probe.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("node lock poisoned");
        state.consecutive_failures += 1;
        state.last_check_at = Some(Instant::now());
        if state.healthy
            && state.consecutive_failures >= UNHEALTHY_AFTER_FAILURES
        {
            state.healthy = false;
            info!(endpoint = %self.endpoint, "node marked unhealthy");
        }
    }

    /// Record a successful operation or probe, resetting the count.
    pub fn mark_healthy(&self) {
        let mut state = self.state.lock().expect("node lock poisoned");
        if !state.healthy {
            info!(endpoint = %self.endpoint, "node marked healthy");
        }
        state.healthy = true;
        state.consecutive_failures = 0;
        state.last_check_at = Some(Instant::now());
    }
}

/// Node selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancingStrategy {
    /// Rotate through the healthy set.
    #[default]
    RoundRobin,
    /// Pick uniformly from the healthy set.
    Random,
    /// The first healthy node in configuration order.
    FirstAvailable,
}

/// Selects a healthy node per request.
pub struct LoadBalancer {
    nodes: Vec<Arc<ServerNode>>,
    strategy: LoadBalancingStrategy,
    counter: AtomicUsize,
}

impl LoadBalancer {
    /// Create a balancer over the given endpoints.
    pub fn new(
        endpoints: Vec<Endpoint>,
        strategy: LoadBalancingStrategy,
    ) -> Self {
        Self {
            nodes: endpoints
                .into_iter()
                .map(|endpoint| Arc::new(ServerNode::new(endpoint)))
                .collect(),
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    /// All configured nodes.
    pub fn nodes(&self) -> &[Arc<ServerNode>] {
        &self.nodes
    }

    /// Pick a healthy node, or `None` when every node is down.
    pub fn select(&self) -> Option<Arc<ServerNode>> {
        let healthy: Vec<&Arc<ServerNode>> =
            self.nodes.iter().filter(|node| node.is_healthy()).collect();
        if healthy.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            LoadBalancingStrategy::RoundRobin => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed);
                healthy[n % healthy.len()]
            }
            LoadBalancingStrategy::Random => {
                use rand::Rng;
                let i =
                    rand::thread_rng().gen_range(0..healthy.len());
                healthy[i]
            }
            LoadBalancingStrategy::FirstAvailable => healthy[0],
        };
        Some(chosen.clone())
    }
}

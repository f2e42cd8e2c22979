//! Background health checker: probes every node on a schedule with a
//! short-deadline `SELECT 1`.

use crate::client::{
    Client,
    ClientOptions,
};
use crate::resilience::balancer::ServerNode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Health checker tuning.
#[derive(Debug, Clone, Copy)]
pub struct HealthCheckerConfig {
    /// Time between check rounds.
    pub interval: Duration,
    /// Deadline for one probe (connect + `SELECT 1`).
    pub check_timeout: Duration,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            check_timeout: Duration::from_secs(5),
        }
    }
}

type CheckListener = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Owns the background probe task. Cancelled and awaited on shutdown.
pub struct HealthChecker {
    config: HealthCheckerConfig,
    listener: Option<CheckListener>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl HealthChecker {
    /// Create a checker; nothing runs until [`start`](Self::start).
    pub fn new(config: HealthCheckerConfig) -> Self {
        Self {
            config,
            listener: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Subscribe to per-check completions with `(address, healthy)`.
    pub fn on_check<F>(&mut self, listener: F)
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
    }

    /// Spawn the background task probing `nodes` with credentials from
    /// `template`.
    pub fn start(
        &mut self,
        nodes: Vec<Arc<ServerNode>>,
        template: ClientOptions,
    ) {
        let config = self.config;
        let listener = self.listener.clone();
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(config.interval) => {}
                }

                for node in &nodes {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let healthy =
                        probe(node, &template, config.check_timeout)
                            .await;
                    if healthy {
                        node.mark_healthy();
                    } else {
                        node.record_failure();
                    }
                    if let Some(listener) = &listener {
                        listener(
                            &node.endpoint().to_string(),
                            healthy,
                        );
                    }
                }
            }
        }));
    }

    /// Stop the background task and wait for it to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One probe: open a session under the deadline and run `SELECT 1`.
async fn probe(
    node: &ServerNode,
    template: &ClientOptions,
    deadline: Duration,
) -> bool {
    let options = ClientOptions {
        host: node.endpoint().host.clone(),
        port: node.endpoint().port,
        timeout: deadline,
        ..template.clone()
    };

    let result = async {
        let mut client = Client::connect(options).await?;
        client.query_scalar::<u64>("SELECT 1").await
    }
    .await;

    match result {
        Ok(1) => true,
        Ok(other) => {
            debug!(endpoint = %node.endpoint(), other, "odd probe result");
            false
        }
        Err(error) => {
            debug!(endpoint = %node.endpoint(), %error, "probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Endpoint;
    use std::sync::atomic::{
        AtomicU32,
        Ordering,
    };

    #[tokio::test]
    async fn test_unreachable_node_marked_unhealthy() {
        // A port with nothing listening
        let node = Arc::new(ServerNode::new(Endpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
        }));

        let mut checker = HealthChecker::new(HealthCheckerConfig {
            interval: Duration::from_millis(10),
            check_timeout: Duration::from_millis(100),
        });

        let checks = Arc::new(AtomicU32::new(0));
        let seen = checks.clone();
        checker.on_check(move |_, healthy| {
            assert!(!healthy);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        checker.start(
            vec![node.clone()],
            ClientOptions::default(),
        );

        // Enough rounds to cross the failure threshold
        for _ in 0..100 {
            if checks.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        checker.shutdown().await;

        assert!(checks.load(Ordering::SeqCst) >= 3);
        assert!(!node.is_healthy());
        assert!(node.last_check_at().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let mut checker = HealthChecker::new(HealthCheckerConfig {
            interval: Duration::from_secs(3600),
            check_timeout: Duration::from_millis(50),
        });
        checker.start(Vec::new(), ClientOptions::default());
        checker.shutdown().await;
        assert!(checker.task.is_none());
    }
}

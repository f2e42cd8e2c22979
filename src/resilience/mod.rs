//! The resilience layer: retry, circuit breaking, health checking, and
//! load balancing composed around a pool of endpoints.
//!
//! Layering is retry → circuit breaker → connection: the retry policy
//! re-selects a node per attempt, the per-node breaker fails fast while
//! an endpoint is bad, and an open circuit is terminal for the retry
//! policy so attempts do not hammer a tripped node.

/// Server nodes and selection strategies.
pub mod balancer;
/// Per-endpoint circuit breaker.
pub mod circuit_breaker;
/// Background health checker.
pub mod health;
/// Exponential-backoff retry.
pub mod retry;

pub use balancer::{
    LoadBalancer,
    LoadBalancingStrategy,
    ServerNode,
};
pub use circuit_breaker::{
    CircuitBreaker,
    CircuitBreakerConfig,
    CircuitState,
    StateChange,
};
pub use health::{
    HealthChecker,
    HealthCheckerConfig,
};
pub use retry::{
    is_transient,
    RetryPolicy,
};

use crate::client::{
    Client,
    ClientOptions,
    Endpoint,
    InsertOptions,
    QueryResult,
};
use crate::column::{
    FromValue,
    Value,
};
use crate::query::Query;
use crate::{
    Error,
    Result,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configuration for a [`ResilientClient`].
#[derive(Clone)]
pub struct ResilienceOptions {
    /// The server endpoints.
    pub servers: Vec<Endpoint>,
    /// How to pick among healthy endpoints.
    pub load_balancing: LoadBalancingStrategy,
    /// Retry policy around each logical operation.
    pub retry: RetryPolicy,
    /// Per-endpoint circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Background health checking; `None` disables it.
    pub health_check: Option<HealthCheckerConfig>,
    /// Session template: credentials, database, compression, timeout.
    pub client: ClientOptions,
}

impl ResilienceOptions {
    /// Options for a set of `host:port` strings with defaults everywhere
    /// else.
    pub fn new(servers: &[&str]) -> Result<Self> {
        let servers = servers
            .iter()
            .map(|s| Endpoint::parse(s, crate::client::DEFAULT_PORT))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            servers,
            load_balancing: LoadBalancingStrategy::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: Some(HealthCheckerConfig::default()),
            client: ClientOptions::default(),
        })
    }
}

type OpFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A client facade over multiple endpoints with retry, per-node circuit
/// breakers, and background health checks.
///
/// Collected operations are wrapped end-to-end. For streaming, use
/// [`open_client`](Self::open_client): only the selection and connection
/// are wrapped, and a mid-stream failure surfaces to the caller instead
/// of silently retrying.
pub struct ResilientClient {
    balancer: LoadBalancer,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    retry: RetryPolicy,
    template: ClientOptions,
    health: Option<HealthChecker>,
    cancel: CancellationToken,
}

impl ResilientClient {
    /// Build the facade and start health checking if configured.
    pub fn new(options: ResilienceOptions) -> Result<Self> {
        if options.servers.is_empty() {
            return Err(Error::Validation(
                "At least one server endpoint is required".to_string(),
            ));
        }

        let balancer = LoadBalancer::new(
            options.servers.clone(),
            options.load_balancing,
        );
        let breakers = options
            .servers
            .iter()
            .map(|endpoint| {
                (
                    endpoint.to_string(),
                    Arc::new(CircuitBreaker::new(
                        options.circuit_breaker,
                    )),
                )
            })
            .collect();

        let health = options.health_check.map(|config| {
            let mut checker = HealthChecker::new(config);
            checker.start(
                balancer.nodes().to_vec(),
                options.client.clone(),
            );
            checker
        });

        Ok(Self {
            balancer,
            breakers,
            retry: options.retry,
            template: options.client,
            health,
            cancel: CancellationToken::new(),
        })
    }

    /// The configured nodes, for inspection.
    pub fn nodes(&self) -> &[Arc<ServerNode>] {
        self.balancer.nodes()
    }

    /// The breaker guarding one endpoint.
    pub fn breaker(&self, endpoint: &Endpoint) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(&endpoint.to_string())
    }

    fn options_for(&self, node: &ServerNode) -> ClientOptions {
        ClientOptions {
            host: node.endpoint().host.clone(),
            port: node.endpoint().port,
            ..self.template.clone()
        }
    }

    async fn attempt_once<T>(
        &self,
        op: &(dyn for<'a> Fn(&'a mut Client) -> OpFuture<'a, T> + Sync),
    ) -> Result<T> {
        let node =
            self.balancer.select().ok_or(Error::NoServerAvailable)?;
        let breaker = self
            .breakers
            .get(&node.endpoint().to_string())
            .expect("breaker exists for every configured node")
            .clone();

        let options = self.options_for(&node);
        let result = breaker
            .execute(|| async {
                let mut client = Client::connect(options).await?;
                op(&mut client).await
            })
            .await;

        match &result {
            Ok(_) => node.mark_healthy(),
            Err(Error::Cancelled) | Err(Error::CircuitOpen { .. }) => {}
            Err(_) => node.record_failure(),
        }
        result
    }

    async fn run<T>(
        &self,
        op: impl for<'a> Fn(&'a mut Client) -> OpFuture<'a, T> + Sync,
    ) -> Result<T> {
        self.retry
            .execute(&self.cancel, || self.attempt_once(&op))
            .await
    }

    /// Execute a query and collect its result.
    pub async fn query(
        &self,
        query: impl Into<Query>,
    ) -> Result<QueryResult> {
        let query = query.into();
        self.run(move |client| {
            let query = query.clone();
            Box::pin(async move { client.query(query).await })
        })
        .await
    }

    /// Execute a statement, returning the written row count.
    pub async fn execute(&self, query: impl Into<Query>) -> Result<u64> {
        let query = query.into();
        self.run(move |client| {
            let query = query.clone();
            Box::pin(async move { client.execute(query).await })
        })
        .await
    }

    /// The first column of the first row, converted to `T`.
    pub async fn query_scalar<T: FromValue + Send>(
        &self,
        query: impl Into<Query>,
    ) -> Result<T> {
        let query = query.into();
        self.run(move |client| {
            let query = query.clone();
            Box::pin(async move { client.query_scalar(query).await })
        })
        .await
    }

    /// All rows projected as values.
    pub async fn query_rows(
        &self,
        query: impl Into<Query>,
    ) -> Result<Vec<Vec<Value>>> {
        let query = query.into();
        self.run(move |client| {
            let query = query.clone();
            Box::pin(async move { client.query_rows(query).await })
        })
        .await
    }

    /// Insert rows in batches. Rows are retained across retry attempts.
    pub async fn bulk_insert(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        options: InsertOptions,
    ) -> Result<()> {
        let table: Arc<str> = Arc::from(table);
        let rows: Arc<[Vec<Value>]> = Arc::from(rows.to_vec());
        self.run(move |client| {
            let table = table.clone();
            let rows = rows.clone();
            Box::pin(async move {
                client.bulk_insert(&table, &rows, options).await
            })
        })
        .await
    }

    /// Ping whichever node the balancer picks.
    pub async fn ping(&self) -> Result<()> {
        self.run(|client| Box::pin(async move { client.ping().await }))
            .await
    }

    /// Open a session for streaming. Selection and connection are
    /// wrapped; once the caller starts streaming on the returned client,
    /// failures surface directly.
    pub async fn open_client(&self) -> Result<Client> {
        self.retry
            .execute(&self.cancel, || async {
                let node = self
                    .balancer
                    .select()
                    .ok_or(Error::NoServerAvailable)?;
                let breaker = self
                    .breakers
                    .get(&node.endpoint().to_string())
                    .expect(
                        "breaker exists for every configured node",
                    )
                    .clone();
                let options = self.options_for(&node);
                let result = breaker
                    .execute(|| Client::connect(options))
                    .await;
                match &result {
                    Ok(_) => node.mark_healthy(),
                    Err(Error::Cancelled)
                    | Err(Error::CircuitOpen { .. }) => {}
                    Err(_) => node.record_failure(),
                }
                result
            })
            .await
    }

    /// Stop the health checker and cancel in-flight retries.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(mut health) = self.health.take() {
            health.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_require_servers() {
        let options = ResilienceOptions {
            servers: Vec::new(),
            load_balancing: LoadBalancingStrategy::RoundRobin,
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: None,
            client: ClientOptions::default(),
        };
        assert!(ResilientClient::new(options).is_err());
    }

    #[test]
    fn test_options_parse_servers() {
        let options =
            ResilienceOptions::new(&["ch0:9000", "ch1:9001", "ch2"])
                .unwrap();
        assert_eq!(options.servers.len(), 3);
        assert_eq!(options.servers[1].port, 9001);
        assert_eq!(options.servers[2].port, 9000);
    }

    #[tokio::test]
    async fn test_breaker_per_endpoint() {
        let mut options =
            ResilienceOptions::new(&["ch0", "ch1"]).unwrap();
        options.health_check = None;
        let client = ResilientClient::new(options).unwrap();

        let ch0 = Endpoint::parse("ch0", 9000).unwrap();
        let ch1 = Endpoint::parse("ch1", 9000).unwrap();
        assert!(client.breaker(&ch0).is_some());
        assert!(client.breaker(&ch1).is_some());
        assert!(client
            .breaker(&Endpoint::parse("ch9", 9000).unwrap())
            .is_none());
    }
}

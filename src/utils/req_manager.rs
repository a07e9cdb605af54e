use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Performance metrics for monitoring request behavior
#[derive(Debug, Default)]
pub struct RequestMetrics {
    /// Total number of requests made
    pub total_requests: AtomicU64,
    /// Number of requests that received any HTTP response
    pub successful_requests: AtomicU64,
    /// Number of requests that failed at the transport level
    pub failed_requests: AtomicU64,
    /// Number of currently active requests
    pub active_requests: AtomicUsize,
    /// Peak concurrent requests observed
    pub peak_concurrent: AtomicUsize,
}

impl RequestMetrics {
    /// Get a formatted summary of metrics
    pub fn summary(&self) -> String {
        let total = self.total_requests.load(Ordering::Relaxed);
        let success = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let active = self.active_requests.load(Ordering::Relaxed);
        let peak = self.peak_concurrent.load(Ordering::Relaxed);

        format!(
            "Requests - Total: {total}, Success: {success}, Failed: {failed}, Active: {active}, Peak: {peak}"
        )
    }
}

/// Shared HTTP client with bounded concurrency for the managed-service REST APIs
///
/// ACS Call Automation, Azure OpenAI chat completions and Cosmos DB share one
/// manager. The long-lived `reqwest::Client` keeps connections pooled and the
/// semaphore caps in-flight requests while a burst of callbacks is handled.
///
/// # Example
/// ```rust,no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// use acs_voice_agent::utils::req_manager::ReqManager;
///
/// let manager = ReqManager::new(8)?;
/// let guard = manager.acquire().await?;
/// let response = guard.client().get("https://example.com/").send().await;
/// guard.record(&response);
/// println!("{}", manager.metrics().summary());
/// # Ok(())
/// # }
/// ```
pub struct ReqManager {
    client: Arc<Client>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<RequestMetrics>,
}

/// A guard that holds a concurrency permit until dropped.
pub struct ClientGuard<'a> {
    manager: &'a ReqManager,
    client: Arc<Client>,
    _permit: SemaphorePermit<'a>,
}

impl<'a> ClientGuard<'a> {
    /// Get the HTTP client for making requests
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Record the outcome of a request made through this guard
    pub fn record<T>(&self, result: &Result<T, reqwest::Error>) {
        let metrics = &self.manager.metrics;
        metrics.total_requests.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(_) => metrics.successful_requests.fetch_add(1, Ordering::Relaxed),
            Err(_) => metrics.failed_requests.fetch_add(1, Ordering::Relaxed),
        };
    }
}

impl<'a> Drop for ClientGuard<'a> {
    fn drop(&mut self) {
        self.manager
            .metrics
            .active_requests
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Configuration for the HTTP request manager
#[derive(Debug, Clone)]
pub struct ReqManagerConfig {
    /// Maximum number of concurrent requests
    pub max_concurrent_requests: usize,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// TCP keep-alive duration
    pub tcp_keepalive: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for ReqManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            pool_max_idle_per_host: 32,
            tcp_keepalive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ReqManager {
    /// Create a new request manager with the specified maximum concurrent requests
    pub fn new(
        max_concurrent_requests: usize,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = ReqManagerConfig {
            max_concurrent_requests,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create a new request manager with custom configuration
    pub fn with_config(
        config: ReqManagerConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if config.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be greater than 0".into());
        }
        if config.max_concurrent_requests > 1000 {
            return Err("max_concurrent_requests must not exceed 1000".into());
        }

        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("acs-voice-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            metrics: Arc::new(RequestMetrics::default()),
        })
    }

    /// Acquire a client, waiting while the concurrency limit is reached
    pub async fn acquire(
        &self,
    ) -> Result<ClientGuard<'_>, Box<dyn std::error::Error + Send + Sync>> {
        let permit = self.semaphore.acquire().await?;

        let active = self.metrics.active_requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics
            .peak_concurrent
            .fetch_max(active, Ordering::Relaxed);

        Ok(ClientGuard {
            manager: self,
            client: Arc::clone(&self.client),
            _permit: permit,
        })
    }

    /// Get the current request metrics
    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }
}

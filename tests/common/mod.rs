//! Shared utilities for integration tests.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use queue_circuit_breaker::breaker::{MaintenanceScheduler, QueueCircuitBreaker, QueuedRequest};
use queue_circuit_breaker::circuit::InMemoryCircuitStore;
use queue_circuit_breaker::config::schema::CircuitBreakerConfig;
use queue_circuit_breaker::config::ConfigurationResource;
use queue_circuit_breaker::lock::{InMemoryLock, LockGate};
use queue_circuit_breaker::queue::{QueueService, QueueServiceError, ReplyStatus};
use queue_circuit_breaker::routing::{Rule, RulePatternToCircuitMapping};

/// Queueing service double that records lock calls and fails on demand.
#[derive(Default)]
pub struct MockQueueService {
    pub locked: Mutex<Vec<String>>,
    pub unlocked: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    down: std::sync::atomic::AtomicBool,
}

#[allow(dead_code)]
impl MockQueueService {
    pub fn fail_queue(&self, queue: &str) {
        self.failing.lock().unwrap().insert(queue.to_string());
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn locked(&self) -> Vec<String> {
        self.locked.lock().unwrap().clone()
    }

    pub fn unlocked(&self) -> Vec<String> {
        self.unlocked.lock().unwrap().clone()
    }

    fn check(&self, queue: &str) -> Result<Option<ReplyStatus>, QueueServiceError> {
        if self.down.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(QueueServiceError::Request("connection refused".into()));
        }
        if self.failing.lock().unwrap().contains(queue) {
            return Ok(Some(ReplyStatus::Error("500 Internal Server Error".into())));
        }
        Ok(None)
    }
}

#[async_trait]
impl QueueService for MockQueueService {
    async fn put_lock(&self, queue: &str, _owner: &str) -> Result<ReplyStatus, QueueServiceError> {
        if let Some(reply) = self.check(queue)? {
            return Ok(reply);
        }
        self.locked.lock().unwrap().push(queue.to_string());
        Ok(ReplyStatus::Ok)
    }

    async fn delete_lock(&self, queue: &str) -> Result<ReplyStatus, QueueServiceError> {
        if let Some(reply) = self.check(queue)? {
            return Ok(reply);
        }
        self.unlocked.lock().unwrap().push(queue.to_string());
        Ok(ReplyStatus::Ok)
    }
}

/// Several breaker instances sharing one store, one lock table and one
/// queueing service, as a gateway cluster would.
#[allow(dead_code)]
pub struct Cluster {
    pub store: Arc<InMemoryCircuitStore>,
    pub lock: Arc<InMemoryLock>,
    pub queues: Arc<MockQueueService>,
    pub config: Arc<ConfigurationResource>,
    pub instances: Vec<Arc<QueueCircuitBreaker>>,
    pub schedulers: Vec<Arc<MaintenanceScheduler>>,
}

#[allow(dead_code)]
impl Cluster {
    pub fn new(size: usize, config: CircuitBreakerConfig, patterns: &[&str]) -> Self {
        let store = Arc::new(InMemoryCircuitStore::new());
        let lock = Arc::new(InMemoryLock::new());
        let queues = Arc::new(MockQueueService::default());
        let config = Arc::new(ConfigurationResource::new(config));
        let rules: Vec<Rule> = patterns.iter().map(|p| Rule::new(*p).unwrap()).collect();

        let mut instances = Vec::new();
        let mut schedulers = Vec::new();
        for i in 0..size {
            let mapping = Arc::new(RulePatternToCircuitMapping::new());
            mapping.update(&rules);
            let breaker = Arc::new(QueueCircuitBreaker::new(
                store.clone(),
                queues.clone(),
                mapping,
                config.clone(),
            ));
            let gate = LockGate::new(lock.clone(), format!("node-{}", i), Duration::from_secs(1));
            schedulers.push(Arc::new(MaintenanceScheduler::new(breaker.clone(), gate)));
            instances.push(breaker);
        }

        Self {
            store,
            lock,
            queues,
            config,
            instances,
            schedulers,
        }
    }

    pub fn node(&self, i: usize) -> &QueueCircuitBreaker {
        &self.instances[i]
    }
}

/// Queued request carrying a unique id header.
#[allow(dead_code)]
pub fn request(uri: &str, id: &str) -> QueuedRequest {
    QueuedRequest::new(uri).with_header("x-rp-unique_id", id)
}

/// One request as seen by the programmable backend.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

/// Start a programmable HTTP backend on an ephemeral port. `f` picks the
/// status code for each request.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<SeenRequest>>>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if let Some(req) = parse_request(&buf[..n]) {
                    log.lock().unwrap().push(req);
                }

                let status = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    204 => "204 No Content",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_text
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

fn parse_request(raw: &[u8]) -> Option<SeenRequest> {
    let text = std::str::from_utf8(raw).ok()?;
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some(SeenRequest { method, path, headers })
}

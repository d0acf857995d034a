//! HTTP client for the queueing service lock API.
//!
//! ```text
//! PUT    {base}/locks/{queue}   x-rp-usr: {owner}
//! DELETE {base}/locks/{queue}
//! ```
//! Any 2xx reply counts as OK.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::schema::QueueServiceConfig;
use crate::lifecycle::defer_close::Close;
use crate::queue::{QueueService, QueueServiceError, ReplyStatus};

const OWNER_HEADER: &str = "x-rp-usr";

#[derive(Debug, Clone)]
pub struct HttpQueueService {
    client: reqwest::Client,
    base: Url,
}

impl HttpQueueService {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, QueueServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| QueueServiceError::Request(e.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &QueueServiceConfig) -> Result<Self, QueueServiceError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| QueueServiceError::Request(format!("invalid base url: {}", e)))?;
        Self::new(base, Duration::from_millis(config.timeout_ms))
    }

    /// `{base}/locks/{queue}` with the queue name as one encoded segment.
    pub fn lock_url(&self, queue: &str) -> Result<Url, QueueServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| QueueServiceError::Request(format!("base url {} cannot hold a path", self.base)))?
            .pop_if_empty()
            .push("locks")
            .push(queue);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ReplyStatus, QueueServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| QueueServiceError::Request(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(ReplyStatus::Ok)
        } else {
            Ok(ReplyStatus::Error(status.to_string()))
        }
    }
}

#[async_trait]
impl QueueService for HttpQueueService {
    async fn put_lock(&self, queue: &str, owner: &str) -> Result<ReplyStatus, QueueServiceError> {
        let url = self.lock_url(queue)?;
        self.send(self.client.put(url).header(OWNER_HEADER, owner)).await
    }

    async fn delete_lock(&self, queue: &str) -> Result<ReplyStatus, QueueServiceError> {
        let url = self.lock_url(queue)?;
        self.send(self.client.delete(url)).await
    }
}

impl Close for HttpQueueService {
    fn close(&self) {
        tracing::info!(base = %self.base, "Queue service client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpQueueService {
        HttpQueueService::new(Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_lock_url_appends_segments() {
        let svc = service("http://127.0.0.1:7070/queuing/");
        assert_eq!(
            svc.lock_url("gateleen-queue-1").unwrap().as_str(),
            "http://127.0.0.1:7070/queuing/locks/gateleen-queue-1"
        );

        let svc = service("http://127.0.0.1:7070/queuing");
        assert_eq!(
            svc.lock_url("q").unwrap().as_str(),
            "http://127.0.0.1:7070/queuing/locks/q"
        );
    }

    #[test]
    fn test_lock_url_encodes_queue_name() {
        let svc = service("http://localhost/");
        assert_eq!(
            svc.lock_url("a/b c").unwrap().as_str(),
            "http://localhost/locks/a%2Fb%20c"
        );
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = QueueServiceConfig {
            base_url: "not a url".into(),
            ..QueueServiceConfig::default()
        };
        assert!(HttpQueueService::from_config(&config).is_err());
    }
}

//! In-process [`DistributedLock`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::lock::{DistributedLock, LockError};

#[derive(Debug, Clone)]
struct Holder {
    token: String,
    expires_at: Instant,
}

/// Lock table kept in process memory. Share one instance through an `Arc`
/// to coordinate several breakers in the same process.
#[derive(Debug, Default)]
pub struct InMemoryLock {
    held: DashMap<String, Holder>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token currently holding `name`, if the hold has not expired.
    pub fn holder(&self, name: &str) -> Option<String> {
        self.held
            .get(name)
            .filter(|h| h.expires_at > Instant::now())
            .map(|h| h.token.clone())
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, name: &str, token: &str, expiry: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let holder = Holder {
            token: token.to_string(),
            expires_at: now + expiry,
        };
        match self.held.entry(name.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().expires_at > now {
                    return Ok(false);
                }
                e.insert(holder);
                Ok(true)
            }
            Entry::Vacant(e) => {
                e.insert(holder);
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, LockError> {
        Ok(self.held.remove_if(name, |_, h| h.token == token).is_some())
    }
}

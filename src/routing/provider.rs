//! Rule provider: pushes the full rule set to observers on every change.

use std::sync::Arc;

use tokio::sync::watch;

use crate::routing::matcher::Rule;

/// Publishes the current rule set.
///
/// Observers get the whole list, never a diff. Publishing an identical list
/// does not wake them.
#[derive(Debug)]
pub struct RuleProvider {
    tx: watch::Sender<Arc<Vec<Rule>>>,
}

impl RuleProvider {
    pub fn new(initial: Vec<Rule>) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Replace the rule set. Returns `true` if observers were notified.
    pub fn publish(&self, rules: Vec<Rule>) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_slice() == rules.as_slice() {
                return false;
            }
            *current = Arc::new(rules);
            true
        })
    }

    /// Subscribe to rule changes. The current set is readable immediately.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Rule>>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<Vec<Rule>> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_notifies_only_on_change() {
        let provider = RuleProvider::new(vec![Rule::new("/a/.*").unwrap()]);
        let mut rx = provider.subscribe();
        rx.borrow_and_update();

        assert!(!provider.publish(vec![Rule::new("/a/.*").unwrap()]));
        assert!(!rx.has_changed().unwrap());

        assert!(provider.publish(vec![Rule::new("/b/.*").unwrap()]));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update()[0].url_pattern(), "/b/.*");
    }
}

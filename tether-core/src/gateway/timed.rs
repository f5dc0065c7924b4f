//! Timeout decorator for gateway calls.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{CompanionSnapshot, Gateway, Placement};
use crate::error::{Error, Result};

/// Bounds every call of the wrapped gateway.
///
/// An expired call surfaces as `Error::AdapterTimeout`; the underlying
/// future is dropped, never left in flight.
pub struct TimedGateway {
    inner: Arc<dyn Gateway>,
    timeout: Duration,
}

impl TimedGateway {
    pub fn new(inner: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        T: Send,
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                warn!(op = op, after_ms = after_ms, "Gateway call timed out");
                Err(Error::timeout(op, after_ms))
            }
        }
    }
}

#[async_trait]
impl Gateway for TimedGateway {
    async fn create_companion(
        &self,
        template_id: &str,
        name: &str,
        placement: &Placement,
    ) -> Result<String> {
        self.bounded(
            "create_companion",
            self.inner.create_companion(template_id, name, placement),
        )
        .await
    }

    async fn delete_companion(&self, companion_id: &str) -> Result<()> {
        self.bounded("delete_companion", self.inner.delete_companion(companion_id))
            .await
    }

    async fn fetch_companion(&self, companion_id: &str) -> Result<Option<CompanionSnapshot>> {
        self.bounded("fetch_companion", self.inner.fetch_companion(companion_id))
            .await
    }

    async fn list_companions(
        &self,
        parent_group_id: Option<&str>,
    ) -> Result<Vec<CompanionSnapshot>> {
        self.bounded("list_companions", self.inner.list_companions(parent_group_id))
            .await
    }

    async fn add_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.bounded("add_member", self.inner.add_member(companion_id, identity_id))
            .await
    }

    async fn remove_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.bounded(
            "remove_member",
            self.inner.remove_member(companion_id, identity_id),
        )
        .await
    }

    async fn lock_companion(&self, companion_id: &str, reason: &str) -> Result<()> {
        self.bounded("lock_companion", self.inner.lock_companion(companion_id, reason))
            .await
    }

    async fn list_subscribers(&self, template_id: &str) -> Result<BTreeSet<String>> {
        self.bounded("list_subscribers", self.inner.list_subscribers(template_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;

    #[tokio::test]
    async fn test_passes_through_fast_calls() {
        let inner = Arc::new(InMemoryGateway::new());
        inner.set_subscribers("e-1", ["a", "b"]);
        let gateway = TimedGateway::new(inner, Duration::from_millis(200));

        let subscribers = gateway.list_subscribers("e-1").await.unwrap();
        assert_eq!(subscribers.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let inner = Arc::new(InMemoryGateway::new());
        inner.set_delay("list_subscribers", Duration::from_secs(30));
        let gateway = TimedGateway::new(inner, Duration::from_millis(50));

        let err = gateway.list_subscribers("e-1").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("list_subscribers"));
    }
}

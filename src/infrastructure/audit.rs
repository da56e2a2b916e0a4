use crate::domain::ports::{AuditContext, AuditSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Audit sink that hands events to the tracing pipeline.
///
/// The deployment's audit service subscribes to these structured events;
/// inside this crate the boundary is one info-level log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &str, ctx: &AuditContext) {
        tracing::info!(target: "audit", event, ctx = ctx.as_str());
    }
}

/// Records events in memory so tests can assert on terminal transitions.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `(event, context)` pairs recorded so far, in order.
    pub async fn events(&self) -> Vec<(String, String)> {
        self.events.lock().await.clone()
    }

    /// Returns just the event names recorded so far, in order.
    pub async fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &str, ctx: &AuditContext) {
        self.events
            .lock()
            .await
            .push((event.to_string(), ctx.as_str().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let ctx = AuditContext::new("admin-7");

        sink.record("withdraw_blocked", &ctx).await;
        sink.record("withdraw_success", &ctx).await;

        assert_eq!(
            sink.event_names().await,
            vec!["withdraw_blocked".to_string(), "withdraw_success".to_string()]
        );
        assert_eq!(sink.events().await[0].1, "admin-7");
    }
}

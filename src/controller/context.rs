//! Shared context for the controllers.
//!
//! The Context struct holds shared state that is passed to every
//! reconciler: the cluster client, retry bookkeeping and optional metrics.

use std::sync::Arc;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType};

use crate::controller::client::KubeClient;
use crate::controller::retry::RetryTracker;
use crate::health::HealthState;

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    /// Cluster access (trait object so tests can substitute a fake)
    pub client: Arc<dyn KubeClient>,
    /// Consecutive-failure tracking per object key
    pub retries: Arc<RetryTracker>,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Arc<dyn KubeClient>,
        max_retries: u32,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            retries: Arc::new(RetryTracker::new(max_retries)),
            health_state,
        }
    }

    /// Publish a normal event for an object
    pub async fn publish_normal_event(
        &self,
        reference: &ObjectReference,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(reference, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for an object
    pub async fn publish_warning_event(
        &self,
        reference: &ObjectReference,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(reference, EventType::Warning, reason, action, note)
            .await;
    }

    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.into(),
            note,
            action: action.into(),
            secondary: None,
        };
        if let Err(e) = self.client.publish_event(reference, &event).await {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}

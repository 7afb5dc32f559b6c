//! Topic-to-queue subscription reconciliation.
//!
//! Reconciling makes sure a queue is subscribed to a topic under a routing-key
//! filter policy, creating the topic and queue on first use. Reconciliation is
//! idempotent: a queue that already has a subscription on the topic is left
//! alone, and successful single-key reconciliations are memoized per
//! `(topic, queue)` pair in a [`SubscriptionCache`].
//!
//! Concurrent first use of the same pair is not serialized. Two callers may
//! both miss the cache and both reconcile; the second usually finds the first
//! one's subscription, but if both list before either subscribes the filter
//! policy is set twice (on the same subscription, since subscribing is
//! idempotent per endpoint at the transport).

use crate::error::{RelayError, ValidationError};
use crate::filter_policy::FilterPolicy;
use crate::message::{subscription_attributes, QueueName, TopicName, QUEUE_PROTOCOL};
use crate::provisioner::Provisioner;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "subscriptions_tests.rs"]
mod tests;

// ============================================================================
// Subscription Cache
// ============================================================================

/// Memo of `(topic, queue)` pairs known to be subscribed
#[async_trait]
pub trait SubscriptionCache: Send + Sync {
    async fn contains(&self, topic: &TopicName, queue: &QueueName) -> bool;

    async fn insert(&self, topic: &TopicName, queue: &QueueName);

    async fn remove(&self, topic: &TopicName, queue: &QueueName);

    /// Forget every pair
    async fn clear(&self);
}

/// Process-local [`SubscriptionCache`]
#[derive(Debug, Default)]
pub struct InMemorySubscriptionCache {
    entries: RwLock<HashSet<(TopicName, QueueName)>>,
}

impl InMemorySubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionCache for InMemorySubscriptionCache {
    async fn contains(&self, topic: &TopicName, queue: &QueueName) -> bool {
        self.entries
            .read()
            .await
            .contains(&(topic.clone(), queue.clone()))
    }

    async fn insert(&self, topic: &TopicName, queue: &QueueName) {
        self.entries
            .write()
            .await
            .insert((topic.clone(), queue.clone()));
    }

    async fn remove(&self, topic: &TopicName, queue: &QueueName) {
        self.entries
            .write()
            .await
            .remove(&(topic.clone(), queue.clone()));
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Ensures queues are subscribed to topics under the right filter policy
pub struct SubscriptionReconciler<T> {
    transport: Arc<T>,
    provisioner: Provisioner<T>,
    cache: Arc<dyn SubscriptionCache>,
    cache_multi_key: bool,
}

impl<T: Transport> SubscriptionReconciler<T> {
    /// Create a reconciler.
    ///
    /// `cache_multi_key` extends memoization to [`Self::ensure_subscribed_multi`].
    pub fn new(
        transport: Arc<T>,
        cache: Arc<dyn SubscriptionCache>,
        cache_multi_key: bool,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(Arc::clone(&transport)),
            transport,
            cache,
            cache_multi_key,
        }
    }

    /// Subscribe `queue` to `topic` for one routing key (and optional meta key).
    ///
    /// Returns `Ok(false)` when a transport call fails; the failure is logged.
    /// Invalid input is returned as an error.
    pub async fn ensure_subscribed(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_key: &str,
        meta_key: Option<&str>,
    ) -> Result<bool, RelayError> {
        match self.subscribe(topic, queue, routing_key, meta_key).await {
            Ok(()) => Ok(true),
            Err(e @ RelayError::ValidationError(_)) => Err(e),
            Err(e) => {
                warn!(
                    topic = %topic,
                    queue = %queue,
                    routing_key,
                    error = %e,
                    "Subscription reconciliation failed"
                );
                Ok(false)
            }
        }
    }

    /// Propagating form of [`Self::ensure_subscribed`], used on the receive path
    pub async fn subscribe(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_key: &str,
        meta_key: Option<&str>,
    ) -> Result<(), RelayError> {
        require_routing_key(routing_key)?;

        if self.cache.contains(topic, queue).await {
            debug!(topic = %topic, queue = %queue, "Subscription already reconciled");
            return Ok(());
        }

        let policy = FilterPolicy::single(routing_key, meta_key);
        self.reconcile(topic, queue, &policy).await?;
        self.cache.insert(topic, queue).await;

        Ok(())
    }

    /// Subscribe `queue` to `topic` for any of several routing keys (and an
    /// optional meta key).
    ///
    /// Failures are returned. Unless multi-key caching is enabled every call
    /// re-checks the transport.
    pub async fn ensure_subscribed_multi<S: AsRef<str>>(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_keys: &[S],
        meta_key: Option<&str>,
    ) -> Result<(), RelayError> {
        if routing_keys.is_empty() {
            return Err(ValidationError::Required {
                field: "routing_keys".to_string(),
            }
            .into());
        }
        for key in routing_keys {
            require_routing_key(key.as_ref())?;
        }

        if self.cache_multi_key && self.cache.contains(topic, queue).await {
            debug!(topic = %topic, queue = %queue, "Subscription already reconciled");
            return Ok(());
        }

        let policy = FilterPolicy::multi(routing_keys, meta_key);
        self.reconcile(topic, queue, &policy).await?;

        if self.cache_multi_key {
            self.cache.insert(topic, queue).await;
        }

        Ok(())
    }

    /// Forget a memoized pair so the next call reconciles again
    pub async fn invalidate(&self, topic: &TopicName, queue: &QueueName) {
        self.cache.remove(topic, queue).await;
    }

    /// Forget every memoized pair
    pub async fn clear(&self) {
        self.cache.clear().await;
    }

    async fn reconcile(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        policy: &FilterPolicy,
    ) -> Result<(), RelayError> {
        let topic_address = self.provisioner.get_or_create_topic_address(topic).await?;
        let queue_address = self
            .provisioner
            .get_or_create_queue_address(queue, false)
            .await?;

        if topic_address.is_empty() {
            return Err(ValidationError::Required {
                field: "topic_address".to_string(),
            }
            .into());
        }
        if queue_address.is_empty() {
            return Err(ValidationError::Required {
                field: "queue_address".to_string(),
            }
            .into());
        }

        let queue_arn = self.provisioner.queue_identifier(&queue_address).await?;

        let existing = self.transport.list_subscriptions(&topic_address).await?;
        if existing.iter().any(|s| s.targets_queue(&queue_arn)) {
            debug!(topic = %topic, queue = %queue, "Queue already subscribed to topic");
            return Ok(());
        }

        let subscription = self
            .transport
            .subscribe(&topic_address, QUEUE_PROTOCOL, queue_arn.as_str())
            .await?;
        self.transport
            .set_subscription_attribute(
                &subscription,
                subscription_attributes::FILTER_POLICY,
                &policy.to_json()?,
            )
            .await?;

        info!(
            topic = %topic,
            queue = %queue,
            subscription = %subscription,
            routing_keys = ?policy.routing_key,
            "Subscribed queue to topic"
        );

        Ok(())
    }
}

fn require_routing_key(routing_key: &str) -> Result<(), RelayError> {
    if routing_key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "routing_key".to_string(),
        }
        .into());
    }
    Ok(())
}

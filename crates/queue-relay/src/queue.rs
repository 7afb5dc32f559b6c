//! The `MessageQueue` facade.
//!
//! Composes provisioning, subscription reconciliation and dispatch behind the
//! broadcast, enqueue, dequeue and admin operations.
//!
//! Sending and administration are best effort: transport and serialization
//! failures are logged and reported as `Ok(false)` (or `None`). Receiving is
//! fail loud: every failure is returned, after the message in flight has been
//! left for redelivery.

use crate::codec;
use crate::config::RelayConfig;
use crate::dispatcher::{decode_string, Attributes, Decoder, Dispatcher, Handler, RoutingContext};
use crate::error::{RelayError, ValidationError};
use crate::message::{MessageId, MessageIds, OutboundMessage, QueueAddress, QueueName, TopicName};
use crate::provisioner::Provisioner;
use crate::subscriptions::{InMemorySubscriptionCache, SubscriptionCache, SubscriptionReconciler};
use crate::transport::Transport;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Reliability layer over a queue and topic transport
pub struct MessageQueue<T> {
    transport: Arc<T>,
    provisioner: Provisioner<T>,
    reconciler: SubscriptionReconciler<T>,
    dispatcher: Dispatcher<T>,
    config: RelayConfig,
}

impl<T: Transport> MessageQueue<T> {
    /// Create a facade with a process-local subscription cache
    pub fn new(transport: Arc<T>, config: RelayConfig) -> Self {
        Self::with_cache(transport, config, Arc::new(InMemorySubscriptionCache::new()))
    }

    /// Create a facade sharing the given subscription cache
    pub fn with_cache(
        transport: Arc<T>,
        config: RelayConfig,
        cache: Arc<dyn SubscriptionCache>,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(Arc::clone(&transport)),
            reconciler: SubscriptionReconciler::new(
                Arc::clone(&transport),
                cache,
                config.cache_multi_key_subscriptions,
            ),
            dispatcher: Dispatcher::new(
                Arc::clone(&transport),
                config.max_messages,
                config.wait_time(),
            ),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    /// Publish a typed payload on `topic` under a routing key.
    ///
    /// The topic is created on first use. Custom attributes are sanitized
    /// before sending. Returns `Ok(false)` when publishing fails and an error
    /// for an empty routing key.
    pub async fn broadcast<P: Serialize>(
        &self,
        topic: &TopicName,
        routing_key: &str,
        meta_key: Option<&str>,
        payload: &P,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        require_non_empty("routing_key", routing_key)?;

        let body = match codec::encode_typed(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Payload could not be serialized for broadcast");
                return Ok(false);
            }
        };

        Ok(self
            .publish(topic, routing_key, meta_key, body, attributes)
            .await)
    }

    /// Publish a raw string payload on `topic` under a routing key
    pub async fn broadcast_string(
        &self,
        topic: &TopicName,
        routing_key: &str,
        meta_key: Option<&str>,
        payload: &str,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        require_non_empty("routing_key", routing_key)?;

        Ok(self
            .publish(
                topic,
                routing_key,
                meta_key,
                codec::encode_raw(payload),
                attributes,
            )
            .await)
    }

    async fn publish(
        &self,
        topic: &TopicName,
        routing_key: &str,
        meta_key: Option<&str>,
        body: String,
        attributes: &Attributes,
    ) -> bool {
        match self
            .try_publish(topic, routing_key, meta_key, body, attributes)
            .await
        {
            Ok(message_id) => {
                debug!(topic = %topic, routing_key, message_id = %message_id, "Broadcast published");
                true
            }
            Err(e) => {
                warn!(topic = %topic, routing_key, error = %e, "Broadcast failed");
                false
            }
        }
    }

    async fn try_publish(
        &self,
        topic: &TopicName,
        routing_key: &str,
        meta_key: Option<&str>,
        body: String,
        attributes: &Attributes,
    ) -> Result<MessageId, RelayError> {
        let topic_address = self.provisioner.get_or_create_topic_address(topic).await?;

        let mut message_attributes = codec::sanitize_attributes(attributes);
        message_attributes.extend(codec::routing_attributes(routing_key, meta_key));

        let message = OutboundMessage::new(body).with_attributes(message_attributes);
        self.transport.publish(&topic_address, &message).await
    }

    // ========================================================================
    // Enqueue
    // ========================================================================

    /// Send a typed payload straight to a standard queue, creating it on first use
    pub async fn enqueue<P: Serialize>(
        &self,
        queue: &QueueName,
        payload: &P,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        let body = match codec::encode_typed(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Payload could not be serialized for enqueue");
                return Ok(false);
            }
        };

        Ok(self.send(queue, OutboundMessage::new(body), attributes).await)
    }

    /// Send a raw string payload straight to a standard queue
    pub async fn enqueue_string(
        &self,
        queue: &QueueName,
        payload: &str,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        let message = OutboundMessage::new(codec::encode_raw(payload));
        Ok(self.send(queue, message, attributes).await)
    }

    /// Send a typed payload to an ordered queue.
    ///
    /// `group_id` and `deduplication_id` are passed to the transport unchanged;
    /// a repeated deduplication id is suppressed by the transport.
    pub async fn enqueue_ordered<P: Serialize>(
        &self,
        queue: &QueueName,
        payload: &P,
        group_id: &str,
        deduplication_id: &str,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        require_non_empty("group_id", group_id)?;
        require_non_empty("deduplication_id", deduplication_id)?;

        let body = match codec::encode_typed(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Payload could not be serialized for enqueue");
                return Ok(false);
            }
        };

        let message = OutboundMessage::new(body).with_ordering(group_id, deduplication_id);
        Ok(self.send(queue, message, attributes).await)
    }

    /// Send a raw string payload to an ordered queue
    pub async fn enqueue_string_ordered(
        &self,
        queue: &QueueName,
        payload: &str,
        group_id: &str,
        deduplication_id: &str,
        attributes: &Attributes,
    ) -> Result<bool, RelayError> {
        require_non_empty("group_id", group_id)?;
        require_non_empty("deduplication_id", deduplication_id)?;

        let message = OutboundMessage::new(codec::encode_raw(payload))
            .with_ordering(group_id, deduplication_id);
        Ok(self.send(queue, message, attributes).await)
    }

    async fn send(
        &self,
        queue: &QueueName,
        message: OutboundMessage,
        attributes: &Attributes,
    ) -> bool {
        let ordered = message.group_id.is_some();
        let message = message.with_attributes(codec::sanitize_attributes(attributes));

        let result = match self
            .provisioner
            .get_or_create_queue_address(queue, ordered)
            .await
        {
            Ok(address) => self.transport.send_message(&address, &message).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(message_id) => {
                debug!(queue = %queue, ordered, message_id = %message_id, "Message enqueued");
                true
            }
            Err(e) => {
                warn!(queue = %queue, ordered, error = %e, "Enqueue failed");
                false
            }
        }
    }

    // ========================================================================
    // Dequeue
    // ========================================================================

    /// Receive one batch of typed messages sent straight to `queue`.
    ///
    /// The routing key handed to the handler is `None`.
    pub async fn dequeue<P: DeserializeOwned>(
        &self,
        queue: &QueueName,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        self.receive(queue, false, RoutingContext::Direct, codec::decode_typed::<P>, handler)
            .await
    }

    /// Receive one batch of raw string messages sent straight to `queue`
    pub async fn dequeue_string(
        &self,
        queue: &QueueName,
        handler: &mut Handler<'_, String>,
    ) -> Result<MessageIds, RelayError> {
        self.receive(queue, false, RoutingContext::Direct, decode_string, handler)
            .await
    }

    /// Receive one batch of typed messages broadcast on `topic` under `routing_key`.
    ///
    /// The queue is subscribed to the topic first; a failed subscription is
    /// returned before anything is received.
    pub async fn dequeue_from_topic<P: DeserializeOwned>(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_key: &str,
        meta_key: Option<&str>,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        self.reconciler
            .subscribe(topic, queue, routing_key, meta_key)
            .await?;

        let context = RoutingContext::SingleKey { topic, routing_key };
        self.receive(queue, false, context, codec::decode_typed::<P>, handler)
            .await
    }

    /// Raw string form of [`Self::dequeue_from_topic`]
    pub async fn dequeue_from_topic_string(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_key: &str,
        meta_key: Option<&str>,
        handler: &mut Handler<'_, String>,
    ) -> Result<MessageIds, RelayError> {
        self.reconciler
            .subscribe(topic, queue, routing_key, meta_key)
            .await?;

        let context = RoutingContext::SingleKey { topic, routing_key };
        self.receive(queue, false, context, decode_string, handler)
            .await
    }

    /// Receive one batch of typed messages broadcast on `topic` under any of `routing_keys`,
    /// narrowed to `meta_key` when given
    pub async fn dequeue_from_topic_multi<P: DeserializeOwned>(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_keys: &[String],
        meta_key: Option<&str>,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        self.reconciler
            .ensure_subscribed_multi(topic, queue, routing_keys, meta_key)
            .await?;

        let context = RoutingContext::MultiKey {
            topic,
            routing_keys,
        };
        self.receive(queue, false, context, codec::decode_typed::<P>, handler)
            .await
    }

    /// Raw string form of [`Self::dequeue_from_topic_multi`]
    pub async fn dequeue_from_topic_multi_string(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_keys: &[String],
        meta_key: Option<&str>,
        handler: &mut Handler<'_, String>,
    ) -> Result<MessageIds, RelayError> {
        self.reconciler
            .ensure_subscribed_multi(topic, queue, routing_keys, meta_key)
            .await?;

        let context = RoutingContext::MultiKey {
            topic,
            routing_keys,
        };
        self.receive(queue, false, context, decode_string, handler)
            .await
    }

    /// Receive one batch of typed messages from an ordered queue, without a long-poll wait
    pub async fn dequeue_ordered<P: DeserializeOwned>(
        &self,
        queue: &QueueName,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        self.receive(queue, true, RoutingContext::Direct, codec::decode_typed::<P>, handler)
            .await
    }

    /// Receive one batch of raw string messages from an ordered queue
    pub async fn dequeue_string_ordered(
        &self,
        queue: &QueueName,
        handler: &mut Handler<'_, String>,
    ) -> Result<MessageIds, RelayError> {
        self.receive(queue, true, RoutingContext::Direct, decode_string, handler)
            .await
    }

    async fn receive<P>(
        &self,
        queue: &QueueName,
        ordered: bool,
        context: RoutingContext<'_>,
        decode: Decoder<P>,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        let result = self
            .dispatcher
            .dispatch(queue, ordered, context, decode, handler)
            .await;

        if let Err(e) = &result {
            warn!(queue = %queue, ordered, error = %e, "Dequeue failed");
        }

        result
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Create a queue with its dead-letter queue and redrive policy.
    ///
    /// Returns `None` when provisioning fails.
    pub async fn create_queue(&self, queue: &QueueName, ordered: bool) -> Option<QueueAddress> {
        self.provisioner
            .create_queue_with_dead_letter(queue, ordered)
            .await
    }

    /// Delete a queue, its dead-letter queue and its subscription to `topic`.
    ///
    /// The memoized subscription for `(topic, queue)` is forgotten so a later
    /// topic dequeue subscribes again.
    pub async fn delete_queue(
        &self,
        queue: &QueueName,
        topic: Option<&TopicName>,
        ordered: bool,
    ) -> bool {
        let deleted = self
            .provisioner
            .delete_queue_with_dead_letter(queue, topic, ordered)
            .await;

        if let Some(topic) = topic {
            self.reconciler.invalidate(topic, queue).await;
        }

        deleted
    }

    /// Subscribe `queue` to `topic` for one routing key; see
    /// [`SubscriptionReconciler::ensure_subscribed`]
    pub async fn ensure_subscribed(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_key: &str,
        meta_key: Option<&str>,
    ) -> Result<bool, RelayError> {
        self.reconciler
            .ensure_subscribed(topic, queue, routing_key, meta_key)
            .await
    }

    /// Subscribe `queue` to `topic` for several routing keys and an optional
    /// meta key; failures are returned
    pub async fn ensure_subscribed_multi<S: AsRef<str>>(
        &self,
        topic: &TopicName,
        queue: &QueueName,
        routing_keys: &[S],
        meta_key: Option<&str>,
    ) -> Result<(), RelayError> {
        self.reconciler
            .ensure_subscribed_multi(topic, queue, routing_keys, meta_key)
            .await
    }

    /// Delete a topic together with its subscriptions.
    ///
    /// Every memoized subscription is forgotten, since the cache is not keyed
    /// by topic alone.
    pub async fn delete_topic(&self, topic: &TopicName) -> bool {
        let deleted = self.provisioner.delete_topic(topic).await;
        self.reconciler.clear().await;
        deleted
    }

    /// Release the facade: forget memoized subscriptions and drop the transport handle
    pub async fn close(self) {
        self.reconciler.clear().await;
        info!("Message queue closed");
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), RelayError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

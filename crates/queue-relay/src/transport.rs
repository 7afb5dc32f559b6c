//! Capability interface over the managed queue and topic service.
//!
//! The relay never talks to the network directly; every provider call goes
//! through these traits. Implementations map a failed call (any 4xx/5xx
//! response) to [`RelayError`] and report a missing queue as
//! [`RelayError::QueueNotFound`].

use crate::error::RelayError;
use crate::message::{
    MessageId, OutboundMessage, QueueAddress, QueueAttributes, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, Subscription, SubscriptionId, TopicAddress,
};
use async_trait::async_trait;

/// Point-to-point queue operations
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create a queue by physical name, returning its address.
    ///
    /// Creating a queue that already exists with the same attributes returns
    /// the existing address.
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueAddress, RelayError>;

    /// Delete a queue and every message in it
    async fn delete_queue(&self, queue: &QueueAddress) -> Result<(), RelayError>;

    /// Look up a queue address by physical name
    async fn get_queue_address(&self, name: &str) -> Result<QueueAddress, RelayError>;

    /// Read the named queue attributes
    async fn get_queue_attributes(
        &self,
        queue: &QueueAddress,
        names: &[&str],
    ) -> Result<QueueAttributes, RelayError>;

    /// Update queue attributes
    async fn set_queue_attributes(
        &self,
        queue: &QueueAddress,
        attributes: &QueueAttributes,
    ) -> Result<(), RelayError>;

    /// Send one message
    async fn send_message(
        &self,
        queue: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError>;

    /// Receive one batch of messages
    async fn receive_messages(
        &self,
        queue: &QueueAddress,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, RelayError>;

    /// Permanently remove a received message
    async fn delete_message(
        &self,
        queue: &QueueAddress,
        receipt: &ReceiptHandle,
    ) -> Result<(), RelayError>;
}

/// Publish/subscribe topic operations
#[async_trait]
pub trait TopicTransport: Send + Sync {
    /// Find an existing topic by name
    async fn find_topic(&self, name: &str) -> Result<Option<TopicAddress>, RelayError>;

    /// Create a topic, returning the existing address when it is already there
    async fn create_topic(&self, name: &str) -> Result<TopicAddress, RelayError>;

    async fn delete_topic(&self, topic: &TopicAddress) -> Result<(), RelayError>;

    /// Publish one message to every matching subscription
    async fn publish(
        &self,
        topic: &TopicAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError>;

    async fn list_subscriptions(
        &self,
        topic: &TopicAddress,
    ) -> Result<Vec<Subscription>, RelayError>;

    /// Subscribe an endpoint to a topic
    async fn subscribe(
        &self,
        topic: &TopicAddress,
        protocol: &str,
        endpoint: &str,
    ) -> Result<SubscriptionId, RelayError>;

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), RelayError>;

    /// Set one subscription attribute (e.g. `FilterPolicy`)
    async fn set_subscription_attribute(
        &self,
        subscription: &SubscriptionId,
        name: &str,
        value: &str,
    ) -> Result<(), RelayError>;
}

/// A provider offering both queues and topics
pub trait Transport: QueueTransport + TopicTransport {}

impl<T: QueueTransport + TopicTransport> Transport for T {}

//! Queue provisioning with paired dead-letter queues.
//!
//! Every queue that is not itself a dead-letter queue is created together with
//! a `-dl` partner and a redrive policy that hands a message over to the
//! partner after [`MAX_RECEIVE_COUNT`] receives. Creation is idempotent by
//! name, so provisioning the same queue twice yields the same address and no
//! second dead-letter queue.

use crate::error::{RelayError, SerializationError};
use crate::message::{
    queue_attributes, QueueAddress, QueueAttributes, QueueIdentifier, QueueName, TopicAddress,
    TopicName, MAX_RECEIVE_COUNT,
};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;

/// Redrive policy attached to a main queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    /// Receives allowed before the message moves; sent as a string
    #[serde(rename = "maxReceiveCount")]
    pub max_receive_count: String,

    #[serde(rename = "deadLetterTargetArn")]
    pub dead_letter_target_arn: String,
}

impl RedrivePolicy {
    /// Policy targeting the given dead-letter queue with the fixed receive limit
    pub fn new(dead_letter: &QueueIdentifier) -> Self {
        Self {
            max_receive_count: MAX_RECEIVE_COUNT.to_string(),
            dead_letter_target_arn: dead_letter.as_str().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Creates, resolves and deletes queues together with their dead-letter partners
pub struct Provisioner<T> {
    transport: Arc<T>,
}

impl<T> Clone for Provisioner<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> Provisioner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Create a queue and, unless it is a dead-letter queue itself, its
    /// dead-letter partner and redrive policy.
    ///
    /// Returns `None` when any transport call fails; the failure is logged.
    pub async fn create_queue_with_dead_letter(
        &self,
        name: &QueueName,
        ordered: bool,
    ) -> Option<QueueAddress> {
        match self.try_create_queue_with_dead_letter(name, ordered).await {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(queue = %name, ordered, error = %e, "Queue provisioning failed");
                None
            }
        }
    }

    async fn try_create_queue_with_dead_letter(
        &self,
        name: &QueueName,
        ordered: bool,
    ) -> Result<QueueAddress, RelayError> {
        let mut attributes = QueueAttributes::new();
        if ordered {
            attributes.insert(queue_attributes::FIFO_QUEUE.to_string(), "true".to_string());
        }

        let address = self
            .transport
            .create_queue(&name.physical_name(ordered), &attributes)
            .await?;

        if name.is_dead_letter() {
            info!(queue = %name, ordered, "Dead-letter queue ready");
            return Ok(address);
        }

        let dead_letter_name = name.dead_letter();
        let dead_letter_address = self
            .transport
            .create_queue(&dead_letter_name.physical_name(ordered), &attributes)
            .await?;
        let dead_letter_arn = self.queue_identifier(&dead_letter_address).await?;

        let mut redrive = QueueAttributes::new();
        redrive.insert(
            queue_attributes::REDRIVE_POLICY.to_string(),
            RedrivePolicy::new(&dead_letter_arn).to_json()?,
        );
        self.transport
            .set_queue_attributes(&address, &redrive)
            .await?;

        info!(
            queue = %name,
            dead_letter = %dead_letter_name,
            ordered,
            "Queue ready with dead-letter redrive"
        );

        Ok(address)
    }

    /// Delete a queue, its dead-letter partner and, for standard queues, its
    /// subscription to `topic`.
    ///
    /// Queues that no longer exist count as deleted. Returns `false` when any
    /// step fails; the failure is logged.
    pub async fn delete_queue_with_dead_letter(
        &self,
        name: &QueueName,
        topic: Option<&TopicName>,
        ordered: bool,
    ) -> bool {
        match self.try_delete_queue_with_dead_letter(name, topic, ordered).await {
            Ok(()) => {
                info!(queue = %name, ordered, "Queue and dead-letter queue deleted");
                true
            }
            Err(e) => {
                warn!(queue = %name, ordered, error = %e, "Queue deletion failed");
                false
            }
        }
    }

    async fn try_delete_queue_with_dead_letter(
        &self,
        name: &QueueName,
        topic: Option<&TopicName>,
        ordered: bool,
    ) -> Result<(), RelayError> {
        if !name.is_dead_letter() {
            let dead_letter = name.dead_letter().physical_name(ordered);
            if let Some(address) = self.find_queue_address(&dead_letter).await? {
                self.delete_if_present(&address).await?;
            }
        }

        let physical_name = name.physical_name(ordered);
        let address = self.find_queue_address(&physical_name).await?;

        if let (false, Some(topic)) = (ordered, topic) {
            self.remove_topic_subscription(topic, address.as_ref(), &physical_name)
                .await?;
        }

        let Some(address) = address else {
            debug!(queue = %name, "Queue already absent");
            return Ok(());
        };

        self.delete_if_present(&address).await
    }

    /// Resolve a queue address, creating the queue (with dead-letter partner) when missing.
    ///
    /// Only a not-found lookup leads to creation; every other lookup failure is returned.
    pub async fn get_or_create_queue_address(
        &self,
        name: &QueueName,
        ordered: bool,
    ) -> Result<QueueAddress, RelayError> {
        if let Some(address) = self.find_queue_address(&name.physical_name(ordered)).await? {
            return Ok(address);
        }

        debug!(queue = %name, ordered, "Queue not found, creating");
        self.create_queue_with_dead_letter(name, ordered)
            .await
            .ok_or_else(|| RelayError::ProvisioningFailed {
                queue_name: name.to_string(),
            })
    }

    /// Resolve a topic address, creating the topic on first reference
    pub async fn get_or_create_topic_address(
        &self,
        topic: &TopicName,
    ) -> Result<TopicAddress, RelayError> {
        if let Some(address) = self.transport.find_topic(topic.as_str()).await? {
            return Ok(address);
        }

        let address = self.transport.create_topic(topic.as_str()).await?;
        info!(topic = %topic, address = %address, "Created topic");
        Ok(address)
    }

    /// Delete a topic and with it every subscription on it.
    ///
    /// A topic that does not exist counts as deleted. Returns `false` when a
    /// transport call fails; the failure is logged.
    pub async fn delete_topic(&self, topic: &TopicName) -> bool {
        let result = match self.transport.find_topic(topic.as_str()).await {
            Ok(Some(address)) => self.transport.delete_topic(&address).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(topic = %topic, "Topic deleted");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Topic deletion failed");
                false
            }
        }
    }

    /// Provider identifier (ARN) of a queue
    pub async fn queue_identifier(
        &self,
        address: &QueueAddress,
    ) -> Result<QueueIdentifier, RelayError> {
        let attributes = self
            .transport
            .get_queue_attributes(address, &[queue_attributes::QUEUE_ARN])
            .await?;

        attributes
            .get(queue_attributes::QUEUE_ARN)
            .map(QueueIdentifier::new)
            .filter(|arn| !arn.is_empty())
            .ok_or_else(|| {
                RelayError::transport(
                    "GetQueueAttributes",
                    None,
                    format!("queue {} reported no QueueArn", address),
                )
            })
    }

    async fn find_queue_address(
        &self,
        physical_name: &str,
    ) -> Result<Option<QueueAddress>, RelayError> {
        match self.transport.get_queue_address(physical_name).await {
            Ok(address) if !address.is_empty() => Ok(Some(address)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_if_present(&self, address: &QueueAddress) -> Result<(), RelayError> {
        match self.transport.delete_queue(address).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Unsubscribe the queue from `topic`.
    ///
    /// A queue that still exists is matched by its ARN; one that is already
    /// gone is matched by the name at the end of the subscription endpoint.
    async fn remove_topic_subscription(
        &self,
        topic: &TopicName,
        address: Option<&QueueAddress>,
        physical_name: &str,
    ) -> Result<(), RelayError> {
        let Some(topic_address) = self.transport.find_topic(topic.as_str()).await? else {
            return Ok(());
        };

        let queue_arn = match address {
            Some(address) => Some(self.queue_identifier(address).await?),
            None => None,
        };
        let subscriptions = self.transport.list_subscriptions(&topic_address).await?;

        for subscription in subscriptions.iter().filter(|s| match &queue_arn {
            Some(arn) => s.targets_queue(arn),
            None => s.targets_queue_named(physical_name),
        }) {
            self.transport.unsubscribe(&subscription.id).await?;
            info!(
                topic = %topic,
                queue = physical_name,
                subscription = %subscription.id,
                "Removed topic subscription"
            );
        }

        Ok(())
    }
}

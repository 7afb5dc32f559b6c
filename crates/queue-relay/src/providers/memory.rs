//! In-memory transport implementation for testing and development.
//!
//! This module provides a broker-like implementation of the queue and topic
//! capability surface that:
//! - Enforces visibility timeouts and counts receives per message
//! - Applies a queue's redrive policy, moving messages to the dead-letter
//!   queue once they exceed the maximum receive count
//! - Keeps per-group ordering and deduplication for `.fifo` queues
//! - Fans topic publishes out to queue subscriptions through filter policies
//!
//! Time is read from `tokio::time`, so tests can pause and advance the clock
//! instead of sleeping through visibility timeouts.
//!
//! For tests it also records how often each operation was called and can be
//! told to fail an operation with a given status code.

use crate::error::{ensure_success_status, RelayError, SerializationError};
use crate::filter_policy::FilterPolicy;
use crate::message::{
    queue_attributes, subscription_attributes, CustomAttribute, MessageId, OutboundMessage,
    QueueAddress, QueueAttributes, ReceiptHandle, ReceiveRequest, ReceivedMessage, Subscription,
    SubscriptionId, TopicAddress, ALL_ATTRIBUTES, FIFO_QUEUE_SUFFIX, QUEUE_PROTOCOL,
};
use crate::transport::{QueueTransport, TopicTransport};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Provider operation names, used for call counting, failure injection and errors
pub mod operations {
    pub const CREATE_QUEUE: &str = "CreateQueue";
    pub const DELETE_QUEUE: &str = "DeleteQueue";
    pub const GET_QUEUE_URL: &str = "GetQueueUrl";
    pub const GET_QUEUE_ATTRIBUTES: &str = "GetQueueAttributes";
    pub const SET_QUEUE_ATTRIBUTES: &str = "SetQueueAttributes";
    pub const SEND_MESSAGE: &str = "SendMessage";
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const DELETE_MESSAGE: &str = "DeleteMessage";
    pub const LIST_TOPICS: &str = "ListTopics";
    pub const CREATE_TOPIC: &str = "CreateTopic";
    pub const DELETE_TOPIC: &str = "DeleteTopic";
    pub const PUBLISH: &str = "Publish";
    pub const LIST_SUBSCRIPTIONS: &str = "ListSubscriptionsByTopic";
    pub const SUBSCRIBE: &str = "Subscribe";
    pub const UNSUBSCRIBE: &str = "Unsubscribe";
    pub const SET_SUBSCRIPTION_ATTRIBUTES: &str = "SetSubscriptionAttributes";
}

use operations::*;

const QUEUE_ADDRESS_PREFIX: &str = "memory://queues/";
const QUEUE_ARN_PREFIX: &str = "arn:memory:sqs:local:000000000000:";
const TOPIC_ARN_PREFIX: &str = "arn:memory:sns:local:000000000000:";

/// Broker behaviour of the in-memory transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryConfig {
    /// How long a received message stays hidden before it can be received again
    pub visibility_timeout: Duration,
    /// How long a FIFO deduplication id suppresses repeats
    pub deduplication_window: Duration,
    /// Sleep between polls while a long-poll receive waits for messages
    pub poll_interval: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            deduplication_window: Duration::from_secs(300),
            poll_interval: Duration::from_millis(20),
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct TransportState {
    /// Queues by physical name
    queues: HashMap<String, MemoryQueue>,
    /// Topic ARNs by name
    topics: HashMap<String, TopicAddress>,
    /// Subscriptions by id
    subscriptions: HashMap<String, MemorySubscription>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, u16>,
}

impl TransportState {
    fn queue_mut(&mut self, queue: &QueueAddress) -> Result<&mut MemoryQueue, RelayError> {
        let name = queue_name_from_address(queue);
        self.queues
            .get_mut(name)
            .ok_or_else(|| RelayError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    fn topic_name_for(&self, topic: &TopicAddress) -> Result<String, RelayError> {
        self.topics
            .iter()
            .find(|(_, arn)| *arn == topic)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| RelayError::TopicNotFound {
                topic_name: topic.to_string(),
            })
    }
}

struct MemoryQueue {
    arn: String,
    ordered: bool,
    attributes: QueueAttributes,
    /// Messages in send order; received messages stay here while invisible
    messages: Vec<StoredMessage>,
    /// Deduplication ids with the message id they produced and when
    deduplication: HashMap<String, (MessageId, Instant)>,
}

impl MemoryQueue {
    /// Max receive count and dead-letter ARN from the redrive policy, if any
    fn redrive_policy(&self) -> Option<(u32, String)> {
        let raw = self.attributes.get(queue_attributes::REDRIVE_POLICY)?;
        let policy: serde_json::Value = serde_json::from_str(raw).ok()?;

        let max_receive_count = match &policy["maxReceiveCount"] {
            serde_json::Value::String(s) => s.parse().ok()?,
            serde_json::Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
            _ => return None,
        };
        let target = policy["deadLetterTargetArn"].as_str()?.to_string();

        Some((max_receive_count, target))
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    attributes: HashMap<String, String>,
    group_id: Option<String>,
    receive_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

impl StoredMessage {
    fn new(body: String, attributes: HashMap<String, String>, group_id: Option<String>) -> Self {
        Self {
            message_id: MessageId::new(),
            body,
            attributes,
            group_id,
            receive_count: 0,
            visible_at: Instant::now(),
            receipt: None,
        }
    }
}

struct MemorySubscription {
    topic: TopicAddress,
    protocol: String,
    endpoint: String,
    attributes: HashMap<String, String>,
}

/// Topic notification as delivered to a queue without raw delivery
#[derive(Serialize)]
struct NotificationEnvelope<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "MessageId")]
    message_id: &'a str,
    #[serde(rename = "TopicArn")]
    topic_arn: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "MessageAttributes")]
    message_attributes: &'a BTreeMap<String, CustomAttribute>,
}

fn queue_name_from_address(queue: &QueueAddress) -> &str {
    queue
        .as_str()
        .strip_prefix(QUEUE_ADDRESS_PREFIX)
        .unwrap_or(queue.as_str())
}

fn attribute_values(attributes: &BTreeMap<String, CustomAttribute>) -> HashMap<String, String> {
    attributes
        .iter()
        .map(|(name, attribute)| (name.clone(), attribute.value.clone()))
        .collect()
}

fn invalid_parameter(operation: &str, message: impl Into<String>) -> RelayError {
    RelayError::transport(operation, Some(400), message)
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue and topic transport
#[derive(Clone)]
pub struct InMemoryTransport {
    state: Arc<RwLock<TransportState>>,
    config: InMemoryConfig,
}

impl InMemoryTransport {
    /// Create new in-memory transport with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(TransportState::default())),
            config,
        }
    }

    /// Number of times the named operation has been invoked
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .read()
            .map(|state| state.calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make every later call of `operation` fail with `status` (4xx or 5xx)
    pub fn fail_operation(&self, operation: &'static str, status: u16) {
        if let Ok(mut state) = self.state.write() {
            state.failures.insert(operation, status);
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.write() {
            state.failures.clear();
        }
    }

    /// Record the call, honour injected failures and hand out the state
    fn enter(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, TransportState>, RelayError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| RelayError::transport(operation, None, "transport state lock poisoned"))?;

        *state.calls.entry(operation).or_insert(0) += 1;

        if let Some(status) = state.failures.get(operation) {
            ensure_success_status(operation, *status)?;
        }

        Ok(state)
    }

    /// Collect visible messages for one receive attempt
    fn try_receive(
        &self,
        state: &mut TransportState,
        queue: &QueueAddress,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, RelayError> {
        let now = Instant::now();
        let visibility_timeout = self.config.visibility_timeout;

        let source = state.queue_mut(queue)?;
        let redrive = source.redrive_policy();
        let ordered = source.ordered;

        let mut received = Vec::new();
        let mut exhausted = Vec::new();
        let mut blocked_groups = HashSet::new();
        let mut index = 0;

        while index < source.messages.len() && received.len() < max_messages {
            let message = &mut source.messages[index];

            if message.visible_at > now {
                if ordered {
                    if let Some(group) = &message.group_id {
                        blocked_groups.insert(group.clone());
                    }
                }
                index += 1;
                continue;
            }

            if ordered
                && message
                    .group_id
                    .as_ref()
                    .is_some_and(|group| blocked_groups.contains(group))
            {
                index += 1;
                continue;
            }

            if let Some((max_receive_count, _)) = &redrive {
                if message.receive_count >= *max_receive_count {
                    exhausted.push(source.messages.remove(index));
                    continue;
                }
            }

            let receipt = uuid::Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.visible_at = now + visibility_timeout;
            message.receipt = Some(receipt.clone());

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: ReceiptHandle::new(receipt),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receive_count: message.receive_count,
            });
            index += 1;
        }

        if let Some((_, target_arn)) = redrive {
            if !exhausted.is_empty() {
                match state.queues.values_mut().find(|q| q.arn == target_arn) {
                    Some(dead_letter) => {
                        for mut message in exhausted {
                            debug!(
                                message_id = %message.message_id,
                                dead_letter = %target_arn,
                                "Moving message to dead-letter queue"
                            );
                            message.receive_count = 0;
                            message.receipt = None;
                            message.visible_at = now;
                            dead_letter.messages.push(message);
                        }
                    }
                    None => warn!(
                        dead_letter = %target_arn,
                        dropped = exhausted.len(),
                        "Dead-letter target missing, dropping exhausted messages"
                    ),
                }
            }
        }

        Ok(received)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueAddress, RelayError> {
        let mut state = self.enter(CREATE_QUEUE)?;

        let wants_fifo = attributes
            .get(queue_attributes::FIFO_QUEUE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if wants_fifo != name.ends_with(FIFO_QUEUE_SUFFIX) {
            return Err(invalid_parameter(
                CREATE_QUEUE,
                "FIFO queue names must end with .fifo and set FifoQueue",
            ));
        }

        let address = QueueAddress::new(format!("{}{}", QUEUE_ADDRESS_PREFIX, name));

        if let Some(existing) = state.queues.get(name) {
            let conflicting = attributes
                .iter()
                .any(|(key, value)| existing.attributes.get(key) != Some(value));
            if conflicting {
                return Err(invalid_parameter(
                    CREATE_QUEUE,
                    format!("QueueAlreadyExists: {} exists with different attributes", name),
                ));
            }
            return Ok(address);
        }

        let arn = format!("{}{}", QUEUE_ARN_PREFIX, name);
        let mut stored_attributes = attributes.clone();
        stored_attributes.insert(queue_attributes::QUEUE_ARN.to_string(), arn.clone());

        state.queues.insert(
            name.to_string(),
            MemoryQueue {
                arn,
                ordered: wants_fifo,
                attributes: stored_attributes,
                messages: Vec::new(),
                deduplication: HashMap::new(),
            },
        );

        Ok(address)
    }

    async fn delete_queue(&self, queue: &QueueAddress) -> Result<(), RelayError> {
        let mut state = self.enter(DELETE_QUEUE)?;
        let name = queue_name_from_address(queue).to_string();

        match state.queues.remove(&name) {
            Some(_) => Ok(()),
            None => Err(RelayError::QueueNotFound { queue_name: name }),
        }
    }

    async fn get_queue_address(&self, name: &str) -> Result<QueueAddress, RelayError> {
        let state = self.enter(GET_QUEUE_URL)?;

        if state.queues.contains_key(name) {
            Ok(QueueAddress::new(format!("{}{}", QUEUE_ADDRESS_PREFIX, name)))
        } else {
            Err(RelayError::QueueNotFound {
                queue_name: name.to_string(),
            })
        }
    }

    async fn get_queue_attributes(
        &self,
        queue: &QueueAddress,
        names: &[&str],
    ) -> Result<QueueAttributes, RelayError> {
        let mut state = self.enter(GET_QUEUE_ATTRIBUTES)?;
        let stored = state.queue_mut(queue)?;

        let now = Instant::now();
        let visible = stored
            .messages
            .iter()
            .filter(|m| m.visible_at <= now)
            .count();

        let mut all = stored.attributes.clone();
        all.insert(
            "ApproximateNumberOfMessages".to_string(),
            visible.to_string(),
        );
        all.insert(
            "ApproximateNumberOfMessagesNotVisible".to_string(),
            (stored.messages.len() - visible).to_string(),
        );

        if names.contains(&ALL_ATTRIBUTES) {
            return Ok(all);
        }

        Ok(all
            .into_iter()
            .filter(|(key, _)| names.contains(&key.as_str()))
            .collect())
    }

    async fn set_queue_attributes(
        &self,
        queue: &QueueAddress,
        attributes: &QueueAttributes,
    ) -> Result<(), RelayError> {
        let mut state = self.enter(SET_QUEUE_ATTRIBUTES)?;
        let stored = state.queue_mut(queue)?;

        if let Some(policy) = attributes.get(queue_attributes::REDRIVE_POLICY) {
            serde_json::from_str::<serde_json::Value>(policy).map_err(|e| {
                invalid_parameter(SET_QUEUE_ATTRIBUTES, format!("invalid RedrivePolicy: {}", e))
            })?;
        }

        stored.attributes.extend(attributes.clone());
        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError> {
        let mut state = self.enter(SEND_MESSAGE)?;
        let window = self.config.deduplication_window;
        let stored = state.queue_mut(queue)?;

        if !stored.ordered {
            let entry = StoredMessage::new(
                message.body.clone(),
                attribute_values(&message.attributes),
                None,
            );
            let id = entry.message_id.clone();
            stored.messages.push(entry);
            return Ok(id);
        }

        let group_id = message
            .group_id
            .clone()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| invalid_parameter(SEND_MESSAGE, "MessageGroupId is required"))?;
        let deduplication_id = message
            .deduplication_id
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                invalid_parameter(SEND_MESSAGE, "MessageDeduplicationId is required")
            })?;

        let now = Instant::now();
        stored
            .deduplication
            .retain(|_, (_, sent_at)| now.duration_since(*sent_at) < window);

        if let Some((id, _)) = stored.deduplication.get(&deduplication_id) {
            debug!(deduplication_id = %deduplication_id, "Suppressing duplicate send");
            return Ok(id.clone());
        }

        let entry = StoredMessage::new(
            message.body.clone(),
            attribute_values(&message.attributes),
            Some(group_id),
        );
        let id = entry.message_id.clone();
        stored
            .deduplication
            .insert(deduplication_id, (id.clone(), now));
        stored.messages.push(entry);

        Ok(id)
    }

    async fn receive_messages(
        &self,
        queue: &QueueAddress,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, RelayError> {
        if !(1..=10).contains(&request.max_messages) {
            return Err(invalid_parameter(
                RECEIVE_MESSAGE,
                "MaxNumberOfMessages must be between 1 and 10",
            ));
        }

        let max_messages = request.max_messages as usize;
        let deadline = request.wait_time.map(|wait| Instant::now() + wait);
        let mut first_attempt = true;

        loop {
            {
                // Only the first poll counts as a call
                let mut state = if first_attempt {
                    self.enter(RECEIVE_MESSAGE)?
                } else {
                    self.state.write().map_err(|_| {
                        RelayError::transport(RECEIVE_MESSAGE, None, "transport state lock poisoned")
                    })?
                };
                first_attempt = false;

                let received = self.try_receive(&mut state, queue, max_messages)?;
                if !received.is_empty() {
                    return Ok(received);
                }
            }

            match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                _ => return Ok(Vec::new()),
            }
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueAddress,
        receipt: &ReceiptHandle,
    ) -> Result<(), RelayError> {
        let mut state = self.enter(DELETE_MESSAGE)?;
        let stored = state.queue_mut(queue)?;

        // A stale or repeated receipt is not an error
        stored
            .messages
            .retain(|m| m.receipt.as_deref() != Some(receipt.as_str()));

        Ok(())
    }
}

#[async_trait]
impl TopicTransport for InMemoryTransport {
    async fn find_topic(&self, name: &str) -> Result<Option<TopicAddress>, RelayError> {
        let state = self.enter(LIST_TOPICS)?;
        Ok(state.topics.get(name).cloned())
    }

    async fn create_topic(&self, name: &str) -> Result<TopicAddress, RelayError> {
        let mut state = self.enter(CREATE_TOPIC)?;

        let address = state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| TopicAddress::new(format!("{}{}", TOPIC_ARN_PREFIX, name)))
            .clone();

        Ok(address)
    }

    async fn delete_topic(&self, topic: &TopicAddress) -> Result<(), RelayError> {
        let mut state = self.enter(DELETE_TOPIC)?;

        // Deleting an unknown topic succeeds
        if let Ok(name) = state.topic_name_for(topic) {
            state.topics.remove(&name);
        }
        state.subscriptions.retain(|_, s| &s.topic != topic);

        Ok(())
    }

    async fn publish(
        &self,
        topic: &TopicAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError> {
        let mut state = self.enter(PUBLISH)?;
        state.topic_name_for(topic)?;

        let message_id = MessageId::new();
        let values = attribute_values(&message.attributes);

        let mut deliveries = Vec::new();
        for subscription in state.subscriptions.values() {
            if &subscription.topic != topic
                || !subscription.protocol.eq_ignore_ascii_case(QUEUE_PROTOCOL)
            {
                continue;
            }

            if let Some(raw_policy) = subscription
                .attributes
                .get(subscription_attributes::FILTER_POLICY)
            {
                let accepted = FilterPolicy::from_json(raw_policy)
                    .map(|policy| policy.matches(&values))
                    .unwrap_or(false);
                if !accepted {
                    continue;
                }
            }

            let raw_delivery = subscription
                .attributes
                .get(subscription_attributes::RAW_MESSAGE_DELIVERY)
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));

            deliveries.push((subscription.endpoint.clone(), raw_delivery));
        }

        for (endpoint, raw_delivery) in deliveries {
            let Some(target) = state
                .queues
                .values_mut()
                .find(|q| q.arn.eq_ignore_ascii_case(&endpoint))
            else {
                debug!(endpoint = %endpoint, "Subscription endpoint has no queue, skipping");
                continue;
            };

            if target.ordered {
                debug!(endpoint = %endpoint, "Standard topic cannot deliver to FIFO queue");
                continue;
            }

            let entry = if raw_delivery {
                StoredMessage::new(message.body.clone(), values.clone(), None)
            } else {
                let envelope = NotificationEnvelope {
                    kind: "Notification",
                    message_id: message_id.as_str(),
                    topic_arn: topic.as_str(),
                    message: &message.body,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    message_attributes: &message.attributes,
                };
                let body = serde_json::to_string(&envelope)
                    .map_err(|e| RelayError::from(SerializationError::from(e)))?;
                StoredMessage::new(body, HashMap::new(), None)
            };

            target.messages.push(entry);
        }

        Ok(message_id)
    }

    async fn list_subscriptions(
        &self,
        topic: &TopicAddress,
    ) -> Result<Vec<Subscription>, RelayError> {
        let state = self.enter(LIST_SUBSCRIPTIONS)?;
        state.topic_name_for(topic)?;

        let mut subscriptions: Vec<Subscription> = state
            .subscriptions
            .iter()
            .filter(|(_, s)| &s.topic == topic)
            .map(|(id, s)| Subscription {
                id: SubscriptionId::new(id.clone()),
                topic: s.topic.clone(),
                protocol: s.protocol.clone(),
                endpoint: s.endpoint.clone(),
            })
            .collect();
        subscriptions.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        Ok(subscriptions)
    }

    async fn subscribe(
        &self,
        topic: &TopicAddress,
        protocol: &str,
        endpoint: &str,
    ) -> Result<SubscriptionId, RelayError> {
        let mut state = self.enter(SUBSCRIBE)?;
        state.topic_name_for(topic)?;

        if let Some((id, _)) = state.subscriptions.iter().find(|(_, s)| {
            &s.topic == topic && s.protocol == protocol && s.endpoint == endpoint
        }) {
            return Ok(SubscriptionId::new(id.clone()));
        }

        let id = format!("{}:{}", topic, uuid::Uuid::new_v4());
        state.subscriptions.insert(
            id.clone(),
            MemorySubscription {
                topic: topic.clone(),
                protocol: protocol.to_string(),
                endpoint: endpoint.to_string(),
                attributes: HashMap::new(),
            },
        );

        Ok(SubscriptionId::new(id))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), RelayError> {
        let mut state = self.enter(UNSUBSCRIBE)?;

        match state.subscriptions.remove(subscription.as_str()) {
            Some(_) => Ok(()),
            None => Err(RelayError::transport(
                UNSUBSCRIBE,
                Some(404),
                format!("subscription {} does not exist", subscription),
            )),
        }
    }

    async fn set_subscription_attribute(
        &self,
        subscription: &SubscriptionId,
        name: &str,
        value: &str,
    ) -> Result<(), RelayError> {
        let mut state = self.enter(SET_SUBSCRIPTION_ATTRIBUTES)?;

        if name == subscription_attributes::FILTER_POLICY {
            FilterPolicy::from_json(value).map_err(|e| {
                invalid_parameter(
                    SET_SUBSCRIPTION_ATTRIBUTES,
                    format!("invalid FilterPolicy: {}", e),
                )
            })?;
        }

        let stored = state
            .subscriptions
            .get_mut(subscription.as_str())
            .ok_or_else(|| {
                RelayError::transport(
                    SET_SUBSCRIPTION_ATTRIBUTES,
                    Some(404),
                    format!("subscription {} does not exist", subscription),
                )
            })?;

        stored
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

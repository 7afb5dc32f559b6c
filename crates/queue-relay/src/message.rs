//! Message types and naming rules for queue and topic operations.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Naming and Wire Conventions
// ============================================================================

/// Suffix appended to a base queue name to form its dead-letter queue
pub const DEAD_LETTER_SUFFIX: &str = "-dl";

/// Suffix required by the transport for ordered (FIFO) queues
pub const FIFO_QUEUE_SUFFIX: &str = ".fifo";

/// Message attribute carrying the routing key of a broadcast
pub const ROUTING_KEY_NAME: &str = "routingKey";

/// Optional secondary routing attribute
pub const META_KEY_NAME: &str = "metaKey";

/// Receives allowed before the transport moves a message to the dead-letter queue
pub const MAX_RECEIVE_COUNT: u32 = 3;

/// Data type tag used for all routing and custom attributes
pub const STRING_DATA_TYPE: &str = "String";

/// Subscription protocol for queue endpoints
pub const QUEUE_PROTOCOL: &str = "sqs";

/// Queue attribute names understood by the transport
pub mod queue_attributes {
    pub const FIFO_QUEUE: &str = "FifoQueue";
    pub const REDRIVE_POLICY: &str = "RedrivePolicy";
    pub const QUEUE_ARN: &str = "QueueArn";
    pub const POLICY: &str = "Policy";
    pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
}

/// Subscription attribute names understood by the transport
pub mod subscription_attributes {
    pub const FILTER_POLICY: &str = "FilterPolicy";
    pub const RAW_MESSAGE_DELIVERY: &str = "RawMessageDelivery";
}

/// Attribute name that requests every message attribute on receive
pub const ALL_ATTRIBUTES: &str = "All";

/// Attribute map used when creating or updating a queue
pub type QueueAttributes = HashMap<String, String>;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated base queue name.
///
/// The base name never carries the ordering suffix; the physical name sent to
/// the transport is derived with [`QueueName::physical_name`]. Dead-letter
/// names are derived with [`QueueName::dead_letter`] and keep the ordering
/// suffix outermost (`orders-dl.fifo`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Longest base name that still fits both suffixes inside the 80 character limit
    pub const MAX_LENGTH: usize = 80 - DEAD_LETTER_SUFFIX.len() - FIFO_QUEUE_SUFFIX.len();

    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", Self::MAX_LENGTH),
            });
        }

        // Validate characters (ASCII alphanumeric, hyphens, underscores)
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this name already denotes a dead-letter queue
    pub fn is_dead_letter(&self) -> bool {
        self.0.ends_with(DEAD_LETTER_SUFFIX)
    }

    /// Name of the paired dead-letter queue
    pub fn dead_letter(&self) -> QueueName {
        Self(format!("{}{}", self.0, DEAD_LETTER_SUFFIX))
    }

    /// Name as the transport knows it
    pub fn physical_name(&self, ordered: bool) -> String {
        if ordered {
            format!("{}{}", self.0, FIFO_QUEUE_SUFFIX)
        } else {
            self.0.clone()
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated topic name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    pub const MAX_LENGTH: usize = 256;

    /// Create new topic name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "topic_name".to_string(),
                message: format!("must be 1-{} characters", Self::MAX_LENGTH),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "topic_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TopicName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Opaque, provider-assigned strings. They are never validated locally; an
// empty value is how a failed lookup shows up and callers check `is_empty`.
macro_rules! provider_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

provider_string!(
    /// Address used to call a queue (the queue URL)
    QueueAddress
);

provider_string!(
    /// Provider identifier of a queue (the queue ARN), used by redrive and subscriptions
    QueueIdentifier
);

provider_string!(
    /// Provider identifier of a topic (the topic ARN)
    TopicAddress
);

provider_string!(
    /// Provider identifier of a topic subscription
    SubscriptionId
);

provider_string!(
    /// Token used to acknowledge (delete) one specific receipt of a message
    ReceiptHandle
);

/// Provider-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Typed message attribute as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttribute {
    #[serde(rename = "Type")]
    pub data_type: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl CustomAttribute {
    /// String-typed attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: STRING_DATA_TYPE.to_string(),
            value: value.into(),
        }
    }
}

/// Message handed to the transport for sending or publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    pub attributes: BTreeMap<String, CustomAttribute>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
            group_id: None,
            deduplication_id: None,
        }
    }

    /// Attach attributes, replacing any with the same name
    pub fn with_attributes(mut self, attributes: BTreeMap<String, CustomAttribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Set the ordering group and deduplication id for FIFO queues
    pub fn with_ordering(
        mut self,
        group_id: impl Into<String>,
        deduplication_id: impl Into<String>,
    ) -> Self {
        self.group_id = Some(group_id.into());
        self.deduplication_id = Some(deduplication_id.into());
        self
    }
}

/// A message returned by a receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    /// Transport-level message attributes (name to string value)
    pub attributes: HashMap<String, String>,
    /// How many times the transport has handed this message out, this receipt included
    pub receive_count: u32,
}

/// Parameters of a single batched receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: u32,
    /// Long-poll wait; `None` polls without a wait argument
    pub wait_time: Option<Duration>,
    pub attribute_names: Vec<String>,
}

impl ReceiveRequest {
    /// Receive request asking for every message attribute
    pub fn all_attributes(max_messages: u32, wait_time: Option<Duration>) -> Self {
        Self {
            max_messages,
            wait_time,
            attribute_names: vec![ALL_ATTRIBUTES.to_string()],
        }
    }
}

/// A topic subscription as listed by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: TopicAddress,
    pub protocol: String,
    pub endpoint: String,
}

impl Subscription {
    /// True when this subscription delivers to the given queue
    pub fn targets_queue(&self, queue: &QueueIdentifier) -> bool {
        self.protocol.eq_ignore_ascii_case(QUEUE_PROTOCOL)
            && self.endpoint.eq_ignore_ascii_case(queue.as_str())
    }

    /// True when this subscription delivers to a queue with the given physical
    /// name, judged by the last segment of the endpoint ARN
    pub fn targets_queue_named(&self, physical_name: &str) -> bool {
        self.protocol.eq_ignore_ascii_case(QUEUE_PROTOCOL)
            && self
                .endpoint
                .rsplit(':')
                .next()
                .is_some_and(|name| name.eq_ignore_ascii_case(physical_name))
    }
}

/// Ids of the messages processed by one dequeue call, in receive order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageIds(Vec<MessageId>);

impl MessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: MessageId) {
        self.0.push(id);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageId> {
        self.0.iter()
    }

    /// Comma-joined ids; empty string when nothing was received
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(MessageId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for MessageIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.joined())
    }
}

impl IntoIterator for MessageIds {
    type Item = MessageId;
    type IntoIter = std::vec::IntoIter<MessageId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

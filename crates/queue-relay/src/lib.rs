//! # Queue Relay
//!
//! Reliability layer over a managed queue and topic transport (SQS and SNS, or
//! the in-memory transport used for testing).
//!
//! This library provides:
//! - Idempotent provisioning of queues with paired dead-letter queues and redrive policies
//! - Idempotent, memoized topic-to-queue subscriptions with routing-key filter policies
//! - Broadcast with routing keys and direct enqueue, for typed (JSON) and raw string payloads
//! - Handler-driven acknowledgement: `true` deletes a message, `false` leaves it for redelivery
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all operations
//! - [`message`] - Names, identifiers and message structures
//! - [`codec`] - Payload encoding and envelope decoding
//! - [`filter_policy`] - Subscription filter policies
//! - [`transport`] - The transport capability traits
//! - [`providers`] - Transport implementations
//! - [`provisioner`] - Queue, dead-letter queue and topic provisioning
//! - [`subscriptions`] - Subscription reconciliation and its cache
//! - [`dispatcher`] - Receive, dispatch and acknowledge
//! - [`queue`] - The [`MessageQueue`] facade
//! - [`config`] - Configuration loading
//!
//! ## Usage
//!
//! ```rust
//! use queue_relay::{Attributes, Handler, InMemoryTransport, MessageQueue, QueueName, RelayConfig};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let relay = MessageQueue::new(Arc::new(InMemoryTransport::default()), RelayConfig::default());
//! let queue = QueueName::new("greetings").unwrap();
//!
//! relay.enqueue_string(&queue, "hello", &Attributes::new()).await.unwrap();
//!
//! let mut handler = Handler::single_key(|payload: String, _key, _attributes| {
//!     assert_eq!(payload, "hello");
//!     Ok(true)
//! });
//! let ids = relay.dequeue_string(&queue, &mut handler).await.unwrap();
//! assert_eq!(ids.len(), 1);
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter_policy;
pub mod message;
pub mod providers;
pub mod provisioner;
pub mod queue;
pub mod subscriptions;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use config::{AwsSettings, RelayConfig};
pub use dispatcher::{AckOutcome, Attributes, Handler, RoutingContext};
pub use error::{ConfigurationError, RelayError, SerializationError, ValidationError};
pub use filter_policy::FilterPolicy;
pub use message::{
    MessageId, MessageIds, QueueAddress, QueueIdentifier, QueueName, ReceivedMessage,
    ReceiptHandle, TopicAddress, TopicName,
};
pub use providers::memory::{InMemoryConfig, InMemoryTransport};
pub use provisioner::{Provisioner, RedrivePolicy};
pub use queue::MessageQueue;
pub use subscriptions::{InMemorySubscriptionCache, SubscriptionCache, SubscriptionReconciler};
pub use transport::{QueueTransport, TopicTransport, Transport};

#[cfg(feature = "aws")]
pub use providers::aws::AwsTransport;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

//! Receive, dispatch and acknowledge.
//!
//! One dispatch call issues exactly one batched receive and walks the batch in
//! receive order. Each message is decoded and handed to the caller's handler;
//! the handler's answer decides what happens to it:
//! - `Ok(true)`: the message is deleted from the queue (acknowledged)
//! - `Ok(false)`: nothing is done; the transport makes the message visible
//!   again once its visibility timeout runs out, and after
//!   [`MAX_RECEIVE_COUNT`](crate::message::MAX_RECEIVE_COUNT) receives moves
//!   it to the dead-letter queue
//! - `Err(_)`: as `Ok(false)`, after which the failure is returned to the caller
//!
//! There is no polling loop; callers wanting continuous consumption call
//! dispatch again.

use crate::codec;
use crate::error::{RelayError, SerializationError};
use crate::message::{
    MessageId, MessageIds, QueueAddress, QueueName, ReceiveRequest, ReceivedMessage, TopicName,
};
use crate::provisioner::Provisioner;
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

/// Message attributes as handed to handlers
pub type Attributes = HashMap<String, String>;

/// Turns the payload text of a message into the handler's payload type
pub type Decoder<P> = fn(&str) -> Result<P, SerializationError>;

type SingleKeyFn<'h, P> =
    dyn FnMut(P, Option<&str>, &Attributes) -> anyhow::Result<bool> + Send + 'h;
type MultiKeyFn<'h, P> = dyn FnMut(P, &[String], &Attributes) -> anyhow::Result<bool> + Send + 'h;
type SingleKeyWithOriginFn<'h, P> = dyn FnMut(P, Option<&TopicName>, Option<&str>, &Attributes) -> anyhow::Result<bool>
    + Send
    + 'h;
type MultiKeyWithOriginFn<'h, P> =
    dyn FnMut(P, Option<&TopicName>, &[String], &Attributes) -> anyhow::Result<bool> + Send + 'h;

/// [`Decoder`] for raw string payloads
pub fn decode_string(text: &str) -> Result<String, SerializationError> {
    Ok(codec::decode_raw(text))
}

/// Message handler, by the shape of routing information it accepts.
///
/// The `WithOriginTopic` shapes also receive the topic the message was
/// broadcast on; they suit dead-letter processing where the origin matters.
/// A handler whose key arity does not fit the call (a multi-key handler on a
/// single-key dequeue, or the reverse) is never invoked and its messages are
/// left for redelivery.
pub enum Handler<'h, P> {
    SingleKey(Box<SingleKeyFn<'h, P>>),
    MultiKey(Box<MultiKeyFn<'h, P>>),
    SingleKeyWithOriginTopic(Box<SingleKeyWithOriginFn<'h, P>>),
    MultiKeyWithOriginTopic(Box<MultiKeyWithOriginFn<'h, P>>),
}

impl<'h, P> Handler<'h, P> {
    /// Handler receiving the routing key (absent for direct dequeues)
    pub fn single_key<F>(handler: F) -> Self
    where
        F: FnMut(P, Option<&str>, &Attributes) -> anyhow::Result<bool> + Send + 'h,
    {
        Self::SingleKey(Box::new(handler))
    }

    /// Handler receiving the list of routing keys the queue subscribed with
    pub fn multi_key<F>(handler: F) -> Self
    where
        F: FnMut(P, &[String], &Attributes) -> anyhow::Result<bool> + Send + 'h,
    {
        Self::MultiKey(Box::new(handler))
    }

    pub fn single_key_with_origin_topic<F>(handler: F) -> Self
    where
        F: FnMut(P, Option<&TopicName>, Option<&str>, &Attributes) -> anyhow::Result<bool>
            + Send
            + 'h,
    {
        Self::SingleKeyWithOriginTopic(Box::new(handler))
    }

    pub fn multi_key_with_origin_topic<F>(handler: F) -> Self
    where
        F: FnMut(P, Option<&TopicName>, &[String], &Attributes) -> anyhow::Result<bool>
            + Send
            + 'h,
    {
        Self::MultiKeyWithOriginTopic(Box::new(handler))
    }

    /// Call the handler if its shape fits the routing context; `Ok(false)` otherwise
    fn invoke(
        &mut self,
        payload: P,
        context: &RoutingContext<'_>,
        attributes: &Attributes,
    ) -> anyhow::Result<bool> {
        match (self, context) {
            (Self::SingleKey(f), RoutingContext::Direct) => f(payload, None, attributes),
            (Self::SingleKey(f), RoutingContext::SingleKey { routing_key, .. }) => {
                f(payload, Some(*routing_key), attributes)
            }
            (Self::SingleKeyWithOriginTopic(f), RoutingContext::Direct) => {
                f(payload, None, None, attributes)
            }
            (
                Self::SingleKeyWithOriginTopic(f),
                RoutingContext::SingleKey { topic, routing_key },
            ) => f(payload, Some(*topic), Some(*routing_key), attributes),
            (Self::MultiKey(f), RoutingContext::MultiKey { routing_keys, .. }) => {
                f(payload, *routing_keys, attributes)
            }
            (
                Self::MultiKeyWithOriginTopic(f),
                RoutingContext::MultiKey {
                    topic,
                    routing_keys,
                },
            ) => f(payload, Some(*topic), *routing_keys, attributes),
            _ => Ok(false),
        }
    }
}

impl<P> std::fmt::Debug for Handler<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self {
            Self::SingleKey(_) => "SingleKey",
            Self::MultiKey(_) => "MultiKey",
            Self::SingleKeyWithOriginTopic(_) => "SingleKeyWithOriginTopic",
            Self::MultiKeyWithOriginTopic(_) => "MultiKeyWithOriginTopic",
        };
        f.debug_tuple("Handler").field(&shape).finish()
    }
}

/// How the messages being dispatched reached the queue
#[derive(Debug, Clone, Copy)]
pub enum RoutingContext<'c> {
    /// Sent straight to the queue
    Direct,
    /// Broadcast on `topic` and delivered through a single-key subscription
    SingleKey {
        topic: &'c TopicName,
        routing_key: &'c str,
    },
    /// Broadcast on `topic` and delivered through a multi-key subscription
    MultiKey {
        topic: &'c TopicName,
        routing_keys: &'c [String],
    },
}

impl RoutingContext<'_> {
    /// Topic deliveries arrive wrapped in the topic's notification envelope
    fn from_topic(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}

/// What happened to a message after its handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Deleted from the queue
    Acknowledged,
    /// Left in place to be redelivered after the visibility timeout
    Abandoned,
}

/// Receives a batch from a queue and drives each message through a handler
pub struct Dispatcher<T> {
    transport: Arc<T>,
    provisioner: Provisioner<T>,
    max_messages: u32,
    wait_time: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, max_messages: u32, wait_time: Duration) -> Self {
        Self {
            provisioner: Provisioner::new(Arc::clone(&transport)),
            transport,
            max_messages,
            wait_time,
        }
    }

    /// Receive one batch from `queue` and dispatch it.
    ///
    /// Standard queues long-poll for the configured wait time; ordered queues
    /// are polled without a wait. The queue is created when it does not exist
    /// yet. Returns the ids of the dispatched messages. A decode, handler or
    /// delete failure ends the call with that error and leaves the rest of the
    /// batch for redelivery.
    pub async fn dispatch<P>(
        &self,
        queue: &QueueName,
        ordered: bool,
        context: RoutingContext<'_>,
        decode: Decoder<P>,
        handler: &mut Handler<'_, P>,
    ) -> Result<MessageIds, RelayError> {
        let address = self
            .provisioner
            .get_or_create_queue_address(queue, ordered)
            .await?;

        let wait_time = if ordered { None } else { Some(self.wait_time) };
        let request = ReceiveRequest::all_attributes(self.max_messages, wait_time);
        let messages = self.transport.receive_messages(&address, &request).await?;

        debug!(queue = %queue, ordered, received = messages.len(), "Received batch");

        let mut ids = MessageIds::new();
        for message in &messages {
            ids.push(message.message_id.clone());

            let outcome = self
                .process(&address, message, &context, decode, handler)
                .await?;

            debug!(
                queue = %queue,
                message_id = %message.message_id,
                receive_count = message.receive_count,
                outcome = ?outcome,
                "Message dispatched"
            );
        }

        Ok(ids)
    }

    async fn process<P>(
        &self,
        address: &QueueAddress,
        message: &ReceivedMessage,
        context: &RoutingContext<'_>,
        decode: Decoder<P>,
        handler: &mut Handler<'_, P>,
    ) -> Result<AckOutcome, RelayError> {
        let (payload, attributes) = decode_message(message, context, decode).map_err(|e| {
            error!(
                message_id = %message.message_id,
                error = %e,
                "Message could not be decoded, leaving it for redelivery"
            );
            RelayError::from(e)
        })?;

        match handler.invoke(payload, context, &attributes) {
            Ok(true) => {
                self.acknowledge(address, message).await?;
                Ok(AckOutcome::Acknowledged)
            }
            Ok(false) => Ok(AckOutcome::Abandoned),
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    error = %e,
                    "Handler failed, leaving message for redelivery"
                );
                Err(handler_error(&message.message_id, e))
            }
        }
    }

    async fn acknowledge(
        &self,
        address: &QueueAddress,
        message: &ReceivedMessage,
    ) -> Result<(), RelayError> {
        self.transport
            .delete_message(address, &message.receipt_handle)
            .await
    }
}

/// Decode the payload and collect the attributes a handler sees.
///
/// Transport attributes come first; attributes carried in a topic envelope
/// override them.
fn decode_message<P>(
    message: &ReceivedMessage,
    context: &RoutingContext<'_>,
    decode: Decoder<P>,
) -> Result<(P, Attributes), SerializationError> {
    let envelope = codec::decode_envelope(&message.body, context.from_topic())?;
    let payload = decode(envelope.payload(&message.body))?;

    let mut attributes = message.attributes.clone();
    attributes.extend(envelope.attributes);

    Ok((payload, attributes))
}

fn handler_error(message_id: &MessageId, source: anyhow::Error) -> RelayError {
    RelayError::Handler {
        message_id: message_id.to_string(),
        source,
    }
}

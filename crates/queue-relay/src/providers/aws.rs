//! AWS transport: SQS queues and SNS topics through the AWS SDK.
//!
//! Enabled with the `aws` feature. Credentials and region come from
//! [`AwsSettings`] when set and from the SDK's default provider chain
//! otherwise; `endpoint_url` points both clients at LocalStack or a similar
//! emulator.
//!
//! ## Error Mapping
//!
//! SDK failures become [`RelayError::Transport`] carrying the HTTP status of
//! the raw response. Missing queues and topics are reported as
//! [`RelayError::QueueNotFound`] and [`RelayError::TopicNotFound`] by error
//! code, so provisioning can tell "absent" from "broken".
//!
//! ## Topic Permissions
//!
//! Subscribing a queue to a topic also grants the topic permission to send to
//! that queue, by adding a statement to the queue's access policy.
//!
//! ## Example
//!
//! ```no_run
//! use queue_relay::{AwsSettings, AwsTransport, MessageQueue, RelayConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AwsSettings {
//!     region: Some("us-east-1".to_string()),
//!     ..AwsSettings::default()
//! };
//!
//! let transport = AwsTransport::connect(&settings).await;
//! let relay = MessageQueue::new(Arc::new(transport), RelayConfig::default());
//! # Ok(())
//! # }
//! ```

use crate::config::AwsSettings;
use crate::error::{RelayError, SerializationError};
use crate::message::{
    queue_attributes, MessageId, OutboundMessage, QueueAddress, QueueAttributes, ReceiptHandle,
    ReceiveRequest, ReceivedMessage, Subscription, SubscriptionId, TopicAddress, ALL_ATTRIBUTES,
    QUEUE_PROTOCOL,
};
use crate::transport::{QueueTransport, TopicTransport};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sqs::config::Credentials;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client as SqsClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

/// SQS error codes meaning the queue does not exist
const QUEUE_NOT_FOUND_CODES: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

/// SNS error code for a missing topic or subscription
const TOPIC_NOT_FOUND_CODE: &str = "NotFound";

const CREDENTIALS_PROVIDER_NAME: &str = "queue-relay";

/// Transport backed by SQS and SNS
#[derive(Clone)]
pub struct AwsTransport {
    sqs: SqsClient,
    sns: SnsClient,
}

impl AwsTransport {
    /// Build SQS and SNS clients from the given settings
    pub async fn connect(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        }

        let sdk_config = loader.load().await;
        info!(
            region = ?settings.region,
            endpoint = ?settings.endpoint_url,
            "Connected AWS transport"
        );

        Self::from_clients(SqsClient::new(&sdk_config), SnsClient::new(&sdk_config))
    }

    /// Wrap clients built elsewhere
    pub fn from_clients(sqs: SqsClient, sns: SnsClient) -> Self {
        Self { sqs, sns }
    }

    /// Let `topic_arn` send to the queue behind `queue_arn`
    async fn grant_topic_send(&self, topic_arn: &str, queue_arn: &str) -> Result<(), RelayError> {
        let queue_name = queue_arn.rsplit(':').next().unwrap_or(queue_arn);
        let queue = self.get_queue_address(queue_name).await?;

        let existing = self
            .get_queue_attributes(&queue, &[queue_attributes::POLICY])
            .await?;
        let Some(policy) = grant_topic_send_policy(
            existing.get(queue_attributes::POLICY).map(String::as_str),
            queue_arn,
            topic_arn,
        )?
        else {
            return Ok(());
        };

        let mut attributes = QueueAttributes::new();
        attributes.insert(queue_attributes::POLICY.to_string(), policy);
        self.set_queue_attributes(&queue, &attributes).await?;

        debug!(queue = %queue_arn, topic = %topic_arn, "Granted topic send permission");
        Ok(())
    }
}

impl fmt::Debug for AwsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueueTransport for AwsTransport {
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueAddress, RelayError> {
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .set_attributes(queue_attribute_map(attributes))
            .send()
            .await
            .map_err(|e| sqs_error("CreateQueue", name, e))?;

        output
            .queue_url()
            .map(QueueAddress::new)
            .ok_or_else(|| missing_field("CreateQueue", "QueueUrl"))
    }

    async fn delete_queue(&self, queue: &QueueAddress) -> Result<(), RelayError> {
        self.sqs
            .delete_queue()
            .queue_url(queue.as_str())
            .send()
            .await
            .map_err(|e| sqs_error("DeleteQueue", queue.as_str(), e))?;
        Ok(())
    }

    async fn get_queue_address(&self, name: &str) -> Result<QueueAddress, RelayError> {
        let output = self
            .sqs
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|service| service.is_queue_does_not_exist())
                {
                    RelayError::QueueNotFound {
                        queue_name: name.to_string(),
                    }
                } else {
                    sqs_error("GetQueueUrl", name, e)
                }
            })?;

        output
            .queue_url()
            .map(QueueAddress::new)
            .ok_or_else(|| missing_field("GetQueueUrl", "QueueUrl"))
    }

    async fn get_queue_attributes(
        &self,
        queue: &QueueAddress,
        names: &[&str],
    ) -> Result<QueueAttributes, RelayError> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue.as_str())
            .set_attribute_names(Some(
                names.iter().map(|name| QueueAttributeName::from(*name)).collect(),
            ))
            .send()
            .await
            .map_err(|e| sqs_error("GetQueueAttributes", queue.as_str(), e))?;

        Ok(output
            .attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_queue_attributes(
        &self,
        queue: &QueueAddress,
        attributes: &QueueAttributes,
    ) -> Result<(), RelayError> {
        self.sqs
            .set_queue_attributes()
            .queue_url(queue.as_str())
            .set_attributes(queue_attribute_map(attributes))
            .send()
            .await
            .map_err(|e| sqs_error("SetQueueAttributes", queue.as_str(), e))?;
        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError> {
        let mut attributes = HashMap::new();
        for (name, attribute) in &message.attributes {
            let value = aws_sdk_sqs::types::MessageAttributeValue::builder()
                .data_type(&attribute.data_type)
                .string_value(&attribute.value)
                .build()
                .map_err(|e| RelayError::transport("SendMessage", None, e.to_string()))?;
            attributes.insert(name.clone(), value);
        }

        let output = self
            .sqs
            .send_message()
            .queue_url(queue.as_str())
            .message_body(&message.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_group_id(message.group_id.clone())
            .set_message_deduplication_id(message.deduplication_id.clone())
            .send()
            .await
            .map_err(|e| sqs_error("SendMessage", queue.as_str(), e))?;

        parse_message_id("SendMessage", output.message_id())
    }

    async fn receive_messages(
        &self,
        queue: &QueueAddress,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, RelayError> {
        let wait_time_seconds = request
            .wait_time
            .map(|wait| i32::try_from(wait.as_secs()).unwrap_or(i32::MAX));

        let output = self
            .sqs
            .receive_message()
            .queue_url(queue.as_str())
            .max_number_of_messages(i32::try_from(request.max_messages).unwrap_or(i32::MAX))
            .set_wait_time_seconds(wait_time_seconds)
            .set_message_attribute_names(Some(request.attribute_names.clone()))
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| sqs_error("ReceiveMessage", queue.as_str(), e))?;

        let mut received = Vec::new();
        for message in output.messages() {
            let Some(receipt) = message.receipt_handle() else {
                debug!(queue = %queue, "Skipping message without receipt handle");
                continue;
            };

            let attributes = message
                .message_attributes()
                .map(|attributes| {
                    attributes
                        .iter()
                        .filter_map(|(name, value)| {
                            value.string_value().map(|v| (name.clone(), v.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();

            let receive_count = message
                .attributes()
                .and_then(|system| system.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);

            received.push(ReceivedMessage {
                message_id: parse_message_id("ReceiveMessage", message.message_id())?,
                receipt_handle: ReceiptHandle::new(receipt),
                body: message.body().unwrap_or_default().to_string(),
                attributes,
                receive_count,
            });
        }

        Ok(received)
    }

    async fn delete_message(
        &self,
        queue: &QueueAddress,
        receipt: &ReceiptHandle,
    ) -> Result<(), RelayError> {
        self.sqs
            .delete_message()
            .queue_url(queue.as_str())
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|e| sqs_error("DeleteMessage", queue.as_str(), e))?;
        Ok(())
    }
}

#[async_trait]
impl TopicTransport for AwsTransport {
    async fn find_topic(&self, name: &str) -> Result<Option<TopicAddress>, RelayError> {
        let mut next_token = None;

        loop {
            let output = self
                .sns
                .list_topics()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sns_error("ListTopics", name, e))?;

            let found = output
                .topics()
                .iter()
                .filter_map(|topic| topic.topic_arn())
                .find(|arn| topic_arn_matches(arn, name));
            if let Some(arn) = found {
                return Ok(Some(TopicAddress::new(arn)));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create_topic(&self, name: &str) -> Result<TopicAddress, RelayError> {
        let output = self
            .sns
            .create_topic()
            .name(name)
            .send()
            .await
            .map_err(|e| sns_error("CreateTopic", name, e))?;

        output
            .topic_arn()
            .map(TopicAddress::new)
            .ok_or_else(|| missing_field("CreateTopic", "TopicArn"))
    }

    async fn delete_topic(&self, topic: &TopicAddress) -> Result<(), RelayError> {
        self.sns
            .delete_topic()
            .topic_arn(topic.as_str())
            .send()
            .await
            .map_err(|e| sns_error("DeleteTopic", topic.as_str(), e))?;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &TopicAddress,
        message: &OutboundMessage,
    ) -> Result<MessageId, RelayError> {
        let mut attributes = HashMap::new();
        for (name, attribute) in &message.attributes {
            let value = aws_sdk_sns::types::MessageAttributeValue::builder()
                .data_type(&attribute.data_type)
                .string_value(&attribute.value)
                .build()
                .map_err(|e| RelayError::transport("Publish", None, e.to_string()))?;
            attributes.insert(name.clone(), value);
        }

        let output = self
            .sns
            .publish()
            .topic_arn(topic.as_str())
            .message(&message.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_group_id(message.group_id.clone())
            .set_message_deduplication_id(message.deduplication_id.clone())
            .send()
            .await
            .map_err(|e| sns_error("Publish", topic.as_str(), e))?;

        parse_message_id("Publish", output.message_id())
    }

    async fn list_subscriptions(
        &self,
        topic: &TopicAddress,
    ) -> Result<Vec<Subscription>, RelayError> {
        let mut subscriptions = Vec::new();
        let mut next_token = None;

        loop {
            let output = self
                .sns
                .list_subscriptions_by_topic()
                .topic_arn(topic.as_str())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sns_error("ListSubscriptionsByTopic", topic.as_str(), e))?;

            subscriptions.extend(output.subscriptions().iter().filter_map(|s| {
                Some(Subscription {
                    id: SubscriptionId::new(s.subscription_arn()?),
                    topic: topic.clone(),
                    protocol: s.protocol().unwrap_or_default().to_string(),
                    endpoint: s.endpoint().unwrap_or_default().to_string(),
                })
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(subscriptions),
            }
        }
    }

    async fn subscribe(
        &self,
        topic: &TopicAddress,
        protocol: &str,
        endpoint: &str,
    ) -> Result<SubscriptionId, RelayError> {
        if protocol.eq_ignore_ascii_case(QUEUE_PROTOCOL) {
            self.grant_topic_send(topic.as_str(), endpoint).await?;
        }

        let output = self
            .sns
            .subscribe()
            .topic_arn(topic.as_str())
            .protocol(protocol)
            .endpoint(endpoint)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|e| sns_error("Subscribe", topic.as_str(), e))?;

        output
            .subscription_arn()
            .map(SubscriptionId::new)
            .ok_or_else(|| missing_field("Subscribe", "SubscriptionArn"))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), RelayError> {
        self.sns
            .unsubscribe()
            .subscription_arn(subscription.as_str())
            .send()
            .await
            .map_err(|e| sns_error("Unsubscribe", subscription.as_str(), e))?;
        Ok(())
    }

    async fn set_subscription_attribute(
        &self,
        subscription: &SubscriptionId,
        name: &str,
        value: &str,
    ) -> Result<(), RelayError> {
        self.sns
            .set_subscription_attributes()
            .subscription_arn(subscription.as_str())
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(|e| sns_error("SetSubscriptionAttributes", subscription.as_str(), e))?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn sqs_error<E>(
    operation: &'static str,
    target: &str,
    error: SdkError<E, aws_sdk_sqs::config::http::HttpResponse>,
) -> RelayError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = error.raw_response().map(|r| r.status().as_u16());
    let code = error.code().unwrap_or_default().to_string();
    classify_error(
        operation,
        target,
        status,
        &code,
        DisplayErrorContext(&error).to_string(),
    )
}

fn sns_error<E>(
    operation: &'static str,
    target: &str,
    error: SdkError<E, aws_sdk_sns::config::http::HttpResponse>,
) -> RelayError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = error.raw_response().map(|r| r.status().as_u16());
    let code = error.code().unwrap_or_default().to_string();
    classify_error(
        operation,
        target,
        status,
        &code,
        DisplayErrorContext(&error).to_string(),
    )
}

/// Map a provider error code onto the relay's error taxonomy
fn classify_error(
    operation: &'static str,
    target: &str,
    status: Option<u16>,
    code: &str,
    message: String,
) -> RelayError {
    if QUEUE_NOT_FOUND_CODES.contains(&code) {
        return RelayError::QueueNotFound {
            queue_name: target.to_string(),
        };
    }

    if code == TOPIC_NOT_FOUND_CODE {
        return RelayError::TopicNotFound {
            topic_name: target.to_string(),
        };
    }

    RelayError::transport(operation, status, message)
}

fn missing_field(operation: &'static str, field: &str) -> RelayError {
    RelayError::transport(operation, None, format!("response carried no {}", field))
}

fn parse_message_id(operation: &'static str, id: Option<&str>) -> Result<MessageId, RelayError> {
    let id = id.ok_or_else(|| missing_field(operation, "MessageId"))?;
    MessageId::from_str(id).map_err(|e| RelayError::transport(operation, None, e.to_string()))
}

fn queue_attribute_map(attributes: &QueueAttributes) -> Option<HashMap<QueueAttributeName, String>> {
    if attributes.is_empty() {
        return None;
    }

    Some(
        attributes
            .iter()
            .filter(|(name, _)| name.as_str() != ALL_ATTRIBUTES)
            .map(|(name, value)| (QueueAttributeName::from(name.as_str()), value.clone()))
            .collect(),
    )
}

/// True when `arn` names the topic called `name`
fn topic_arn_matches(arn: &str, name: &str) -> bool {
    arn.rsplit(':').next() == Some(name)
}

/// Add a statement allowing `topic_arn` to send to `queue_arn`.
///
/// Returns `None` when the policy already grants it.
fn grant_topic_send_policy(
    existing: Option<&str>,
    queue_arn: &str,
    topic_arn: &str,
) -> Result<Option<String>, SerializationError> {
    let mut document: Value = match existing.filter(|p| !p.trim().is_empty()) {
        Some(policy) => serde_json::from_str(policy)?,
        None => json!({ "Version": "2012-10-17", "Statement": [] }),
    };

    let Some(object) = document.as_object_mut() else {
        return Err(SerializationError::InvalidAttribute {
            key: queue_attributes::POLICY.to_string(),
        });
    };

    let statements = object
        .entry("Statement")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !statements.is_array() {
        *statements = Value::Array(vec![statements.take()]);
    }
    let Some(statements) = statements.as_array_mut() else {
        return Err(SerializationError::InvalidAttribute {
            key: queue_attributes::POLICY.to_string(),
        });
    };

    let granted = statements.iter().any(|statement| {
        statement["Condition"]["ArnEquals"]["aws:SourceArn"] == topic_arn
            && statement["Resource"] == queue_arn
    });
    if granted {
        return Ok(None);
    }

    statements.push(json!({
        "Effect": "Allow",
        "Principal": { "Service": "sns.amazonaws.com" },
        "Action": "sqs:SendMessage",
        "Resource": queue_arn,
        "Condition": { "ArnEquals": { "aws:SourceArn": topic_arn } },
    }));

    Ok(Some(serde_json::to_string(&document)?))
}

//! Common test utilities for queue-relay integration tests
//!
//! This module provides:
//! - Tracing setup so relay logs show up with `--nocapture`
//! - A message queue fixture over the in-memory transport
//! - Shared payload types and handler helpers

use queue_relay::{
    Attributes, Handler, InMemoryConfig, InMemoryTransport, MessageQueue, QueueName, RelayConfig,
    TopicName,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a log subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "queue_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// Fixture
// ============================================================================

/// Message queue over a fresh in-memory transport
pub struct Fixture {
    pub transport: Arc<InMemoryTransport>,
    pub relay: MessageQueue<InMemoryTransport>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_transport(InMemoryConfig::default())
    }

    #[allow(dead_code)]
    pub fn with_transport(transport_config: InMemoryConfig) -> Self {
        init_tracing();

        let transport = Arc::new(InMemoryTransport::new(transport_config));
        let config = RelayConfig {
            wait_time_seconds: 0,
            ..RelayConfig::default()
        };
        let relay = MessageQueue::new(Arc::clone(&transport), config);

        Self { transport, relay }
    }
}

// ============================================================================
// Test Data
// ============================================================================

/// Typed payload used across scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Property1")]
    pub property1: String,
}

#[allow(dead_code)]
pub fn event(value: &str) -> Event {
    Event {
        property1: value.to_string(),
    }
}

pub fn queue_name(name: &str) -> QueueName {
    QueueName::new(format!("{}-{}", name, uuid::Uuid::new_v4().simple()))
        .expect("generated queue name should be valid")
}

#[allow(dead_code)]
pub fn topic_name(name: &str) -> TopicName {
    TopicName::new(format!("{}-{}", name, uuid::Uuid::new_v4().simple()))
        .expect("generated topic name should be valid")
}

#[allow(dead_code)]
pub fn attributes(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Receive one batch of raw messages from `queue`, acknowledging each
#[allow(dead_code)]
pub async fn drain_strings(
    relay: &MessageQueue<InMemoryTransport>,
    queue: &QueueName,
) -> Vec<String> {
    let mut seen = Vec::new();
    let mut handler = Handler::single_key(|payload: String, _key, _attributes| {
        seen.push(payload);
        Ok(true)
    });
    relay
        .dequeue_string(queue, &mut handler)
        .await
        .expect("dequeue should succeed");
    drop(handler);
    seen
}

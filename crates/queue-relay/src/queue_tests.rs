//! Tests for the message queue facade.

use super::*;
use crate::message::ReceiveRequest;
use crate::providers::memory::{operations, InMemoryTransport};
use crate::transport::{QueueTransport, TopicTransport};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    #[serde(rename = "Property1")]
    property1: String,
}

fn order(value: &str) -> Order {
    Order {
        property1: value.to_string(),
    }
}

fn config() -> RelayConfig {
    RelayConfig {
        wait_time_seconds: 0,
        ..RelayConfig::default()
    }
}

fn setup() -> (Arc<InMemoryTransport>, MessageQueue<InMemoryTransport>) {
    let transport = Arc::new(InMemoryTransport::default());
    let queue = MessageQueue::new(Arc::clone(&transport), config());
    (transport, queue)
}

fn queue_name(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

fn topic_name(name: &str) -> TopicName {
    TopicName::new(name).unwrap()
}

fn no_attributes() -> Attributes {
    Attributes::new()
}

/// Drain one batch of raw messages, acknowledging each
async fn drain_strings(relay: &MessageQueue<InMemoryTransport>, queue: &QueueName) -> Vec<String> {
    let mut seen = Vec::new();
    let mut handler = Handler::single_key(|payload: String, _key, _attributes| {
        seen.push(payload);
        Ok(true)
    });
    relay.dequeue_string(queue, &mut handler).await.unwrap();
    drop(handler);
    seen
}

// ============================================================================
// Broadcast Tests
// ============================================================================

mod broadcast_tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_creates_topic_on_first_use() {
        let (transport, relay) = setup();

        let sent = relay
            .broadcast(&topic_name("events"), "k", None, &order("x"), &no_attributes())
            .await
            .unwrap();

        assert!(sent);
        assert!(transport.find_topic("events").await.unwrap().is_some());
        assert_eq!(transport.call_count(operations::PUBLISH), 1);
    }

    #[tokio::test]
    async fn test_empty_routing_key_is_rejected() {
        let (transport, relay) = setup();

        let result = relay
            .broadcast_string(&topic_name("events"), " ", None, "m", &no_attributes())
            .await;

        assert!(matches!(result, Err(RelayError::ValidationError(_))));
        assert_eq!(transport.call_count(operations::CREATE_TOPIC), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_yields_false() {
        let (transport, relay) = setup();
        transport.fail_operation(operations::PUBLISH, 500);

        let sent = relay
            .broadcast_string(&topic_name("events"), "k", None, "m", &no_attributes())
            .await
            .unwrap();

        assert!(!sent);
    }

    #[tokio::test]
    async fn test_custom_attributes_are_sanitized_and_cannot_override_routing() {
        let (_transport, relay) = setup();
        let topic = topic_name("events");
        let queue = queue_name("orders");
        relay
            .ensure_subscribed(&topic, &queue, "k", None)
            .await
            .unwrap();

        let mut attributes = Attributes::new();
        attributes.insert("tenant-1".to_string(), "acme 2!".to_string());
        attributes.insert("routingKey".to_string(), "other".to_string());
        attributes.insert("123".to_string(), "dropped".to_string());
        assert!(relay
            .broadcast_string(&topic, "k", None, "m", &attributes)
            .await
            .unwrap());

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|_payload: String, _key, attributes| {
            seen.push(attributes.clone());
            Ok(true)
        });
        relay
            .dequeue_from_topic_string(&topic, &queue, "k", None, &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen.len(), 1);
        let attributes = &seen[0];
        assert_eq!(attributes.get("tenant").map(String::as_str), Some("acme"));
        assert_eq!(attributes.get("routingKey").map(String::as_str), Some("k"));
        assert!(!attributes.contains_key("123"));
        assert!(!attributes.values().any(|v| v == "dropped"));
    }
}

// ============================================================================
// Enqueue Tests
// ============================================================================

mod enqueue_tests {
    use super::*;

    #[tokio::test]
    async fn test_typed_round_trip() {
        let (_transport, relay) = setup();
        let queue = queue_name("orders");

        assert!(relay
            .enqueue(&queue, &order("x"), &no_attributes())
            .await
            .unwrap());

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: Order, key, _attributes| {
            seen.push((payload, key.is_none()));
            Ok(true)
        });
        let ids = relay.dequeue(&queue, &mut handler).await.unwrap();
        drop(handler);

        assert_eq!(ids.len(), 1);
        assert_eq!(seen, vec![(order("x"), true)]);
        assert!(drain_strings(&relay, &queue).await.is_empty());
    }

    #[tokio::test]
    async fn test_raw_round_trip_with_attributes() {
        let (_transport, relay) = setup();
        let queue = queue_name("greetings");
        let mut attributes = Attributes::new();
        attributes.insert("lang".to_string(), "en-GB".to_string());

        assert!(relay
            .enqueue_string(&queue, "hello", &attributes)
            .await
            .unwrap());

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: String, _key, attributes| {
            seen.push((payload, attributes.get("lang").cloned()));
            Ok(true)
        });
        relay.dequeue_string(&queue, &mut handler).await.unwrap();
        drop(handler);

        assert_eq!(
            seen,
            vec![("hello".to_string(), Some("enGB".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_ordered_duplicate_is_suppressed() {
        let (transport, relay) = setup();
        let queue = queue_name("ledger");

        for _ in 0..2 {
            assert!(relay
                .enqueue_string_ordered(&queue, "entry", "g", "dedup-1", &no_attributes())
                .await
                .unwrap());
        }
        assert!(transport.get_queue_address("ledger.fifo").await.is_ok());

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: String, _key, _attributes| {
            seen.push(payload);
            Ok(true)
        });
        relay
            .dequeue_string_ordered(&queue, &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen, vec!["entry".to_string()]);
    }

    #[tokio::test]
    async fn test_ordered_typed_round_trip_keeps_order() {
        let (_transport, relay) = setup();
        let queue = queue_name("ledger");

        for (value, dedup) in [("a", "1"), ("b", "2")] {
            assert!(relay
                .enqueue_ordered(&queue, &order(value), "g", dedup, &no_attributes())
                .await
                .unwrap());
        }

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: Order, _key, _attributes| {
            seen.push(payload.property1);
            Ok(true)
        });
        relay.dequeue_ordered(&queue, &mut handler).await.unwrap();
        drop(handler);

        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_ordered_requires_group_and_deduplication_ids() {
        let (transport, relay) = setup();
        let queue = queue_name("ledger");

        let missing_group = relay
            .enqueue_string_ordered(&queue, "entry", "", "d", &no_attributes())
            .await;
        let missing_dedup = relay
            .enqueue_string_ordered(&queue, "entry", "g", "", &no_attributes())
            .await;

        assert!(matches!(missing_group, Err(RelayError::ValidationError(_))));
        assert!(matches!(missing_dedup, Err(RelayError::ValidationError(_))));
        assert_eq!(transport.call_count(operations::SEND_MESSAGE), 0);
    }

    #[tokio::test]
    async fn test_send_failure_yields_false() {
        let (transport, relay) = setup();
        transport.fail_operation(operations::SEND_MESSAGE, 500);

        let sent = relay
            .enqueue_string(&queue_name("orders"), "m", &no_attributes())
            .await
            .unwrap();

        assert!(!sent);
    }
}

// ============================================================================
// Topic Dequeue Tests
// ============================================================================

mod topic_dequeue_tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribed_queue_once() {
        let (transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");

        // first dequeue subscribes the queue
        let mut handler = Handler::single_key(|_payload: Order, _key, _attributes| Ok(true));
        assert!(relay
            .dequeue_from_topic(&topic, &queue, "k", None, &mut handler)
            .await
            .unwrap()
            .is_empty());

        relay
            .broadcast(&topic, "k", None, &order("x"), &no_attributes())
            .await
            .unwrap();
        relay
            .broadcast(&topic, "other", None, &order("y"), &no_attributes())
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: Order, key, _attributes| {
            seen.push((payload, key.map(str::to_string)));
            Ok(true)
        });
        relay
            .dequeue_from_topic(&topic, &queue, "k", None, &mut handler)
            .await
            .unwrap();
        let after = relay
            .dequeue_from_topic(&topic, &queue, "k", None, &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen, vec![(order("x"), Some("k".to_string()))]);
        assert!(after.is_empty());
        assert_eq!(transport.call_count(operations::SUBSCRIBE), 1);
    }

    #[tokio::test]
    async fn test_meta_key_subscription() {
        let (_transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");
        relay
            .ensure_subscribed(&topic, &queue, "k", Some("eu"))
            .await
            .unwrap();

        for meta in ["eu", "us"] {
            relay
                .broadcast_string(&topic, "k", Some(meta), meta, &no_attributes())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut handler = Handler::single_key(|payload: String, _key, _attributes| {
            seen.push(payload);
            Ok(true)
        });
        relay
            .dequeue_from_topic_string(&topic, &queue, "k", Some("eu"), &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen, vec!["eu".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_key_dequeue() {
        let (_transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");
        let keys = vec!["created".to_string(), "deleted".to_string()];
        relay
            .ensure_subscribed_multi(&topic, &queue, &keys, None)
            .await
            .unwrap();

        for key in ["created", "updated", "deleted"] {
            relay
                .broadcast(&topic, key, None, &order(key), &no_attributes())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut handler =
            Handler::multi_key_with_origin_topic(|payload: Order, origin, keys, _attributes| {
                seen.push((payload.property1, origin.cloned(), keys.len()));
                Ok(true)
            });
        relay
            .dequeue_from_topic_multi(&topic, &queue, &keys, None, &mut handler)
            .await
            .unwrap();
        drop(handler);

        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            seen,
            vec![
                ("created".to_string(), Some(topic.clone()), 2),
                ("deleted".to_string(), Some(topic.clone()), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_multi_key_string_dequeue() {
        let (_transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");
        let keys = vec!["a".to_string(), "b".to_string()];

        let mut handler = Handler::multi_key(|_payload: String, _keys, _attributes| Ok(true));
        relay
            .dequeue_from_topic_multi_string(&topic, &queue, &keys, None, &mut handler)
            .await
            .unwrap();

        relay
            .broadcast_string(&topic, "b", None, "hello", &no_attributes())
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut handler = Handler::multi_key(|payload: String, _keys, _attributes| {
            seen.push(payload);
            Ok(true)
        });
        relay
            .dequeue_from_topic_multi_string(&topic, &queue, &keys, None, &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_key_dequeue_with_meta_key_skips_other_meta_keys() {
        let (_transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");
        let keys = vec!["a".to_string(), "b".to_string()];
        relay
            .ensure_subscribed_multi(&topic, &queue, &keys, Some("wanted"))
            .await
            .unwrap();

        for (key, meta) in [("a", "wanted"), ("b", "other")] {
            relay
                .broadcast_string(&topic, key, Some(meta), meta, &no_attributes())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut handler = Handler::multi_key(|payload: String, _keys, _attributes| {
            seen.push(payload);
            Ok(true)
        });
        relay
            .dequeue_from_topic_multi_string(&topic, &queue, &keys, Some("wanted"), &mut handler)
            .await
            .unwrap();
        drop(handler);

        assert_eq!(seen, vec!["wanted".to_string()]);
    }

    #[tokio::test]
    async fn test_subscription_failure_propagates_before_receiving() {
        let (transport, relay) = setup();
        transport.fail_operation(operations::SUBSCRIBE, 500);

        let mut handler = Handler::single_key(|_payload: String, _key, _attributes| Ok(true));
        let result = relay
            .dequeue_from_topic_string(
                &topic_name("T"),
                &queue_name("Q"),
                "k",
                None,
                &mut handler,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(transport.call_count(operations::RECEIVE_MESSAGE), 0);
    }
}

// ============================================================================
// Administration Tests
// ============================================================================

mod admin_tests {
    use super::*;
    use crate::subscriptions::InMemorySubscriptionCache;

    #[tokio::test]
    async fn test_create_and_delete_queue() {
        let (transport, relay) = setup();
        let queue = queue_name("orders");

        let address = relay.create_queue(&queue, false).await.unwrap();
        assert_eq!(relay.create_queue(&queue, false).await, Some(address));

        assert!(relay.delete_queue(&queue, None, false).await);
        assert!(transport
            .get_queue_address("orders")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(transport
            .get_queue_address("orders-dl")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_deleting_queue_forgets_its_subscription() {
        let (transport, relay) = setup();
        let topic = topic_name("T");
        let queue = queue_name("Q");

        assert!(relay
            .ensure_subscribed(&topic, &queue, "k", None)
            .await
            .unwrap());
        assert!(relay.delete_queue(&queue, Some(&topic), false).await);

        let topic_address = transport.find_topic("T").await.unwrap().unwrap();
        assert!(transport
            .list_subscriptions(&topic_address)
            .await
            .unwrap()
            .is_empty());

        // resubscribes instead of trusting the stale memo
        assert!(relay
            .ensure_subscribed(&topic, &queue, "k", None)
            .await
            .unwrap());
        assert_eq!(transport.call_count(operations::SUBSCRIBE), 2);

        relay
            .broadcast_string(&topic, "k", None, "after", &no_attributes())
            .await
            .unwrap();
        let queue_address = transport.get_queue_address("Q").await.unwrap();
        let delivered = transport
            .receive_messages(&queue_address, &ReceiveRequest::all_attributes(10, None))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_topic() {
        let (transport, relay) = setup();
        let topic = topic_name("T");
        relay
            .ensure_subscribed(&topic, &queue_name("Q"), "k", None)
            .await
            .unwrap();

        assert!(relay.delete_topic(&topic).await);
        assert!(transport.find_topic("T").await.unwrap().is_none());

        // the memo no longer short-circuits
        relay
            .ensure_subscribed(&topic, &queue_name("Q"), "k", None)
            .await
            .unwrap();
        assert_eq!(transport.call_count(operations::CREATE_TOPIC), 2);
    }

    #[tokio::test]
    async fn test_close_clears_shared_cache() {
        let transport = Arc::new(InMemoryTransport::default());
        let cache = Arc::new(InMemorySubscriptionCache::new());
        let relay = MessageQueue::with_cache(Arc::clone(&transport), config(), cache.clone());

        relay
            .ensure_subscribed(&topic_name("T"), &queue_name("Q"), "k", None)
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);

        relay.close().await;

        assert!(cache.is_empty().await);
        assert_eq!(Arc::strong_count(&transport), 1);
    }

    #[test]
    fn test_config_is_exposed() {
        let (_transport, relay) = setup();
        assert_eq!(relay.config().wait_time_seconds, 0);
        assert_eq!(relay.config().max_messages, 10);
    }
}

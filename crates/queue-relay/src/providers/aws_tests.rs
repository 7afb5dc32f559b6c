//! Tests for the AWS transport helpers.
//!
//! These cover the request shaping and error mapping that do not need a live
//! endpoint.

use super::*;

// ============================================================================
// Error Mapping Tests
// ============================================================================

mod error_mapping_tests {
    use super::*;

    #[test]
    fn test_missing_queue_codes_map_to_not_found() {
        for code in QUEUE_NOT_FOUND_CODES {
            let error = classify_error("GetQueueUrl", "orders", Some(400), code, "gone".into());
            assert!(matches!(
                &error,
                RelayError::QueueNotFound { queue_name } if queue_name == "orders"
            ));
            assert!(error.is_not_found());
        }
    }

    #[test]
    fn test_missing_topic_maps_to_not_found() {
        let error = classify_error(
            "DeleteTopic",
            "arn:aws:sns:us-east-1:1:events",
            Some(404),
            "NotFound",
            "gone".into(),
        );

        assert!(matches!(error, RelayError::TopicNotFound { .. }));
    }

    #[test]
    fn test_other_codes_keep_status() {
        let error = classify_error(
            "Publish",
            "arn:aws:sns:us-east-1:1:events",
            Some(503),
            "ServiceUnavailable",
            "try later".into(),
        );

        match &error {
            RelayError::Transport {
                operation,
                status,
                message,
            } => {
                assert_eq!(operation, "Publish");
                assert_eq!(*status, Some(503));
                assert_eq!(message, "try later");
            }
            other => panic!("expected transport error, got {:?}", other),
        }
        assert!(error.is_transient());
    }

    #[test]
    fn test_missing_message_id_is_a_transport_error() {
        assert!(matches!(
            parse_message_id("SendMessage", None),
            Err(RelayError::Transport { .. })
        ));
        assert_eq!(
            parse_message_id("SendMessage", Some("abc-123"))
                .unwrap()
                .as_str(),
            "abc-123"
        );
    }
}

// ============================================================================
// Request Shaping Tests
// ============================================================================

mod request_tests {
    use super::*;

    #[test]
    fn test_topic_arn_matches_whole_name_only() {
        let arn = "arn:aws:sns:us-east-1:123456789012:events";

        assert!(topic_arn_matches(arn, "events"));
        assert!(!topic_arn_matches(arn, "vents"));
        assert!(!topic_arn_matches("arn:aws:sns:us-east-1:123456789012:old-events", "events"));
    }

    #[test]
    fn test_empty_queue_attributes_are_omitted() {
        assert!(queue_attribute_map(&QueueAttributes::new()).is_none());

        let mut attributes = QueueAttributes::new();
        attributes.insert(queue_attributes::FIFO_QUEUE.to_string(), "true".to_string());
        let mapped = queue_attribute_map(&attributes).unwrap();

        assert_eq!(
            mapped.get(&QueueAttributeName::FifoQueue).map(String::as_str),
            Some("true")
        );
    }
}

// ============================================================================
// Queue Policy Tests
// ============================================================================

mod policy_tests {
    use super::*;

    const QUEUE_ARN: &str = "arn:aws:sqs:us-east-1:1:orders";
    const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:1:events";

    #[test]
    fn test_grant_creates_policy_when_absent() {
        let policy = grant_topic_send_policy(None, QUEUE_ARN, TOPIC_ARN)
            .unwrap()
            .unwrap();
        let document: Value = serde_json::from_str(&policy).unwrap();

        let statements = document["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Resource"], QUEUE_ARN);
        assert_eq!(statements[0]["Action"], "sqs:SendMessage");
        assert_eq!(
            statements[0]["Condition"]["ArnEquals"]["aws:SourceArn"],
            TOPIC_ARN
        );
    }

    #[test]
    fn test_grant_is_idempotent() {
        let policy = grant_topic_send_policy(None, QUEUE_ARN, TOPIC_ARN)
            .unwrap()
            .unwrap();

        assert_eq!(
            grant_topic_send_policy(Some(&policy), QUEUE_ARN, TOPIC_ARN).unwrap(),
            None
        );
    }

    #[test]
    fn test_grant_keeps_existing_statements() {
        let first = grant_topic_send_policy(None, QUEUE_ARN, TOPIC_ARN)
            .unwrap()
            .unwrap();
        let second = grant_topic_send_policy(
            Some(&first),
            QUEUE_ARN,
            "arn:aws:sns:us-east-1:1:billing",
        )
        .unwrap()
        .unwrap();

        let document: Value = serde_json::from_str(&second).unwrap();
        assert_eq!(document["Statement"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_single_statement_object_is_wrapped() {
        let existing = r#"{"Version":"2012-10-17","Statement":{"Effect":"Deny"}}"#;

        let policy = grant_topic_send_policy(Some(existing), QUEUE_ARN, TOPIC_ARN)
            .unwrap()
            .unwrap();

        let document: Value = serde_json::from_str(&policy).unwrap();
        let statements = document["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Effect"], "Deny");
    }

    #[test]
    fn test_malformed_policy_is_rejected() {
        assert!(grant_topic_send_policy(Some("not json"), QUEUE_ARN, TOPIC_ARN).is_err());
        assert!(grant_topic_send_policy(Some("[]"), QUEUE_ARN, TOPIC_ARN).is_err());
    }
}

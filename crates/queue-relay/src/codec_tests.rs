//! Tests for payload encoding and envelope decoding.

use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    #[serde(rename = "Property1")]
    property1: String,
    count: u32,
}

// ============================================================================
// Payload Encoding Tests
// ============================================================================

mod payload_tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let sample = Sample {
            property1: "x".to_string(),
            count: 7,
        };

        let encoded = encode_typed(&sample).unwrap();
        assert_eq!(encoded, r#"{"Property1":"x","count":7}"#);
        assert_eq!(decode_typed::<Sample>(&encoded).unwrap(), sample);
    }

    #[test]
    fn test_decode_typed_rejects_wrong_shape() {
        let result = decode_typed::<Sample>(r#"{"unexpected":true}"#);
        assert!(matches!(result, Err(SerializationError::JsonError(_))));
    }

    #[test]
    fn test_raw_round_trip() {
        for text in ["hello", "", "päyload with ünicode", "{\"json\":\"inside\"}", "a\nb\tc"] {
            assert_eq!(decode_raw(&encode_raw(text)), text);
        }
    }

    #[test]
    fn test_raw_encoding_is_base64() {
        assert_eq!(encode_raw("hello"), "aGVsbG8=");
    }

    #[test]
    fn test_decode_raw_passes_through_unencoded_text() {
        // wrong length
        assert_eq!(decode_raw("hello world"), "hello world");
        // right length, wrong alphabet
        assert_eq!(decode_raw("ab!d"), "ab!d");
        // valid base64 whose bytes are not UTF-8
        assert_eq!(decode_raw("/w=="), "/w==");
    }

    #[test]
    fn test_is_base64() {
        assert!(is_base64("aGVsbG8="));
        assert!(is_base64("  aGVsbG8=  "));
        assert!(is_base64(""));
        assert!(!is_base64("aGVsbG8"));
        assert!(!is_base64("aGV-bG8="));
    }
}

// ============================================================================
// Envelope Tests
// ============================================================================

mod envelope_tests {
    use super::*;

    const NOTIFICATION: &str = r#"{
        "Type": "Notification",
        "MessageId": "8c1f",
        "TopicArn": "arn:aws:sns:eu-west-1:000000000000:events",
        "Message": "{\"Property1\":\"x\",\"count\":1}",
        "Timestamp": "2024-01-01T00:00:00.000Z",
        "MessageAttributes": {
            "routingKey": { "Type": "String", "Value": "k" },
            "metaKey": { "Type": "String", "Value": "m" }
        }
    }"#;

    #[test]
    fn test_unwraps_topic_envelope() {
        let envelope = decode_envelope(NOTIFICATION, true).unwrap();

        assert_eq!(
            envelope.topic_payload.as_deref(),
            Some(r#"{"Property1":"x","count":1}"#)
        );
        assert_eq!(envelope.attributes.get("routingKey").map(String::as_str), Some("k"));
        assert_eq!(envelope.attributes.get("metaKey").map(String::as_str), Some("m"));
        assert_eq!(envelope.payload(NOTIFICATION), r#"{"Property1":"x","count":1}"#);
    }

    #[test]
    fn test_invalid_topic_envelope_is_an_error() {
        let result = decode_envelope("aGVsbG8=", true);
        assert!(matches!(
            result,
            Err(SerializationError::InvalidEnvelope { .. })
        ));
    }

    #[test]
    fn test_direct_body_has_no_topic_payload() {
        let body = r#"{"Property1":"x","count":1}"#;
        let envelope = decode_envelope(body, false).unwrap();

        assert!(envelope.topic_payload.is_none());
        assert!(envelope.attributes.is_empty());
        assert_eq!(envelope.payload(body), body);
    }

    #[test]
    fn test_non_json_body_yields_no_attributes() {
        let envelope = decode_envelope("aGVsbG8=", false).unwrap();
        assert!(envelope.attributes.is_empty());
    }
}

// ============================================================================
// Attribute Tests
// ============================================================================

mod attribute_tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_non_letters() {
        assert_eq!(sanitize_attribute("tenant-42_id"), "tenantid");
        assert_eq!(sanitize_attribute("Région"), "Rgion");
        assert_eq!(sanitize_attribute("123"), "");
    }

    #[test]
    fn test_sanitize_attributes_drops_empty_entries() {
        let attributes = sanitize_attributes([
            ("tenant-1", "acme.corp"),
            ("42", "value"),
            ("region", "  "),
            ("zone", "99"),
        ]);

        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes["tenant"], CustomAttribute::string("acmecorp"));
    }

    #[test]
    fn test_sanitize_attributes_skips_reserved_names() {
        let attributes = sanitize_attributes([("routingKey", "override"), ("meta-Key", "x")]);
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_routing_attributes() {
        let attributes = routing_attributes("k", None);
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[ROUTING_KEY_NAME].value, "k");

        let attributes = routing_attributes("k", Some("m"));
        assert_eq!(attributes[META_KEY_NAME].value, "m");
        assert_eq!(attributes[META_KEY_NAME].data_type, "String");

        let attributes = routing_attributes("k", Some(" "));
        assert!(!attributes.contains_key(META_KEY_NAME));
    }
}

//! Payload encoding and inbound envelope decoding.
//!
//! Two payload encodings are supported:
//! - typed payloads are serialized as JSON
//! - raw strings are base64 encoded so arbitrary text survives the transport
//!
//! Messages delivered through a topic arrive wrapped in the topic's
//! notification envelope; [`decode_envelope`] unwraps it and extracts the
//! message attributes carried alongside the payload.

use crate::error::SerializationError;
use crate::message::{CustomAttribute, META_KEY_NAME, ROUTING_KEY_NAME};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

/// Serialize a typed payload to JSON
pub fn encode_typed<T: Serialize>(payload: &T) -> Result<String, SerializationError> {
    Ok(serde_json::to_string(payload)?)
}

/// Deserialize a JSON payload into a typed value
pub fn decode_typed<T: DeserializeOwned>(text: &str) -> Result<T, SerializationError> {
    Ok(serde_json::from_str(text)?)
}

/// Base64 encode a raw string payload
pub fn encode_raw(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Reverse [`encode_raw`].
///
/// Input that is not well-formed base64, or that does not decode to UTF-8, is
/// returned unchanged.
pub fn decode_raw(text: &str) -> String {
    if !is_base64(text) {
        return text.to_string();
    }

    match STANDARD.decode(text.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded) => decoded,
            Err(_) => text.to_string(),
        },
        Err(_) => text.to_string(),
    }
}

/// True when the trimmed input has base64 length and alphabet
pub fn is_base64(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    let trimmed = text.trim();
    if trimmed.len() % 4 != 0 {
        return false;
    }

    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9\+/]*={0,3}$").expect("static regex is valid"))
        .is_match(trimmed)
}

// ============================================================================
// Envelope Decoding
// ============================================================================

/// A decoded inbound message body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Inner payload extracted from a topic envelope, when one was unwrapped
    pub topic_payload: Option<String>,
    /// Message attributes reduced to name and value
    pub attributes: HashMap<String, String>,
}

impl Envelope {
    /// The payload text to hand to the handler
    pub fn payload<'a>(&'a self, body: &'a str) -> &'a str {
        self.topic_payload.as_deref().unwrap_or(body)
    }
}

#[derive(Debug, Deserialize)]
struct TopicNotification {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct AttributesWrapper {
    #[serde(rename = "MessageAttributes", default)]
    message_attributes: HashMap<String, CustomAttribute>,
}

/// Decode an inbound message body.
///
/// When `unwrap_topic_envelope` is set the body must be a topic notification;
/// its inner message becomes [`Envelope::topic_payload`]. The attribute map is
/// always read from the body's `MessageAttributes` member. Bodies that carry
/// no such member, or that are not JSON at all, yield an empty map.
pub fn decode_envelope(
    body: &str,
    unwrap_topic_envelope: bool,
) -> Result<Envelope, SerializationError> {
    let topic_payload = if unwrap_topic_envelope {
        let notification: TopicNotification =
            serde_json::from_str(body).map_err(|e| SerializationError::InvalidEnvelope {
                message: e.to_string(),
            })?;
        Some(notification.message)
    } else {
        None
    };

    let attributes = serde_json::from_str::<AttributesWrapper>(body)
        .unwrap_or_default()
        .message_attributes
        .into_iter()
        .map(|(name, attribute)| (name, attribute.value))
        .collect();

    Ok(Envelope {
        topic_payload,
        attributes,
    })
}

// ============================================================================
// Attribute Construction
// ============================================================================

/// Strip every character that is not an ASCII letter
pub fn sanitize_attribute(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

/// Sanitize caller-supplied attributes for sending.
///
/// Attributes whose name or value is empty after sanitizing are dropped, as
/// are attributes that would shadow the routing attributes.
pub fn sanitize_attributes<I, K, V>(attributes: I) -> BTreeMap<String, CustomAttribute>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sanitized = BTreeMap::new();

    for (name, value) in attributes {
        let clean_name = sanitize_attribute(name.as_ref());
        let clean_value = sanitize_attribute(value.as_ref());

        if clean_name.is_empty() || clean_value.is_empty() {
            debug!(attribute = name.as_ref(), "Dropping attribute empty after sanitizing");
            continue;
        }

        if clean_name == ROUTING_KEY_NAME || clean_name == META_KEY_NAME {
            debug!(attribute = %clean_name, "Dropping attribute with reserved name");
            continue;
        }

        sanitized.insert(clean_name, CustomAttribute::string(clean_value));
    }

    sanitized
}

/// Routing attributes attached to every broadcast
pub fn routing_attributes(
    routing_key: &str,
    meta_key: Option<&str>,
) -> BTreeMap<String, CustomAttribute> {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        ROUTING_KEY_NAME.to_string(),
        CustomAttribute::string(routing_key),
    );

    if let Some(meta) = meta_key.filter(|m| !m.trim().is_empty()) {
        attributes.insert(META_KEY_NAME.to_string(), CustomAttribute::string(meta));
    }

    attributes
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

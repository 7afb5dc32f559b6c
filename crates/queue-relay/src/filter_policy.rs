//! Subscription filter policies.
//!
//! A policy selects broadcasts by their routing attributes. Its JSON form is
//! part of the wire contract with the transport: the routing-key clause comes
//! first, the optional meta-key clause second, and every clause is an array of
//! literal values.

use crate::error::SerializationError;
use crate::message::{META_KEY_NAME, ROUTING_KEY_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute filter attached to a topic subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Accepted routing keys (any of)
    #[serde(rename = "routingKey")]
    pub routing_key: Vec<String>,

    /// Accepted meta keys (any of); absent means the meta key is not filtered
    #[serde(rename = "metaKey", default, skip_serializing_if = "Option::is_none")]
    pub meta_key: Option<Vec<String>>,
}

impl FilterPolicy {
    /// Policy for one routing key and an optional meta key
    pub fn single(routing_key: &str, meta_key: Option<&str>) -> Self {
        Self {
            routing_key: vec![routing_key.to_string()],
            meta_key: meta_key
                .filter(|m| !m.trim().is_empty())
                .map(|m| vec![m.to_string()]),
        }
    }

    /// Policy accepting any of the given routing keys, and an optional meta key
    pub fn multi<S: AsRef<str>>(routing_keys: &[S], meta_key: Option<&str>) -> Self {
        Self {
            routing_key: routing_keys
                .iter()
                .map(|k| k.as_ref().to_string())
                .collect(),
            meta_key: meta_key
                .filter(|m| !m.trim().is_empty())
                .map(|m| vec![m.to_string()]),
        }
    }

    /// Serialize to the transport's filter-policy JSON
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a filter-policy JSON document
    pub fn from_json(text: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Evaluate the policy against a message's string attributes.
    ///
    /// Every clause must match; a clause matches when the attribute is present
    /// and its value is one of the listed literals.
    pub fn matches(&self, attributes: &HashMap<String, String>) -> bool {
        let clause_matches = |name: &str, accepted: &[String]| {
            attributes
                .get(name)
                .is_some_and(|value| accepted.iter().any(|a| a == value))
        };

        if !clause_matches(ROUTING_KEY_NAME, &self.routing_key) {
            return false;
        }

        match &self.meta_key {
            Some(accepted) => clause_matches(META_KEY_NAME, accepted),
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "filter_policy_tests.rs"]
mod tests;

//! Message test case model
//!
//! A test case describes one message published to the broker: the routing
//! key, the JSON payload and optional extra request headers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A stored message test case
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub route_key: String,
    #[serde(default)]
    pub json_pool: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, route_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route_key: route_key.into(),
            json_pool: Map::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.json_pool = payload;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.route_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal() {
        let tc: TestCase =
            serde_json::from_value(json!({"name": "ping", "route_key": "q.ping"})).unwrap();
        assert_eq!(tc.name, "ping");
        assert!(tc.json_pool.is_empty());
        assert!(tc.headers.is_empty());
    }

    #[test]
    fn test_builder() {
        let mut payload = Map::new();
        payload.insert("id".into(), json!(7));
        let tc = TestCase::new("order", "q.orders")
            .with_payload(payload)
            .with_header("x-zone", "eu");
        assert_eq!(tc.json_pool["id"], 7);
        assert_eq!(tc.headers.get("x-zone").map(String::as_str), Some("eu"));
        assert_eq!(tc.to_string(), "order -> q.orders");
    }
}

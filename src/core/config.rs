//! Opaque per-stage configuration.
//!
//! The engine applies a configuration map exactly once, when the stage is
//! created (before its first state transition), and never re-applies it.
//! Values are uninterpreted by the core; destination addresses, model
//! paths, resolutions and the like belong to the stage collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque key/value configuration for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageConfig(BTreeMap<String, Value>);

impl StageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let cfg = StageConfig::new()
            .with("host", "192.168.1.127")
            .with("port", 8001)
            .with("sync", false);

        assert_eq!(cfg.get_str("host"), Some("192.168.1.127"));
        assert_eq!(cfg.get_u64("port"), Some(8001));
        assert_eq!(cfg.get_bool("sync"), Some(false));
        assert_eq!(cfg.get_str("missing"), None);
    }

    #[test]
    fn test_wrong_type_returns_none() {
        let cfg = StageConfig::new().with("port", 8001);
        assert_eq!(cfg.get_str("port"), None);
        assert_eq!(cfg.get_bool("port"), None);
    }

    #[test]
    fn test_deserialize_from_json() {
        let cfg: StageConfig =
            serde_json::from_str(r#"{"bitrate": 4000000, "insert-sps-pps": true}"#).unwrap();
        assert_eq!(cfg.get_u64("bitrate"), Some(4_000_000));
        assert_eq!(cfg.get_bool("insert-sps-pps"), Some(true));
    }
}

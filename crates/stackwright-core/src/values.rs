//! Helm values emitted by factories

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A Helm values document
///
/// Factories build their defaults, then layer the `values` overrides of the
/// configuration document on top with [`Values::merge`]. Overrides follow
/// `helm --values` semantics: maps merge key by key, everything else is
/// replaced, and a `null` removes the key from the chart defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(JsonValue);

impl Values {
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    pub fn merge(&mut self, overrides: &Values) {
        overlay(&mut self.0, &overrides.0);
    }

    /// Set `value` at a dotted key such as `ingress.tls`
    ///
    /// Scalars found along the way are replaced by maps.
    pub fn set(&mut self, key: &str, value: JsonValue) {
        let mut cursor = &mut self.0;
        for part in key.split('.') {
            if !cursor.is_object() {
                *cursor = JsonValue::Object(Map::new());
            }
            cursor = match cursor {
                JsonValue::Object(map) => map.entry(part).or_insert(JsonValue::Null),
                _ => return,
            };
        }
        *cursor = value;
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        key.split('.')
            .try_fold(&self.0, |cursor, part| cursor.as_object()?.get(part))
    }
}

impl From<JsonValue> for Values {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

fn overlay(base: &mut JsonValue, overrides: &JsonValue) {
    let (JsonValue::Object(base), JsonValue::Object(overrides)) = (&mut *base, overrides) else {
        *base = overrides.clone();
        return;
    };
    for (key, value) in overrides {
        if value.is_null() {
            base.remove(key);
            continue;
        }
        match base.get_mut(key) {
            Some(existing) => overlay(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_merge_into_defaults() {
        let mut values = Values::from(json!({
            "persistence": {"enabled": true, "size": "8Gi"},
            "replicas": 1,
        }));
        values.merge(&Values::from(json!({
            "persistence": {"size": "20Gi"},
            "replicas": 3,
        })));

        assert_eq!(values.get("persistence.enabled"), Some(&json!(true)));
        assert_eq!(values.get("persistence.size"), Some(&json!("20Gi")));
        assert_eq!(values.get("replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_null_override_removes_default() {
        let mut values = Values::from(json!({"ingress": {"annotations": {"a": "b"}, "enabled": true}}));
        values.merge(&Values::from(json!({"ingress": {"annotations": null}})));

        assert_eq!(values.get("ingress.annotations"), None);
        assert_eq!(values.get("ingress.enabled"), Some(&json!(true)));
    }

    #[test]
    fn test_lists_are_replaced() {
        let mut values = Values::from(json!({"hosts": ["a", "b"]}));
        values.merge(&Values::from(json!({"hosts": ["c"]})));
        assert_eq!(values.get("hosts"), Some(&json!(["c"])));
    }

    #[test]
    fn test_set_builds_intermediate_maps() {
        let mut values = Values::from(json!({"ingress": false}));
        values.set("ingress.enabled", json!(true));
        values.set("ingress.host", json!("longhorn.example.com"));

        assert_eq!(
            values,
            Values::from(json!({"ingress": {"enabled": true, "host": "longhorn.example.com"}}))
        );
    }
}

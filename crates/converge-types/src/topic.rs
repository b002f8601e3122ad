//! Routing topics
//!
//! A topic is a routing and filter label: a namespace, a sorted attribute
//! map, and a version. The canonical string form is what crosses the wire
//! inside signed messages, so its rendering must be stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic for routing and semantic filtering
///
/// Attributes are held in a B-tree map so iteration (and therefore the
/// canonical string) is sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Routing namespace (e.g. `"tasks.compute"`, `"transport.tcp"`)
    pub namespace: String,
    /// Scalar attributes (e.g. `host`, `port` for the TCP transport)
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Topic schema version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Topic {
    /// Create a topic with no attributes and the default version
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: BTreeMap::new(),
            version: default_version(),
        }
    }

    /// Add an attribute, returning the updated topic
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a string attribute
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Get an integer attribute, tolerating numeric strings
    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Canonical string form: `{namespace}[k1=v1,k2=v2]v{version}`
    ///
    /// Attributes are sorted by key; scalar values render without quotes.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Parse a canonical topic string back into a topic
    ///
    /// Attribute values come back as booleans, numbers, or strings; the
    /// unquoted rendering cannot distinguish `"9000"` from `9000`, which is
    /// why attribute accessors tolerate numeric strings.
    pub fn parse_canonical(s: &str) -> Option<Self> {
        let open = s.find('[')?;
        let close = s.rfind("]v")?;
        if close < open {
            return None;
        }
        let namespace = s[..open].to_string();
        let version = s[close + 2..].to_string();
        if namespace.is_empty() || version.is_empty() {
            return None;
        }

        let mut attributes = BTreeMap::new();
        let attrs = &s[open + 1..close];
        if !attrs.is_empty() {
            for pair in attrs.split(',') {
                let (key, raw) = pair.split_once('=')?;
                attributes.insert(key.to_string(), parse_scalar(raw));
            }
        }

        Some(Self {
            namespace,
            attributes,
            version,
        })
    }
}

fn parse_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                Value::from(f)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_scalar(v)))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}[{}]v{}", self.namespace, attrs, self.version)
    }
}

//! Label sets and the label codec
//!
//! A metric declares an ordered list of label names at registration. Every
//! label map handed to a mutation is projected onto that schema and hashed
//! into the key of the value slot it addresses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between label values in a slot key
pub const LABEL_SEPARATOR: char = '|';

/// Label name → value map attached to a metric observation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, Value>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Labels
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Hash a label map onto a metric's declared label names
///
/// Walks `label_names` in order. Missing and null labels encode as the empty
/// string, strings are escaped so `|` inside a value cannot collide with the
/// separator, arrays and objects are JSON-encoded. Labels not named in the
/// schema are ignored, so key order and extra keys never change the result.
pub fn hash_labels(labels: Option<&Labels>, label_names: &[String]) -> String {
    if label_names.is_empty() {
        return String::new();
    }

    let mut key = String::new();
    for (i, name) in label_names.iter().enumerate() {
        if i > 0 {
            key.push(LABEL_SEPARATOR);
        }
        if let Some(value) = labels.and_then(|l| l.get(name)) {
            encode_value(value, &mut key);
        }
    }
    key
}

/// Keep only the labels named in the schema
pub fn project_labels(labels: Option<&Labels>, label_names: &[String]) -> Labels {
    let Some(labels) = labels else {
        return Labels::new();
    };
    label_names
        .iter()
        .filter_map(|name| {
            labels
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| (name.clone(), v.clone()))
        })
        .collect()
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            for c in s.chars() {
                if c == '\\' || c == LABEL_SEPARATOR {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(_) | Value::Object(_) => out.push_str(&value.to_string()),
    }
}

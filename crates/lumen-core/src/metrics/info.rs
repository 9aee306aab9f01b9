//! Info metrics - arbitrary informational payloads

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::labels::Labels;
use super::types::{SnapshotValue, ValueSnapshot};

#[derive(Debug, Default)]
pub(crate) struct InfoState {
    values: BTreeMap<String, InfoRecord>,
}

#[derive(Debug)]
struct InfoRecord {
    value: Value,
    labels: Labels,
    timestamp: DateTime<Utc>,
}

impl InfoRecord {
    fn snapshot(&self, key: &str) -> ValueSnapshot {
        ValueSnapshot {
            key: key.to_string(),
            labels: self.labels.clone(),
            timestamp: self.timestamp,
            value: SnapshotValue::Info {
                value: self.value.clone(),
            },
        }
    }
}

impl InfoState {
    pub(crate) fn set(&mut self, key: &str, labels: &Labels, value: Value, timestamp: DateTime<Utc>) {
        self.values.insert(
            key.to_string(),
            InfoRecord {
                value,
                labels: labels.clone(),
                timestamp,
            },
        );
    }

    pub(crate) fn reset(&mut self, key: &str, labels: &Labels, timestamp: DateTime<Utc>) {
        self.set(key, labels, Value::Null, timestamp);
    }

    pub(crate) fn reset_all(&mut self, timestamp: DateTime<Utc>) -> Vec<(Value, Labels)> {
        self.values
            .values_mut()
            .map(|record| {
                record.value = Value::Null;
                record.timestamp = timestamp;
                (Value::Null, record.labels.clone())
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    pub(crate) fn get(&self, key: &str) -> Option<ValueSnapshot> {
        self.values.get(key).map(|record| record.snapshot(key))
    }

    pub(crate) fn snapshot(&self) -> Vec<ValueSnapshot> {
        self.values
            .iter()
            .map(|(key, record)| record.snapshot(key))
            .collect()
    }
}

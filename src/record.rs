//! Schemaless result records as returned by a graph driver.

use serde_json::Value as JsonValue;

use crate::data::Value;

/// One item of a record: a node/relationship with properties, or a scalar
/// return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(Vec<(String, Value)>),
    Scalar(Value),
}

/// One result record: ordered `(name, item)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    items: Vec<(String, Item)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node<I, K, V>(mut self, name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let properties = properties
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.items.push((name.into(), Item::Node(properties)));
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.push((name.into(), Item::Scalar(value.into())));
        self
    }

    pub fn items(&self) -> &[(String, Item)] {
        &self.items
    }

    pub fn into_items(self) -> Vec<(String, Item)> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<(String, Item)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Item)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Field name a scalar item contributes: everything after the first
/// segment, so `n.name` becomes `name` and `n.address.city` becomes
/// `address.city`.
pub fn scalar_field_name(item_name: &str) -> &str {
    item_name
        .split_once('.')
        .map_or(item_name, |(_, rest)| rest)
}

pub fn value_from_json(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Long(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Converts a JSON array of objects into records: object members become
/// node items, everything else a scalar item.
pub fn records_from_json(json: &JsonValue) -> Result<Vec<Record>, serde_json::Error> {
    let rows: Vec<serde_json::Map<String, JsonValue>> = serde_json::from_value(json.clone())?;
    Ok(rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(name, value)| {
                    let item = match value {
                        JsonValue::Object(properties) => Item::Node(
                            properties
                                .iter()
                                .map(|(key, value)| (key.clone(), value_from_json(value)))
                                .collect(),
                        ),
                        scalar => Item::Scalar(value_from_json(scalar)),
                    };
                    (name.clone(), item)
                })
                .collect()
        })
        .collect())
}

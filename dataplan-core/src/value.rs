//! Record values flowing through a pipeline

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::schema::{Column, DataType, RecordType, Schema};

/// A dynamically typed value
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value
    Null,

    /// Boolean value
    Bool(bool),

    /// Integer value
    Int(i64),

    /// Floating point value
    Float(f64),

    /// String value
    String(String),

    /// Binary value
    Bytes(Vec<u8>),

    /// List (or set) of values
    List(Vec<Value>),

    /// Nested record
    Record(Record),
}

impl Value {
    /// Zero value for a data type
    pub fn default_for(data_type: &DataType) -> Self {
        match data_type {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Bool(false),
            DataType::Int32 | DataType::Int64 => Value::Int(0),
            DataType::Float32 | DataType::Float64 => Value::Float(0.0),
            DataType::String => Value::String(String::new()),
            DataType::Binary => Value::Bytes(Vec::new()),
            DataType::List(_) | DataType::Set(_) => Value::List(Vec::new()),
            DataType::Struct(record_type) => Value::Record(Record::default_for(record_type)),
        }
    }

    /// Check whether this value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer content, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric content widened to a float
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// String content, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// List content, if any
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// Record content, if any
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Restrict nested records to the column's nested schema
    pub fn conform_to(&self, column: &Column) -> Value {
        let Some(nested) = &column.nested else {
            return self.clone();
        };
        self.conform_nested(nested)
    }

    fn conform_nested(&self, nested: &Schema) -> Value {
        match self {
            Value::Record(record) => Value::Record(record.conform(nested)),
            Value::List(values) => Value::List(
                values
                    .iter()
                    .map(|value| value.conform_nested(nested))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

// Floats compare bitwise so values can serve as join and grouping keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(value) => value.hash(state),
            Value::Int(value) => value.hash(state),
            Value::Float(value) => value.to_bits().hash(state),
            Value::String(value) => value.hash(state),
            Value::Bytes(value) => value.hash(state),
            Value::List(values) => values.hash(state),
            Value::Record(record) => record.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.partial_cmp(b),
            (Value::List(a), Value::List(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Value::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Record(record) => write!(f, "{record}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(value) => serde_json::Value::String(value.clone()),
            Value::Bytes(value) => {
                serde_json::Value::Array(value.iter().map(|b| (*b).into()).collect())
            }
            Value::List(values) => {
                serde_json::Value::Array(values.iter().map(Into::into).collect())
            }
            Value::Record(record) => record.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => number.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(values) => {
                Value::List(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(name, value)| (name, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// A record: an ordered list of named values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Record holding the zero value of every field of a record type
    pub fn default_for(record_type: &RecordType) -> Self {
        record_type
            .fields()
            .iter()
            .map(|field| {
                let value = if field.nullable {
                    Value::Null
                } else {
                    Value::default_for(&field.data_type)
                };
                (field.name.clone(), value)
            })
            .collect()
    }

    /// Builder-style setter
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing an existing value or appending a new field
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Get a field value, `Null` when absent
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Field names, in order
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Iterate over the fields
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reshape this record to exactly the columns of `schema`, in schema order.
    ///
    /// Missing fields become `Null`; nested records are reshaped recursively.
    pub fn conform(&self, schema: &Schema) -> Record {
        schema
            .columns()
            .iter()
            .map(|column| {
                let value = self
                    .get(&column.name)
                    .map_or(Value::Null, |value| value.conform_to(column));
                (column.name.clone(), value)
            })
            .collect()
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.into()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn item() -> Arc<RecordType> {
        Arc::new(
            RecordType::new("test.Item")
                .field("sku", DataType::String)
                .field("price", DataType::Float64),
        )
    }

    fn order() -> RecordType {
        RecordType::new("test.Order")
            .field("id", DataType::Int64)
            .nullable_field("note", DataType::String)
            .field("items", DataType::List(Box::new(DataType::Struct(item()))))
    }

    #[test]
    fn test_default_for_record_type() {
        let record = Record::default_for(&order());
        assert_eq!(record.names(), vec!["id", "note", "items"]);
        assert_eq!(record.value("id"), Value::Int(0));
        assert_eq!(record.value("note"), Value::Null);
        assert_eq!(record.value("items"), Value::List(vec![]));
    }

    #[test]
    fn test_conform_projects_and_reorders() {
        let mut schema = Schema::from_record_type(&order()).unwrap();
        schema.retain_columns(&["id", "items"]);
        let mut items = schema.column_by_name("items").unwrap().clone();
        items.nested.as_mut().unwrap().retain_columns(&["price"]);
        schema.set_columns(vec![schema.column(0).unwrap().clone(), items]);

        let record = Record::new()
            .with("items", vec![Value::from(Record::new().with("sku", "a").with("price", 2.5))])
            .with("note", "drop me")
            .with("id", 7);
        let conformed = record.conform(&schema);

        assert_eq!(conformed.names(), vec!["id", "items"]);
        let nested = conformed.value("items");
        let first = nested.as_list().unwrap()[0].as_record().unwrap();
        assert_eq!(first.names(), vec!["price"]);
        assert_eq!(first.value("price"), Value::Float(2.5));
    }

    #[test]
    fn test_conform_fills_missing_with_null() {
        let schema = Schema::from_record_type(&order()).unwrap();
        let conformed = Record::new().with("id", 1).conform(&schema);
        assert_eq!(conformed.value("note"), Value::Null);
        assert_eq!(conformed.len(), 3);
    }

    #[test]
    fn test_values_as_keys() {
        let keys: HashSet<Value> = [Value::Float(1.5), Value::Float(1.5), Value::Int(1)]
            .into_iter()
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(Value::Int(2) > Value::Float(1.5));
        assert_eq!(Value::String("a".into()).partial_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn test_json_bridge() {
        let record = Record::new().with("name", "a").with("amount", 5.0).with("n", 2);
        let json = record.to_json();
        assert_eq!(json["name"], "a");
        assert_eq!(json["amount"], 5.0);
        let back = Value::from(json);
        assert_eq!(back.as_record().unwrap().value("n"), Value::Int(2));
    }
}

//! CSV parser converting string records to typed records

use csv::StringRecord;
use dataplan_core::{Column, DataType, Record, Schema, Value};

use crate::common::Projection;
use crate::error::{Error, Result};

/// Parses CSV rows into records of a schema
#[derive(Debug, Clone)]
pub struct CsvParser {
    /// Schema of the records produced
    schema: Schema,

    /// Position of each schema column in a row
    projection: Projection,
}

impl CsvParser {
    /// Create a parser for rows laid out as described by `projection`
    pub fn new(schema: Schema, projection: Projection) -> Self {
        Self { schema, projection }
    }

    /// Schema of the records produced
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse one row
    pub fn parse_record(&self, row: &StringRecord) -> Result<Record> {
        self.schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = match self.projection.source_index(i).and_then(|j| row.get(j)) {
                    Some(text) => Self::parse_cell(text, column)?,
                    None => Value::Null,
                };
                Ok((column.name.clone(), value))
            })
            .collect()
    }

    /// Parse a cell of `column`
    pub fn parse_cell(text: &str, column: &Column) -> Result<Value> {
        if text.is_empty() && (column.nullable || column.data_type != DataType::String) {
            return Ok(Value::Null);
        }
        let value = Self::parse_value(text, &column.data_type)?;
        Ok(value.conform_to(column))
    }

    /// Parse a non-empty cell as `data_type`; nested types are JSON text
    pub fn parse_value(text: &str, data_type: &DataType) -> Result<Value> {
        let invalid = || Error::Format(format!("failed to parse `{text}` as {data_type}"));
        Ok(match data_type {
            DataType::Null => Value::Null,
            DataType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            DataType::Int32 => Value::Int(i64::from(text.parse::<i32>().map_err(|_| invalid())?)),
            DataType::Int64 => Value::Int(text.parse::<i64>().map_err(|_| invalid())?),
            DataType::Float32 | DataType::Float64 => {
                Value::Float(text.parse::<f64>().map_err(|_| invalid())?)
            }
            DataType::String => Value::String(text.to_string()),
            DataType::Binary => Value::Bytes(text.as_bytes().to_vec()),
            DataType::List(_) | DataType::Set(_) | DataType::Struct(_) => {
                let json: serde_json::Value = serde_json::from_str(text)?;
                let value = Value::from(json);
                let shaped = match data_type {
                    DataType::Struct(_) => value.as_record().is_some(),
                    _ => value.as_list().is_some(),
                };
                if !shaped {
                    return Err(invalid());
                }
                value
            }
        })
    }
}

//! Parquet reader implementation with column projection

use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use parquet::record::{Field as ParquetField, Row};
use tracing::debug;

use dataplan_core::{Record, Schema, Value};

use crate::common::RecordReader;
use crate::error::Result;

use super::schema as schema_convert;

/// Reads the rows of a Parquet file as records of a schema
pub struct ParquetRecordReader {
    /// Schema of the records produced
    schema: Schema,

    /// Row iterator over the projected columns
    rows: RowIter<'static>,

    /// Whether the reader is exhausted
    exhausted: bool,
}

impl ParquetRecordReader {
    /// Open a Parquet file, reading only the columns of `schema`
    pub fn from_path<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        let reader = SerializedFileReader::new(File::open(path.as_ref())?)?;
        let root = reader.metadata().file_metadata().schema().clone();
        let projection = schema_convert::project(&root, &schema)?;
        debug!(
            path = %path.as_ref().display(),
            columns = ?schema.column_names(),
            row_groups = reader.num_row_groups(),
            "opening Parquet reader"
        );
        let rows = RowIter::from_file_into(Box::new(reader)).project(Some(projection))?;
        Ok(Self {
            schema,
            rows,
            exhausted: false,
        })
    }
}

impl RecordReader for ParquetRecordReader {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(max_rows.min(1024));
        while records.len() < max_rows {
            let Some(row) = self.rows.next() else {
                self.exhausted = true;
                break;
            };
            records.push(row_to_record(&row).conform(&self.schema));
        }
        if records.is_empty() && self.exhausted {
            return Ok(None);
        }
        Ok(Some(records))
    }
}

fn row_to_record(row: &Row) -> Record {
    row.get_column_iter()
        .map(|(name, field)| (name.clone(), field_to_value(field)))
        .collect()
}

fn field_to_value(field: &ParquetField) -> Value {
    match field {
        ParquetField::Null => Value::Null,
        ParquetField::Bool(value) => Value::Bool(*value),
        ParquetField::Byte(value) => Value::Int(i64::from(*value)),
        ParquetField::Short(value) => Value::Int(i64::from(*value)),
        ParquetField::Int(value) | ParquetField::Date(value) => Value::Int(i64::from(*value)),
        ParquetField::Long(value)
        | ParquetField::TimestampMillis(value)
        | ParquetField::TimestampMicros(value) => Value::Int(*value),
        ParquetField::UByte(value) => Value::Int(i64::from(*value)),
        ParquetField::UShort(value) => Value::Int(i64::from(*value)),
        ParquetField::UInt(value) => Value::Int(i64::from(*value)),
        ParquetField::ULong(value) => i64::try_from(*value).map_or(Value::Null, Value::Int),
        ParquetField::Float(value) => Value::Float(f64::from(*value)),
        ParquetField::Double(value) => Value::Float(*value),
        ParquetField::Str(value) => Value::String(value.clone()),
        ParquetField::Bytes(value) => Value::Bytes(value.data().to_vec()),
        ParquetField::Group(row) => Value::Record(row_to_record(row)),
        ParquetField::ListInternal(list) => {
            Value::List(list.elements().iter().map(field_to_value).collect())
        }
        other => Value::String(other.to_string()),
    }
}

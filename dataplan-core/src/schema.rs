//! Schema model: record types, data types and the column schemas derived from them

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Data type for record fields and schema columns
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Un-typed value, not representable in a schema
    Null,

    /// Boolean type
    Boolean,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// UTF-8 encoded string
    String,

    /// Binary data
    Binary,

    /// List of values with a given type
    List(Box<DataType>),

    /// Set of distinct values with a given type
    Set(Box<DataType>),

    /// Nested record
    Struct(Arc<RecordType>),
}

impl DataType {
    /// The record type reached through this type, looking inside lists and sets
    pub fn nested_record(&self) -> Option<&Arc<RecordType>> {
        match self {
            DataType::Struct(record_type) => Some(record_type),
            DataType::List(inner) | DataType::Set(inner) => inner.nested_record(),
            _ => None,
        }
    }

    fn validate(&self, path: &str) -> Result<()> {
        match self {
            DataType::Null => Err(Error::MalformedRecordType(format!(
                "field `{path}` has no representable type"
            ))),
            DataType::List(inner) | DataType::Set(inner) => inner.validate(path),
            DataType::Struct(record_type) => record_type.validate(),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "Null"),
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Binary => write!(f, "Binary"),
            DataType::List(item_type) => write!(f, "List({item_type})"),
            DataType::Set(item_type) => write!(f, "Set({item_type})"),
            DataType::Struct(record_type) => write!(f, "Struct({})", record_type.name()),
        }
    }
}

impl From<RecordType> for DataType {
    fn from(record_type: RecordType) -> Self {
        DataType::Struct(Arc::new(record_type))
    }
}

impl From<Arc<RecordType>> for DataType {
    fn from(record_type: Arc<RecordType>) -> Self {
        DataType::Struct(record_type)
    }
}

impl From<&Arc<RecordType>> for DataType {
    fn from(record_type: &Arc<RecordType>) -> Self {
        DataType::Struct(Arc::clone(record_type))
    }
}

/// A field of a record type, with a name, data type, and nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Data type of the field
    pub data_type: DataType,

    /// Whether the field can be null
    pub nullable: bool,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Check if this field is nullable
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}: {} (nullable)", self.name, self.data_type)
        } else {
            write!(f, "{}: {}", self.name, self.data_type)
        }
    }
}

/// Structural descriptor of a record: a qualified name and an ordered field list.
///
/// The qualified name is the identity of the type during column pruning: two
/// steps whose seeds share a name are pruned together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    name: String,
    fields: Vec<Field>,
}

impl RecordType {
    /// Create an empty record type with the given qualified name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a non-nullable field
    #[must_use]
    pub fn field(mut self, name: &str, data_type: DataType) -> Self {
        self.fields.push(Field::new(name, data_type, false));
        self
    }

    /// Add a nullable field
    #[must_use]
    pub fn nullable_field(mut self, name: &str, data_type: DataType) -> Self {
        self.fields.push(Field::new(name, data_type, true));
        self
    }

    /// Qualified name of this type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Declared field names, in order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    /// Check that every field is named once and has a representable type
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::MalformedRecordType(format!(
                    "record `{}` has a field without a name",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::MalformedRecordType(format!(
                    "record `{}` declares field `{}` twice",
                    self.name, field.name
                )));
            }
            field
                .data_type
                .validate(&format!("{}.{}", self.name, field.name))?;
        }
        Ok(())
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.data_type)?;
        }
        write!(f, "}}")
    }
}

/// A schema column; struct-typed columns carry the schema of the nested record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Name of the column
    pub name: String,

    /// Declared data type of the column
    pub data_type: DataType,

    /// Whether the column can be null
    pub nullable: bool,

    /// Schema of the record reached through this column, pruned along with the
    /// rest of the pipeline
    pub nested: Option<Schema>,
}

impl Column {
    fn from_field(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            data_type: field.data_type.clone(),
            nullable: field.nullable,
            nested: field
                .data_type
                .nested_record()
                .map(|record_type| Schema::build(record_type)),
        }
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of the nested record type, for struct columns
    pub fn nested_type_name(&self) -> Option<&str> {
        self.nested.as_ref().map(Schema::name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nested {
            Some(nested) => write!(
                f,
                "{}: {} [{}]",
                self.name,
                self.data_type,
                nested.column_names().join(", ")
            ),
            None => write!(f, "{}: {}", self.name, self.data_type),
        }
    }
}

/// An ordered column schema derived from a record type
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    /// Qualified name of the record type this schema was derived from
    name: String,

    /// Columns in this schema
    columns: Vec<Column>,

    /// Column indices by name for faster lookup
    #[serde(skip)]
    column_indices: HashMap<String, usize>,
}

impl Schema {
    /// Derive the schema of a seed, which must be a well-formed record type
    pub fn derive(seed: &DataType) -> Result<Self> {
        match seed {
            DataType::Struct(record_type) => Self::from_record_type(record_type),
            other => Err(Error::MalformedRecordType(format!(
                "expecting a structured record, got {other}"
            ))),
        }
    }

    /// Derive the schema of a record type
    pub fn from_record_type(record_type: &RecordType) -> Result<Self> {
        record_type.validate()?;
        Ok(Self::build(record_type))
    }

    fn build(record_type: &RecordType) -> Self {
        Self::with_columns(
            record_type.name(),
            record_type.fields().iter().map(Column::from_field).collect(),
        )
    }

    /// Create a schema from already derived columns
    pub fn with_columns(name: &str, columns: Vec<Column>) -> Self {
        let column_indices = Self::index_columns(&columns);
        Self {
            name: name.to_string(),
            columns,
            column_indices,
        }
    }

    fn index_columns(columns: &[Column]) -> HashMap<String, usize> {
        columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name.clone(), i))
            .collect()
    }

    /// Qualified name of the record type behind this schema
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get all columns in this schema
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get a column by index
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Get a column by name
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|index| &self.columns[index])
    }

    /// Get the index of a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.column_indices.get(name).copied()
    }

    /// Check whether a column is present
    pub fn contains(&self, name: &str) -> bool {
        self.column_indices.contains_key(name)
    }

    /// Column names, in order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Get the number of columns in this schema
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Replace the columns of this schema
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.column_indices = Self::index_columns(&columns);
        self.columns = columns;
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Keep only the named columns; relative order is preserved
    pub fn retain_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let keep: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let columns = self
            .columns
            .drain(..)
            .filter(|column| keep.contains(column.name.as_str()))
            .collect();
        self.set_columns(columns);
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.columns == other.columns
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema {}: {} columns", self.name, self.columns.len())?;
        for column in &self.columns {
            writeln!(f, "  {column}")?;
        }
        Ok(())
    }
}

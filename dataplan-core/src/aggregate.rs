//! Aggregation builder output and its decoded specification
//!
//! An aggregate step is given a builder function that, for one input record,
//! produces an [`Aggregation`]: one entry per field of the result record type,
//! each tagged with how the field is computed (`group_by` for grouping keys,
//! `sum`, `count`, ... for aggregates). The builder is probed once when the
//! step is constructed so malformed aggregations fail before any backend work.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::RecordType;
use crate::step::AggregateFn;
use crate::value::{Record, Value};

/// Field name standing for "the field at this position of the result type"
pub const UNNAMED: &str = "_unnamed";

/// How a result field is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AggKind {
    /// Grouping key, carried as is
    GroupBy,
    /// Number of non-null values
    Count,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Sum of values
    Sum,
    /// Arithmetic mean
    Mean,
    /// Distinct values
    ToSet,
    /// All values
    ToArray,
    /// Number of distinct non-null values
    CountDistinct,
}

impl AggKind {
    /// Tag naming this kind
    pub fn tag(self) -> &'static str {
        match self {
            AggKind::GroupBy => "group_by",
            AggKind::Count => "count",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Sum => "sum",
            AggKind::Mean => "mean",
            AggKind::ToSet => "to_set",
            AggKind::ToArray => "to_array",
            AggKind::CountDistinct => "count_distinct",
        }
    }
}

impl fmt::Display for AggKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AggKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        Ok(match tag {
            "group_by" => AggKind::GroupBy,
            "count" => AggKind::Count,
            "min" => AggKind::Min,
            "max" => AggKind::Max,
            "sum" => AggKind::Sum,
            "mean" => AggKind::Mean,
            "to_set" => AggKind::ToSet,
            "to_array" => AggKind::ToArray,
            "count_distinct" => AggKind::CountDistinct,
            other => {
                return Err(Error::InvalidAggregateSpec(format!(
                    "unknown aggregation `{other}`"
                )))
            }
        })
    }
}

/// One field of an aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    /// How the field is computed
    pub kind: AggKind,
    /// Declared field name, possibly empty or [`UNNAMED`]
    pub field_name: String,
    /// Input value contributed by the record
    pub value: Value,
}

/// Values contributed by one input record to an aggregate step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    entries: Vec<AggregateEntry>,
}

macro_rules! aggregation_entry {
    ($($(#[$doc:meta])* $method:ident => $kind:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $method(self, field_name: &str, value: impl Into<Value>) -> Self {
                self.entry(AggKind::$kind, field_name, value)
            }
        )*
    };
}

impl Aggregation {
    /// Create an empty aggregation
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    #[must_use]
    pub fn entry(mut self, kind: AggKind, field_name: &str, value: impl Into<Value>) -> Self {
        self.entries.push(AggregateEntry {
            kind,
            field_name: field_name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Append an entry named by its aggregation tag
    pub fn tagged(self, tag: &str, field_name: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(self.entry(tag.parse()?, field_name, value))
    }

    aggregation_entry! {
        /// Carry a grouping key
        group_by => GroupBy,
        /// Count non-null values
        count => Count,
        /// Keep the smallest value
        min => Min,
        /// Keep the largest value
        max => Max,
        /// Sum values
        sum => Sum,
        /// Average values
        mean => Mean,
        /// Collect distinct values
        to_set => ToSet,
        /// Collect all values
        to_array => ToArray,
        /// Count distinct non-null values
        count_distinct => CountDistinct,
    }

    /// Entries in declaration order
    pub fn entries(&self) -> &[AggregateEntry] {
        &self.entries
    }

    /// Input values in declaration order
    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|entry| entry.value).collect()
    }
}

/// Decoded layout of an aggregate step: one `(kind, field)` pair per result
/// field, in the result type's declared order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSpec {
    entries: Vec<(AggKind, String)>,
}

impl AggregateSpec {
    /// Validate an aggregation against the result type and resolve its field names
    pub fn decode(result_type: &RecordType, aggregation: &Aggregation) -> Result<Self> {
        let field_names = result_type.field_names();
        if aggregation.entries.is_empty() {
            return Err(Error::InvalidAggregateSpec(format!(
                "aggregation for `{}` has no fields",
                result_type.name()
            )));
        }

        let mut entries = Vec::with_capacity(aggregation.entries.len());
        for (index, entry) in aggregation.entries.iter().enumerate() {
            let Some(expected) = field_names.get(index) else {
                return Err(Error::InvalidAggregateSpec(format!(
                    "too many fields in aggregation, at index {index} for field `{}`; \
                     expected field names: {field_names:?}",
                    entry.field_name
                )));
            };
            let field_name = if entry.field_name.is_empty() || entry.field_name == UNNAMED {
                (*expected).to_string()
            } else if entry.field_name == *expected {
                entry.field_name.clone()
            } else {
                return Err(Error::FieldOrderMismatch {
                    index,
                    expected: (*expected).to_string(),
                    actual: entry.field_name.clone(),
                });
            };
            entries.push((entry.kind, field_name));
        }

        if entries.len() < field_names.len() {
            return Err(Error::InvalidAggregateSpec(format!(
                "aggregation provides {} fields, `{}` declares {field_names:?}",
                entries.len(),
                result_type.name()
            )));
        }
        if entries.iter().all(|(kind, _)| *kind == AggKind::GroupBy) {
            return Err(Error::EmptyAggregation);
        }
        Ok(Self { entries })
    }

    /// `(kind, field)` pairs in result field order
    pub fn entries(&self) -> &[(AggKind, String)] {
        &self.entries
    }

    /// Number of result fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the spec has no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the grouping key fields
    pub fn group_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(kind, _)| *kind == AggKind::GroupBy)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Check that a row's aggregation has the layout this spec was decoded from
    pub fn check(&self, aggregation: &Aggregation) -> Result<()> {
        if aggregation.entries.len() != self.entries.len() {
            return Err(Error::InvalidAggregateSpec(format!(
                "aggregation produced {} fields, expected {}",
                aggregation.entries.len(),
                self.entries.len()
            )));
        }
        for (entry, (kind, name)) in aggregation.entries.iter().zip(&self.entries) {
            if entry.kind != *kind {
                return Err(Error::InvalidAggregateSpec(format!(
                    "field `{name}` aggregated as `{}`, expected `{kind}`",
                    entry.kind
                )));
            }
        }
        Ok(())
    }
}

/// Probe `builder` with a default record of `source_type` and decode the result
pub fn build_spec(
    builder: &AggregateFn,
    source_type: &RecordType,
    result_type: &RecordType,
) -> Result<AggregateSpec> {
    let probe = Record::default_for(source_type);
    AggregateSpec::decode(result_type, &builder(&probe))
}

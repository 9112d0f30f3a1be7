//! Pipeline steps: the nodes of the lazy dataset graph

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{AggregateSpec, Aggregation};
use crate::join::JoinSpec;
use crate::schema::{RecordType, Schema};
use crate::value::{Record, Value};

/// Predicate applied by a filter step
pub type PredicateFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Function applied by a map step
pub type MapFn = Arc<dyn Fn(&Record) -> Record + Send + Sync>;

/// Function applied by a flat-map step
pub type FlatMapFn = Arc<dyn Fn(&Record) -> Vec<Record> + Send + Sync>;

/// Builder producing the aggregated values of one input record
pub type AggregateFn = Arc<dyn Fn(&Record) -> Aggregation + Send + Sync>;

/// Join key extraction function
pub type KeyFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

static NEXT_STEP_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a step, unique across the process and increasing in
/// construction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StepId(u64);

impl StepId {
    pub(crate) fn next() -> Self {
        StepId(NEXT_STEP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StepKind {
    /// Dataset with no records
    Empty,
    /// CSV file read
    ReadCsv,
    /// Parquet file read
    ReadParquet,
    /// Record filter
    Filter,
    /// One-to-one record transformation
    Map,
    /// One-to-many record transformation
    FlatMap,
    /// Grouping and aggregation
    Aggregate,
    /// Left join with one or more right-hand datasets
    JoinLeft,
    /// Record count limit
    Limit,
}

impl StepKind {
    /// Whether an unrestricted downstream read keeps flowing through this step
    /// to its sources. Steps applying opaque functions stop it.
    pub fn propagates_direct_collect(self) -> bool {
        !matches!(
            self,
            StepKind::Map | StepKind::FlatMap | StepKind::Aggregate | StepKind::JoinLeft
        )
    }

    /// Whether the step applies a user function to its input records
    pub fn applies_function(self) -> bool {
        matches!(
            self,
            StepKind::Filter
                | StepKind::Map
                | StepKind::FlatMap
                | StepKind::Aggregate
                | StepKind::JoinLeft
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a step does, with the payload of each kind
#[derive(Clone)]
pub enum Operation {
    /// Dataset with no records
    Empty,
    /// Read a CSV locator
    ReadCsv {
        /// Opaque file locator
        path: String,
    },
    /// Read a Parquet locator
    ReadParquet {
        /// Opaque file locator
        path: String,
    },
    /// Keep the records for which the predicate holds
    Filter {
        /// Record predicate
        predicate: PredicateFn,
    },
    /// Transform each record
    Map {
        /// Record transformation
        function: MapFn,
    },
    /// Transform each record into zero or more records
    FlatMap {
        /// Record transformation
        function: FlatMapFn,
    },
    /// Group and aggregate records
    Aggregate {
        /// Per-record aggregation builder
        builder: AggregateFn,
        /// Decoded aggregation layout
        spec: AggregateSpec,
    },
    /// Left join against right-hand datasets
    JoinLeft {
        /// Key extraction for the left records
        left_key: KeyFn,
        /// Decoded right-hand joins
        joins: Vec<JoinSpec>,
    },
    /// Keep at most `count` records
    Limit {
        /// Maximum number of records
        count: usize,
    },
}

impl Operation {
    /// The kind of this operation
    pub fn kind(&self) -> StepKind {
        match self {
            Operation::Empty => StepKind::Empty,
            Operation::ReadCsv { .. } => StepKind::ReadCsv,
            Operation::ReadParquet { .. } => StepKind::ReadParquet,
            Operation::Filter { .. } => StepKind::Filter,
            Operation::Map { .. } => StepKind::Map,
            Operation::FlatMap { .. } => StepKind::FlatMap,
            Operation::Aggregate { .. } => StepKind::Aggregate,
            Operation::JoinLeft { .. } => StepKind::JoinLeft,
            Operation::Limit { .. } => StepKind::Limit,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReadCsv { path } | Operation::ReadParquet { path } => {
                write!(f, "{}({path:?})", self.kind())
            }
            Operation::Aggregate { spec, .. } => write!(f, "Aggregate({spec:?})"),
            Operation::JoinLeft { joins, .. } => f.debug_tuple("JoinLeft").field(joins).finish(),
            Operation::Limit { count } => write!(f, "Limit({count})"),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Fields a step's function reads, keyed by record type name.
///
/// Unknown usage means the function may read anything: the record types it
/// consumes are never pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUsage {
    declared: Option<BTreeMap<String, BTreeSet<String>>>,
}

impl FieldUsage {
    /// Usage is not known
    pub fn unknown() -> Self {
        Self::default()
    }

    /// The function reads no fields at all
    pub fn none() -> Self {
        Self {
            declared: Some(BTreeMap::new()),
        }
    }

    /// The function reads `fields` of `record_type`
    pub fn of<I, S>(record_type: &RecordType, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::none().and(record_type, fields)
    }

    /// Also record usage of `fields` of `record_type`
    #[must_use]
    pub fn and<I, S>(mut self, record_type: &RecordType, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared
            .get_or_insert_with(BTreeMap::new)
            .entry(record_type.name().to_string())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Whether usage was declared
    pub fn is_known(&self) -> bool {
        self.declared.is_some()
    }

    /// Declared usage per record type name
    pub fn declared(&self) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        self.declared.as_ref()
    }
}

/// A node of the pipeline graph
#[derive(Debug, Clone)]
pub struct Step {
    pub(crate) id: StepId,
    pub(crate) source: Option<StepId>,
    pub(crate) seed: Arc<RecordType>,
    pub(crate) schema: Schema,
    pub(crate) usage: FieldUsage,
    pub(crate) operation: Operation,
}

impl Step {
    /// Step identifier
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Kind of this step
    pub fn kind(&self) -> StepKind {
        self.operation.kind()
    }

    /// Upstream step, absent for sources
    pub fn source(&self) -> Option<StepId> {
        self.source
    }

    /// Record type of the records this step outputs
    pub fn seed(&self) -> &Arc<RecordType> {
        &self.seed
    }

    /// Schema derived from the seed
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Declared field usage of this step's function
    pub fn usage(&self) -> &FieldUsage {
        &self.usage
    }

    /// Kind-specific payload
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Right-hand join specs, empty for other kinds
    pub fn joins(&self) -> &[JoinSpec] {
        match &self.operation {
            Operation::JoinLeft { joins, .. } => joins,
            _ => &[],
        }
    }

    /// Every upstream step: the source followed by join right-hand sources
    pub fn inputs(&self) -> Vec<StepId> {
        self.source
            .into_iter()
            .chain(self.joins().iter().flat_map(|join| join.sources().iter().copied()))
            .collect()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {}", self.kind(), self.seed.name(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    #[test]
    fn test_step_ids_increase() {
        let first = StepId::next();
        let second = StepId::next();
        assert!(second > first);
    }

    #[test]
    fn test_direct_collect_propagation_by_kind() {
        assert!(StepKind::Filter.propagates_direct_collect());
        assert!(StepKind::Limit.propagates_direct_collect());
        assert!(!StepKind::Map.propagates_direct_collect());
        assert!(!StepKind::FlatMap.propagates_direct_collect());
        assert!(!StepKind::Aggregate.propagates_direct_collect());
        assert!(!StepKind::JoinLeft.propagates_direct_collect());
    }

    #[test]
    fn test_field_usage_union() {
        let person = RecordType::new("test.Person")
            .field("id", DataType::Int64)
            .field("name", DataType::String);
        let usage = FieldUsage::of(&person, ["name"]).and(&person, ["id", "name"]);
        let declared = usage.declared().unwrap();
        assert_eq!(declared["test.Person"].len(), 2);
        assert!(!FieldUsage::unknown().is_known());
        assert!(FieldUsage::none().is_known());
    }
}

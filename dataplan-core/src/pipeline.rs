//! The pipeline graph: an arena of steps addressed by [`StepId`]
//!
//! Constructors validate eagerly (seeds, aggregate builders, join descriptors)
//! and never touch existing steps, so a step may be shared by any number of
//! downstream steps and collected any number of times.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{build_spec, Aggregation};
use crate::error::{Error, Result};
use crate::join::{JoinDescriptor, JoinSpec};
use crate::schema::{DataType, RecordType, Schema};
use crate::step::{AggregateFn, FieldUsage, Operation, Step, StepId, StepKind};
use crate::value::{Record, Value};

/// A lazily built graph of dataset steps
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    /// Steps sorted by id, which is construction order
    steps: Vec<Step>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a step
    pub fn step(&self, id: StepId) -> Result<&Step> {
        self.steps
            .binary_search_by_key(&id, Step::id)
            .map(|index| &self.steps[index])
            .map_err(|_| Error::UnknownStep(id))
    }

    /// All steps, in construction order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Dataset with no records
    pub fn empty(&mut self, seed: impl Into<DataType>) -> Result<StepId> {
        let (seed, schema) = Self::seed_schema(seed.into())?;
        Ok(self.push(None, seed, schema, FieldUsage::unknown(), Operation::Empty))
    }

    /// Dataset read from a CSV locator
    pub fn read_csv(
        &mut self,
        seed: impl Into<DataType>,
        path: impl Into<String>,
    ) -> Result<StepId> {
        let (seed, schema) = Self::seed_schema(seed.into())?;
        let operation = Operation::ReadCsv { path: path.into() };
        Ok(self.push(None, seed, schema, FieldUsage::unknown(), operation))
    }

    /// Dataset read from a Parquet locator
    pub fn read_parquet(
        &mut self,
        seed: impl Into<DataType>,
        path: impl Into<String>,
    ) -> Result<StepId> {
        let (seed, schema) = Self::seed_schema(seed.into())?;
        let operation = Operation::ReadParquet { path: path.into() };
        Ok(self.push(None, seed, schema, FieldUsage::unknown(), operation))
    }

    /// Keep the records of `source` matching `predicate`
    pub fn filter<F>(&mut self, source: StepId, predicate: F, usage: FieldUsage) -> Result<StepId>
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        let upstream = self.step(source)?;
        let (seed, schema) = (Arc::clone(&upstream.seed), upstream.schema.clone());
        let operation = Operation::Filter {
            predicate: Arc::new(predicate),
        };
        Ok(self.push(Some(source), seed, schema, usage, operation))
    }

    /// Transform each record of `source` into a `result_seed` record
    pub fn map<F>(
        &mut self,
        source: StepId,
        result_seed: impl Into<DataType>,
        function: F,
        usage: FieldUsage,
    ) -> Result<StepId>
    where
        F: Fn(&Record) -> Record + Send + Sync + 'static,
    {
        self.step(source)?;
        let (seed, schema) = Self::seed_schema(result_seed.into())?;
        let operation = Operation::Map {
            function: Arc::new(function),
        };
        Ok(self.push(Some(source), seed, schema, usage, operation))
    }

    /// Transform each record of `source` into zero or more `result_seed` records
    pub fn flat_map<F>(
        &mut self,
        source: StepId,
        result_seed: impl Into<DataType>,
        function: F,
        usage: FieldUsage,
    ) -> Result<StepId>
    where
        F: Fn(&Record) -> Vec<Record> + Send + Sync + 'static,
    {
        self.step(source)?;
        let (seed, schema) = Self::seed_schema(result_seed.into())?;
        let operation = Operation::FlatMap {
            function: Arc::new(function),
        };
        Ok(self.push(Some(source), seed, schema, usage, operation))
    }

    /// Group and aggregate the records of `source`.
    ///
    /// `builder` is invoked once here, on a default record of the source type,
    /// to decode the aggregation layout against `result_seed`.
    pub fn aggregate<F>(
        &mut self,
        source: StepId,
        result_seed: impl Into<DataType>,
        builder: F,
        usage: FieldUsage,
    ) -> Result<StepId>
    where
        F: Fn(&Record) -> Aggregation + Send + Sync + 'static,
    {
        let source_type = Arc::clone(&self.step(source)?.seed);
        let (seed, schema) = Self::seed_schema(result_seed.into())?;
        let builder: AggregateFn = Arc::new(builder);
        let spec = build_spec(&builder, &source_type, &seed)?;
        let operation = Operation::Aggregate { builder, spec };
        Ok(self.push(Some(source), seed, schema, usage, operation))
    }

    /// Left join `source` against the right-hand datasets described by `right`
    pub fn join_left<F>(
        &mut self,
        source: StepId,
        result_seed: impl Into<DataType>,
        left_key: F,
        right: &[JoinDescriptor],
        usage: FieldUsage,
    ) -> Result<StepId>
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.step(source)?;
        let (seed, schema) = Self::seed_schema(result_seed.into())?;
        let joins = right
            .iter()
            .map(|descriptor| JoinSpec::decode(self, descriptor))
            .collect::<Result<Vec<_>>>()?;
        let operation = Operation::JoinLeft {
            left_key: Arc::new(left_key),
            joins,
        };
        Ok(self.push(Some(source), seed, schema, usage, operation))
    }

    /// Keep at most `count` records of `source`
    pub fn limit(&mut self, source: StepId, count: i64) -> Result<StepId> {
        let count = usize::try_from(count).map_err(|_| {
            Error::InvalidArgument(format!("limit must be non-negative, got {count}"))
        })?;
        let upstream = self.step(source)?;
        let (seed, schema) = (Arc::clone(&upstream.seed), upstream.schema.clone());
        Ok(self.push(
            Some(source),
            seed,
            schema,
            FieldUsage::unknown(),
            Operation::Limit { count },
        ))
    }

    fn seed_schema(seed: DataType) -> Result<(Arc<RecordType>, Schema)> {
        match seed {
            DataType::Struct(record_type) => {
                let schema = Schema::from_record_type(&record_type)?;
                Ok((record_type, schema))
            }
            other => Err(Error::InvalidSeed(other.to_string())),
        }
    }

    fn push(
        &mut self,
        source: Option<StepId>,
        seed: Arc<RecordType>,
        schema: Schema,
        usage: FieldUsage,
        operation: Operation,
    ) -> StepId {
        let id = StepId::next();
        self.steps.push(Step {
            id,
            source,
            seed,
            schema,
            usage,
            operation,
        });
        id
    }

    /// Upstream steps of `id`: its source followed by join right-hand sources
    pub fn sources(&self, id: StepId) -> Result<Vec<StepId>> {
        Ok(self.step(id)?.inputs())
    }

    /// Steps reachable from `target`, sources before their consumers
    pub fn reachable(&self, target: StepId) -> Result<Vec<StepId>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.visit(target, &mut visited, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        id: StepId,
        visited: &mut HashSet<StepId>,
        order: &mut Vec<StepId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        for input in self.step(id)?.inputs() {
            self.visit(input, visited, order)?;
        }
        order.push(id);
        Ok(())
    }

    /// Describe the sub-graph feeding `target` with the steps' declared schemas
    pub fn describe(&self, target: StepId) -> Result<Vec<StepDescription>> {
        self.reachable(target)?
            .into_iter()
            .map(|id| {
                let step = self.step(id)?;
                Ok(StepDescription::new(step, &step.schema))
            })
            .collect()
    }
}

/// Serializable summary of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescription {
    /// Step id
    pub id: StepId,
    /// Step kind
    pub kind: StepKind,
    /// Seed record type name
    pub seed: String,
    /// Upstream steps
    pub inputs: Vec<StepId>,
    /// Output columns
    pub columns: Vec<String>,
    /// Human readable label
    pub label: String,
}

impl StepDescription {
    /// Describe `step` as producing `schema`
    pub fn new(step: &Step, schema: &Schema) -> Self {
        Self {
            id: step.id,
            kind: step.kind(),
            seed: step.seed.name().to_string(),
            inputs: step.inputs(),
            columns: schema.column_names(),
            label: format!("{step} - {:?}", step.operation),
        }
    }
}

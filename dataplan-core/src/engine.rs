//! The contract execution backends implement

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span};
use uuid::Uuid;

use crate::aggregate::AggregateSpec;
use crate::error::{Error, Result};
use crate::join::JoinKind;
use crate::pipeline::Pipeline;
use crate::plan::CollectPlan;
use crate::schema::Schema;
use crate::step::{AggregateFn, FlatMapFn, KeyFn, MapFn, PredicateFn, Step, StepId};
use crate::value::Record;
use crate::walker::PipelineWalker;

/// Options of one collect call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectOptions {
    /// Read every declared column instead of only the used ones
    pub disable_column_pruning: bool,
}

impl CollectOptions {
    /// Options reading every declared column
    pub fn pruning_disabled() -> Self {
        Self {
            disable_column_pruning: true,
        }
    }
}

/// What a backend needs to know about the step it translates
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Step being translated
    pub step: &'a Step,
    /// Schema the step must produce, after pruning
    pub schema: &'a Schema,
    /// Options of the collect call
    pub options: &'a CollectOptions,
}

/// A right-hand join with its translated datasets
pub struct JoinInput<D> {
    /// Output field receiving the joined records
    pub field_name: String,
    /// Join kind
    pub kind: JoinKind,
    /// Right-hand datasets, in declaration order
    pub sources: Vec<D>,
    /// Key extraction for the right-hand records
    pub key: KeyFn,
    /// Companion field receiving source ordinals, for `MultiArray` joins
    pub index_field: Option<String>,
}

/// An execution backend.
///
/// Every translation method has a default reporting that the backend does not
/// implement it; [`Engine::dataset_collect`] drives them through a
/// [`PipelineWalker`].
pub trait Engine {
    /// Backend-native dataset handle; cloned when a step feeds several consumers
    type Dataset: Clone;

    /// Backend name, used in errors and logs
    fn name(&self) -> &str;

    /// Dataset with no records
    fn empty_dataset(&self, ctx: &StepContext<'_>) -> Result<Self::Dataset> {
        let _ = ctx;
        Err(Error::not_implemented(self.name(), "empty_dataset"))
    }

    /// Read the CSV locator `path`, restricted to `ctx.schema`
    fn read_csv(&self, ctx: &StepContext<'_>, path: &str) -> Result<Self::Dataset> {
        let _ = (ctx, path);
        Err(Error::not_implemented(self.name(), "read_csv"))
    }

    /// Read the Parquet locator `path`, restricted to `ctx.schema`
    fn read_parquet(&self, ctx: &StepContext<'_>, path: &str) -> Result<Self::Dataset> {
        let _ = (ctx, path);
        Err(Error::not_implemented(self.name(), "read_parquet"))
    }

    /// Keep the records matching `predicate`
    fn dataset_filter(
        &self,
        ctx: &StepContext<'_>,
        input: Self::Dataset,
        predicate: &PredicateFn,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, input, predicate);
        Err(Error::not_implemented(self.name(), "dataset_filter"))
    }

    /// Transform each record
    fn dataset_map(
        &self,
        ctx: &StepContext<'_>,
        input: Self::Dataset,
        function: &MapFn,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, input, function);
        Err(Error::not_implemented(self.name(), "dataset_map"))
    }

    /// Transform each record into zero or more records
    fn dataset_flat_map(
        &self,
        ctx: &StepContext<'_>,
        input: Self::Dataset,
        function: &FlatMapFn,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, input, function);
        Err(Error::not_implemented(self.name(), "dataset_flat_map"))
    }

    /// Group and aggregate records as laid out by `spec`
    fn dataset_aggregate(
        &self,
        ctx: &StepContext<'_>,
        input: Self::Dataset,
        builder: &AggregateFn,
        spec: &AggregateSpec,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, input, builder, spec);
        Err(Error::not_implemented(self.name(), "dataset_aggregate"))
    }

    /// Left join `left` with every right-hand input
    fn dataset_join_left(
        &self,
        ctx: &StepContext<'_>,
        left: Self::Dataset,
        left_key: &KeyFn,
        joins: Vec<JoinInput<Self::Dataset>>,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, left, left_key, joins);
        Err(Error::not_implemented(self.name(), "dataset_join_left"))
    }

    /// Keep at most `count` records
    fn dataset_limit(
        &self,
        ctx: &StepContext<'_>,
        input: Self::Dataset,
        count: usize,
    ) -> Result<Self::Dataset> {
        let _ = (ctx, input, count);
        Err(Error::not_implemented(self.name(), "dataset_limit"))
    }

    /// Turn the dataset of the collected step into records
    fn materialize(&self, ctx: &StepContext<'_>, dataset: Self::Dataset) -> Result<Vec<Record>>;

    /// Prune, translate and materialize the graph feeding `target`
    fn dataset_collect(
        &self,
        pipeline: &Pipeline,
        target: StepId,
        options: &CollectOptions,
    ) -> Result<Records> {
        let run_id = Uuid::new_v4();
        let span = info_span!("collect", %run_id, engine = self.name(), target = %target);
        let _guard = span.enter();

        let plan = CollectPlan::build(pipeline, target, options)?;
        let dataset = PipelineWalker::new(self, pipeline, &plan).walk(target)?;
        let ctx = plan.context(pipeline.step(target)?);
        let records = self.materialize(&ctx, dataset)?;
        info!(records = records.len(), "collected");
        Ok(Records::new(records))
    }
}

/// Collected records; can be iterated once
#[derive(Debug)]
pub struct Records {
    inner: std::vec::IntoIter<Record>,
}

impl Records {
    /// Wrap materialized records
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            inner: records.into_iter(),
        }
    }

    /// Deserialize the remaining records into `T` through their JSON form
    pub fn deserialize_into<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.map(|record| serde_json::from_value(record.to_json()).map_err(Error::from))
            .collect()
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Records {}

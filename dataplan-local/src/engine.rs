//! In-memory execution of pipeline graphs

use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;

use dataplan_core::functions::{AggregateFn, FlatMapFn, KeyFn, MapFn, PredicateFn};
use dataplan_core::{AggregateSpec, Engine, JoinInput, Record, Result, StepContext};
use dataplan_readers::csv::CsvRecordReader;
use dataplan_readers::{resolve_path, RecordReader};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::LocalEngineConfig;
use crate::{aggregate, join};

/// Dataset handle of the local engine
pub type Rows = Arc<Vec<Record>>;

/// Engine evaluating pipelines over in-memory record vectors.
///
/// Locators registered through [`LocalEngine::register_table`] are served from
/// memory; every other locator is read from the filesystem.
pub struct LocalEngine {
    /// Engine configuration
    config: LocalEngineConfig,

    /// In-memory tables by locator
    tables: HashMap<String, Rows>,

    /// Worker pool for record functions over large inputs
    #[cfg(feature = "parallel")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl LocalEngine {
    /// Create an engine with `config`
    pub fn new(config: LocalEngineConfig) -> Self {
        #[cfg(feature = "parallel")]
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("dataplan-worker-{i}"))
            .build()
        {
            Ok(pool) => Some(Arc::new(pool)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start worker pool, running sequentially");
                None
            }
        };
        Self {
            config,
            tables: HashMap::new(),
            #[cfg(feature = "parallel")]
            pool,
        }
    }

    /// Serve reads of `locator` from `rows` instead of the filesystem
    pub fn register_table(&mut self, locator: impl Into<String>, rows: Vec<Record>) {
        let locator = locator.into();
        debug!(locator = %locator, rows = rows.len(), "registered table");
        self.tables.insert(locator, Arc::new(rows));
    }

    /// Rows registered for `locator`, reshaped to the step schema
    fn registered(&self, ctx: &StepContext<'_>, locator: &str) -> Option<Rows> {
        let rows = self.tables.get(locator)?;
        let declared = ctx.step.schema().len();
        if ctx.schema.len() < declared {
            info!(
                locator,
                columns = ?ctx.schema.column_names(),
                declared,
                "reading restricted columns"
            );
        }
        Some(Arc::new(rows.iter().map(|row| row.conform(ctx.schema)).collect()))
    }

    /// Apply `function` to every record, on the worker pool for large inputs
    fn apply<T, F>(&self, records: &[Record], function: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&Record) -> T + Send + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if let Some(pool) = &self.pool {
                if records.len() >= self.config.parallel_threshold {
                    return pool.install(|| records.par_iter().map(&function).collect());
                }
            }
        }
        records.iter().map(function).collect()
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(LocalEngineConfig::default())
    }
}

impl Engine for LocalEngine {
    type Dataset = Rows;

    fn name(&self) -> &str {
        "local"
    }

    fn empty_dataset(&self, _ctx: &StepContext<'_>) -> Result<Rows> {
        Ok(Arc::new(Vec::new()))
    }

    fn read_csv(&self, ctx: &StepContext<'_>, path: &str) -> Result<Rows> {
        if let Some(rows) = self.registered(ctx, path) {
            return Ok(rows);
        }
        let file = resolve_path(path);
        let options = &self.config.csv;
        let schema = ctx.schema.clone();
        let records = if options.has_header {
            CsvRecordReader::from_path(&file, schema, options)?.read_all()?
        } else {
            let layout = ctx.step.seed().field_names();
            CsvRecordReader::with_columns(File::open(&file)?, schema, layout.as_slice(), options)?
                .read_all()?
        };
        info!(path, records = records.len(), columns = ctx.schema.len(), "read CSV");
        Ok(Arc::new(records))
    }

    #[cfg(feature = "parquet")]
    fn read_parquet(&self, ctx: &StepContext<'_>, path: &str) -> Result<Rows> {
        use dataplan_readers::parquet::ParquetRecordReader;

        if let Some(rows) = self.registered(ctx, path) {
            return Ok(rows);
        }
        let records =
            ParquetRecordReader::from_path(resolve_path(path), ctx.schema.clone())?.read_all()?;
        info!(path, records = records.len(), columns = ctx.schema.len(), "read Parquet");
        Ok(Arc::new(records))
    }

    #[cfg(not(feature = "parquet"))]
    fn read_parquet(&self, ctx: &StepContext<'_>, path: &str) -> Result<Rows> {
        self.registered(ctx, path)
            .ok_or_else(|| dataplan_core::Error::not_implemented(self.name(), "read_parquet"))
    }

    fn dataset_filter(
        &self,
        _ctx: &StepContext<'_>,
        input: Rows,
        predicate: &PredicateFn,
    ) -> Result<Rows> {
        let keep = self.apply(&input, |record| predicate(record));
        Ok(Arc::new(
            input
                .iter()
                .zip(keep)
                .filter(|(_, keep)| *keep)
                .map(|(record, _)| record.clone())
                .collect(),
        ))
    }

    fn dataset_map(&self, ctx: &StepContext<'_>, input: Rows, function: &MapFn) -> Result<Rows> {
        let schema = ctx.schema;
        Ok(Arc::new(
            self.apply(&input, |record| function(record).conform(schema)),
        ))
    }

    fn dataset_flat_map(
        &self,
        ctx: &StepContext<'_>,
        input: Rows,
        function: &FlatMapFn,
    ) -> Result<Rows> {
        let schema = ctx.schema;
        let nested = self.apply(&input, |record| {
            function(record)
                .iter()
                .map(|output| output.conform(schema))
                .collect::<Vec<_>>()
        });
        Ok(Arc::new(nested.into_iter().flatten().collect()))
    }

    fn dataset_aggregate(
        &self,
        ctx: &StepContext<'_>,
        input: Rows,
        builder: &AggregateFn,
        spec: &AggregateSpec,
    ) -> Result<Rows> {
        aggregate::aggregate(&input, builder, spec, ctx.schema).map(Arc::new)
    }

    fn dataset_join_left(
        &self,
        ctx: &StepContext<'_>,
        left: Rows,
        left_key: &KeyFn,
        joins: Vec<JoinInput<Rows>>,
    ) -> Result<Rows> {
        debug!(joins = joins.len(), left = left.len(), "joining");
        join::join_left(&left, left_key, &joins, ctx.schema).map(Arc::new)
    }

    fn dataset_limit(&self, _ctx: &StepContext<'_>, input: Rows, count: usize) -> Result<Rows> {
        if input.len() <= count {
            return Ok(input);
        }
        Ok(Arc::new(input.iter().take(count).cloned().collect()))
    }

    fn materialize(&self, _ctx: &StepContext<'_>, dataset: Rows) -> Result<Vec<Record>> {
        Ok(Arc::try_unwrap(dataset).unwrap_or_else(|shared| shared.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataplan_core::{CollectOptions, DataType, Error, FieldUsage, Pipeline, RecordType, Value};

    fn point() -> RecordType {
        RecordType::new("local.Point")
            .field("x", DataType::Int64)
            .field("y", DataType::Int64)
    }

    fn points(n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new().with("x", i).with("y", i * 10))
            .collect()
    }

    #[test]
    fn test_limit_and_filter_over_registered_table() {
        let mut engine = LocalEngine::default();
        engine.register_table("mem://points", points(10));

        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(point(), "mem://points").unwrap();
        let even = pipeline
            .filter(
                read,
                |r: &Record| r.value("x").as_i64().is_some_and(|x| x % 2 == 0),
                FieldUsage::of(&point(), ["x"]),
            )
            .unwrap();
        let limit = pipeline.limit(even, 3).unwrap();

        let xs: Vec<Value> = engine
            .dataset_collect(&pipeline, limit, &CollectOptions::default())
            .unwrap()
            .map(|r| r.value("x"))
            .collect();
        assert_eq!(xs, vec![Value::Int(0), Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn test_parallel_threshold_keeps_order() {
        let config = LocalEngineConfig {
            parallel_threshold: 4,
            worker_threads: 2,
            ..LocalEngineConfig::default()
        };
        let mut engine = LocalEngine::new(config);
        engine.register_table("mem://points", points(100));

        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(point(), "mem://points").unwrap();
        let doubled = pipeline
            .map(
                read,
                point(),
                |r: &Record| {
                    let x = r.value("x").as_i64().unwrap_or_default();
                    Record::new().with("x", x * 2).with("y", x)
                },
                FieldUsage::of(&point(), ["x"]),
            )
            .unwrap();

        let records: Vec<Record> = engine
            .dataset_collect(&pipeline, doubled, &CollectOptions::default())
            .unwrap()
            .collect();
        assert_eq!(records.len(), 100);
        assert_eq!(records[99].value("x"), Value::Int(198));
        assert_eq!(records[99].value("y"), Value::Int(99));
    }

    #[cfg(not(feature = "parquet"))]
    #[test]
    fn test_parquet_without_feature_is_not_implemented() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_parquet(point(), "points.parquet").unwrap();
        let result =
            LocalEngine::default().dataset_collect(&pipeline, read, &CollectOptions::default());
        assert!(matches!(result, Err(Error::NotImplementedForEngine { .. })));
    }
}

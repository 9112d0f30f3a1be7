//! Translation of a pipeline graph into backend datasets

use std::collections::HashMap;

use tracing::debug;

use crate::engine::{Engine, JoinInput};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::plan::CollectPlan;
use crate::step::{Operation, Step, StepId};

/// Depth-first translation of steps, each translated at most once
pub struct PipelineWalker<'a, E: Engine + ?Sized> {
    engine: &'a E,
    pipeline: &'a Pipeline,
    plan: &'a CollectPlan,
    cache: HashMap<StepId, E::Dataset>,
}

impl<'a, E: Engine + ?Sized> PipelineWalker<'a, E> {
    /// Create a walker translating `pipeline` under `plan`
    pub fn new(engine: &'a E, pipeline: &'a Pipeline, plan: &'a CollectPlan) -> Self {
        Self {
            engine,
            pipeline,
            plan,
            cache: HashMap::new(),
        }
    }

    /// Number of steps translated so far
    pub fn translated(&self) -> usize {
        self.cache.len()
    }

    /// Translate `id` and everything it reads from
    pub fn walk(&mut self, id: StepId) -> Result<E::Dataset> {
        if let Some(dataset) = self.cache.get(&id) {
            debug!(step = %id, "reusing translated step");
            return Ok(dataset.clone());
        }

        let (engine, pipeline, plan) = (self.engine, self.pipeline, self.plan);
        let step = pipeline.step(id)?;
        let ctx = plan.context(step);
        debug!(step = %step, columns = ?ctx.schema.column_names(), "translating step");

        let dataset = match step.operation() {
            Operation::Empty => engine.empty_dataset(&ctx)?,
            Operation::ReadCsv { path } => engine.read_csv(&ctx, path)?,
            Operation::ReadParquet { path } => engine.read_parquet(&ctx, path)?,
            Operation::Filter { predicate } => {
                let input = self.walk_source(step)?;
                engine.dataset_filter(&ctx, input, predicate)?
            }
            Operation::Map { function } => {
                let input = self.walk_source(step)?;
                engine.dataset_map(&ctx, input, function)?
            }
            Operation::FlatMap { function } => {
                let input = self.walk_source(step)?;
                engine.dataset_flat_map(&ctx, input, function)?
            }
            Operation::Aggregate { builder, spec } => {
                let input = self.walk_source(step)?;
                engine.dataset_aggregate(&ctx, input, builder, spec)?
            }
            Operation::JoinLeft { left_key, .. } => {
                let left = self.walk_source(step)?;
                let mut joins = Vec::new();
                for join in plan.active_joins(step) {
                    let sources = join
                        .sources()
                        .iter()
                        .map(|&source| self.walk(source))
                        .collect::<Result<Vec<_>>>()?;
                    joins.push(JoinInput {
                        field_name: join.field_name().to_string(),
                        kind: join.kind(),
                        sources,
                        key: join.key().clone(),
                        index_field: join.index_field_name(),
                    });
                }
                engine.dataset_join_left(&ctx, left, left_key, joins)?
            }
            Operation::Limit { count } => {
                let input = self.walk_source(step)?;
                engine.dataset_limit(&ctx, input, *count)?
            }
        };

        self.cache.insert(id, dataset.clone());
        Ok(dataset)
    }

    fn walk_source(&mut self, step: &Step) -> Result<E::Dataset> {
        let source = step
            .source()
            .ok_or_else(|| Error::Execution(format!("{step} has no source")))?;
        self.walk(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CollectOptions, StepContext};
    use crate::join::JoinDescriptor;
    use crate::schema::{DataType, RecordType};
    use crate::step::{FieldUsage, KeyFn, PredicateFn};
    use crate::value::{Record, Value};
    use std::cell::RefCell;

    /// Records the translation calls it receives; datasets are plain vectors
    #[derive(Default)]
    struct TracingEngine {
        calls: RefCell<Vec<String>>,
    }

    impl TracingEngine {
        fn log(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_string());
        }
    }

    impl Engine for TracingEngine {
        type Dataset = Vec<Record>;

        fn name(&self) -> &str {
            "tracing"
        }

        fn read_csv(&self, ctx: &StepContext<'_>, path: &str) -> Result<Vec<Record>> {
            self.log(&format!("read_csv {path}"));
            Ok((1..=3)
                .map(|i| Record::new().with("id", i64::from(i)).with("name", format!("n{i}")))
                .map(|record| record.conform(ctx.schema))
                .collect())
        }

        fn dataset_filter(
            &self,
            _ctx: &StepContext<'_>,
            input: Vec<Record>,
            predicate: &PredicateFn,
        ) -> Result<Vec<Record>> {
            self.log("filter");
            Ok(input.into_iter().filter(|record| predicate(record)).collect())
        }

        fn dataset_join_left(
            &self,
            ctx: &StepContext<'_>,
            left: Vec<Record>,
            left_key: &KeyFn,
            joins: Vec<JoinInput<Vec<Record>>>,
        ) -> Result<Vec<Record>> {
            self.log(&format!("join {}", joins.len()));
            Ok(left
                .iter()
                .map(|record| {
                    let mut joined = record.clone();
                    for join in &joins {
                        let key = left_key(record);
                        let matches: Vec<Value> = join.sources[0]
                            .iter()
                            .filter(|right| (join.key)(*right) == key)
                            .map(|right| Value::Record(right.clone()))
                            .collect();
                        joined.set(&join.field_name, matches);
                    }
                    joined.conform(ctx.schema)
                })
                .collect())
        }

        fn materialize(&self, _ctx: &StepContext<'_>, dataset: Vec<Record>) -> Result<Vec<Record>> {
            Ok(dataset)
        }
    }

    fn item() -> RecordType {
        RecordType::new("walker.Item")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
    }

    #[test]
    fn test_shared_step_is_translated_once() {
        let paired = RecordType::new("walker.Paired")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
            .field("same", DataType::List(Box::new(item().into())));

        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(item(), "items.csv").unwrap();
        let filtered = pipeline
            .filter(read, |r| r.value("id") != Value::Int(2), FieldUsage::unknown())
            .unwrap();
        let joined = pipeline
            .join_left(
                filtered,
                paired,
                |r| r.value("id"),
                &[JoinDescriptor::multi("same", read, |r| r.value("id"))],
                FieldUsage::unknown(),
            )
            .unwrap();

        let plan = CollectPlan::build(&pipeline, joined, &CollectOptions::default()).unwrap();
        let engine = TracingEngine::default();
        let mut walker = PipelineWalker::new(&engine, &pipeline, &plan);
        let records = walker.walk(joined).unwrap();

        assert_eq!(walker.translated(), 3);
        assert_eq!(
            *engine.calls.borrow(),
            vec!["read_csv items.csv", "filter", "join 1"]
        );
        assert_eq!(records.len(), 2);
        let same = records[1].get("same").and_then(Value::as_list).unwrap();
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn test_collect_reports_missing_operation() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(item(), "items.csv").unwrap();
        let limited = pipeline.limit(read, 1).unwrap();
        let options = CollectOptions::default();
        let result = TracingEngine::default().dataset_collect(&pipeline, limited, &options);
        assert!(matches!(
            result,
            Err(Error::NotImplementedForEngine { ref operation, .. })
                if operation == "dataset_limit"
        ));
    }
}

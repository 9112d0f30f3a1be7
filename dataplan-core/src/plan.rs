//! Per-collect resolution of step schemas

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::engine::{CollectOptions, StepContext};
use crate::error::Result;
use crate::join::JoinSpec;
use crate::pipeline::{Pipeline, StepDescription};
use crate::schema::Schema;
use crate::step::{Step, StepId};
use crate::updater::SchemaFieldsUpdater;
use crate::usage::FieldUsageCollector;

/// Schemas and joins a backend should use when collecting one target
#[derive(Debug, Clone)]
pub struct CollectPlan {
    target: StepId,
    options: CollectOptions,
    schemas: BTreeMap<StepId, Schema>,
    active_joins: BTreeMap<StepId, BTreeSet<String>>,
}

impl CollectPlan {
    /// Run field usage collection and schema rewriting for `target`, unless
    /// column pruning is disabled
    pub fn build(pipeline: &Pipeline, target: StepId, options: &CollectOptions) -> Result<Self> {
        pipeline.step(target)?;
        let mut plan = Self {
            target,
            options: options.clone(),
            schemas: BTreeMap::new(),
            active_joins: BTreeMap::new(),
        };
        if options.disable_column_pruning {
            info!(target = %target, "column pruning disabled");
            return Ok(plan);
        }

        let collector = FieldUsageCollector::collect(pipeline, target)?;
        let mut updater = SchemaFieldsUpdater::new();
        updater.update_step(pipeline, &collector, target)?;
        (plan.schemas, plan.active_joins) = updater.into_parts();
        Ok(plan)
    }

    /// Schema `step` produces under this plan
    pub fn schema<'a>(&'a self, step: &'a Step) -> &'a Schema {
        self.schemas.get(&step.id()).unwrap_or(step.schema())
    }

    /// Right-hand joins `step` performs under this plan
    pub fn active_joins<'a>(&self, step: &'a Step) -> Vec<&'a JoinSpec> {
        match self.active_joins.get(&step.id()) {
            Some(active) => step
                .joins()
                .iter()
                .filter(|join| active.contains(join.field_name()))
                .collect(),
            None => step.joins().iter().collect(),
        }
    }

    /// Backend context for translating `step`
    pub fn context<'a>(&'a self, step: &'a Step) -> StepContext<'a> {
        StepContext {
            step,
            schema: self.schema(step),
            options: &self.options,
        }
    }

    /// Describe the steps feeding the target with their resolved schemas
    pub fn describe(&self, pipeline: &Pipeline) -> Result<Vec<StepDescription>> {
        let reachable = pipeline.reachable(self.target)?;
        let mut described = Vec::with_capacity(reachable.len());
        for id in reachable {
            let step = pipeline.step(id)?;
            // Right-hand sources of skipped joins are never translated
            if self.options.disable_column_pruning || self.schemas.contains_key(&id) {
                described.push(StepDescription::new(step, self.schema(step)));
            }
        }
        Ok(described)
    }
}

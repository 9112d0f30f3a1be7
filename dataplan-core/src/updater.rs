//! Forward pass rewriting step schemas to the fields used downstream
//!
//! Leaves are restricted to the fields the [`FieldUsageCollector`] found for
//! their record type. Each restriction is remembered by record type name and
//! replayed on every later schema of that type, and on every struct column
//! nested anywhere inside a later schema, so a record type is pruned the same
//! way wherever it appears.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::schema::{Column, Schema};
use crate::step::{Operation, Step, StepId};
use crate::usage::FieldUsageCollector;

/// Schema rewriting state for one collect call
#[derive(Debug, Clone, Default)]
pub struct SchemaFieldsUpdater {
    /// Rewritten columns by record type name
    updated_types: HashMap<String, Vec<Column>>,
    /// Schemas to start from instead of the declared ones
    initial: BTreeMap<StepId, Schema>,
    /// Rewritten schemas of the steps visited so far
    schemas: BTreeMap<StepId, Schema>,
    /// Right-hand join fields performed by each join step
    active_joins: BTreeMap<StepId, BTreeSet<String>>,
}

impl SchemaFieldsUpdater {
    /// Create an updater starting from the steps' declared schemas
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an updater starting from previously rewritten schemas
    pub fn starting_from(schemas: BTreeMap<StepId, Schema>) -> Self {
        Self {
            initial: schemas,
            ..Self::default()
        }
    }

    /// Rewrite the schema of `id` and of every step it reads from.
    ///
    /// Once the graph is visited, nested columns of every rewritten schema are
    /// brought in line with restrictions recorded after that schema was visited.
    pub fn update_step(
        &mut self,
        pipeline: &Pipeline,
        collector: &FieldUsageCollector,
        id: StepId,
    ) -> Result<()> {
        self.visit(pipeline, collector, id)?;
        self.replay_nested();
        Ok(())
    }

    fn replay_nested(&mut self) {
        let mut schemas = std::mem::take(&mut self.schemas);
        for schema in schemas.values_mut() {
            for column in schema.columns_mut() {
                self.update_column(column);
            }
        }
        self.schemas = schemas;
    }

    fn visit(
        &mut self,
        pipeline: &Pipeline,
        collector: &FieldUsageCollector,
        id: StepId,
    ) -> Result<()> {
        if self.schemas.contains_key(&id) {
            return Ok(());
        }
        let step = pipeline.step(id)?;
        let mut schema = self.initial.get(&id).unwrap_or(step.schema()).clone();

        match step.operation() {
            Operation::Empty | Operation::ReadCsv { .. } | Operation::ReadParquet { .. } => {
                let used = collector.used_fields(step.seed());
                self.update_with_fields_used(&mut schema, used.as_deref());
                self.update_fields(&mut schema);
            }
            Operation::JoinLeft { .. } => {
                self.update_join(pipeline, collector, step, &mut schema)?;
            }
            Operation::Filter { .. }
            | Operation::Map { .. }
            | Operation::FlatMap { .. }
            | Operation::Aggregate { .. }
            | Operation::Limit { .. } => {
                self.visit(pipeline, collector, source_of(step)?)?;
                self.update_fields(&mut schema);
            }
        }

        self.schemas.insert(id, schema);
        Ok(())
    }

    fn update_join(
        &mut self,
        pipeline: &Pipeline,
        collector: &FieldUsageCollector,
        step: &Step,
        schema: &mut Schema,
    ) -> Result<()> {
        let source = source_of(step)?;
        self.visit(pipeline, collector, source)?;
        let mut kept = self
            .schemas
            .get(&source)
            .map(Schema::column_names)
            .unwrap_or_default();

        let used = collector.used_fields(step.seed());
        let mut active = BTreeSet::new();
        for join in step.joins() {
            let needed = used
                .as_ref()
                .map_or(true, |used| used.iter().any(|field| field == join.field_name()));
            if !needed {
                info!(step = %step, field = join.field_name(), "skipping unused join");
                continue;
            }
            active.insert(join.field_name().to_string());
            kept.push(join.field_name().to_string());
            kept.extend(join.index_field_name());
            for &right in join.sources() {
                self.visit(pipeline, collector, right)?;
            }
        }

        self.update_fields(schema);
        self.update_with_fields_used(schema, Some(kept.as_slice()));
        self.active_joins.insert(step.id(), active);
        Ok(())
    }

    /// Keep only `fields_used` in `schema` and remember the restriction for its
    /// record type. No restriction, or an empty one, leaves the schema as is.
    pub fn update_with_fields_used<S: AsRef<str>>(
        &mut self,
        schema: &mut Schema,
        fields_used: Option<&[S]>,
    ) -> bool {
        let Some(fields_used) = fields_used.filter(|fields| !fields.is_empty()) else {
            return false;
        };
        schema.retain_columns(fields_used);
        for column in schema.columns_mut() {
            self.update_column(column);
        }
        info!(
            schema = schema.name(),
            columns = ?schema.column_names(),
            "restricting schema"
        );
        self.updated_types
            .insert(schema.name().to_string(), schema.columns().to_vec());
        true
    }

    /// Replay earlier restrictions on `schema` and its nested columns
    pub fn update_fields(&mut self, schema: &mut Schema) -> bool {
        if let Some(columns) = self.updated_types.get(schema.name()) {
            schema.set_columns(columns.clone());
            for column in schema.columns_mut() {
                self.update_column(column);
            }
            info!(
                schema = schema.name(),
                columns = ?schema.column_names(),
                "updating schema"
            );
            return true;
        }
        let mut updated = false;
        for column in schema.columns_mut() {
            updated |= self.update_column(column);
        }
        if updated {
            self.updated_types
                .insert(schema.name().to_string(), schema.columns().to_vec());
        }
        updated
    }

    /// Replay earlier restrictions on the record nested in `column`
    pub fn update_column(&self, column: &mut Column) -> bool {
        let Some(nested) = column.nested.as_mut() else {
            return false;
        };
        if let Some(columns) = self.updated_types.get(nested.name()) {
            if nested.columns() != columns.as_slice() {
                nested.set_columns(columns.clone());
                info!(
                    column = %column.name,
                    record_type = nested.name(),
                    columns = ?nested.column_names(),
                    "updating nested column"
                );
            }
            for field in nested.columns_mut() {
                self.update_column(field);
            }
            return true;
        }
        let mut updated = false;
        for field in nested.columns_mut() {
            updated |= self.update_column(field);
        }
        updated
    }

    /// Rewritten schema of a visited step
    pub fn schema(&self, id: StepId) -> Option<&Schema> {
        self.schemas.get(&id)
    }

    /// Rewritten schemas and performed join fields of every visited step
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<StepId, Schema>,
        BTreeMap<StepId, BTreeSet<String>>,
    ) {
        (self.schemas, self.active_joins)
    }
}

fn source_of(step: &Step) -> Result<StepId> {
    step.source()
        .ok_or_else(|| Error::Execution(format!("{step} has no source")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinDescriptor;
    use crate::schema::{DataType, RecordType};
    use crate::step::FieldUsage;
    use crate::value::{Record, Value};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn person() -> Arc<RecordType> {
        Arc::new(
            RecordType::new("updater.Person")
                .field("id", DataType::Int64)
                .field("name", DataType::String)
                .field("email", DataType::String)
                .field("age", DataType::Int32)
                .field("city", DataType::String),
        )
    }

    fn wrapped() -> RecordType {
        RecordType::new("updater.Wrapped").field("person", person().into())
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn resolve(pipeline: &Pipeline, target: StepId) -> BTreeMap<StepId, Schema> {
        init_tracing();
        let collector = FieldUsageCollector::collect(pipeline, target).unwrap();
        let mut updater = SchemaFieldsUpdater::new();
        updater.update_step(pipeline, &collector, target).unwrap();
        updater.into_parts().0
    }

    #[test]
    fn test_restriction_reaches_nested_columns() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_parquet(person(), "people.parquet").unwrap();
        let mapped = pipeline
            .map(
                read,
                wrapped(),
                |p| Record::new().with("person", p.clone()),
                FieldUsage::of(&person(), ["name"]),
            )
            .unwrap();

        let schemas = resolve(&pipeline, mapped);
        assert_eq!(schemas[&read].column_names(), vec!["name"]);
        let nested = schemas[&mapped].column_by_name("person").unwrap();
        assert_eq!(nested.nested.as_ref().unwrap().column_names(), vec!["name"]);
    }

    #[test]
    fn test_unrestricted_schema_is_unchanged() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(person(), "people.csv").unwrap();
        let filtered = pipeline
            .filter(read, |p| !p.value("name").is_null(), FieldUsage::of(&person(), ["name"]))
            .unwrap();
        let schemas = resolve(&pipeline, filtered);
        assert_eq!(&schemas[&read], pipeline.step(read).unwrap().schema());
        assert_eq!(&schemas[&filtered], pipeline.step(filtered).unwrap().schema());
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(person(), "people.csv").unwrap();
        let filtered = pipeline
            .filter(read, |p| p.value("age") > Value::Int(18), FieldUsage::of(&person(), ["age"]))
            .unwrap();
        let mapped = pipeline
            .map(
                filtered,
                wrapped(),
                |p| Record::new().with("person", p.clone()),
                FieldUsage::of(&person(), ["city", "id"]),
            )
            .unwrap();

        let collector = FieldUsageCollector::collect(&pipeline, mapped).unwrap();
        let mut first = SchemaFieldsUpdater::new();
        first.update_step(&pipeline, &collector, mapped).unwrap();
        let (once, _) = first.into_parts();
        assert_eq!(once[&read].column_names(), vec!["id", "age", "city"]);

        let mut second = SchemaFieldsUpdater::starting_from(once.clone());
        second.update_step(&pipeline, &collector, mapped).unwrap();
        let (twice, _) = second.into_parts();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unused_join_is_skipped() {
        let visit = RecordType::new("updater.Visit")
            .field("person_id", DataType::Int64)
            .field("page", DataType::String);
        let enriched = RecordType::new("updater.Enriched")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
            .field("visits", DataType::List(Box::new(visit.clone().into())))
            .field("last_visit", visit.clone().into());
        let summary = RecordType::new("updater.Summary").field("name", DataType::String);

        let mut pipeline = Pipeline::new();
        let people = pipeline.read_csv(person(), "people.csv").unwrap();
        let visits = pipeline.read_csv(visit.clone(), "visits.csv").unwrap();
        let last = pipeline.read_csv(visit, "last.csv").unwrap();
        let joined = pipeline
            .join_left(
                people,
                enriched.clone(),
                |p| p.value("id"),
                &[
                    JoinDescriptor::multi("visits", visits, |v| v.value("person_id")),
                    JoinDescriptor::single("last_visit", last, |v| v.value("person_id")),
                ],
                FieldUsage::of(&person(), ["id", "name"]),
            )
            .unwrap();
        let mapped = pipeline
            .map(
                joined,
                summary,
                |r| Record::new().with("name", r.value("name")),
                FieldUsage::of(&enriched, ["name", "visits"]),
            )
            .unwrap();

        let collector = FieldUsageCollector::collect(&pipeline, mapped).unwrap();
        let mut updater = SchemaFieldsUpdater::new();
        updater.update_step(&pipeline, &collector, mapped).unwrap();
        assert!(updater.schema(visits).is_some());
        assert!(updater.schema(last).is_none());

        let (schemas, active) = updater.into_parts();
        assert_eq!(schemas[&people].column_names(), vec!["id", "name"]);
        assert_eq!(schemas[&joined].column_names(), vec!["id", "name", "visits"]);
        assert_eq!(active[&joined], BTreeSet::from(["visits".to_string()]));
    }

    #[test]
    fn test_shared_type_is_restricted_at_every_use() {
        let address = RecordType::new("updater.Address")
            .field("street", DataType::String)
            .field("city", DataType::String);
        let resident = RecordType::new("updater.Person")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
            .field("home", address.clone().into());
        let located = RecordType::new("updater.Located")
            .field("id", DataType::Int64)
            .field("home", address.clone().into())
            .field("places", DataType::List(Box::new(address.clone().into())));
        let summary = RecordType::new("updater.Count").field("id", DataType::Int64);

        let mut pipeline = Pipeline::new();
        let people = pipeline.read_csv(resident.clone(), "people.csv").unwrap();
        let places = pipeline.read_csv(address.clone(), "places.csv").unwrap();
        let joined = pipeline
            .join_left(
                people,
                located.clone(),
                |p| p.value("id"),
                &[JoinDescriptor::multi("places", places, |a| a.value("city"))],
                FieldUsage::of(&resident, ["id", "home"]).and(&address, ["city"]),
            )
            .unwrap();
        let mapped = pipeline
            .map(
                joined,
                summary,
                |r| Record::new().with("id", r.value("id")),
                FieldUsage::of(&located, ["id", "home", "places"]),
            )
            .unwrap();

        let schemas = resolve(&pipeline, mapped);
        let nested = |step: StepId, column: &str| {
            schemas[&step]
                .column_by_name(column)
                .and_then(|c| c.nested.as_ref())
                .map(Schema::column_names)
                .unwrap()
        };
        assert_eq!(schemas[&places].column_names(), vec!["city"]);
        assert_eq!(schemas[&people].column_names(), vec!["id", "home"]);
        assert_eq!(nested(people, "home"), vec!["city"]);
        assert_eq!(nested(joined, "home"), vec!["city"]);
        assert_eq!(nested(joined, "places"), vec!["city"]);
    }

    proptest! {
        #[test]
        fn prop_restriction_preserves_column_order(
            mask in proptest::collection::vec(any::<bool>(), 5)
        ) {
            let mut schema = Schema::from_record_type(&person()).unwrap();
            let original = schema.column_names();
            let mut used: Vec<String> = original
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| **keep)
                .map(|(name, _)| name.clone())
                .collect();
            used.reverse();

            let mut updater = SchemaFieldsUpdater::new();
            updater.update_with_fields_used(&mut schema, Some(used.as_slice()));
            let kept = schema.column_names();
            let expected: Vec<String> = if used.is_empty() {
                original.clone()
            } else {
                original.iter().filter(|name| used.contains(name)).cloned().collect()
            };
            prop_assert_eq!(kept, expected);
        }
    }
}

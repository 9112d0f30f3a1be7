//! Backward pass collecting which fields of each record type are read
//! downstream of a collect target

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::schema::RecordType;
use crate::step::{Step, StepId};

/// Field usage gathered for one collect call, keyed by record type name
#[derive(Debug, Clone, Default)]
pub struct FieldUsageCollector {
    usage: HashMap<String, BTreeSet<String>>,
    unrestricted: HashSet<String>,
}

impl FieldUsageCollector {
    /// Walk the graph feeding `target` and gather field usage
    pub fn collect(pipeline: &Pipeline, target: StepId) -> Result<Self> {
        let mut collector = Self::default();
        let mut visited = HashSet::new();
        collector.visit(pipeline, target, true, &mut visited)?;
        debug!(
            target = %target,
            types = collector.usage.len(),
            unrestricted = collector.unrestricted.len(),
            "collected field usage"
        );
        Ok(collector)
    }

    fn visit(
        &mut self,
        pipeline: &Pipeline,
        id: StepId,
        direct_collect: bool,
        visited: &mut HashSet<(StepId, bool)>,
    ) -> Result<()> {
        if !visited.insert((id, direct_collect)) {
            return Ok(());
        }
        let step = pipeline.step(id)?;
        if direct_collect {
            self.unrestricted.insert(step.seed().name().to_string());
        }
        self.record_usage(pipeline, step)?;

        if let Some(source) = step.source() {
            let propagate = direct_collect && step.kind().propagates_direct_collect();
            self.visit(pipeline, source, propagate, visited)?;
        }
        for join in step.joins() {
            for &right in join.sources() {
                self.visit(pipeline, right, direct_collect, visited)?;
            }
        }
        Ok(())
    }

    fn record_usage(&mut self, pipeline: &Pipeline, step: &Step) -> Result<()> {
        if !step.kind().applies_function() {
            return Ok(());
        }
        match step.usage().declared() {
            Some(declared) => {
                for (type_name, fields) in declared {
                    self.usage
                        .entry(type_name.clone())
                        .or_default()
                        .extend(fields.iter().cloned());
                }
            }
            // Opaque function: everything it reads is used in full
            None => {
                for input in step.inputs() {
                    let seed = pipeline.step(input)?.seed();
                    self.unrestricted.insert(seed.name().to_string());
                }
            }
        }
        Ok(())
    }

    /// Whether `type_name` must keep all of its fields
    pub fn is_unrestricted(&self, type_name: &str) -> bool {
        self.unrestricted.contains(type_name)
    }

    /// Fields of `record_type` read downstream, in declared field order.
    ///
    /// `None` means no restriction applies.
    pub fn used_fields(&self, record_type: &RecordType) -> Option<Vec<String>> {
        if self.is_unrestricted(record_type.name()) {
            return None;
        }
        let used = self.usage.get(record_type.name())?;
        Some(
            record_type
                .field_names()
                .into_iter()
                .filter(|name| used.contains(*name))
                .map(str::to_string)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregation;
    use crate::join::JoinDescriptor;
    use crate::schema::DataType;
    use crate::step::FieldUsage;
    use crate::value::{Record, Value};

    fn sale() -> RecordType {
        RecordType::new("usage.Sale")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
            .field("amount", DataType::Float64)
            .field("note", DataType::String)
    }

    fn total() -> RecordType {
        RecordType::new("usage.Total")
            .field("name", DataType::String)
            .field("amount", DataType::Float64)
    }

    #[test]
    fn test_declared_usage_in_field_order() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(sale(), "sales.csv").unwrap();
        let filtered = pipeline
            .filter(
                read,
                |r| r.value("amount") > Value::Float(0.0),
                FieldUsage::of(&sale(), ["amount"]),
            )
            .unwrap();
        let aggregated = pipeline
            .aggregate(
                filtered,
                total(),
                |r| {
                    Aggregation::new()
                        .group_by("name", r.value("name"))
                        .sum("amount", r.value("amount"))
                },
                FieldUsage::of(&sale(), ["name", "amount"]),
            )
            .unwrap();
        let limited = pipeline.limit(aggregated, 10).unwrap();

        let collector = FieldUsageCollector::collect(&pipeline, limited).unwrap();
        assert_eq!(
            collector.used_fields(&sale()),
            Some(vec!["name".to_string(), "amount".to_string()])
        );
        assert_eq!(collector.used_fields(&total()), None);
    }

    #[test]
    fn test_direct_collect_through_filter_is_unrestricted() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(sale(), "sales.csv").unwrap();
        let filtered = pipeline
            .filter(read, |r| !r.value("name").is_null(), FieldUsage::of(&sale(), ["name"]))
            .unwrap();
        let collector = FieldUsageCollector::collect(&pipeline, filtered).unwrap();
        assert!(collector.is_unrestricted("usage.Sale"));
        assert_eq!(collector.used_fields(&sale()), None);
    }

    #[test]
    fn test_unknown_usage_marks_inputs_unrestricted() {
        let mut pipeline = Pipeline::new();
        let read = pipeline.read_csv(sale(), "sales.csv").unwrap();
        let mapped = pipeline
            .map(
                read,
                total(),
                |r| Record::new().with("name", r.value("name")).with("amount", r.value("amount")),
                FieldUsage::unknown(),
            )
            .unwrap();
        let collector = FieldUsageCollector::collect(&pipeline, mapped).unwrap();
        assert_eq!(collector.used_fields(&sale()), None);
    }

    #[test]
    fn test_join_fans_out_with_join_direct_collect() {
        let person = RecordType::new("usage.Person")
            .field("id", DataType::Int64)
            .field("name", DataType::String);
        let enriched = RecordType::new("usage.Enriched")
            .field("id", DataType::Int64)
            .field("name", DataType::String)
            .field("sales", DataType::List(Box::new(sale().into())));

        let mut pipeline = Pipeline::new();
        let people = pipeline.read_csv(person.clone(), "people.csv").unwrap();
        let sales = pipeline.read_csv(sale(), "sales.csv").unwrap();
        let joined = pipeline
            .join_left(
                people,
                enriched,
                |p| p.value("name"),
                &[JoinDescriptor::multi("sales", sales, |s| s.value("name"))],
                FieldUsage::of(&person, ["id", "name"]).and(&sale(), ["name"]),
            )
            .unwrap();

        // The join itself is collected directly, so do its right-hand sources
        let collector = FieldUsageCollector::collect(&pipeline, joined).unwrap();
        assert_eq!(collector.used_fields(&sale()), None);
        assert_eq!(
            collector.used_fields(&person),
            Some(vec!["id".to_string(), "name".to_string()])
        );

        let summary = RecordType::new("usage.Summary").field("name", DataType::String);
        let mapped = pipeline
            .map(
                joined,
                summary,
                |r| Record::new().with("name", r.value("name")),
                FieldUsage::of(&RecordType::new("usage.Enriched"), ["name", "sales"]),
            )
            .unwrap();
        let collector = FieldUsageCollector::collect(&pipeline, mapped).unwrap();
        assert_eq!(collector.used_fields(&sale()), Some(vec!["name".to_string()]));
    }
}

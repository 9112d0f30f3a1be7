//! Grouping and aggregation of in-memory records

use std::collections::{HashMap, HashSet};

use dataplan_core::functions::AggregateFn;
use dataplan_core::{AggKind, AggregateSpec, Record, Result, Schema, Value};

/// Running state of one aggregated field
#[derive(Debug, Clone)]
enum Accumulator {
    Key(Value),
    Count(i64),
    Min(Option<Value>),
    Max(Option<Value>),
    Sum {
        int: i64,
        float: f64,
        all_int: bool,
        seen: bool,
    },
    Mean {
        total: f64,
        count: u64,
    },
    ToSet(Vec<Value>, HashSet<Value>),
    ToArray(Vec<Value>),
    CountDistinct(HashSet<Value>),
}

impl Accumulator {
    fn new(kind: AggKind) -> Self {
        match kind {
            AggKind::GroupBy => Accumulator::Key(Value::Null),
            AggKind::Count => Accumulator::Count(0),
            AggKind::Min => Accumulator::Min(None),
            AggKind::Max => Accumulator::Max(None),
            AggKind::Sum => Accumulator::Sum {
                int: 0,
                float: 0.0,
                all_int: true,
                seen: false,
            },
            AggKind::Mean => Accumulator::Mean {
                total: 0.0,
                count: 0,
            },
            AggKind::ToSet => Accumulator::ToSet(Vec::new(), HashSet::new()),
            AggKind::ToArray => Accumulator::ToArray(Vec::new()),
            AggKind::CountDistinct => Accumulator::CountDistinct(HashSet::new()),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, value: Value) {
        match self {
            Accumulator::Key(key) => *key = value,
            Accumulator::ToArray(values) => values.push(value),
            _ if value.is_null() => {}
            Accumulator::Count(count) => *count += 1,
            Accumulator::Min(current) => {
                if current.as_ref().map_or(true, |current| value < *current) {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if current.as_ref().map_or(true, |current| value > *current) {
                    *current = Some(value);
                }
            }
            Accumulator::Sum {
                int,
                float,
                all_int,
                seen,
            } => {
                *seen = true;
                match value {
                    Value::Int(v) if *all_int => match int.checked_add(v) {
                        Some(sum) => *int = sum,
                        None => {
                            *all_int = false;
                            *float = *int as f64 + v as f64;
                        }
                    },
                    other => {
                        if *all_int {
                            *all_int = false;
                            *float = *int as f64;
                        }
                        *float += other.as_f64().unwrap_or(0.0);
                    }
                }
            }
            Accumulator::Mean { total, count } => {
                if let Some(v) = value.as_f64() {
                    *total += v;
                    *count += 1;
                }
            }
            Accumulator::ToSet(values, seen) => {
                if seen.insert(value.clone()) {
                    values.push(value);
                }
            }
            Accumulator::CountDistinct(seen) => {
                seen.insert(value);
            }
        }
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    fn finish(self) -> Value {
        match self {
            Accumulator::Key(value) => value,
            Accumulator::Count(count) => Value::Int(count),
            Accumulator::Min(value) | Accumulator::Max(value) => value.unwrap_or(Value::Null),
            Accumulator::Sum {
                int,
                float,
                all_int,
                seen,
            } => match (seen, all_int) {
                (false, _) => Value::Null,
                (true, true) => Value::Int(int),
                (true, false) => Value::Float(float),
            },
            Accumulator::Mean { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(total / count as f64)
                }
            }
            Accumulator::ToSet(values, _) | Accumulator::ToArray(values) => Value::List(values),
            Accumulator::CountDistinct(seen) => Value::Int(seen.len() as i64),
        }
    }
}

/// Group `records` by the `group_by` values `builder` produces and aggregate
/// the other values as laid out by `spec`.
///
/// Groups come out in order of first appearance. Without any `group_by` field
/// exactly one record is produced, even for empty input.
pub fn aggregate(
    records: &[Record],
    builder: &AggregateFn,
    spec: &AggregateSpec,
    schema: &Schema,
) -> Result<Vec<Record>> {
    let fresh = || -> Vec<Accumulator> {
        spec.entries()
            .iter()
            .map(|(kind, _)| Accumulator::new(*kind))
            .collect()
    };
    let key_positions: Vec<usize> = spec
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, (kind, _))| *kind == AggKind::GroupBy)
        .map(|(i, _)| i)
        .collect();

    let mut groups: Vec<Vec<Accumulator>> = Vec::new();
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    if key_positions.is_empty() {
        groups.push(fresh());
        index.insert(Vec::new(), 0);
    }

    for record in records {
        let aggregation = builder(record);
        spec.check(&aggregation)?;
        let values = aggregation.into_values();
        let key: Vec<Value> = key_positions.iter().map(|&i| values[i].clone()).collect();
        let group = *index.entry(key).or_insert_with(|| {
            groups.push(fresh());
            groups.len() - 1
        });
        for (accumulator, value) in groups[group].iter_mut().zip(values) {
            accumulator.add(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|accumulators| {
            spec.entries()
                .iter()
                .zip(accumulators)
                .map(|((_, name), accumulator)| (name.clone(), accumulator.finish()))
                .collect::<Record>()
                .conform(schema)
        })
        .collect())
}

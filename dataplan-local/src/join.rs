//! Left joins of in-memory records

use std::collections::HashMap;

use dataplan_core::functions::KeyFn;
use dataplan_core::{Error, JoinInput, JoinKind, Record, Result, Schema, Value};

use crate::engine::Rows;

/// Right-hand records of one join, indexed by key
struct JoinIndex<'a> {
    input: &'a JoinInput<Rows>,
    matches: HashMap<Value, Vec<(usize, &'a Record)>>,
}

impl<'a> JoinIndex<'a> {
    fn build(input: &'a JoinInput<Rows>) -> Self {
        let mut matches: HashMap<Value, Vec<(usize, &Record)>> = HashMap::new();
        // Sources in declaration order, so matches are grouped by ordinal
        for (ordinal, source) in input.sources.iter().enumerate() {
            for record in source.iter() {
                let key = (input.key)(record);
                if !key.is_null() {
                    matches.entry(key).or_default().push((ordinal, record));
                }
            }
        }
        Self { input, matches }
    }

    fn attach(&self, key: &Value, joined: &mut Record) -> Result<()> {
        let found = self.matches.get(key).map_or(&[][..], Vec::as_slice);
        let field = &self.input.field_name;
        let records = || -> Vec<Value> {
            found
                .iter()
                .map(|(_, record)| Value::Record((*record).clone()))
                .collect()
        };
        match self.input.kind {
            JoinKind::Single => {
                let value = match found {
                    [] => Value::Null,
                    [(_, record)] => Value::Record((*record).clone()),
                    _ => {
                        return Err(Error::Execution(format!(
                            "join field `{field}` expects at most one match, \
                             found {} for key {key}",
                            found.len()
                        )))
                    }
                };
                joined.set(field, value);
            }
            JoinKind::Multi => joined.set(field, records()),
            JoinKind::MultiArray => {
                joined.set(field, records());
                if let Some(index_field) = &self.input.index_field {
                    let ordinals: Vec<Value> = found
                        .iter()
                        .map(|(ordinal, _)| Value::Int(i64::try_from(*ordinal).unwrap_or(i64::MAX)))
                        .collect();
                    joined.set(index_field, ordinals);
                }
            }
        }
        Ok(())
    }
}

/// Attach the matching right-hand records of every join to each left record.
///
/// Records whose key is null match nothing.
pub fn join_left(
    left: &[Record],
    left_key: &KeyFn,
    joins: &[JoinInput<Rows>],
    schema: &Schema,
) -> Result<Vec<Record>> {
    let indexes: Vec<JoinIndex<'_>> = joins.iter().map(JoinIndex::build).collect();
    left.iter()
        .map(|record| {
            let key = left_key(record);
            let mut joined = record.clone();
            for index in &indexes {
                index.attach(&key, &mut joined)?;
            }
            Ok(joined.conform(schema))
        })
        .collect()
}

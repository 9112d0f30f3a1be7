//! Projection of Parquet file schemas onto pipeline schemas

use std::sync::Arc;

use parquet::basic::ConvertedType;
use parquet::schema::types::{Type as SchemaType, TypePtr};

use dataplan_core::{Column, Schema};

use crate::error::{Error, Result};

/// Restrict the file schema `root` to the columns of `schema`.
///
/// Struct columns are restricted to their nested schema. A nullable column the
/// file lacks is left out and reads as null.
pub fn project(root: &SchemaType, schema: &Schema) -> Result<SchemaType> {
    let mut fields = project_fields(root.get_fields(), schema.columns(), schema.name())?;
    Ok(SchemaType::group_type_builder(root.name())
        .with_fields(&mut fields)
        .build()?)
}

fn project_fields(available: &[TypePtr], columns: &[Column], owner: &str) -> Result<Vec<TypePtr>> {
    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(field) = available.iter().find(|field| field.name() == column.name) else {
            if column.nullable {
                continue;
            }
            return Err(Error::Schema(format!(
                "column `{}` of {owner} not found in Parquet file",
                column.name
            )));
        };
        fields.push(project_field(field, column)?);
    }
    Ok(fields)
}

fn project_field(field: &TypePtr, column: &Column) -> Result<TypePtr> {
    let Some(nested) = &column.nested else {
        return Ok(Arc::clone(field));
    };
    let info = field.get_basic_info();
    let plain_group = field.is_group()
        && !matches!(
            info.converted_type(),
            ConvertedType::LIST | ConvertedType::MAP | ConvertedType::MAP_KEY_VALUE
        );
    if !plain_group {
        return Ok(Arc::clone(field));
    }

    let mut fields = project_fields(field.get_fields(), nested.columns(), nested.name())?;
    let mut builder = SchemaType::group_type_builder(field.name()).with_fields(&mut fields);
    if info.has_repetition() {
        builder = builder.with_repetition(info.repetition());
    }
    Ok(Arc::new(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataplan_core::{DataType, RecordType};
    use parquet::schema::parser::parse_message_type;

    #[test]
    fn test_project_top_level_and_nested() {
        let root = parse_message_type(
            "message person {
                REQUIRED INT64 id;
                REQUIRED BINARY name (UTF8);
                REQUIRED GROUP address {
                    REQUIRED BINARY street (UTF8);
                    REQUIRED BINARY city (UTF8);
                }
            }",
        )
        .unwrap();
        let address = RecordType::new("pq.Address")
            .field("street", DataType::String)
            .field("city", DataType::String);
        let mut schema = Schema::from_record_type(
            &RecordType::new("pq.Person")
                .field("id", DataType::Int64)
                .field("name", DataType::String)
                .field("address", address.into()),
        )
        .unwrap();
        let mut columns = schema.columns().to_vec();
        columns[2].nested.as_mut().unwrap().retain_columns(&["city"]);
        columns.remove(0);
        schema.set_columns(columns);

        let projected = project(&root, &schema).unwrap();
        let names: Vec<_> = projected.get_fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["name", "address"]);
        assert_eq!(projected.get_fields()[1].get_fields().len(), 1);
    }
}

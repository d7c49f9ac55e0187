// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Maps raw backend records onto typed rows.
//!
//! Every field declared by the schema is present on the produced row, so
//! editors and the renderer can rely on the shape. Values the backend omits
//! or sends in an unexpected type fall back to the field kind's default.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::{FieldKind, FieldSpec, FieldValue, ModelError, ResourceSchema, Row, RowId, RowPatch};

pub fn to_display_row(schema: &ResourceSchema, raw: &Value) -> Result<Row, ModelError> {
    let id = row_id_from(raw).ok_or(ModelError::MissingRowId)?;
    let fields = schema
        .fields
        .iter()
        .map(|spec| {
            let value = raw
                .get(&spec.name)
                .and_then(|value| coerce(spec, value))
                .unwrap_or_else(|| spec.default_value());
            (spec.name.clone(), value)
        })
        .collect::<BTreeMap<_, _>>();
    Ok(Row::new(id, fields))
}

/// Only the schema fields the backend actually sent. Unknown keys are dropped.
pub fn patch_from_json(schema: &ResourceSchema, raw: &Value) -> RowPatch {
    let mut patch = RowPatch {
        id: row_id_from(raw),
        fields: BTreeMap::new(),
    };
    let Some(object) = raw.as_object() else {
        return patch;
    };

    for spec in &schema.fields {
        let Some(value) = object.get(&spec.name) else {
            continue;
        };
        let value = coerce(spec, value).unwrap_or_else(|| spec.default_value());
        patch.fields.insert(spec.name.clone(), value);
    }
    patch
}

/// Full row from a create response patch. Fields the backend left out take
/// their defaults.
pub fn row_from_patch(schema: &ResourceSchema, patch: &RowPatch) -> Result<Row, ModelError> {
    let id = patch.id.ok_or(ModelError::MissingRowId)?;
    let fields = schema
        .fields
        .iter()
        .map(|spec| {
            let value = patch
                .fields
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| spec.default_value());
            (spec.name.clone(), value)
        })
        .collect::<BTreeMap<_, _>>();
    Ok(Row::new(id, fields))
}

pub fn rows_from_json(schema: &ResourceSchema, raw: &[Value]) -> Result<Vec<Row>, ModelError> {
    raw.iter().map(|item| to_display_row(schema, item)).collect()
}

fn row_id_from(raw: &Value) -> Option<RowId> {
    match raw.get("id")? {
        Value::Number(number) => number.as_i64().map(RowId::new),
        Value::String(text) => text.parse::<RowId>().ok(),
        _ => None,
    }
}

fn coerce(spec: &FieldSpec, raw: &Value) -> Option<FieldValue> {
    if raw.is_null() {
        return Some(spec.default_value());
    }

    match spec.kind {
        FieldKind::Text | FieldKind::LongText => text_of(raw).map(FieldValue::Text),
        FieldKind::Status => text_of(raw).map(FieldValue::Status),
        FieldKind::Integer => integer_of(raw).map(FieldValue::Integer),
        FieldKind::Decimal => decimal_of(raw).map(FieldValue::Decimal),
        FieldKind::Boolean => boolean_of(raw).map(FieldValue::Boolean),
        FieldKind::Date => raw
            .as_str()
            .and_then(crate::parse_date)
            .map(FieldValue::Date),
        FieldKind::Reference => {
            let id = match raw {
                Value::Object(object) => object.get("id").and_then(integer_of),
                other => integer_of(other),
            };
            id.map(FieldValue::Reference)
        }
    }
}

fn text_of(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn integer_of(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn decimal_of(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn boolean_of(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        Value::String(text) => match text.trim() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

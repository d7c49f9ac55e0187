// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use std::collections::BTreeMap;

use crate::{FieldKind, FieldSpec, FieldValue, ResourceSchema};

/// Values for a new record. Unlike inline edits, a create sends the whole
/// field set in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateForm {
    schema: ResourceSchema,
    values: BTreeMap<String, FieldValue>,
}

impl CreateForm {
    pub fn blank_for(schema: &ResourceSchema) -> Self {
        let values = schema
            .fields
            .iter()
            .filter(|spec| spec.editable)
            .map(|spec| (spec.name.clone(), spec.default_value()))
            .collect();
        Self {
            schema: schema.clone(),
            values,
        }
    }

    pub fn resource(&self) -> &str {
        &self.schema.name
    }

    pub fn path(&self) -> &str {
        &self.schema.path
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.schema.fields.iter().filter(|spec| spec.editable)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
        let spec = self.editable_spec(field)?;
        if !value.matches_kind(spec.kind) {
            bail!(
                "{} expects a {} value",
                spec.label,
                spec.kind.as_str().replace('_', " ")
            );
        }
        self.values.insert(field.to_owned(), value);
        Ok(())
    }

    /// Parses typed input the same way an inline text editor does.
    pub fn set_from_input(&mut self, field: &str, input: &str) -> Result<()> {
        let spec = self.editable_spec(field)?;
        let value = match spec.kind {
            FieldKind::Boolean => FieldValue::Boolean(matches!(
                input.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1" | "x"
            )),
            FieldKind::Status => {
                let trimmed = input.trim();
                spec.options
                    .iter()
                    .find(|option| option.label.eq_ignore_ascii_case(trimmed))
                    .map(|option| option.value.clone())
                    .unwrap_or_else(|| FieldValue::Status(trimmed.to_owned()))
            }
            FieldKind::Reference if input.trim().is_empty() => FieldValue::Null,
            FieldKind::Reference => {
                let trimmed = input.trim();
                let by_label = spec
                    .options
                    .iter()
                    .find(|option| option.label.eq_ignore_ascii_case(trimmed));
                match by_label {
                    Some(option) => option.value.clone(),
                    None => FieldValue::Reference(trimmed.parse().map_err(|_| {
                        anyhow!("{} must be an id or one of its option labels", spec.label)
                    })?),
                }
            }
            kind => crate::editors::parse_input(field, kind, input)?,
        };
        self.set(field, value)
    }

    pub fn validate(&self) -> Result<()> {
        for spec in self.fields() {
            let value = self
                .values
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| spec.default_value());
            if spec.required && is_blank(&value) {
                bail!("{} is required -- enter a value and retry", spec.label);
            }
            if !is_blank(&value) && !spec.accepts(&value) {
                let choices = spec
                    .options
                    .iter()
                    .map(|option| option.label.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                bail!("{} must be one of: {choices}", spec.label);
            }
        }
        Ok(())
    }

    /// Full field set as the request body for a create.
    pub fn to_body(&self) -> serde_json::Value {
        let object = self
            .values
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }

    fn editable_spec(&self, field: &str) -> Result<&FieldSpec> {
        let spec = self
            .schema
            .spec(field)
            .ok_or_else(|| anyhow!("{} has no field `{field}`", self.schema.label))?;
        if !spec.editable {
            bail!("{} is read-only", spec.label);
        }
        Ok(spec)
    }
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(text) | FieldValue::Status(text) => text.trim().is_empty(),
        _ => false,
    }
}

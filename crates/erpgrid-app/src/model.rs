// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use time::Date;
use time::macros::format_description;

use crate::ids::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    LongText,
    Integer,
    Decimal,
    Boolean,
    Date,
    Status,
    Reference,
}

impl FieldKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::LongText => "long_text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Status => "status",
            Self::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "long_text" => Some(Self::LongText),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "status" => Some(Self::Status),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }

    /// Kinds edited through a closed option set.
    pub const fn is_enum(self) -> bool {
        matches!(self, Self::Status | Self::Reference)
    }

    pub const fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Decimal | Self::Date | Self::Reference
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(Date),
    Status(String),
    Reference(i64),
}

impl FieldValue {
    /// Value a field of `kind` resolves to when the backend omits it.
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text | FieldKind::LongText => Self::Text(String::new()),
            FieldKind::Status => Self::Status(String::new()),
            FieldKind::Boolean => Self::Boolean(false),
            FieldKind::Integer | FieldKind::Decimal | FieldKind::Date | FieldKind::Reference => {
                Self::Null
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        match (self, kind) {
            (Self::Null, kind) => kind.is_nullable(),
            (Self::Text(_), FieldKind::Text | FieldKind::LongText) => true,
            (Self::Integer(_), FieldKind::Integer) => true,
            (Self::Decimal(_), FieldKind::Decimal) => true,
            (Self::Boolean(_), FieldKind::Boolean) => true,
            (Self::Date(_), FieldKind::Date) => true,
            (Self::Status(_), FieldKind::Status) => true,
            (Self::Reference(_), FieldKind::Reference) => true,
            _ => false,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(value) | Self::Status(value) => value.clone(),
            Self::Integer(value) | Self::Reference(value) => value.to_string(),
            Self::Decimal(value) => format!("{value:.2}"),
            Self::Boolean(true) => "yes".to_owned(),
            Self::Boolean(false) => "no".to_owned(),
            Self::Date(value) => format_date(*value),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Text(value) | Self::Status(value) => serde_json::Value::from(value.clone()),
            Self::Integer(value) | Self::Reference(value) => serde_json::Value::from(*value),
            Self::Decimal(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boolean(value) => serde_json::Value::from(*value),
            Self::Date(value) => serde_json::Value::from(format_date(*value)),
        }
    }
}

pub fn format_date(date: Date) -> String {
    date.format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(value: &str) -> Option<Date> {
    let trimmed = value.trim();
    // Timestamps such as "2026-01-05T00:00:00.000000Z" keep only the date part.
    let day = trimmed.get(..10).unwrap_or(trimmed);
    Date::parse(day, &format_description!("[year]-[month]-[day]")).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumOption {
    pub value: FieldValue,
    pub label: String,
}

impl EnumOption {
    pub fn status(value: &str, label: &str) -> Self {
        Self {
            value: FieldValue::Status(value.to_owned()),
            label: label.to_owned(),
        }
    }

    pub fn reference(id: i64, label: &str) -> Self {
        Self {
            value: FieldValue::Reference(id),
            label: label.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub editable: bool,
    pub options: Vec<EnumOption>,
}

impl FieldSpec {
    pub fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_owned(),
            label: label.to_owned(),
            kind,
            required: false,
            editable: true,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn with_options(mut self, options: Vec<EnumOption>) -> Self {
        self.options = options;
        self
    }

    pub fn default_value(&self) -> FieldValue {
        FieldValue::default_for(self.kind)
    }

    pub fn option_label(&self, value: &FieldValue) -> Option<&str> {
        self.options
            .iter()
            .find(|option| &option.value == value)
            .map(|option| option.label.as_str())
    }

    /// Whether `value` is a legal stored value for this field. Enum fields
    /// with a declared option set only accept members of that set; nullable
    /// references also accept `Null` (unassigned).
    pub fn accepts(&self, value: &FieldValue) -> bool {
        if !value.matches_kind(self.kind) {
            return false;
        }
        if !self.kind.is_enum() || self.options.is_empty() || value.is_null() {
            return true;
        }
        self.options.iter().any(|option| &option.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDependency {
    pub parent: String,
    pub clears: Vec<String>,
}

impl FieldDependency {
    pub fn new(parent: &str, clears: &[&str]) -> Self {
        Self {
            parent: parent.to_owned(),
            clears: clears.iter().map(|field| (*field).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("row id {0} appears more than once in the collection")]
    DuplicateRowId(RowId),
    #[error("record has no usable `id`")]
    MissingRowId,
    #[error("resource `{resource}` declares field `{field}` twice")]
    DuplicateField { resource: String, field: String },
    #[error("resource `{resource}` dependency references unknown field `{field}`")]
    UnknownDependencyField { resource: String, field: String },
    #[error("resource `{resource}` field `{field}` cannot clear itself")]
    SelfDependency { resource: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub name: String,
    pub label: String,
    pub path: String,
    pub fields: Vec<FieldSpec>,
    pub dependencies: Vec<FieldDependency>,
}

impl ResourceSchema {
    pub fn new(name: &str, label: &str, path: &str) -> Self {
        Self {
            name: name.to_owned(),
            label: label.to_owned(),
            path: path.to_owned(),
            fields: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn dependency(mut self, dependency: FieldDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Fields cleared in the same write when `parent` changes.
    pub fn dependents_of(&self, parent: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|dependency| dependency.parent == parent)
            .flat_map(|dependency| dependency.clears.iter().map(String::as_str))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = BTreeSet::new();
        for spec in &self.fields {
            if !seen.insert(spec.name.as_str()) {
                return Err(ModelError::DuplicateField {
                    resource: self.name.clone(),
                    field: spec.name.clone(),
                });
            }
        }

        for dependency in &self.dependencies {
            for field in std::iter::once(&dependency.parent).chain(dependency.clears.iter()) {
                if !seen.contains(field.as_str()) {
                    return Err(ModelError::UnknownDependencyField {
                        resource: self.name.clone(),
                        field: field.clone(),
                    });
                }
            }
            if dependency.clears.contains(&dependency.parent) {
                return Err(ModelError::SelfDependency {
                    resource: self.name.clone(),
                    field: dependency.parent.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RowId,
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new(id: RowId, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { id, fields }
    }

    pub const fn id(&self) -> RowId {
        self.id
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub(crate) fn set(&mut self, field: &str, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field.to_owned(), value)
    }
}

/// Partial row returned by the backend; `id` is only present on creates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowPatch {
    pub id: Option<RowId>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RowPatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn with(mut self, field: &str, value: FieldValue) -> Self {
        self.fields.insert(field.to_owned(), value);
        self
    }
}

/// Rows of the current page. Never holds two rows with the same id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    rows: Vec<Row>,
}

impl Collection {
    pub fn from_rows(rows: Vec<Row>) -> Result<Self, ModelError> {
        let mut seen = BTreeSet::new();
        for row in &rows {
            if !seen.insert(row.id) {
                return Err(ModelError::DuplicateRowId(row.id));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.id == id)
    }

    pub(crate) fn upsert(&mut self, row: Row) {
        match self.rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    pub(crate) fn remove(&mut self, id: RowId) -> Option<Row> {
        let index = self.rows.iter().position(|row| row.id == id)?;
        Some(self.rows.remove(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub row_id: RowId,
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeIntent {
    pub row_id: RowId,
    pub field: String,
    pub proposed_value: FieldValue,
    pub previous_value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Validation,
    Network,
    Server,
}

impl RejectionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Server => "server",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl Rejection {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Validation,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Network,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Server,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn with_field_error(mut self, field: &str, message: &str) -> Self {
        self.field_errors
            .entry(field.to_owned())
            .or_default()
            .push(message.to_owned());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomePayload {
    Committed(RowPatch),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn page_count(&self) -> u32 {
        if self.per_page == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Collection, EnumOption, FieldDependency, FieldKind, FieldSpec, FieldValue, ModelError,
        Page, ResourceSchema, Row, parse_date,
    };
    use crate::RowId;
    use std::collections::BTreeMap;
    use time::{Date, Month};

    fn row(id: i64) -> Row {
        Row::new(RowId::new(id), BTreeMap::new())
    }

    #[test]
    fn defaults_follow_field_kind() {
        assert_eq!(
            FieldValue::default_for(FieldKind::Text),
            FieldValue::Text(String::new())
        );
        assert_eq!(
            FieldValue::default_for(FieldKind::Status),
            FieldValue::Status(String::new())
        );
        assert_eq!(
            FieldValue::default_for(FieldKind::Boolean),
            FieldValue::Boolean(false)
        );
        assert_eq!(
            FieldValue::default_for(FieldKind::Reference),
            FieldValue::Null
        );
    }

    #[test]
    fn collection_rejects_duplicate_ids() {
        let error = Collection::from_rows(vec![row(1), row(2), row(1)])
            .expect_err("duplicate ids should fail");
        assert_eq!(error, ModelError::DuplicateRowId(RowId::new(1)));
    }

    #[test]
    fn upsert_replaces_existing_row_in_place() {
        let mut collection =
            Collection::from_rows(vec![row(1), row(2)]).expect("unique rows should load");
        let mut fields = BTreeMap::new();
        fields.insert("title".to_owned(), FieldValue::Text("new".to_owned()));
        collection.upsert(Row::new(RowId::new(1), fields));

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.rows()[0].id(), RowId::new(1));
        assert_eq!(
            collection.rows()[0].get("title"),
            Some(&FieldValue::Text("new".to_owned()))
        );
    }

    #[test]
    fn enum_spec_only_accepts_declared_options() {
        let spec = FieldSpec::new("status", "Status", FieldKind::Status).with_options(vec![
            EnumOption::status("new", "New"),
            EnumOption::status("completed", "Completed"),
        ]);
        assert!(spec.accepts(&FieldValue::Status("completed".to_owned())));
        assert!(!spec.accepts(&FieldValue::Status("archived".to_owned())));
        assert!(!spec.accepts(&FieldValue::Text("new".to_owned())));
    }

    #[test]
    fn reference_spec_accepts_unassigned() {
        let spec = FieldSpec::new("assigned", "Assigned", FieldKind::Reference)
            .with_options(vec![EnumOption::reference(3, "Dana")]);
        assert!(spec.accepts(&FieldValue::Null));
        assert!(spec.accepts(&FieldValue::Reference(3)));
        assert!(!spec.accepts(&FieldValue::Reference(4)));
    }

    #[test]
    fn schema_validation_catches_bad_dependencies() {
        let schema = ResourceSchema::new("employees", "Employees", "/employees")
            .field(FieldSpec::new("department", "Department", FieldKind::Reference))
            .dependency(FieldDependency::new("department", &["designation"]));
        let error = schema.validate().expect_err("unknown dependent should fail");
        assert!(error.to_string().contains("designation"));

        let schema = ResourceSchema::new("employees", "Employees", "/employees")
            .field(FieldSpec::new("department", "Department", FieldKind::Reference))
            .dependency(FieldDependency::new("department", &["department"]));
        assert!(matches!(
            schema.validate(),
            Err(ModelError::SelfDependency { .. })
        ));
    }

    #[test]
    fn parse_date_accepts_plain_and_timestamp_forms() {
        let expected = Date::from_calendar_date(2026, Month::March, 4).expect("valid date");
        assert_eq!(parse_date("2026-03-04"), Some(expected));
        assert_eq!(parse_date("2026-03-04T08:00:00.000000Z"), Some(expected));
        assert_eq!(parse_date("04/03/2026"), None);
    }

    #[test]
    fn page_count_rounds_up() {
        let page = Page {
            rows: Vec::new(),
            total: 51,
            page: 1,
            per_page: 25,
        };
        assert_eq!(page.page_count(), 3);
    }
}

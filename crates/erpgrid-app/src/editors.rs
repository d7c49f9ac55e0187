// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Single-field editors. An editor holds a copy of the value it was opened
//! with and emits a [`FieldEdit`] when the user commits a change. Editors
//! never reach the network and never mutate rows.

use thiserror::Error;

use crate::{EnumOption, FieldEdit, FieldKind, FieldSpec, FieldValue, Row, RowId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("{value:?} is not an option of field `{field}`")]
    OptionOutsideSet { field: String, value: FieldValue },
    #[error("`{input}` is not a valid {kind} for field `{field}`")]
    InvalidInput {
        field: String,
        kind: &'static str,
        input: String,
    },
    #[error("field `{field}` is not present on row {row_id}")]
    MissingField { row_id: RowId, field: String },
}

#[derive(Debug, Clone, PartialEq)]
enum EditorKind {
    Text {
        kind: FieldKind,
        buffer: String,
        opened: String,
        multiline: bool,
    },
    Select {
        options: Vec<EnumOption>,
        highlighted: usize,
    },
    Checkbox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEditor {
    row_id: RowId,
    field: String,
    value: FieldValue,
    disabled: bool,
    kind: EditorKind,
}

impl FieldEditor {
    pub fn for_field(spec: &FieldSpec, row: &Row, disabled: bool) -> Result<Self, EditorError> {
        let value = row
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| EditorError::MissingField {
                row_id: row.id(),
                field: spec.name.clone(),
            })?;
        Ok(Self::with_value(spec, row.id(), value, disabled))
    }

    pub fn with_value(spec: &FieldSpec, row_id: RowId, value: FieldValue, disabled: bool) -> Self {
        let kind = match spec.kind {
            FieldKind::Boolean => EditorKind::Checkbox,
            FieldKind::Status | FieldKind::Reference => {
                let highlighted = spec
                    .options
                    .iter()
                    .position(|option| option.value == value)
                    .unwrap_or(0);
                EditorKind::Select {
                    options: spec.options.clone(),
                    highlighted,
                }
            }
            kind => {
                let text = edit_text(&value);
                EditorKind::Text {
                    kind,
                    buffer: text.clone(),
                    opened: text,
                    multiline: kind == FieldKind::LongText,
                }
            }
        };

        Self {
            row_id,
            field: spec.name.clone(),
            value,
            disabled: disabled || !spec.editable,
            kind,
        }
    }

    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, EditorKind::Text { .. })
    }

    pub fn is_select(&self) -> bool {
        matches!(self.kind, EditorKind::Select { .. })
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self.kind, EditorKind::Checkbox)
    }

    pub fn options(&self) -> &[EnumOption] {
        match &self.kind {
            EditorKind::Select { options, .. } => options,
            _ => &[],
        }
    }

    pub fn highlighted(&self) -> Option<usize> {
        match &self.kind {
            EditorKind::Select { highlighted, .. } => Some(*highlighted),
            _ => None,
        }
    }

    /// Text currently in the editing buffer, for text editors.
    pub fn buffer(&self) -> Option<&str> {
        match &self.kind {
            EditorKind::Text { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Current value as shown in a table cell.
    pub fn display(&self) -> String {
        match &self.kind {
            EditorKind::Checkbox => match self.value {
                FieldValue::Boolean(true) => "[x]".to_owned(),
                _ => "[ ]".to_owned(),
            },
            EditorKind::Select { options, .. } => options
                .iter()
                .find(|option| option.value == self.value)
                .map(|option| option.label.clone())
                .unwrap_or_else(|| self.value.display()),
            EditorKind::Text { multiline, .. } => {
                let text = self.value.display();
                if *multiline {
                    text.lines().next().unwrap_or_default().to_owned()
                } else {
                    text
                }
            }
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        if self.disabled {
            return;
        }
        if let EditorKind::Text {
            buffer, multiline, ..
        } = &mut self.kind
        {
            if ch == '\n' && !*multiline {
                return;
            }
            buffer.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if self.disabled {
            return;
        }
        if let EditorKind::Text { buffer, .. } = &mut self.kind {
            buffer.pop();
        }
    }

    pub fn clear(&mut self) {
        if self.disabled {
            return;
        }
        if let EditorKind::Text { buffer, .. } = &mut self.kind {
            buffer.clear();
        }
    }

    /// Drops uncommitted typing and restores the opened value.
    pub fn cancel(&mut self) {
        if let EditorKind::Text { buffer, opened, .. } = &mut self.kind {
            buffer.clone_from(opened);
        }
    }

    /// Commits free text. Emits at most one edit, and only when the user
    /// changed the buffer and its parsed value differs from the current one.
    pub fn blur(&mut self) -> Result<Option<FieldEdit>, EditorError> {
        if self.disabled {
            return Ok(None);
        }
        let EditorKind::Text {
            kind,
            buffer,
            opened,
            ..
        } = &self.kind
        else {
            return Ok(None);
        };
        if buffer == opened {
            return Ok(None);
        }

        let parsed = parse_input(&self.field, *kind, buffer)?;
        if let EditorKind::Text { buffer, opened, .. } = &mut self.kind {
            opened.clone_from(buffer);
        }
        Ok(self.commit(parsed))
    }

    /// Chooses an option. Values outside the option set are rejected.
    pub fn select(&mut self, value: FieldValue) -> Result<Option<FieldEdit>, EditorError> {
        if self.disabled {
            return Ok(None);
        }
        let EditorKind::Select {
            options,
            highlighted,
        } = &mut self.kind
        else {
            return Ok(None);
        };

        let Some(index) = options.iter().position(|option| option.value == value) else {
            return Err(EditorError::OptionOutsideSet {
                field: self.field.clone(),
                value,
            });
        };
        *highlighted = index;
        Ok(self.commit(value))
    }

    /// Moves the highlight through the option set without committing.
    pub fn cycle(&mut self, delta: isize) {
        if self.disabled {
            return;
        }
        if let EditorKind::Select {
            options,
            highlighted,
        } = &mut self.kind
            && !options.is_empty()
        {
            let len = options.len() as isize;
            *highlighted = (*highlighted as isize + delta).rem_euclid(len) as usize;
        }
    }

    /// Commits the highlighted option.
    pub fn confirm(&mut self) -> Result<Option<FieldEdit>, EditorError> {
        let value = match &self.kind {
            EditorKind::Select {
                options,
                highlighted,
            } => match options.get(*highlighted) {
                Some(option) => option.value.clone(),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        self.select(value)
    }

    pub fn toggle(&mut self) -> Option<FieldEdit> {
        if self.disabled || !self.is_checkbox() {
            return None;
        }
        let checked = matches!(self.value, FieldValue::Boolean(true));
        self.commit(FieldValue::Boolean(!checked))
    }

    fn commit(&mut self, value: FieldValue) -> Option<FieldEdit> {
        if value == self.value {
            return None;
        }
        self.value = value.clone();
        Some(FieldEdit {
            row_id: self.row_id,
            field: self.field.clone(),
            value,
        })
    }
}

/// Buffer text for a value. Decimals keep full precision so opening and
/// closing an editor never rounds the stored number.
fn edit_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Decimal(value) => value.to_string(),
        other => other.display(),
    }
}

pub(crate) fn parse_input(
    field: &str,
    kind: FieldKind,
    input: &str,
) -> Result<FieldValue, EditorError> {
    let invalid = |label: &'static str| EditorError::InvalidInput {
        field: field.to_owned(),
        kind: label,
        input: input.to_owned(),
    };

    let trimmed = input.trim();
    match kind {
        FieldKind::Text => Ok(FieldValue::Text(trimmed.to_owned())),
        FieldKind::LongText => Ok(FieldValue::Text(input.trim_end().to_owned())),
        FieldKind::Integer if trimmed.is_empty() => Ok(FieldValue::Null),
        FieldKind::Integer => trimmed
            .replace(',', "")
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| invalid("integer")),
        FieldKind::Decimal if trimmed.is_empty() => Ok(FieldValue::Null),
        FieldKind::Decimal => trimmed
            .replace(',', "")
            .parse()
            .map(FieldValue::Decimal)
            .map_err(|_| invalid("decimal")),
        FieldKind::Date if trimmed.is_empty() => Ok(FieldValue::Null),
        FieldKind::Date => crate::parse_date(trimmed)
            .filter(|_| trimmed.len() == 10)
            .map(FieldValue::Date)
            .ok_or_else(|| invalid("date (YYYY-MM-DD)")),
        FieldKind::Boolean | FieldKind::Status | FieldKind::Reference => Err(invalid("text value")),
    }
}

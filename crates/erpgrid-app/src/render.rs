// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{FieldEditor, FieldKind, FieldSpec, FieldValue, ResourceSchema, Row, RowId};

pub type CellFormatter = fn(&FieldValue) -> String;

#[derive(Debug, Clone)]
pub enum CellFactory {
    /// Delegate to the field's editor for display.
    Editor(FieldSpec),
    /// Plain read-only text.
    Formatter(CellFormatter),
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub header: String,
    pub field: String,
    pub cell: CellFactory,
}

impl ColumnDef {
    pub fn editor(spec: &FieldSpec) -> Self {
        Self {
            header: spec.label.clone(),
            field: spec.name.clone(),
            cell: CellFactory::Editor(spec.clone()),
        }
    }

    pub fn formatted(header: &str, field: &str, formatter: CellFormatter) -> Self {
        Self {
            header: header.to_owned(),
            field: field.to_owned(),
            cell: CellFactory::Formatter(formatter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub text: String,
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub id: RowId,
    pub cells: Vec<RenderedCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RenderedRow>,
}

impl RenderedTable {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Default columns for a resource: an editor per editable field and a plain
/// formatter for everything else. Long text stays out of the grid.
pub fn columns_for(schema: &ResourceSchema) -> Vec<ColumnDef> {
    schema
        .fields
        .iter()
        .filter(|spec| spec.kind != FieldKind::LongText || spec.editable)
        .map(|spec| {
            if spec.editable {
                ColumnDef::editor(spec)
            } else {
                ColumnDef::formatted(&spec.label, &spec.name, plain_text)
            }
        })
        .collect()
}

pub fn plain_text(value: &FieldValue) -> String {
    value.display()
}

pub fn render(rows: &[Row], columns: &[ColumnDef]) -> RenderedTable {
    let headers = columns.iter().map(|column| column.header.clone()).collect();
    let rows = rows
        .iter()
        .map(|row| RenderedRow {
            id: row.id(),
            cells: columns.iter().map(|column| render_cell(row, column)).collect(),
        })
        .collect();
    RenderedTable { headers, rows }
}

fn render_cell(row: &Row, column: &ColumnDef) -> RenderedCell {
    let value = row.get(&column.field).cloned().unwrap_or(FieldValue::Null);
    match &column.cell {
        CellFactory::Editor(spec) => {
            let editor = FieldEditor::with_value(spec, row.id(), value, false);
            RenderedCell {
                text: editor.display(),
                editable: !editor.is_disabled(),
            }
        }
        CellFactory::Formatter(format) => RenderedCell {
            text: format(&value),
            editable: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnDef, columns_for, render};
    use crate::{EnumOption, FieldKind, FieldSpec, FieldValue, ResourceSchema, Row, RowId};
    use std::collections::BTreeMap;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("letters", "Letters", "/letters")
            .field(FieldSpec::new("subject", "Subject", FieldKind::Text))
            .field(
                FieldSpec::new("status", "Status", FieldKind::Status)
                    .with_options(vec![EnumOption::status("received", "Received")]),
            )
            .field(FieldSpec::new("urgent", "Urgent", FieldKind::Boolean))
            .field(FieldSpec::new("memo", "Memo", FieldKind::LongText).read_only())
            .field(FieldSpec::new("ref_no", "Ref", FieldKind::Text).read_only())
    }

    fn rows() -> Vec<Row> {
        let mut fields = BTreeMap::new();
        fields.insert("subject".to_owned(), FieldValue::Text("Tender".to_owned()));
        fields.insert(
            "status".to_owned(),
            FieldValue::Status("received".to_owned()),
        );
        fields.insert("urgent".to_owned(), FieldValue::Boolean(true));
        fields.insert("ref_no".to_owned(), FieldValue::Text("L-1".to_owned()));
        vec![Row::new(RowId::new(1), fields)]
    }

    #[test]
    fn default_columns_skip_read_only_long_text() {
        let headers = columns_for(&schema())
            .into_iter()
            .map(|column| column.header)
            .collect::<Vec<_>>();
        assert_eq!(headers, vec!["Subject", "Status", "Urgent", "Ref"]);
    }

    #[test]
    fn cells_delegate_to_editors_and_formatters() {
        let table = render(&rows(), &columns_for(&schema()));
        let cells = &table.rows[0].cells;
        assert_eq!(cells[0].text, "Tender");
        assert!(cells[0].editable);
        assert_eq!(cells[1].text, "Received");
        assert_eq!(cells[2].text, "[x]");
        assert_eq!(cells[3].text, "L-1");
        assert!(!cells[3].editable);
    }

    #[test]
    fn render_is_idempotent() {
        let rows = rows();
        let columns = columns_for(&schema());
        assert_eq!(render(&rows, &columns), render(&rows, &columns));
    }

    #[test]
    fn custom_formatter_column() {
        fn shout(value: &crate::FieldValue) -> String {
            value.display().to_uppercase()
        }
        let table = render(&rows(), &[ColumnDef::formatted("Subject", "subject", shout)]);
        assert_eq!(table.rows[0].cells[0].text, "TENDER");
        assert_eq!(table.column_count(), 1);
        assert_eq!(table.row_count(), 1);
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Owner of the in-memory rows and the per-field pending state machine.
//!
//! Each `(row, field)` key is either idle or has exactly one pending
//! operation. A new intent on a pending key supersedes the old one: the old
//! request still completes, but its sequence number no longer matches and its
//! outcome is dropped without notification.

use std::collections::HashMap;
use thiserror::Error;

use crate::{
    ChangeIntent, Collection, FieldEdit, FieldValue, ModelError, NotificationKind,
    NotificationSink, OutcomePayload, Rejection, RejectionKind, ResourceSchema, Row, RowId,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey {
    pub row_id: RowId,
    pub field: String,
}

impl PendingKey {
    pub fn new(row_id: RowId, field: &str) -> Self {
        Self {
            row_id,
            field: field.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub seq: u64,
    pub intent: ChangeIntent,
    /// Dependent fields cleared by this intent, with the values to restore.
    pub cleared: Vec<(String, FieldValue)>,
}

/// Handed to the dispatcher; returned with the outcome to `resolve`.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTicket {
    pub seq: u64,
    pub intent: ChangeIntent,
}

impl DispatchTicket {
    pub fn key(&self) -> PendingKey {
        PendingKey::new(self.intent.row_id, &self.intent.field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Idle,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Committed { row_id: RowId, field: String },
    RolledBack { row_id: RowId, field: String, rejection: Rejection },
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("row {0} is not in the current collection")]
    UnknownRow(RowId),
    #[error("resource `{resource}` has no field `{field}`")]
    UnknownField { resource: String, field: String },
    #[error("field `{0}` is read-only")]
    ReadOnlyField(String),
    #[error("{value:?} is not a valid value for field `{field}`")]
    ValueRejected { field: String, value: FieldValue },
}

pub struct Reconciler<S: NotificationSink> {
    schema: ResourceSchema,
    collection: Collection,
    pending: HashMap<PendingKey, PendingOperation>,
    field_errors: HashMap<PendingKey, Vec<String>>,
    next_seq: u64,
    sink: S,
}

impl<S: NotificationSink> Reconciler<S> {
    pub fn new(schema: ResourceSchema, sink: S) -> Self {
        Self {
            schema,
            collection: Collection::default(),
            pending: HashMap::new(),
            field_errors: HashMap::new(),
            next_seq: 0,
            sink,
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        self.collection.rows()
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.collection.get(id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn field_state(&self, row_id: RowId, field: &str) -> FieldState {
        if self.pending.contains_key(&PendingKey::new(row_id, field)) {
            FieldState::Pending
        } else {
            FieldState::Idle
        }
    }

    pub fn field_error(&self, row_id: RowId, field: &str) -> Option<&[String]> {
        self.field_errors
            .get(&PendingKey::new(row_id, field))
            .map(Vec::as_slice)
    }

    /// Replaces the whole collection, as on reload or page navigation.
    /// Outstanding operations are forgotten.
    pub fn replace_rows(&mut self, rows: Vec<Row>) -> Result<(), ModelError> {
        self.collection = Collection::from_rows(rows)?;
        self.pending.clear();
        self.field_errors.clear();
        Ok(())
    }

    pub fn insert_created(&mut self, row: Row) {
        self.collection.upsert(row);
    }

    pub fn remove_row(&mut self, id: RowId) -> bool {
        self.pending.retain(|key, _| key.row_id != id);
        self.field_errors.retain(|key, _| key.row_id != id);
        self.collection.remove(id).is_some()
    }

    /// Applies `edit` optimistically and returns the ticket to dispatch.
    pub fn propose(&mut self, edit: FieldEdit) -> Result<DispatchTicket, ReconcileError> {
        let spec = self
            .schema
            .spec(&edit.field)
            .ok_or_else(|| ReconcileError::UnknownField {
                resource: self.schema.name.clone(),
                field: edit.field.clone(),
            })?;
        if !spec.editable {
            return Err(ReconcileError::ReadOnlyField(edit.field));
        }
        if !spec.accepts(&edit.value) {
            return Err(ReconcileError::ValueRejected {
                field: edit.field,
                value: edit.value,
            });
        }
        if self.collection.get(edit.row_id).is_none() {
            return Err(ReconcileError::UnknownRow(edit.row_id));
        }

        let key = PendingKey::new(edit.row_id, &edit.field);
        let superseded = self.pending.remove(&key);
        let previous_value = match &superseded {
            Some(operation) => operation.intent.previous_value.clone(),
            None => self.current_value(edit.row_id, &edit.field),
        };

        let dependents = self
            .schema
            .dependents_of(&edit.field)
            .into_iter()
            .map(|field| {
                let default = self
                    .schema
                    .spec(field)
                    .map(|spec| spec.default_value())
                    .unwrap_or(FieldValue::Null);
                (field.to_owned(), default)
            })
            .collect::<Vec<_>>();

        let mut cleared = Vec::with_capacity(dependents.len());
        for (field, _) in &dependents {
            let dependent_key = PendingKey::new(edit.row_id, field);
            let inherited = superseded.as_ref().and_then(|operation| {
                operation
                    .cleared
                    .iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, value)| value.clone())
            });
            let baseline = match (inherited, self.pending.remove(&dependent_key)) {
                (Some(value), _) => value,
                (None, Some(operation)) => operation.intent.previous_value,
                (None, None) => self.current_value(edit.row_id, field),
            };
            self.field_errors.remove(&dependent_key);
            cleared.push((field.clone(), baseline));
        }

        let Some(row) = self.collection.get_mut(edit.row_id) else {
            return Err(ReconcileError::UnknownRow(edit.row_id));
        };
        row.set(&edit.field, edit.value.clone());
        for (field, default) in dependents {
            row.set(&field, default);
        }

        self.next_seq = self.next_seq.saturating_add(1);
        let seq = self.next_seq;
        let intent = ChangeIntent {
            row_id: edit.row_id,
            field: edit.field,
            proposed_value: edit.value,
            previous_value,
        };
        if let Some(operation) = &superseded {
            tracing::debug!(
                row_id = %intent.row_id,
                field = %intent.field,
                superseded_seq = operation.seq,
                seq,
                "superseding pending edit"
            );
        }
        self.field_errors.remove(&key);
        self.pending.insert(
            key,
            PendingOperation {
                seq,
                intent: intent.clone(),
                cleared,
            },
        );

        Ok(DispatchTicket { seq, intent })
    }

    /// Settles a dispatched ticket. Outcomes of superseded tickets are
    /// ignored.
    pub fn resolve(&mut self, ticket: &DispatchTicket, outcome: OutcomePayload) -> Resolution {
        let key = ticket.key();
        let is_current = self
            .pending
            .get(&key)
            .is_some_and(|operation| operation.seq == ticket.seq);
        if !is_current {
            tracing::debug!(
                row_id = %key.row_id,
                field = %key.field,
                seq = ticket.seq,
                "dropping outcome of superseded edit"
            );
            return Resolution::Superseded;
        }
        let Some(operation) = self.pending.remove(&key) else {
            return Resolution::Superseded;
        };

        match outcome {
            OutcomePayload::Committed(patch) => {
                self.commit(&operation, patch.fields);
                let label = self.field_label(&key.field);
                self.sink
                    .notify(NotificationKind::Success, &format!("{label} updated"));
                Resolution::Committed {
                    row_id: key.row_id,
                    field: key.field,
                }
            }
            OutcomePayload::Rejected(rejection) => {
                self.roll_back(&operation, &rejection);
                self.sink.notify(NotificationKind::Error, &rejection.message);
                Resolution::RolledBack {
                    row_id: key.row_id,
                    field: key.field,
                    rejection,
                }
            }
        }
    }

    fn commit(
        &mut self,
        operation: &PendingOperation,
        patch: std::collections::BTreeMap<String, FieldValue>,
    ) {
        let row_id = operation.intent.row_id;
        let protected = self.pending_fields(row_id);
        let Some(row) = self.collection.get_mut(row_id) else {
            return;
        };
        for (field, value) in patch {
            if field == "id" || self.schema.spec(&field).is_none() {
                continue;
            }
            // Another in-flight intent on this row owns that field.
            if protected.iter().any(|pending| pending == &field) {
                continue;
            }
            row.set(&field, value);
        }
    }

    fn roll_back(&mut self, operation: &PendingOperation, rejection: &Rejection) {
        let row_id = operation.intent.row_id;
        let protected = self.pending_fields(row_id);
        if let Some(row) = self.collection.get_mut(row_id) {
            row.set(
                &operation.intent.field,
                operation.intent.previous_value.clone(),
            );
            for (field, value) in &operation.cleared {
                if protected.iter().any(|pending| pending == field) {
                    continue;
                }
                row.set(field, value.clone());
            }
        }

        if rejection.kind != RejectionKind::Validation {
            return;
        }
        if rejection.field_errors.is_empty() {
            self.field_errors.insert(
                PendingKey::new(row_id, &operation.intent.field),
                vec![rejection.message.clone()],
            );
            return;
        }
        for (field, messages) in &rejection.field_errors {
            if self.schema.spec(field).is_some() {
                self.field_errors
                    .insert(PendingKey::new(row_id, field), messages.clone());
            }
        }
    }

    /// Fields of a row held by in-flight intents: the edited fields and the
    /// dependents those intents cleared.
    fn pending_fields(&self, row_id: RowId) -> Vec<String> {
        self.pending
            .iter()
            .filter(|(key, _)| key.row_id == row_id)
            .flat_map(|(key, operation)| {
                std::iter::once(key.field.clone())
                    .chain(operation.cleared.iter().map(|(field, _)| field.clone()))
            })
            .collect()
    }

    fn current_value(&self, row_id: RowId, field: &str) -> FieldValue {
        self.collection
            .get(row_id)
            .and_then(|row| row.get(field).cloned())
            .or_else(|| self.schema.spec(field).map(|spec| spec.default_value()))
            .unwrap_or(FieldValue::Null)
    }

    fn field_label(&self, field: &str) -> String {
        self.schema
            .spec(field)
            .map(|spec| spec.label.clone())
            .unwrap_or_else(|| field.to_owned())
    }
}

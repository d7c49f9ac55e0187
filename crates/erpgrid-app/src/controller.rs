// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Runs dispatches off the UI thread. Workers only ever send outcomes back
//! over a channel; every mutation of the rows happens in [`TableController::pump`]
//! on the owning thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    DispatchTicket, FieldEdit, FieldValue, ModelError, NotificationSink, OutcomePayload,
    ReconcileError, Reconciler, Rejection, ResourceSchema, Resolution, Row, RowId,
};

/// Sends one field change to the backend. Implementations must always
/// return an outcome, mapping transport failures and timeouts to a
/// rejection rather than hanging.
pub trait UpdateDispatcher: Send + Sync {
    fn dispatch(&self, row_id: RowId, field: &str, value: &FieldValue) -> OutcomePayload;
}

#[derive(Debug)]
struct Settled {
    ticket: DispatchTicket,
    outcome: OutcomePayload,
}

pub struct TableController<D, S>
where
    D: UpdateDispatcher + 'static,
    S: NotificationSink,
{
    reconciler: Reconciler<S>,
    dispatcher: Arc<D>,
    tx: Sender<Settled>,
    rx: Receiver<Settled>,
    in_flight: usize,
}

impl<D, S> TableController<D, S>
where
    D: UpdateDispatcher + 'static,
    S: NotificationSink,
{
    pub fn new(schema: ResourceSchema, dispatcher: Arc<D>, sink: S) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            reconciler: Reconciler::new(schema, sink),
            dispatcher,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.reconciler.sink_mut()
    }

    pub fn schema(&self) -> &ResourceSchema {
        self.reconciler.schema()
    }

    pub fn rows(&self) -> &[Row] {
        self.reconciler.rows()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn replace_rows(&mut self, rows: Vec<Row>) -> Result<(), ModelError> {
        self.reconciler.replace_rows(rows)
    }

    pub fn insert_created(&mut self, row: Row) {
        self.reconciler.insert_created(row);
    }

    pub fn remove_row(&mut self, id: RowId) -> bool {
        self.reconciler.remove_row(id)
    }

    /// Applies the edit locally and starts its dispatch on a worker thread.
    pub fn submit(&mut self, edit: FieldEdit) -> Result<DispatchTicket, ReconcileError> {
        let ticket = self.reconciler.propose(edit)?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let tx = self.tx.clone();
        let worker_ticket = ticket.clone();
        self.in_flight += 1;
        thread::spawn(move || {
            let intent = &worker_ticket.intent;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                dispatcher.dispatch(intent.row_id, &intent.field, &intent.proposed_value)
            }))
            .unwrap_or_else(|_| {
                tracing::error!(
                    row_id = %intent.row_id,
                    field = %intent.field,
                    "update dispatcher panicked"
                );
                OutcomePayload::Rejected(Rejection::server("update failed unexpectedly"))
            });
            let _ = tx.send(Settled {
                ticket: worker_ticket,
                outcome,
            });
        });
        Ok(ticket)
    }

    /// Resolves every outcome that has arrived so far without blocking.
    pub fn pump(&mut self) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        while let Ok(settled) = self.rx.try_recv() {
            resolutions.push(self.settle(settled));
        }
        resolutions
    }

    /// Blocks until every submitted dispatch has settled or `timeout`
    /// elapses.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Resolution> {
        let deadline = Instant::now() + timeout;
        let mut resolutions = Vec::new();
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(settled) => resolutions.push(self.settle(settled)),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        resolutions
    }

    fn settle(&mut self, settled: Settled) -> Resolution {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.reconciler.resolve(&settled.ticket, settled.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::{TableController, UpdateDispatcher};
    use crate::{
        EnumOption, FieldEdit, FieldKind, FieldSpec, FieldState, FieldValue,
        NotificationKind, NotificationSink, OutcomePayload, Rejection, ResourceSchema,
        Resolution, Row, RowId, RowPatch,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Captured(Vec<(NotificationKind, String)>);

    impl NotificationSink for Captured {
        fn notify(&mut self, kind: NotificationKind, message: &str) {
            self.0.push((kind, message.to_owned()));
        }
    }

    /// Accepts everything except "completed"; the first proposal of
    /// "in_progress" is slow so later edits overtake it.
    struct SlowFirst;

    impl UpdateDispatcher for SlowFirst {
        fn dispatch(&self, _row_id: RowId, field: &str, value: &FieldValue) -> OutcomePayload {
            match value {
                FieldValue::Status(value) if value == "in_progress" => {
                    thread::sleep(Duration::from_millis(80));
                }
                FieldValue::Status(value) if value == "completed" => {
                    return OutcomePayload::Rejected(
                        Rejection::validation("Completion needs an inspection")
                            .with_field_error("status", "inspection missing"),
                    );
                }
                _ => {}
            }
            OutcomePayload::Committed(RowPatch::default().with(field, value.clone()))
        }
    }

    struct Panics;

    impl UpdateDispatcher for Panics {
        fn dispatch(&self, _row_id: RowId, _field: &str, _value: &FieldValue) -> OutcomePayload {
            panic!("backend exploded");
        }
    }

    fn status(value: &str) -> FieldValue {
        FieldValue::Status(value.to_owned())
    }

    fn schema() -> ResourceSchema {
        ResourceSchema::new("daily-works", "Daily works", "/daily-works").field(
            FieldSpec::new("status", "Status", FieldKind::Status).with_options(vec![
                EnumOption::status("new", "New"),
                EnumOption::status("in_progress", "In progress"),
                EnumOption::status("completed", "Completed"),
                EnumOption::status("resubmission", "Resubmission"),
            ]),
        )
    }

    fn controller<D: UpdateDispatcher + 'static>(dispatcher: D) -> TableController<D, Captured> {
        let mut controller =
            TableController::new(schema(), Arc::new(dispatcher), Captured::default());
        let mut fields = BTreeMap::new();
        fields.insert("status".to_owned(), status("new"));
        controller
            .replace_rows(vec![Row::new(RowId::new(7), fields)])
            .expect("seed rows");
        controller
    }

    fn edit(value: &str) -> FieldEdit {
        FieldEdit {
            row_id: RowId::new(7),
            field: "status".to_owned(),
            value: status(value),
        }
    }

    fn current<D: UpdateDispatcher + 'static>(controller: &TableController<D, Captured>) -> FieldValue {
        controller.rows()[0]
            .get("status")
            .cloned()
            .unwrap_or(FieldValue::Null)
    }

    #[test]
    fn submit_applies_locally_before_dispatch_settles() {
        let mut controller = controller(SlowFirst);
        controller.submit(edit("in_progress")).expect("valid edit");
        assert_eq!(current(&controller), status("in_progress"));
        assert_eq!(
            controller.reconciler().field_state(RowId::new(7), "status"),
            FieldState::Pending
        );

        let resolutions = controller.wait_idle(Duration::from_secs(5));
        assert_eq!(resolutions.len(), 1);
        assert!(matches!(resolutions[0], Resolution::Committed { .. }));
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(
            controller.reconciler().sink().0,
            vec![(NotificationKind::Success, "Status updated".to_owned())]
        );
    }

    #[test]
    fn rejection_rolls_back_through_pump() {
        let mut controller = controller(SlowFirst);
        controller.submit(edit("completed")).expect("valid edit");
        controller.wait_idle(Duration::from_secs(5));
        assert_eq!(current(&controller), status("new"));
        assert_eq!(
            controller.reconciler().field_error(RowId::new(7), "status"),
            Some(&["inspection missing".to_owned()][..])
        );
        assert!(controller.pump().is_empty());
    }

    #[test]
    fn slow_superseded_outcome_is_dropped() {
        let mut controller = controller(SlowFirst);
        controller.submit(edit("in_progress")).expect("first edit");
        controller.submit(edit("resubmission")).expect("second edit");

        let resolutions = controller.wait_idle(Duration::from_secs(5));
        assert_eq!(resolutions.len(), 2);
        assert_eq!(
            resolutions
                .iter()
                .filter(|resolution| **resolution == Resolution::Superseded)
                .count(),
            1
        );
        assert_eq!(current(&controller), status("resubmission"));
        assert_eq!(controller.reconciler().sink().0.len(), 1);
    }

    #[test]
    fn dispatcher_panic_becomes_rejection() {
        let mut controller = controller(Panics);
        controller.submit(edit("in_progress")).expect("valid edit");
        let resolutions = controller.wait_idle(Duration::from_secs(5));
        assert!(matches!(resolutions[0], Resolution::RolledBack { .. }));
        assert_eq!(current(&controller), status("new"));
        assert_eq!(
            controller.reconciler().sink().0,
            vec![(
                NotificationKind::Error,
                "update failed unexpectedly".to_owned()
            )]
        );
    }

    #[test]
    fn invalid_edit_is_refused_without_dispatch() {
        let mut controller = controller(Panics);
        assert!(controller.submit(edit("archived")).is_err());
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(current(&controller), status("new"));
    }
}

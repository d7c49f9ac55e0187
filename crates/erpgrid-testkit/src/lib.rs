// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use erpgrid_app::{
    FieldEdit, FieldValue, NotificationKind, NotificationSink, OutcomePayload, Rejection,
    ResourceSchema, Row, RowId, RowPatch, UpdateDispatcher, rows_from_json,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const WORK_TYPES: [&str; 3] = ["embankment", "structure", "pavement"];
const WORK_STATUSES: [&str; 4] = ["new", "in_progress", "completed", "resubmission"];
const STAFF_IDS: [i64; 5] = [21, 22, 23, 24, 25];

const CHAINAGE_SIDES: [&str; 3] = ["SR-R", "SR-L", "TR-R"];
const DEPARTMENT_IDS: [i64; 4] = [1, 2, 3, 4];
const DESIGNATION_IDS: [i64; 6] = [10, 11, 12, 13, 14, 15];

const FIRST_NAMES: [&str; 12] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Rowan",
];
const LAST_NAMES: [&str; 10] = [
    "Rahman", "Hossain", "Akter", "Islam", "Chowdhury", "Begum", "Sarker", "Karim", "Uddin",
    "Sultana",
];

const WORDS: [&str; 20] = [
    "compaction",
    "test",
    "subgrade",
    "layer",
    "culvert",
    "pier",
    "casting",
    "shuttering",
    "rebar",
    "inspection",
    "levelling",
    "survey",
    "drainage",
    "slope",
    "protection",
    "asphalt",
    "base",
    "course",
    "curing",
    "sampling",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Deterministic backend records shaped like the JSON the ERP API returns.
#[derive(Debug, Clone)]
pub struct ErpFaker {
    rng: DeterministicRng,
}

impl ErpFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn daily_work(&mut self, id: i64) -> Value {
        let day = self.rng.int_n(28) as u8 + 1;
        let chainage = 100 + self.rng.int_n(900);
        let side = CHAINAGE_SIDES[self.rng.int_n(CHAINAGE_SIDES.len())];
        json!({
            "id": id,
            "date": format!("2026-03-{day:02}"),
            "number": format!("S2-{side}-{id:04}"),
            "status": WORK_STATUSES[self.rng.int_n(WORK_STATUSES.len())],
            "type": WORK_TYPES[self.rng.int_n(WORK_TYPES.len())],
            "location": format!("K{}+{chainage:03}", 20 + self.rng.int_n(10)),
            "description": self.sentence(3, 6),
            "incharge": STAFF_IDS[self.rng.int_n(STAFF_IDS.len())],
            "assigned": STAFF_IDS[self.rng.int_n(STAFF_IDS.len())],
            "inspection_details": Value::Null,
            "resubmission_count": self.rng.int_n(3),
        })
    }

    pub fn employee(&mut self, id: i64) -> Value {
        let first = FIRST_NAMES[self.rng.int_n(FIRST_NAMES.len())];
        let last = LAST_NAMES[self.rng.int_n(LAST_NAMES.len())];
        json!({
            "id": id,
            "name": format!("{first} {last}"),
            "email": format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
            "phone": format!("+880 17{:08}", self.rng.next_u64() % 100_000_000),
            "department": DEPARTMENT_IDS[self.rng.int_n(DEPARTMENT_IDS.len())],
            "designation": DESIGNATION_IDS[self.rng.int_n(DESIGNATION_IDS.len())],
            "date_of_joining": format!("2024-{:02}-01", self.rng.int_n(12) + 1),
            "active": self.rng.bool(),
        })
    }

    pub fn daily_works(&mut self, count: usize) -> Vec<Value> {
        (1..=count as i64).map(|id| self.daily_work(id)).collect()
    }

    pub fn employees(&mut self, count: usize) -> Vec<Value> {
        (1..=count as i64).map(|id| self.employee(id)).collect()
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = min_words + self.rng.int_n(max_words.saturating_sub(min_words) + 1);
        let mut sentence = (0..count)
            .map(|_| WORDS[self.rng.int_n(WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence
    }
}

/// Display rows for `schema` built from faked records.
pub fn rows_for(schema: &ResourceSchema, records: &[Value]) -> Result<Vec<Row>> {
    rows_from_json(schema, records).with_context(|| format!("adapt {} fixtures", schema.name))
}

/// Paginated list body in the shape the backend returns.
pub fn page_body(records: &[Value], page: u32, per_page: u32, total: u64) -> Value {
    json!({
        "data": records,
        "current_page": page,
        "per_page": per_page,
        "total": total,
    })
}

/// Outcome the backend gives for an accepted edit: the field echoed back.
pub fn echo_commit(field: &str, value: &FieldValue) -> OutcomePayload {
    OutcomePayload::Committed(RowPatch::default().with(field, value.clone()))
}

/// Dispatcher that replays queued outcomes in order, echoing a commit once
/// the queue is empty. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    outcomes: Mutex<VecDeque<OutcomePayload>>,
    delays: Mutex<VecDeque<Duration>>,
    calls: Mutex<Vec<FieldEdit>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: OutcomePayload) -> Self {
        lock(&self.outcomes).push_back(outcome);
        self
    }

    pub fn then_reject(self, rejection: Rejection) -> Self {
        self.then(OutcomePayload::Rejected(rejection))
    }

    /// Delays applied to successive calls, in call order.
    pub fn with_delays(self, delays: &[Duration]) -> Self {
        lock(&self.delays).extend(delays.iter().copied());
        self
    }

    pub fn calls(&self) -> Vec<FieldEdit> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl UpdateDispatcher for ScriptedDispatcher {
    fn dispatch(&self, row_id: RowId, field: &str, value: &FieldValue) -> OutcomePayload {
        let (delay, outcome) = {
            lock(&self.calls).push(FieldEdit {
                row_id,
                field: field.to_owned(),
                value: value.clone(),
            });
            let delay = lock(&self.delays).pop_front();
            let outcome = lock(&self.outcomes).pop_front();
            (delay, outcome)
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        outcome.unwrap_or_else(|| echo_commit(field, value))
    }
}

/// Notification sink whose log stays readable after the sink is moved into
/// a reconciler.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<(NotificationKind, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(NotificationKind, String)> {
        lock(&self.log).clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        lock(&self.log)
            .iter()
            .filter(|(logged, _)| *logged == kind)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        lock(&self.log).push((kind, message.to_owned()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

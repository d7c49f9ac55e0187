// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;
use time::{Duration, OffsetDateTime};

const DEFAULT_TOAST_CAPACITY: usize = 8;
const DEFAULT_TOAST_TTL: Duration = Duration::seconds(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

impl NotificationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Receives user-facing outcomes. Implementations must not block or panic.
pub trait NotificationSink {
    fn notify(&mut self, kind: NotificationKind, message: &str);
}

/// Logs every outcome and shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        log_notification(kind, message);
    }
}

fn log_notification(kind: NotificationKind, message: &str) {
    match kind {
        NotificationKind::Success => tracing::info!(kind = kind.as_str(), "{message}"),
        NotificationKind::Error => tracing::warn!(kind = kind.as_str(), "{message}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: OffsetDateTime,
}

/// Toasts waiting to be drawn. While no surface is attached, outcomes go to
/// the log instead.
#[derive(Debug, Clone)]
pub struct ToastQueue {
    toasts: VecDeque<Toast>,
    capacity: usize,
    ttl: Duration,
    attached: bool,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_CAPACITY, DEFAULT_TOAST_TTL)
    }
}

impl ToastQueue {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            toasts: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
            attached: true,
        }
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.toasts.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn latest(&self) -> Option<&Toast> {
        self.toasts.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn dismiss_latest(&mut self) -> Option<Toast> {
        self.toasts.pop_back()
    }

    /// Drops toasts older than the queue's time-to-live.
    pub fn expire(&mut self, now: OffsetDateTime) -> usize {
        let before = self.toasts.len();
        let ttl = self.ttl;
        self.toasts.retain(|toast| now - toast.created_at < ttl);
        before - self.toasts.len()
    }

    fn push_at(&mut self, kind: NotificationKind, message: &str, now: OffsetDateTime) {
        if !self.attached {
            log_notification(kind, message);
            return;
        }
        if self.toasts.len() == self.capacity {
            self.toasts.pop_front();
        }
        self.toasts.push_back(Toast {
            kind,
            message: message.to_owned(),
            created_at: now,
        });
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        let now = OffsetDateTime::now_utc();
        self.push_at(kind, message, now);
    }
}

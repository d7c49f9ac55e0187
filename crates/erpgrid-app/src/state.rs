// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! UI state store. `UiState::dispatch` is the only way the state changes;
//! side effects such as persisting preferences subscribe to the emitted
//! events through [`UiStore`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    Edit,
    Form,
}

/// Initial state: dark theme, first page of 25 rows, nothing loading, no
/// status message, navigation mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    pub mode: AppMode,
    pub theme: Theme,
    pub resource: String,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub loading: bool,
    pub status_line: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            theme: Theme::Dark,
            resource: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            page_count: 1,
            loading: false,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    NextPage,
    PrevPage,
    SetPageCount(u32),
    SetPageSize(u32),
    ToggleTheme,
    SelectResource(String),
    BeginLoading,
    FinishLoading,
    EnterEditMode,
    OpenCreateForm,
    ExitToNav,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ModeChanged(AppMode),
    ThemeChanged(Theme),
    ResourceChanged(String),
    PageChanged(u32),
    PageSizeChanged(u32),
    LoadingChanged(bool),
    StatusUpdated(String),
    StatusCleared,
}

impl UiState {
    pub fn dispatch(&mut self, command: UiCommand) -> Vec<UiEvent> {
        match command {
            UiCommand::NextPage => self.move_page(1),
            UiCommand::PrevPage => self.move_page(-1),
            UiCommand::SetPageCount(count) => {
                self.page_count = count.max(1);
                if self.page > self.page_count {
                    self.page = self.page_count;
                    return vec![UiEvent::PageChanged(self.page)];
                }
                Vec::new()
            }
            UiCommand::SetPageSize(size) => {
                let size = size.clamp(1, MAX_PAGE_SIZE);
                if size == self.page_size {
                    return Vec::new();
                }
                self.page_size = size;
                self.page = 1;
                vec![UiEvent::PageSizeChanged(size), UiEvent::PageChanged(1)]
            }
            UiCommand::ToggleTheme => {
                self.theme = self.theme.toggled();
                let label = format!("theme: {}", self.theme.as_str());
                vec![UiEvent::ThemeChanged(self.theme), self.set_status(&label)]
            }
            UiCommand::SelectResource(resource) => {
                if resource == self.resource {
                    return Vec::new();
                }
                self.resource = resource.clone();
                self.page = 1;
                self.mode = AppMode::Nav;
                vec![
                    UiEvent::ResourceChanged(resource),
                    UiEvent::PageChanged(1),
                ]
            }
            UiCommand::BeginLoading => self.set_loading(true),
            UiCommand::FinishLoading => self.set_loading(false),
            UiCommand::EnterEditMode => {
                self.mode = AppMode::Edit;
                vec![UiEvent::ModeChanged(self.mode)]
            }
            UiCommand::OpenCreateForm => {
                self.mode = AppMode::Form;
                vec![UiEvent::ModeChanged(self.mode)]
            }
            UiCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![UiEvent::ModeChanged(self.mode)]
            }
            UiCommand::SetStatus(message) => vec![self.set_status(&message)],
            UiCommand::ClearStatus => {
                self.status_line = None;
                vec![UiEvent::StatusCleared]
            }
        }
    }

    fn move_page(&mut self, delta: i64) -> Vec<UiEvent> {
        let next = (i64::from(self.page) + delta).clamp(1, i64::from(self.page_count.max(1)));
        let next = u32::try_from(next).unwrap_or(1);
        if next == self.page {
            return Vec::new();
        }
        self.page = next;
        vec![UiEvent::PageChanged(self.page)]
    }

    fn set_loading(&mut self, loading: bool) -> Vec<UiEvent> {
        if self.loading == loading {
            return Vec::new();
        }
        self.loading = loading;
        vec![UiEvent::LoadingChanged(loading)]
    }

    fn set_status(&mut self, message: &str) -> UiEvent {
        self.status_line = Some(message.to_owned());
        UiEvent::StatusUpdated(message.to_owned())
    }
}

type Subscriber = Box<dyn FnMut(&UiState, &UiEvent)>;

/// `UiState` plus the side effects that react to its events.
pub struct UiStore {
    state: UiState,
    subscribers: Vec<Subscriber>,
}

impl UiStore {
    pub fn new(state: UiState) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&UiState, &UiEvent) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn dispatch(&mut self, command: UiCommand) -> Vec<UiEvent> {
        let events = self.state.dispatch(command);
        for event in &events {
            for subscriber in &mut self.subscribers {
                subscriber(&self.state, event);
            }
        }
        events
    }
}

impl Default for UiStore {
    fn default() -> Self {
        Self::new(UiState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppMode, Theme, UiCommand, UiEvent, UiState, UiStore};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn documented_initial_state() {
        let state = UiState::default();
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(state.theme, Theme::Dark);
        assert_eq!(state.page, 1);
        assert_eq!(state.page_size, 25);
        assert!(!state.loading);
        assert!(state.status_line.is_none());
    }

    #[test]
    fn paging_stays_within_bounds() {
        let mut state = UiState::default();
        assert!(state.dispatch(UiCommand::PrevPage).is_empty());

        state.dispatch(UiCommand::SetPageCount(2));
        assert_eq!(
            state.dispatch(UiCommand::NextPage),
            vec![UiEvent::PageChanged(2)]
        );
        assert!(state.dispatch(UiCommand::NextPage).is_empty());

        assert_eq!(
            state.dispatch(UiCommand::SetPageCount(1)),
            vec![UiEvent::PageChanged(1)]
        );
        assert_eq!(state.page, 1);
    }

    #[test]
    fn page_size_change_resets_page() {
        let mut state = UiState {
            page: 3,
            page_count: 5,
            ..UiState::default()
        };
        let events = state.dispatch(UiCommand::SetPageSize(1000));
        assert_eq!(state.page_size, 200);
        assert_eq!(
            events,
            vec![UiEvent::PageSizeChanged(200), UiEvent::PageChanged(1)]
        );
    }

    #[test]
    fn theme_toggle_updates_status() {
        let mut state = UiState::default();
        let events = state.dispatch(UiCommand::ToggleTheme);
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(
            events,
            vec![
                UiEvent::ThemeChanged(Theme::Light),
                UiEvent::StatusUpdated("theme: light".to_owned()),
            ]
        );
    }

    #[test]
    fn mode_transitions() {
        let mut state = UiState::default();
        state.dispatch(UiCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Edit);
        state.dispatch(UiCommand::OpenCreateForm);
        assert_eq!(state.mode, AppMode::Form);
        state.dispatch(UiCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
    }

    #[test]
    fn store_notifies_subscribers_after_reducing() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = UiStore::default();
        let sink = Rc::clone(&seen);
        store.subscribe(move |state, event| {
            sink.borrow_mut().push((state.theme, event.clone()));
        });

        store.dispatch(UiCommand::ToggleTheme);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Theme::Light, UiEvent::ThemeChanged(Theme::Light)));
    }
}

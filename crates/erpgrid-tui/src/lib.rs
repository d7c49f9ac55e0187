// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use erpgrid_app::{
    AppMode, CellFactory, ColumnDef, CreateForm, FieldEdit, FieldEditor, FieldSpec, FieldState,
    NotificationKind, NotificationSink, OutcomePayload, Page, RenderedCell, ResourceSchema, RowId,
    TableController, Theme, ToastQueue, UiCommand, UiState, UiStore, UpdateDispatcher, columns_for,
    find_resource, render as render_rows, row_from_patch,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;

const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const PAGE_SIZE_STEP: u32 = 5;
const PENDING_MARK: &str = "…";
const ERROR_MARK: &str = "!";
const CURSOR_MARK: &str = "▏";

/// Backend operations the table view needs. Inline edits go through the
/// dispatcher so they can run off the UI thread; everything else is a
/// blocking call.
pub trait AppRuntime {
    type Dispatcher: UpdateDispatcher + 'static;

    fn resources(&self) -> &[ResourceSchema];
    fn load_page(&mut self, schema: &ResourceSchema, page: u32, per_page: u32) -> Result<Page>;
    fn dispatcher(&mut self, schema: &ResourceSchema) -> Result<Arc<Self::Dispatcher>>;
    fn create(&mut self, schema: &ResourceSchema, body: &serde_json::Value) -> OutcomePayload;
    fn delete(&mut self, schema: &ResourceSchema, row_id: RowId) -> OutcomePayload;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone)]
struct FormUiState {
    form: CreateForm,
    fields: Vec<FieldSpec>,
    cursor: usize,
    buffer: String,
    error: Option<String>,
}

impl FormUiState {
    fn new(schema: &ResourceSchema) -> Self {
        let form = CreateForm::blank_for(schema);
        let fields = form.fields().cloned().collect::<Vec<_>>();
        let mut state = Self {
            form,
            fields,
            cursor: 0,
            buffer: String::new(),
            error: None,
        };
        state.load_buffer();
        state
    }

    fn current(&self) -> Option<&FieldSpec> {
        self.fields.get(self.cursor)
    }

    fn load_buffer(&mut self) {
        self.buffer = match self.current() {
            Some(spec) => {
                let value = self
                    .form
                    .get(&spec.name)
                    .cloned()
                    .unwrap_or_else(|| spec.default_value());
                spec.option_label(&value)
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.display())
            }
            None => String::new(),
        };
    }

    fn commit_buffer(&mut self) -> bool {
        let Some(field) = self.current().map(|spec| spec.name.clone()) else {
            return true;
        };
        match self.form.set_from_input(&field, &self.buffer) {
            Ok(()) => {
                self.error = None;
                true
            }
            Err(error) => {
                self.error = Some(error.to_string());
                false
            }
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.fields.is_empty() || !self.commit_buffer() {
            return;
        }
        let len = self.fields.len() as isize;
        self.cursor = (self.cursor as isize + delta).rem_euclid(len) as usize;
        self.load_buffer();
    }

    fn is_last_field(&self) -> bool {
        self.cursor + 1 >= self.fields.len()
    }
}

struct ViewData<D: UpdateDispatcher + 'static> {
    controller: Option<TableController<D, ToastQueue>>,
    columns: Vec<ColumnDef>,
    resources: Vec<(String, String)>,
    selected_row: usize,
    selected_col: usize,
    editor: Option<FieldEditor>,
    form: Option<FormUiState>,
    delete_armed: Option<RowId>,
    help_visible: bool,
    status_token: u64,
}

impl<D: UpdateDispatcher + 'static> Default for ViewData<D> {
    fn default() -> Self {
        Self {
            controller: None,
            columns: Vec::new(),
            resources: Vec::new(),
            selected_row: 0,
            selected_col: 0,
            editor: None,
            form: None,
            delete_armed: None,
            help_visible: false,
            status_token: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    text: Color,
    accent: Color,
    muted: Color,
    selected_bg: Color,
    success: Color,
    error: Color,
}

const fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            text: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selected_bg: Color::DarkGray,
            success: Color::Green,
            error: Color::Red,
        },
        Theme::Light => Palette {
            text: Color::Black,
            accent: Color::Blue,
            muted: Color::Gray,
            selected_bg: Color::Gray,
            success: Color::Green,
            error: Color::Red,
        },
    }
}

pub fn run_app<R: AppRuntime>(store: &mut UiStore, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "panic in terminal UI");
    }));

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    open_initial_resource(store, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(store, &mut view_data, &internal_rx);
        settle_outcomes(&mut view_data);

        if let Err(error) = terminal.draw(|frame| render(frame, store.state(), &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(store, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    shutdown(&mut view_data);
    panic::set_hook(previous_hook);
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn open_initial_resource<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.resources = runtime
        .resources()
        .iter()
        .map(|schema| (schema.name.clone(), schema.label.clone()))
        .collect();

    let known = view_data
        .resources
        .iter()
        .any(|(name, _)| *name == store.state().resource);
    if !known && let Some((first, _)) = view_data.resources.first() {
        let first = first.clone();
        store.dispatch(UiCommand::SelectResource(first));
    }

    if let Err(error) = reload(store, runtime, view_data) {
        emit_status(store, view_data, internal_tx, format!("load failed: {error:#}"));
    }
}

fn process_internal_events<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                store.dispatch(UiCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn settle_outcomes<D: UpdateDispatcher + 'static>(view_data: &mut ViewData<D>) {
    if let Some(controller) = view_data.controller.as_mut() {
        controller.pump();
        controller.sink_mut().expire(OffsetDateTime::now_utc());
    }
}

fn shutdown<D: UpdateDispatcher + 'static>(view_data: &mut ViewData<D>) {
    if let Some(controller) = view_data.controller.as_mut() {
        controller.sink_mut().detach();
        let settled = controller.wait_idle(SHUTDOWN_GRACE);
        if controller.in_flight() > 0 {
            tracing::warn!(
                in_flight = controller.in_flight(),
                settled = settled.len(),
                "exiting with edits still in flight"
            );
        }
    }
}

fn reload<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
) -> Result<()> {
    let state = store.state();
    let (page, per_page) = (state.page, state.page_size);
    let schema = find_resource(runtime.resources(), &state.resource)
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "unknown resource `{}` -- list them with --list-resources",
                state.resource
            )
        })?;

    let switching = view_data
        .controller
        .as_ref()
        .is_none_or(|controller| controller.schema().name != schema.name);
    if switching {
        if let Some(previous) = view_data.controller.as_mut() {
            previous.sink_mut().detach();
        }
        let dispatcher = runtime.dispatcher(&schema)?;
        view_data.columns = columns_for(&schema);
        view_data.controller = Some(TableController::new(
            schema.clone(),
            dispatcher,
            ToastQueue::default(),
        ));
        view_data.selected_row = 0;
        view_data.selected_col = 0;
    }
    view_data.editor = None;
    view_data.delete_armed = None;

    store.dispatch(UiCommand::BeginLoading);
    let loaded = runtime.load_page(&schema, page, per_page);
    store.dispatch(UiCommand::FinishLoading);
    let loaded = loaded.with_context(|| format!("load {} page {page}", schema.label))?;

    store.dispatch(UiCommand::SetPageCount(loaded.page_count()));
    if let Some(controller) = view_data.controller.as_mut() {
        controller
            .replace_rows(loaded.rows)
            .with_context(|| format!("show {} rows", schema.label))?;
    }
    clamp_selection(view_data);
    Ok(())
}

fn clamp_selection<D: UpdateDispatcher + 'static>(view_data: &mut ViewData<D>) {
    let rows = view_data
        .controller
        .as_ref()
        .map_or(0, |controller| controller.rows().len());
    view_data.selected_row = view_data.selected_row.min(rows.saturating_sub(1));
    view_data.selected_col = view_data
        .selected_col
        .min(view_data.columns.len().saturating_sub(1));
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn arm_status_clear<D: UpdateDispatcher + 'static>(
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_status<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    store.dispatch(UiCommand::SetStatus(message.into()));
    arm_status_clear(view_data, internal_tx);
}

fn handle_key_event<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    match store.state().mode {
        AppMode::Edit => {
            handle_edit_key(store, view_data, internal_tx, key);
            false
        }
        AppMode::Form => {
            handle_form_key(store, runtime, view_data, internal_tx, key);
            false
        }
        AppMode::Nav => handle_nav_key(store, runtime, view_data, internal_tx, key),
    }
}

fn handle_nav_key<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code != KeyCode::Char('d') {
        view_data.delete_armed = None;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('j') | KeyCode::Down => move_row(view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_row(view_data, -1),
        KeyCode::Char('l') | KeyCode::Right => move_col(view_data, 1),
        KeyCode::Char('h') | KeyCode::Left => move_col(view_data, -1),
        KeyCode::Char('g') | KeyCode::Home => view_data.selected_row = 0,
        KeyCode::Char('G') | KeyCode::End => {
            view_data.selected_row = usize::MAX;
            clamp_selection(view_data);
        }
        KeyCode::Enter | KeyCode::Char('e') => begin_edit(store, view_data, internal_tx),
        KeyCode::Char(' ') => toggle_selected(store, view_data, internal_tx),
        KeyCode::Char('n') | KeyCode::PageDown => {
            change_page(store, runtime, view_data, internal_tx, UiCommand::NextPage);
        }
        KeyCode::Char('p') | KeyCode::PageUp => {
            change_page(store, runtime, view_data, internal_tx, UiCommand::PrevPage);
        }
        KeyCode::Char('+') => {
            let size = store.state().page_size.saturating_add(PAGE_SIZE_STEP);
            change_page(store, runtime, view_data, internal_tx, UiCommand::SetPageSize(size));
        }
        KeyCode::Char('-') => {
            let size = store.state().page_size.saturating_sub(PAGE_SIZE_STEP);
            change_page(store, runtime, view_data, internal_tx, UiCommand::SetPageSize(size));
        }
        KeyCode::Char('r') => match reload(store, runtime, view_data) {
            Ok(()) => emit_status(store, view_data, internal_tx, "reloaded"),
            Err(error) => {
                emit_status(store, view_data, internal_tx, format!("reload failed: {error:#}"));
            }
        },
        KeyCode::Char('d') => delete_selected(store, runtime, view_data, internal_tx),
        KeyCode::Char('a') => open_form(store, view_data, internal_tx),
        KeyCode::Char('t') => {
            store.dispatch(UiCommand::ToggleTheme);
            arm_status_clear(view_data, internal_tx);
        }
        KeyCode::Tab => switch_resource(store, runtime, view_data, internal_tx, 1),
        KeyCode::BackTab => switch_resource(store, runtime, view_data, internal_tx, -1),
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Esc => {
            if let Some(controller) = view_data.controller.as_mut() {
                controller.sink_mut().dismiss_latest();
            }
        }
        _ => {}
    }
    false
}

fn move_row<D: UpdateDispatcher + 'static>(view_data: &mut ViewData<D>, delta: isize) {
    let rows = view_data
        .controller
        .as_ref()
        .map_or(0, |controller| controller.rows().len());
    if rows == 0 {
        return;
    }
    let next = (view_data.selected_row as isize + delta).clamp(0, rows as isize - 1);
    view_data.selected_row = next as usize;
}

fn move_col<D: UpdateDispatcher + 'static>(view_data: &mut ViewData<D>, delta: isize) {
    let columns = view_data.columns.len();
    if columns == 0 {
        return;
    }
    let next = (view_data.selected_col as isize + delta).clamp(0, columns as isize - 1);
    view_data.selected_col = next as usize;
}

fn change_page<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
    command: UiCommand,
) {
    let edge = match command {
        UiCommand::NextPage => "already on the last page",
        UiCommand::PrevPage => "already on the first page",
        _ => "page size unchanged",
    };
    if store.dispatch(command).is_empty() {
        emit_status(store, view_data, internal_tx, edge);
        return;
    }
    if let Err(error) = reload(store, runtime, view_data) {
        emit_status(store, view_data, internal_tx, format!("load failed: {error:#}"));
    }
}

fn switch_resource<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
    delta: isize,
) {
    if view_data.resources.is_empty() {
        return;
    }
    let len = view_data.resources.len() as isize;
    let current = view_data
        .resources
        .iter()
        .position(|(name, _)| *name == store.state().resource)
        .unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len) as usize;
    let name = view_data.resources[next].0.clone();
    store.dispatch(UiCommand::SelectResource(name));
    if let Err(error) = reload(store, runtime, view_data) {
        emit_status(store, view_data, internal_tx, format!("load failed: {error:#}"));
    }
}

fn editor_for_selection<D: UpdateDispatcher + 'static>(
    view_data: &ViewData<D>,
) -> Result<FieldEditor, String> {
    let controller = view_data
        .controller
        .as_ref()
        .ok_or_else(|| "nothing loaded".to_owned())?;
    let column = view_data
        .columns
        .get(view_data.selected_col)
        .ok_or_else(|| "no column selected".to_owned())?;
    let CellFactory::Editor(spec) = &column.cell else {
        return Err(format!("{} is read-only", column.header));
    };
    let row = controller
        .rows()
        .get(view_data.selected_row)
        .ok_or_else(|| "no row selected".to_owned())?;
    FieldEditor::for_field(spec, row, false).map_err(|error| error.to_string())
}

fn begin_edit<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
) {
    let mut editor = match editor_for_selection(view_data) {
        Ok(editor) => editor,
        Err(message) => {
            emit_status(store, view_data, internal_tx, message);
            return;
        }
    };
    if editor.is_checkbox() {
        if let Some(edit) = editor.toggle() {
            submit_edit(store, view_data, internal_tx, edit);
        }
        return;
    }
    view_data.editor = Some(editor);
    store.dispatch(UiCommand::EnterEditMode);
}

fn toggle_selected<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
) {
    match editor_for_selection(view_data) {
        Ok(mut editor) if editor.is_checkbox() => {
            if let Some(edit) = editor.toggle() {
                submit_edit(store, view_data, internal_tx, edit);
            }
        }
        Ok(_) => {}
        Err(message) => emit_status(store, view_data, internal_tx, message),
    }
}

fn submit_edit<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
    edit: FieldEdit,
) {
    let Some(controller) = view_data.controller.as_mut() else {
        return;
    };
    if let Err(error) = controller.submit(edit) {
        tracing::error!(error = %error, "edit refused");
        emit_status(store, view_data, internal_tx, error.to_string());
    }
}

fn handle_edit_key<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(editor) = view_data.editor.as_mut() else {
        store.dispatch(UiCommand::ExitToNav);
        return;
    };

    let finished = if editor.is_select() {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Tab => {
                editor.cycle(1);
                None
            }
            KeyCode::Char('k') | KeyCode::Up | KeyCode::BackTab => {
                editor.cycle(-1);
                None
            }
            KeyCode::Enter => Some(editor.confirm()),
            KeyCode::Esc => Some(Ok(None)),
            _ => None,
        }
    } else {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) => {
                editor.cancel();
                Some(Ok(None))
            }
            (KeyCode::Enter, _) => Some(editor.blur()),
            (KeyCode::Char('j'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                editor.insert_char('\n');
                None
            }
            (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                editor.clear();
                None
            }
            (KeyCode::Backspace, _) => {
                editor.backspace();
                None
            }
            (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
                editor.insert_char(ch);
                None
            }
            _ => None,
        }
    };

    match finished {
        None => {}
        Some(Ok(edit)) => {
            view_data.editor = None;
            store.dispatch(UiCommand::ExitToNav);
            if let Some(edit) = edit {
                submit_edit(store, view_data, internal_tx, edit);
            }
        }
        Some(Err(error)) => emit_status(store, view_data, internal_tx, error.to_string()),
    }
}

fn delete_selected<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(controller) = view_data.controller.as_ref() else {
        return;
    };
    let Some(row_id) = controller
        .rows()
        .get(view_data.selected_row)
        .map(erpgrid_app::Row::id)
    else {
        return;
    };

    if view_data.delete_armed != Some(row_id) {
        view_data.delete_armed = Some(row_id);
        emit_status(
            store,
            view_data,
            internal_tx,
            format!("press d again to delete row {row_id}"),
        );
        return;
    }
    view_data.delete_armed = None;

    let schema = controller.schema().clone();
    let outcome = runtime.delete(&schema, row_id);
    let Some(controller) = view_data.controller.as_mut() else {
        return;
    };
    match outcome {
        OutcomePayload::Committed(_) => {
            controller.remove_row(row_id);
            controller
                .sink_mut()
                .notify(NotificationKind::Success, &format!("row {row_id} deleted"));
            clamp_selection(view_data);
        }
        OutcomePayload::Rejected(rejection) => {
            controller
                .sink_mut()
                .notify(NotificationKind::Error, &rejection.message);
        }
    }
}

fn open_form<D: UpdateDispatcher + 'static>(
    store: &mut UiStore,
    view_data: &mut ViewData<D>,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(controller) = view_data.controller.as_ref() else {
        emit_status(store, view_data, internal_tx, "nothing loaded");
        return;
    };
    view_data.form = Some(FormUiState::new(controller.schema()));
    store.dispatch(UiCommand::OpenCreateForm);
}

fn close_form<D: UpdateDispatcher + 'static>(store: &mut UiStore, view_data: &mut ViewData<D>) {
    view_data.form = None;
    store.dispatch(UiCommand::ExitToNav);
}

fn handle_form_key<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut() else {
        store.dispatch(UiCommand::ExitToNav);
        return;
    };

    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            close_form(store, view_data);
            emit_status(store, view_data, internal_tx, "create canceled");
        }
        (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            submit_form(store, runtime, view_data);
        }
        (KeyCode::Enter, _) if form.is_last_field() => submit_form(store, runtime, view_data),
        (KeyCode::Enter | KeyCode::Down | KeyCode::Tab, _) => form.move_cursor(1),
        (KeyCode::Up | KeyCode::BackTab, _) => form.move_cursor(-1),
        (KeyCode::Backspace, _) => {
            form.buffer.pop();
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            form.buffer.clear();
        }
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            form.buffer.push(ch);
        }
        _ => {}
    }
}

fn submit_form<R: AppRuntime>(
    store: &mut UiStore,
    runtime: &mut R,
    view_data: &mut ViewData<R::Dispatcher>,
) {
    let (Some(form), Some(controller)) = (view_data.form.as_mut(), view_data.controller.as_mut())
    else {
        return;
    };
    if !form.commit_buffer() {
        return;
    }
    if let Err(error) = form.form.validate() {
        form.error = Some(error.to_string());
        return;
    }

    let schema = controller.schema().clone();
    match runtime.create(&schema, &form.form.to_body()) {
        OutcomePayload::Committed(patch) => {
            match row_from_patch(&schema, &patch) {
                Ok(row) => {
                    controller.insert_created(row);
                    controller
                        .sink_mut()
                        .notify(NotificationKind::Success, "record created");
                }
                Err(error) => {
                    tracing::warn!(
                        resource = %schema.name,
                        error = %error,
                        "create response without id"
                    );
                    controller.sink_mut().notify(
                        NotificationKind::Error,
                        "record created but not returned -- press r to reload",
                    );
                }
            }
            view_data.selected_row = controller.rows().len().saturating_sub(1);
            close_form(store, view_data);
        }
        OutcomePayload::Rejected(rejection) => {
            let inline = rejection
                .field_errors
                .iter()
                .next()
                .and_then(|(field, messages)| {
                    let label = schema
                        .spec(field)
                        .map_or(field.as_str(), |spec| spec.label.as_str());
                    messages.first().map(|message| format!("{label}: {message}"))
                })
                .unwrap_or_else(|| rejection.message.clone());
            form.error = Some(inline);
            controller
                .sink_mut()
                .notify(NotificationKind::Error, &rejection.message);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CellMarks {
    pending: bool,
    error: bool,
}

fn cell_text(cell: &RenderedCell, marks: CellMarks, editing: Option<&str>) -> String {
    if let Some(text) = editing {
        return format!("{text}{CURSOR_MARK}");
    }
    let mut text = String::new();
    if marks.error {
        text.push_str(ERROR_MARK);
    }
    text.push_str(&cell.text);
    if marks.pending {
        text.push_str(PENDING_MARK);
    }
    text
}

fn editing_text(editor: &FieldEditor) -> String {
    if let Some(buffer) = editor.buffer() {
        return buffer.lines().last().unwrap_or_default().to_owned();
    }
    editor
        .highlighted()
        .and_then(|index| editor.options().get(index))
        .map(|option| option.label.clone())
        .unwrap_or_else(|| editor.display())
}

fn render<D: UpdateDispatcher + 'static>(
    frame: &mut ratatui::Frame<'_>,
    state: &UiState,
    view_data: &ViewData<D>,
) {
    let colors = palette(state.theme);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let selected = view_data
        .resources
        .iter()
        .position(|(name, _)| *name == state.resource)
        .unwrap_or(0);
    let titles = view_data
        .resources
        .iter()
        .map(|(_, label)| label.clone())
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("erpgrid").borders(Borders::ALL))
        .style(Style::default().fg(colors.text))
        .highlight_style(
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    let title = view_data
        .controller
        .as_ref()
        .map_or_else(|| state.resource.clone(), |c| c.schema().label.clone());
    guard_subtree(frame, layout[1], &title, |frame, area| {
        render_table(frame, area, state, view_data);
    });

    let status = Paragraph::new(status_text(state, view_data))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if let Some(editor) = &view_data.editor
        && editor.is_select()
    {
        let area = centered_rect(40, 40, frame.area());
        frame.render_widget(Clear, area);
        let options = Paragraph::new(select_overlay_text(editor)).block(
            Block::default()
                .title(editor.field().to_owned())
                .borders(Borders::ALL)
                .style(Style::default().fg(colors.accent)),
        );
        frame.render_widget(options, area);
    }

    if let Some(form) = &view_data.form {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let title = format!("new {}", form.form.resource());
        let body = Paragraph::new(form_overlay_text(form))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    if view_data.help_visible {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

/// Draws a subtree; a panic while drawing is logged and replaced by a
/// fallback view so the rest of the frame still renders.
fn guard_subtree(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    draw: impl FnOnce(&mut ratatui::Frame<'_>, Rect),
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| draw(frame, area)));
    let Err(payload) = outcome else {
        return;
    };
    let fault = panic_message(payload.as_ref());
    tracing::error!(view = title, fault = %fault, "view failed to render");
    frame.render_widget(Clear, area);
    let fallback = Paragraph::new(format!(
        "{title} could not be drawn: {fault}\npress r to reload"
    ))
    .style(Style::default().fg(Color::Red))
    .block(Block::default().title(title.to_owned()).borders(Borders::ALL));
    frame.render_widget(fallback, area);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown fault".to_owned()
    }
}

fn render_table<D: UpdateDispatcher + 'static>(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &UiState,
    view_data: &ViewData<D>,
) {
    let colors = palette(state.theme);
    let Some(controller) = &view_data.controller else {
        let empty = Paragraph::new(String::new())
            .block(Block::default().borders(Borders::ALL).title(state.resource.clone()));
        frame.render_widget(empty, area);
        return;
    };

    let reconciler = controller.reconciler();
    let table = render_rows(controller.rows(), &view_data.columns);
    let widths = vec![Constraint::Min(6); table.column_count().max(1)];

    let header = Row::new(table.headers.iter().map(|header| {
        Cell::from(header.clone()).style(
            Style::default()
                .fg(colors.text)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = table.rows.iter().enumerate().map(|(row_index, rendered)| {
        let selected_row = row_index == view_data.selected_row;
        let cells = rendered
            .cells
            .iter()
            .enumerate()
            .map(|(column_index, cell)| {
                let field = view_data
                    .columns
                    .get(column_index)
                    .map_or("", |column| column.field.as_str());
                let marks = CellMarks {
                    pending: reconciler.field_state(rendered.id, field) == FieldState::Pending,
                    error: reconciler.field_error(rendered.id, field).is_some(),
                };
                let selected_cell = selected_row && column_index == view_data.selected_col;
                let editing = view_data
                    .editor
                    .as_ref()
                    .filter(|_| selected_cell)
                    .map(editing_text);

                let mut style = Style::default().fg(colors.text);
                if !cell.editable {
                    style = style.fg(colors.muted);
                }
                if marks.pending {
                    style = style.add_modifier(Modifier::ITALIC);
                }
                if marks.error {
                    style = style.fg(colors.error);
                }
                if selected_row {
                    style = style.bg(colors.selected_bg);
                }
                if selected_cell {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(colors.accent)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(cell_text(cell, marks, editing.as_deref())).style(style)
            })
            .collect::<Vec<_>>();
        Row::new(cells)
    });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(state, controller))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn table_title<D: UpdateDispatcher + 'static>(
    state: &UiState,
    controller: &TableController<D, ToastQueue>,
) -> String {
    let mut title = format!(
        "{}  page {}/{}  {} rows",
        controller.schema().label,
        state.page,
        state.page_count,
        controller.rows().len()
    );
    let pending = controller.reconciler().pending_count();
    if pending > 0 {
        title.push_str(&format!("  {pending} saving"));
    }
    if state.loading {
        title.push_str("  loading");
    }
    title
}

fn status_text<D: UpdateDispatcher + 'static>(
    state: &UiState,
    view_data: &ViewData<D>,
) -> Text<'static> {
    let colors = palette(state.theme);
    let toast = view_data
        .controller
        .as_ref()
        .and_then(|controller| controller.reconciler().sink().latest());

    let first = match (toast, &state.status_line) {
        (Some(toast), _) => {
            let color = match toast.kind {
                NotificationKind::Success => colors.success,
                NotificationKind::Error => colors.error,
            };
            Line::from(Span::styled(toast.message.clone(), Style::default().fg(color)))
        }
        (None, Some(status)) => {
            Line::from(Span::styled(status.clone(), Style::default().fg(Color::Yellow)))
        }
        (None, None) => Line::from(Span::styled(
            "? help  enter edit  a new  d delete  n/p page  q quit",
            Style::default().fg(colors.muted),
        )),
    };

    let second = selected_field_error(view_data)
        .map(|message| Line::from(Span::styled(message, Style::default().fg(colors.error))))
        .unwrap_or_default();
    Text::from(vec![first, second])
}

fn selected_field_error<D: UpdateDispatcher + 'static>(view_data: &ViewData<D>) -> Option<String> {
    let controller = view_data.controller.as_ref()?;
    let column = view_data.columns.get(view_data.selected_col)?;
    let row = controller.rows().get(view_data.selected_row)?;
    let messages = controller.reconciler().field_error(row.id(), &column.field)?;
    Some(format!("{}: {}", column.header, messages.join("; ")))
}

fn select_overlay_text(editor: &FieldEditor) -> String {
    let highlighted = editor.highlighted().unwrap_or(0);
    let mut lines = editor
        .options()
        .iter()
        .enumerate()
        .map(|(index, option)| {
            let marker = if index == highlighted { ">" } else { " " };
            format!("{marker} {}", option.label)
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("j/k move  enter choose  esc cancel".to_owned());
    lines.join("\n")
}

fn form_overlay_text(form: &FormUiState) -> String {
    let mut lines = Vec::with_capacity(form.fields.len() + 4);
    for (index, spec) in form.fields.iter().enumerate() {
        let required = if spec.required { "*" } else { "" };
        if index == form.cursor {
            lines.push(format!(
                "> {}{required}: {}{CURSOR_MARK}",
                spec.label, form.buffer
            ));
            continue;
        }
        let value = form
            .form
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| spec.default_value());
        let shown = spec
            .option_label(&value)
            .map(str::to_owned)
            .unwrap_or_else(|| value.display());
        lines.push(format!("  {}{required}: {shown}", spec.label));
    }
    if let Some(spec) = form.current()
        && !spec.options.is_empty()
    {
        let choices = spec
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(String::new());
        lines.push(format!("choices: {choices}"));
    }
    if let Some(error) = &form.error {
        lines.push(String::new());
        lines.push(format!("error: {error}"));
    }
    lines.push(String::new());
    lines.push("enter next  ctrl-s save  esc cancel".to_owned());
    lines.join("\n")
}

const HELP_SECTIONS: [(&str, &[(&str, &str)]); 3] = [
    (
        "navigation",
        &[
            ("j/k h/l", "move"),
            ("g/G", "first/last row"),
            ("tab", "next resource"),
            ("n/p", "next/prev page"),
            ("+/-", "page size"),
            ("r", "reload"),
        ],
    ),
    (
        "editing",
        &[
            ("enter", "edit cell"),
            ("space", "toggle checkbox"),
            ("a", "new record"),
            ("d d", "delete row"),
            ("esc", "dismiss toast / cancel"),
        ],
    ),
    (
        "other",
        &[("t", "toggle theme"), ("?", "close help"), ("q", "quit")],
    ),
];

fn help_overlay_text() -> String {
    let mut lines = Vec::new();
    for (section, bindings) in HELP_SECTIONS {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(section.to_owned());
        for (keys, action) in bindings {
            lines.push(format!("  {keys:<9} {action}"));
        }
    }
    lines.join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

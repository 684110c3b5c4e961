//! Main application logic for the terminal user interface.
//!
//! `ChecklistApp` walks through location setup and login, then hosts a
//! `ChecklistEngine` for the checklist screen and its modals. Every tick it
//! folds remote snapshots into the engine and surfaces queued notices.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame, Terminal,
};
use tracing::{debug, info, warn};

use crate::asana::{load_task_api_config, AsanaClient};
use crate::config::{Config, DataPaths};
use crate::engine::{ChecklistEngine, StageOutcome};
use crate::error::{ChecklistError, Notice, NoticeKind};
use crate::fields::{format_role, format_status, Phase, TaskStatus};
use crate::passcode::PasscodeEntry;
use crate::prefs::{Preferences, LOCATION_CODE_KEY};
use crate::session::{self, Session};
use crate::store::DocumentStore;
use crate::tui::{
    colors::{BRAND_YELLOW, ERROR, INK, PRIMARY, SUCCESS},
    enums::{AdminPurpose, AppState},
    input::InputField,
    keypad::render_keypad,
    utils::centered_rect,
};

/// One selectable row of the task table: a task or one of its subtasks.
#[derive(Clone, Debug, PartialEq)]
struct RowRef {
    task_index: usize,
    task_id: String,
    sub_task_id: Option<String>,
}

pub struct ChecklistApp {
    state: AppState,
    paths: DataPaths,
    config: Config,
    prefs: Preferences,
    engine: Option<ChecklistEngine<DocumentStore>>,
    location_code: Option<String>,
    location_name: String,
    keypad: PasscodeEntry,
    input: InputField,
    admin_purpose: Option<AdminPurpose>,
    phase: Phase,
    table_state: TableState,
    picker_index: usize,
    notices: VecDeque<Notice>,
    return_state: AppState,
    status_message: String,
}

impl ChecklistApp {
    /// Load config and preferences. Starts at login when this device is bound
    /// to a location that still exists, otherwise at location setup.
    pub fn new(paths: &DataPaths) -> Result<Self, ChecklistError> {
        let config = Config::load(&paths.config())?;
        let prefs = Preferences::open(&paths.prefs())?;
        let keypad = PasscodeEntry::new(config.passcode_length);

        let mut app = ChecklistApp {
            state: AppState::LocationCode,
            paths: paths.clone(),
            config,
            prefs,
            engine: None,
            location_code: None,
            location_name: String::new(),
            keypad,
            input: InputField::new(),
            admin_purpose: None,
            phase: Phase::Opening,
            table_state: TableState::default(),
            picker_index: 0,
            notices: VecDeque::new(),
            return_state: AppState::LocationCode,
            status_message: String::new(),
        };

        if let Ok(code) = session::remembered_location(&app.prefs) {
            let store = app.open_store()?;
            match session::verify_location_code(&store, &code) {
                Ok(location) => {
                    app.location_code = Some(location.code);
                    app.location_name = location.name;
                    app.state = AppState::Login;
                }
                Err(e) => app.report(e),
            }
        }
        Ok(app)
    }

    fn open_store(&self) -> Result<DocumentStore, ChecklistError> {
        Ok(DocumentStore::open(&self.paths.store())?)
    }

    fn report(&mut self, err: ChecklistError) {
        warn!(error = %err, "operation failed");
        self.notices.push_back(Notice::from(&err));
    }

    fn set_status_message(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    fn is_base_state(state: AppState) -> bool {
        matches!(state, AppState::LocationCode | AppState::Login | AppState::Checklist)
    }

    /// Apply remote snapshots and show pending notices.
    pub fn tick(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.sync();
            self.notices.extend(engine.take_notices());
        }
        self.clamp_selection();
        if !self.notices.is_empty() && Self::is_base_state(self.state) {
            self.return_state = self.state;
            self.state = AppState::Notice;
        }
    }

    // ---------------------------------------------------------------
    // Login and location binding
    // ---------------------------------------------------------------

    fn login(&mut self, passcode: &str) {
        let Some(code) = self.location_code.clone() else {
            self.state = AppState::LocationCode;
            return;
        };
        let result = self.open_store().and_then(|store| {
            let session = session::login(&store, &code, passcode)?;
            Ok((store, session))
        });
        match result {
            Ok((store, session)) => self.start_checklist(store, session),
            Err(e) => self.report(e),
        }
    }

    fn start_checklist(&mut self, store: DocumentStore, session: Session) {
        let is_admin = session.is_admin();
        let location = session.location.clone();
        let mut engine = ChecklistEngine::new(store, self.config.clone(), session);
        if let Err(e) = engine.attach() {
            self.report(e);
            return;
        }
        engine.sync();

        match load_task_api_config(engine.store(), &location) {
            Ok(api) => {
                let token = api.access_token.clone().unwrap_or_default();
                let client = AsanaClient::new(&self.config.task_api_base_url, &token);
                engine.connect_task_api(Box::new(client), &api);
                if let Err(e) = engine.load_external_tasks() {
                    warn!(error = %e, "external tasks unavailable");
                    self.notices.push_back(Notice::error(format!("Failed to load external tasks: {e}")));
                }
            }
            Err(ChecklistError::TaskApiConfigMissing(_)) => debug!(%location, "no external task source"),
            Err(e) => self.report(e),
        }
        if is_admin {
            if let Err(e) = engine.load_pre_structured() {
                warn!(error = %e, "failed to load pre-structured tasks");
            }
        }

        info!(%location, "checklist opened");
        self.engine = Some(engine);
        self.phase = Phase::Opening;
        self.table_state.select(Some(0));
        self.state = AppState::Checklist;
    }

    /// Leave the checklist and unbind the device, as if it were freshly set up.
    fn logout(&mut self) {
        if let Err(e) = self.prefs.remove(LOCATION_CODE_KEY) {
            self.report(ChecklistError::from(e));
            return;
        }
        self.engine = None;
        self.keypad.cancel();
        self.location_code = None;
        self.location_name.clear();
        self.input = InputField::new();
        self.state = AppState::LocationCode;
        info!("logged out and cleared the remembered location");
        self.set_status_message("Logged out");
    }

    fn open_admin_keypad(&mut self, purpose: AdminPurpose) {
        self.keypad.cancel();
        self.admin_purpose = Some(purpose);
        self.state = AppState::AdminPasscode;
    }

    fn submit_admin_code(&mut self, code: &str) {
        match self.admin_purpose.take() {
            Some(AdminPurpose::BindLocation(location_code)) => {
                let result = self.open_store().and_then(|store| {
                    session::bind_location(&store, &mut self.prefs, &location_code, code)
                });
                match result {
                    Ok(location) => {
                        self.notices.push_back(Notice::success(
                            "Location Set",
                            format!("This device now opens {}", location.name),
                        ));
                        self.location_code = Some(location.code);
                        self.location_name = location.name;
                        self.state = AppState::Login;
                    }
                    Err(e) => {
                        self.report(e);
                        self.state = AppState::LocationCode;
                    }
                }
            }
            Some(AdminPurpose::ResetLocation) => {
                let result = self
                    .open_store()
                    .and_then(|store| session::reset_location(&store, &mut self.prefs, code));
                match result {
                    Ok(()) => {
                        self.location_code = None;
                        self.location_name.clear();
                        self.input = InputField::new();
                        self.state = AppState::LocationCode;
                    }
                    Err(e) => {
                        self.report(e);
                        self.state = AppState::Login;
                    }
                }
            }
            Some(AdminPurpose::EditMode) => {
                if let Some(engine) = self.engine.as_mut() {
                    if let Err(e) = engine.enable_edit_mode(code) {
                        self.report(e);
                    }
                }
                self.state = AppState::Checklist;
            }
            None => self.state = self.fallback_state(),
        }
    }

    fn fallback_state(&self) -> AppState {
        if self.engine.is_some() {
            AppState::Checklist
        } else if self.location_code.is_some() {
            AppState::Login
        } else {
            AppState::LocationCode
        }
    }

    // ---------------------------------------------------------------
    // Checklist helpers
    // ---------------------------------------------------------------

    fn rows(&self) -> Vec<RowRef> {
        let Some(engine) = &self.engine else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for (i, task) in engine.tasks(self.phase).iter().enumerate() {
            rows.push(RowRef { task_index: i, task_id: task.id.clone(), sub_task_id: None });
            for sub in task.sub_tasks.iter().flatten() {
                rows.push(RowRef {
                    task_index: i,
                    task_id: task.id.clone(),
                    sub_task_id: Some(sub.id.clone()),
                });
            }
        }
        rows
    }

    fn selected_row(&self) -> Option<RowRef> {
        let index = self.table_state.selected()?;
        self.rows().into_iter().nth(index)
    }

    fn clamp_selection(&mut self) {
        let count = self.rows().len();
        match self.table_state.selected() {
            _ if count == 0 => self.table_state.select(None),
            Some(i) if i >= count => self.table_state.select(Some(count - 1)),
            None => self.table_state.select(Some(0)),
            _ => {}
        }
    }

    fn select_offset(&mut self, delta: isize) {
        let count = self.rows().len();
        if count == 0 {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, count as isize - 1);
        self.table_state.select(Some(next as usize));
    }

    fn switch_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.table_state.select(Some(0));
        self.clamp_selection();
    }

    fn stage_selected(&mut self, status: TaskStatus) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let result = engine.stage(self.phase, &row.task_id, row.sub_task_id.as_deref(), status);
        let pending = engine.cart().len();
        match result {
            Ok(StageOutcome::OpenPlayback) => {
                self.picker_index = 0;
                self.state = AppState::Playback;
            }
            Ok(StageOutcome::Staged) => {
                self.set_status_message(format!("Marked {} ({pending} pending)", format_status(Some(status))))
            }
            Ok(StageOutcome::Unstaged) => self.set_status_message(format!("Unmarked ({pending} pending)")),
            Err(e) => self.report(e),
        }
    }

    fn move_selected(&mut self, up: bool) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if !engine.edit_mode() {
            self.set_status_message("Press 'e' to enable edit mode first");
            return;
        }
        if row.sub_task_id.is_some() {
            return;
        }
        let from = row.task_index;
        let to = if up { from.saturating_sub(1) } else { from + 1 };
        if from == to || !engine.move_task(self.phase, from, to) {
            self.set_status_message("Only custom tasks can be moved");
            return;
        }
        if let Some(index) = self.rows().iter().position(|r| r.task_id == row.task_id && r.sub_task_id.is_none()) {
            self.table_state.select(Some(index));
        }
    }

    fn open_description_editor(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let Some(engine) = &self.engine else {
            return;
        };
        if !engine.edit_mode() {
            self.set_status_message("Press 'e' to enable edit mode first");
            return;
        }
        let current = engine
            .task(self.phase, &row.task_id)
            .and_then(|t| t.description.clone())
            .unwrap_or_default();
        self.input = InputField::with_value(&current);
        self.state = AppState::EditDescription;
    }

    fn is_admin(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.session().is_admin())
    }

    // ---------------------------------------------------------------
    // Input handling
    // ---------------------------------------------------------------

    fn handle_location_code_input(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Esc => return true,
            KeyCode::Enter => {
                let code = self.input.value.trim().to_uppercase();
                if code.is_empty() {
                    self.set_status_message("Enter a location code");
                    return false;
                }
                let verified = self
                    .open_store()
                    .and_then(|store| session::verify_location_code(&store, &code));
                match verified {
                    Ok(location) => self.open_admin_keypad(AdminPurpose::BindLocation(location.code)),
                    Err(e) => self.report(e),
                }
            }
            KeyCode::Char(c) => self.input.handle_char(c.to_ascii_uppercase()),
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            _ => {}
        }
        false
    }

    fn handle_login_input(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Esc | KeyCode::Char('q') => return true,
            KeyCode::Char('r') => self.open_admin_keypad(AdminPurpose::ResetLocation),
            KeyCode::Char(c) => {
                self.keypad.push(c);
            }
            KeyCode::Backspace => self.keypad.backspace(),
            KeyCode::Enter => {
                let passcode = self.keypad.submit();
                self.login(&passcode);
            }
            _ => {}
        }
        false
    }

    fn handle_admin_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.keypad.cancel();
                self.state = match self.admin_purpose.take() {
                    Some(AdminPurpose::BindLocation(_)) => AppState::LocationCode,
                    _ => self.fallback_state(),
                };
            }
            KeyCode::Char(c) => {
                self.keypad.push(c);
            }
            KeyCode::Backspace => self.keypad.backspace(),
            KeyCode::Enter => {
                let code = self.keypad.submit();
                self.submit_admin_code(&code);
            }
            _ => {}
        }
    }

    fn handle_commit_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.keypad.cancel();
                if let Some(engine) = self.engine.as_mut() {
                    engine.cancel_commit();
                }
                self.state = AppState::Checklist;
            }
            KeyCode::Char(c) => {
                self.keypad.push(c);
            }
            KeyCode::Backspace => self.keypad.backspace(),
            KeyCode::Enter => {
                let code = self.keypad.submit();
                let result = match self.engine.as_mut() {
                    Some(engine) => engine.submit_cart(&code),
                    None => Ok(0),
                };
                if let Err(e) = result {
                    self.report(e);
                }
                self.state = AppState::Checklist;
            }
            _ => {}
        }
    }

    fn handle_checklist_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => self.switch_phase(self.phase.next()),
            KeyCode::BackTab | KeyCode::Left => self.switch_phase(self.phase.previous()),
            KeyCode::Up if modifiers.contains(KeyModifiers::SHIFT) => self.move_selected(true),
            KeyCode::Down if modifiers.contains(KeyModifiers::SHIFT) => self.move_selected(false),
            KeyCode::Char('K') => self.move_selected(true),
            KeyCode::Char('J') => self.move_selected(false),
            KeyCode::Up | KeyCode::Char('k') => self.select_offset(-1),
            KeyCode::Down | KeyCode::Char('j') => self.select_offset(1),
            KeyCode::Char(' ') | KeyCode::Char('d') => self.stage_selected(TaskStatus::Done),
            KeyCode::Char('x') => self.stage_selected(TaskStatus::NotPerformed),
            KeyCode::Enter => {
                let requested = match self.engine.as_mut() {
                    Some(engine) => engine.request_commit(),
                    None => return false,
                };
                match requested {
                    Ok(()) => {
                        self.keypad.cancel();
                        self.state = AppState::CommitPasscode;
                    }
                    Err(e) => self.set_status_message(e.to_string()),
                }
            }
            KeyCode::Char('e') => {
                let editing = self.engine.as_ref().is_some_and(|e| e.edit_mode());
                if editing {
                    if let Some(engine) = self.engine.as_mut() {
                        engine.disable_edit_mode();
                    }
                    self.set_status_message("Edit mode off");
                } else {
                    self.open_admin_keypad(AdminPurpose::EditMode);
                }
            }
            KeyCode::Char('c') => self.open_description_editor(),
            KeyCode::Char('a') => {
                if self.is_admin() {
                    self.input = InputField::new();
                    self.state = AppState::AddTask;
                } else {
                    self.set_status_message("Only admins can add tasks");
                }
            }
            KeyCode::Char('p') => {
                if self.is_admin() {
                    self.picker_index = 0;
                    self.state = AppState::PresetPicker;
                } else {
                    self.set_status_message("Only admins can add tasks");
                }
            }
            KeyCode::Char('m') => {
                self.picker_index = 0;
                self.state = AppState::Playback;
            }
            KeyCode::Char('L') => self.logout(),
            KeyCode::Char('h') | KeyCode::F(1) => self.state = AppState::Help,
            _ => {}
        }
        false
    }

    fn handle_text_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => self.state = AppState::Checklist,
            KeyCode::Enter => {
                let text = self.input.take();
                let phase = self.phase;
                let row = self.selected_row();
                let adding = self.state == AppState::AddTask;
                self.state = AppState::Checklist;
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                let result = if adding {
                    engine.add_task(phase, &text).map(|_| "Task added")
                } else {
                    match row {
                        Some(row) => engine
                            .edit_description(phase, &row.task_id, &text)
                            .map(|_| "Description updated"),
                        None => return,
                    }
                };
                match result {
                    Ok(msg) => self.set_status_message(msg),
                    Err(e) => self.report(e),
                }
            }
            KeyCode::Char(c) => self.input.handle_char(c),
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            _ => {}
        }
    }

    fn picker_len(&self) -> usize {
        match self.state {
            AppState::PresetPicker => self.engine.as_ref().map_or(0, |e| e.pre_structured().len()),
            AppState::Playback => self.config.playlists.len(),
            _ => 0,
        }
    }

    fn handle_picker_input(&mut self, key: KeyCode) {
        let len = self.picker_len();
        match key {
            KeyCode::Esc => self.state = AppState::Checklist,
            KeyCode::Up | KeyCode::Char('k') => self.picker_index = self.picker_index.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.picker_index + 1 < len {
                    self.picker_index += 1;
                }
            }
            KeyCode::Char('s') if self.state == AppState::Playback => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.stop_playback();
                }
                self.state = AppState::Checklist;
            }
            KeyCode::Enter => {
                let index = self.picker_index;
                let phase = self.phase;
                let presets = self.state == AppState::PresetPicker;
                self.state = AppState::Checklist;
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                if presets {
                    match engine.add_pre_structured(phase, index) {
                        Ok(_) => self.set_status_message("Task added"),
                        Err(e) => self.report(e),
                    }
                } else {
                    engine.select_playlist(index);
                }
            }
            _ => {}
        }
    }

    fn handle_notice_input(&mut self) {
        self.notices.pop_front();
        if self.notices.is_empty() {
            if let Some(engine) = self.engine.as_mut() {
                engine.acknowledge();
            }
            self.state = self.return_state;
        }
    }

    /// Handle a single key press. Returns true if the application should quit.
    pub fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        if Self::is_base_state(self.state) {
            self.status_message.clear();
        }
        match self.state {
            AppState::LocationCode => return self.handle_location_code_input(key),
            AppState::Login => return self.handle_login_input(key),
            AppState::Checklist => return self.handle_checklist_input(key, modifiers),
            AppState::AdminPasscode => self.handle_admin_input(key),
            AppState::CommitPasscode => self.handle_commit_input(key),
            AppState::EditDescription | AppState::AddTask => self.handle_text_input(key),
            AppState::PresetPicker | AppState::Playback => self.handle_picker_input(key),
            AppState::Notice => self.handle_notice_input(),
            AppState::Help => self.state = AppState::Checklist,
        }
        false
    }

    /// Poll for and handle keyboard events.
    ///
    /// Returns true if the application should quit.
    fn handle_input(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key.code, key.modifiers));
                }
            }
        }
        Ok(false)
    }

    // ---------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------

    fn render_backdrop(&self, f: &mut Frame, area: Rect, title: &str) {
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "SHIFT CHECKLIST",
                Style::default().fg(INK).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(title.to_string(), Style::default().fg(INK))),
        ];
        let backdrop = Paragraph::new(text)
            .style(Style::default().bg(BRAND_YELLOW))
            .alignment(Alignment::Center);
        f.render_widget(backdrop, area);
    }

    fn render_location_setup(&self, f: &mut Frame, area: Rect) {
        self.render_backdrop(f, area, "Set up this device");
        let area = centered_rect(50, 20, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .title("Location Code")
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::White).fg(INK));
        let inner = block.inner(area);
        let paragraph = Paragraph::new(vec![
            Line::from(self.input.value.clone()),
            Line::from(""),
            Line::from("Enter verify  Esc quit"),
        ])
        .block(block);
        f.render_widget(paragraph, area);
        f.set_cursor_position((inner.x + self.input.cursor as u16, inner.y));
    }

    fn render_login(&self, f: &mut Frame, area: Rect) {
        self.render_backdrop(f, area, &format!("Welcome to {}", self.location_name));
        render_keypad(f, area, "Login", "Enter your passcode  (r: reset location)", &self.keypad);
    }

    fn render_checklist(&mut self, f: &mut Frame, area: Rect) {
        let Some(engine) = &self.engine else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(5),
            ])
            .split(area);

        let mut header = vec![
            Span::styled("SHIFT CHECKLIST", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(
                format!("{}  {}", engine.session().location, format_role(engine.session().role)),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            ),
        ];
        if engine.edit_mode() {
            header.push(Span::raw("  "));
            header.push(Span::styled(
                " EDIT MODE ",
                Style::default().bg(BRAND_YELLOW).fg(INK).add_modifier(Modifier::BOLD),
            ));
        }
        if let Some(playlist) = engine.playback().now_playing() {
            header.push(Span::raw(format!("  ♪ {}", playlist.name)));
        }
        let header_block = Paragraph::new(Line::from(header))
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        f.render_widget(header_block, chunks[0]);

        let titles: Vec<Line> = Phase::ALL
            .iter()
            .map(|&p| {
                let style = if engine.is_fully_processed(p) {
                    Style::default().fg(SUCCESS).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(
                    format!("{p} {:.0}%", engine.completion_percentage(p)),
                    style,
                ))
            })
            .collect();
        let tabs = Tabs::new(titles)
            .select(self.phase.index())
            .block(Block::default().borders(Borders::ALL))
            .highlight_style(Style::default().bg(PRIMARY).fg(Color::White));
        f.render_widget(tabs, chunks[1]);

        let tasks = engine.tasks(self.phase);
        let cart = engine.cart();
        let rows: Vec<Row> = self
            .rows()
            .into_iter()
            .filter_map(|row| {
                let task = tasks.get(row.task_index)?;
                let (name, status) = match &row.sub_task_id {
                    Some(sub_id) => {
                        let sub = task.sub_tasks.iter().flatten().find(|s| &s.id == sub_id)?;
                        (format!("   └ {}", sub.name), sub.status)
                    }
                    None => (task.name.clone(), task.status),
                };
                let pending = cart.pending_status(self.phase, &row.task_id, row.sub_task_id.as_deref());
                let (status_text, status_style) = match (pending, status) {
                    (Some(p), _) => (
                        format!("→ {}", format_status(Some(p))),
                        Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD),
                    ),
                    (None, Some(TaskStatus::Done)) => (format_status(status).to_string(), Style::default().fg(SUCCESS)),
                    (None, Some(TaskStatus::NotPerformed)) => (format_status(status).to_string(), Style::default().fg(ERROR)),
                    (None, None) => (format_status(status).to_string(), Style::default()),
                };
                let origin = if row.sub_task_id.is_some() { "" } else { task.origin() };
                Some(Row::new(vec![
                    Cell::from(name),
                    Cell::from(status_text).style(status_style),
                    Cell::from(origin),
                ]))
            })
            .collect();

        let header_row = Row::new(["Task", "Status", "Kind"].iter().map(|h| {
            Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD))
        }))
        .style(Style::default().bg(PRIMARY).fg(Color::White))
        .height(1);

        let widths = [Constraint::Min(30), Constraint::Length(12), Constraint::Length(10)];
        let table = Table::new(rows, widths)
            .header(header_row)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "{} - {} pending - Press 'h' for help",
                self.phase,
                cart.len()
            )))
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");
        f.render_stateful_widget(table, chunks[2], &mut self.table_state);

        let detail = self
            .selected_row()
            .and_then(|row| engine.task(self.phase, &row.task_id))
            .map(|task| {
                let mut lines = vec![Line::from(Span::styled(
                    task.name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                if let Some(desc) = &task.description {
                    lines.push(Line::from(desc.clone()));
                }
                if let Some(hint) = task.hint_for(&engine.session().location) {
                    lines.push(Line::from(Span::styled(
                        format!("Note: {hint}"),
                        Style::default().add_modifier(Modifier::ITALIC),
                    )));
                }
                if let Some(by) = &task.completed_by {
                    lines.push(Line::from(format!("Completed with code {by}")));
                }
                lines
            })
            .unwrap_or_default();
        let detail_block = Paragraph::new(detail)
            .block(Block::default().borders(Borders::ALL).title("Details"))
            .wrap(Wrap { trim: true });
        f.render_widget(detail_block, chunks[3]);
    }

    fn render_text_prompt(&self, f: &mut Frame, area: Rect, title: &str) {
        let area = centered_rect(60, 20, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::White).fg(INK));
        let inner = block.inner(area);
        let paragraph = Paragraph::new(vec![
            Line::from(self.input.value.clone()),
            Line::from(""),
            Line::from("Enter save  Esc cancel"),
        ])
        .block(block);
        f.render_widget(paragraph, area);
        f.set_cursor_position((inner.x + self.input.cursor as u16, inner.y));
    }

    fn render_picker(&self, f: &mut Frame, area: Rect, title: &str, items: Vec<String>, footer: &str) {
        let area = centered_rect(50, 50, area);
        f.render_widget(Clear, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);
        let empty = items.is_empty();
        let list_items: Vec<ListItem> = if empty {
            vec![ListItem::new("(nothing to pick)")]
        } else {
            items.into_iter().map(ListItem::new).collect()
        };
        let list = List::new(list_items)
            .block(Block::default().title(title.to_string()).borders(Borders::ALL))
            .highlight_style(Style::default().bg(PRIMARY).fg(Color::White))
            .highlight_symbol(">> ");
        let mut state = ListState::default().with_selected((!empty).then_some(self.picker_index));
        f.render_stateful_widget(list, chunks[0], &mut state);
        f.render_widget(Paragraph::new(footer.to_string()).alignment(Alignment::Center), chunks[1]);
    }

    fn render_notice(&self, f: &mut Frame, area: Rect) {
        let Some(notice) = self.notices.front() else {
            return;
        };
        let area = centered_rect(50, 25, area);
        f.render_widget(Clear, area);
        let bg = match notice.kind {
            NoticeKind::Success => SUCCESS,
            NoticeKind::Error => ERROR,
            NoticeKind::Info => PRIMARY,
        };
        let text = vec![
            Line::from(""),
            Line::from(notice.message.clone()),
            Line::from(""),
            Line::from("Press any key to continue"),
        ];
        let paragraph = Paragraph::new(text)
            .block(
                Block::default()
                    .title(notice.title.clone())
                    .borders(Borders::ALL)
                    .style(Style::default().bg(bg).fg(Color::White)),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let help_text = vec![
            Line::from(Span::styled("Shift Checklist Help", bold)),
            Line::from(""),
            Line::from(Span::styled("Checklist:", bold)),
            Line::from("  Tab/←/→      Switch phase"),
            Line::from("  ↑/↓, k/j     Select task"),
            Line::from("  Space/d      Mark done (again to unmark)"),
            Line::from("  x            Mark skipped (again to unmark)"),
            Line::from("  Enter        Submit marked tasks with a passcode"),
            Line::from("  m            Music playlists"),
            Line::from("  L            Log out"),
            Line::from("  q/Esc        Quit"),
            Line::from(""),
            Line::from(Span::styled("Edit mode (admin code):", bold)),
            Line::from("  e            Toggle edit mode"),
            Line::from("  c            Change description"),
            Line::from("  K/J, Shift+↑/↓  Move custom task"),
            Line::from(""),
            Line::from(Span::styled("Admins:", bold)),
            Line::from("  a            Add task"),
            Line::from("  p            Add a suggested task"),
        ];
        let paragraph = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Help - Press any key to return"))
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let status_text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            match self.state {
                AppState::LocationCode => "Enter the location code for this device".to_string(),
                AppState::Login => format!("{} | Enter your passcode", self.location_name),
                AppState::Checklist => {
                    let pending = self.engine.as_ref().map_or(0, |e| e.cart().len());
                    format!("{pending} pending | Space done  x skip  Enter submit  h help")
                }
                AppState::CommitPasscode => "Submit marked tasks".to_string(),
                AppState::AdminPasscode => "Admin code required".to_string(),
                AppState::EditDescription => "Edit description".to_string(),
                AppState::AddTask => format!("Add task to {}", self.phase),
                AppState::PresetPicker => "Pick a suggested task".to_string(),
                AppState::Playback => "Music".to_string(),
                AppState::Notice => String::new(),
                AppState::Help => "Help".to_string(),
            }
        };
        let status = Paragraph::new(status_text)
            .style(Style::default().bg(PRIMARY).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render_state(&mut self, f: &mut Frame, area: Rect, state: AppState) {
        match state {
            AppState::LocationCode => self.render_location_setup(f, area),
            AppState::Login => self.render_login(f, area),
            AppState::Checklist => self.render_checklist(f, area),
            AppState::CommitPasscode => {
                self.render_checklist(f, area);
                render_keypad(f, area, "Submit Tasks", "Enter completion passcode", &self.keypad);
            }
            AppState::AdminPasscode => {
                match self.admin_purpose {
                    Some(AdminPurpose::EditMode) => self.render_checklist(f, area),
                    _ => self.render_backdrop(f, area, "Admin verification"),
                }
                render_keypad(f, area, "Admin Code", "Enter an admin code", &self.keypad);
            }
            AppState::EditDescription => {
                self.render_checklist(f, area);
                self.render_text_prompt(f, area, "Description");
            }
            AppState::AddTask => {
                self.render_checklist(f, area);
                self.render_text_prompt(f, area, &format!("New {} task", self.phase));
            }
            AppState::PresetPicker => {
                self.render_checklist(f, area);
                let items = self
                    .engine
                    .as_ref()
                    .map(|e| e.pre_structured().iter().map(|p| p.name.clone()).collect())
                    .unwrap_or_default();
                self.render_picker(f, area, "Suggested Tasks", items, "Enter add  Esc close");
            }
            AppState::Playback => {
                self.render_checklist(f, area);
                let items = self
                    .config
                    .playlists
                    .iter()
                    .map(|p| format!("{} - {}", p.name, p.description))
                    .collect();
                self.render_picker(f, area, "Select Music", items, "Enter play  s stop  Esc close");
            }
            AppState::Notice => {
                if Self::is_base_state(self.return_state) {
                    self.render_state(f, area, self.return_state);
                }
                self.render_notice(f, area);
            }
            AppState::Help => self.render_help(f, area),
        }
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
            .split(f.area());

        self.render_state(f, chunks[0], self.state);
        self.render_status_bar(f, chunks[1]);
    }

    /// Main event loop for the TUI application.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.tick();
            terminal.draw(|f| self.render(f))?;

            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields_from;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn seed(dir: &TempDir) -> DataPaths {
        let paths = DataPaths::new(dir.path().to_path_buf());
        let mut store = DocumentStore::open(&paths.store()).unwrap();
        let docs = [
            ("locations", "waimea", json!({"Code": "LOC001", "Name": "Waimea"})),
            ("users", "kai", json!({"passcode": "1111", "role": "Regular", "location": ["LOC001"]})),
            ("users", "boss", json!({"passcode": "999999", "role": "Admin", "location": ["LOC001"]})),
            ("settings", "admin", json!({"validCodes": ["777777"]})),
            ("tasks", "Opening", json!({"items": [
                {"id": "X", "name": "Custom", "subText": {}, "required": false},
                {"id": "Y", "name": "Wipe menu board", "subText": {}, "required": false}
            ]})),
            ("tasks", "Prep", json!({"items": []})),
            ("tasks", "Mid", json!({"items": []})),
            ("tasks", "Closing", json!({"items": []})),
        ];
        for (collection, id, fields) in docs {
            store.merge_document(collection, id, fields_from(fields)).unwrap();
        }
        fs::write(paths.config(), r#"{"completionCodes": ["1234"]}"#).unwrap();
        paths
    }

    fn press(app: &mut ChecklistApp, keys: &str) {
        for c in keys.chars() {
            app.handle_key(KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    fn enter(app: &mut ChecklistApp) {
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);
    }

    fn logged_in(dir: &TempDir, passcode: &str) -> ChecklistApp {
        let paths = seed(dir);
        let mut prefs = Preferences::open(&paths.prefs()).unwrap();
        prefs.set(LOCATION_CODE_KEY, "LOC001").unwrap();
        let mut app = ChecklistApp::new(&paths).unwrap();
        assert_eq!(app.state, AppState::Login);
        press(&mut app, passcode);
        enter(&mut app);
        app.tick();
        assert_eq!(app.state, AppState::Checklist);
        app
    }

    #[test]
    fn test_logout_forgets_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "1111");
        app.handle_key(KeyCode::Char('L'), KeyModifiers::NONE);
        assert_eq!(app.state, AppState::LocationCode);
        assert!(app.engine.is_none());
        assert_eq!(app.location_code, None);

        let prefs = Preferences::open(&DataPaths::new(dir.path().to_path_buf()).prefs()).unwrap();
        assert_eq!(prefs.get(LOCATION_CODE_KEY), None);
        assert!(session::remembered_location(&prefs).is_err());
    }

    #[test]
    fn test_location_setup_then_login() {
        let dir = tempfile::tempdir().unwrap();
        let paths = seed(&dir);
        let mut app = ChecklistApp::new(&paths).unwrap();
        assert_eq!(app.state, AppState::LocationCode);

        press(&mut app, "loc001");
        enter(&mut app);
        assert_eq!(app.state, AppState::AdminPasscode);
        press(&mut app, "999999");
        enter(&mut app);
        assert_eq!(app.state, AppState::Login);
        assert_eq!(app.location_name, "Waimea");
        let prefs = Preferences::open(&paths.prefs()).unwrap();
        assert_eq!(session::remembered_location(&prefs).unwrap(), "LOC001");

        app.tick();
        assert_eq!(app.state, AppState::Notice);
        app.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        assert_eq!(app.state, AppState::Login);

        press(&mut app, "0000");
        enter(&mut app);
        app.tick();
        assert_eq!(app.state, AppState::Notice);
        assert_eq!(app.notices[0].message, "Invalid passcode.");
    }

    #[test]
    fn test_mark_and_submit_with_passcode() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "1111");

        press(&mut app, " ");
        assert_eq!(app.engine.as_ref().unwrap().cart().len(), 1);
        enter(&mut app);
        assert_eq!(app.state, AppState::CommitPasscode);

        press(&mut app, "9999");
        enter(&mut app);
        app.tick();
        assert_eq!(app.state, AppState::Notice);
        assert_eq!(app.engine.as_ref().unwrap().cart().len(), 1);
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(app.state, AppState::Checklist);

        enter(&mut app);
        press(&mut app, "1234");
        enter(&mut app);
        let engine = app.engine.as_ref().unwrap();
        assert!(engine.cart().is_empty());
        assert_eq!(engine.task(Phase::Opening, "1").unwrap().status, Some(TaskStatus::Done));
    }

    #[test]
    fn test_music_task_opens_playlists() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "1111");
        for _ in 0..12 {
            app.handle_key(KeyCode::Down, KeyModifiers::NONE);
        }
        press(&mut app, " ");
        assert_eq!(app.state, AppState::Playback);
        app.handle_key(KeyCode::Down, KeyModifiers::NONE);
        enter(&mut app);
        let engine = app.engine.as_ref().unwrap();
        assert_eq!(engine.playback().now_playing().unwrap().name, "Island Vibes");
        assert!(engine.cart().is_empty());
    }

    #[test]
    fn test_edit_mode_reorders_custom_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "1111");
        app.table_state.select(Some(15));
        press(&mut app, "K");
        assert_eq!(app.status_message, "Press 'e' to enable edit mode first");

        press(&mut app, "e777777");
        enter(&mut app);
        assert!(app.engine.as_ref().unwrap().edit_mode());
        app.tick();
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);

        app.table_state.select(Some(15));
        press(&mut app, "K");
        app.tick();
        let ids: Vec<&str> = app.engine.as_ref().unwrap().tasks(Phase::Opening)[14..]
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["Y", "X"]);
        assert_eq!(app.table_state.selected(), Some(14));
    }

    #[test]
    fn test_admin_adds_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "999999");
        app.switch_phase(Phase::Mid);
        press(&mut app, "a");
        assert_eq!(app.state, AppState::AddTask);
        press(&mut app, "Restock napkins");
        enter(&mut app);
        app.tick();
        let engine = app.engine.as_ref().unwrap();
        assert_eq!(engine.tasks(Phase::Mid)[0].name, "Restock napkins");
    }

    #[test]
    fn test_employee_cannot_add_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = logged_in(&dir, "1111");
        press(&mut app, "a");
        assert_eq!(app.state, AppState::Checklist);
        assert_eq!(app.status_message, "Only admins can add tasks");
    }
}

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::columns::columns;
use crate::compare::SortDirection;
use crate::dataset::DatasetId;
use crate::domain::{CMDMode, HELP_TEXT, Message, NGConfig, NGError};
use crate::inputter::{InputResult, Inputter};
use crate::loader::{Fetcher, LoadOutcome, LoadState, Loader};
use crate::table::TableView;
use crate::ui::{SCROLLBAR_WIDTH, TABLE_BORDER_WIDTH};

const RESIZE_STEP: isize = 2;

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    LOADING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// Everything the ui needs to draw one frame.
pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub nrows: usize, // Rows on the current page
    pub selected_row: usize,
    pub selected_column: usize,
    pub page: usize,
    pub page_count: usize,
    pub matches: usize,
    pub total: usize,
    pub search_term: String,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub last_status_message_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            nrows: 0,
            selected_row: 0,
            selected_column: 0,
            page: 0,
            page_count: 0,
            matches: 0,
            total: 0,
            search_term: String::new(),
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
            last_status_message_update: Instant::now(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width.saturating_sub(SCROLLBAR_WIDTH + TABLE_BORDER_WIDTH),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: NGConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    table: TableView,
    loader: Loader,
    active: DatasetId,
    stale: bool,
    cursor_row: usize,    // Row on the current page
    cursor_column: usize, // Index into the visible columns
    offset_column: usize,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    /// Build the model and start loading the configured initial dataset.
    pub fn init(
        config: &NGConfig,
        fetcher: Arc<dyn Fetcher>,
        runtime: Handle,
        ui_width: usize,
        ui_height: usize,
    ) -> Result<Self, NGError> {
        let clipboard = match Clipboard::new() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Clipboard not available: {e}");
                None
            }
        };
        let loader = Loader::new(
            fetcher,
            config.sources.clone(),
            config.fetch_timeout,
            runtime,
        );
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            table: TableView::new(config.page_size),
            loader,
            active: config.initial_dataset,
            stale: false,
            cursor_row: 0,
            cursor_column: 0,
            offset_column: 0,
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Started namegrid!".to_string(),
            last_status_message_update: Instant::now(),
        };
        model.select_dataset(config.initial_dataset);
        model.update_uidata();
        Ok(model)
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn table(&self) -> &TableView {
        &self.table
    }

    /// The dataset the label shows. Switches as soon as a dataset is
    /// selected, before its records arrive.
    pub fn active_dataset(&self) -> DatasetId {
        self.active
    }

    pub fn load_state(&self) -> &LoadState {
        self.loader.state()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), NGError> {
        let mut changed = false;
        while let Some(outcome) = self.loader.poll() {
            self.apply_outcome(outcome);
            changed = true;
        }

        if let Some(msg) = message {
            trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
            changed = true;
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveUp => self.move_selection_up(),
                    Message::MoveDown => self.move_selection_down(),
                    Message::MoveLeft => self.cursor_column = self.cursor_column.saturating_sub(1),
                    Message::MoveRight => self.cursor_column += 1,
                    Message::NextPage => self.change_page(TableView::next_page),
                    Message::PrevPage => self.change_page(TableView::prev_page),
                    Message::FirstPage => self.change_page(TableView::first_page),
                    Message::LastPage => self.change_page(TableView::last_page),
                    Message::SortColumn => self.sort_current_column(),
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::HideColumn => self.hide_current_column(),
                    Message::ShowAllColumns => self.table.show_all(),
                    Message::WidenColumn => self.resize_current_column(RESIZE_STEP),
                    Message::NarrowColumn => self.resize_current_column(-RESIZE_STEP),
                    Message::SelectDataset(id) => self.select_dataset(id),
                    Message::ToggleDataset => self.select_dataset(self.active.other()),
                    Message::Reload => self.select_dataset(self.active),
                    Message::CopyCell => self.copy_cell(),
                    Message::CopyRow => self.copy_row(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::RawKey(_) => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }

        if changed {
            self.update_uidata();
        }
        Ok(())
    }

    // -------------------- Loading ---------------------- //

    fn select_dataset(&mut self, dataset: DatasetId) {
        // The label switches right away, independent of the load result.
        self.active = dataset;
        let token = self.loader.select(dataset);
        debug!("Selected {} with {token:?}", dataset.label());
        self.status = Status::LOADING;
        self.set_status_message(format!("Loading {} ...", dataset.label()));
    }

    fn apply_outcome(&mut self, outcome: LoadOutcome) {
        let label = outcome.dataset.label();
        match outcome.result {
            Ok(records) => {
                let n = records.len();
                self.table.update_data(Arc::new(records));
                self.stale = false;
                self.cursor_row = 0;
                self.status = Status::READY;
                info!("Showing {n} records of {label}");
                self.set_status_message(format!("Loaded {n} names ({label})"));
            }
            Err(e) => {
                // Keep whatever is shown, but flag it as not matching the label.
                self.stale = self.table.total() > 0;
                self.status = if self.stale {
                    Status::READY
                } else {
                    Status::EMPTY
                };
                self.set_status_message(format!("Failed to load {label}: {e}"));
            }
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                if !self.table.search_term().is_empty() {
                    self.table.search("");
                    self.cursor_row = 0;
                    self.set_status_message("Search cleared");
                }
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        self.input.clear();
        self.input.set(self.table.search_term());
        self.last_input = self.input.get();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.last_input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        if self.last_input.canceled {
            self.cmd_mode = None;
            return;
        }
        let cmd_input = self.last_input.input.clone();
        match self.cmd_mode.take() {
            Some(CMDMode::Search) => self.search(&cmd_input),
            None => info!("Cmd mode is none!"),
        }
    }

    fn search(&mut self, term: &str) {
        let start_time = Instant::now();
        let matches = self.table.search(term);
        trace!(
            "Search for {:?} found {} rows in {}ms",
            term,
            matches,
            start_time.elapsed().as_millis()
        );
        self.cursor_row = 0;
        if term.trim().is_empty() {
            self.set_status_message("Search cleared");
        } else if matches == 0 {
            self.set_status_message("Found no matches!");
        } else {
            self.set_status_message(format!("Found {matches} results"));
        }
    }

    fn current_column(&self) -> Option<usize> {
        self.table.visible_columns().get(self.cursor_column).copied()
    }

    fn sort_current_column(&mut self) {
        let Some(column) = self.current_column() else {
            return;
        };
        let name = columns()[column].name;
        match self.table.sort_by(column) {
            Some(direction) => {
                self.cursor_row = 0;
                let dir = match direction {
                    SortDirection::Ascending => "ascending",
                    SortDirection::Descending => "descending",
                };
                self.set_status_message(format!("Sorted by {name} {dir}"));
            }
            None => self.set_status_message(format!("Column {name} is not sortable")),
        }
    }

    fn hide_current_column(&mut self) {
        let Some(column) = self.current_column() else {
            return;
        };
        if self.table.visible_columns().len() <= 1 {
            self.set_status_message("Cannot hide the last column");
            return;
        }
        self.table.toggle_visibility(column);
        self.set_status_message(format!(
            "Hid column {}, press 'a' to show all",
            columns()[column].name
        ));
    }

    fn resize_current_column(&mut self, delta: isize) {
        if let Some(column) = self.current_column() {
            self.table.resize(
                column,
                delta,
                self.uilayout.table_width,
                self.config.max_column_width,
            );
        }
    }

    fn change_page(&mut self, step: fn(&mut TableView) -> bool) {
        if step(&mut self.table) {
            self.cursor_row = 0;
        }
    }

    fn move_selection_up(&mut self) {
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
        } else if self.table.prev_page() {
            self.cursor_row = self.table.current_page().len().saturating_sub(1);
        }
    }

    fn move_selection_down(&mut self) {
        let rows = self.table.current_page().len();
        if self.cursor_row + 1 < rows {
            self.cursor_row += 1;
        } else if self.table.next_page() {
            self.cursor_row = 0;
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c
            .chars()
            .any(|c| matches!(c, ' ' | '\t' | ',' | '\n' | '\r'));
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping || needs_escaping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_cell(&mut self) {
        let cell = {
            let page = self.table.current_page();
            match (page.get(self.cursor_row), self.current_column()) {
                (Some(record), Some(column)) => record.value(column).to_string(),
                _ => return,
            }
        };
        self.set_clipboard(cell);
    }

    fn copy_row(&mut self) {
        let row = {
            let page = self.table.current_page();
            let Some(record) = page.get(self.cursor_row) else {
                return;
            };
            record
                .values()
                .iter()
                .map(|v| Self::wrap_cell_content(v))
                .collect::<Vec<String>>()
                .join(",")
        };
        self.set_clipboard(row);
    }

    fn set_clipboard(&mut self, content: String) {
        trace!("Clipboard content: {}", content);
        match self.clipboard.as_mut().map(|c| c.set_text(content)) {
            Some(Ok(_)) => self.set_status_message("Copied to clipboard"),
            Some(Err(e)) => {
                warn!("Error copying to clipboard: {:?}", e);
                self.set_status_message("Copy failed");
            }
            None => self.set_status_message("No clipboard available"),
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    // -------------------- UI data ---------------------- //

    fn title(&self) -> String {
        let label = self.active.label();
        match self.loader.state() {
            LoadState::Loading { .. } => format!("{label} (loading ...)"),
            LoadState::Failed { .. } if self.stale => format!("{label} (failed, stale data)"),
            LoadState::Failed { .. } => format!("{label} (failed)"),
            LoadState::Idle | LoadState::Loaded { .. } => label.to_string(),
        }
    }

    // Number of columns, starting with the first, that fit into `width`.
    // A column that only partially fits is included.
    fn fitting(widths: &[usize], width: usize) -> usize {
        let mut used = 0;
        for (idx, w) in widths.iter().enumerate() {
            if used + w + 1 > width {
                return if used < width { idx + 1 } else { idx.max(1) };
            }
            used += w + 1;
        }
        widths.len()
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            return reduced;
        }
        name.to_string()
    }

    fn update_uidata(&mut self) {
        let visible = self.table.visible_columns();
        self.cursor_column = std::cmp::min(self.cursor_column, visible.len().saturating_sub(1));

        let table_width = self.uilayout.table_width;
        let widths: Vec<usize> = visible
            .iter()
            .map(|&c| {
                self.table
                    .column_width(c, table_width, self.config.max_column_width)
            })
            .collect();

        // Scroll horizontally so the cursor column is on screen
        self.offset_column = std::cmp::min(self.offset_column, self.cursor_column);
        while self.offset_column < self.cursor_column
            && Self::fitting(&widths[self.offset_column..], table_width)
                <= self.cursor_column - self.offset_column
        {
            self.offset_column += 1;
        }
        let nvisible = Self::fitting(&widths[self.offset_column..], table_width);

        let page = self.table.current_page();
        self.cursor_row = std::cmp::min(self.cursor_row, page.len().saturating_sub(1));
        let sort = self.table.sort_state();

        let mut used = 0;
        let mut views = Vec::with_capacity(nvisible);
        for (&column, &width) in visible
            .iter()
            .zip(widths.iter())
            .skip(self.offset_column)
            .take(nvisible)
        {
            let width = std::cmp::min(width, table_width.saturating_sub(used));
            used += width + 1;
            let spec = &columns()[column];
            let name = match sort {
                Some((c, SortDirection::Ascending)) if c == column => format!("{} ▲", spec.name),
                Some((c, SortDirection::Descending)) if c == column => format!("{} ▼", spec.name),
                _ => spec.name.to_string(),
            };
            views.push(ColumnView {
                name: Self::get_visible_name(&name, width),
                width,
                data: page.iter().map(|r| self.table.display(r, column)).collect(),
            });
        }
        let nrows = page.len();

        self.uidata = UIData {
            name: self.title(),
            table: views,
            nrows,
            selected_row: self.cursor_row,
            selected_column: self.cursor_column - self.offset_column,
            page: self.table.page(),
            page_count: self.table.page_count(),
            matches: self.table.len(),
            total: self.table.total(),
            search_term: self.table.search_term().to_string(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: HELP_TEXT.to_string(),
            layout: self.uilayout.clone(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
            last_status_message_update: self.last_status_message_update,
        };
    }
}

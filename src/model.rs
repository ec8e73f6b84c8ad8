use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::csv_export::{format_line, write_export};
use crate::dataset::Dataset;
use crate::domain::{CMDMode, HELP_TEXT, Message, RVConfig, RVError};
use crate::frequency::FrequencyTable;
use crate::inputter::{InputResult, Inputter};
use crate::ui::{CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, SCROLLBAR_WIDTH, TABLE_HEADER_HEIGHT, TITLE_HEIGHT};
use crate::view::{FilterMode, Scope, SortDirection, TabularView};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    COLUMNS,
    HISTOGRAM,
    POPUP,
    CMDINPUT,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// Cell strings of the current page. Rebuilt when filter, sort, page or
/// visibility change, cursor movement only slices it.
#[derive(Default)]
struct PageCache {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
    summary: String,
    sort: Option<(String, SortDirection)>,
}

#[derive(Default)]
struct TableCursor {
    row: usize,
    offset_row: usize,
    column: usize,
    offset_column: usize,
    visible_columns: usize,
}

#[derive(Default)]
struct HistogramView {
    column: String,
    table: FrequencyTable,
    labels: Vec<String>,
    counts: Vec<String>,
    cursor_row: usize,
    offset_row: usize,
}

#[derive(Default)]
struct SelectorView {
    cursor_row: usize,
    offset_row: usize,
}

pub struct UIData {
    pub name: String,
    pub has_data: bool,
    pub table: Vec<ColumnView>,
    pub nrows: usize, // Total number of rows that can be scrolled through
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub summary: String,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub last_update: Instant,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            has_data: false,
            table: Vec::new(),
            nrows: 0,
            selected_row: 0,
            selected_column: 0,
            abs_selected_row: 0,
            summary: String::new(),
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            last_update: Instant::now(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub statusline_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width.saturating_sub(SCROLLBAR_WIDTH),
            table_height: ui_height
                .saturating_sub(TITLE_HEIGHT + TABLE_HEADER_HEIGHT + CMDLINE_HEIGH)
                .max(1),
            statusline_height: CMDLINE_HEIGH,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: RVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    view: Option<TabularView>,
    page: PageCache,
    cursor: TableCursor,
    histogram: HistogramView,
    selector: SelectorView,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
}

impl Model {
    pub fn init(config: &RVConfig, ui_width: usize, ui_height: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            view: None,
            page: PageCache::default(),
            cursor: TableCursor::default(),
            histogram: HistogramView::default(),
            selector: SelectorView::default(),
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: String::new(),
        };
        model.update_table_data();
        model.set_status_message(RVError::NoDatasetLoaded.to_string());
        model
    }

    pub fn load_data_file(&mut self, path: PathBuf) -> Result<(), RVError> {
        let dataset = Dataset::load(path, self.config.delimiter)?;
        self.load_dataset(dataset);
        Ok(())
    }

    pub fn load_dataset(&mut self, dataset: Dataset) {
        let nrows = dataset.rows().len();
        let ncols = dataset.headers().len();
        self.view = Some(TabularView::new(dataset));
        self.status = Status::READY;
        self.modus = Modus::TABLE;
        self.cursor = TableCursor::default();
        self.refresh_page();
        self.update_table_data();
        self.set_status_message(format!("Loaded {nrows} rows, {ncols} columns"));
    }

    pub fn view(&self) -> Option<&TabularView> {
        self.view.as_ref()
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    fn current_header(&self) -> Option<String> {
        self.page.headers.get(self.cursor.column).cloned()
    }

    fn display_value(value: &str) -> String {
        value.replace("\r\n", " ↵ ").replace('\n', " ↵ ")
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    // Re-derive the current page from the view.
    fn refresh_page(&mut self) {
        let Some(view) = &self.view else {
            self.page = PageCache::default();
            return;
        };
        let start_time = Instant::now();
        let window = view.window();

        self.page.headers = window.headers.iter().map(|h| h.to_string()).collect();
        self.page.rows = window
            .page
            .items
            .iter()
            .map(|r| window.headers.iter().map(|h| r.text(h)).collect())
            .collect();
        self.page.widths = window
            .headers
            .iter()
            .enumerate()
            .map(|(cidx, h)| {
                self.page
                    .rows
                    .iter()
                    .map(|r| r[cidx].chars().count())
                    .chain(std::iter::once(h.chars().count() + 2))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        self.page.summary = format!(
            "{} | page {}/{}",
            window.summary(),
            window.page.page,
            window.page.total_pages
        );
        self.page.sort = view
            .state()
            .sort_column()
            .map(|c| (c.to_string(), view.state().sort_direction()));

        let nrows = self.page.rows.len();
        self.cursor.row = std::cmp::min(self.cursor.row, nrows.saturating_sub(1));
        self.cursor.offset_row = std::cmp::min(self.cursor.offset_row, self.cursor.row);
        self.cursor.column = std::cmp::min(self.cursor.column, self.page.headers.len().saturating_sub(1));
        self.cursor.offset_column = std::cmp::min(self.cursor.offset_column, self.cursor.column);

        debug!(
            "Refreshed page with {} rows in {}ms",
            nrows,
            start_time.elapsed().as_millis()
        );
    }

    fn title(&self) -> String {
        let Some(view) = &self.view else {
            return String::new();
        };
        let meta = view.dataset().meta();
        let name = if meta.category.is_empty() {
            meta.file_name.clone()
        } else if meta.period.is_empty() {
            meta.category.clone()
        } else {
            format!("{} / {}", meta.category, meta.period)
        };
        let state = view.state();
        if state.is_filtered() {
            let op = match state.filter_mode() {
                FilterMode::Contains => "~",
                FilterMode::Exact => "=",
            };
            format!(
                "F[{}] {} {} \"{}\"",
                name,
                state.filter_column().unwrap_or_default(),
                op,
                state.filter_value().unwrap_or_default()
            )
        } else {
            name
        }
    }

    fn update_table_data(&mut self) {
        let rbegin = self.cursor.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, self.page.rows.len());
        let rbegin = std::cmp::min(rbegin, rend);

        let mut views = Vec::new();
        let mut visible_width = 0;
        for cidx in self.cursor.offset_column..self.page.headers.len() {
            let header = &self.page.headers[cidx];
            let marker = match &self.page.sort {
                Some((c, SortDirection::Asc)) if c == header => " ▲",
                Some((c, SortDirection::Desc)) if c == header => " ▼",
                _ => "",
            };
            let mut width = std::cmp::min(
                self.page.widths[cidx] + COLUMN_WIDTH_MARGIN,
                self.config.max_column_width,
            );
            if visible_width + width + 1 > self.uilayout.table_width {
                // Add the last partial visible column
                if visible_width + 1 < self.uilayout.table_width {
                    width = self.uilayout.table_width - visible_width - 1;
                } else {
                    break;
                }
            }
            let data = self.page.rows[rbegin..rend]
                .iter()
                .map(|r| Self::display_value(&r[cidx]))
                .collect();
            views.push(ColumnView {
                name: Self::get_visible_name(&format!("{header}{marker}"), width),
                width,
                data,
            });
            visible_width += width + 1;
            if visible_width >= self.uilayout.table_width {
                break;
            }
        }
        self.cursor.visible_columns = views.len();

        self.uidata = UIData {
            name: self.title(),
            has_data: self.view.is_some(),
            table: views,
            nrows: self.page.rows.len(),
            selected_row: self.cursor.row.saturating_sub(self.cursor.offset_row),
            selected_column: self.cursor.column.saturating_sub(self.cursor.offset_column),
            abs_selected_row: self.cursor.row,
            summary: self.page.summary.clone(),
            show_popup: false,
            popup_message: String::new(),
            layout: self.uilayout.clone(),
            last_update: Instant::now(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
        };
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.redraw();
    }

    fn redraw(&mut self) {
        let modus = if self.modus == Modus::POPUP || self.modus == Modus::CMDINPUT {
            self.previous_modus
        } else {
            self.modus
        };
        match modus {
            Modus::HISTOGRAM => self.update_histogram_view(),
            Modus::COLUMNS => self.update_selector_view(),
            _ => self.update_table_data(),
        }
        if self.modus == Modus::POPUP {
            self.uidata.popup_message = HELP_TEXT.to_string();
            self.uidata.show_popup = true;
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), RVError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection_down(1),
                    Message::MoveUp => self.move_table_selection_up(1),
                    Message::MoveLeft => self.move_table_selection_left(),
                    Message::MoveRight => self.move_table_selection_right(),
                    Message::NextPage => self.change_page(TabularView::next_page),
                    Message::PrevPage => self.change_page(TabularView::prev_page),
                    Message::FirstPage => self.change_page(|v| v.set_page(1)),
                    Message::LastPage => self.change_page(TabularView::last_page),
                    Message::SortColumn => self.sort_current_column(),
                    Message::ClearSort => self.clear_sort(),
                    Message::Filter => self.enter_cmd_mode(CMDMode::FilterContains),
                    Message::FilterExact => self.enter_cmd_mode(CMDMode::FilterExact),
                    Message::ClearFilter => self.clear_filter(),
                    Message::ColumnSelector => self.build_selector_view(),
                    Message::Histogram => self.build_histogram_view(),
                    Message::Export => self.enter_cmd_mode(CMDMode::ExportPath),
                    Message::CopyCell => self.copy_table_cell(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Help => self.show_help(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::COLUMNS => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_selector(true),
                    Message::MoveUp => self.move_selector(false),
                    Message::ToggleColumn | Message::Enter => self.toggle_selected_column(),
                    Message::ToggleAllColumns => self.toggle_all_columns(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::HISTOGRAM => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_histogram_selection(true),
                    Message::MoveUp => self.move_histogram_selection(false),
                    Message::Enter => self.enter(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Enter => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) {
        if self.modus != Modus::HISTOGRAM {
            return;
        }
        let hist = &self.histogram;
        let Some(value) = hist.labels.get(hist.offset_row + hist.cursor_row).cloned() else {
            return;
        };
        let column = hist.column.clone();
        if let Some(view) = self.view.as_mut() {
            view.set_filter(Some(column.as_str()), Some(value.as_str()), FilterMode::Exact);
        }
        self.modus = Modus::TABLE;
        self.previous_modus = Modus::HISTOGRAM;
        self.reset_rows_and_refresh();
        self.report_filter_result();
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE | Modus::CMDINPUT => {}
            Modus::COLUMNS | Modus::HISTOGRAM => {
                self.previous_modus = self.modus;
                self.modus = Modus::TABLE;
                self.refresh_page();
                self.update_table_data();
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
                self.uidata.last_update = Instant::now();
            }
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
        self.uidata.last_update = Instant::now();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.uidata.cmdinput = self.last_input.clone();
            self.uidata.cmd_mode = self.cmd_mode;
            self.uidata.active_cmdinput = self.active_cmdinput;
            self.uidata.last_update = Instant::now();
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        let Some(view) = &self.view else {
            self.set_status_message(RVError::NoDatasetLoaded.to_string());
            return;
        };
        let column = self.current_header();
        let prefill = match mode {
            CMDMode::ExportPath => {
                if !view.can_export() {
                    self.set_status_message("Nothing to export: no rows or no visible columns");
                    return;
                }
                self.config
                    .export_dir
                    .join(view.export_file_name())
                    .to_string_lossy()
                    .to_string()
            }
            CMDMode::FilterContains | CMDMode::FilterExact => {
                if column.is_none() {
                    self.set_status_message("No column selected");
                    return;
                }
                let state = view.state();
                if state.filter_column() == column.as_deref() {
                    state.filter_value().unwrap_or_default().to_string()
                } else {
                    String::new()
                }
            }
        };

        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.input.set(&prefill);
        self.last_input = self.input.get();

        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_cmdinput = self.active_cmdinput;
        self.uidata.cmd_mode = self.cmd_mode;
        self.uidata.last_update = Instant::now();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        let mode = self.cmd_mode.take();

        if self.last_input.canceled {
            self.update_table_data();
            return;
        }

        let cmd_input = self.last_input.input.clone();
        match mode {
            Some(CMDMode::FilterContains) => self.filter_current_column(&cmd_input, FilterMode::Contains),
            Some(CMDMode::FilterExact) => self.filter_current_column(&cmd_input, FilterMode::Exact),
            Some(CMDMode::ExportPath) => self.export(&cmd_input),
            None => info!("Cmd mode is none!"),
        }
        self.update_table_data();
    }

    fn reset_rows_and_refresh(&mut self) {
        self.cursor.row = 0;
        self.cursor.offset_row = 0;
        self.refresh_page();
        self.update_table_data();
    }

    fn report_filter_result(&mut self) {
        if let Some(view) = &self.view {
            let matched = view.filtered_rows().len();
            let message = if matched == 0 {
                "Filter matched no rows".to_string()
            } else {
                format!("Filter matched {matched} rows")
            };
            self.set_status_message(message);
        }
    }

    fn filter_current_column(&mut self, term: &str, mode: FilterMode) {
        let Some(column) = self.current_header() else {
            return;
        };
        let start_time = Instant::now();
        if let Some(view) = self.view.as_mut() {
            view.set_filter(Some(column.as_str()), Some(term), mode);
        }
        self.reset_rows_and_refresh();
        debug!(
            "Filter {column:?} {mode:?} {term:?} took {}ms",
            start_time.elapsed().as_millis()
        );
        self.report_filter_result();
    }

    fn clear_filter(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.clear_filter();
            self.reset_rows_and_refresh();
            self.set_status_message("Filter cleared");
        }
    }

    fn sort_current_column(&mut self) {
        let Some(column) = self.current_header() else {
            return;
        };
        let start_time = Instant::now();
        if let Some(view) = self.view.as_mut() {
            view.sort_by_header(&column);
        }
        self.reset_rows_and_refresh();
        debug!("Sorting by {column:?} took {}ms", start_time.elapsed().as_millis());
    }

    fn clear_sort(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.set_sort(None, SortDirection::Asc);
            self.reset_rows_and_refresh();
        }
    }

    fn change_page(&mut self, step: impl FnOnce(&mut TabularView)) {
        if let Some(view) = self.view.as_mut() {
            step(view);
            self.reset_rows_and_refresh();
        }
    }

    fn export(&mut self, target: &str) {
        let Some(view) = &self.view else {
            return;
        };
        if !view.can_export() {
            self.set_status_message("Nothing to export: no rows or no visible columns");
            return;
        }
        let path = PathBuf::from(shellexpand::tilde(target.trim()).into_owned());
        let rows = view.filtered_rows().len();
        let message = match write_export(&path, &view.export_csv()) {
            Ok(()) => format!("Exported {rows} rows to {}", path.display()),
            Err(e) => {
                error!("Export to {} failed: {e}", path.display());
                format!("Export failed: {e}")
            }
        };
        self.set_status_message(message);
    }

    fn set_clipboard(&mut self, text: String) -> Result<(), RVError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| RVError::ClipboardUnavailable(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard
                .set_text(text)
                .map_err(|e| RVError::ClipboardUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn copy(&mut self, text: Option<String>, what: &str) {
        let Some(text) = text else {
            return;
        };
        trace!("Copy content: {}", text);
        match self.set_clipboard(text) {
            Ok(()) => self.set_status_message(format!("Copied {what} to clipboard")),
            Err(e) => {
                warn!("Error copying to clipboard: {e}");
                self.set_status_message(e.to_string());
            }
        }
    }

    fn copy_table_cell(&mut self) {
        let cell = self
            .page
            .rows
            .get(self.cursor.row)
            .and_then(|r| r.get(self.cursor.column))
            .cloned();
        self.copy(cell, "cell");
    }

    fn copy_table_row(&mut self) {
        let delimiter = match &self.view {
            Some(view) => view.dataset().delimiter(),
            None => return,
        };
        let line = self
            .page
            .rows
            .get(self.cursor.row)
            .map(|r| format_line(r, delimiter));
        self.copy(line, "row");
    }

    fn move_table_selection_up(&mut self, size: usize) {
        let cursor = &mut self.cursor;
        cursor.row = cursor.row.saturating_sub(size);
        if cursor.row < cursor.offset_row {
            cursor.offset_row = cursor.row;
        }
        self.update_table_data();
    }

    fn move_table_selection_down(&mut self, size: usize) {
        let nrows = self.page.rows.len();
        let height = self.uilayout.table_height;
        let cursor = &mut self.cursor;
        if cursor.row + 1 < nrows {
            cursor.row = std::cmp::min(cursor.row + size, nrows - 1);
            if cursor.row >= cursor.offset_row + height {
                cursor.offset_row = cursor.row + 1 - height;
            }
            self.update_table_data();
        }
    }

    fn move_table_selection_left(&mut self) {
        let cursor = &mut self.cursor;
        cursor.column = cursor.column.saturating_sub(1);
        if cursor.column < cursor.offset_column {
            cursor.offset_column = cursor.column;
        }
        self.update_table_data();
    }

    fn move_table_selection_right(&mut self) {
        let ncols = self.page.headers.len();
        let cursor = &mut self.cursor;
        if cursor.column + 1 < ncols {
            cursor.column += 1;
            // Shift the table until the cursor column is on screen
            if cursor.column >= cursor.offset_column + cursor.visible_columns {
                cursor.offset_column += 1;
            }
            self.update_table_data();
            while self.cursor.column >= self.cursor.offset_column + self.cursor.visible_columns
                && self.cursor.offset_column < self.cursor.column
            {
                self.cursor.offset_column += 1;
                self.update_table_data();
            }
        }
    }

    // ------------------------- Frequency view --------------------------- //

    fn build_histogram_view(&mut self) {
        let Some(column) = self.current_header() else {
            self.set_status_message("No column selected");
            return;
        };
        let Some(view) = &self.view else {
            return;
        };
        let table = view.frequencies(&column, Some(self.config.chart_top_n), Scope::Filtered);
        if table.is_empty() {
            self.set_status_message(format!("Column \"{column}\" has no values"));
            return;
        }
        trace!("Frequency table for {column}: {} of {} values", table.len(), table.distinct_total());

        let hist = &mut self.histogram;
        hist.labels = table.entries().iter().map(|e| e.label.clone()).collect();
        hist.counts = table
            .entries()
            .iter()
            .enumerate()
            .map(|(idx, e)| format!("{:>5.1}% {}", table.share(idx), e.count))
            .collect();
        hist.column = column;
        hist.table = table;
        hist.cursor_row = 0;
        hist.offset_row = 0;

        self.previous_modus = self.modus;
        self.modus = Modus::HISTOGRAM;
        self.update_histogram_view();
    }

    fn update_histogram_view(&mut self) {
        let hist = &self.histogram;
        let rbegin = hist.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, hist.labels.len());

        let count_width = hist.counts.iter().map(|c| c.chars().count()).max().unwrap_or(0).max(6);
        let value_width = self.uilayout.table_width.saturating_sub(count_width + 1);
        let table = vec![
            ColumnView {
                name: "Counts".to_string(),
                width: count_width,
                data: hist.counts[rbegin..rend].to_vec(),
            },
            ColumnView {
                name: "Values".to_string(),
                width: value_width,
                data: hist.labels[rbegin..rend].iter().map(|l| Self::display_value(l)).collect(),
            },
        ];

        let summary = if hist.table.is_truncated() {
            format!(
                "{} of {} values shown ({} rows counted)",
                hist.table.len(),
                hist.table.distinct_total(),
                hist.table.counted()
            )
        } else {
            format!("{} values ({} rows counted)", hist.table.len(), hist.table.counted())
        };

        self.uidata.name = format!("H[{}]", hist.column);
        self.uidata.table = table;
        self.uidata.nrows = hist.labels.len();
        self.uidata.selected_row = hist.cursor_row;
        self.uidata.selected_column = 1;
        self.uidata.abs_selected_row = hist.offset_row + hist.cursor_row;
        self.uidata.summary = summary;
        self.uidata.layout = self.uilayout.clone();
        self.uidata.last_update = Instant::now();
    }

    fn move_histogram_selection(&mut self, down: bool) {
        let len = self.histogram.labels.len();
        let height = self.uilayout.table_height;
        let hist = &mut self.histogram;
        let (row, offset) = Self::step_list(hist.offset_row + hist.cursor_row, hist.offset_row, len, height, down);
        hist.offset_row = offset;
        hist.cursor_row = row - offset;
        self.update_histogram_view();
    }

    // Returns the new absolute row and offset of a scrolled list.
    fn step_list(row: usize, offset: usize, len: usize, height: usize, down: bool) -> (usize, usize) {
        let row = if down {
            std::cmp::min(row + 1, len.saturating_sub(1))
        } else {
            row.saturating_sub(1)
        };
        let offset = if row < offset {
            row
        } else if row >= offset + height {
            row + 1 - height
        } else {
            offset
        };
        (row, offset)
    }

    // -------------------------- Column selector ------------------------- //

    fn build_selector_view(&mut self) {
        if self.view.is_none() {
            return;
        }
        self.selector = SelectorView::default();
        self.previous_modus = self.modus;
        self.modus = Modus::COLUMNS;
        self.update_selector_view();
    }

    fn update_selector_view(&mut self) {
        let Some(view) = &self.view else {
            return;
        };
        let headers = view.dataset().headers();
        let sel = &self.selector;
        let rbegin = sel.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, headers.len());

        let marks = headers[rbegin..rend]
            .iter()
            .map(|h| String::from(if view.is_visible(h) { "[x]" } else { "[ ]" }))
            .collect();
        let table = vec![
            ColumnView {
                name: "Show".to_string(),
                width: 4,
                data: marks,
            },
            ColumnView {
                name: "Column".to_string(),
                width: self.uilayout.table_width.saturating_sub(5),
                data: headers[rbegin..rend].to_vec(),
            },
        ];

        self.uidata.name = "Columns".to_string();
        self.uidata.table = table;
        self.uidata.nrows = headers.len();
        self.uidata.selected_row = sel.cursor_row;
        self.uidata.selected_column = 1;
        self.uidata.abs_selected_row = sel.offset_row + sel.cursor_row;
        self.uidata.summary = format!(
            "{} of {} columns visible (space: toggle, a: all)",
            view.visible_headers().len(),
            headers.len()
        );
        self.uidata.layout = self.uilayout.clone();
        self.uidata.last_update = Instant::now();
    }

    fn move_selector(&mut self, down: bool) {
        let len = self.view.as_ref().map(|v| v.dataset().headers().len()).unwrap_or(0);
        let height = self.uilayout.table_height;
        let sel = &mut self.selector;
        let (row, offset) = Self::step_list(sel.offset_row + sel.cursor_row, sel.offset_row, len, height, down);
        sel.offset_row = offset;
        sel.cursor_row = row - offset;
        self.update_selector_view();
    }

    fn toggle_selected_column(&mut self) {
        let idx = self.selector.offset_row + self.selector.cursor_row;
        if let Some(view) = self.view.as_mut() {
            if let Some(column) = view.dataset().headers().get(idx).cloned() {
                view.toggle_column(&column);
            }
        }
        self.update_selector_view();
    }

    fn toggle_all_columns(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.toggle_all_columns();
        }
        self.update_selector_view();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Record, ReportMeta};
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};

    fn model_with(rows: usize) -> Model {
        let headers = vec!["id".to_string(), "zona".to_string(), "tipo".to_string()];
        let data = (0..rows)
            .map(|i| {
                Record::new()
                    .with("id", i as i64)
                    .with("zona", if i % 3 == 0 { "Norte" } else { "Sur" })
                    .with("tipo", format!("t{}", i % 5))
            })
            .collect();
        let ds = Dataset::new(headers, data)
            .with_meta(ReportMeta::default().category("Incidentes").period("2024"));
        let mut model = Model::init(&RVConfig::default(), 80, 24);
        model.load_dataset(ds);
        model
    }

    fn send(model: &mut Model, msg: Message) {
        model.update(Some(msg)).unwrap();
    }

    fn type_line(model: &mut Model, text: &str) {
        for c in text.chars() {
            send(model, Message::RawKey(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
        send(model, Message::RawKey(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn empty_model_reports_no_dataset() {
        let mut model = Model::init(&RVConfig::default(), 80, 24);
        assert_eq!(model.status, Status::EMPTY);
        assert_eq!(model.get_uidata().status_message, "No dataset loaded");
        send(&mut model, Message::NextPage);
        send(&mut model, Message::Filter);
        assert!(!model.raw_keyevents());
        send(&mut model, Message::Quit);
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn first_page_is_shown() {
        let model = model_with(250);
        let ui = model.get_uidata();
        assert_eq!(ui.nrows, 100);
        assert_eq!(ui.table.len(), 3);
        assert_eq!(ui.table[0].data.len(), model.uilayout.table_height);
        assert_eq!(ui.summary, "Showing 100 of 250 records (Total: 250) | page 1/3");
        assert_eq!(ui.name, "Incidentes / 2024");
    }

    #[test]
    fn paging_moves_through_the_rows() {
        let mut model = model_with(250);
        send(&mut model, Message::LastPage);
        assert_eq!(model.get_uidata().nrows, 50);
        assert_eq!(model.get_uidata().table[0].data[0], "200");
        send(&mut model, Message::NextPage);
        assert_eq!(model.view().unwrap().state().page(), 3);
        send(&mut model, Message::PrevPage);
        assert_eq!(model.get_uidata().table[0].data[0], "100");
        send(&mut model, Message::FirstPage);
        assert_eq!(model.get_uidata().table[0].data[0], "0");
    }

    #[test]
    fn filter_through_command_line() {
        let mut model = model_with(30);
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::Filter);
        assert!(model.raw_keyevents());
        type_line(&mut model, "nor");
        assert!(!model.raw_keyevents());

        let view = model.view().unwrap();
        assert_eq!(view.state().filter_column(), Some("zona"));
        assert_eq!(view.filtered_rows().len(), 10);
        assert_eq!(model.get_uidata().status_message, "Filter matched 10 rows");
        assert!(model.get_uidata().name.starts_with("F[Incidentes / 2024] zona ~"));

        send(&mut model, Message::ClearFilter);
        assert_eq!(model.view().unwrap().filtered_rows().len(), 30);
    }

    #[test]
    fn escape_cancels_the_command_line() {
        let mut model = model_with(10);
        send(&mut model, Message::Filter);
        send(&mut model, Message::RawKey(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE)));
        send(&mut model, Message::RawKey(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(!model.raw_keyevents());
        assert!(!model.view().unwrap().state().is_filtered());
    }

    #[test]
    fn sorting_marks_the_header_and_toggles() {
        let mut model = model_with(12);
        send(&mut model, Message::SortColumn);
        assert_eq!(model.get_uidata().table[0].name, "id ▲");
        send(&mut model, Message::SortColumn);
        assert_eq!(model.get_uidata().table[0].name, "id ▼");
        assert_eq!(model.get_uidata().table[0].data[0], "11");
        send(&mut model, Message::ClearSort);
        assert_eq!(model.get_uidata().table[0].data[0], "0");
    }

    #[test]
    fn histogram_enter_filters_by_value() {
        let mut model = model_with(30);
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::Histogram);
        let ui = model.get_uidata();
        assert_eq!(ui.name, "H[zona]");
        assert_eq!(ui.table[1].data, ["Sur", "Norte"]);
        assert_eq!(ui.table[0].data[0], " 66.7% 20");
        assert_eq!(ui.summary, "2 values (30 rows counted)");

        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter);
        let view = model.view().unwrap();
        assert_eq!(view.state().filter_value(), Some("Norte"));
        assert_eq!(view.filtered_rows().len(), 10);
    }

    #[test]
    fn histogram_reports_truncation() {
        let mut model = model_with(30);
        let config = RVConfig::default().chart_top_n(3);
        model.config = config;
        send(&mut model, Message::Histogram);
        assert_eq!(model.get_uidata().summary, "3 of 30 values shown (30 rows counted)");
    }

    #[test]
    fn column_selector_toggles_visibility() {
        let mut model = model_with(5);
        send(&mut model, Message::ColumnSelector);
        send(&mut model, Message::ToggleColumn);
        assert_eq!(model.get_uidata().table[0].data[0], "[ ]");
        send(&mut model, Message::Exit);
        assert_eq!(model.get_uidata().table.len(), 2);
        assert_eq!(model.get_uidata().table[0].name, "zona");

        send(&mut model, Message::ColumnSelector);
        send(&mut model, Message::ToggleAllColumns);
        send(&mut model, Message::Exit);
        assert_eq!(model.get_uidata().table.len(), 3);
    }

    #[test]
    fn export_writes_the_filtered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = model_with(9);
        model.config = RVConfig::default().export_dir(dir.path().to_path_buf());
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::FilterExact);
        type_line(&mut model, "Norte");

        send(&mut model, Message::Export);
        let expected = dir.path().join("Incidentes_2024_filtered.csv");
        assert_eq!(model.get_uidata().cmdinput.input, expected.to_string_lossy());
        send(&mut model, Message::RawKey(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));

        let content = std::fs::read_to_string(&expected).unwrap();
        assert_eq!(
            content,
            "\u{feff}id,zona,tipo\n0,Norte,t0\n3,Norte,t3\n6,Norte,t1"
        );
        assert!(model.get_uidata().status_message.starts_with("Exported 3 rows"));
    }

    #[test]
    fn export_is_refused_without_visible_columns() {
        let mut model = model_with(3);
        send(&mut model, Message::ColumnSelector);
        send(&mut model, Message::ToggleAllColumns);
        send(&mut model, Message::Exit);
        send(&mut model, Message::Export);
        assert!(!model.raw_keyevents());
        assert!(model.get_uidata().status_message.starts_with("Nothing to export"));
    }

    #[test]
    fn cursor_scrolls_within_the_page() {
        let mut model = model_with(100);
        for _ in 0..30 {
            send(&mut model, Message::MoveDown);
        }
        let ui = model.get_uidata();
        assert_eq!(ui.abs_selected_row, 30);
        assert_eq!(ui.selected_row, model.uilayout.table_height - 1);
        assert_eq!(ui.table[0].data.last().unwrap(), "30");
    }

    #[test]
    fn help_popup_opens_and_closes() {
        let mut model = model_with(3);
        send(&mut model, Message::Help);
        assert!(model.get_uidata().show_popup);
        send(&mut model, Message::Exit);
        assert!(!model.get_uidata().show_popup);
        send(&mut model, Message::MoveDown);
        assert_eq!(model.get_uidata().abs_selected_row, 1);
    }

    #[test]
    fn layout_never_underflows() {
        let layout = UILayout::from_values(0, 0);
        assert_eq!(layout.table_width, 0);
        assert_eq!(layout.table_height, 1);
    }
}

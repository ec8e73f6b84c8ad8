use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RVError {
    IoError(Error),
    PolarsError(PolarsError),
    JsonError(serde_json::Error),
    LoadingFailed(String),
    LoggingFailed(String),
    ClipboardUnavailable(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    NoDatasetLoaded,
}

impl fmt::Display for RVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RVError::IoError(e) => write!(f, "I/O error: {e}"),
            RVError::PolarsError(e) => write!(f, "Could not read data: {e}"),
            RVError::JsonError(e) => write!(f, "Invalid report document: {e}"),
            RVError::LoadingFailed(msg) => write!(f, "Loading failed: {msg}"),
            RVError::LoggingFailed(msg) => write!(f, "Could not set up logging: {msg}"),
            RVError::ClipboardUnavailable(msg) => write!(f, "Clipboard unavailable: {msg}"),
            RVError::FileNotFound => write!(f, "File not found"),
            RVError::PermissionDenied => write!(f, "Permission denied"),
            RVError::UnknownFileType => write!(f, "Unknown file type (expected csv, tsv, txt or json)"),
            RVError::NoDatasetLoaded => write!(f, "No dataset loaded"),
        }
    }
}

impl std::error::Error for RVError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RVError::IoError(e) => Some(e),
            RVError::PolarsError(e) => Some(e),
            RVError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for RVError {
    fn from(err: Error) -> Self {
        RVError::IoError(err)
    }
}

impl From<PolarsError> for RVError {
    fn from(err: PolarsError) -> Self {
        RVError::PolarsError(err)
    }
}

impl From<serde_json::Error> for RVError {
    fn from(err: serde_json::Error) -> Self {
        RVError::JsonError(err)
    }
}

#[derive(Debug, Clone, Setters)]
pub struct RVConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    /// Number of values shown in the frequency view.
    pub chart_top_n: usize,
    pub export_dir: PathBuf,
    #[setters(strip_option)]
    pub delimiter: Option<char>,
}

impl Default for RVConfig {
    fn default() -> Self {
        RVConfig {
            event_poll_time: 100,
            max_column_width: 40,
            chart_top_n: 20,
            export_dir: PathBuf::from("."),
            delimiter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    FilterContains,
    FilterExact,
    ExportPath,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::FilterContains => "Filter (contains): ",
            CMDMode::FilterExact => "Filter (equals): ",
            CMDMode::ExportPath => "Export to: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    SortColumn,
    ClearSort,
    Filter,
    FilterExact,
    ClearFilter,
    ColumnSelector,
    ToggleColumn,
    ToggleAllColumns,
    Histogram,
    Export,
    CopyCell,
    CopyRow,
    Help,
    Enter,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Navigation
  arrows        move cursor
  n / PgDown    next page
  p / PgUp      previous page
  g / G         first / last page

Table
  s             sort by column (again to reverse)
  S             clear sort
  /             filter column (contains, case-insensitive)
  =             filter column (exact value)
  c             clear filter
  v             choose visible columns (space: toggle, a: all)
  h             value counts of column (enter: filter by value)
  e             export filtered rows to CSV
  y / Y         copy cell / row

  ?             help
  esc           back
  q             quit";

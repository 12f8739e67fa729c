use std::fmt;
use std::io::Error;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

use crate::dataset::{DatasetId, Sources};

pub const HELP_TEXT: &str = r#"
namegrid - baby names viewer

  q            quit
  ?            show this help
  Esc          close popup / clear search

  Arrows       move the cursor
  n, PageDown  next page
  p, PageUp    previous page
  Home / End   first / last page

  s            sort current column (again to reverse)
  /            search visible columns
  h            hide current column
  a            show all columns
  + / -        widen / narrow current column

  m            load boys
  f            load girls
  g            toggle boys / girls
  r            reload current dataset

  c            copy cell
  C            copy row as csv
"#;

#[derive(Debug, Clone, Setters)]
pub struct NGConfig {
    pub event_poll_time: u64,
    pub page_size: usize,
    pub max_column_width: usize,
    pub fetch_timeout: Duration,
    pub initial_dataset: DatasetId,
    pub sources: Sources,
}

impl Default for NGConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            page_size: 100,
            max_column_width: 40,
            fetch_timeout: Duration::from_secs(30),
            initial_dataset: DatasetId::Boys,
            sources: Sources::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
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
    Search,
    HideColumn,
    ShowAllColumns,
    WidenColumn,
    NarrowColumn,
    SelectDataset(DatasetId),
    ToggleDataset,
    Reload,
    CopyCell,
    CopyRow,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

#[derive(Debug)]
pub enum NGError {
    IoError(Error),
    PolarsError(PolarsError),
    Retrieval {
        dataset: DatasetId,
        reason: String,
    },
    Timeout {
        dataset: DatasetId,
        after: Duration,
    },
    Parse {
        row: Option<usize>,
        column: Option<String>,
        reason: String,
    },
    UnknownDataset(String),
    TaskFailed(String),
}

impl NGError {
    pub fn parse(reason: impl Into<String>) -> Self {
        NGError::Parse {
            row: None,
            column: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NGError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NGError::IoError(e) => write!(f, "io error: {e}"),
            NGError::PolarsError(e) => write!(f, "csv error: {e}"),
            NGError::Retrieval { dataset, reason } => {
                write!(f, "could not retrieve {}: {reason}", dataset.label())
            }
            NGError::Timeout { dataset, after } => {
                write!(f, "loading {} timed out after {}s", dataset.label(), after.as_secs())
            }
            NGError::Parse {
                row,
                column,
                reason,
            } => {
                write!(f, "malformed csv")?;
                if let Some(row) = row {
                    write!(f, " at row {row}")?;
                }
                if let Some(column) = column {
                    write!(f, " in column \"{column}\"")?;
                }
                write!(f, ": {reason}")
            }
            NGError::UnknownDataset(s) => write!(f, "unknown dataset \"{s}\""),
            NGError::TaskFailed(s) => write!(f, "load task failed: {s}"),
        }
    }
}

impl std::error::Error for NGError {}

impl From<Error> for NGError {
    fn from(err: Error) -> Self {
        NGError::IoError(err)
    }
}

impl From<PolarsError> for NGError {
    fn from(err: PolarsError) -> Self {
        NGError::PolarsError(err)
    }
}

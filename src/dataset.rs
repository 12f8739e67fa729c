use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::columns::{self, columns};
use crate::domain::NGError;

pub const BOYS_URL: &str = "https://raw.githubusercontent.com/dxdc/babynames/main/boys.csv";
pub const GIRLS_URL: &str = "https://raw.githubusercontent.com/dxdc/babynames/main/girls.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetId {
    Boys,
    Girls,
}

impl DatasetId {
    /// Category token as used in the source data (`M` / `F`).
    pub fn token(self) -> &'static str {
        match self {
            DatasetId::Boys => "M",
            DatasetId::Girls => "F",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DatasetId::Boys => "Boys",
            DatasetId::Girls => "Girls",
        }
    }

    pub fn other(self) -> Self {
        match self {
            DatasetId::Boys => DatasetId::Girls,
            DatasetId::Girls => DatasetId::Boys,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DatasetId {
    type Err = NGError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "boy" | "boys" => Ok(DatasetId::Boys),
            "f" | "girl" | "girls" => Ok(DatasetId::Girls),
            _ => Err(NGError::UnknownDataset(s.to_string())),
        }
    }
}

/// Source locator for every dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Sources {
    urls: BTreeMap<DatasetId, String>,
}

impl Default for Sources {
    fn default() -> Self {
        Sources {
            urls: BTreeMap::from([
                (DatasetId::Boys, BOYS_URL.to_string()),
                (DatasetId::Girls, GIRLS_URL.to_string()),
            ]),
        }
    }
}

impl Sources {
    pub fn with(mut self, id: DatasetId, url: impl Into<String>) -> Self {
        self.urls.insert(id, url.into());
        self
    }

    pub fn url(&self, id: DatasetId) -> &str {
        self.urls.get(&id).map(String::as_str).unwrap_or_default()
    }
}

/// One row of a dataset. Values are stored in registry column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<String>,
}

impl Record {
    pub fn new(values: Vec<String>) -> Result<Self, NGError> {
        if values.len() != columns().len() {
            return Err(NGError::parse(format!(
                "record has {} values, expected {}",
                values.len(),
                columns().len()
            )));
        }
        Ok(Record { values })
    }

    /// Builds a record from `(column id, value)` pairs, unknown ids are ignored and
    /// missing ones are empty.
    #[cfg(test)]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut values = vec![String::new(); columns().len()];
        for (id, value) in pairs {
            if let Some(idx) = columns::index_of(id) {
                values[idx] = value.to_string();
            }
        }
        Record { values }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        columns::index_of(id).map(|idx| self.values[idx].as_str())
    }

    pub fn value(&self, idx: usize) -> &str {
        self.values.get(idx).map(String::as_str).unwrap_or_default()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Column ids present in this record, in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> {
        columns().iter().map(|c| c.id)
    }
}

/// Parse the raw bytes of a dataset csv into records.
///
/// The header row is consumed as schema and must name every registry column.
/// Columns not in the registry are dropped. Empty lines are skipped, a row
/// with more or fewer fields than the header rejects the whole load.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Record>, NGError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(NGError::parse("empty input"));
    }
    let start_time = Instant::now();
    let cleaned = normalize_rows(bytes)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(cleaned))
        .finish()
        .map_err(|e| NGError::parse(e.to_string()))?;

    let header: Vec<String> = df
        .get_columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    debug!("Csv header: {:?}", header);

    if let Some(missing) = columns()
        .iter()
        .find(|c| !header.iter().any(|h| h == c.id))
    {
        return Err(NGError::Parse {
            row: Some(1),
            column: Some(missing.id.to_string()),
            reason: "missing from header".into(),
        });
    }
    let extra: Vec<&String> = header
        .iter()
        .filter(|h| columns::index_of(h).is_none())
        .collect();
    if !extra.is_empty() {
        warn!("Ignoring unknown csv columns {:?}", extra);
    }

    // Each column is converted in its own thread, then the columns are
    // transposed into records.
    let data: Result<Vec<Vec<String>>, NGError> = columns()
        .par_iter()
        .map(|c| load_column(&df, c.id))
        .collect();
    let data = data?;

    let nrows = df.height();
    let records = (0..nrows)
        .map(|ridx| Record::new(data.iter().map(|col| col[ridx].clone()).collect()))
        .collect::<Result<Vec<Record>, NGError>>()?;

    info!(
        "Parsed {} records in {}ms",
        records.len(),
        start_time.elapsed().as_millis()
    );
    Ok(records)
}

/// Drop blank lines and check that every data row is as wide as the header.
///
/// Returns the remaining rows re-encoded as csv. Row numbers in errors are
/// line numbers of the input, the header being line 1.
fn normalize_rows(bytes: &[u8]) -> Result<Vec<u8>, NGError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut writer = csv::Writer::from_writer(Vec::with_capacity(bytes.len()));

    let mut header: Option<csv::ByteRecord> = None;
    let mut skipped = 0;
    for row in reader.byte_records() {
        let row = row.map_err(|e| NGError::parse(e.to_string()))?;
        if row.len() == 1 && row[0].trim_ascii().is_empty() {
            skipped += 1;
            continue;
        }
        match &header {
            None => header = Some(row.clone()),
            Some(h) if h.len() != row.len() => {
                return Err(NGError::Parse {
                    row: row.position().map(|p| line_at(bytes, p.byte() as usize)),
                    column: h
                        .get(row.len())
                        .map(|name| String::from_utf8_lossy(name).into_owned()),
                    reason: format!("expected {} fields, found {}", h.len(), row.len()),
                });
            }
            Some(_) => (),
        }
        writer
            .write_byte_record(&row)
            .map_err(|e| NGError::parse(e.to_string()))?;
    }
    if skipped > 0 {
        debug!("Skipped {skipped} blank lines");
    }
    writer
        .into_inner()
        .map_err(|e| NGError::parse(e.to_string()))
}

/// Line number of the first non-blank line at or after `offset`.
fn line_at(bytes: &[u8], offset: usize) -> usize {
    let offset = offset.min(bytes.len());
    let mut line = 1 + bytes[..offset].iter().filter(|&&b| b == b'\n').count();
    let mut rest = &bytes[offset..];
    while let Some(end) = rest.iter().position(|&b| b == b'\n') {
        if !rest[..end].trim_ascii().is_empty() {
            break;
        }
        line += 1;
        rest = &rest[end + 1..];
    }
    line
}

fn load_column(df: &DataFrame, id: &str) -> Result<Vec<String>, NGError> {
    let col = df.column(id)?.cast(&DataType::String)?;
    let series = col.str()?;
    Ok(series
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect())
}

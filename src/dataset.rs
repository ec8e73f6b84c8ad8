use derive_setters::Setters;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

use crate::domain::RVError;

pub const DEFAULT_DELIMITER: char = ',';
const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    JSON,
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// A single scalar value of a report row.
///
/// `Null` and absent keys are both rendered, filtered and sorted as the empty string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// One row of a report, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Record(HashMap<String, Cell>);

impl Record {
    pub fn new() -> Self {
        Record(HashMap::new())
    }

    fn with_capacity(capacity: usize) -> Self {
        Record(HashMap::with_capacity(capacity))
    }

    /// Builder style insert, mostly useful when assembling rows by hand.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Cell>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.get(column)
    }

    /// String form of the value in `column`, empty for missing or null cells.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(|c| c.to_string()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Descriptive metadata carried along with a report, never computed by the view.
#[derive(Debug, Clone, Default, PartialEq, Setters)]
#[setters(into)]
pub struct ReportMeta {
    pub category: String,
    pub period: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Record>,
    row_count: usize,
    delimiter: char,
    meta: ReportMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument {
    headers: Option<Vec<String>>,
    rows: Option<Vec<Record>>,
    row_count: Option<usize>,
    delimiter: Option<String>,
    category: Option<String>,
    period: Option<String>,
    original_file_name: Option<String>,
    file_name: Option<String>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<Record>) -> Self {
        let row_count = rows.len();
        Dataset {
            headers,
            rows,
            row_count,
            delimiter: DEFAULT_DELIMITER,
            meta: ReportMeta::default(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_meta(mut self, meta: ReportMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Overrides the reported total, which may exceed the number of materialized rows.
    pub fn with_row_count(mut self, row_count: usize) -> Self {
        self.row_count = row_count;
        self
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn meta(&self) -> &ReportMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut ReportMeta {
        &mut self.meta
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Load a report from disk. CSV files are parsed with polars, json files are
    /// expected to hold a report document with `headers` and `rows`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: PathBuf, delimiter: Option<char>) -> Result<Dataset, RVError> {
        let file_info = Self::get_file_info(path)?;
        debug!("Loading {:?} ({} bytes)", file_info.file_type, file_info.file_size);

        let start_time = Instant::now();
        let mut dataset = match file_info.file_type {
            FileType::CSV => Self::load_csv(&file_info.path, delimiter)?,
            FileType::JSON => Self::from_report_json(&fs::read_to_string(&file_info.path)?)?,
        };
        if dataset.meta.file_name.is_empty() {
            dataset.meta.file_name = file_info
                .path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("???")
                .to_string();
        }

        info!(
            "Loaded {} rows x {} columns in {}ms",
            dataset.rows.len(),
            dataset.headers.len(),
            start_time.elapsed().as_millis()
        );
        Ok(dataset)
    }

    /// Parse a report document as served by the report backend.
    pub fn from_report_json(text: &str) -> Result<Dataset, RVError> {
        let doc: ReportDocument = serde_json::from_str(text.trim_start_matches(BOM))?;
        let (Some(headers), Some(rows)) = (doc.headers, doc.rows) else {
            return Err(RVError::NoDatasetLoaded);
        };
        let row_count = doc.row_count.unwrap_or(rows.len());
        let delimiter = doc
            .delimiter
            .and_then(|d| d.chars().next())
            .unwrap_or(DEFAULT_DELIMITER);
        let meta = ReportMeta {
            category: doc.category.unwrap_or_default(),
            period: doc.period.unwrap_or_default(),
            file_name: doc.original_file_name.or(doc.file_name).unwrap_or_default(),
        };

        Ok(Dataset::new(headers, rows)
            .with_row_count(row_count)
            .with_delimiter(delimiter)
            .with_meta(meta))
    }

    /// Pick the most frequent of `,` `;` tab and `|` in the header line. A candidate
    /// has to beat every other one, otherwise comma wins.
    pub fn detect_delimiter(line: &str) -> char {
        let count = |d: char| line.chars().filter(|&c| c == d).count();
        let candidates = [',', ';', '\t', '|'].map(|d| (d, count(d)));

        for &(d, n) in &candidates[1..] {
            if candidates.iter().all(|&(other, m)| other == d || n > m) {
                return d;
            }
        }
        DEFAULT_DELIMITER
    }

    fn read_first_line(path: &Path) -> Result<String, RVError> {
        let mut line = String::new();
        BufReader::new(File::open(path)?).read_line(&mut line)?;
        Ok(line.trim_start_matches(BOM).to_string())
    }

    fn load_csv(path: &Path, delimiter: Option<char>) -> Result<Dataset, RVError> {
        let delimiter = match delimiter {
            Some(d) => d,
            None => Self::detect_delimiter(&Self::read_first_line(path)?),
        };
        if !delimiter.is_ascii() {
            return Err(RVError::LoadingFailed(format!(
                "Delimiter {delimiter:?} is not a single byte character"
            )));
        }
        trace!("Using delimiter {delimiter:?}");

        let df = LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .with_separator(delimiter as u8)
            // All columns as text, values are typed one by one in `to_cell`
            .with_infer_schema_length(Some(0))
            .finish()?
            .collect()?;

        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();

        // Each column is converted in its own thread, rows are assembled afterwards.
        let columns: Result<Vec<Vec<Cell>>, PolarsError> = names
            .par_iter()
            .map(|name| Self::load_column(&df, name))
            .collect();
        let columns = columns?;

        let headers: Vec<String> = names
            .iter()
            .map(|n| n.trim_start_matches(BOM).trim().to_string())
            .collect();

        let mut rows: Vec<Record> = (0..df.height())
            .map(|_| Record::with_capacity(headers.len()))
            .collect();
        for (header, column) in headers.iter().zip(columns) {
            for (row, cell) in rows.iter_mut().zip(column) {
                if !cell.is_null() {
                    row.insert(header.clone(), cell);
                }
            }
        }

        Ok(Dataset::new(headers, rows).with_delimiter(delimiter))
    }

    fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Cell>, PolarsError> {
        let column = df.column(col_name)?;
        let col = column.cast(&DataType::String)?;
        let series = col.str()?;

        Ok(series.into_iter().map(Self::to_cell).collect())
    }

    /// Type a single raw value. Whole numbers become `Int`, numbers with a
    /// decimal point `Float`, `true`/`false` `Bool`, anything else `Text`.
    fn to_cell(value: Option<&str>) -> Cell {
        let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
            return Cell::Null;
        };
        if raw.contains('.') {
            if let Some(x) = raw.parse::<f64>().ok().filter(|x| x.is_finite()) {
                return Cell::Float(x);
            }
        } else if let Ok(i) = raw.parse::<i64>() {
            return Cell::Int(i);
        }
        match raw {
            "true" => Cell::Bool(true),
            "false" => Cell::Bool(false),
            _ => Cell::Text(raw.to_string()),
        }
    }

    fn detect_file_type(path: &Path) -> Result<FileType, RVError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") | Some("TSV") | Some("TXT") => Ok(FileType::CSV),
            Some("JSON") => Ok(FileType::JSON),
            _ => Err(RVError::UnknownFileType),
        }
    }

    fn get_file_info(path: PathBuf) -> Result<FileInfo, RVError> {
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RVError::FileNotFound,
            ErrorKind::PermissionDenied => RVError::PermissionDenied,
            _ => RVError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(RVError::LoadingFailed("Not a file!".into()));
        }

        let file_type = Self::detect_file_type(&path)?;

        Ok(FileInfo {
            path,
            file_size: metadata.len(),
            file_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_render_like_their_string_form() {
        assert_eq!(Cell::Null.to_string(), "");
        assert_eq!(Cell::Int(42).to_string(), "42");
        assert_eq!(Cell::Float(1.0).to_string(), "1");
        assert_eq!(Cell::Float(2.5).to_string(), "2.5");
        assert_eq!(Cell::Bool(true).to_string(), "true");
        assert_eq!(Cell::from("abc").to_string(), "abc");
        assert_eq!(Cell::from(None::<i64>), Cell::Null);
    }

    #[test]
    fn missing_and_null_cells_read_as_empty() {
        let row = Record::new().with("a", "x").with("b", Cell::Null);
        assert_eq!(row.text("a"), "x");
        assert_eq!(row.text("b"), "");
        assert_eq!(row.text("nope"), "");
    }

    #[test]
    fn delimiter_detection() {
        assert_eq!(Dataset::detect_delimiter("a,b,c"), ',');
        assert_eq!(Dataset::detect_delimiter("a;b;c"), ';');
        assert_eq!(Dataset::detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(Dataset::detect_delimiter("a|b|c"), '|');
        // Ties and empty lines fall back to comma
        assert_eq!(Dataset::detect_delimiter("a;b,c"), ',');
        assert_eq!(Dataset::detect_delimiter(""), ',');
        assert_eq!(Dataset::detect_delimiter("a;b|c|d;e"), ',');
    }

    #[test]
    fn report_document_is_parsed() {
        let json = r#"{
            "headers": ["Tipo", "Prioridad", "Total"],
            "rows": [
                {"Tipo": "Robo", "Prioridad": "Alta", "Total": 3},
                {"Tipo": "Hurto", "Prioridad": null, "Total": 1.5},
                {"Tipo": "Robo", "Activo": true}
            ],
            "rowCount": 1200,
            "delimiter": ";",
            "category": "Incidentes",
            "period": "2024-05",
            "originalFileName": "incidentes.csv"
        }"#;
        let ds = Dataset::from_report_json(json).unwrap();
        assert_eq!(ds.headers(), ["Tipo", "Prioridad", "Total"]);
        assert_eq!(ds.rows().len(), 3);
        assert_eq!(ds.row_count(), 1200);
        assert_eq!(ds.delimiter(), ';');
        assert_eq!(ds.meta().category, "Incidentes");
        assert_eq!(ds.meta().file_name, "incidentes.csv");
        assert_eq!(ds.rows()[0].get("Total"), Some(&Cell::Int(3)));
        assert_eq!(ds.rows()[1].get("Total"), Some(&Cell::Float(1.5)));
        assert_eq!(ds.rows()[1].get("Prioridad"), Some(&Cell::Null));
        assert_eq!(ds.rows()[2].get("Activo"), Some(&Cell::Bool(true)));
    }

    #[test]
    fn report_document_without_rows_is_not_a_dataset() {
        let err = Dataset::from_report_json(r#"{"headers": ["a"]}"#).unwrap_err();
        assert!(matches!(err, RVError::NoDatasetLoaded));
        let err = Dataset::from_report_json(r#"{"rows": []}"#).unwrap_err();
        assert!(matches!(err, RVError::NoDatasetLoaded));
    }

    #[test]
    fn report_document_defaults() {
        let ds = Dataset::from_report_json(r#"{"headers": [], "rows": []}"#).unwrap();
        assert_eq!(ds.delimiter(), ',');
        assert_eq!(ds.row_count(), 0);
    }

    #[test]
    fn values_are_typed_one_by_one() {
        assert_eq!(Dataset::to_cell(Some(" 7 ")), Cell::Int(7));
        assert_eq!(Dataset::to_cell(Some("-12")), Cell::Int(-12));
        assert_eq!(Dataset::to_cell(Some("0.5")), Cell::Float(0.5));
        assert_eq!(Dataset::to_cell(Some("false")), Cell::Bool(false));
        assert_eq!(Dataset::to_cell(Some("  ")), Cell::Null);
        assert_eq!(Dataset::to_cell(None), Cell::Null);
        assert_eq!(Dataset::to_cell(Some(" Norte ")), Cell::Text("Norte".into()));
        assert_eq!(Dataset::to_cell(Some("X-17")), Cell::Text("X-17".into()));
        assert_eq!(Dataset::to_cell(Some("1.2.3")), Cell::Text("1.2.3".into()));
        assert_eq!(Dataset::to_cell(Some("NaN")), Cell::Text("NaN".into()));
        assert_eq!(Dataset::to_cell(Some("inf")), Cell::Text("inf".into()));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(matches!(
            Dataset::detect_file_type(Path::new("report.parquet")),
            Err(RVError::UnknownFileType)
        ));
        assert_eq!(Dataset::detect_file_type(Path::new("r.CSV")).unwrap(), FileType::CSV);
        assert_eq!(Dataset::detect_file_type(Path::new("r.json")).unwrap(), FileType::JSON);
    }
}

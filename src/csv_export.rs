use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::dataset::{Record, ReportMeta};
use crate::domain::RVError;

/// Written first so spreadsheet tools pick up UTF-8.
pub const BYTE_ORDER_MARK: char = '\u{feff}';

pub fn needs_quoting(value: &str, delimiter: char) -> bool {
    value.contains(delimiter) || value.contains('"') || value.contains('\n')
}

/// Quote a field only when it holds the delimiter, a double quote or a newline.
pub fn format_field(value: &str, delimiter: char) -> Cow<'_, str> {
    if needs_quoting(value, delimiter) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

pub fn format_line<I, S>(values: I, delimiter: char) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (idx, value) in values.into_iter().enumerate() {
        if idx > 0 {
            line.push(delimiter);
        }
        line.push_str(&format_field(value.as_ref(), delimiter));
    }
    line
}

/// Header line plus one line per row, restricted to `headers`, prefixed with a BOM.
/// Missing and null cells become empty fields.
pub fn serialize_to_csv<'a, R, H>(rows: R, headers: &[H], delimiter: char) -> String
where
    R: IntoIterator<Item = &'a Record>,
    H: AsRef<str>,
{
    // A lone empty field would be a blank line, which CSV readers skip.
    let single = headers.len() == 1;
    let line = |values: Vec<String>| match format_line(values, delimiter) {
        line if single && line.is_empty() => "\"\"".to_string(),
        line => line,
    };

    let mut out = String::new();
    out.push(BYTE_ORDER_MARK);
    out.push_str(&line(headers.iter().map(|h| h.as_ref().to_string()).collect()));
    for row in rows {
        out.push('\n');
        out.push_str(&line(headers.iter().map(|h| row.text(h.as_ref())).collect()));
    }
    out
}

/// `{category}_{period}_filtered.csv`, with path separators replaced.
pub fn export_file_name(meta: &ReportMeta) -> String {
    let clean = |s: &str| s.trim().replace(['/', '\\'], "_");
    let category = match clean(&meta.category) {
        c if c.is_empty() => "report".to_string(),
        c => c,
    };
    let period = clean(&meta.period);
    if period.is_empty() {
        format!("{category}_filtered.csv")
    } else {
        format!("{category}_{period}_filtered.csv")
    }
}

pub fn write_export(path: &Path, content: &str) -> Result<(), RVError> {
    fs::write(path, content)?;
    info!("Exported {} bytes to {}", content.len(), path.display());
    Ok(())
}

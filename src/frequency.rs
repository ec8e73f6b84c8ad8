use std::collections::HashMap;

use crate::dataset::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequency {
    pub label: String,
    pub count: usize,
}

/// Distinct values of one column ordered by count, highest first. Ties keep the
/// order in which the values were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<Frequency>,
    distinct_total: usize,
    counted: usize,
}

impl FrequencyTable {
    pub fn entries(&self) -> &[Frequency] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct values before truncation.
    pub fn distinct_total(&self) -> usize {
        self.distinct_total
    }

    /// Number of rows that contributed a non-empty value.
    pub fn counted(&self) -> usize {
        self.counted
    }

    pub fn omitted(&self) -> usize {
        self.distinct_total - self.entries.len()
    }

    pub fn is_truncated(&self) -> bool {
        self.omitted() > 0
    }

    /// Percentage of counted rows holding the value of entry `idx`.
    pub fn share(&self, idx: usize) -> f64 {
        match self.entries.get(idx) {
            Some(e) if self.counted > 0 => e.count as f64 * 100.0 / self.counted as f64,
            _ => 0.0,
        }
    }

    pub fn as_pairs(&self) -> Vec<(&str, usize)> {
        self.entries
            .iter()
            .map(|e| (e.label.as_str(), e.count))
            .collect()
    }
}

/// Count the distinct trimmed values of `column` over `rows`.
///
/// Null, missing and blank cells are skipped. With `top_n` set the table is
/// cut after sorting, `FrequencyTable::omitted` tells how many values were dropped.
pub fn count<'a, I>(rows: I, column: Option<&str>, top_n: Option<usize>) -> FrequencyTable
where
    I: IntoIterator<Item = &'a Record>,
{
    let Some(column) = column.filter(|c| !c.is_empty()) else {
        return FrequencyTable::default();
    };

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<Frequency> = Vec::new();
    let mut counted = 0;

    for row in rows {
        let Some(cell) = row.get(column).filter(|c| !c.is_null()) else {
            continue;
        };
        let text = cell.to_string();
        let key = text.trim();
        if key.is_empty() {
            continue;
        }
        counted += 1;
        match positions.get(key) {
            Some(&idx) => entries[idx].count += 1,
            None => {
                positions.insert(key.to_string(), entries.len());
                entries.push(Frequency {
                    label: key.to_string(),
                    count: 1,
                });
            }
        }
    }

    let distinct_total = entries.len();
    // stable sort, first seen wins on equal counts
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(n) = top_n {
        entries.truncate(n);
    }

    FrequencyTable {
        entries,
        distinct_total,
        counted,
    }
}

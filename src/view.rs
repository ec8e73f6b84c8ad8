//! Filtered, sorted and paginated projections of a [`Dataset`].
//!
//! Every derived read recomputes from the loaded rows in the fixed order
//! filter, sort, paginate. Nothing here fails: empty inputs, unknown columns
//! and out of range pages degrade to empty or clamped results.

use std::collections::HashSet;
use std::time::Instant;
use tracing::trace;

use crate::collate::natural_cmp;
use crate::csv_export::{export_file_name, serialize_to_csv};
use crate::dataset::{Dataset, Record};
use crate::frequency::{self, FrequencyTable};

pub const PAGE_SIZE: usize = 100;
pub const DISTINCT_VALUES_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Case-insensitive substring match.
    #[default]
    Contains,
    /// Trimmed cell value equals the filter value.
    Exact,
}

/// Which rows a frequency count runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Filtered,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn filter_rows<'a, I>(rows: I, column: Option<&str>, value: Option<&str>, mode: FilterMode) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let (Some(column), Some(value)) = (non_empty(column), non_empty(value)) else {
        return rows.into_iter().collect();
    };
    match mode {
        FilterMode::Contains => {
            let needle = value.to_lowercase();
            rows.into_iter()
                .filter(|r| r.text(column).to_lowercase().contains(&needle))
                .collect()
        }
        FilterMode::Exact => rows
            .into_iter()
            .filter(|r| r.text(column).trim() == value)
            .collect(),
    }
}

/// Keep rows whose value in `column` contains `substring`, ignoring case.
/// Without a column or a substring every row is kept.
pub fn apply_filter<'a, I>(rows: I, column: Option<&str>, substring: Option<&str>) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    filter_rows(rows, column, substring, FilterMode::Contains)
}

/// Keep rows whose trimmed value in `column` equals `value`.
pub fn apply_exact_filter<'a, I>(rows: I, column: Option<&str>, value: Option<&str>) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    filter_rows(rows, column, value, FilterMode::Exact)
}

/// Stable sort on the string form of `column`, numbers inside values compare by value.
pub fn apply_sort<'a>(rows: Vec<&'a Record>, column: Option<&str>, direction: SortDirection) -> Vec<&'a Record> {
    let Some(column) = non_empty(column) else {
        return rows;
    };
    let mut keyed: Vec<(String, &'a Record)> = rows.into_iter().map(|r| (r.text(column), r)).collect();
    match direction {
        SortDirection::Asc => keyed.sort_by(|(a, _), (b, _)| natural_cmp(a, b)),
        SortDirection::Desc => keyed.sort_by(|(a, _), (b, _)| natural_cmp(b, a)),
    }
    keyed.into_iter().map(|(_, r)| r).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, already clamped into `1..=total_pages`.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
}

pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size.max(1)).max(1)
}

/// Slice out one page. `page` is clamped into range, never panics.
pub fn paginate<T: Clone>(rows: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pages = total_pages(rows.len(), page_size);
    let page = page.clamp(1, total_pages);
    let begin = (page - 1) * page_size;
    let end = std::cmp::min(begin + page_size, rows.len());
    Page {
        items: rows[begin..end].to_vec(),
        page,
        total_pages,
        total_items: rows.len(),
        page_size,
    }
}

/// Add `column` to the set or remove it when already present.
pub fn toggle_column_visibility(visible: &HashSet<String>, column: &str) -> HashSet<String> {
    let mut next = visible.clone();
    if !next.remove(column) {
        next.insert(column.to_string());
    }
    next
}

/// Hide everything when every header is shown, otherwise show every header.
pub fn toggle_all_columns(visible: &HashSet<String>, headers: &[String]) -> HashSet<String> {
    let all_shown = !headers.is_empty() && headers.iter().all(|h| visible.contains(h));
    if all_shown {
        HashSet::new()
    } else {
        headers.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    visible_columns: HashSet<String>,
    filter_column: Option<String>,
    filter_value: Option<String>,
    filter_mode: FilterMode,
    sort_column: Option<String>,
    sort_direction: SortDirection,
    page: usize,
    page_size: usize,
}

impl ViewState {
    fn for_headers(headers: &[String]) -> Self {
        ViewState {
            visible_columns: headers.iter().cloned().collect(),
            filter_column: None,
            filter_value: None,
            filter_mode: FilterMode::default(),
            sort_column: None,
            sort_direction: SortDirection::default(),
            page: 1,
            page_size: PAGE_SIZE,
        }
    }

    pub fn visible_columns(&self) -> &HashSet<String> {
        &self.visible_columns
    }

    pub fn filter_column(&self) -> Option<&str> {
        self.filter_column.as_deref()
    }

    pub fn filter_value(&self) -> Option<&str> {
        self.filter_value.as_deref()
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    pub fn is_filtered(&self) -> bool {
        non_empty(self.filter_column()).is_some() && non_empty(self.filter_value()).is_some()
    }

    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column.as_deref()
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// The derived read handed to a renderer.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    /// Visible headers in dataset order.
    pub headers: Vec<&'a str>,
    pub page: Page<&'a Record>,
    /// Total reported by the dataset, independent of filtering.
    pub row_count: usize,
}

impl Window<'_> {
    pub fn total_filtered(&self) -> usize {
        self.page.total_items
    }

    pub fn shown(&self) -> usize {
        self.page.items.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Showing {} of {} records (Total: {})",
            self.shown(),
            self.total_filtered(),
            self.row_count
        )
    }
}

pub struct TabularView {
    dataset: Dataset,
    state: ViewState,
}

impl TabularView {
    pub fn new(dataset: Dataset) -> Self {
        let state = ViewState::for_headers(dataset.headers());
        TabularView { dataset, state }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Set the filter criteria. Empty strings count as unset. Resets to page 1.
    pub fn set_filter(&mut self, column: Option<&str>, value: Option<&str>, mode: FilterMode) {
        self.state.filter_column = non_empty(column).map(str::to_string);
        self.state.filter_value = non_empty(value).map(str::to_string);
        self.state.filter_mode = mode;
        self.state.page = 1;
    }

    pub fn clear_filter(&mut self) {
        self.set_filter(None, None, FilterMode::default());
    }

    /// Resets to page 1.
    pub fn set_sort(&mut self, column: Option<&str>, direction: SortDirection) {
        self.state.sort_column = non_empty(column).map(str::to_string);
        self.state.sort_direction = direction;
        self.state.page = 1;
    }

    /// Sort by `column`, reversing the direction when it is already the sort column.
    pub fn sort_by_header(&mut self, column: &str) {
        let direction = if self.state.sort_column() == Some(column) {
            self.state.sort_direction.toggled()
        } else {
            SortDirection::Asc
        };
        self.set_sort(Some(column), direction);
    }

    pub fn set_page(&mut self, page: usize) {
        let pages = total_pages(self.filtered_rows().len(), self.state.page_size);
        self.state.page = page.clamp(1, pages);
    }

    pub fn next_page(&mut self) {
        self.set_page(self.state.page + 1);
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.state.page.saturating_sub(1));
    }

    pub fn last_page(&mut self) {
        self.set_page(usize::MAX);
    }

    /// Columns outside the headers are ignored.
    pub fn toggle_column(&mut self, column: &str) {
        if self.dataset.has_column(column) {
            self.state.visible_columns = toggle_column_visibility(&self.state.visible_columns, column);
        }
    }

    pub fn toggle_all_columns(&mut self) {
        self.state.visible_columns = toggle_all_columns(&self.state.visible_columns, self.dataset.headers());
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.state.visible_columns.contains(column)
    }

    pub fn visible_headers(&self) -> Vec<&str> {
        self.dataset
            .headers()
            .iter()
            .filter(|h| self.state.visible_columns.contains(*h))
            .map(String::as_str)
            .collect()
    }

    pub fn filtered_rows(&self) -> Vec<&Record> {
        filter_rows(
            self.dataset.rows(),
            self.state.filter_column(),
            self.state.filter_value(),
            self.state.filter_mode,
        )
    }

    pub fn sorted_rows(&self) -> Vec<&Record> {
        apply_sort(
            self.filtered_rows(),
            self.state.sort_column(),
            self.state.sort_direction,
        )
    }

    /// Current page of the filtered and sorted rows.
    pub fn window(&self) -> Window<'_> {
        let start_time = Instant::now();
        let rows = self.sorted_rows();
        let page = paginate(&rows, self.state.page, self.state.page_size);
        trace!(
            "Derived page {}/{} of {} rows in {}ms",
            page.page,
            page.total_pages,
            page.total_items,
            start_time.elapsed().as_millis()
        );
        Window {
            headers: self.visible_headers(),
            page,
            row_count: self.dataset.row_count(),
        }
    }

    /// Filtered rows in source order, visible columns only.
    pub fn export_csv(&self) -> String {
        serialize_to_csv(
            self.filtered_rows(),
            &self.visible_headers(),
            self.dataset.delimiter(),
        )
    }

    pub fn can_export(&self) -> bool {
        !self.state.visible_columns.is_empty() && !self.filtered_rows().is_empty()
    }

    pub fn export_file_name(&self) -> String {
        export_file_name(self.dataset.meta())
    }

    pub fn frequencies(&self, column: &str, top_n: Option<usize>, scope: Scope) -> FrequencyTable {
        match scope {
            Scope::All => frequency::count(self.dataset.rows(), Some(column), top_n),
            Scope::Filtered => frequency::count(self.filtered_rows(), Some(column), top_n),
        }
    }

    /// Distinct trimmed non-empty values of `column`, collated, at most
    /// [`DISTINCT_VALUES_LIMIT`] of them.
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .dataset
            .rows()
            .iter()
            .map(|r| r.text(column).trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        // Only identical strings compare equal, so dedup after sorting is exact.
        values.sort_by(|a, b| natural_cmp(a, b));
        values.dedup();
        values.truncate(DISTINCT_VALUES_LIMIT);
        values
    }
}

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{trace, warn};

use crate::columns::{ColumnSpec, SortRule, columns};
use crate::compare::{SortDirection, compare_directed, parse_numeric};
use crate::dataset::Record;

pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const COLUMN_WIDTH_MIN: usize = 3;

/// Sortable, searchable and paginated view over the records of one dataset.
///
/// The records themselves are never touched; sorting and searching only
/// rearrange `rows`, which maps view positions to record indices.
pub struct TableView {
    data: Arc<Vec<Record>>,
    rows: Arc<Vec<usize>>,
    page_size: usize,
    page: usize,
    sort: Option<(usize, SortDirection)>,
    search: String,
    hidden: Vec<bool>,
    widths: Vec<Option<usize>>,
}

impl TableView {
    pub fn new(page_size: usize) -> Self {
        TableView {
            data: Arc::new(Vec::new()),
            rows: Arc::new(Vec::new()),
            page_size: page_size.max(1),
            page: 0,
            sort: None,
            search: String::new(),
            hidden: columns().iter().map(|c| c.hidden).collect(),
            widths: vec![None; columns().len()],
        }
    }

    /// Replace all records. Sort and search settings are kept and re-applied.
    pub fn update_data(&mut self, data: Arc<Vec<Record>>) {
        trace!("Replacing {} records with {}", self.data.len(), data.len());
        self.data = data;
        self.page = 0;
        self.refresh();
    }

    pub fn total(&self) -> usize {
        self.data.len()
    }

    /// Number of records after filtering.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // -------------------- Pagination ---------------------- //

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(self.page_size)
    }

    /// Records on the given page, in view order.
    pub fn page_records(&self, page: usize) -> Vec<&Record> {
        let begin = std::cmp::min(page * self.page_size, self.rows.len());
        let end = std::cmp::min(begin + self.page_size, self.rows.len());
        self.rows[begin..end].iter().map(|&ridx| &self.data[ridx]).collect()
    }

    pub fn current_page(&self) -> Vec<&Record> {
        self.page_records(self.page)
    }

    pub fn goto_page(&mut self, page: usize) -> bool {
        let page = std::cmp::min(page, self.page_count().saturating_sub(1));
        let changed = page != self.page;
        self.page = page;
        changed
    }

    pub fn next_page(&mut self) -> bool {
        self.goto_page(self.page + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        self.goto_page(self.page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> bool {
        self.goto_page(0)
    }

    pub fn last_page(&mut self) -> bool {
        self.goto_page(self.page_count().saturating_sub(1))
    }

    // -------------------- Sorting ---------------------- //

    pub fn sort_state(&self) -> Option<(usize, SortDirection)> {
        self.sort
    }

    /// Sort by a column the way a header click does: ascending first, the
    /// direction flips on each further sort of the same column. Returns
    /// `None` for columns that are not sortable.
    pub fn sort_by(&mut self, column: usize) -> Option<SortDirection> {
        let spec = columns().get(column)?;
        if !spec.is_sortable() {
            return None;
        }
        let direction = match self.sort {
            Some((c, d)) if c == column => d.reversed(),
            _ => SortDirection::Ascending,
        };
        self.sort = Some((column, direction));
        self.page = 0;
        self.refresh();
        Some(direction)
    }

    // -------------------- Searching ---------------------- //

    pub fn search_term(&self) -> &str {
        &self.search
    }

    /// Keep only records where a visible column contains `term`, ignoring
    /// case. An empty term clears the search. Returns the number of matches.
    pub fn search(&mut self, term: &str) -> usize {
        self.search = term.trim().to_string();
        self.page = 0;
        self.refresh();
        self.rows.len()
    }

    // -------------------- Columns ---------------------- //

    pub fn is_hidden(&self, column: usize) -> bool {
        self.hidden.get(column).copied().unwrap_or(true)
    }

    pub fn visible_columns(&self) -> Vec<usize> {
        (0..columns().len()).filter(|&c| !self.hidden[c]).collect()
    }

    pub fn toggle_visibility(&mut self, column: usize) {
        if let Some(h) = self.hidden.get_mut(column) {
            *h = !*h;
            if !self.search.is_empty() {
                self.refresh();
            }
        }
    }

    pub fn show_all(&mut self) {
        self.hidden.iter_mut().for_each(|h| *h = false);
        if !self.search.is_empty() {
            self.refresh();
        }
    }

    /// Grow or shrink a column by `delta` characters.
    pub fn resize(&mut self, column: usize, delta: isize, table_width: usize, max_width: usize) {
        let current = self.column_width(column, table_width, max_width);
        let width = current
            .saturating_add_signed(delta)
            .clamp(COLUMN_WIDTH_MIN, std::cmp::max(table_width, COLUMN_WIDTH_MIN));
        trace!("Resize column {column}: {current} -> {width}");
        if let Some(w) = self.widths.get_mut(column) {
            *w = Some(width);
        }
    }

    /// Render width of a column: a manual resize wins, then the width hint,
    /// then the widest value on the current page.
    pub fn column_width(&self, column: usize, table_width: usize, max_width: usize) -> usize {
        if let Some(Some(w)) = self.widths.get(column) {
            return *w;
        }
        let Some(spec) = columns().get(column) else {
            return COLUMN_WIDTH_MIN;
        };
        if let Some(percent) = spec.width {
            return std::cmp::max(table_width * percent as usize / 100, COLUMN_WIDTH_MIN);
        }
        let content = self
            .current_page()
            .iter()
            .map(|r| spec.format(r.value(column)).chars().count())
            .max()
            .unwrap_or(0);
        let width = std::cmp::max(spec.name.chars().count() + 2, content) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, max_width)
    }

    pub fn display(&self, record: &Record, column: usize) -> String {
        match columns().get(column) {
            Some(spec) => spec.format(record.value(column)),
            None => String::new(),
        }
    }

    // Recompute the row mapping from the current data, search and sort.
    fn refresh(&mut self) {
        let visible = self.visible_columns();
        let term = self.search.to_lowercase();

        let mut rows: Vec<usize> = if term.is_empty() {
            (0..self.data.len()).collect()
        } else {
            self.data
                .par_iter()
                .enumerate()
                .filter(|(_, record)| {
                    visible.iter().any(|&c| {
                        columns()[c]
                            .format(record.value(c))
                            .to_lowercase()
                            .contains(&term)
                    })
                })
                .map(|(idx, _)| idx)
                .collect()
        };

        if let Some((column, direction)) = self.sort {
            let spec = &columns()[column];
            Self::sort_rows(&mut rows, &self.data, column, spec, direction);
        }

        self.rows = Arc::new(rows);
        self.goto_page(self.page);
    }

    fn sort_rows(
        rows: &mut [usize],
        data: &[Record],
        column: usize,
        spec: &ColumnSpec,
        direction: SortDirection,
    ) {
        match spec.sort {
            SortRule::Numeric => {
                let invalid = rows
                    .iter()
                    .filter(|&&r| parse_numeric(data[r].value(column)).is_none())
                    .count();
                if invalid > 0 {
                    warn!(
                        "Column \"{}\" has {invalid} non numeric values, sorted last",
                        spec.id
                    );
                }
                rows.sort_by(|&a, &b| {
                    compare_directed(data[a].value(column), data[b].value(column), direction)
                });
            }
            SortRule::Default => rows.sort_by(|&a, &b| {
                let (x, y) = (data[a].value(column), data[b].value(column));
                match direction {
                    SortDirection::Ascending => x.cmp(y),
                    SortDirection::Descending => y.cmp(x),
                }
            }),
            SortRule::Disabled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::index_of;

    fn records(n: usize) -> Arc<Vec<Record>> {
        Arc::new(
            (0..n)
                .map(|i| {
                    let rank = format!("{}.0", i + 1);
                    let name = format!("Name{i:03}");
                    Record::from_pairs([("rank", rank.as_str()), ("name", name.as_str())])
                })
                .collect(),
        )
    }

    fn names(table: &TableView) -> Vec<String> {
        let name = index_of("name").unwrap();
        table
            .current_page()
            .iter()
            .map(|r| r.value(name).to_string())
            .collect()
    }

    #[test]
    fn paginates_250_records_into_three_pages() {
        let mut table = TableView::new(100);
        table.update_data(records(250));
        assert_eq!(table.page_count(), 3);
        assert_eq!(table.page_records(0).len(), 100);
        assert_eq!(table.page_records(1).len(), 100);
        assert_eq!(table.page_records(2).len(), 50);
        assert!(table.page_records(3).is_empty());

        assert!(table.last_page());
        assert_eq!(table.page(), 2);
        assert_eq!(table.current_page().len(), 50);
        assert!(!table.next_page());
        assert!(table.prev_page());
        assert_eq!(table.page(), 1);
        assert!(table.first_page());
        assert!(!table.prev_page());
    }

    #[test]
    fn empty_table_has_no_pages() {
        let table = TableView::new(100);
        assert_eq!(table.page_count(), 0);
        assert!(table.current_page().is_empty());
    }

    #[test]
    fn percentage_sorts_by_value_not_display() {
        let pct = index_of("n_percent").unwrap();
        let mut table = TableView::new(100);
        table.update_data(Arc::new(vec![
            Record::from_pairs([("name", "A"), ("n_percent", "2.34")]),
            Record::from_pairs([("name", "B"), ("n_percent", "2.2")]),
            Record::from_pairs([("name", "C"), ("n_percent", "2.36")]),
        ]));

        assert_eq!(table.sort_by(pct), Some(SortDirection::Ascending));
        let sorted: Vec<&str> = table.current_page().iter().map(|r| r.value(pct)).collect();
        assert_eq!(sorted, vec!["2.2", "2.34", "2.36"]);
        let shown: Vec<String> = table
            .current_page()
            .iter()
            .map(|r| table.display(r, pct))
            .collect();
        assert_eq!(shown, vec!["2.2", "2.3", "2.4"]);
    }

    #[test]
    fn rank_sorts_numerically_and_toggles() {
        let rank = index_of("rank").unwrap();
        let mut table = TableView::new(100);
        table.update_data(records(12));

        assert_eq!(table.sort_by(rank), Some(SortDirection::Ascending));
        assert_eq!(names(&table)[..3], ["Name000", "Name001", "Name002"]);

        assert_eq!(table.sort_by(rank), Some(SortDirection::Descending));
        assert_eq!(names(&table)[..3], ["Name011", "Name010", "Name009"]);

        assert_eq!(table.sort_by(rank), Some(SortDirection::Ascending));
        assert_eq!(names(&table)[0], "Name000");
    }

    #[test]
    fn non_numeric_cells_sort_last() {
        let rank = index_of("rank").unwrap();
        let mut table = TableView::new(100);
        table.update_data(Arc::new(vec![
            Record::from_pairs([("name", "x"), ("rank", "")]),
            Record::from_pairs([("name", "b"), ("rank", "2")]),
            Record::from_pairs([("name", "a"), ("rank", "10")]),
        ]));
        table.sort_by(rank);
        assert_eq!(names(&table), vec!["b", "a", "x"]);
        table.sort_by(rank);
        assert_eq!(names(&table), vec!["a", "b", "x"]);
    }

    #[test]
    fn unsortable_column_is_rejected() {
        let mut table = TableView::new(100);
        table.update_data(records(3));
        assert_eq!(table.sort_by(index_of("alt_spellings").unwrap()), None);
        assert_eq!(table.sort_state(), None);
    }

    #[test]
    fn search_filters_visible_columns_case_insensitive() {
        let mut table = TableView::new(10);
        table.update_data(records(250));
        table.next_page();

        assert_eq!(table.search("name01"), 10);
        assert_eq!(table.page(), 0);
        assert_eq!(table.page_count(), 1);
        assert!(names(&table).iter().all(|n| n.starts_with("Name01")));

        assert_eq!(table.search(""), 250);
        assert_eq!(table.page_count(), 25);
    }

    #[test]
    fn search_ignores_hidden_columns_until_shown() {
        let first_letter = index_of("first_letter").unwrap();
        let mut table = TableView::new(100);
        table.update_data(Arc::new(vec![
            Record::from_pairs([("name", "Ava"), ("first_letter", "Q")]),
            Record::from_pairs([("name", "Quinn"), ("first_letter", "Q")]),
        ]));
        assert!(table.is_hidden(first_letter));
        assert_eq!(table.search("q"), 1);

        table.toggle_visibility(first_letter);
        assert!(!table.is_hidden(first_letter));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn search_matches_display_value() {
        let mut table = TableView::new(100);
        table.update_data(Arc::new(vec![
            Record::from_pairs([("name", "Ava"), ("rank", "1.0")]),
            Record::from_pairs([("name", "Mia"), ("rank", "20.0")]),
        ]));
        // "1.0" is shown as "1", so ".0" never matches the rank column.
        assert_eq!(table.search(".0"), 0);
    }

    #[test]
    fn update_data_replaces_and_keeps_sort() {
        let rank = index_of("rank").unwrap();
        let mut table = TableView::new(100);
        table.update_data(records(5));
        table.sort_by(rank);
        table.sort_by(rank);

        table.update_data(records(3));
        assert_eq!(table.total(), 3);
        assert_eq!(table.sort_state(), Some((rank, SortDirection::Descending)));
        assert_eq!(names(&table), vec!["Name002", "Name001", "Name000"]);
    }

    #[test]
    fn hiding_keeps_the_data() {
        let name = index_of("name").unwrap();
        let mut table = TableView::new(100);
        table.update_data(records(2));
        table.toggle_visibility(name);
        assert!(!table.visible_columns().contains(&name));
        assert_eq!(table.current_page()[0].get("name"), Some("Name000"));
        table.show_all();
        assert_eq!(table.visible_columns().len(), columns().len());
    }

    #[test]
    fn resize_overrides_width() {
        let name = index_of("name").unwrap();
        let alt = index_of("alt_spellings").unwrap();
        let mut table = TableView::new(100);
        table.update_data(records(2));

        assert_eq!(table.column_width(alt, 200, 40), 20);
        let before = table.column_width(name, 200, 40);
        table.resize(name, 5, 200, 40);
        assert_eq!(table.column_width(name, 200, 40), before + 5);
        table.resize(name, -100, 200, 40);
        assert_eq!(table.column_width(name, 200, 40), COLUMN_WIDTH_MIN);
    }
}

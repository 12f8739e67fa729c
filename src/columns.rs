//! The fixed column schema shared by all datasets, and the cell formatters.

use crate::compare::parse_numeric;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortRule {
    /// Lexicographic order of the raw value.
    Default,
    Disabled,
    /// Numeric order, see [`crate::compare::numeric_compare`].
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formatter {
    /// Leading integer part, `"1.0"` shows as `"1"`.
    Integer,
    /// Fixed point with one decimal.
    OneDecimal,
    /// `"Y"` for the number one, empty otherwise.
    Flag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub hidden: bool,
    pub sort: SortRule,
    pub formatter: Option<Formatter>,
    /// Relative width in percent of the table width.
    pub width: Option<u16>,
}

impl ColumnSpec {
    const fn new(id: &'static str, name: &'static str) -> Self {
        ColumnSpec {
            id,
            name,
            hidden: false,
            sort: SortRule::Default,
            formatter: None,
            width: None,
        }
    }

    const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    const fn numeric(mut self) -> Self {
        self.sort = SortRule::Numeric;
        self
    }

    const fn unsortable(mut self) -> Self {
        self.sort = SortRule::Disabled;
        self
    }

    const fn formatted(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    const fn width(mut self, percent: u16) -> Self {
        self.width = Some(percent);
        self
    }

    pub fn is_sortable(&self) -> bool {
        self.sort != SortRule::Disabled
    }

    /// Display string for a raw cell value of this column.
    pub fn format(&self, raw: &str) -> String {
        match self.formatter {
            Some(f) => format_cell(f, raw),
            None => raw.to_string(),
        }
    }
}

static COLUMNS: [ColumnSpec; 16] = [
    ColumnSpec::new("rank", "Rank")
        .numeric()
        .formatted(Formatter::Integer),
    ColumnSpec::new("name", "Name"),
    ColumnSpec::new("alt_spellings", "Variations")
        .unsortable()
        .width(10),
    ColumnSpec::new("n_sum", "Sum").hidden(),
    ColumnSpec::new("n_percent", "Pct")
        .numeric()
        .formatted(Formatter::OneDecimal),
    ColumnSpec::new("year_min", "YrMin").numeric(),
    ColumnSpec::new("year_max", "YrMax").numeric(),
    ColumnSpec::new("year_pop", "YrPop").numeric(),
    ColumnSpec::new("biblical", "Biblical").formatted(Formatter::Flag),
    ColumnSpec::new("palindrome", "Palindrome").hidden(),
    ColumnSpec::new("phones", "Phones").hidden(),
    ColumnSpec::new("first_letter", "Letter").hidden(),
    ColumnSpec::new("stresses", "Stresses").hidden(),
    ColumnSpec::new("syllables", "Syllables").hidden(),
    ColumnSpec::new("alliteration_first", "Alliteration").hidden(),
    ColumnSpec::new("unisex", "Unisex").formatted(Formatter::Flag),
];

/// The ordered column schema. Constant across calls.
pub fn columns() -> &'static [ColumnSpec] {
    &COLUMNS
}

pub fn index_of(id: &str) -> Option<usize> {
    COLUMNS.iter().position(|c| c.id == id)
}

pub fn spec(id: &str) -> Option<&'static ColumnSpec> {
    COLUMNS.iter().find(|c| c.id == id)
}

pub fn format_cell(formatter: Formatter, raw: &str) -> String {
    match formatter {
        Formatter::Integer => integer_prefix(raw)
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string()),
        Formatter::OneDecimal => match parse_numeric(raw) {
            Some(v) => one_decimal(v),
            None => raw.to_string(),
        },
        Formatter::Flag => {
            if is_one(raw) {
                "Y".to_string()
            } else {
                String::new()
            }
        }
    }
}

// Optional sign followed by at least one digit, leading whitespace ignored.
fn integer_prefix(raw: &str) -> Option<&str> {
    let s = raw.trim_start();
    let sign = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        None
    } else {
        Some(s[..sign + digits].trim_start_matches('+'))
    }
}

/// Fixed point with one decimal, exact ties round away from zero.
///
/// Only values with a fraction of .25 or .75 can sit exactly between two
/// tenths; everything else is already rounded to the nearest by `{:.1}`.
fn one_decimal(v: f64) -> String {
    let quarters = v * 4.0;
    if quarters.fract() == 0.0 && quarters % 2.0 != 0.0 {
        format!("{:.1}", (v * 10.0).round() / 10.0)
    } else {
        format!("{v:.1}")
    }
}

fn is_one(raw: &str) -> bool {
    parse_numeric(raw) == Some(1.0)
}

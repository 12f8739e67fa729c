use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Numeric value of a raw cell. Empty strings and NaN are not numbers.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Total order over raw strings interpreted as numbers.
///
/// Values that do not parse sort after every number and are ordered among
/// themselves by their raw text, so the order stays deterministic for
/// malformed cells.
pub fn numeric_compare(a: &str, b: &str) -> Ordering {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Like [`numeric_compare`] but in the given direction. Non-numeric values
/// stay at the end in both directions.
pub fn compare_directed(a: &str, b: &str, direction: SortDirection) -> Ordering {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => match direction {
            SortDirection::Ascending => numeric_compare(a, b),
            SortDirection::Descending => numeric_compare(b, a),
        },
    }
}

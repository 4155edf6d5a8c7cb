use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const MONTH_ABBREVIATIONS: [&str; 12] =
    ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];

/// Year assumed for month strings without a parseable year.
pub const DEFAULT_MONTH_YEAR: i32 = 2026;

static ABBREVIATED_HEADER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[-/]?(\d{2,4})$").ok()
});

static FULL_NAME_HEADER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(january|february|march|april|may|june|july|august|september|october|november|december)\s*(\d{2,4})$",
    )
    .ok()
});

static NUMERIC_HEADER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-/](\d{2,4})$").ok());

/// Chronological sort key. Field order matters: years compare before months.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub index: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Derive the `(year, month index)` key of a `"<MonthName> <year>"` string.
///
/// Unrecognized month names map to index 0 and a missing or unparseable year
/// falls back to [`DEFAULT_MONTH_YEAR`].
#[must_use]
pub fn month_sort_key(month: &str) -> MonthKey {
    let mut parts = month.split_whitespace();
    let index = parts.next().and_then(month_index).unwrap_or(0);
    let year =
        parts.next().and_then(|raw| raw.parse::<i32>().ok()).unwrap_or(DEFAULT_MONTH_YEAR);
    MonthKey { year, index }
}

/// Stable chronological sort in the requested direction.
pub fn sort_months<S: AsRef<str>>(months: &mut [S], direction: SortDirection) {
    months.sort_by(|left, right| compare_months(left.as_ref(), right.as_ref(), direction));
}

pub(crate) fn compare_months(left: &str, right: &str, direction: SortDirection) -> Ordering {
    let ordering = month_sort_key(left).cmp(&month_sort_key(right));
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Recognize a horizontal-layout month column header and normalize it to
/// `"<FullMonthName> <year>"`.
///
/// Returns `None` when the header is not a month column. Numeric headers whose
/// month part is outside `1..=12` are still month columns but keep their
/// trimmed text.
#[must_use]
pub fn normalize_month_header(header: &str) -> Option<String> {
    let trimmed = header.trim();
    let lowered = trimmed.to_lowercase();

    if let Some((name, year)) = capture_pair(&ABBREVIATED_HEADER, &lowered) {
        let index = MONTH_ABBREVIATIONS.iter().position(|abbr| *abbr == name)?;
        return Some(format!("{} {}", MONTH_NAMES[index], expand_year(year)));
    }

    if let Some((name, year)) = capture_pair(&FULL_NAME_HEADER, &lowered) {
        let index = usize::from(month_index(name)?);
        return Some(format!("{} {}", MONTH_NAMES[index], expand_year(year)));
    }

    if let Some((number, year)) = capture_pair(&NUMERIC_HEADER, &lowered) {
        let normalized = number
            .parse::<usize>()
            .ok()
            .filter(|value| (1..=12).contains(value))
            .map(|value| format!("{} {}", MONTH_NAMES[value - 1], expand_year(year)));
        return Some(normalized.unwrap_or_else(|| trimmed.to_string()));
    }

    None
}

fn month_index(name: &str) -> Option<u8> {
    MONTH_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .and_then(|index| u8::try_from(index).ok())
}

fn expand_year(year: &str) -> String {
    if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    }
}

fn capture_pair<'a>(regex: &Lazy<Option<Regex>>, text: &'a str) -> Option<(&'a str, &'a str)> {
    let regex = (**regex).as_ref()?;
    let captures = regex.captures(text)?;
    let first = captures.get(1)?.as_str();
    let second = captures.get(2)?.as_str();
    Some((first, second))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ascending_sort_orders_by_year_then_month() {
        let mut months = vec!["January 2026", "December 2025", "February 2026"];
        sort_months(&mut months, SortDirection::Ascending);
        assert_eq!(months, vec!["December 2025", "January 2026", "February 2026"]);
    }

    #[test]
    fn descending_sort_lists_most_recent_first() {
        let mut months = vec!["November 2025", "January 2026", "December 2025"];
        sort_months(&mut months, SortDirection::Descending);
        assert_eq!(months, vec!["January 2026", "December 2025", "November 2025"]);
    }

    #[test]
    fn key_falls_back_for_unknown_names_and_missing_years() {
        assert_eq!(month_sort_key("Smarch 2025"), MonthKey { year: 2025, index: 0 });
        assert_eq!(month_sort_key("March"), MonthKey { year: DEFAULT_MONTH_YEAR, index: 2 });
        assert_eq!(month_sort_key("March twenty"), MonthKey { year: DEFAULT_MONTH_YEAR, index: 2 });
        assert_eq!(month_sort_key(""), MonthKey { year: DEFAULT_MONTH_YEAR, index: 0 });
        assert_eq!(month_sort_key("  october   2024 "), MonthKey { year: 2024, index: 9 });
    }

    #[test]
    fn abbreviated_headers_normalize_with_expanded_year() {
        assert_eq!(normalize_month_header("Jan-26").as_deref(), Some("January 2026"));
        assert_eq!(normalize_month_header(" dec/25 ").as_deref(), Some("December 2025"));
        assert_eq!(normalize_month_header("SEP2024").as_deref(), Some("September 2024"));
    }

    #[test]
    fn full_name_and_numeric_headers_normalize() {
        assert_eq!(normalize_month_header("January 2026").as_deref(), Some("January 2026"));
        assert_eq!(normalize_month_header("february26").as_deref(), Some("February 2026"));
        assert_eq!(normalize_month_header("1/26").as_deref(), Some("January 2026"));
        assert_eq!(normalize_month_header("11-2025").as_deref(), Some("November 2025"));
    }

    #[test]
    fn numeric_header_with_impossible_month_keeps_its_text() {
        assert_eq!(normalize_month_header(" 13/26 ").as_deref(), Some("13/26"));
    }

    #[test]
    fn non_month_headers_are_rejected() {
        for header in ["Student Name", "Father Name", "Mobile", "Jan 2026x", "2026", "Total"] {
            assert_eq!(normalize_month_header(header), None, "header `{header}`");
        }
    }

    proptest! {
        #[test]
        fn property_ascending_sort_is_monotonic(
            entries in proptest::collection::vec((0usize..12, 2020i32..2030), 0..24)
        ) {
            let mut months = entries
                .iter()
                .map(|(index, year)| format!("{} {year}", MONTH_NAMES[*index]))
                .collect::<Vec<_>>();
            sort_months(&mut months, SortDirection::Ascending);
            for pair in months.windows(2) {
                prop_assert!(month_sort_key(&pair[0]) <= month_sort_key(&pair[1]));
            }
        }
    }
}

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::month::{compare_months, normalize_month_header, SortDirection};
use crate::{normalize_month_key, Column, FeeRecord, FeeStatus, StudentIdentity};

/// Cell written for a month the student has no record for.
pub const MISSING_MONTH_MARKER: &str = "-";

const STUDENT_NAME_HEADER: &str = "Student Name";
const FATHER_NAME_HEADER: &str = "Father Name";

static RECEIPT_IN_CELL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").ok());

/// A rectangular snapshot of string cells. Rows shorter than `headers` read
/// their missing cells as empty.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    #[must_use]
    pub fn cell(row: &[String], index: usize) -> &str {
        row.get(index).map_or("", String::as_str)
    }

    fn is_blank(row: &[String]) -> bool {
        row.iter().all(|cell| cell.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    Vertical,
    Horizontal,
}

impl TableLayout {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ParsedImport {
    pub layout: TableLayout,
    pub records: Vec<FeeRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFilter {
    #[default]
    All,
    Paid,
    Unpaid,
}

impl ExportFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" | "" => Some(Self::All),
            "paid" => Some(Self::Paid),
            "unpaid" | "not paid" | "not_paid" => Some(Self::Unpaid),
            _ => None,
        }
    }

    #[must_use]
    pub fn matches(self, record: &FeeRecord) -> bool {
        match self {
            Self::All => true,
            Self::Paid => record.is_paid(),
            Self::Unpaid => !record.is_paid(),
        }
    }

    /// Message reported when the filter leaves nothing to export.
    #[must_use]
    pub fn empty_message(self) -> &'static str {
        match self {
            Self::All => "no records to export",
            Self::Paid => "no paid records to export",
            Self::Unpaid => "no unpaid records to export",
        }
    }
}

/// Map a vertical-layout header to its column using the synonym table.
#[must_use]
pub fn canonical_column(header: &str) -> Option<Column> {
    match header.trim().to_lowercase().as_str() {
        "student id" | "id" | "roll no" => Some(Column::StudentId),
        "student name" | "name" => Some(Column::StudentName),
        "father name" | "father's name" | "father" => Some(Column::FatherName),
        "mobile" | "mobile number" | "phone" | "phone number" | "contact" => {
            Some(Column::MobileNumber)
        }
        "month" => Some(Column::Month),
        "fee status" | "status" => Some(Column::FeeStatus),
        "receipt number" | "receipt" | "receipt no" => Some(Column::ReceiptNumber),
        _ => None,
    }
}

/// A table is vertical when it carries any per-record column header.
#[must_use]
pub fn detect_layout<S: AsRef<str>>(headers: &[S]) -> TableLayout {
    let vertical = headers.iter().any(|header| {
        matches!(
            header.as_ref().trim().to_lowercase().as_str(),
            "month" | "fee status" | "receipt number"
        )
    });
    if vertical {
        TableLayout::Vertical
    } else {
        TableLayout::Horizontal
    }
}

/// Parse one horizontal-layout month cell.
///
/// Returns `None` for [`MISSING_MONTH_MARKER`], meaning no record exists for
/// that month.
#[must_use]
pub fn parse_cell(cell: &str) -> Option<(FeeStatus, String)> {
    let trimmed = cell.trim();
    if trimmed == MISSING_MONTH_MARKER {
        return None;
    }
    if !trimmed.to_lowercase().starts_with("paid") {
        return Some((FeeStatus::NotPaid, String::new()));
    }
    let receipt = (*RECEIPT_IN_CELL)
        .as_ref()
        .and_then(|regex| regex.captures(trimmed))
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str().trim().to_string())
        .unwrap_or_default();
    Some((FeeStatus::Paid, receipt))
}

/// Parse a table in whichever layout its headers indicate.
#[must_use]
pub fn import_table(table: &Table) -> ParsedImport {
    let layout = detect_layout(&table.headers);
    let records = match layout {
        TableLayout::Vertical => vertical_to_records(table),
        TableLayout::Horizontal => horizontal_to_records(table),
    };
    ParsedImport { layout, records }
}

/// Read a one-row-per-record table. Unknown columns are dropped and missing
/// columns read as empty.
#[must_use]
pub fn vertical_to_records(table: &Table) -> Vec<FeeRecord> {
    let mut positions: HashMap<Column, usize> = HashMap::new();
    for (index, header) in table.headers.iter().enumerate() {
        if let Some(column) = canonical_column(header) {
            positions.entry(column).or_insert(index);
        }
    }

    table
        .rows
        .iter()
        .filter(|row| !Table::is_blank(row))
        .map(|row| {
            let cells = Column::ALL.map(|column| {
                positions
                    .get(&column)
                    .map(|index| Table::cell(row, *index).trim().to_string())
                    .unwrap_or_default()
            });
            FeeRecord::from_row(&cells)
        })
        .collect()
}

#[derive(Debug, Clone)]
enum HorizontalColumn {
    Name,
    Father,
    StudentId,
    Mobile,
    Month(String),
}

fn classify_header(header: &str) -> Option<HorizontalColumn> {
    let lowered = header.trim().to_lowercase();
    if lowered.contains("father") {
        return Some(HorizontalColumn::Father);
    }
    if lowered.contains("name") {
        return Some(HorizontalColumn::Name);
    }
    match canonical_column(&lowered) {
        Some(Column::StudentId) => return Some(HorizontalColumn::StudentId),
        Some(Column::MobileNumber) => return Some(HorizontalColumn::Mobile),
        _ => {}
    }
    normalize_month_header(header).map(HorizontalColumn::Month)
}

/// Expand a one-row-per-student table whose month columns hold payment cells.
#[must_use]
pub fn horizontal_to_records(table: &Table) -> Vec<FeeRecord> {
    let columns = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| classify_header(header).map(|column| (index, column)))
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for (row_index, row) in table.rows.iter().enumerate() {
        if Table::is_blank(row) {
            continue;
        }

        let mut base = FeeRecord::default();
        for (index, column) in &columns {
            let value = Table::cell(row, *index).trim().to_string();
            match column {
                HorizontalColumn::Name => base.student_name = value,
                HorizontalColumn::Father => base.father_name = value,
                HorizontalColumn::StudentId => base.student_id = value,
                HorizontalColumn::Mobile => base.mobile_number = value,
                HorizontalColumn::Month(_) => {}
            }
        }
        if base.student_name.is_empty() {
            tracing::debug!("skipping import row {}: empty student name", row_index + 1);
            continue;
        }

        for (index, column) in &columns {
            let HorizontalColumn::Month(month) = column else {
                continue;
            };
            if let Some((fee_status, receipt_number)) = parse_cell(Table::cell(row, *index)) {
                records.push(FeeRecord {
                    month: month.clone(),
                    fee_status,
                    receipt_number,
                    ..base.clone()
                });
            }
        }
    }
    records
}

/// Pivot records into one row per student with months as columns, most
/// recent month first.
#[must_use]
pub fn records_to_horizontal(records: &[FeeRecord], filter: ExportFilter) -> Table {
    let mut months: Vec<String> = Vec::new();
    let mut seen_months: HashSet<String> = HashSet::new();
    let mut students: Vec<(StudentIdentity, HashMap<String, &FeeRecord>)> = Vec::new();
    let mut positions: HashMap<StudentIdentity, usize> = HashMap::new();

    for record in records.iter().filter(|record| filter.matches(record)) {
        let key = normalize_month_key(&record.month);
        if seen_months.insert(key.clone()) {
            months.push(record.month.trim().to_string());
        }

        let student = record.student();
        let position = *positions.entry(student.clone()).or_insert_with(|| {
            students.push((student, HashMap::new()));
            students.len() - 1
        });
        students[position].1.insert(key, record);
    }

    months.sort_by(|left, right| compare_months(left, right, SortDirection::Descending));
    students.sort_by_key(|(student, _)| student.student_name.to_lowercase());

    let mut headers = vec![STUDENT_NAME_HEADER.to_string(), FATHER_NAME_HEADER.to_string()];
    headers.extend(months.iter().cloned());

    let rows = students
        .iter()
        .map(|(student, by_month)| {
            let mut row = vec![student.student_name.clone(), student.father_name.clone()];
            row.extend(months.iter().map(|month| {
                by_month
                    .get(&normalize_month_key(month))
                    .map_or_else(|| MISSING_MONTH_MARKER.to_string(), |record| render_cell(record))
            }));
            row
        })
        .collect();

    Table { headers, rows }
}

fn render_cell(record: &FeeRecord) -> String {
    match record.fee_status {
        FeeStatus::Paid if record.receipt_number.trim().is_empty() => "Paid".to_string(),
        FeeStatus::Paid => format!("Paid ({})", record.receipt_number.trim()),
        FeeStatus::NotPaid => FeeStatus::NotPaid.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::MONTH_NAMES;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    fn record(name: &str, father: &str, month: &str, status: FeeStatus, receipt: &str) -> FeeRecord {
        FeeRecord {
            student_name: name.to_string(),
            father_name: father.to_string(),
            month: month.to_string(),
            fee_status: status,
            receipt_number: receipt.to_string(),
            ..FeeRecord::default()
        }
    }

    #[test]
    fn paid_cell_with_receipt_under_abbreviated_header() {
        let table = Table::new(
            strings(&["Student Name", "Father Name", "Jan-26"]),
            vec![strings(&["Aarav Patel", "Rajesh Patel", "Paid (RCP-011-JAN26)"])],
        );
        let parsed = import_table(&table);
        assert_eq!(parsed.layout, TableLayout::Horizontal);
        assert_eq!(
            parsed.records,
            vec![record("Aarav Patel", "Rajesh Patel", "January 2026", FeeStatus::Paid, "RCP-011-JAN26")]
        );
    }

    #[test]
    fn cell_grammar_distinguishes_missing_from_unpaid() {
        assert_eq!(parse_cell(" - "), None);
        assert_eq!(parse_cell(""), Some((FeeStatus::NotPaid, String::new())));
        assert_eq!(parse_cell("Not Paid"), Some((FeeStatus::NotPaid, String::new())));
        assert_eq!(parse_cell("paid"), Some((FeeStatus::Paid, String::new())));
        assert_eq!(parse_cell("PAID ( R-9 ) extra (R-10)"), Some((FeeStatus::Paid, "R-9".to_string())));
    }

    #[test]
    fn horizontal_classifier_captures_info_columns_and_ignores_others() {
        let table = Table::new(
            strings(&["Roll No", "Name", "Father's Name", "Phone", "Remarks", "Dec/25", "1/26"]),
            vec![
                strings(&["VK001", " Priya ", "Suresh", "98765", "ok", "Paid (R1)", "-"]),
                strings(&["", "", "", "", "", "", ""]),
                strings(&["VK002", "", "Nobody", "", "", "Paid", "Paid"]),
                strings(&["VK003", "Rohan"]),
            ],
        );
        let records = horizontal_to_records(&table);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].student_id, "VK001");
        assert_eq!(records[0].student_name, "Priya");
        assert_eq!(records[0].father_name, "Suresh");
        assert_eq!(records[0].mobile_number, "98765");
        assert_eq!(records[0].month, "December 2025");
        assert_eq!(records[0].receipt_number, "R1");

        let rohan = records.iter().filter(|r| r.student_name == "Rohan").collect::<Vec<_>>();
        assert_eq!(rohan.len(), 2);
        assert!(rohan.iter().all(|r| r.fee_status == FeeStatus::NotPaid));
    }

    #[test]
    fn layout_sniffing_uses_per_record_headers() {
        assert_eq!(detect_layout(&["Student Name", " MONTH "]), TableLayout::Vertical);
        assert_eq!(detect_layout(&["Name", "Receipt Number"]), TableLayout::Vertical);
        assert_eq!(detect_layout(&["Student Name", "Jan-26"]), TableLayout::Horizontal);
        assert_eq!(detect_layout::<&str>(&[]), TableLayout::Horizontal);
    }

    #[test]
    fn vertical_import_maps_synonyms_and_fills_missing_columns() {
        let table = Table::new(
            strings(&["ID", "Name", "Father", "Extra", "Month", "Status"]),
            vec![
                strings(&["VK004", "Sneha Verma", "Prakash Verma", "x", "January 2026", "paid"]),
                strings(&["  ", ""]),
                strings(&["VK005", "Vikram Singh", "Ajay Singh", "", "December 2025", "Pending"]),
            ],
        );
        let records = vertical_to_records(&table);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].student_id, "VK004");
        assert_eq!(records[0].fee_status, FeeStatus::Paid);
        assert!(records[0].mobile_number.is_empty());
        assert!(records[0].receipt_number.is_empty());
        assert_eq!(records[1].fee_status, FeeStatus::NotPaid);
    }

    #[test]
    fn export_pivots_newest_month_first_and_marks_missing() {
        let records = vec![
            record("zoya", "Imran", "December 2025", FeeStatus::NotPaid, ""),
            record("Aarav", "Rajesh", "January 2026", FeeStatus::Paid, "RCP-001-JAN26"),
            record("Aarav", "Rajesh", "December 2025", FeeStatus::Paid, ""),
            record("Zoya", "Imran", "February 2026", FeeStatus::NotPaid, ""),
        ];
        let table = records_to_horizontal(&records, ExportFilter::All);
        assert_eq!(
            table.headers,
            strings(&["Student Name", "Father Name", "February 2026", "January 2026", "December 2025"])
        );
        assert_eq!(
            table.rows,
            vec![
                strings(&["Aarav", "Rajesh", "-", "Paid (RCP-001-JAN26)", "Paid"]),
                strings(&["zoya", "Imran", "-", "-", "Not Paid"]),
                strings(&["Zoya", "Imran", "Not Paid", "-", "-"]),
            ]
        );
    }

    #[test]
    fn export_filter_applies_before_pivot() {
        let records = vec![
            record("Aarav", "Rajesh", "January 2026", FeeStatus::Paid, "R1"),
            record("Priya", "Suresh", "December 2025", FeeStatus::NotPaid, ""),
        ];
        let paid = records_to_horizontal(&records, ExportFilter::Paid);
        assert_eq!(paid.headers.len(), 3);
        assert_eq!(paid.rows, vec![strings(&["Aarav", "Rajesh", "Paid (R1)"])]);

        let unpaid = records_to_horizontal(&records, ExportFilter::Unpaid);
        assert_eq!(unpaid.rows, vec![strings(&["Priya", "Suresh", "Not Paid"])]);

        assert_eq!(ExportFilter::parse("Unpaid"), Some(ExportFilter::Unpaid));
        assert_eq!(ExportFilter::parse("overdue"), None);
    }

    #[test]
    fn duplicated_student_month_keeps_latest_record() {
        let records = vec![
            record("Aarav", "Rajesh", "January 2026", FeeStatus::NotPaid, ""),
            record("Aarav", "Rajesh", "january 2026", FeeStatus::Paid, "R2"),
        ];
        let table = records_to_horizontal(&records, ExportFilter::All);
        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.rows[0][2], "Paid (R2)");
    }

    fn roster() -> impl Strategy<Value = Vec<FeeRecord>> {
        proptest::collection::vec(
            (
                "[A-Z][a-z]{1,6}",
                "[A-Z][a-z]{0,6}",
                0usize..12,
                2024i32..2027,
                any::<bool>(),
                proptest::option::of("[A-Z0-9-]{1,10}"),
            ),
            0..30,
        )
        .prop_map(|entries| {
            let mut seen = HashSet::new();
            entries
                .into_iter()
                .map(|(name, father, month, year, paid, receipt)| FeeRecord {
                    student_name: name,
                    father_name: father,
                    month: format!("{} {year}", MONTH_NAMES[month]),
                    fee_status: if paid { FeeStatus::Paid } else { FeeStatus::NotPaid },
                    receipt_number: if paid { receipt.unwrap_or_default() } else { String::new() },
                    ..FeeRecord::default()
                })
                .filter(|record| seen.insert(record.identity()))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_horizontal_round_trip_preserves_records(records in roster()) {
            let table = records_to_horizontal(&records, ExportFilter::All);
            let parsed = import_table(&table);
            prop_assert_eq!(parsed.layout, TableLayout::Horizontal);

            let key = |record: &FeeRecord| {
                (record.identity(), record.fee_status, record.receipt_number.clone())
            };
            let expected = records.iter().map(key).collect::<HashSet<_>>();
            let actual = parsed.records.iter().map(key).collect::<HashSet<_>>();
            prop_assert_eq!(parsed.records.len(), records.len());
            prop_assert_eq!(actual, expected);
        }
    }
}

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

mod aggregate;
mod convert;
mod ledger;
mod lookup;
mod month;
pub mod sample;
mod store;
pub mod style;

pub use aggregate::{
    defaulters, list_records, student_profile, summarize, unique_students, Defaulter,
    DefaulterReport, Pagination, RecordListing, RecordQuery, StudentProfile, Summary,
    UniqueStudent, DEFAULT_PER_PAGE,
};
pub use convert::{
    canonical_column, detect_layout, horizontal_to_records, import_table, parse_cell,
    records_to_horizontal, vertical_to_records, ExportFilter, ParsedImport, Table, TableLayout,
    MISSING_MONTH_MARKER,
};
pub use ledger::{BulkAddReport, FeeLedger, ProfileUpdate, QuickMarkResult, MAX_REPORTED_ERRORS};
pub use lookup::{find_row_number, RowNumber, FIRST_DATA_ROW};
pub use month::{
    month_sort_key, normalize_month_header, sort_months, MonthKey, SortDirection,
    DEFAULT_MONTH_YEAR, MONTH_NAMES,
};
pub use store::{MemorySheet, RecordStore, StoreError, StoreHealth};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("duplicate record: {0}")]
    DuplicateIdentity(String),
    #[error("duplicate receipt: {0}")]
    DuplicateReceipt(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("no records added; {} records skipped", .0.skipped)]
    BatchRejected(BulkAddReport),
}

impl LedgerError {
    /// Stable machine-readable kind used by transports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DuplicateIdentity(_) => "duplicate_identity",
            Self::DuplicateReceipt(_) => "duplicate_receipt",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::BatchRejected(_) => "batch_rejected",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::MissingRow(row) => Self::NotFound(format!("row {row} does not exist")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(from = "String", into = "&'static str")]
pub enum FeeStatus {
    Paid,
    #[default]
    NotPaid,
}

impl FeeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::NotPaid => "Not Paid",
        }
    }

    /// Lenient parse of stored status text. Only `paid` (any case) is paid;
    /// `Unpaid`, `Pending`, blank and anything else count as not paid.
    #[must_use]
    pub fn from_text(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("paid") {
            Self::Paid
        } else {
            Self::NotPaid
        }
    }

    #[must_use]
    pub fn is_paid(self) -> bool {
        self == Self::Paid
    }
}

impl From<String> for FeeStatus {
    fn from(value: String) -> Self {
        Self::from_text(&value)
    }
}

impl From<FeeStatus> for &'static str {
    fn from(value: FeeStatus) -> Self {
        value.as_str()
    }
}

impl Display for FeeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical columns of the backing sheet. The order of [`Column::ALL`] is the
/// wire contract with every store and MUST be preserved on writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    StudentId,
    StudentName,
    FatherName,
    MobileNumber,
    Month,
    FeeStatus,
    ReceiptNumber,
}

impl Column {
    pub const ALL: [Self; 7] = [
        Self::StudentId,
        Self::StudentName,
        Self::FatherName,
        Self::MobileNumber,
        Self::Month,
        Self::FeeStatus,
        Self::ReceiptNumber,
    ];

    #[must_use]
    pub fn header(self) -> &'static str {
        match self {
            Self::StudentId => "Student ID",
            Self::StudentName => "Student Name",
            Self::FatherName => "Father Name",
            Self::MobileNumber => "Mobile Number",
            Self::Month => "Month",
            Self::FeeStatus => "Fee Status",
            Self::ReceiptNumber => "Receipt Number",
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::StudentId => 0,
            Self::StudentName => 1,
            Self::FatherName => 2,
            Self::MobileNumber => 3,
            Self::Month => 4,
            Self::FeeStatus => 5,
            Self::ReceiptNumber => 6,
        }
    }

    #[must_use]
    pub fn headers() -> Vec<String> {
        Self::ALL.iter().map(|column| column.header().to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct FeeRecord {
    #[serde(default)]
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mobile_number: String,
    pub month: String,
    #[serde(default)]
    pub fee_status: FeeStatus,
    #[serde(default)]
    pub receipt_number: String,
}

impl FeeRecord {
    /// Cells in wire column order.
    #[must_use]
    pub fn to_row(&self) -> [String; 7] {
        [
            self.student_id.clone(),
            self.student_name.clone(),
            self.father_name.clone(),
            self.mobile_number.clone(),
            self.month.clone(),
            self.fee_status.as_str().to_string(),
            self.receipt_number.clone(),
        ]
    }

    /// Build a record from cells in wire column order. Missing trailing cells
    /// read as empty, matching how sheets drop blank tails.
    #[must_use]
    pub fn from_row<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |column: Column| {
            cells.get(column.index()).map(|value| value.as_ref().to_string()).unwrap_or_default()
        };
        Self {
            student_id: cell(Column::StudentId),
            student_name: cell(Column::StudentName),
            father_name: cell(Column::FatherName),
            mobile_number: cell(Column::MobileNumber),
            month: cell(Column::Month),
            fee_status: FeeStatus::from_text(&cell(Column::FeeStatus)),
            receipt_number: cell(Column::ReceiptNumber),
        }
    }

    #[must_use]
    pub fn student(&self) -> StudentIdentity {
        StudentIdentity::of(self)
    }

    #[must_use]
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::of(self)
    }

    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.fee_status.is_paid()
    }
}

/// Field set accepted by add and bulk-add. Values are trimmed before use.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct NewRecord {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub fee_status: Option<FeeStatus>,
    #[serde(default)]
    pub receipt_number: String,
}

impl NewRecord {
    #[must_use]
    pub fn into_record(self) -> FeeRecord {
        FeeRecord {
            student_id: self.student_id.trim().to_string(),
            student_name: self.student_name.trim().to_string(),
            father_name: self.father_name.trim().to_string(),
            mobile_number: self.mobile_number.trim().to_string(),
            month: self.month.trim().to_string(),
            fee_status: self.fee_status.unwrap_or_default(),
            receipt_number: self.receipt_number.trim().to_string(),
        }
    }
}

/// A student is `(student_name, father_name)`, compared exactly.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StudentIdentity {
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
}

impl StudentIdentity {
    #[must_use]
    pub fn new(student_name: impl Into<String>, father_name: impl Into<String>) -> Self {
        Self { student_name: student_name.into(), father_name: father_name.into() }
    }

    #[must_use]
    pub fn of(record: &FeeRecord) -> Self {
        Self::new(record.student_name.clone(), record.father_name.clone())
    }

    #[must_use]
    pub fn matches(&self, record: &FeeRecord) -> bool {
        record.student_name == self.student_name && record.father_name == self.father_name
    }
}

impl Display for StudentIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (F: {})", self.student_name, self.father_name)
    }
}

/// One fee record slot: a student plus a month. The month compares
/// case-insensitively with surrounding whitespace ignored, so `Eq` and `Hash`
/// are implemented over the normalized month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    pub month: String,
}

impl RecordIdentity {
    #[must_use]
    pub fn new(
        student_name: impl Into<String>,
        father_name: impl Into<String>,
        month: impl Into<String>,
    ) -> Self {
        Self { student_name: student_name.into(), father_name: father_name.into(), month: month.into() }
    }

    #[must_use]
    pub fn of(record: &FeeRecord) -> Self {
        Self::new(record.student_name.clone(), record.father_name.clone(), record.month.clone())
    }

    #[must_use]
    pub fn student(&self) -> StudentIdentity {
        StudentIdentity::new(self.student_name.clone(), self.father_name.clone())
    }

    #[must_use]
    pub fn normalized_month(&self) -> String {
        normalize_month_key(&self.month)
    }

    #[must_use]
    pub fn matches(&self, record: &FeeRecord) -> bool {
        record.student_name == self.student_name
            && record.father_name == self.father_name
            && normalize_month_key(&record.month) == self.normalized_month()
    }
}

impl PartialEq for RecordIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.student_name == other.student_name
            && self.father_name == other.father_name
            && self.normalized_month() == other.normalized_month()
    }
}

impl Eq for RecordIdentity {}

impl Hash for RecordIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.student_name.hash(state);
        self.father_name.hash(state);
        self.normalized_month().hash(state);
    }
}

impl Display for RecordIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (F: {}) for {}", self.student_name, self.father_name, self.month)
    }
}

pub(crate) fn normalize_month_key(month: &str) -> String {
    month.trim().to_lowercase()
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::FeeRecord;

/// Physical row of the first record. Row 1 is the header.
pub const FIRST_DATA_ROW: usize = 2;

/// 1-indexed physical row position, header included.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowNumber(pub usize);

impl RowNumber {
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(index + FIRST_DATA_ROW)
    }

    /// Zero-based position among data rows, or `None` for the header row.
    #[must_use]
    pub fn data_index(self) -> Option<usize> {
        self.0.checked_sub(FIRST_DATA_ROW)
    }
}

impl Display for RowNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve a logical record to its physical row.
///
/// Scans in storage order and returns the first row whose trimmed name and
/// father name are equal and whose trimmed month matches case-insensitively.
#[must_use]
pub fn find_row_number(
    rows: &[FeeRecord],
    student_name: &str,
    father_name: &str,
    month: &str,
) -> Option<RowNumber> {
    let student_name = student_name.trim();
    let father_name = father_name.trim();
    let month = month.trim().to_lowercase();

    rows.iter()
        .position(|row| {
            row.student_name.trim() == student_name
                && row.father_name.trim() == father_name
                && row.month.trim().to_lowercase() == month
        })
        .map(RowNumber::from_index)
}

use serde::{Deserialize, Serialize};

use crate::lookup::RowNumber;
use crate::{Column, FeeRecord};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("row {0} does not exist")]
    MissingRow(usize),
}

/// Row-oriented access to the backing fee table.
///
/// Rows are addressed by [`RowNumber`], which counts the header as row 1.
/// Every write keeps the [`Column::ALL`] order.
pub trait RecordStore {
    /// Read every data row in storage order. An empty table yields an empty vector.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the backing table cannot be read.
    fn read_all(&self) -> Result<Vec<FeeRecord>, StoreError>;

    /// Replace the whole table with `records`.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the table cannot be rewritten.
    fn write_all(&mut self, records: &[FeeRecord]) -> Result<(), StoreError>;

    /// Overwrite one data row in place.
    ///
    /// # Errors
    /// Returns [`StoreError::MissingRow`] when `row` is not a data row, or
    /// [`StoreError::Unavailable`] when the write fails.
    fn update_row(&mut self, row: RowNumber, record: &FeeRecord) -> Result<(), StoreError>;

    /// Remove one data row; later rows shift up by one.
    ///
    /// # Errors
    /// Returns [`StoreError::MissingRow`] when `row` is not a data row, or
    /// [`StoreError::Unavailable`] when the delete fails.
    fn delete_row(&mut self, row: RowNumber) -> Result<(), StoreError>;

    /// Append rows after the last data row in a single round trip.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the append fails.
    fn append_rows(&mut self, records: &[FeeRecord]) -> Result<(), StoreError>;

    /// Connectivity probe reporting the number of data rows.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] when the backing table is unreachable.
    fn probe(&self) -> Result<usize, StoreError> {
        Ok(self.read_all()?.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreHealth {
    pub connected: bool,
    pub record_count: usize,
    pub error: Option<String>,
}

/// In-memory sheet holding raw cells in wire order behind an implicit header row.
#[derive(Debug, Clone)]
pub struct MemorySheet {
    rows: Vec<[String; 7]>,
    available: bool,
    write_calls: usize,
}

impl Default for MemorySheet {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySheet {
    #[must_use]
    pub fn new() -> Self {
        Self { rows: Vec::new(), available: true, write_calls: 0 }
    }

    #[must_use]
    pub fn with_records(records: &[FeeRecord]) -> Self {
        Self { rows: records.iter().map(FeeRecord::to_row).collect(), ..Self::new() }
    }

    /// Simulate the backend going offline or coming back.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Header row followed by data rows, as a sheet client would see them.
    #[must_use]
    pub fn physical_rows(&self) -> Vec<Vec<String>> {
        std::iter::once(Column::headers())
            .chain(self.rows.iter().map(|row| row.to_vec()))
            .collect()
    }

    /// Number of write round trips issued so far.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable("sheet is offline".to_string()))
        }
    }

    fn begin_write(&mut self) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.write_calls += 1;
        Ok(())
    }

    fn data_index(&self, row: RowNumber) -> Result<usize, StoreError> {
        row.data_index().filter(|index| *index < self.rows.len()).ok_or(StoreError::MissingRow(row.0))
    }
}

impl RecordStore for MemorySheet {
    fn read_all(&self) -> Result<Vec<FeeRecord>, StoreError> {
        self.ensure_available()?;
        Ok(self.rows.iter().map(|row| FeeRecord::from_row(row)).collect())
    }

    fn write_all(&mut self, records: &[FeeRecord]) -> Result<(), StoreError> {
        self.begin_write()?;
        self.rows = records.iter().map(FeeRecord::to_row).collect();
        Ok(())
    }

    fn update_row(&mut self, row: RowNumber, record: &FeeRecord) -> Result<(), StoreError> {
        self.begin_write()?;
        let index = self.data_index(row)?;
        self.rows[index] = record.to_row();
        Ok(())
    }

    fn delete_row(&mut self, row: RowNumber) -> Result<(), StoreError> {
        self.begin_write()?;
        let index = self.data_index(row)?;
        self.rows.remove(index);
        Ok(())
    }

    fn append_rows(&mut self, records: &[FeeRecord]) -> Result<(), StoreError> {
        self.begin_write()?;
        self.rows.extend(records.iter().map(FeeRecord::to_row));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeeStatus;

    fn record(name: &str, month: &str) -> FeeRecord {
        FeeRecord {
            student_name: name.to_string(),
            father_name: "Father".to_string(),
            month: month.to_string(),
            fee_status: FeeStatus::NotPaid,
            ..FeeRecord::default()
        }
    }

    fn read(sheet: &MemorySheet) -> Vec<FeeRecord> {
        match sheet.read_all() {
            Ok(records) => records,
            Err(err) => panic!("failed to read sheet: {err}"),
        }
    }

    #[test]
    fn physical_rows_start_with_wire_header() {
        let sheet = MemorySheet::with_records(&[record("A", "January 2026")]);
        let rows = sheet.physical_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], Column::headers());
        assert_eq!(rows[1][1], "A");
    }

    #[test]
    fn delete_shifts_following_rows_up() {
        let mut sheet = MemorySheet::with_records(&[
            record("A", "January 2026"),
            record("B", "January 2026"),
            record("C", "January 2026"),
        ]);
        if let Err(err) = sheet.delete_row(RowNumber(3)) {
            panic!("delete failed: {err}");
        }
        let names = read(&sheet).into_iter().map(|r| r.student_name).collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn header_and_out_of_range_rows_are_rejected() {
        let mut sheet = MemorySheet::with_records(&[record("A", "January 2026")]);
        assert_eq!(sheet.delete_row(RowNumber(1)), Err(StoreError::MissingRow(1)));
        assert_eq!(
            sheet.update_row(RowNumber(3), &record("B", "January 2026")),
            Err(StoreError::MissingRow(3))
        );
        assert_eq!(read(&sheet).len(), 1);
    }

    #[test]
    fn offline_sheet_fails_reads_and_writes() {
        let mut sheet = MemorySheet::new();
        sheet.set_available(false);
        assert!(matches!(sheet.read_all(), Err(StoreError::Unavailable(_))));
        assert!(matches!(sheet.probe(), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            sheet.append_rows(&[record("A", "January 2026")]),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(sheet.write_calls(), 0);
    }

    #[test]
    fn append_is_one_round_trip() {
        let mut sheet = MemorySheet::new();
        let batch = [record("A", "January 2026"), record("B", "January 2026")];
        if let Err(err) = sheet.append_rows(&batch) {
            panic!("append failed: {err}");
        }
        assert_eq!(sheet.write_calls(), 1);
        assert_eq!(sheet.probe(), Ok(2));
    }
}

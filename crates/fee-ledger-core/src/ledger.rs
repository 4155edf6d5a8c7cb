use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::aggregate::{
    self, DefaulterReport, RecordListing, RecordQuery, StudentProfile, Summary, UniqueStudent,
};
use crate::convert::{records_to_horizontal, ExportFilter, Table};
use crate::lookup::{find_row_number, RowNumber};
use crate::store::{RecordStore, StoreHealth};
use crate::{FeeRecord, FeeStatus, LedgerError, NewRecord, RecordIdentity, StudentIdentity};

/// Bulk-add keeps at most this many skip reasons in its report.
pub const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct BulkAddReport {
    pub added: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QuickMarkResult {
    pub record: FeeRecord,
    pub receipt_number: String,
}

/// Replacement profile fields written to every record of one student.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mobile_number: String,
}

/// Fee ledger operations over one explicitly constructed store.
///
/// Reads degrade to empty results when the store cannot be read; use
/// [`FeeLedger::health`] to tell an empty ledger from an unreachable one.
/// Mutations read the full table first and fail with
/// [`LedgerError::StoreUnavailable`] if that read fails. Each mutation issues
/// at most one store write.
#[derive(Debug)]
pub struct FeeLedger<S> {
    store: S,
}

impl<S: RecordStore> FeeLedger<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    fn read_or_empty(&self, operation: &str) -> Vec<FeeRecord> {
        match self.store.read_all() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("{operation}: store read failed, returning empty result: {err}");
                Vec::new()
            }
        }
    }

    fn read_for_write(&self) -> Result<Vec<FeeRecord>, LedgerError> {
        Ok(self.store.read_all()?)
    }

    #[must_use]
    pub fn list_records(&self, query: &RecordQuery) -> RecordListing {
        aggregate::list_records(&self.read_or_empty("list records"), query)
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        aggregate::summarize(&self.read_or_empty("summary"))
    }

    #[must_use]
    pub fn unique_students(&self) -> Vec<UniqueStudent> {
        aggregate::unique_students(&self.read_or_empty("unique students"))
    }

    #[must_use]
    pub fn defaulters(&self, min_months: usize) -> DefaulterReport {
        aggregate::defaulters(&self.read_or_empty("defaulters"), min_months)
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] when the student has no records.
    pub fn student_profile(&self, student: &StudentIdentity) -> Result<StudentProfile, LedgerError> {
        aggregate::student_profile(&self.read_or_empty("student profile"), student)
    }

    /// Profile of the student holding `receipt`, matched case-insensitively.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] when no record carries the receipt.
    pub fn student_profile_by_receipt(&self, receipt: &str) -> Result<StudentProfile, LedgerError> {
        let records = self.read_or_empty("student profile by receipt");
        let wanted = receipt.trim().to_lowercase();
        let holder = records
            .iter()
            .find(|record| !wanted.is_empty() && record.receipt_number.trim().to_lowercase() == wanted)
            .ok_or_else(|| LedgerError::NotFound(format!("receipt {} not found", receipt.trim())))?;
        aggregate::student_profile(&records, &holder.student())
    }

    /// Pivot the filtered records into the horizontal layout.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] when the filter leaves no records.
    pub fn export_horizontal(&self, filter: ExportFilter) -> Result<Table, LedgerError> {
        let records = self.read_or_empty("export");
        if !records.iter().any(|record| filter.matches(record)) {
            return Err(LedgerError::NotFound(filter.empty_message().to_string()));
        }
        Ok(records_to_horizontal(&records, filter))
    }

    /// Probe the store. Never fails; an unreachable store reports `connected: false`.
    #[must_use]
    pub fn health(&self) -> StoreHealth {
        match self.store.probe() {
            Ok(record_count) => StoreHealth { connected: true, record_count, error: None },
            Err(err) => StoreHealth { connected: false, record_count: 0, error: Some(err.to_string()) },
        }
    }

    /// # Errors
    /// Returns [`LedgerError::Validation`] for a missing name or month,
    /// [`LedgerError::DuplicateIdentity`] when the student already has a record
    /// for the month, [`LedgerError::DuplicateReceipt`] when a paid record
    /// already holds the receipt, or [`LedgerError::StoreUnavailable`].
    pub fn add_record(&mut self, new: NewRecord) -> Result<FeeRecord, LedgerError> {
        let record = new.into_record();
        if record.student_name.is_empty() || record.month.is_empty() {
            return Err(LedgerError::Validation(
                "student_name and month are required".to_string(),
            ));
        }

        let records = self.read_for_write()?;
        let identity = record.identity();
        if records.iter().any(|existing| identity.matches(existing)) {
            return Err(LedgerError::DuplicateIdentity(format!(
                "record already exists for {identity}"
            )));
        }
        if !record.receipt_number.is_empty()
            && receipt_held(&records, &record.receipt_number, None)
        {
            return Err(LedgerError::DuplicateReceipt(format!(
                "receipt {} already exists",
                record.receipt_number
            )));
        }

        self.store.append_rows(std::slice::from_ref(&record))?;
        Ok(record)
    }

    /// Set status and receipt of one record. Non-paid records always get an
    /// empty receipt.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`], [`LedgerError::DuplicateReceipt`]
    /// when another paid record holds the receipt, or
    /// [`LedgerError::StoreUnavailable`].
    pub fn update_record(
        &mut self,
        identity: &RecordIdentity,
        fee_status: FeeStatus,
        receipt_number: &str,
    ) -> Result<FeeRecord, LedgerError> {
        validate_identity(identity)?;
        let records = self.read_for_write()?;
        let (row, index) = locate(&records, identity)?;

        let receipt_number = receipt_number.trim();
        if fee_status.is_paid()
            && !receipt_number.is_empty()
            && receipt_held(&records, receipt_number, Some(index))
        {
            return Err(LedgerError::DuplicateReceipt(format!(
                "receipt {receipt_number} already exists for another record"
            )));
        }

        let mut updated = records[index].clone();
        updated.fee_status = fee_status;
        updated.receipt_number =
            if fee_status.is_paid() { receipt_number.to_string() } else { String::new() };
        self.store.update_row(row, &updated)?;
        Ok(updated)
    }

    /// Mark a record paid with the next `RCP-<MMYY>-<seq>` receipt for the
    /// month of `issued_at`.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] or [`LedgerError::StoreUnavailable`].
    pub fn quick_mark_paid(
        &mut self,
        identity: &RecordIdentity,
        issued_at: OffsetDateTime,
    ) -> Result<QuickMarkResult, LedgerError> {
        validate_identity(identity)?;
        let records = self.read_for_write()?;
        let (row, index) = locate(&records, identity)?;

        let receipt_number = next_receipt_number(&records, issued_at);
        let mut updated = records[index].clone();
        updated.fee_status = FeeStatus::Paid;
        updated.receipt_number.clone_from(&receipt_number);
        self.store.update_row(row, &updated)?;
        tracing::info!("marked {identity} paid with receipt {receipt_number}");
        Ok(QuickMarkResult { record: updated, receipt_number })
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] or [`LedgerError::StoreUnavailable`].
    pub fn delete_record(&mut self, identity: &RecordIdentity) -> Result<FeeRecord, LedgerError> {
        validate_identity(identity)?;
        let records = self.read_for_write()?;
        let (row, index) = locate(&records, identity)?;
        self.store.delete_row(row)?;
        Ok(records[index].clone())
    }

    /// Validate and append a batch in one write. Entries that are invalid or
    /// duplicate the table or earlier entries are skipped with a reason.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] for an empty batch,
    /// [`LedgerError::BatchRejected`] when every entry was skipped, or
    /// [`LedgerError::StoreUnavailable`].
    pub fn bulk_add(&mut self, entries: Vec<NewRecord>) -> Result<BulkAddReport, LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::Validation("empty records list".to_string()));
        }

        let existing = self.read_for_write()?;
        let mut identities = existing.iter().map(FeeRecord::identity).collect::<HashSet<_>>();
        let mut receipts = existing
            .iter()
            .filter(|record| record.is_paid())
            .map(|record| record.receipt_number.trim().to_lowercase())
            .filter(|receipt| !receipt.is_empty())
            .collect::<HashSet<_>>();

        let mut accepted = Vec::new();
        let mut errors = Vec::new();
        for (position, entry) in entries.into_iter().enumerate() {
            let row = position + 1;
            let record = entry.into_record();
            if record.student_name.is_empty() || record.month.is_empty() {
                errors.push(format!("Row {row}: Missing required fields"));
                continue;
            }
            if identities.contains(&record.identity()) {
                errors.push(format!(
                    "Row {row}: {} already has record for {}",
                    record.student_name, record.month
                ));
                continue;
            }
            let receipt = record.receipt_number.to_lowercase();
            if !receipt.is_empty() && receipts.contains(&receipt) {
                errors.push(format!("Row {row}: Receipt {} already exists", record.receipt_number));
                continue;
            }

            identities.insert(record.identity());
            if record.is_paid() && !receipt.is_empty() {
                receipts.insert(receipt);
            }
            accepted.push(record);
        }

        let skipped = errors.len();
        errors.truncate(MAX_REPORTED_ERRORS);
        let mut report = BulkAddReport { added: accepted.len(), skipped, errors, message: String::new() };

        if accepted.is_empty() {
            report.message = format!("No records added. {skipped} records skipped.");
            return Err(LedgerError::BatchRejected(report));
        }

        self.store.append_rows(&accepted)?;
        report.message = format!("Added {} records successfully!", report.added);
        if skipped > 0 {
            report.message.push_str(&format!(" ({skipped} skipped due to duplicates)"));
        }
        tracing::info!(added = report.added, skipped, "bulk add committed");
        Ok(report)
    }

    /// Rewrite id, name, father and mobile on every record of `student`.
    /// Returns the number of records touched.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] for an empty new name,
    /// [`LedgerError::NotFound`] when the student has no records, or
    /// [`LedgerError::StoreUnavailable`].
    pub fn update_student_profile(
        &mut self,
        student: &StudentIdentity,
        update: ProfileUpdate,
    ) -> Result<usize, LedgerError> {
        let student = StudentIdentity::new(student.student_name.trim(), student.father_name.trim());
        let student_name = update.student_name.trim();
        if student_name.is_empty() {
            return Err(LedgerError::Validation("student name is required".to_string()));
        }

        let mut records = self.read_for_write()?;
        let mut touched = 0;
        for record in records.iter_mut().filter(|record| student.matches(record)) {
            record.student_id = update.student_id.trim().to_string();
            record.student_name = student_name.to_string();
            record.father_name = update.father_name.trim().to_string();
            record.mobile_number = update.mobile_number.trim().to_string();
            touched += 1;
        }
        if touched == 0 {
            return Err(LedgerError::NotFound(format!("no records for student {student}")));
        }

        self.store.write_all(&records)?;
        Ok(touched)
    }

    /// Replace the whole table, as an import commit does. Returns the row count.
    ///
    /// # Errors
    /// Returns [`LedgerError::StoreUnavailable`] when the write fails.
    pub fn replace_all(&mut self, records: &[FeeRecord]) -> Result<usize, LedgerError> {
        self.store.write_all(records)?;
        tracing::info!(rows = records.len(), "replaced fee table");
        Ok(records.len())
    }
}

fn validate_identity(identity: &RecordIdentity) -> Result<(), LedgerError> {
    if identity.student_name.trim().is_empty() || identity.month.trim().is_empty() {
        return Err(LedgerError::Validation("student_name and month are required".to_string()));
    }
    Ok(())
}

fn locate(records: &[FeeRecord], identity: &RecordIdentity) -> Result<(RowNumber, usize), LedgerError> {
    find_row_number(records, &identity.student_name, &identity.father_name, &identity.month)
        .and_then(|row| row.data_index().map(|index| (row, index)))
        .ok_or_else(|| LedgerError::NotFound(format!("record not found for {identity}")))
}

fn receipt_held(records: &[FeeRecord], receipt: &str, exclude: Option<usize>) -> bool {
    let wanted = receipt.trim().to_lowercase();
    records.iter().enumerate().any(|(index, record)| {
        Some(index) != exclude
            && record.is_paid()
            && record.receipt_number.trim().to_lowercase() == wanted
    })
}

fn next_receipt_number(records: &[FeeRecord], issued_at: OffsetDateTime) -> String {
    let prefix = format!(
        "RCP-{:02}{:02}-",
        u8::from(issued_at.month()),
        issued_at.year().rem_euclid(100)
    );
    let highest = records
        .iter()
        .filter_map(|record| record.receipt_number.strip_prefix(prefix.as_str()))
        .filter_map(|suffix| suffix.trim().parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", highest + 1)
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fee_ledger_core::sample::sample_roster;
use fee_ledger_core::style::style_table;
use fee_ledger_core::{
    import_table, BulkAddReport, DefaulterReport, ExportFilter, FeeLedger, FeeRecord, FeeStatus,
    LedgerError, NewRecord, ProfileUpdate, QuickMarkResult, RecordIdentity, RecordListing,
    RecordQuery, StoreHealth, StudentIdentity, StudentProfile, Summary, Table, UniqueStudent,
};
use fee_ledger_store_sqlite::{IntegrityReport, SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

mod tabular;

pub use tabular::{read_table, render_csv, write_csv};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Student name and father name lead every exported row.
const PIVOT_INFO_COLUMNS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRecordRequest {
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    pub month: String,
    pub fee_status: FeeStatus,
    #[serde(default)]
    pub receipt_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuickMarkRequest {
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    pub month: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub issued_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkAddRequest {
    #[serde(default)]
    pub records: Vec<NewRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateProfileRequest {
    pub original_name: String,
    #[serde(default)]
    pub original_father: String,
    #[serde(default)]
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mobile_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdateResult {
    pub updated: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportReport {
    pub layout: String,
    pub total: usize,
    pub replaced: bool,
    pub records: Vec<FeeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportResult {
    pub path: String,
    pub filter: String,
    pub students: usize,
    pub months: usize,
    pub styles_path: Option<String>,
    pub styles_written: bool,
}

#[derive(Debug, Clone)]
pub struct FeeLedgerApi {
    db_path: PathBuf,
}

impl FeeLedgerApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_ready_store(&self) -> Result<SqliteStore, LedgerError> {
        let mut store = self
            .open_store()
            .map_err(|err| LedgerError::StoreUnavailable(format!("{err:#}")))?;
        store.migrate().map_err(|err| LedgerError::StoreUnavailable(format!("{err:#}")))?;
        Ok(store)
    }

    fn with_ledger<T>(
        &self,
        operation: impl FnOnce(&mut FeeLedger<SqliteStore>) -> Result<T, LedgerError>,
    ) -> Result<T> {
        let mut ledger = FeeLedger::new(self.open_ready_store()?);
        let outcome = operation(&mut ledger);
        let closed = ledger.into_store().close();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                inferred_from_legacy: before.inferred_from_legacy,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            inferred_from_legacy: before.inferred_from_legacy,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Run `PRAGMA quick_check` and report schema and row counts.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or checked.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let store = self.open_store()?;
        store.integrity_check()
    }

    /// Copy the database to `out_file` with the online backup API.
    ///
    /// # Errors
    /// Returns an error when the source cannot be opened or the copy fails.
    pub fn backup(&self, out_file: &Path) -> Result<()> {
        let store = self.open_store()?;
        store.backup_database(out_file)
    }

    /// Probe the store. Never fails: an unreachable database is reported as
    /// `connected: false`.
    #[must_use]
    pub fn health(&self) -> StoreHealth {
        match self.open_ready_store() {
            Ok(store) => {
                let ledger = FeeLedger::new(store);
                let health = ledger.health();
                if let Err(err) = ledger.into_store().close() {
                    tracing::warn!("health probe: failed to close store: {err:#}");
                }
                health
            }
            Err(err) => StoreHealth { connected: false, record_count: 0, error: Some(err.to_string()) },
        }
    }

    /// # Errors
    /// Returns an error when the store cannot be opened.
    pub fn list_records(&self, query: &RecordQuery) -> Result<RecordListing> {
        self.with_ledger(|ledger| Ok(ledger.list_records(query)))
    }

    /// # Errors
    /// Returns an error when the store cannot be opened.
    pub fn summary(&self) -> Result<Summary> {
        self.with_ledger(|ledger| Ok(ledger.summary()))
    }

    /// # Errors
    /// Returns [`LedgerError::Validation`], [`LedgerError::DuplicateIdentity`] or
    /// [`LedgerError::DuplicateReceipt`] for rejected input, or a store error.
    pub fn add_record(&self, input: NewRecord) -> Result<FeeRecord> {
        self.with_ledger(|ledger| ledger.add_record(input))
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] for an unknown record,
    /// [`LedgerError::DuplicateReceipt`], or a store error.
    pub fn update_record(&self, input: UpdateRecordRequest) -> Result<FeeRecord> {
        let identity = RecordIdentity::new(input.student_name, input.father_name, input.month);
        self.with_ledger(|ledger| ledger.update_record(&identity, input.fee_status, &input.receipt_number))
    }

    /// Mark paid with a generated receipt. `issued_at` defaults to now.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] for an unknown record, or a store error.
    pub fn quick_mark_paid(&self, input: QuickMarkRequest) -> Result<QuickMarkResult> {
        let identity = RecordIdentity::new(input.student_name, input.father_name, input.month);
        let issued_at = input.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
        self.with_ledger(|ledger| ledger.quick_mark_paid(&identity, issued_at))
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] for an unknown record, or a store error.
    pub fn delete_record(&self, identity: &RecordIdentity) -> Result<FeeRecord> {
        self.with_ledger(|ledger| ledger.delete_record(identity))
    }

    /// # Errors
    /// Returns [`LedgerError::Validation`] for an empty batch,
    /// [`LedgerError::BatchRejected`] when nothing was added, or a store error.
    pub fn bulk_add(&self, input: BulkAddRequest) -> Result<BulkAddReport> {
        self.with_ledger(|ledger| ledger.bulk_add(input.records))
    }

    /// # Errors
    /// Returns an error when the store cannot be opened.
    pub fn unique_students(&self) -> Result<Vec<UniqueStudent>> {
        self.with_ledger(|ledger| Ok(ledger.unique_students()))
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] when the student has no records.
    pub fn student_profile(&self, student: &StudentIdentity) -> Result<StudentProfile> {
        self.with_ledger(|ledger| ledger.student_profile(student))
    }

    /// # Errors
    /// Returns [`LedgerError::NotFound`] when no record carries the receipt.
    pub fn student_profile_by_receipt(&self, receipt: &str) -> Result<StudentProfile> {
        self.with_ledger(|ledger| ledger.student_profile_by_receipt(receipt))
    }

    /// # Errors
    /// Returns [`LedgerError::Validation`] for an empty new name,
    /// [`LedgerError::NotFound`] for an unknown student, or a store error.
    pub fn update_student_profile(&self, input: UpdateProfileRequest) -> Result<ProfileUpdateResult> {
        let student = StudentIdentity::new(input.original_name, input.original_father);
        let update = ProfileUpdate {
            student_id: input.student_id,
            student_name: input.student_name,
            father_name: input.father_name,
            mobile_number: input.mobile_number,
        };
        let updated = self.with_ledger(|ledger| ledger.update_student_profile(&student, update))?;
        Ok(ProfileUpdateResult { updated, message: format!("Updated {updated} records") })
    }

    /// # Errors
    /// Returns an error when the store cannot be opened.
    pub fn defaulters(&self, min_months: usize) -> Result<DefaulterReport> {
        self.with_ledger(|ledger| Ok(ledger.defaulters(min_months)))
    }

    /// Pivot records into the horizontal layout.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] when the filter leaves no records.
    pub fn export_horizontal(&self, filter: ExportFilter) -> Result<Table> {
        self.with_ledger(|ledger| ledger.export_horizontal(filter))
    }

    /// Write the horizontal pivot as CSV, then optionally a style sheet beside
    /// it. The style sheet is best effort and never fails the export.
    ///
    /// # Errors
    /// Returns [`LedgerError::NotFound`] when the filter leaves no records, or
    /// an error when the CSV file cannot be written.
    pub fn export_horizontal_csv(
        &self,
        filter: ExportFilter,
        out_file: &Path,
        styles_out: Option<&Path>,
    ) -> Result<ExportResult> {
        let table = self.export_horizontal(filter)?;
        write_csv(&table, out_file)?;

        let styles_written = match styles_out {
            Some(path) => match write_styles(&table, path) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!("export styling skipped for {}: {err:#}", path.display());
                    false
                }
            },
            None => false,
        };

        Ok(ExportResult {
            path: out_file.display().to_string(),
            filter: filter.as_str().to_string(),
            students: table.rows.len(),
            months: table.headers.len().saturating_sub(PIVOT_INFO_COLUMNS),
            styles_path: styles_out.map(|path| path.display().to_string()),
            styles_written,
        })
    }

    /// Parse a csv or spreadsheet file and, unless `dry_run`, replace the table.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] for an unsupported file or one with
    /// no records, or an error when reading or storing fails.
    pub fn import_file(&self, path: &Path, dry_run: bool) -> Result<ImportReport> {
        let table = read_table(path)?;
        self.import_snapshot(&table, dry_run)
    }

    /// Parse an in-memory table and, unless `dry_run`, replace the table.
    ///
    /// # Errors
    /// Returns [`LedgerError::Validation`] when no records were parsed, or a
    /// store error.
    pub fn import_snapshot(&self, table: &Table, dry_run: bool) -> Result<ImportReport> {
        let parsed = import_table(table);
        if parsed.records.is_empty() {
            return Err(LedgerError::Validation("no fee records found in import".to_string()).into());
        }

        let replaced = if dry_run {
            false
        } else {
            self.with_ledger(|ledger| ledger.replace_all(&parsed.records))?;
            true
        };
        tracing::info!(
            layout = parsed.layout.as_str(),
            records = parsed.records.len(),
            replaced,
            "import parsed"
        );
        Ok(ImportReport {
            layout: parsed.layout.as_str().to_string(),
            total: parsed.records.len(),
            replaced,
            records: parsed.records,
        })
    }

    /// Bulk-add the demo roster.
    ///
    /// # Errors
    /// Returns [`LedgerError::BatchRejected`] when every sample row already
    /// exists, or a store error.
    pub fn seed_sample(&self) -> Result<BulkAddReport> {
        self.with_ledger(|ledger| ledger.bulk_add(sample_roster()))
    }
}

fn write_styles(table: &Table, out_file: &Path) -> Result<()> {
    if let Some(parent) = out_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory for {}", out_file.display()))?;
    }
    let payload = serde_json::to_string_pretty(&style_table(table))
        .context("failed to serialize style sheet")?;
    fs::write(out_file, payload)
        .with_context(|| format!("failed to write style sheet {}", out_file.display()))
}

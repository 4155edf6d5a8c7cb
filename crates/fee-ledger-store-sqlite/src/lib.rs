use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fee_ledger_core::{FeeRecord, FeeStatus, RecordStore, RowNumber, StoreError};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS fee_rows (
  row_id INTEGER PRIMARY KEY AUTOINCREMENT,
  student_id TEXT NOT NULL DEFAULT '',
  student_name TEXT NOT NULL,
  father_name TEXT NOT NULL DEFAULT '',
  mobile_number TEXT NOT NULL DEFAULT '',
  month TEXT NOT NULL,
  fee_status TEXT NOT NULL CHECK (fee_status IN ('Paid','Not Paid')),
  receipt_number TEXT NOT NULL DEFAULT ''
);
";

const MIGRATION_002_SQL: &str = r"
ALTER TABLE fee_rows ADD COLUMN updated_at TEXT;

CREATE INDEX IF NOT EXISTS idx_fee_rows_student ON fee_rows(student_name, father_name);
CREATE INDEX IF NOT EXISTS idx_fee_rows_receipt ON fee_rows(receipt_number);
";

const SELECT_ROWS_SQL: &str = r"
SELECT student_id, student_name, father_name, mobile_number, month, fee_status, receipt_number
FROM fee_rows
ORDER BY row_id ASC
";

const INSERT_ROW_SQL: &str = r"
INSERT INTO fee_rows(
  student_id, student_name, father_name, mobile_number, month, fee_status, receipt_number, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
";

/// Fee table persisted in `SQLite`. Physical row numbers follow `row_id`
/// order with the header counted as row 1.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub row_count: usize,
    pub schema_status: SchemaStatus,
}

impl SqliteStore {
    /// Open a SQLite-backed fee table and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Disconnect explicitly, surfacing any error from the final close.
    ///
    /// # Errors
    /// Returns an error when `SQLite` refuses to close the connection.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err).context("failed to close sqlite database")
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let (current_version, inferred_from_legacy) = detect_effective_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            inferred_from_legacy,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            version = self.bootstrap_schema_version()?;
        }

        if version < 2 {
            self.apply_migration_2()?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    fn bootstrap_schema_version(&self) -> Result<i64> {
        if !table_exists(&self.conn, "fee_rows")? {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            record_schema_version(&self.conn, 1)?;
            return Ok(1);
        }

        record_schema_version(&self.conn, 1)?;
        if table_has_column(&self.conn, "fee_rows", "updated_at")? {
            // Table already carries v2 columns but no migration records.
            record_schema_version(&self.conn, 2)?;
            return Ok(2);
        }
        Ok(1)
    }

    fn apply_migration_2(&mut self) -> Result<()> {
        if table_has_column(&self.conn, "fee_rows", "updated_at")? {
            record_schema_version(&self.conn, 2)?;
            return Ok(());
        }

        let tx = self.conn.transaction().context("failed to start migration v2 transaction")?;
        tx.execute_batch(MIGRATION_002_SQL).context("failed to apply migration v2")?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![2_i64, now_rfc3339()?],
        )
        .context("failed to record migration version 2")?;
        tx.commit().context("failed to commit migration v2")?;
        Ok(())
    }

    /// Load every fee row in physical order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read from `SQLite`.
    pub fn list_rows(&self) -> Result<Vec<FeeRecord>> {
        let mut stmt = self.conn.prepare(SELECT_ROWS_SQL).context("failed to prepare fee row query")?;
        let rows = stmt.query_map([], |row| {
            Ok(FeeRecord {
                student_id: row.get(0)?,
                student_name: row.get(1)?,
                father_name: row.get(2)?,
                mobile_number: row.get(3)?,
                month: row.get(4)?,
                fee_status: FeeStatus::from_text(&row.get::<_, String>(5)?),
                receipt_number: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed to decode fee row")?);
        }
        Ok(records)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn row_count(&self) -> Result<usize> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM fee_rows", [], |row| row.get::<_, i64>(0))
            .context("failed to count fee rows")?;
        usize::try_from(count).context("fee row count out of range")
    }

    /// Replace every row in one transaction.
    ///
    /// # Errors
    /// Returns an error when any statement fails; the table is left unchanged.
    pub fn replace_rows(&mut self, records: &[FeeRecord]) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("failed to start replace transaction")?;
        tx.execute("DELETE FROM fee_rows", []).context("failed to clear fee rows")?;
        for record in records {
            insert_row(&tx, record, &now)?;
        }
        tx.commit().context("failed to commit replace transaction")?;
        Ok(())
    }

    /// Append rows after the current last row in one transaction.
    ///
    /// # Errors
    /// Returns an error when any insert fails; nothing is appended.
    pub fn append(&mut self, records: &[FeeRecord]) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("failed to start append transaction")?;
        for record in records {
            insert_row(&tx, record, &now)?;
        }
        tx.commit().context("failed to commit append transaction")?;
        Ok(())
    }

    /// Overwrite the row at `row`. Returns `false` when no such data row exists.
    ///
    /// # Errors
    /// Returns an error when the lookup or update statement fails.
    pub fn overwrite_row(&mut self, row: RowNumber, record: &FeeRecord) -> Result<bool> {
        let Some(row_id) = self.row_id_at(row)? else {
            return Ok(false);
        };
        self.conn
            .execute(
                "UPDATE fee_rows
                 SET student_id = ?1, student_name = ?2, father_name = ?3, mobile_number = ?4,
                     month = ?5, fee_status = ?6, receipt_number = ?7, updated_at = ?8
                 WHERE row_id = ?9",
                params![
                    record.student_id,
                    record.student_name,
                    record.father_name,
                    record.mobile_number,
                    record.month,
                    record.fee_status.as_str(),
                    record.receipt_number,
                    now_rfc3339()?,
                    row_id,
                ],
            )
            .with_context(|| format!("failed to update fee row {row}"))?;
        Ok(true)
    }

    /// Remove the row at `row`. Returns `false` when no such data row exists.
    ///
    /// # Errors
    /// Returns an error when the lookup or delete statement fails.
    pub fn remove_row(&mut self, row: RowNumber) -> Result<bool> {
        let Some(row_id) = self.row_id_at(row)? else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM fee_rows WHERE row_id = ?1", params![row_id])
            .with_context(|| format!("failed to delete fee row {row}"))?;
        Ok(true)
    }

    fn row_id_at(&self, row: RowNumber) -> Result<Option<i64>> {
        let Some(index) = row.data_index() else {
            return Ok(None);
        };
        let offset = i64::try_from(index).context("row number out of range")?;
        self.conn
            .query_row(
                "SELECT row_id FROM fee_rows ORDER BY row_id ASC LIMIT 1 OFFSET ?1",
                params![offset],
                |found| found.get::<_, i64>(0),
            )
            .optional()
            .with_context(|| format!("failed to resolve fee row {row}"))
    }

    /// Write a consistent `SQLite` backup of this database to `out_file`.
    ///
    /// # Errors
    /// Returns an error when the parent directory cannot be created or the backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Run quick-check and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        let row_count =
            if table_exists(&self.conn, "fee_rows")? { self.row_count()? } else { 0 };

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            row_count,
            schema_status,
        })
    }
}

fn unavailable(err: &anyhow::Error) -> StoreError {
    tracing::warn!("sqlite fee store failure: {err:#}");
    StoreError::Unavailable(format!("{err:#}"))
}

impl RecordStore for SqliteStore {
    fn read_all(&self) -> Result<Vec<FeeRecord>, StoreError> {
        self.list_rows().map_err(|err| unavailable(&err))
    }

    fn write_all(&mut self, records: &[FeeRecord]) -> Result<(), StoreError> {
        self.replace_rows(records).map_err(|err| unavailable(&err))
    }

    fn update_row(&mut self, row: RowNumber, record: &FeeRecord) -> Result<(), StoreError> {
        match self.overwrite_row(row, record) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::MissingRow(row.0)),
            Err(err) => Err(unavailable(&err)),
        }
    }

    fn delete_row(&mut self, row: RowNumber) -> Result<(), StoreError> {
        match self.remove_row(row) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::MissingRow(row.0)),
            Err(err) => Err(unavailable(&err)),
        }
    }

    fn append_rows(&mut self, records: &[FeeRecord]) -> Result<(), StoreError> {
        self.append(records).map_err(|err| unavailable(&err))
    }

    fn probe(&self) -> Result<usize, StoreError> {
        self.row_count().map_err(|err| unavailable(&err))
    }
}

fn insert_row(tx: &rusqlite::Transaction<'_>, record: &FeeRecord, now: &str) -> Result<()> {
    tx.execute(
        INSERT_ROW_SQL,
        params![
            record.student_id,
            record.student_name,
            record.father_name,
            record.mobile_number,
            record.month,
            record.fee_status.as_str(),
            record.receipt_number,
            now,
        ],
    )
    .with_context(|| format!("failed to insert fee row for {}", record.identity()))?;
    Ok(())
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("failed to inspect table_info for {table}"))?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }

    Ok(false)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn detect_effective_schema_version(conn: &Connection) -> Result<(i64, bool)> {
    let recorded = current_schema_version(conn)?;
    if recorded > 0 {
        return Ok((recorded, false));
    }

    if !table_exists(conn, "fee_rows")? {
        return Ok((0, false));
    }

    if table_has_column(conn, "fee_rows", "updated_at")? {
        return Ok((2, true));
    }

    Ok((1, true))
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

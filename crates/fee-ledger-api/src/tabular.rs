//! Spreadsheet and CSV files to and from [`Table`] snapshots.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use fee_ledger_core::{LedgerError, Table};
use time::macros::format_description;
use time::{Date, Duration, Month};

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Read the first worksheet (or the CSV body) with its first row as headers.
///
/// # Errors
/// Returns [`LedgerError::Validation`] for an unsupported extension, or an
/// error when the file cannot be opened or parsed.
pub fn read_table(path: &Path) -> Result<Table> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if extension == "csv" {
        read_csv(path)
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        read_workbook(path)
    } else {
        Err(LedgerError::Validation(format!(
            "unsupported file type `{extension}`; expected csv, xlsx, xlsm, xls, xlsb or ods"
        ))
        .into())
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open csv file {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read csv headers from {}", path.display()))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to read csv row from {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table::new(headers, rows))
}

fn read_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::Validation(format!("workbook {} has no sheets", path.display())))?;
    let range = workbook
        .worksheet_range(&first_sheet)
        .with_context(|| format!("failed to read worksheet `{first_sheet}`"))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default().into_iter().map(|h| h.trim().to_string()).collect();
    Ok(Table::new(headers, rows.collect()))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTimeIso(s) => iso_month(s).unwrap_or_else(|| s.clone()),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => format!("#ERROR: {e:?}"),
        Data::DateTime(dt) => {
            excel_serial_month(dt.as_f64()).unwrap_or_else(|| dt.as_f64().to_string())
        }
    }
}

/// `"<Month> <year>"` for an Excel day serial (1900 date system).
fn excel_serial_month(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let days = serial.floor() as i64;
    let epoch = Date::from_calendar_date(1899, Month::December, 30).ok()?;
    let date = epoch.checked_add(Duration::days(days))?;
    Some(format!("{} {}", date.month(), date.year()))
}

fn iso_month(value: &str) -> Option<String> {
    let day = value.get(..10)?;
    let date = Date::parse(day, format_description!("[year]-[month]-[day]")).ok()?;
    Some(format!("{} {}", date.month(), date.year()))
}

/// Render a table as CSV text with a header row.
///
/// # Errors
/// Returns an error when CSV encoding fails.
pub fn render_csv(table: &Table) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer.write_record(&table.headers).context("failed to write csv header")?;
    for row in &table.rows {
        writer.write_record(row).context("failed to write csv row")?;
    }
    let bytes = writer.into_inner().context("failed to flush csv buffer")?;
    String::from_utf8(bytes).context("csv output is not valid UTF-8")
}

/// Write a table as a CSV file, creating parent directories as needed.
///
/// # Errors
/// Returns an error when the file cannot be created or written.
pub fn write_csv(table: &Table, out_file: &Path) -> Result<()> {
    if let Some(parent) = out_file.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create parent directory for export file {}", out_file.display())
        })?;
    }
    let file = File::create(out_file)
        .with_context(|| format!("failed to create export file {}", out_file.display()))?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(BufWriter::new(file));
    writer.write_record(&table.headers).context("failed to write csv header")?;
    for row in &table.rows {
        writer.write_record(row).context("failed to write csv row")?;
    }
    writer.flush().with_context(|| format!("failed to flush export file {}", out_file.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excel_serials_become_month_names() {
        assert_eq!(excel_serial_month(46023.0).as_deref(), Some("January 2026"));
        assert_eq!(excel_serial_month(46022.5).as_deref(), Some("December 2025"));
        assert_eq!(excel_serial_month(-3.0), None);
    }

    #[test]
    fn iso_dates_become_month_names() {
        assert_eq!(iso_month("2026-02-01T00:00:00").as_deref(), Some("February 2026"));
        assert_eq!(iso_month("Jan-26"), None);
    }

    #[test]
    fn csv_rendering_quotes_cells_with_commas() -> Result<()> {
        let table = Table::new(
            vec!["Student Name".to_string(), "Father Name".to_string()],
            vec![vec!["Patel, Aarav".to_string(), "Rajesh".to_string()]],
        );
        assert_eq!(render_csv(&table)?, "Student Name,Father Name\n\"Patel, Aarav\",Rajesh\n");
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_a_validation_error() {
        let result = read_table(Path::new("/tmp/roster.pdf"));
        let kind = result.err().and_then(|err| err.downcast_ref::<LedgerError>().map(LedgerError::kind));
        assert_eq!(kind, Some("validation"));
    }

    #[test]
    fn missing_workbook_is_an_error() {
        assert!(read_table(Path::new("/nonexistent/roster.xlsx")).is_err());
    }
}

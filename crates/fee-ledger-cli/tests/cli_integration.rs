use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::JSONSchema;
use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}-{}", std::process::id()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_fees<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_fees"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute fees binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_fees(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "fees command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse JSON file {}: {err}", path.display()))
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

#[test]
fn cli_migrate_reports_contract_and_schema() {
    let dir = unique_temp_dir("fees-migrate");
    let db = dir.join("fees.sqlite3");

    let planned = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    validate_schema("migrate_result.schema.json", &planned);
    assert_eq!(as_str(&planned, "contract_version"), "cli.v1");
    assert_eq!(planned.get("dry_run").and_then(Value::as_bool), Some(true));

    let applied = run_json(["--db", path_str(&db), "db", "migrate"]);
    validate_schema("migrate_result.schema.json", &applied);
    assert_eq!(applied.get("up_to_date").and_then(Value::as_bool), Some(true));

    let status = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(status.get("up_to_date").and_then(Value::as_bool), Some(true));
    assert_eq!(as_u64(&status, "current_version"), as_u64(&status, "target_version"));

    let integrity = run_json(["--db", path_str(&db), "db", "integrity-check"]);
    assert_eq!(integrity.get("quick_check_ok").and_then(Value::as_bool), Some(true));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_seed_summary_and_defaulters() {
    let dir = unique_temp_dir("fees-seed");
    let db = dir.join("fees.sqlite3");

    let seeded = run_json(["--db", path_str(&db), "seed"]);
    validate_schema("bulk_add_report.schema.json", &seeded);
    assert_eq!(as_u64(&seeded, "added"), 20);

    let summary = run_json(["--db", path_str(&db), "summary"]);
    validate_schema("summary.schema.json", &summary);
    assert_eq!(as_u64(&summary, "total"), 20);
    assert_eq!(as_u64(&summary, "paid"), 14);
    assert_eq!(as_u64(&summary, "unpaid"), 6);
    assert_eq!(as_u64(&summary, "total_students"), 10);

    let report = run_json(["--db", path_str(&db), "defaulters", "--min-months", "2"]);
    validate_schema("defaulter_report.schema.json", &report);
    assert_eq!(as_u64(&report, "total"), 1);
    let first = report
        .get("defaulters")
        .and_then(|list| list.get(0))
        .unwrap_or_else(|| panic!("missing first defaulter in payload: {report}"));
    assert_eq!(as_str(first, "student_name"), "Sneha Verma");
    assert_eq!(as_u64(first, "unpaid_count"), 2);

    let probe = run_json(["--db", path_str(&db), "probe"]);
    validate_schema("store_health.schema.json", &probe);
    assert_eq!(as_u64(&probe, "record_count"), 20);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_duplicate_add_fails_without_growing_table() {
    let dir = unique_temp_dir("fees-duplicate");
    let db = dir.join("fees.sqlite3");
    let add_args = [
        "--db",
        path_str(&db),
        "record",
        "add",
        "--name",
        "Raj",
        "--father",
        "Kumar",
        "--month",
        "January 2026",
    ];

    let added = run_json(add_args);
    assert_eq!(as_str(&added, "fee_status"), "Not Paid");

    let duplicate = run_fees(add_args);
    assert!(!duplicate.status.success(), "duplicate add should exit non-zero");
    let stderr = String::from_utf8_lossy(&duplicate.stderr);
    assert!(stderr.contains("duplicate record"), "unexpected stderr: {stderr}");

    let listing = run_json(["--db", path_str(&db), "record", "list"]);
    assert_eq!(as_u64(&listing, "total"), 1);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_mark_paid_then_lookup_by_receipt() {
    let dir = unique_temp_dir("fees-mark-paid");
    let db = dir.join("fees.sqlite3");
    run_json(["--db", path_str(&db), "seed"]);

    let marked = run_json([
        "--db",
        path_str(&db),
        "record",
        "mark-paid",
        "--name",
        "Priya Sharma",
        "--father",
        "Suresh Sharma",
        "--month",
        "January 2026",
        "--issued-at",
        "2026-01-05T09:00:00Z",
    ]);
    validate_schema("quick_mark_result.schema.json", &marked);
    assert_eq!(as_str(&marked, "receipt_number"), "RCP-0126-001");

    let profile = run_json(["--db", path_str(&db), "student", "by-receipt", "--receipt", "RCP-0126-001"]);
    assert_eq!(as_str(&profile, "student_name"), "Priya Sharma");
    assert_eq!(as_u64(&profile, "paid_months"), 2);

    let renamed = run_json([
        "--db",
        path_str(&db),
        "student",
        "update-profile",
        "--name",
        "Priya Sharma",
        "--father",
        "Suresh Sharma",
        "--new-name",
        "Priya S. Sharma",
        "--new-father",
        "Suresh Sharma",
        "--student-id",
        "VK002",
    ]);
    assert_eq!(as_u64(&renamed, "updated"), 2);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_export_then_import_round_trip() {
    let dir = unique_temp_dir("fees-export");
    let db = dir.join("fees.sqlite3");
    let restored_db = dir.join("restored.sqlite3");
    let csv = dir.join("student_fees.csv");
    let styles = dir.join("student_fees.styles.json");
    run_json(["--db", path_str(&db), "seed"]);

    let exported = run_json([
        "--db",
        path_str(&db),
        "export",
        "--out",
        path_str(&csv),
        "--styles-out",
        path_str(&styles),
    ]);
    validate_schema("export_result.schema.json", &exported);
    assert_eq!(as_u64(&exported, "students"), 10);
    assert_eq!(as_u64(&exported, "months"), 2);
    assert_eq!(exported.get("styles_written").and_then(Value::as_bool), Some(true));

    let styles_json = read_json_file(&styles);
    assert!(styles_json.get("columns").and_then(Value::as_array).is_some());

    let preview = run_json(["--db", path_str(&restored_db), "import", "--in", path_str(&csv), "--dry-run"]);
    assert_eq!(as_str(&preview, "layout"), "horizontal");
    assert_eq!(preview.get("replaced").and_then(Value::as_bool), Some(false));

    let imported = run_json(["--db", path_str(&restored_db), "import", "--in", path_str(&csv)]);
    assert_eq!(as_u64(&imported, "total"), 20);

    let summary = run_json(["--db", path_str(&restored_db), "summary"]);
    assert_eq!(as_u64(&summary, "paid"), 14);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_bulk_add_accepts_bare_array_file() {
    let dir = unique_temp_dir("fees-bulk");
    let db = dir.join("fees.sqlite3");
    let file = dir.join("batch.json");
    fs::write(
        &file,
        serde_json::json!([
            { "student_name": "Asha", "father_name": "Mohan", "month": "Jan-26", "fee_status": "Paid", "receipt_number": "R-1" },
            { "student_name": "Asha", "father_name": "Mohan", "month": " jan-26" },
            { "student_name": "", "month": "February 2026" }
        ])
        .to_string(),
    )
    .unwrap_or_else(|err| panic!("failed to write batch file: {err}"));

    let report = run_json(["--db", path_str(&db), "record", "bulk-add", "--file", path_str(&file)]);
    validate_schema("bulk_add_report.schema.json", &report);
    assert_eq!(as_u64(&report, "added"), 1);
    assert_eq!(as_u64(&report, "skipped"), 2);

    let _ = fs::remove_dir_all(&dir);
}

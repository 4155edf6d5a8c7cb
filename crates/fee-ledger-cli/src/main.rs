use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fee_ledger_api::{
    BulkAddRequest, FeeLedgerApi, QuickMarkRequest, UpdateProfileRequest, UpdateRecordRequest,
};
use fee_ledger_core::{
    ExportFilter, FeeStatus, NewRecord, RecordIdentity, RecordQuery, StudentIdentity,
};
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "fees")]
#[command(about = "Student fee ledger CLI")]
struct Cli {
    #[arg(long, default_value = "./fee_ledger.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Record {
        #[command(subcommand)]
        command: Box<RecordCommand>,
    },
    Summary,
    Student {
        #[command(subcommand)]
        command: Box<StudentCommand>,
    },
    Defaulters(DefaultersArgs),
    Export(ExportArgs),
    Import(ImportArgs),
    /// Bulk-add the demo roster.
    Seed,
    /// Report whether the database is reachable and how many rows it holds.
    Probe,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
    Backup(DbBackupArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum RecordCommand {
    List(ListArgs),
    Add(AddArgs),
    Update(UpdateArgs),
    MarkPaid(MarkPaidArgs),
    Delete(IdentityArgs),
    BulkAdd(BulkAddArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    month: Option<String>,
    #[arg(long)]
    status: Option<StatusArg>,
    #[arg(long)]
    receipt: Option<String>,
    #[arg(long)]
    page: Option<usize>,
    #[arg(long)]
    per_page: Option<usize>,
}

#[derive(Debug, Args)]
struct IdentityArgs {
    #[arg(long = "name")]
    student_name: String,
    #[arg(long = "father", default_value = "")]
    father_name: String,
    #[arg(long)]
    month: String,
}

#[derive(Debug, Args)]
struct AddArgs {
    #[command(flatten)]
    identity: IdentityArgs,
    #[arg(long, default_value = "")]
    student_id: String,
    #[arg(long, default_value = "")]
    mobile: String,
    #[arg(long, value_enum, default_value_t = StatusArg::NotPaid)]
    status: StatusArg,
    #[arg(long, default_value = "")]
    receipt: String,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[command(flatten)]
    identity: IdentityArgs,
    #[arg(long, value_enum)]
    status: StatusArg,
    #[arg(long, default_value = "")]
    receipt: String,
}

#[derive(Debug, Args)]
struct MarkPaidArgs {
    #[command(flatten)]
    identity: IdentityArgs,
    /// RFC3339 UTC timestamp used for the receipt month; defaults to now.
    #[arg(long)]
    issued_at: Option<String>,
}

#[derive(Debug, Args)]
struct BulkAddArgs {
    /// JSON file holding either `{"records": [...]}` or a bare array.
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Subcommand)]
enum StudentCommand {
    List,
    Profile(StudentArgs),
    ByReceipt(ByReceiptArgs),
    UpdateProfile(UpdateProfileArgs),
}

#[derive(Debug, Args)]
struct StudentArgs {
    #[arg(long = "name")]
    student_name: String,
    #[arg(long = "father", default_value = "")]
    father_name: String,
}

#[derive(Debug, Args)]
struct ByReceiptArgs {
    #[arg(long)]
    receipt: String,
}

#[derive(Debug, Args)]
struct UpdateProfileArgs {
    #[command(flatten)]
    student: StudentArgs,
    #[arg(long)]
    new_name: String,
    #[arg(long, default_value = "")]
    new_father: String,
    #[arg(long, default_value = "")]
    student_id: String,
    #[arg(long, default_value = "")]
    mobile: String,
}

#[derive(Debug, Args)]
struct DefaultersArgs {
    #[arg(long, default_value_t = 1)]
    min_months: usize,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = FilterArg::All)]
    filter: FilterArg,
    /// Also write a JSON style sheet for the export; failures here are reported, not fatal.
    #[arg(long)]
    styles_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Paid,
    NotPaid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Paid,
    Unpaid,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BulkAddFile {
    Wrapped(BulkAddRequest),
    Bare(Vec<NewRecord>),
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T: serde::Serialize>(value: &T, what: &str) -> Result<()> {
    emit_json(serde_json::to_value(value).with_context(|| format!("failed to serialize {what}"))?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let api = FeeLedgerApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(*command, &api),
        Command::Record { command } => run_record(*command, &api),
        Command::Summary => emit(&api.summary()?, "summary"),
        Command::Student { command } => run_student(*command, &api),
        Command::Defaulters(args) => {
            emit(&api.defaulters(args.min_months)?, "defaulter report")
        }
        Command::Export(args) => {
            let result =
                api.export_horizontal_csv(args.filter.into_filter(), &args.out, args.styles_out.as_deref())?;
            emit(&result, "export result")
        }
        Command::Import(args) => {
            let report = api.import_file(&args.input, args.dry_run)?;
            emit_json(serde_json::json!({
                "layout": report.layout,
                "total": report.total,
                "replaced": report.replaced,
                "dry_run": args.dry_run
            }))
        }
        Command::Seed => emit(&api.seed_sample()?, "bulk add report"),
        Command::Probe => emit(&api.health(), "store health"),
    }
}

fn run_db(command: DbCommand, api: &FeeLedgerApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
                "inferred_from_legacy": status.inferred_from_legacy
            }))
        }
        DbCommand::Migrate(args) => emit(&api.migrate(args.dry_run)?, "migrate result"),
        DbCommand::IntegrityCheck => emit(&api.integrity_check()?, "integrity report"),
        DbCommand::Backup(args) => {
            api.backup(&args.out)?;
            emit_json(serde_json::json!({
                "backup_written": true,
                "path": args.out.display().to_string()
            }))
        }
    }
}

fn run_record(command: RecordCommand, api: &FeeLedgerApi) -> Result<()> {
    match command {
        RecordCommand::List(args) => {
            let query = RecordQuery {
                search: args.search,
                month: args.month,
                status: args.status.map(|status| status.into_status().as_str().to_string()),
                receipt: args.receipt,
                page: args.page,
                per_page: args.per_page,
            };
            emit(&api.list_records(&query)?, "record listing")
        }
        RecordCommand::Add(args) => {
            let record = api.add_record(NewRecord {
                student_id: args.student_id,
                student_name: args.identity.student_name,
                father_name: args.identity.father_name,
                mobile_number: args.mobile,
                month: args.identity.month,
                fee_status: Some(args.status.into_status()),
                receipt_number: args.receipt,
            })?;
            emit(&record, "fee record")
        }
        RecordCommand::Update(args) => {
            let record = api.update_record(UpdateRecordRequest {
                student_name: args.identity.student_name,
                father_name: args.identity.father_name,
                month: args.identity.month,
                fee_status: args.status.into_status(),
                receipt_number: args.receipt,
            })?;
            emit(&record, "fee record")
        }
        RecordCommand::MarkPaid(args) => {
            let issued_at = args.issued_at.as_deref().map(parse_rfc3339).transpose()?;
            let result = api.quick_mark_paid(QuickMarkRequest {
                student_name: args.identity.student_name,
                father_name: args.identity.father_name,
                month: args.identity.month,
                issued_at,
            })?;
            emit(&result, "quick mark result")
        }
        RecordCommand::Delete(args) => {
            let identity = RecordIdentity::new(args.student_name, args.father_name, args.month);
            let record = api.delete_record(&identity)?;
            emit_json(serde_json::json!({ "deleted": record }))
        }
        RecordCommand::BulkAdd(args) => {
            let body = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read bulk file {}", args.file.display()))?;
            let parsed: BulkAddFile = serde_json::from_str(&body)
                .with_context(|| format!("failed to parse bulk file {}", args.file.display()))?;
            let request = match parsed {
                BulkAddFile::Wrapped(request) => request,
                BulkAddFile::Bare(records) => BulkAddRequest { records },
            };
            emit(&api.bulk_add(request)?, "bulk add report")
        }
    }
}

fn run_student(command: StudentCommand, api: &FeeLedgerApi) -> Result<()> {
    match command {
        StudentCommand::List => {
            let students = api.unique_students()?;
            emit_json(serde_json::json!({ "total": students.len(), "students": students }))
        }
        StudentCommand::Profile(args) => {
            let student = StudentIdentity::new(args.student_name, args.father_name);
            emit(&api.student_profile(&student)?, "student profile")
        }
        StudentCommand::ByReceipt(args) => {
            emit(&api.student_profile_by_receipt(&args.receipt)?, "student profile")
        }
        StudentCommand::UpdateProfile(args) => {
            let result = api.update_student_profile(UpdateProfileRequest {
                original_name: args.student.student_name,
                original_father: args.student.father_name,
                student_id: args.student_id,
                student_name: args.new_name,
                father_name: args.new_father,
                mobile_number: args.mobile,
            })?;
            emit(&result, "profile update result")
        }
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

impl StatusArg {
    fn into_status(self) -> FeeStatus {
        match self {
            Self::Paid => FeeStatus::Paid,
            Self::NotPaid => FeeStatus::NotPaid,
        }
    }
}

impl FilterArg {
    fn into_filter(self) -> ExportFilter {
        match self {
            Self::All => ExportFilter::All,
            Self::Paid => ExportFilter::Paid,
            Self::Unpaid => ExportFilter::Unpaid,
        }
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use fee_ledger_api::{
    render_csv, BulkAddRequest, FeeLedgerApi, ImportReport, MigrateResult, ProfileUpdateResult,
    QuickMarkRequest, UpdateProfileRequest, UpdateRecordRequest, API_CONTRACT_VERSION,
};
use fee_ledger_core::{
    BulkAddReport, DefaulterReport, ExportFilter, FeeRecord, LedgerError, NewRecord,
    QuickMarkResult, RecordIdentity, RecordListing, RecordQuery, StoreHealth, StudentIdentity,
    StudentProfile, Summary, Table, UniqueStudent,
};
use fee_ledger_store_sqlite::SchemaStatus;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");
const DEFAULT_MIN_MONTHS: usize = 1;

#[derive(Debug, Clone)]
struct ServiceState {
    api: FeeLedgerApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<BulkAddReport>,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DefaultersQuery {
    #[serde(default = "default_min_months")]
    min_months: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ExportQuery {
    #[serde(default)]
    filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImportRequest {
    #[serde(flatten)]
    table: Table,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "fee-ledger-service")]
#[command(about = "Local HTTP service for the student fee ledger")]
struct Args {
    #[arg(long, default_value = "./fee_ledger.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

fn default_min_months() -> usize {
    DEFAULT_MIN_MONTHS
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<LedgerError>() {
            Some(ledger_error) => ServiceState::ledger_error(ledger_error),
            None => {
                tracing::error!("request failed: {err:#}");
                ServiceError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    service_contract_version: SERVICE_CONTRACT_VERSION,
                    error: format!("{err:#}"),
                    kind: "internal",
                    report: None,
                }
            }
        }
    }
}

impl ServiceState {
    fn ledger_error(err: &LedgerError) -> ServiceError {
        let status = match err {
            LedgerError::Validation(_)
            | LedgerError::DuplicateIdentity(_)
            | LedgerError::DuplicateReceipt(_)
            | LedgerError::BatchRejected(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let report = match err {
            LedgerError::BatchRejected(report) => Some(report.clone()),
            _ => None,
        };
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: err.to_string(),
            kind: err.kind(),
            report,
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/debug", get(debug))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route("/v1/records", get(records_list))
        .route("/v1/records/add", post(records_add))
        .route("/v1/records/update", post(records_update))
        .route("/v1/records/quick-mark-paid", post(records_quick_mark_paid))
        .route("/v1/records/delete", post(records_delete))
        .route("/v1/records/bulk-add", post(records_bulk_add))
        .route("/v1/summary", get(summary))
        .route("/v1/students", get(students_list))
        .route("/v1/students/profile", get(students_profile))
        .route("/v1/students/by-receipt/:receipt", get(students_by_receipt))
        .route("/v1/students/update-profile", post(students_update_profile))
        .route("/v1/defaulters", get(defaulters))
        .route("/v1/export", get(export_csv))
        .route("/v1/import", post(import_snapshot))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let state = ServiceState { api: FeeLedgerApi::new(args.db.clone()) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("fee ledger service listening on {} (db {})", args.bind, args.db.display());
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn debug(State(state): State<ServiceState>) -> Json<ServiceEnvelope<StoreHealth>> {
    Json(envelope(state.api.health()))
}

async fn db_schema_version(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<SchemaStatus>>, ServiceError> {
    let status = state.api.schema_status()?;
    Ok(Json(envelope(status)))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<ServiceEnvelope<MigrateResult>>, ServiceError> {
    let result = state.api.migrate(request.dry_run)?;
    Ok(Json(envelope(result)))
}

async fn records_list(
    State(state): State<ServiceState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<ServiceEnvelope<RecordListing>>, ServiceError> {
    let listing = state.api.list_records(&query)?;
    Ok(Json(envelope(listing)))
}

async fn records_add(
    State(state): State<ServiceState>,
    Json(request): Json<NewRecord>,
) -> Result<Json<ServiceEnvelope<FeeRecord>>, ServiceError> {
    let record = state.api.add_record(request)?;
    Ok(Json(envelope(record)))
}

async fn records_update(
    State(state): State<ServiceState>,
    Json(request): Json<UpdateRecordRequest>,
) -> Result<Json<ServiceEnvelope<FeeRecord>>, ServiceError> {
    let record = state.api.update_record(request)?;
    Ok(Json(envelope(record)))
}

async fn records_quick_mark_paid(
    State(state): State<ServiceState>,
    Json(request): Json<QuickMarkRequest>,
) -> Result<Json<ServiceEnvelope<QuickMarkResult>>, ServiceError> {
    let result = state.api.quick_mark_paid(request)?;
    Ok(Json(envelope(result)))
}

async fn records_delete(
    State(state): State<ServiceState>,
    Json(request): Json<RecordIdentity>,
) -> Result<Json<ServiceEnvelope<FeeRecord>>, ServiceError> {
    let record = state.api.delete_record(&request)?;
    Ok(Json(envelope(record)))
}

async fn records_bulk_add(
    State(state): State<ServiceState>,
    Json(request): Json<BulkAddRequest>,
) -> Result<Json<ServiceEnvelope<BulkAddReport>>, ServiceError> {
    let report = state.api.bulk_add(request)?;
    Ok(Json(envelope(report)))
}

async fn summary(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Summary>>, ServiceError> {
    let summary = state.api.summary()?;
    Ok(Json(envelope(summary)))
}

async fn students_list(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<UniqueStudent>>>, ServiceError> {
    let students = state.api.unique_students()?;
    Ok(Json(envelope(students)))
}

async fn students_profile(
    State(state): State<ServiceState>,
    Query(student): Query<StudentIdentity>,
) -> Result<Json<ServiceEnvelope<StudentProfile>>, ServiceError> {
    let profile = state.api.student_profile(&student)?;
    Ok(Json(envelope(profile)))
}

async fn students_by_receipt(
    State(state): State<ServiceState>,
    Path(receipt): Path<String>,
) -> Result<Json<ServiceEnvelope<StudentProfile>>, ServiceError> {
    let profile = state.api.student_profile_by_receipt(&receipt)?;
    Ok(Json(envelope(profile)))
}

async fn students_update_profile(
    State(state): State<ServiceState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ServiceEnvelope<ProfileUpdateResult>>, ServiceError> {
    let result = state.api.update_student_profile(request)?;
    Ok(Json(envelope(result)))
}

async fn defaulters(
    State(state): State<ServiceState>,
    Query(query): Query<DefaultersQuery>,
) -> Result<Json<ServiceEnvelope<DefaulterReport>>, ServiceError> {
    let report = state.api.defaulters(query.min_months)?;
    Ok(Json(envelope(report)))
}

async fn export_csv(
    State(state): State<ServiceState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    let raw_filter = query.filter.unwrap_or_default();
    let filter = ExportFilter::parse(&raw_filter).ok_or_else(|| {
        ServiceState::ledger_error(&LedgerError::Validation(format!(
            "unknown export filter `{raw_filter}`; expected all, paid or unpaid"
        )))
    })?;
    let table = state.api.export_horizontal(filter)?;
    let body = render_csv(&table)?;

    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]"))
        .map_err(anyhow::Error::from)?;
    let disposition = format!("attachment; filename=\"student_fees_{stamp}.csv\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn import_snapshot(
    State(state): State<ServiceState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ServiceEnvelope<ImportReport>>, ServiceError> {
    let report = state.api.import_snapshot(&request.table, request.dry_run)?;
    Ok(Json(envelope(report)))
}

use crate::{
    api::Service,
    auth::auth::AuthUser,
    error::LeaveError,
    leave::{AllocationRow, ImportReport},
    model::balance::{BalanceRecord, ResourceKind},
    utils::retry::retry_on_contention,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Balance year, defaults to the current one
    #[param(example = 2026)]
    pub year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(example = "days")]
    pub kind: ResourceKind,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 22)]
    pub allocated: i32,
    /// Extra days granted on top of the allocation; absent for hours
    #[schema(example = 2)]
    pub bonus: Option<i32>,
    #[schema(example = 5)]
    pub used: i32,
    #[schema(example = 19)]
    pub available: i32,
}

impl TryFrom<BalanceRecord> for BalanceResponse {
    type Error = LeaveError;

    fn try_from(record: BalanceRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            available: record.available()?,
            kind: record.kind(),
            year: record.year,
            allocated: record.allocation.allocated(),
            bonus: record.allocation.bonus(),
            used: record.used,
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ImportRowBody {
    #[schema(example = "ana@example.com", format = "email")]
    pub email: String,
    #[schema(example = 25)]
    pub days: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct ImportBody {
    /// Defaults to the current year
    #[schema(example = 2026)]
    pub year: Option<i32>,
    pub rows: Vec<ImportRowBody>,
}

#[derive(Serialize, ToSchema)]
pub struct SkippedRow {
    #[schema(example = "nobody@example.com")]
    pub email: String,
    #[schema(example = "unknown employee")]
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    #[schema(example = 12)]
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
}

impl From<ImportReport> for ImportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            updated: report.updated,
            skipped: report
                .skipped
                .into_iter()
                .map(|(email, reason)| SkippedRow { email, reason })
                .collect(),
        }
    }
}

fn current_year() -> i32 {
    Utc::now().year()
}

/// Vacation and permission balances of the caller
#[utoipa::path(
    get,
    path = "/api/balance",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Days and hours balances", body = [BalanceResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn get_balances(
    auth: AuthUser,
    service: Service,
    query: web::Query<BalanceQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;
    let year = query.year.unwrap_or_else(current_year);

    let balances = service
        .balances(employee_id, year)
        .await?
        .into_iter()
        .map(BalanceResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HttpResponse::Ok().json(balances))
}

/* =========================
Import vacation allocations (Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/balance/import",
    request_body(
        content = ImportBody,
        description = "Allocated vacation days per employee email",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Import finished", body = ImportResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn import_balances(
    auth: AuthUser,
    service: Service,
    payload: web::Json<ImportBody>,
) -> actix_web::Result<impl Responder> {
    let actor_id = auth.employee_id()?;
    let payload = payload.into_inner();
    let year = payload.year.unwrap_or_else(current_year);

    let rows: Vec<AllocationRow> = payload
        .rows
        .into_iter()
        .map(|row| AllocationRow {
            email: row.email,
            days: row.days,
        })
        .collect();

    let service = service.get_ref();
    let report =
        retry_on_contention(|| service.import_allocations(actor_id, year, rows.clone())).await?;

    Ok(HttpResponse::Ok().json(ImportResponse::from(report)))
}

use crate::{
    api::Service,
    auth::auth::AuthUser,
    leave::SubmitCommand,
    model::{
        balance::ResourceKind,
        leave_request::{Amount, CalendarEntry, Decision, LeaveRequest, RequestState},
    },
    utils::retry::retry_on_contention,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "days")]
    /// `days` for vacation, `hours` for a special permission
    pub kind: ResourceKind,
    #[schema(example = 3)]
    pub quantity: i32,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Family trip")]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionBody {
    #[schema(example = "Team offsite that week")]
    pub comment: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct CalendarQuery {
    /// First day to show, defaults to today
    #[param(example = "2026-01-01", value_type = Option<String>)]
    pub from: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    #[schema(example = 1)]
    /// leave request id
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "days")]
    pub kind: ResourceKind,
    #[schema(example = 3)]
    pub quantity: i32,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    #[schema(example = "pending")]
    pub status: RequestState,
    pub decided_by: Option<u64>,
    pub decision_comment: Option<String>,
    #[schema(example = "2026-01-02T09:30:00Z", format = "date-time", value_type = Option<String>)]
    pub decided_at: Option<DateTime<Utc>>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<LeaveRequest> for LeaveResponse {
    fn from(request: LeaveRequest) -> Self {
        let (decided_by, decision_comment, decided_at) = match request.decision {
            Some(d) => (Some(d.decided_by), d.comment, Some(d.decided_at)),
            None => (None, None, None),
        };
        Self {
            id: request.id,
            employee_id: request.employee_id,
            kind: request.amount.kind(),
            quantity: request.amount.quantity(),
            start_date: request.start_date,
            end_date: request.end_date,
            reason: request.reason,
            status: request.state,
            decided_by,
            decision_comment,
            decided_at,
            created_at: request.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CalendarEntryResponse {
    #[schema(example = 12)]
    pub request_id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "Ana Ruiz")]
    pub display_name: String,
    pub kind: ResourceKind,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
}

impl From<CalendarEntry> for CalendarEntryResponse {
    fn from(entry: CalendarEntry) -> Self {
        Self {
            request_id: entry.request_id,
            employee_id: entry.employee_id,
            display_name: entry.display_name,
            kind: entry.kind,
            start_date: entry.start_date,
            end_date: entry.end_date,
        }
    }
}

fn to_responses(requests: Vec<LeaveRequest>) -> Vec<LeaveResponse> {
    requests.into_iter().map(LeaveResponse::from).collect()
}

/* =========================
Submit leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Vacation or permission request",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Invalid request or insufficient balance", body = Object, example = json!({
            "error": "Insufficient days balance. Available: 2, requested: 5"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    service: Service,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;
    let payload = payload.into_inner();

    let cmd = SubmitCommand {
        amount: Amount::new(payload.kind, payload.quantity),
        start_date: payload.start_date,
        end_date: payload.end_date,
        reason: payload.reason,
    };

    let service = service.get_ref();
    let request = retry_on_contention(|| service.submit(employee_id, cmd.clone())).await?;

    Ok(HttpResponse::Created().json(LeaveResponse::from(request)))
}

/// Own requests, newest first
#[utoipa::path(
    get,
    path = "/api/leave/mine",
    responses(
        (status = 200, description = "Requests of the caller", body = [LeaveResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn my_leaves(auth: AuthUser, service: Service) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;
    let requests = service.requests_of(employee_id).await?;
    Ok(HttpResponse::Ok().json(to_responses(requests)))
}

/// Pending requests of the caller's direct reports, oldest first
#[utoipa::path(
    get,
    path = "/api/leave/pending",
    responses(
        (status = 200, description = "Requests awaiting the caller's decision", body = [LeaveResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn pending_leaves(auth: AuthUser, service: Service) -> actix_web::Result<impl Responder> {
    let manager_id = auth.employee_id()?;
    let requests = service.pending_for(manager_id).await?;
    Ok(HttpResponse::Ok().json(to_responses(requests)))
}

/// Approved absences of the caller's team ending on or after `from`
#[utoipa::path(
    get,
    path = "/api/leave/calendar",
    params(CalendarQuery),
    responses(
        (status = 200, description = "Team calendar", body = [CalendarEntryResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn team_calendar(
    auth: AuthUser,
    service: Service,
    query: web::Query<CalendarQuery>,
) -> actix_web::Result<impl Responder> {
    let manager_id = auth.employee_id()?;
    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());

    let entries: Vec<CalendarEntryResponse> = service
        .team_calendar(manager_id, from)
        .await?
        .into_iter()
        .map(CalendarEntryResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

/// for getting a leave request details endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Unknown request or not visible to the caller")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    service: Service,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let viewer_id = auth.employee_id()?;
    let leave_id = path.into_inner();

    let request = service.view_request(viewer_id, leave_id).await?;
    Ok(HttpResponse::Ok().json(LeaveResponse::from(request)))
}

async fn decide(
    auth: AuthUser,
    service: Service,
    leave_id: u64,
    decision: Decision,
    comment: Option<String>,
) -> actix_web::Result<HttpResponse> {
    let decider_id = auth.employee_id()?;
    let service = service.get_ref();

    let request = retry_on_contention(|| {
        service.decide(leave_id, decider_id, decision, comment.clone())
    })
    .await?;

    Ok(HttpResponse::Ok().json(LeaveResponse::from(request)))
}

/* =========================
Approve leave (direct manager)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    request_body(
        content = DecisionBody,
        description = "Optional comment",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave approved, balance debited", body = LeaveResponse),
        (status = 400, description = "Insufficient balance"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the employee's manager"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already decided", body = Object, example = json!({
            "error": "Leave request 1 has already been approved"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    service: Service,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> actix_web::Result<impl Responder> {
    let comment = body.and_then(|b| b.into_inner().comment);
    decide(auth, service, path.into_inner(), Decision::Approved, comment).await
}

/* =========================
Reject leave (direct manager)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body(
        content = DecisionBody,
        description = "Optional rejection comment",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the employee's manager"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already decided")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    service: Service,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> actix_web::Result<impl Responder> {
    let comment = body.and_then(|b| b.into_inner().comment);
    decide(auth, service, path.into_inner(), Decision::Rejected, comment).await
}

use crate::api::balance::{
    BalanceResponse, ImportBody, ImportResponse, ImportRowBody, SkippedRow,
};
use crate::api::leave_request::{CalendarEntryResponse, CreateLeave, DecisionBody, LeaveResponse};
use crate::api::notification::NotificationResponse;
use crate::model::{
    balance::ResourceKind, leave_request::RequestState, notification::NotificationCategory,
};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Leave API",
        version = "1.0.0",
        description = r#"
## Leave & Permission Engine

Vacation days and special-permission hours for every employee, per year.

### 🔹 Key Features
- **Requests**
  - Submit vacation (days) or permission (hours) requests
  - Managers approve or reject requests of their direct reports
- **Balances**
  - Yearly allocation, bonus days and usage; debited only on approval
  - Bulk import of vacation allocations (Admin)
- **Notifications**
  - Managers hear about new requests, employees about decisions

### 🔐 Security
All endpoints are protected using **JWT Bearer authentication**.
Decisions are allowed only for the employee's direct manager.

### 📦 Response Format
- JSON-based RESTful responses
- Errors as `{"error": "..."}`
"#,
    ),
    paths(
        crate::api::leave_request::create_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::pending_leaves,
        crate::api::leave_request::team_calendar,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::balance::get_balances,
        crate::api::balance::import_balances,

        crate::api::notification::list_notifications,
        crate::api::notification::mark_read
    ),
    components(
        schemas(
            ResourceKind,
            RequestState,
            NotificationCategory,
            CreateLeave,
            DecisionBody,
            LeaveResponse,
            CalendarEntryResponse,
            BalanceResponse,
            ImportBody,
            ImportRowBody,
            ImportResponse,
            SkippedRow,
            NotificationResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Leave", description = "Leave and permission requests"),
        (name = "Balance", description = "Yearly balances"),
        (name = "Notification", description = "In-app notifications"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_with_bearer_auth() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/api/leave",
            "/api/leave/mine",
            "/api/leave/pending",
            "/api/leave/calendar",
            "/api/leave/{leave_id}",
            "/api/leave/{leave_id}/approve",
            "/api/leave/{leave_id}/reject",
            "/api/balance",
            "/api/balance/import",
            "/api/notifications",
            "/api/notifications/{notification_id}/read",
        ] {
            assert!(paths.contains_key(path), "{path} is not documented");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}

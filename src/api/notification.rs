use crate::{
    api::Service,
    auth::auth::AuthUser,
    model::notification::{Notification, NotificationCategory},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "new_request")]
    pub category: NotificationCategory,
    #[schema(example = "New vacation request")]
    pub title: String,
    #[schema(example = "Ana Ruiz has requested 3 vacation days from 2026-01-05 to 2026-01-07.")]
    pub body: String,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            category: n.category,
            title: n.title,
            body: n.body,
            created_at: n.created_at,
        }
    }
}

/// Unread notifications of the caller, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    responses(
        (status = 200, description = "Unread notifications", body = [NotificationResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Notification"
)]
pub async fn list_notifications(
    auth: AuthUser,
    service: Service,
) -> actix_web::Result<impl Responder> {
    let recipient_id = auth.employee_id()?;

    let notifications: Vec<NotificationResponse> = service
        .unread_notifications(recipient_id)
        .await?
        .into_iter()
        .map(NotificationResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(notifications))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/read",
    params(
        ("notification_id" = u64, Path, description = "ID of the notification to mark as read")
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Object, example = json!({
            "message": "Notification marked as read"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Notification"
)]
pub async fn mark_read(
    auth: AuthUser,
    service: Service,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let recipient_id = auth.employee_id()?;
    service
        .mark_notification_read(recipient_id, path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Notification marked as read"
    })))
}

//! Notification records and their delivery.
//!
//! Records are written through the caller's transaction. Delivery runs after commit on a
//! spawned task and its failures are only logged.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::error::LeaveError;
use crate::model::{
    balance::ResourceKind,
    employee::Employee,
    leave_request::{Amount, LeaveRequest, RequestState},
    notification::{NewNotification, Notification, NotificationCategory},
};
use crate::store::LeaveTx;

/// Appends a notification as part of the enclosing atomic unit.
pub async fn emit<T: LeaveTx>(
    tx: &mut T,
    recipient_id: u64,
    category: NotificationCategory,
    title: String,
    body: String,
) -> Result<Notification, LeaveError> {
    tx.insert_notification(NewNotification {
        recipient_id,
        category,
        title,
        body,
        created_at: Utc::now(),
    })
    .await
}

fn subject(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Days => "vacation",
        ResourceKind::Hours => "permission",
    }
}

fn describe(amount: Amount) -> String {
    match amount {
        Amount::Days(1) => "1 vacation day".to_string(),
        Amount::Days(n) => format!("{n} vacation days"),
        Amount::Hours(1) => "1 permission hour".to_string(),
        Amount::Hours(n) => format!("{n} permission hours"),
    }
}

fn date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Notice for the manager when one of their reports submits a request.
pub fn new_request_message(employee: &Employee, request: &LeaveRequest) -> (String, String) {
    let title = format!("New {} request", subject(request.amount.kind()));
    let body = format!(
        "{} has requested {} from {} to {}.",
        employee.display_name,
        describe(request.amount),
        date(request.start_date),
        date(request.end_date)
    );
    (title, body)
}

/// Notice for the employee once the manager has decided.
pub fn decision_message(request: &LeaveRequest) -> (NotificationCategory, String, String) {
    let (category, verb) = match request.state {
        RequestState::Rejected => (NotificationCategory::RequestRejected, "rejected"),
        _ => (NotificationCategory::RequestApproved, "approved"),
    };
    let kind = subject(request.amount.kind());
    let title = format!("{} request {}", capitalize(kind), verb);
    let comment = request
        .decision
        .as_ref()
        .and_then(|d| d.comment.as_deref())
        .map(|c| format!(": {c}"))
        .unwrap_or_default();
    let body = format!(
        "Your {} request from {} to {} has been {}{}.",
        kind,
        date(request.start_date),
        date(request.end_date),
        verb,
        comment
    );
    (category, title, body)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// External delivery channel (email, push, ...).
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Default sink: records deliveries in the application log.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: Notification) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            info!(
                notification_id = notification.id,
                recipient_id = notification.recipient_id,
                category = %notification.category,
                title = %notification.title,
                "Notification delivered"
            );
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct Delivery {
    sink: Arc<dyn NotificationSink>,
}

impl Delivery {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Fire-and-forget hand-off of committed notifications.
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        actix_web::rt::spawn(async move {
            for notification in notifications {
                let id = notification.id;
                if let Err(e) = sink.deliver(notification).await {
                    warn!(error = %e, notification_id = id, "Notification delivery failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_request::{DecisionRecord, NewLeaveRequest};
    use crate::model::role::Role;

    fn request(amount: Amount) -> LeaveRequest {
        NewLeaveRequest {
            employee_id: 4,
            amount,
            start_date: NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            reason: None,
            created_at: Utc::now(),
        }
        .into_request(9)
    }

    #[test]
    fn new_request_message_names_employee_and_amount() {
        let employee = Employee {
            id: 4,
            display_name: "Ana Ruiz".into(),
            email: "ana@example.com".into(),
            role: Role::Employee,
            manager_id: Some(1),
        };
        let (title, body) = new_request_message(&employee, &request(Amount::Days(5)));
        assert_eq!(title, "New vacation request");
        assert_eq!(
            body,
            "Ana Ruiz has requested 5 vacation days from 2026-08-03 to 2026-08-07."
        );
    }

    #[test]
    fn decision_message_appends_comment() {
        let decided = request(Amount::Hours(3))
            .resolve(
                RequestState::Rejected,
                DecisionRecord {
                    decided_by: 1,
                    comment: Some("team offsite".into()),
                    decided_at: Utc::now(),
                },
            )
            .unwrap();
        let (category, title, body) = decision_message(&decided);
        assert_eq!(category, NotificationCategory::RequestRejected);
        assert_eq!(title, "Permission request rejected");
        assert_eq!(
            body,
            "Your permission request from 2026-08-03 to 2026-08-07 has been rejected: team offsite."
        );
    }
}

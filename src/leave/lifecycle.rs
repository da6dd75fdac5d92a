use chrono::{Datelike, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use super::{
    gate,
    ledger::Ledger,
    notify::{self, Delivery},
};
use crate::config::LeavePolicy;
use crate::error::LeaveError;
use crate::model::{
    balance::{BalanceKey, BalanceRecord, ResourceKind},
    employee::Employee,
    leave_request::{
        Amount, CalendarEntry, Decision, DecisionRecord, LeaveRequest, NewLeaveRequest,
    },
    notification::{Notification, NotificationCategory},
};
use crate::store::{LeaveStore, LeaveTx};

/// Input of [`LeaveService::submit`].
#[derive(Debug, Clone)]
pub struct SubmitCommand {
    pub amount: Amount,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

/// One row of a bulk allocation import.
#[derive(Debug, Clone)]
pub struct AllocationRow {
    pub email: String,
    pub days: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub updated: usize,
    /// `(email, reason)` for every row left untouched.
    pub skipped: Vec<(String, String)>,
}

/// Owns leave requests and their `pending -> approved | rejected` lifecycle.
///
/// `submit` and `decide` each run as a single store transaction: the balance check or
/// debit, the request write and the notification row commit together or not at all.
/// Notifications are handed to the delivery channel only after the commit.
pub struct LeaveService<S> {
    store: S,
    ledger: Ledger,
    delivery: Delivery,
}

impl<S: LeaveStore> LeaveService<S> {
    pub fn new(store: S, policy: LeavePolicy, delivery: Delivery) -> Self {
        Self {
            store,
            ledger: Ledger::new(policy),
            delivery,
        }
    }

    fn validate(&self, cmd: &SubmitCommand) -> Result<(), LeaveError> {
        if cmd.end_date < cmd.start_date {
            return Err(LeaveError::validation(
                "end_date cannot be before start_date",
            ));
        }

        let quantity = cmd.amount.quantity();
        if quantity <= 0 {
            return Err(LeaveError::validation("quantity must be greater than zero"));
        }

        match cmd.amount {
            Amount::Hours(hours) => {
                let cap = self.ledger.policy().max_hours_per_request;
                if hours > cap {
                    return Err(LeaveError::validation(format!(
                        "permission requests are limited to {cap} hours"
                    )));
                }
            }
            Amount::Days(days) => {
                let span = (cmd.end_date - cmd.start_date).num_days() + 1;
                if i64::from(days) > span {
                    return Err(LeaveError::validation(format!(
                        "{days} days requested but the date range covers only {span}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Admits a new `pending` request after an advisory balance check and notifies the
    /// employee's manager.
    #[instrument(
        name = "leave_submit",
        skip(self, cmd),
        fields(kind = %cmd.amount.kind(), quantity = cmd.amount.quantity())
    )]
    pub async fn submit(
        &self,
        employee_id: u64,
        cmd: SubmitCommand,
    ) -> Result<LeaveRequest, LeaveError> {
        self.validate(&cmd)?;

        let mut tx = self.store.begin().await?;

        let employee = tx
            .find_employee(employee_id)
            .await?
            .ok_or_else(|| LeaveError::not_found(format!("employee {employee_id}")))?;

        let key = BalanceKey::new(employee_id, cmd.amount.kind(), cmd.start_date.year());
        let check = self
            .ledger
            .reserve_check(&mut tx, key, cmd.amount.quantity())
            .await?;
        if !check.ok {
            info!(available = check.available, "Submission refused: insufficient balance");
            return Err(LeaveError::InsufficientBalance {
                kind: key.kind,
                available: check.available,
                requested: cmd.amount.quantity(),
            });
        }

        let reason = cmd
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let request = tx
            .insert_request(NewLeaveRequest {
                employee_id,
                amount: cmd.amount,
                start_date: cmd.start_date,
                end_date: cmd.end_date,
                reason,
                created_at: Utc::now(),
            })
            .await?;

        let mut outbox = Vec::new();
        match employee.manager_id {
            Some(manager_id) => {
                let (title, body) = notify::new_request_message(&employee, &request);
                outbox.push(
                    notify::emit(
                        &mut tx,
                        manager_id,
                        NotificationCategory::NewRequest,
                        title,
                        body,
                    )
                    .await?,
                );
            }
            None => warn!("Employee has no manager, nobody is notified"),
        }

        tx.commit().await?;

        info!(request_id = request.id, "Leave request submitted");
        self.delivery.dispatch(outbox);
        Ok(request)
    }

    /// Approves or rejects a pending request on behalf of the employee's manager.
    ///
    /// The request row stays locked for the whole unit, so of two concurrent decisions
    /// only the first sees `pending`. Approval debits the balance in the same unit and a
    /// failed debit leaves the request pending.
    #[instrument(name = "leave_decide", skip(self, comment))]
    pub async fn decide(
        &self,
        request_id: u64,
        decider_id: u64,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut tx = self.store.begin().await?;

        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| LeaveError::not_found(format!("leave request {request_id}")))?;

        let owner = tx.find_employee(request.employee_id).await?.ok_or_else(|| {
            LeaveError::integrity(format!(
                "leave request {request_id} belongs to unknown employee {}",
                request.employee_id
            ))
        })?;

        let authorized = match tx.find_employee(decider_id).await? {
            Some(decider) => gate::can_decide(&decider, &owner, &request),
            None => false,
        };
        if !authorized {
            warn!("Decision refused: decider is not the employee's manager");
            return Err(LeaveError::Forbidden);
        }

        if !request.is_pending() {
            return Err(LeaveError::AlreadyDecided {
                request_id,
                state: request.state,
            });
        }

        let next = decision.target_state();
        if decision == Decision::Approved {
            self.ledger
                .debit(&mut tx, request.balance_key(), request.amount.quantity())
                .await?;
        }

        let record = DecisionRecord {
            decided_by: decider_id,
            comment: comment
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            decided_at: Utc::now(),
        };

        if !tx.record_decision(request_id, next, &record).await? {
            let state = tx
                .find_request(request_id)
                .await?
                .map_or(request.state, |current| current.state);
            return Err(LeaveError::AlreadyDecided { request_id, state });
        }
        let decided = request.resolve(next, record)?;

        let (category, title, body) = notify::decision_message(&decided);
        let notification =
            notify::emit(&mut tx, decided.employee_id, category, title, body).await?;

        tx.commit().await?;

        info!(state = %decided.state, employee_id = decided.employee_id, "Leave request decided");
        self.delivery.dispatch(vec![notification]);
        Ok(decided)
    }

    /// Returns the balance, creating it from the policy default when absent.
    pub async fn get_or_create_balance(
        &self,
        employee_id: u64,
        kind: ResourceKind,
        year: i32,
    ) -> Result<BalanceRecord, LeaveError> {
        let mut tx = self.store.begin().await?;
        let record = self
            .ledger
            .get_or_create(&mut tx, BalanceKey::new(employee_id, kind, year))
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Both balances of an employee for a year. Missing records show the policy default
    /// and are not persisted.
    pub async fn balances(
        &self,
        employee_id: u64,
        year: i32,
    ) -> Result<Vec<BalanceRecord>, LeaveError> {
        let mut tx = self.store.begin().await?;
        if tx.find_employee(employee_id).await?.is_none() {
            return Err(LeaveError::not_found(format!("employee {employee_id}")));
        }

        let mut records = Vec::with_capacity(2);
        for kind in [ResourceKind::Days, ResourceKind::Hours] {
            let record = self
                .ledger
                .current(&mut tx, BalanceKey::new(employee_id, kind, year))
                .await?;
            record.available()?;
            records.push(record);
        }
        tx.commit().await?;
        Ok(records)
    }

    /// Loads a request for `viewer_id`. A missing request and a request the viewer may not
    /// see produce the same `Forbidden` answer.
    pub async fn view_request(
        &self,
        viewer_id: u64,
        request_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut tx = self.store.begin().await?;

        let Some(viewer) = tx.find_employee(viewer_id).await? else {
            return Err(LeaveError::Forbidden);
        };
        let Some(request) = tx.find_request(request_id).await? else {
            return Err(LeaveError::Forbidden);
        };
        let Some(owner) = tx.find_employee(request.employee_id).await? else {
            return Err(LeaveError::integrity(format!(
                "leave request {request_id} belongs to unknown employee {}",
                request.employee_id
            )));
        };

        if !gate::can_view(&viewer, &owner, &request) {
            return Err(LeaveError::Forbidden);
        }
        tx.commit().await?;
        Ok(request)
    }

    pub async fn requests_of(&self, employee_id: u64) -> Result<Vec<LeaveRequest>, LeaveError> {
        let mut tx = self.store.begin().await?;
        let requests = tx.requests_by_employee(employee_id).await?;
        tx.commit().await?;
        Ok(requests)
    }

    /// Pending requests the manager is allowed to decide.
    pub async fn pending_for(&self, manager_id: u64) -> Result<Vec<LeaveRequest>, LeaveError> {
        let mut tx = self.store.begin().await?;
        let requests = tx.pending_for_manager(manager_id).await?;
        tx.commit().await?;
        Ok(requests)
    }

    pub async fn team_calendar(
        &self,
        manager_id: u64,
        from: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, LeaveError> {
        let mut tx = self.store.begin().await?;
        let entries = tx.team_calendar(manager_id, from).await?;
        tx.commit().await?;
        Ok(entries)
    }

    pub async fn unread_notifications(
        &self,
        recipient_id: u64,
    ) -> Result<Vec<Notification>, LeaveError> {
        let mut tx = self.store.begin().await?;
        let notifications = tx.unread_notifications(recipient_id).await?;
        tx.commit().await?;
        Ok(notifications)
    }

    pub async fn mark_notification_read(
        &self,
        recipient_id: u64,
        notification_id: u64,
    ) -> Result<(), LeaveError> {
        let mut tx = self.store.begin().await?;
        if !tx
            .mark_notification_read(notification_id, recipient_id)
            .await?
        {
            return Err(LeaveError::not_found(format!(
                "notification {notification_id}"
            )));
        }
        tx.commit().await
    }

    /// Bulk import of vacation-day allocations, matched by employee email.
    ///
    /// Only admins may import. Rows with an unknown email, a negative amount, or an
    /// amount below what the employee already used are skipped and reported.
    #[instrument(name = "leave_import", skip(self, rows), fields(rows = rows.len()))]
    pub async fn import_allocations(
        &self,
        actor_id: u64,
        year: i32,
        rows: Vec<AllocationRow>,
    ) -> Result<ImportReport, LeaveError> {
        let mut tx = self.store.begin().await?;

        if !tx
            .find_employee(actor_id)
            .await?
            .is_some_and(|actor| actor.is_admin())
        {
            return Err(LeaveError::Forbidden);
        }

        let mut report = ImportReport::default();
        for row in rows {
            let email = row.email.trim().to_string();
            let employee: Option<Employee> = if email.is_empty() {
                None
            } else {
                tx.find_employee_by_email(&email).await?
            };
            let Some(employee) = employee else {
                report.skipped.push((email, "unknown employee".to_string()));
                continue;
            };

            let key = BalanceKey::new(employee.id, ResourceKind::Days, year);
            match self.ledger.set_allocated(&mut tx, key, row.days).await {
                Ok(_) => report.updated += 1,
                Err(LeaveError::Validation(reason)) => report.skipped.push((email, reason)),
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;
        info!(updated = report.updated, skipped = report.skipped.len(), "Allocations imported");
        Ok(report)
    }
}

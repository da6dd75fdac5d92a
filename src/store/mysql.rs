use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    FromRow, MySql, MySqlPool, Transaction,
    mysql::MySqlDatabaseError,
};

use super::{LeaveStore, LeaveTx};
use crate::error::LeaveError;
use crate::model::{
    balance::{Allocation, BalanceKey, BalanceRecord, ResourceKind},
    employee::Employee,
    leave_request::{
        Amount, CalendarEntry, DecisionRecord, LeaveRequest, NewLeaveRequest, RequestState,
    },
    notification::{NewNotification, Notification, NotificationCategory},
    role::Role,
};

// MySQL error numbers for a detected deadlock and an expired lock wait.
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

impl From<sqlx::Error> for LeaveError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(mysql_err) = db_err.try_downcast_ref::<MySqlDatabaseError>() {
                if matches!(mysql_err.number(), ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK) {
                    return LeaveError::Contention;
                }
            }
        }
        LeaveError::Storage(e.into())
    }
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl LeaveStore for MySqlStore {
    type Tx = MySqlTx;

    async fn begin(&self) -> Result<MySqlTx, LeaveError> {
        let tx = self.pool.begin().await?;
        Ok(MySqlTx { tx })
    }
}

/// Rolls back on drop unless committed.
pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

/* =========================
Row types
========================= */

#[derive(FromRow)]
struct EmployeeRow {
    id: u64,
    display_name: String,
    email: String,
    role: String,
    manager_id: Option<u64>,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = LeaveError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role).map_err(|_| {
            LeaveError::integrity(format!("employee {} has unknown role {:?}", row.id, row.role))
        })?;
        Ok(Employee {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            role,
            manager_id: row.manager_id,
        })
    }
}

#[derive(FromRow)]
struct BalanceRow {
    employee_id: u64,
    kind: String,
    year: i32,
    allocated: i32,
    bonus: i32,
    used: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for BalanceRecord {
    type Error = LeaveError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        let allocation = match parse_kind(&row.kind)? {
            ResourceKind::Days => Allocation::Days {
                allocated: row.allocated,
                bonus: row.bonus,
            },
            ResourceKind::Hours => {
                if row.bonus != 0 {
                    return Err(LeaveError::integrity(format!(
                        "hours balance of employee {} for {} carries a bonus",
                        row.employee_id, row.year
                    )));
                }
                Allocation::Hours {
                    allocated: row.allocated,
                }
            }
        };
        Ok(BalanceRecord {
            employee_id: row.employee_id,
            year: row.year,
            allocation,
            used: row.used,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LeaveRequestRow {
    id: u64,
    employee_id: u64,
    kind: String,
    quantity: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: Option<String>,
    status: String,
    decided_by: Option<u64>,
    decision_comment: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeaveRequestRow> for LeaveRequest {
    type Error = LeaveError;

    fn try_from(row: LeaveRequestRow) -> Result<Self, Self::Error> {
        let state = RequestState::from_str(&row.status).map_err(|_| {
            LeaveError::integrity(format!(
                "leave request {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;

        let decision = match (state, row.decided_by, row.decided_at) {
            (RequestState::Pending, _, _) => None,
            (_, Some(decided_by), Some(decided_at)) => Some(DecisionRecord {
                decided_by,
                comment: row.decision_comment,
                decided_at,
            }),
            _ => {
                return Err(LeaveError::integrity(format!(
                    "leave request {} is {} without decision metadata",
                    row.id, state
                )));
            }
        };

        Ok(LeaveRequest {
            id: row.id,
            employee_id: row.employee_id,
            amount: Amount::new(parse_kind(&row.kind)?, row.quantity),
            start_date: row.start_date,
            end_date: row.end_date,
            reason: row.reason,
            state,
            decision,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: u64,
    recipient_id: u64,
    category: String,
    title: String,
    body: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = LeaveError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let category = NotificationCategory::from_str(&row.category).map_err(|_| {
            LeaveError::integrity(format!(
                "notification {} has unknown category {:?}",
                row.id, row.category
            ))
        })?;
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            category,
            title: row.title,
            body: row.body,
            read: row.is_read,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct CalendarRow {
    request_id: u64,
    employee_id: u64,
    display_name: String,
    kind: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

fn parse_kind(raw: &str) -> Result<ResourceKind, LeaveError> {
    ResourceKind::from_str(raw)
        .map_err(|_| LeaveError::integrity(format!("unknown resource kind {raw:?}")))
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, LeaveError>
where
    T: TryFrom<R, Error = LeaveError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/* =========================
Queries
========================= */

const EMPLOYEE_COLUMNS: &str = "id, display_name, email, role, manager_id";
const BALANCE_COLUMNS: &str = "employee_id, kind, year, allocated, bonus, used, updated_at";
const REQUEST_COLUMNS: &str = r#"
    r.id, r.employee_id, r.kind, r.quantity, r.start_date, r.end_date, r.reason,
    r.status, r.decided_by, r.decision_comment, r.decided_at, r.created_at
"#;
const NOTIFICATION_COLUMNS: &str = "id, recipient_id, category, title, body, is_read, created_at";

/// Locking mode of a single-row read. Locking reads bypass the transaction's
/// consistent snapshot and see the latest committed row.
#[derive(Clone, Copy)]
enum RowLock {
    None,
    Share,
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::None => "",
            RowLock::Share => " LOCK IN SHARE MODE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

impl MySqlTx {
    async fn fetch_balance(
        &mut self,
        key: &BalanceKey,
        lock: RowLock,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM leave_balances \
             WHERE employee_id = ? AND kind = ? AND year = ?{}",
            lock.clause()
        );
        sqlx::query_as::<_, BalanceRow>(&sql)
            .bind(key.employee_id)
            .bind(key.kind.as_ref())
            .bind(key.year)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(BalanceRecord::try_from)
            .transpose()
    }

    async fn fetch_request(
        &mut self,
        id: u64,
        lock: RowLock,
    ) -> Result<Option<LeaveRequest>, LeaveError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM leave_requests r WHERE r.id = ?{}",
            lock.clause()
        );
        sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(LeaveRequest::try_from)
            .transpose()
    }
}

impl LeaveTx for MySqlTx {
    async fn find_employee(&mut self, id: u64) -> Result<Option<Employee>, LeaveError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?");
        sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Employee::try_from)
            .transpose()
    }

    async fn find_employee_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Employee>, LeaveError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE email = ?");
        sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Employee::try_from)
            .transpose()
    }

    async fn find_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        self.fetch_balance(key, RowLock::None).await
    }

    async fn share_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        self.fetch_balance(key, RowLock::Share).await
    }

    async fn lock_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        self.fetch_balance(key, RowLock::Update).await
    }

    async fn insert_balance_if_absent(
        &mut self,
        record: &BalanceRecord,
    ) -> Result<bool, LeaveError> {
        // The unique key (employee_id, kind, year) makes the first writer win. A duplicate
        // key error does not abort a MySQL transaction, so the loser just reports false.
        let result = sqlx::query(
            r#"
            INSERT INTO leave_balances
                (employee_id, kind, year, allocated, bonus, used, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.employee_id)
        .bind(record.kind().as_ref())
        .bind(record.year)
        .bind(record.allocation.allocated())
        .bind(record.allocation.bonus().unwrap_or(0))
        .bind(record.used)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_balance(&mut self, record: &BalanceRecord) -> Result<(), LeaveError> {
        let result = sqlx::query(
            r#"
            UPDATE leave_balances
            SET allocated = ?, bonus = ?, used = ?, updated_at = ?
            WHERE employee_id = ? AND kind = ? AND year = ?
            "#,
        )
        .bind(record.allocation.allocated())
        .bind(record.allocation.bonus().unwrap_or(0))
        .bind(record.used)
        .bind(record.updated_at)
        .bind(record.employee_id)
        .bind(record.kind().as_ref())
        .bind(record.year)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LeaveError::integrity(format!(
                "{} balance of employee {} for {} vanished during update",
                record.kind(),
                record.employee_id,
                record.year
            )));
        }
        Ok(())
    }

    async fn insert_request(&mut self, new: NewLeaveRequest) -> Result<LeaveRequest, LeaveError> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (employee_id, kind, quantity, start_date, end_date, reason, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.amount.kind().as_ref())
        .bind(new.amount.quantity())
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.reason.as_deref())
        .bind(RequestState::Pending.as_ref())
        .bind(new.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(new.into_request(result.last_insert_id()))
    }

    async fn find_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError> {
        self.fetch_request(id, RowLock::None).await
    }

    async fn lock_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError> {
        self.fetch_request(id, RowLock::Update).await
    }

    async fn record_decision(
        &mut self,
        id: u64,
        state: RequestState,
        decision: &DecisionRecord,
    ) -> Result<bool, LeaveError> {
        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?, decided_by = ?, decision_comment = ?, decided_at = ?
            WHERE id = ?
            AND status = 'pending'
            "#,
        )
        .bind(state.as_ref())
        .bind(decision.decided_by)
        .bind(decision.comment.as_deref())
        .bind(decision.decided_at)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn requests_by_employee(
        &mut self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, LeaveError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM leave_requests r \
             WHERE r.employee_id = ? ORDER BY r.created_at DESC, r.id DESC"
        );
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(employee_id)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn pending_for_manager(
        &mut self,
        manager_id: u64,
    ) -> Result<Vec<LeaveRequest>, LeaveError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM leave_requests r \
             JOIN employees e ON r.employee_id = e.id \
             WHERE e.manager_id = ? AND r.status = 'pending' \
             ORDER BY r.created_at ASC, r.id ASC"
        );
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(manager_id)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn team_calendar(
        &mut self,
        manager_id: u64,
        from: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, LeaveError> {
        let rows = sqlx::query_as::<_, CalendarRow>(
            r#"
            SELECT r.id AS request_id, e.id AS employee_id, e.display_name,
                   r.kind, r.start_date, r.end_date
            FROM leave_requests r
            JOIN employees e ON r.employee_id = e.id
            WHERE e.manager_id = ? AND r.status = 'approved'
            AND r.end_date >= ?
            ORDER BY r.start_date ASC, r.id ASC
            "#,
        )
        .bind(manager_id)
        .bind(from)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CalendarEntry {
                    request_id: row.request_id,
                    employee_id: row.employee_id,
                    display_name: row.display_name,
                    kind: parse_kind(&row.kind)?,
                    start_date: row.start_date,
                    end_date: row.end_date,
                })
            })
            .collect()
    }

    async fn insert_notification(
        &mut self,
        new: NewNotification,
    ) -> Result<Notification, LeaveError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (recipient_id, category, title, body, is_read, created_at)
            VALUES (?, ?, ?, ?, FALSE, ?)
            "#,
        )
        .bind(new.recipient_id)
        .bind(new.category.as_ref())
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(new.into_notification(result.last_insert_id()))
    }

    async fn unread_notifications(
        &mut self,
        recipient_id: u64,
    ) -> Result<Vec<Notification>, LeaveError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE recipient_id = ? AND is_read = FALSE \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(recipient_id)
            .fetch_all(&mut *self.tx)
            .await?;
        convert_all(rows)
    }

    async fn mark_notification_read(
        &mut self,
        id: u64,
        recipient_id: u64,
    ) -> Result<bool, LeaveError> {
        // Counting matched rows instead of changed rows keeps re-marking idempotent.
        let matched = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE id = ? AND recipient_id = ?",
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_one(&mut *self.tx)
        .await?;

        if matched == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND recipient_id = ?")
            .bind(id)
            .bind(recipient_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(true)
    }

    async fn commit(self) -> Result<(), LeaveError> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit leave transaction");
            LeaveError::from(e)
        })
    }
}

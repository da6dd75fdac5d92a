//! Transactional persistence for the leave engine.
//!
//! Every submission and decision runs inside one [`LeaveTx`]. Dropping a transaction
//! without calling [`LeaveTx::commit`] rolls it back, so an early `?` return leaves no
//! partial writes behind.

use chrono::NaiveDate;

use crate::error::LeaveError;
use crate::model::{
    balance::{BalanceKey, BalanceRecord},
    employee::Employee,
    leave_request::{CalendarEntry, DecisionRecord, LeaveRequest, NewLeaveRequest, RequestState},
    notification::{NewNotification, Notification},
};

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub use mysql::MySqlStore;

pub trait LeaveStore {
    type Tx: LeaveTx;

    async fn begin(&self) -> Result<Self::Tx, LeaveError>;
}

pub trait LeaveTx {
    async fn find_employee(&mut self, id: u64) -> Result<Option<Employee>, LeaveError>;

    async fn find_employee_by_email(&mut self, email: &str)
    -> Result<Option<Employee>, LeaveError>;

    /// Plain read, no lock. Used by the advisory check.
    async fn find_balance(&mut self, key: &BalanceKey)
    -> Result<Option<BalanceRecord>, LeaveError>;

    /// Shared-lock read. Sees rows committed after the transaction's snapshot was taken,
    /// which a plain read may not.
    async fn share_balance(&mut self, key: &BalanceKey)
    -> Result<Option<BalanceRecord>, LeaveError>;

    /// Read holding a row lock until the transaction ends.
    async fn lock_balance(&mut self, key: &BalanceKey)
    -> Result<Option<BalanceRecord>, LeaveError>;

    /// Inserts unless a record with the same key exists. Returns whether this call inserted.
    async fn insert_balance_if_absent(&mut self, record: &BalanceRecord)
    -> Result<bool, LeaveError>;

    async fn update_balance(&mut self, record: &BalanceRecord) -> Result<(), LeaveError>;

    async fn insert_request(&mut self, new: NewLeaveRequest) -> Result<LeaveRequest, LeaveError>;

    async fn find_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError>;

    /// Read holding a row lock until the transaction ends.
    async fn lock_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError>;

    /// Compare-and-swap out of `pending`. Returns `false` when the request was no longer pending.
    async fn record_decision(
        &mut self,
        id: u64,
        state: RequestState,
        decision: &DecisionRecord,
    ) -> Result<bool, LeaveError>;

    /// Newest first.
    async fn requests_by_employee(&mut self, employee_id: u64)
    -> Result<Vec<LeaveRequest>, LeaveError>;

    /// Pending requests of the manager's direct reports, oldest first.
    async fn pending_for_manager(&mut self, manager_id: u64)
    -> Result<Vec<LeaveRequest>, LeaveError>;

    /// Approved absences of the manager's direct reports ending on or after `from`.
    async fn team_calendar(
        &mut self,
        manager_id: u64,
        from: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, LeaveError>;

    async fn insert_notification(
        &mut self,
        new: NewNotification,
    ) -> Result<Notification, LeaveError>;

    /// Newest first.
    async fn unread_notifications(&mut self, recipient_id: u64)
    -> Result<Vec<Notification>, LeaveError>;

    /// Returns `false` when no notification with that id belongs to the recipient.
    async fn mark_notification_read(&mut self, id: u64, recipient_id: u64)
    -> Result<bool, LeaveError>;

    async fn commit(self) -> Result<(), LeaveError>;
}

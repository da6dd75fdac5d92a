//! In-process store used by the engine tests.
//!
//! A transaction holds the store-wide async mutex from `begin` until it is committed or
//! dropped and works on a private copy of the state, so units are fully serialized and a
//! dropped transaction leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LeaveStore, LeaveTx};
use crate::error::LeaveError;
use crate::model::{
    balance::{BalanceKey, BalanceRecord},
    employee::Employee,
    leave_request::{
        CalendarEntry, DecisionRecord, LeaveRequest, NewLeaveRequest, RequestState,
    },
    notification::{NewNotification, Notification},
};

#[derive(Clone, Default)]
pub struct MemoryState {
    pub employees: BTreeMap<u64, Employee>,
    pub balances: BTreeMap<BalanceKey, BalanceRecord>,
    pub requests: BTreeMap<u64, LeaveRequest>,
    pub notifications: BTreeMap<u64, Notification>,
    next_request_id: u64,
    next_notification_id: u64,
    fail_notification_writes: bool,
    rival_balances: BTreeMap<BalanceKey, BalanceRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_employee(&self, employee: Employee) {
        let mut state = self.state.lock().await;
        state.employees.insert(employee.id, employee);
    }

    pub async fn put_balance(&self, record: BalanceRecord) {
        let mut state = self.state.lock().await;
        state.balances.insert(record.key(), record);
    }

    /// Makes every following notification insert fail, to exercise rollback.
    pub async fn fail_notification_writes(&self) {
        self.state.lock().await.fail_notification_writes = true;
    }

    /// Lets another unit win the creation race for `record`'s key: it commits `record`
    /// just before the next insert of that key, and plain reads of the losing unit keep
    /// answering from the older snapshot, as MySQL's repeatable read does.
    pub async fn commit_rival_balance(&self, record: BalanceRecord) {
        self.state
            .lock()
            .await
            .rival_balances
            .insert(record.key(), record);
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn balance(&self, key: &BalanceKey) -> Option<BalanceRecord> {
        self.state.lock().await.balances.get(key).cloned()
    }

    pub async fn request(&self, id: u64) -> Option<LeaveRequest> {
        self.state.lock().await.requests.get(&id).cloned()
    }

    pub async fn notifications_for(&self, recipient_id: u64) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }
}

impl LeaveStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, LeaveError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            stale: BTreeSet::new(),
        })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    /// Keys a rival committed after this unit's snapshot; plain reads miss them.
    stale: BTreeSet<BalanceKey>,
}

impl MemoryTx {
    fn reports_of(&self, manager_id: u64) -> impl Iterator<Item = &LeaveRequest> + '_ {
        self.working.requests.values().filter(move |r| {
            self.working
                .employees
                .get(&r.employee_id)
                .is_some_and(|e| e.reports_to(manager_id))
        })
    }
}

impl LeaveTx for MemoryTx {
    async fn find_employee(&mut self, id: u64) -> Result<Option<Employee>, LeaveError> {
        Ok(self.working.employees.get(&id).cloned())
    }

    async fn find_employee_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Employee>, LeaveError> {
        Ok(self
            .working
            .employees
            .values()
            .find(|e| e.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        if self.stale.contains(key) {
            return Ok(None);
        }
        Ok(self.working.balances.get(key).cloned())
    }

    async fn share_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        Ok(self.working.balances.get(key).cloned())
    }

    async fn lock_balance(
        &mut self,
        key: &BalanceKey,
    ) -> Result<Option<BalanceRecord>, LeaveError> {
        Ok(self.working.balances.get(key).cloned())
    }

    async fn insert_balance_if_absent(
        &mut self,
        record: &BalanceRecord,
    ) -> Result<bool, LeaveError> {
        let key = record.key();
        if let Some(rival) = self.working.rival_balances.remove(&key) {
            // The rival's commit survives whatever this unit does next.
            self.guard.rival_balances.remove(&key);
            self.guard.balances.insert(key, rival.clone());
            self.working.balances.insert(key, rival);
            self.stale.insert(key);
            return Ok(false);
        }
        if self.working.balances.contains_key(&key) {
            return Ok(false);
        }
        self.working.balances.insert(record.key(), record.clone());
        Ok(true)
    }

    async fn update_balance(&mut self, record: &BalanceRecord) -> Result<(), LeaveError> {
        match self.working.balances.get_mut(&record.key()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(LeaveError::integrity("balance vanished during update")),
        }
    }

    async fn insert_request(&mut self, new: NewLeaveRequest) -> Result<LeaveRequest, LeaveError> {
        self.working.next_request_id += 1;
        let request = new.into_request(self.working.next_request_id);
        self.working.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError> {
        Ok(self.working.requests.get(&id).cloned())
    }

    async fn lock_request(&mut self, id: u64) -> Result<Option<LeaveRequest>, LeaveError> {
        self.find_request(id).await
    }

    async fn record_decision(
        &mut self,
        id: u64,
        state: RequestState,
        decision: &DecisionRecord,
    ) -> Result<bool, LeaveError> {
        match self.working.requests.get_mut(&id) {
            Some(request) if request.is_pending() => {
                request.state = state;
                request.decision = Some(decision.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requests_by_employee(
        &mut self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, LeaveError> {
        Ok(self
            .working
            .requests
            .values()
            .rev()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect())
    }

    async fn pending_for_manager(
        &mut self,
        manager_id: u64,
    ) -> Result<Vec<LeaveRequest>, LeaveError> {
        Ok(self
            .reports_of(manager_id)
            .filter(|r| r.is_pending())
            .cloned()
            .collect())
    }

    async fn team_calendar(
        &mut self,
        manager_id: u64,
        from: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, LeaveError> {
        let mut entries: Vec<CalendarEntry> = self
            .reports_of(manager_id)
            .filter(|r| r.state == RequestState::Approved && r.end_date >= from)
            .map(|r| CalendarEntry {
                request_id: r.id,
                employee_id: r.employee_id,
                display_name: self.working.employees[&r.employee_id].display_name.clone(),
                kind: r.amount.kind(),
                start_date: r.start_date,
                end_date: r.end_date,
            })
            .collect();
        entries.sort_by_key(|e| (e.start_date, e.request_id));
        Ok(entries)
    }

    async fn insert_notification(
        &mut self,
        new: NewNotification,
    ) -> Result<Notification, LeaveError> {
        if self.working.fail_notification_writes {
            return Err(LeaveError::Storage(anyhow!("notification write rejected")));
        }
        self.working.next_notification_id += 1;
        let notification = new.into_notification(self.working.next_notification_id);
        self.working
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn unread_notifications(
        &mut self,
        recipient_id: u64,
    ) -> Result<Vec<Notification>, LeaveError> {
        Ok(self
            .working
            .notifications
            .values()
            .rev()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &mut self,
        id: u64,
        recipient_id: u64,
    ) -> Result<bool, LeaveError> {
        match self.working.notifications.get_mut(&id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self) -> Result<(), LeaveError> {
        let MemoryTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }
}

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::balance::{BalanceKey, ResourceKind};
use crate::error::LeaveError;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestState {
    Pending,
    Approved,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }

    /// Only `pending -> approved` and `pending -> rejected` exist.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        self == RequestState::Pending && next.is_terminal()
    }
}

/// A manager's verdict on a pending request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn target_state(self) -> RequestState {
        match self {
            Decision::Approved => RequestState::Approved,
            Decision::Rejected => RequestState::Rejected,
        }
    }
}

/// Requested quantity, tagged with its unit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Amount {
    Days(i32),
    Hours(i32),
}

impl Amount {
    pub fn new(kind: ResourceKind, quantity: i32) -> Self {
        match kind {
            ResourceKind::Days => Amount::Days(quantity),
            ResourceKind::Hours => Amount::Hours(quantity),
        }
    }

    pub fn kind(self) -> ResourceKind {
        match self {
            Amount::Days(_) => ResourceKind::Days,
            Amount::Hours(_) => ResourceKind::Hours,
        }
    }

    pub fn quantity(self) -> i32 {
        match self {
            Amount::Days(n) | Amount::Hours(n) => n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub decided_by: u64,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub amount: Amount,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub state: RequestState,
    /// Present exactly when `state` is terminal.
    pub decision: Option<DecisionRecord>,
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Balances are charged to the year the request starts in.
    pub fn balance_year(&self) -> i32 {
        self.start_date.year()
    }

    pub fn balance_key(&self) -> BalanceKey {
        BalanceKey::new(self.employee_id, self.amount.kind(), self.balance_year())
    }

    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }

    /// Moves the request into a terminal state, enforcing the one-way state machine.
    pub fn resolve(
        mut self,
        next: RequestState,
        decision: DecisionRecord,
    ) -> Result<Self, LeaveError> {
        if !self.state.can_transition_to(next) {
            return Err(LeaveError::AlreadyDecided {
                request_id: self.id,
                state: self.state,
            });
        }
        self.state = next;
        self.decision = Some(decision);
        Ok(self)
    }
}

/// A request about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub employee_id: u64,
    pub amount: Amount,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewLeaveRequest {
    pub fn into_request(self, id: u64) -> LeaveRequest {
        LeaveRequest {
            id,
            employee_id: self.employee_id,
            amount: self.amount,
            start_date: self.start_date,
            end_date: self.end_date,
            reason: self.reason,
            state: RequestState::Pending,
            decision: None,
            created_at: self.created_at,
        }
    }
}

/// Approved absence shown on a manager's team calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub request_id: u64,
    pub employee_id: u64,
    pub display_name: String,
    pub kind: ResourceKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::LeaveError;

/// The two resources an employee draws on.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    /// Vacation, counted in days.
    Days,
    /// Special permission, counted in hours.
    Hours,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BalanceKey {
    pub employee_id: u64,
    pub kind: ResourceKind,
    pub year: i32,
}

impl BalanceKey {
    pub fn new(employee_id: u64, kind: ResourceKind, year: i32) -> Self {
        Self {
            employee_id,
            kind,
            year,
        }
    }
}

/// Granted quantities; `bonus` only exists for vacation days.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Allocation {
    Days { allocated: i32, bonus: i32 },
    Hours { allocated: i32 },
}

impl Allocation {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Allocation::Days { .. } => ResourceKind::Days,
            Allocation::Hours { .. } => ResourceKind::Hours,
        }
    }

    pub fn allocated(&self) -> i32 {
        match *self {
            Allocation::Days { allocated, .. } | Allocation::Hours { allocated } => allocated,
        }
    }

    pub fn bonus(&self) -> Option<i32> {
        match *self {
            Allocation::Days { bonus, .. } => Some(bonus),
            Allocation::Hours { .. } => None,
        }
    }

    /// `allocated + bonus`, or `None` when the sum does not fit.
    pub fn total(&self) -> Option<i32> {
        self.allocated().checked_add(self.bonus().unwrap_or(0))
    }

    /// Same allocation with the base grant replaced, bonus preserved.
    pub fn with_allocated(self, allocated: i32) -> Self {
        match self {
            Allocation::Days { bonus, .. } => Allocation::Days { allocated, bonus },
            Allocation::Hours { .. } => Allocation::Hours { allocated },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub employee_id: u64,
    pub year: i32,
    pub allocation: Allocation,
    pub used: i32,
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    #[cfg(test)]
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.employee_id, self.allocation.kind(), self.year)
    }

    pub fn kind(&self) -> ResourceKind {
        self.allocation.kind()
    }

    /// `allocated + bonus` for days, `allocated` for hours.
    pub fn granted(&self) -> Result<i32, LeaveError> {
        self.allocation.total().ok_or_else(|| {
            LeaveError::integrity(format!(
                "{} grant of employee {} for {} overflows",
                self.kind(),
                self.employee_id,
                self.year
            ))
        })
    }

    /// Remaining usable quantity.
    ///
    /// A record with negative components or `used` above the grant can only come from a
    /// bug or an out-of-band write, so it is reported as a data integrity error instead of
    /// being clamped to zero.
    pub fn available(&self) -> Result<i32, LeaveError> {
        let bonus = self.allocation.bonus().unwrap_or(0);
        if self.allocation.allocated() < 0 || bonus < 0 || self.used < 0 {
            return Err(LeaveError::integrity(format!(
                "negative component in {} balance of employee {} for {}",
                self.kind(),
                self.employee_id,
                self.year
            )));
        }

        let granted = self.granted()?;
        let available = granted - self.used;
        if available < 0 {
            return Err(LeaveError::integrity(format!(
                "{} balance of employee {} for {} is overdrawn: used {} of {}",
                self.kind(),
                self.employee_id,
                self.year,
                self.used,
                granted
            )));
        }

        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(allocated: i32, bonus: i32, used: i32) -> BalanceRecord {
        BalanceRecord {
            employee_id: 1,
            year: 2026,
            allocation: Allocation::Days { allocated, bonus },
            used,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn days_available_includes_bonus() {
        assert_eq!(days(22, 3, 5).available().unwrap(), 20);
    }

    #[test]
    fn hours_available_has_no_bonus() {
        let record = BalanceRecord {
            employee_id: 1,
            year: 2026,
            allocation: Allocation::Hours { allocated: 24 },
            used: 10,
            updated_at: Utc::now(),
        };
        assert_eq!(record.available().unwrap(), 14);
        assert_eq!(record.allocation.bonus(), None);
        assert_eq!(record.key(), BalanceKey::new(1, ResourceKind::Hours, 2026));
    }

    #[test]
    fn overdrawn_balance_is_an_integrity_error() {
        let err = days(20, 0, 21).available().unwrap_err();
        assert!(matches!(err, LeaveError::DataIntegrity(_)));
    }

    #[test]
    fn negative_component_is_an_integrity_error() {
        let err = days(22, -1, 0).available().unwrap_err();
        assert!(matches!(err, LeaveError::DataIntegrity(_)));
    }

    #[test]
    fn grant_overflow_is_an_integrity_error() {
        let err = days(i32::MAX, 1, 0).available().unwrap_err();
        assert!(matches!(err, LeaveError::DataIntegrity(_)));
        assert_eq!(
            Allocation::Days { allocated: i32::MAX, bonus: 1 }.total(),
            None
        );
    }

    #[test]
    fn with_allocated_keeps_bonus() {
        let allocation = Allocation::Days {
            allocated: 22,
            bonus: 2,
        }
        .with_allocated(25);
        assert_eq!(
            allocation,
            Allocation::Days {
                allocated: 25,
                bonus: 2
            }
        );
    }
}

use chrono::Utc;
use tracing::{debug, info};

use crate::config::LeavePolicy;
use crate::error::LeaveError;
use crate::model::balance::{Allocation, BalanceKey, BalanceRecord, ResourceKind};
use crate::store::LeaveTx;

/// Outcome of the advisory check run at submission time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReserveCheck {
    pub ok: bool,
    pub available: i32,
}

/// Per-employee, per-year balances of vacation days and permission hours.
///
/// Every method works inside the caller's transaction so that balance reads and writes
/// commit or roll back together with the request they belong to.
#[derive(Clone, Debug)]
pub struct Ledger {
    policy: LeavePolicy,
}

impl Ledger {
    pub fn new(policy: LeavePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LeavePolicy {
        &self.policy
    }

    pub fn default_allocation(&self, kind: ResourceKind) -> Allocation {
        match kind {
            ResourceKind::Days => Allocation::Days {
                allocated: self.policy.default_vacation_days,
                bonus: 0,
            },
            ResourceKind::Hours => Allocation::Hours {
                allocated: self.policy.default_permission_hours,
            },
        }
    }

    /// The record a key would get if it were created now. Not persisted.
    pub fn default_record(&self, key: BalanceKey) -> BalanceRecord {
        BalanceRecord {
            employee_id: key.employee_id,
            year: key.year,
            allocation: self.default_allocation(key.kind),
            used: 0,
            updated_at: Utc::now(),
        }
    }

    /// Existing record, or the default one without persisting it.
    pub async fn current<T: LeaveTx>(
        &self,
        tx: &mut T,
        key: BalanceKey,
    ) -> Result<BalanceRecord, LeaveError> {
        Ok(match tx.find_balance(&key).await? {
            Some(record) => record,
            None => self.default_record(key),
        })
    }

    /// Returns the record for `key`, creating it from the policy default when absent.
    ///
    /// Concurrent callers for the same key converge on a single record: the insert is a
    /// no-op for everyone but the first writer, and all of them read back the stored row.
    /// The read-back takes a shared lock, since a plain read may still answer from a
    /// snapshot older than the winner's commit.
    pub async fn get_or_create<T: LeaveTx>(
        &self,
        tx: &mut T,
        key: BalanceKey,
    ) -> Result<BalanceRecord, LeaveError> {
        if let Some(record) = tx.find_balance(&key).await? {
            return Ok(record);
        }

        let fresh = self.default_record(key);
        if tx.insert_balance_if_absent(&fresh).await? {
            info!(
                employee_id = key.employee_id,
                kind = %key.kind,
                year = key.year,
                allocated = fresh.allocation.allocated(),
                "Created default balance"
            );
        }

        tx.share_balance(&key)
            .await?
            .ok_or_else(|| LeaveError::integrity("balance missing right after creation"))
    }

    /// Advisory check: never changes `used` and takes no lock.
    pub async fn reserve_check<T: LeaveTx>(
        &self,
        tx: &mut T,
        key: BalanceKey,
        quantity: i32,
    ) -> Result<ReserveCheck, LeaveError> {
        let record = self.get_or_create(tx, key).await?;
        let available = record.available()?;
        debug!(
            employee_id = key.employee_id,
            kind = %key.kind,
            year = key.year,
            available,
            quantity,
            "Advisory balance check"
        );
        Ok(ReserveCheck {
            ok: quantity <= available,
            available,
        })
    }

    /// Authoritative debit. Re-checks availability under a row lock and increments `used`.
    pub async fn debit<T: LeaveTx>(
        &self,
        tx: &mut T,
        key: BalanceKey,
        quantity: i32,
    ) -> Result<BalanceRecord, LeaveError> {
        if quantity <= 0 {
            return Err(LeaveError::validation("quantity must be greater than zero"));
        }

        self.get_or_create(tx, key).await?;
        let mut record = tx
            .lock_balance(&key)
            .await?
            .ok_or_else(|| LeaveError::integrity("balance missing under lock"))?;

        let available = record.available()?;
        if quantity > available {
            return Err(LeaveError::InsufficientBalance {
                kind: key.kind,
                available,
                requested: quantity,
            });
        }

        record.used += quantity;
        record.updated_at = Utc::now();
        tx.update_balance(&record).await?;

        info!(
            employee_id = key.employee_id,
            kind = %key.kind,
            year = key.year,
            quantity,
            used = record.used,
            "Balance debited"
        );
        Ok(record)
    }

    /// Replaces the base grant of a balance, creating the record when absent.
    /// `used` is left untouched; a grant below current usage is refused.
    pub async fn set_allocated<T: LeaveTx>(
        &self,
        tx: &mut T,
        key: BalanceKey,
        allocated: i32,
    ) -> Result<BalanceRecord, LeaveError> {
        if allocated < 0 {
            return Err(LeaveError::validation("allocation must not be negative"));
        }

        self.get_or_create(tx, key).await?;
        let mut record = tx
            .lock_balance(&key)
            .await?
            .ok_or_else(|| LeaveError::integrity("balance missing under lock"))?;

        let updated = record.allocation.with_allocated(allocated);
        let granted = updated
            .total()
            .ok_or_else(|| LeaveError::validation(format!("allocation {allocated} is too large")))?;
        if granted < record.used {
            return Err(LeaveError::validation(format!(
                "allocation {allocated} is below the {} already used",
                record.used
            )));
        }

        record.allocation = updated;
        record.updated_at = Utc::now();
        tx.update_balance(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeaveStore, memory::MemoryStore};

    fn key(kind: ResourceKind) -> BalanceKey {
        BalanceKey::new(1, kind, 2026)
    }

    #[actix_web::test]
    async fn get_or_create_seeds_policy_defaults() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());

        let mut tx = store.begin().await.unwrap();
        let days = ledger.get_or_create(&mut tx, key(ResourceKind::Days)).await.unwrap();
        let hours = ledger.get_or_create(&mut tx, key(ResourceKind::Hours)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(days.allocation, Allocation::Days { allocated: 22, bonus: 0 });
        assert_eq!(hours.allocation, Allocation::Hours { allocated: 24 });
        assert_eq!(store.snapshot().await.balances.len(), 2);
    }

    #[actix_web::test]
    async fn get_or_create_keeps_existing_record() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());
        let mut existing = ledger.default_record(key(ResourceKind::Days));
        existing.used = 7;
        store.put_balance(existing.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let record = ledger.get_or_create(&mut tx, key(ResourceKind::Days)).await.unwrap();
        assert_eq!(record, existing);
    }

    #[actix_web::test]
    async fn reserve_check_does_not_debit() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());

        let mut tx = store.begin().await.unwrap();
        let check = ledger
            .reserve_check(&mut tx, key(ResourceKind::Hours), 30)
            .await
            .unwrap();
        assert_eq!(check, ReserveCheck { ok: false, available: 24 });

        let check = ledger
            .reserve_check(&mut tx, key(ResourceKind::Hours), 24)
            .await
            .unwrap();
        assert!(check.ok);
        tx.commit().await.unwrap();

        let stored = store.balance(&key(ResourceKind::Hours)).await.unwrap();
        assert_eq!(stored.used, 0);
    }

    #[actix_web::test]
    async fn debit_refuses_to_overdraw() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());

        let mut tx = store.begin().await.unwrap();
        let record = ledger.debit(&mut tx, key(ResourceKind::Days), 20).await.unwrap();
        assert_eq!(record.used, 20);

        let err = ledger
            .debit(&mut tx, key(ResourceKind::Days), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LeaveError::InsufficientBalance { available: 2, requested: 3, .. }
        ));
    }

    #[actix_web::test]
    async fn set_allocated_preserves_usage() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());

        let mut tx = store.begin().await.unwrap();
        ledger.debit(&mut tx, key(ResourceKind::Days), 10).await.unwrap();
        let record = ledger
            .set_allocated(&mut tx, key(ResourceKind::Days), 30)
            .await
            .unwrap();
        assert_eq!(record.used, 10);
        assert_eq!(record.available().unwrap(), 20);

        let err = ledger
            .set_allocated(&mut tx, key(ResourceKind::Days), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::Validation(_)));
    }

    #[actix_web::test]
    async fn set_allocated_rejects_grant_overflow() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());
        let mut record = ledger.default_record(key(ResourceKind::Days));
        record.allocation = Allocation::Days {
            allocated: 22,
            bonus: 1,
        };
        store.put_balance(record.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let err = ledger
            .set_allocated(&mut tx, key(ResourceKind::Days), i32::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::Validation(_)));
        drop(tx);

        assert_eq!(store.balance(&key(ResourceKind::Days)).await, Some(record));
    }

    #[actix_web::test]
    async fn get_or_create_reads_back_a_rival_creation() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(LeavePolicy::default());
        let mut rival = ledger.default_record(key(ResourceKind::Days));
        rival.used = 4;
        store.commit_rival_balance(rival.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let record = ledger
            .get_or_create(&mut tx, key(ResourceKind::Days))
            .await
            .unwrap();
        assert_eq!(record, rival);

        let check = ledger
            .reserve_check(&mut tx, key(ResourceKind::Days), 30)
            .await
            .unwrap();
        assert_eq!(check, ReserveCheck { ok: false, available: 18 });
        drop(tx);

        let stored = store.snapshot().await;
        assert_eq!(stored.balances.len(), 1);
        assert_eq!(stored.balances.get(&key(ResourceKind::Days)), Some(&rival));
    }
}

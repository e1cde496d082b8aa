// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process ledger store.

use super::{LedgerStore, check_link, check_row};
use crate::base::{IdempotencyKey, TransactionId};
use crate::error::LedgerError;
use crate::key_lock::{KeyGuard, KeyLocks};
use crate::transaction::TransactionRecord;
use crate::validator::ValidationPolicy;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// A thread-safe, in-memory ledger store.
///
/// Point lookups go through [`DashMap`] indices and never take the commit
/// lock. Inserts are serialized by the commit lock, which also guards the
/// ordered log that defines the chain. A record is visible by `id` before it
/// is visible by key, and both only once it is fully built, so readers never
/// observe a partial row.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Records indexed by ID.
    records: DashMap<TransactionId, Arc<TransactionRecord>>,
    /// Idempotency key to record ID.
    keys: DashMap<IdempotencyKey, TransactionId>,
    /// Records in commit order. Index + 1 is the sequence number.
    log: Mutex<Vec<Arc<TransactionRecord>>>,
    locks: KeyLocks,
    /// Limits every inserted record must satisfy.
    policy: ValidationPolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the policy inserts are checked against.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl LedgerStore for MemoryStore {
    fn lock_key(&self, key: &IdempotencyKey) -> KeyGuard<'_> {
        self.locks.lock(key.as_str())
    }

    fn insert(&self, record: TransactionRecord) -> Result<(), LedgerError> {
        let mut log = self.log.lock();

        if self.records.contains_key(&record.id()) {
            return Err(LedgerError::Immutable(record.id()));
        }
        if self.keys.contains_key(record.idempotency_key()) {
            return Err(LedgerError::DuplicateIdempotencyKey);
        }
        check_row(&record, &self.policy)?;
        let tail_hash = log.last().map(|tail| tail.hash()).unwrap_or("");
        check_link(&record, tail_hash)?;

        let id = record.id();
        let record = Arc::new(record);
        self.records.insert(id, Arc::clone(&record));
        self.keys.insert(record.idempotency_key().clone(), id);
        log.push(record);

        tracing::debug!(%id, sequence = log.len(), "record committed");

        Ok(())
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self.records.get(&id).map(|record| record.as_ref().clone()))
    }

    fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let Some(id) = self.keys.get(key).map(|id| *id) else {
            return Ok(None);
        };
        self.get_by_id(id)
    }

    fn latest(&self) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self.log.lock().last().map(|record| record.as_ref().clone()))
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.log.lock().len() as u64)
    }

    fn history(&self) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self
            .log
            .lock()
            .iter()
            .map(|record| record.as_ref().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::AccountId;
    use crate::error::AmountViolation;
    use crate::transaction::{RecordDraft, TransactionStatus};
    use crate::validator::{ValidationPolicy, validate_currency};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn draft(key: &str, amount: Decimal) -> RecordDraft {
        RecordDraft {
            id: TransactionId::generate(),
            idempotency_key: IdempotencyKey::new(key).unwrap(),
            account_id: AccountId(Uuid::from_u128(7)),
            amount,
            currency: validate_currency("EUR", &ValidationPolicy::default()).unwrap(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_lookup() {
        let store = MemoryStore::new();
        let record = draft("a", dec!(10.00)).seal("");
        store.insert(record.clone()).unwrap();

        assert_eq!(store.get_by_id(record.id()).unwrap(), Some(record.clone()));
        assert_eq!(
            store.get_by_idempotency_key(record.idempotency_key()).unwrap(),
            Some(record.clone())
        );
        assert_eq!(store.latest().unwrap(), Some(record));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn empty_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.latest().unwrap(), None);
        assert_eq!(store.get_by_id(TransactionId::generate()).unwrap(), None);
    }

    #[test]
    fn reused_id_is_immutable() {
        let store = MemoryStore::new();
        let original = draft("a", dec!(10.00)).seal("");
        store.insert(original.clone()).unwrap();

        let mut rewrite = draft("b", dec!(99.00));
        rewrite.id = original.id();
        let rewrite = rewrite.seal(original.hash());

        assert_eq!(store.insert(rewrite), Err(LedgerError::Immutable(original.id())));
        assert_eq!(store.get_by_id(original.id()).unwrap(), Some(original));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn duplicate_key_backstop() {
        let store = MemoryStore::new();
        let first = draft("a", dec!(10.00)).seal("");
        store.insert(first.clone()).unwrap();

        let second = draft("a", dec!(20.00)).seal(first.hash());
        assert_eq!(store.insert(second), Err(LedgerError::DuplicateIdempotencyKey));
    }

    #[test]
    fn non_positive_amount_backstop() {
        let store = MemoryStore::new();
        let record = draft("a", dec!(-1.00)).seal("");
        assert_eq!(
            store.insert(record),
            Err(LedgerError::AmountInvalid(AmountViolation::NotPositive))
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn over_ceiling_amount_backstop() {
        let store = MemoryStore::new();
        let record = draft("a", dec!(5000000.00)).seal("");
        assert_eq!(
            store.insert(record),
            Err(LedgerError::AmountInvalid(AmountViolation::AboveMaximum))
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn non_pending_status_backstop() {
        let store = MemoryStore::new();
        let mut settled = draft("a", dec!(10.00));
        settled.status = TransactionStatus::Settled;

        assert_eq!(
            store.insert(settled.seal("")),
            Err(LedgerError::StatusNotPending(TransactionStatus::Settled))
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn currency_outside_store_policy_backstop() {
        let store = MemoryStore::new();
        let wide = ValidationPolicy {
            supported_currencies: vec!["XXX".to_string()],
            ..ValidationPolicy::default()
        };
        let mut record = draft("a", dec!(10.00));
        record.currency = validate_currency("xxx", &wide).unwrap();

        assert_eq!(
            store.insert(record.seal("")),
            Err(LedgerError::CurrencyUnsupported("XXX".to_string()))
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn store_policy_is_configurable() {
        let policy = ValidationPolicy {
            max_transaction_amount: dec!(5.00),
            ..ValidationPolicy::default()
        };
        let store = MemoryStore::new().with_policy(policy);

        assert_eq!(
            store.insert(draft("a", dec!(10.00)).seal("")),
            Err(LedgerError::AmountInvalid(AmountViolation::AboveMaximum))
        );
        store.insert(draft("b", dec!(5.00)).seal("")).unwrap();
    }

    #[test]
    fn stale_previous_hash_rejected() {
        let store = MemoryStore::new();
        let first = draft("a", dec!(10.00)).seal("");
        store.insert(first).unwrap();

        let unlinked = draft("b", dec!(10.00)).seal("");
        assert_eq!(store.insert(unlinked), Err(LedgerError::ChainTailMoved));
    }

    #[test]
    fn history_in_commit_order() {
        let store = MemoryStore::new();
        let mut tail = String::new();
        for key in ["a", "b", "c"] {
            let record = draft(key, dec!(1.00)).seal(tail.clone());
            tail = record.hash().to_string();
            store.insert(record).unwrap();
        }

        let keys: Vec<_> = store
            .history()
            .unwrap()
            .iter()
            .map(|r| r.idempotency_key().to_string())
            .collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}

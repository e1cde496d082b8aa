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

//! Durable storage for ledger records.
//!
//! A [`LedgerStore`] is an append-only table: it can insert a record, look one
//! up, and report the chain tail. There is no update or delete
//! operation. Every insert is assigned the next value of a monotonic sequence,
//! and the chain tail is the record with the highest sequence.
//!
//! # Backstop constraints
//!
//! `insert` rejects, in this order:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | `id` already stored | [`LedgerError::Immutable`] |
//! | `idempotency_key` already stored | [`LedgerError::DuplicateIdempotencyKey`] |
//! | `status` is not `PENDING` | [`LedgerError::StatusNotPending`] |
//! | amount outside the store's policy | [`LedgerError::AmountInvalid`] |
//! | currency outside the store's policy | [`LedgerError::CurrencyUnsupported`] |
//! | stored hash does not match the fields | [`LedgerError::InfrastructureFailure`] |
//! | `previous_hash` is not the current tail hash | [`LedgerError::ChainTailMoved`] |

mod memory;
#[cfg(feature = "storage-rocksdb")]
mod rocks;

pub use memory::MemoryStore;
#[cfg(feature = "storage-rocksdb")]
pub use rocks::RocksDbStore;

use crate::base::{IdempotencyKey, TransactionId};
use crate::error::LedgerError;
use crate::key_lock::KeyGuard;
use crate::transaction::{TransactionRecord, TransactionStatus};
use crate::validator::{ValidationPolicy, validate_amount, validate_currency};
use std::sync::Arc;

/// Append-only storage of [`TransactionRecord`]s.
pub trait LedgerStore: Send + Sync {
    /// Acquires the exclusive region for `key`.
    ///
    /// Stores that share data must share this lock space for the idempotency
    /// check to be race-free; the uniqueness backstop covers the rest.
    fn lock_key(&self, key: &IdempotencyKey) -> KeyGuard<'_>;

    /// Atomically appends `record` to the chain.
    fn insert(&self, record: TransactionRecord) -> Result<(), LedgerError>;

    fn get_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, LedgerError>;

    fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// The most recently committed record.
    fn latest(&self) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Number of committed records.
    fn len(&self) -> Result<u64, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// All records in commit order.
    fn history(&self) -> Result<Vec<TransactionRecord>, LedgerError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn lock_key(&self, key: &IdempotencyKey) -> KeyGuard<'_> {
        (**self).lock_key(key)
    }

    fn insert(&self, record: TransactionRecord) -> Result<(), LedgerError> {
        (**self).insert(record)
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, LedgerError> {
        (**self).get_by_id(id)
    }

    fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        (**self).get_by_idempotency_key(key)
    }

    fn latest(&self) -> Result<Option<TransactionRecord>, LedgerError> {
        (**self).latest()
    }

    fn len(&self) -> Result<u64, LedgerError> {
        (**self).len()
    }

    fn history(&self) -> Result<Vec<TransactionRecord>, LedgerError> {
        (**self).history()
    }
}

/// Row-level checks shared by every backend.
///
/// Applies the creation policy again; a stored record always satisfies it.
pub(crate) fn check_row(
    record: &TransactionRecord,
    policy: &ValidationPolicy,
) -> Result<(), LedgerError> {
    if record.status() != TransactionStatus::Pending {
        return Err(LedgerError::StatusNotPending(record.status()));
    }
    validate_amount(record.amount(), policy)?;
    validate_currency(record.currency().as_str(), policy)?;
    if !record.verify_hash() {
        return Err(LedgerError::InfrastructureFailure(format!(
            "record {} carries a hash that does not match its fields",
            record.id()
        )));
    }
    Ok(())
}

/// Rejects a record that was not linked to `tail_hash`.
pub(crate) fn check_link(record: &TransactionRecord, tail_hash: &str) -> Result<(), LedgerError> {
    if record.previous_hash() != tail_hash {
        return Err(LedgerError::ChainTailMoved);
    }
    Ok(())
}

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

//! Idempotent record creation.
//!
//! The [`Ledger`] is the only writer of a [`LedgerStore`]. Creating a record
//! runs these steps:
//!
//! 1. Validate amount and currency. Failures return before any store access.
//! 2. Take the store's exclusive region for the idempotency key.
//! 3. Return the existing record if the key is already recorded.
//! 4. Otherwise seal a `PENDING` record against the chain tail and insert it.
//!
//! # Store backstops
//!
//! | Insert error | Handling |
//! |--------------|----------|
//! | `ChainTailMoved` | another key committed first; re-read the tail and re-seal |
//! | `DuplicateIdempotencyKey` | lost a race outside the lock space; return the winner's record |
//! | anything else | returned to the caller, never retried |
//!
//! # Thread Safety
//!
//! `Ledger` is `Send + Sync` whenever its store is. Calls for different keys
//! proceed in parallel and only serialize on the store's short commit section.

use crate::base::{AccountId, IdempotencyKey, TransactionId};
use crate::error::LedgerError;
use crate::store::{LedgerStore, MemoryStore};
use crate::transaction::{RecordDraft, TransactionRecord, TransactionStatus};
use crate::validator::{ValidationPolicy, parse_amount, validate_amount, validate_currency};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A request to create a ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub idempotency_key: IdempotencyKey,
    pub account_id: AccountId,
    pub amount: Decimal,
    /// Currency code as supplied; upper-cased during validation.
    pub currency: String,
}

impl NewTransaction {
    pub fn new(
        idempotency_key: IdempotencyKey,
        account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key,
            account_id,
            amount,
            currency: currency.into(),
        }
    }

    /// Builds a request from untyped text fields.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::IdempotencyKeyInvalid`] - empty or over-long key.
    /// - [`LedgerError::AccountIdMalformed`] - account ID is not a UUID.
    /// - [`LedgerError::AmountMalformed`] - amount is not a decimal number.
    pub fn parse(
        idempotency_key: &str,
        account_id: &str,
        amount: &str,
        currency: &str,
    ) -> Result<Self, LedgerError> {
        let idempotency_key = IdempotencyKey::new(idempotency_key)?;
        let account_id = Uuid::parse_str(account_id.trim())
            .map(AccountId)
            .map_err(|_| LedgerError::AccountIdMalformed(account_id.to_string()))?;
        let amount = parse_amount(amount)?;

        Ok(Self::new(idempotency_key, account_id, amount, currency))
    }
}

/// Append-only, hash-chained ledger with idempotent creation.
///
/// # Invariants
///
/// - At most one record exists per idempotency key.
/// - Every record's `previous_hash` is the hash of the record committed
///   immediately before it.
/// - Records are never updated or deleted.
pub struct Ledger<S = MemoryStore> {
    store: S,
    policy: ValidationPolicy,
}

impl Ledger<MemoryStore> {
    /// Creates a ledger over an empty in-memory store with the default policy.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Ledger<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_policy(store, ValidationPolicy::default())
    }

    /// Validates requests against `policy`. The store re-checks every insert
    /// against its own policy, so both should be built from the same one.
    pub fn with_policy(store: S, policy: ValidationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Creates a record, or returns the one already recorded under the same key.
    ///
    /// A replay returns the original record unchanged, even if the new request
    /// carries a different payload.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AmountInvalid`] - amount not positive, over the ceiling, or sub-cent.
    /// - [`LedgerError::CurrencyUnsupported`] - currency outside the supported set.
    /// - [`LedgerError::InfrastructureFailure`] - the store failed.
    pub fn create_idempotent(
        &self,
        request: NewTransaction,
    ) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount, &self.policy)?;
        let currency = validate_currency(&request.currency, &self.policy)?;

        // Held until the record is committed or the replay is returned.
        let _guard = self.store.lock_key(&request.idempotency_key);

        if let Some(existing) = self.store.get_by_idempotency_key(&request.idempotency_key)? {
            tracing::debug!(
                key = %request.idempotency_key,
                id = %existing.id(),
                "idempotent replay"
            );
            return Ok(existing);
        }

        let draft = RecordDraft {
            id: TransactionId::generate(),
            idempotency_key: request.idempotency_key,
            account_id: request.account_id,
            amount,
            currency,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        };
        self.commit(draft)
    }

    /// Looks up a record by ID.
    pub fn get_by_id(&self, id: TransactionId) -> Result<TransactionRecord, LedgerError> {
        self.store.get_by_id(id)?.ok_or(LedgerError::NotFound(id))
    }

    fn commit(&self, draft: RecordDraft) -> Result<TransactionRecord, LedgerError> {
        loop {
            let previous_hash = self
                .store
                .latest()?
                .map(|tail| tail.hash().to_string())
                .unwrap_or_default();
            let record = draft.clone().seal(previous_hash);

            match self.store.insert(record.clone()) {
                Ok(()) => {
                    tracing::info!(
                        id = %record.id(),
                        key = %record.idempotency_key(),
                        amount = %record.amount(),
                        currency = %record.currency(),
                        "transaction recorded"
                    );
                    return Ok(record);
                }
                Err(LedgerError::ChainTailMoved) => {
                    tracing::debug!(id = %record.id(), "chain tail moved, relinking");
                }
                Err(LedgerError::DuplicateIdempotencyKey) => {
                    tracing::warn!(
                        key = %draft.idempotency_key,
                        "idempotency key committed concurrently, returning existing record"
                    );
                    return self
                        .store
                        .get_by_idempotency_key(&draft.idempotency_key)?
                        .ok_or_else(|| {
                            LedgerError::infrastructure(format!(
                                "key {} rejected as duplicate but not readable",
                                draft.idempotency_key
                            ))
                        });
                }
                Err(err) => {
                    if let LedgerError::InfrastructureFailure(detail) = &err {
                        tracing::error!(id = %record.id(), error = %detail, "insert failed");
                    }
                    return Err(err);
                }
            }
        }
    }
}

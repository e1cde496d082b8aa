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

//! Ledger records.
//!
//! A [`TransactionRecord`] is created by sealing a [`RecordDraft`] against the
//! hash of the current chain tail. Sealing is the only way to obtain a record
//! outside of deserialization, and no method mutates a record afterwards.
//!
//! ```
//! use chain_ledger::{AccountId, IdempotencyKey, RecordDraft, TransactionId, TransactionStatus};
//! use chain_ledger::validator::{validate_currency, ValidationPolicy};
//! use chrono::{TimeZone, Utc};
//! use rust_decimal_macros::dec;
//! use uuid::Uuid;
//!
//! let draft = RecordDraft {
//!     id: TransactionId(Uuid::nil()),
//!     idempotency_key: IdempotencyKey::new("k1").unwrap(),
//!     account_id: AccountId(Uuid::nil()),
//!     amount: dec!(50.00),
//!     currency: validate_currency("usd", &ValidationPolicy::default()).unwrap(),
//!     status: TransactionStatus::Pending,
//!     created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//! };
//! let record = draft.seal("");
//! assert_eq!(record.hash().len(), 64);
//! assert!(record.verify_hash());
//! ```

use crate::base::{AccountId, IdempotencyKey, TransactionId};
use crate::hash_chain;
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a record.
///
/// Records are always created as `Pending`; nothing in this crate advances it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Settled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Settled => "SETTLED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-cased currency code that passed [`crate::validator::validate_currency`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub(crate) fn from_validated(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fields of a record before it is linked into the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub id: TransactionId,
    pub idempotency_key: IdempotencyKey,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl RecordDraft {
    /// Links the draft to `previous_hash` and computes its own hash.
    ///
    /// `created_at` is truncated to microseconds so the hashed timestamp and
    /// the stored timestamp are always the same value.
    pub fn seal(mut self, previous_hash: impl Into<String>) -> TransactionRecord {
        self.created_at = self.created_at.trunc_subsecs(6);
        let previous_hash = previous_hash.into();
        let hash = hash_chain::compute_hash(&self, &previous_hash);

        TransactionRecord {
            id: self.id,
            idempotency_key: self.idempotency_key,
            account_id: self.account_id,
            amount: self.amount,
            currency: self.currency,
            status: self.status,
            created_at: self.created_at,
            hash,
            previous_hash,
        }
    }
}

/// An immutable, hash-chained ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    id: TransactionId,
    idempotency_key: IdempotencyKey,
    account_id: AccountId,
    amount: Decimal,
    currency: Currency,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    hash: String,
    previous_hash: String,
}

impl TransactionRecord {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Lowercase hex SHA-256 over the record's fields and `previous_hash`.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Hash of the record committed just before this one, or `""` for the first record.
    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Returns the unsealed fields, e.g. to recompute the hash.
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            id: self.id,
            idempotency_key: self.idempotency_key.clone(),
            account_id: self.account_id,
            amount: self.amount,
            currency: self.currency.clone(),
            status: self.status,
            created_at: self.created_at,
        }
    }

    /// Recomputes the hash from the stored fields and compares.
    pub fn verify_hash(&self) -> bool {
        hash_chain::compute_hash(&self.draft(), &self.previous_hash) == self.hash
    }
}

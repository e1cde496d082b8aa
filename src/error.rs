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

//! Error types for ledger operations.

use crate::base::TransactionId;
use crate::transaction::TransactionStatus;
use std::fmt;
use thiserror::Error;

/// Why an amount was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountViolation {
    /// Zero or negative
    NotPositive,
    /// Larger than the configured ceiling
    AboveMaximum,
    /// Needs more than two fractional digits
    TooPrecise,
}

impl fmt::Display for AmountViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotPositive => "must be greater than zero",
            Self::AboveMaximum => "exceeds the maximum allowed limit",
            Self::TooPrecise => "at most two decimal places are allowed",
        })
    }
}

/// Why an idempotency key was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyViolation {
    Empty,
    TooLong,
}

impl fmt::Display for KeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "must not be empty",
            Self::TooLong => "longer than 128 characters",
        })
    }
}

/// Ledger errors.
///
/// Validation errors ([`LedgerError::is_validation`]) are detected before any
/// store access. `DuplicateIdempotencyKey` and `ChainTailMoved` come from the
/// store's backstop checks and are resolved inside [`crate::Ledger`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount text could not be parsed as a decimal
    #[error("amount is not a valid decimal: {0:?}")]
    AmountMalformed(String),

    /// Amount failed the policy checks
    #[error("invalid amount: {0}")]
    AmountInvalid(AmountViolation),

    /// Currency is not in the supported set
    #[error("currency {0:?} is not supported")]
    CurrencyUnsupported(String),

    /// Account ID text is not a UUID
    #[error("account id is not a valid UUID: {0:?}")]
    AccountIdMalformed(String),

    /// Idempotency key is empty or too long
    #[error("invalid idempotency key: {0}")]
    IdempotencyKeyInvalid(KeyViolation),

    /// A record with this ID is already persisted
    #[error("transaction {0} is immutable and cannot be rewritten")]
    Immutable(TransactionId),

    /// A record offered to the store was not in the initial status
    #[error("new records must be PENDING, not {0}")]
    StatusNotPending(TransactionStatus),

    /// No record with this ID
    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    /// Store-level uniqueness backstop on the idempotency key
    #[error("idempotency key already recorded")]
    DuplicateIdempotencyKey,

    /// Another record was committed after the previous hash was read
    #[error("chain tail moved during insert")]
    ChainTailMoved,

    /// Storage I/O failure. The detail is kept for logs and not displayed.
    #[error("ledger storage failure")]
    InfrastructureFailure(String),
}

impl LedgerError {
    /// Returns `true` for errors caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::AmountMalformed(_)
                | Self::AmountInvalid(_)
                | Self::CurrencyUnsupported(_)
                | Self::AccountIdMalformed(_)
                | Self::IdempotencyKeyInvalid(_)
        )
    }

    /// Wraps any storage-side error as an infrastructure failure.
    pub fn infrastructure(err: impl fmt::Display) -> Self {
        Self::InfrastructureFailure(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::infrastructure(err)
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::infrastructure(err)
    }
}

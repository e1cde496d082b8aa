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

//! # Chain Ledger
//!
//! This library records financial transactions in an append-only,
//! tamper-evident ledger. Each record is immutable once persisted, linked to
//! its predecessor by a SHA-256 hash chain, and created exactly once per
//! client-supplied idempotency key.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Validates requests and coordinates idempotent creation
//! - [`LedgerStore`]: Append-only storage with per-key locking ([`MemoryStore`], `RocksDbStore`)
//! - [`TransactionRecord`]: The immutable, hash-chained record
//! - [`hash_chain`]: Canonical payload and digest computation
//! - [`validator`]: Amount and currency policy checks
//! - [`LedgerError`]: Error types for validation and storage failures
//!
//! ## Example
//!
//! ```
//! use chain_ledger::{AccountId, IdempotencyKey, Ledger, NewTransaction, TransactionStatus};
//! use rust_decimal_macros::dec;
//! use uuid::Uuid;
//!
//! let ledger = Ledger::new();
//! let account = AccountId(Uuid::new_v4());
//!
//! let key = IdempotencyKey::new("order-1001").unwrap();
//! let record = ledger
//!     .create_idempotent(NewTransaction::new(key.clone(), account, dec!(50.00), "usd"))
//!     .unwrap();
//! assert_eq!(record.status(), TransactionStatus::Pending);
//! assert_eq!(record.currency().as_str(), "USD");
//!
//! // A retry with the same key returns the original record.
//! let replay = ledger
//!     .create_idempotent(NewTransaction::new(key, account, dec!(99.00), "usd"))
//!     .unwrap();
//! assert_eq!(replay, record);
//! ```
//!
//! ## Thread Safety
//!
//! The ledger is safe to share between threads. Calls with the same
//! idempotency key are serialized by a per-key lock; calls with different
//! keys only contend on the store's commit section.

mod base;
pub mod config;
pub mod error;
pub mod hash_chain;
pub mod key_lock;
mod ledger;
pub mod store;
mod transaction;
pub mod validator;

pub use base::{AccountId, IdempotencyKey, TransactionId};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{Ledger, NewTransaction};
#[cfg(feature = "storage-rocksdb")]
pub use store::RocksDbStore;
pub use store::{LedgerStore, MemoryStore};
pub use transaction::{Currency, RecordDraft, TransactionRecord, TransactionStatus};

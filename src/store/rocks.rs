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

//! RocksDB-backed ledger store.
//!
//! # Column Families
//!
//! - `records` - Append-only record log (key: big-endian sequence, value: JSON record)
//! - `ids` - Record ID to sequence
//! - `idempotency_keys` - Idempotency key to sequence
//!
//! A record and both of its index entries are written in one [`WriteBatch`],
//! so a crash never leaves a record without its indices or the reverse.

use super::{LedgerStore, check_link, check_row};
use crate::base::{IdempotencyKey, TransactionId};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::key_lock::{KeyGuard, KeyLocks};
use crate::transaction::TransactionRecord;
use crate::validator::ValidationPolicy;
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch, WriteOptions,
};
use std::path::Path;

/// Column family names
const CF_RECORDS: &str = "records";
const CF_IDS: &str = "ids";
const CF_IDEMPOTENCY_KEYS: &str = "idempotency_keys";

/// Sequence of the last committed record and its hash.
#[derive(Debug, Default)]
struct ChainTail {
    sequence: u64,
    hash: String,
}

/// A persistent ledger store on RocksDB.
pub struct RocksDbStore {
    db: DB,
    /// Commit section; holds the cached tail so inserts need no tail read.
    tail: Mutex<ChainTail>,
    sync_writes: bool,
    locks: KeyLocks,
    policy: ValidationPolicy,
}

impl RocksDbStore {
    /// Opens or creates a store at `config.storage.data_dir`, checking inserts
    /// against `config.policy`.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Ok(Self::open_path(&config.storage.data_dir, config.storage.sync_writes)?
            .with_policy(config.policy.clone()))
    }

    /// Replaces the policy inserts are checked against.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Opens or creates a store at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(LedgerError::infrastructure)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDS, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY_KEYS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        let mut store = Self {
            db,
            tail: Mutex::new(ChainTail::default()),
            sync_writes,
            locks: KeyLocks::new(),
            policy: ValidationPolicy::default(),
        };
        let tail = store.read_tail()?;
        tracing::info!(
            path = %path.display(),
            records = tail.sequence,
            "opened ledger store"
        );
        store.tail = Mutex::new(tail);

        Ok(store)
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily, LedgerError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::infrastructure(format!("column family {name} not found")))
    }

    /// Recovers the tail from the last key of the record log.
    fn read_tail(&self) -> Result<ChainTail, LedgerError> {
        let cf = self.cf_handle(CF_RECORDS)?;
        let Some(item) = self.db.iterator_cf(cf, IteratorMode::End).next() else {
            return Ok(ChainTail::default());
        };
        let (key, value) = item?;
        let record: TransactionRecord = serde_json::from_slice(&value)?;

        Ok(ChainTail {
            sequence: decode_sequence(&key)?,
            hash: record.hash().to_string(),
        })
    }

    fn sequence_of(&self, cf_name: &str, key: &[u8]) -> Result<Option<u64>, LedgerError> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .get_pinned_cf(cf, key)?
            .map(|bytes| decode_sequence(&bytes))
            .transpose()
    }

    fn record_at(&self, sequence: u64) -> Result<Option<TransactionRecord>, LedgerError> {
        let cf = self.cf_handle(CF_RECORDS)?;
        match self.db.get_pinned_cf(cf, sequence.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl LedgerStore for RocksDbStore {
    fn lock_key(&self, key: &IdempotencyKey) -> KeyGuard<'_> {
        self.locks.lock(key.as_str())
    }

    fn insert(&self, record: TransactionRecord) -> Result<(), LedgerError> {
        let mut tail = self.tail.lock();

        let id_key = record.id().0.as_bytes().to_vec();
        let idempotency_key = record.idempotency_key().as_str().as_bytes().to_vec();

        if self.sequence_of(CF_IDS, &id_key)?.is_some() {
            return Err(LedgerError::Immutable(record.id()));
        }
        if self.sequence_of(CF_IDEMPOTENCY_KEYS, &idempotency_key)?.is_some() {
            return Err(LedgerError::DuplicateIdempotencyKey);
        }
        check_row(&record, &self.policy)?;
        check_link(&record, &tail.hash)?;

        let sequence = tail.sequence + 1;
        let sequence_key = sequence.to_be_bytes();
        let value = serde_json::to_vec(&record)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_RECORDS)?, sequence_key, &value);
        batch.put_cf(self.cf_handle(CF_IDS)?, &id_key, sequence_key);
        batch.put_cf(self.cf_handle(CF_IDEMPOTENCY_KEYS)?, &idempotency_key, sequence_key);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tail.sequence = sequence;
        tail.hash = record.hash().to_string();

        tracing::debug!(id = %record.id(), sequence, "record committed");

        Ok(())
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<TransactionRecord>, LedgerError> {
        match self.sequence_of(CF_IDS, id.0.as_bytes())? {
            Some(sequence) => self.record_at(sequence),
            None => Ok(None),
        }
    }

    fn get_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        match self.sequence_of(CF_IDEMPOTENCY_KEYS, key.as_str().as_bytes())? {
            Some(sequence) => self.record_at(sequence),
            None => Ok(None),
        }
    }

    fn latest(&self) -> Result<Option<TransactionRecord>, LedgerError> {
        let sequence = self.tail.lock().sequence;
        if sequence == 0 {
            return Ok(None);
        }
        self.record_at(sequence)
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.tail.lock().sequence)
    }

    fn history(&self) -> Result<Vec<TransactionRecord>, LedgerError> {
        let cf = self.cf_handle(CF_RECORDS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

fn decode_sequence(bytes: &[u8]) -> Result<u64, LedgerError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        LedgerError::infrastructure(format!("corrupt sequence key of {} bytes", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(raw))
}

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

//! Ledger integration tests over the RocksDB store.

#![cfg(feature = "storage-rocksdb")]

use chain_ledger::{
    AccountId, IdempotencyKey, Ledger, LedgerStore, NewTransaction, RocksDbStore,
    TransactionRecord,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;
use uuid::Uuid;

fn request(key: &str, amount: Decimal) -> NewTransaction {
    NewTransaction::new(
        IdempotencyKey::new(key).unwrap(),
        AccountId(Uuid::from_u128(3)),
        amount,
        "gbp",
    )
}

fn open_ledger(path: &Path) -> Ledger<RocksDbStore> {
    Ledger::with_store(RocksDbStore::open_path(path, false).unwrap())
}

#[test]
fn replay_returns_persisted_record() {
    let dir = tempdir().unwrap();
    let ledger = open_ledger(dir.path());

    let original = ledger.create_idempotent(request("k1", dec!(50.00))).unwrap();
    let replay = ledger.create_idempotent(request("k1", dec!(99.00))).unwrap();

    assert_eq!(replay, original);
    assert_eq!(replay.currency().as_str(), "GBP");
    assert_eq!(ledger.store().len().unwrap(), 1);
}

#[test]
fn fifty_concurrent_calls_same_key() {
    const NUM_THREADS: usize = 50;

    let dir = tempdir().unwrap();
    let ledger = Arc::new(open_ledger(dir.path()));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.create_idempotent(request("novel-key", dec!(25.00))).unwrap()
            })
        })
        .collect();

    let records: Vec<TransactionRecord> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    assert_eq!(ledger.store().len().unwrap(), 1);
    assert!(records.iter().all(|r| r == &records[0]));
}

#[test]
fn chain_continues_after_reopen() {
    let dir = tempdir().unwrap();

    let (first, second) = {
        let ledger = open_ledger(dir.path());
        let first = ledger.create_idempotent(request("a", dec!(1.00))).unwrap();
        let second = ledger.create_idempotent(request("b", dec!(2.00))).unwrap();
        (first, second)
    };

    let ledger = open_ledger(dir.path());
    assert_eq!(ledger.create_idempotent(request("a", dec!(7.00))).unwrap(), first);

    let third = ledger.create_idempotent(request("c", dec!(3.00))).unwrap();
    assert_eq!(third.previous_hash(), second.hash());

    let history = ledger.store().history().unwrap();
    assert_eq!(history, vec![first, second, third]);
    let mut previous = "";
    for record in &history {
        assert_eq!(record.previous_hash(), previous);
        assert!(record.verify_hash());
        previous = record.hash();
    }
}

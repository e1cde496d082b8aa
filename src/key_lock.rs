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

//! Keyed mutual exclusion.
//!
//! [`KeyLocks`] hands out one [`KeyGuard`] per key at a time. Each key in use
//! has its own slot with its own condition variable, so releasing one key
//! only wakes callers waiting on that key. A slot is dropped from the table
//! once no holder or waiter references it.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock state for one key.
#[derive(Debug, Default)]
struct KeySlot {
    held: Mutex<bool>,
    released: Condvar,
    /// Holder plus waiters.
    users: AtomicUsize,
}

/// A table of per-key exclusive regions.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: DashMap<String, Arc<KeySlot>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is free, then holds it until the guard is dropped.
    pub fn lock(&self, key: &str) -> KeyGuard<'_> {
        // Registered under the shard lock so the slot cannot be pruned
        // between lookup and wait.
        let slot = {
            let entry = self.slots.entry(key.to_string()).or_default();
            entry.users.fetch_add(1, Ordering::SeqCst);
            Arc::clone(entry.value())
        };

        let mut held = slot.held.lock();
        while *held {
            tracing::trace!(key, "waiting for key lock");
            slot.released.wait(&mut held);
        }
        *held = true;
        drop(held);

        KeyGuard {
            locks: self,
            slot,
            key: key.to_string(),
        }
    }

    /// Returns `true` if some guard currently holds `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(|slot| *slot.held.lock())
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.slots.iter().filter(|slot| *slot.held.lock()).count()
    }

    /// Number of keys with a holder or a waiter.
    pub fn active_keys(&self) -> usize {
        self.slots.len()
    }
}

/// Exclusive access to one key. Released on drop.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    slot: Arc<KeySlot>,
    key: String,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        *self.slot.held.lock() = false;
        self.slot.released.notify_one();

        self.locks
            .slots
            .remove_if(&self.key, |_, slot| slot.users.fetch_sub(1, Ordering::SeqCst) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let locks = KeyLocks::new();
        {
            let guard = locks.lock("a");
            assert_eq!(guard.key(), "a");
            assert!(locks.is_held("a"));
        }
        assert!(!locks.is_held("a"));
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a");
        let _b = locks.lock("b");
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn released_keys_are_pruned() {
        let locks = KeyLocks::new();
        {
            let _a = locks.lock("a");
            let _b = locks.lock("b");
            assert_eq!(locks.active_keys(), 2);
        }
        assert_eq!(locks.active_keys(), 0);
    }

    #[test]
    fn other_key_releases_do_not_hand_over_a_held_key() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.lock("a");

        let (acquired_tx, acquired_rx) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let _guard = locks.lock("a");
                acquired_tx.send(()).unwrap();
            })
        };

        for _ in 0..100 {
            drop(locks.lock("b"));
        }
        assert!(acquired_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(locks.is_held("a"));
        assert!(!locks.is_held("b"));

        drop(guard);
        acquired_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(locks.active_keys(), 0);
    }

    #[test]
    fn same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = locks.lock("shared");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held_count(), 0);
    }
}

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

//! Hash chain computation.
//!
//! The canonical payload is the pipe-delimited sequence
//!
//! ```text
//! id|idempotency_key|account_id|amount|currency|status|created_at|previous_hash
//! ```
//!
//! with these encodings:
//!
//! | Field | Encoding |
//! |-------|----------|
//! | `id`, `account_id` | hyphenated lowercase UUID |
//! | `amount` | exactly two fractional digits (`50.00`) |
//! | `status` | upper-case name (`PENDING`) |
//! | `created_at` | RFC 3339, microseconds, `Z` suffix |
//!
//! The digest is SHA-256 over the UTF-8 payload, hex-encoded lowercase.

use crate::transaction::RecordDraft;
use crate::validator::AMOUNT_SCALE;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Separator between canonical fields.
const FIELD_SEPARATOR: &str = "|";

/// Renders an amount with exactly two fractional digits.
pub fn canonical_amount(amount: Decimal) -> String {
    let mut scaled = amount;
    scaled.rescale(AMOUNT_SCALE);
    scaled.to_string()
}

/// Renders a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn canonical_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Builds the delimited string that is fed to the digest.
pub fn canonical_payload(draft: &RecordDraft, previous_hash: &str) -> String {
    let fields = [
        draft.id.to_string(),
        draft.idempotency_key.to_string(),
        draft.account_id.to_string(),
        canonical_amount(draft.amount),
        draft.currency.to_string(),
        draft.status.to_string(),
        canonical_timestamp(draft.created_at),
        previous_hash.to_string(),
    ];
    fields.join(FIELD_SEPARATOR)
}

/// Computes the chain hash of a record linked to `previous_hash`.
pub fn compute_hash(draft: &RecordDraft, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_payload(draft, previous_hash).as_bytes());
    hex::encode(hasher.finalize())
}

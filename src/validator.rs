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

//! Amount and currency policy checks.
//!
//! Everything here is pure: no store access, no clock, no logging. The
//! [`crate::Ledger`] runs these checks before it touches the store, so a
//! rejected request never leaves partial state behind.

use crate::error::{AmountViolation, LedgerError};
use crate::transaction::Currency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Number of fractional digits every persisted amount carries.
pub const AMOUNT_SCALE: u32 = 2;

/// Default ceiling for a single transaction.
pub const MAX_TRANSACTION_AMOUNT: Decimal = dec!(1000000.00);

/// Currencies accepted when no configuration overrides them.
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["USD", "EUR", "GBP"];

/// Limits applied to every creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub max_transaction_amount: Decimal,
    pub supported_currencies: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_transaction_amount: MAX_TRANSACTION_AMOUNT,
            supported_currencies: SUPPORTED_CURRENCIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Parses amount text into an exact decimal.
///
/// Accepts plain (`"50.00"`) and scientific (`"5e1"`) notation. Values that
/// would need rounding to fit a [`Decimal`] are rejected rather than rounded.
pub fn parse_amount(raw: &str) -> Result<Decimal, LedgerError> {
    let trimmed = raw.trim();
    Decimal::from_str_exact(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| LedgerError::AmountMalformed(raw.to_string()))
}

/// Checks an amount against the policy and returns it at scale 2.
///
/// # Errors
///
/// - [`AmountViolation::NotPositive`] - zero or negative.
/// - [`AmountViolation::AboveMaximum`] - over `max_transaction_amount`.
/// - [`AmountViolation::TooPrecise`] - a non-zero digit past the second decimal place.
pub fn validate_amount(amount: Decimal, policy: &ValidationPolicy) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::AmountInvalid(AmountViolation::NotPositive));
    }
    if amount > policy.max_transaction_amount {
        return Err(LedgerError::AmountInvalid(AmountViolation::AboveMaximum));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::AmountInvalid(AmountViolation::TooPrecise));
    }

    let mut scaled = amount;
    scaled.rescale(AMOUNT_SCALE);
    Ok(scaled)
}

/// Upper-cases `currency` and checks it against the supported set.
pub fn validate_currency(currency: &str, policy: &ValidationPolicy) -> Result<Currency, LedgerError> {
    let code = currency.to_ascii_uppercase();
    let supported = policy
        .supported_currencies
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&code));

    if !supported {
        return Err(LedgerError::CurrencyUnsupported(currency.to_string()));
    }
    Ok(Currency::from_validated(code))
}

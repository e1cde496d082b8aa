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

use chain_ledger::config::{ConfigError, StorageBackend};
use chain_ledger::hash_chain::{canonical_amount, canonical_timestamp};
use chain_ledger::{
    Ledger, LedgerConfig, LedgerError, LedgerStore, MemoryStore, NewTransaction, TransactionRecord,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Chain Ledger - Record transaction requests into a hash-chained ledger
///
/// Reads creation requests from a CSV file, submits each one idempotently and
/// writes the ledger contents in commit order to stdout.
#[derive(Parser, Debug)]
#[command(name = "chain-ledger")]
#[command(about = "Records CSV transaction requests into an append-only hash-chained ledger", long_about = None)]
struct Args {
    /// Path to CSV file with creation requests
    ///
    /// Expected format: idempotency_key,account_id,amount,currency
    /// Example: cargo run -- requests.csv > ledger.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// TOML configuration file (policy and storage backend)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

/// Errors that stop a batch.
#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error("opening '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        if let IngestError::Ledger(LedgerError::InfrastructureFailure(detail)) = &e {
            tracing::error!(%detail, "storage failure");
        }
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), IngestError> {
    let config = match &args.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    let file = File::open(&args.input).map_err(|source| IngestError::Open {
        path: args.input.clone(),
        source,
    })?;
    let reader = BufReader::new(file);

    match config.storage.backend {
        StorageBackend::Memory => {
            let store = MemoryStore::new().with_policy(config.policy.clone());
            let ledger = Ledger::with_policy(store, config.policy);
            ingest(&ledger, reader, std::io::stdout())
        }
        #[cfg(feature = "storage-rocksdb")]
        StorageBackend::Rocksdb => {
            let store = chain_ledger::RocksDbStore::open(&config)?;
            let ledger = Ledger::with_policy(store, config.policy);
            ingest(&ledger, reader, std::io::stdout())
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        StorageBackend::Rocksdb => Err(IngestError::Ledger(LedgerError::infrastructure(
            "rocksdb backend requires the `storage-rocksdb` feature",
        ))),
    }
}

fn ingest<S: LedgerStore, R: Read, W: Write>(
    ledger: &Ledger<S>,
    reader: R,
    writer: W,
) -> Result<(), IngestError> {
    let accepted = process_requests(ledger, reader)?;
    tracing::info!(accepted, "batch complete");
    write_records(&ledger.store().history()?, writer)
}

/// Raw CSV row matching the input format.
///
/// Fields: `idempotency_key, account_id, amount, currency`
#[derive(Debug, Deserialize)]
struct CsvRequest {
    idempotency_key: String,
    account_id: String,
    amount: String,
    currency: String,
}

/// Submits every request row to the ledger.
///
/// Rows that fail to parse or validate are logged and skipped. A storage
/// failure stops the batch.
///
/// # CSV Format
///
/// ```csv
/// idempotency_key,account_id,amount,currency
/// order-1,67e55044-10b1-426f-9247-bb680e5fe0c8,50.00,usd
/// order-2,67e55044-10b1-426f-9247-bb680e5fe0c8,12.5,EUR
/// ```
///
/// Returns the number of rows that produced or replayed a record.
fn process_requests<S: LedgerStore, R: Read>(
    ledger: &Ledger<S>,
    reader: R,
) -> Result<usize, IngestError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut accepted = 0;
    for (line, result) in rdr.deserialize::<CsvRequest>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(line = line + 2, error = %e, "skipping malformed row");
                continue;
            }
        };

        let request = NewTransaction::parse(
            &row.idempotency_key,
            &row.account_id,
            &row.amount,
            &row.currency,
        );
        match request.and_then(|request| ledger.create_idempotent(request)) {
            Ok(_) => accepted += 1,
            Err(e) if e.is_validation() => {
                tracing::warn!(
                    line = line + 2,
                    key = %row.idempotency_key,
                    error = %e,
                    "skipping rejected request"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(accepted)
}

/// Output row for one ledger record.
#[derive(Debug, Serialize)]
struct CsvRecord {
    id: String,
    idempotency_key: String,
    account_id: String,
    amount: String,
    currency: String,
    status: String,
    created_at: String,
    hash: String,
    previous_hash: String,
}

impl From<&TransactionRecord> for CsvRecord {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id().to_string(),
            idempotency_key: record.idempotency_key().to_string(),
            account_id: record.account_id().to_string(),
            amount: canonical_amount(record.amount()),
            currency: record.currency().to_string(),
            status: record.status().to_string(),
            created_at: canonical_timestamp(record.created_at()),
            hash: record.hash().to_string(),
            previous_hash: record.previous_hash().to_string(),
        }
    }
}

/// Writes records to a CSV writer in the given order.
fn write_records<W: Write>(records: &[TransactionRecord], writer: W) -> Result<(), IngestError> {
    let mut wtr = Writer::from_writer(writer);
    for record in records {
        wtr.serialize(CsvRecord::from(record))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

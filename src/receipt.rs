//! Receipt store (spec §6 "Persisted state"): an append-only log of signed
//! envelopes keyed by `(trade_id, monotonic_seq)`, from which derived trade
//! snapshots may be rebuilt by replay.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::envelope::SignedEnvelope;
use crate::trade::Trade;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReceiptError {
    #[error("store is not writable: {0}")]
    Unwritable(String),
}

/// One logged entry: a signed envelope plus its position in the trade's log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReceipt {
    pub trade_id: String,
    pub seq: u64,
    pub envelope: SignedEnvelope,
    pub received_at: DateTime<Utc>,
}

/// An append-only log of envelopes, one stream per `trade_id`.
pub trait ReceiptStore: Send + Sync {
    fn append(&self, trade_id: &str, envelope: SignedEnvelope) -> Result<StoredReceipt, ReceiptError>;
    fn iter(&self, trade_id: &str) -> Result<Vec<StoredReceipt>, ReceiptError>;
}

/// An in-memory receipt store, suitable for tests and for a single-process
/// coordinator without durability requirements.
#[derive(Debug, Default)]
pub struct InMemoryReceiptStore {
    log: Mutex<BTreeMap<String, Vec<StoredReceipt>>>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        InMemoryReceiptStore {
            log: Mutex::new(BTreeMap::new()),
        }
    }
}

impl ReceiptStore for InMemoryReceiptStore {
    fn append(&self, trade_id: &str, envelope: SignedEnvelope) -> Result<StoredReceipt, ReceiptError> {
        let mut log = self.log.lock().expect("receipt store poisoned");
        let entries = log.entry(trade_id.to_string()).or_default();
        let seq = entries.len() as u64;
        let receipt = StoredReceipt {
            trade_id: trade_id.to_string(),
            seq,
            envelope,
            received_at: Utc::now(),
        };
        entries.push(receipt.clone());
        Ok(receipt)
    }

    fn iter(&self, trade_id: &str) -> Result<Vec<StoredReceipt>, ReceiptError> {
        let log = self.log.lock().expect("receipt store poisoned");
        Ok(log.get(trade_id).cloned().unwrap_or_default())
    }
}

/// Rebuild a trade snapshot by replaying every receipt in log order. Any
/// rejected envelope in the log (should not normally occur, since rejected
/// envelopes never reach `append`) is skipped rather than aborting replay.
pub fn replay(store: &dyn ReceiptStore, trade_id: &str, now_unix: i64) -> Result<Trade, ReceiptError> {
    let receipts = store.iter(trade_id)?;
    let mut trade = Trade::create_initial(trade_id);
    for receipt in receipts {
        if let Ok(next) = trade.apply(&receipt.envelope, now_unix) {
            trade = next;
        }
    }
    Ok(trade)
}

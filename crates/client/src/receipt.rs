//! Out-of-band receipts correlating a completed call with chain effects.

use std::sync::Arc;

use parking_lot::Mutex;

use dsql_common::Hash;

/// Receipt of one data-plane request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the request as sent to the miner.
    pub request_hash: Hash,
}

/// A cloneable cell a caller may hand to `query_with_receipt` /
/// `exec_with_receipt`; populated with the request hash on success
/// without changing the call's return signature.
///
/// The cell holds at most one receipt and may be overwritten by a later
/// call sharing the slot; callers wanting per-call receipts should use a
/// fresh slot per call.
#[derive(Debug, Clone, Default)]
pub struct ReceiptSlot(Arc<Mutex<Option<Receipt>>>);

impl ReceiptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, receipt: Receipt) {
        *self.0.lock() = Some(receipt);
    }

    /// Take the stored receipt, leaving the slot empty.
    pub fn take(&self) -> Option<Receipt> {
        self.0.lock().take()
    }
}

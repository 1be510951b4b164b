use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::redeem::{ConfirmationInfo, RedeemUnblindedTokenDelegate};

/// Redeemed ids remembered before the oldest ones are forgotten
pub const DEFAULT_REDEEMED_LIMIT: usize = 10_000;

/// Redeemed ids in redemption order, oldest evicted first
struct RedeemedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    limit: usize,
}

impl RedeemedIds {
    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());

        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// Tracks redemption outcomes for the confirmation pipeline
///
/// The most recent redeemed ids are remembered, up to a limit; failed
/// confirmations wait in a queue until the next retry pass takes them.
pub struct ConfirmationsBook {
    redeemed: Mutex<RedeemedIds>,
    failed: Mutex<Vec<ConfirmationInfo>>,
}

impl ConfirmationsBook {
    pub fn new() -> Self {
        Self::with_redeemed_limit(DEFAULT_REDEEMED_LIMIT)
    }

    pub fn with_redeemed_limit(limit: usize) -> Self {
        Self {
            redeemed: Mutex::new(RedeemedIds {
                ids: HashSet::new(),
                order: VecDeque::new(),
                limit,
            }),
            failed: Mutex::new(Vec::new()),
        }
    }

    pub fn is_redeemed(&self, confirmation_id: &str) -> bool {
        self.redeemed.lock().ids.contains(confirmation_id)
    }

    pub fn redeemed_count(&self) -> usize {
        self.redeemed.lock().ids.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }

    /// Empties the retry queue
    pub fn take_failed(&self) -> Vec<ConfirmationInfo> {
        std::mem::take(&mut *self.failed.lock())
    }
}

impl Default for ConfirmationsBook {
    fn default() -> Self {
        Self::new()
    }
}

impl RedeemUnblindedTokenDelegate for ConfirmationsBook {
    fn on_did_redeem_unblinded_token(&self, confirmation: &ConfirmationInfo) {
        self.redeemed.lock().insert(&confirmation.id);
        self.failed.lock().retain(|queued| queued.id != confirmation.id);
    }

    fn on_failed_to_redeem_unblinded_token(&self, confirmation: &ConfirmationInfo) {
        let mut failed = self.failed.lock();
        if failed.iter().any(|queued| queued.id == confirmation.id) {
            return;
        }
        debug!("Queued confirmation {} for retry", confirmation.id);
        failed.push(confirmation.clone());
    }
}

// Anonymous token redemption
//
// A confirmation is submitted once; whatever the outcome, exactly one of the
// two delegate callbacks fires for it. Submissions for a confirmation that is
// still in flight are refused instead of duplicated.

pub mod book;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::LedgerResult;

pub use book::ConfirmationsBook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationType {
    Viewed,
    Clicked,
    Dismissed,
    Landed,
}

/// Proof that an ad event happened, carrying an unblinded token credential
///
/// Opaque to the ledger apart from `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationInfo {
    pub id: String,
    pub creative_instance_id: String,
    pub confirmation_type: ConfirmationType,
    pub credential: String,
    pub created_at: DateTime<Utc>,
}

/// Receives the outcome of a redemption
///
/// Called on the redeeming task, so implementations must not block.
pub trait RedeemUnblindedTokenDelegate: Send + Sync {
    fn on_did_redeem_unblinded_token(&self, confirmation: &ConfirmationInfo);

    fn on_failed_to_redeem_unblinded_token(&self, confirmation: &ConfirmationInfo);
}

/// Sends a confirmation to the redemption server
#[async_trait]
pub trait ConfirmationSubmitter: Send + Sync {
    async fn submit(&self, confirmation: &ConfirmationInfo) -> LedgerResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed,
    Failed,
    AlreadyInFlight,
}

/// Removes the id from the in-flight set however the redemption ends
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.id);
    }
}

pub struct RedeemUnblindedToken {
    submitter: Arc<dyn ConfirmationSubmitter>,
    delegate: Arc<dyn RedeemUnblindedTokenDelegate>,
    in_flight: Mutex<HashSet<String>>,
}

impl RedeemUnblindedToken {
    pub fn new(
        submitter: Arc<dyn ConfirmationSubmitter>,
        delegate: Arc<dyn RedeemUnblindedTokenDelegate>,
    ) -> Self {
        Self {
            submitter,
            delegate,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Dropping the returned future before it completes fires no callback.
    /// The confirmation is no longer in flight when the delegate is called.
    pub async fn redeem(&self, confirmation: &ConfirmationInfo) -> RedeemOutcome {
        let Some(in_flight) = self.begin(&confirmation.id) else {
            debug!("Confirmation {} is already being redeemed", confirmation.id);
            return RedeemOutcome::AlreadyInFlight;
        };

        let result = self.submitter.submit(confirmation).await;

        // The delegate may resubmit from its callback
        drop(in_flight);

        match result {
            Ok(()) => {
                info!("✅ Redeemed unblinded token for confirmation {}", confirmation.id);
                self.delegate.on_did_redeem_unblinded_token(confirmation);
                RedeemOutcome::Redeemed
            }
            Err(e) => {
                warn!(
                    "❌ Failed to redeem unblinded token for confirmation {}: {}",
                    confirmation.id, e
                );
                self.delegate.on_failed_to_redeem_unblinded_token(confirmation);
                RedeemOutcome::Failed
            }
        }
    }

    pub fn is_in_flight(&self, confirmation_id: &str) -> bool {
        self.in_flight.lock().contains(confirmation_id)
    }

    fn begin(&self, id: &str) -> Option<InFlight<'_>> {
        if !self.in_flight.lock().insert(id.to_string()) {
            return None;
        }

        Some(InFlight {
            ids: &self.in_flight,
            id: id.to_string(),
        })
    }
}

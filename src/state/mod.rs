// Ledger state migration
//
// Brings persisted state from its stored version up to the version this build
// understands, one step at a time. The stored version is advanced only after
// the step for it succeeded, so an interrupted run resumes at the step that
// did not finish.

pub mod steps;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStores;

/// Version the built-in steps migrate to
pub const CURRENT_VERSION: u32 = 5;

/// One upgrade of persisted state, from `version() - 1` to `version()`
#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn version(&self) -> u32;

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()>;
}

pub struct StateMigration {
    stores: LedgerStores,
    steps: Vec<Box<dyn MigrationStep>>,
}

impl StateMigration {
    pub fn new(stores: LedgerStores) -> Self {
        Self {
            stores,
            steps: steps::all(),
        }
    }

    /// Uses `steps` instead of the built-in ones. Their versions must be
    /// exactly 1, 2, ..., n in that order.
    pub fn with_steps(
        stores: LedgerStores,
        steps: Vec<Box<dyn MigrationStep>>,
    ) -> LedgerResult<Self> {
        for (index, step) in steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.version() != expected {
                return Err(LedgerError::Config(format!(
                    "migration step at position {} has version {}, expected {}",
                    index,
                    step.version(),
                    expected
                )));
            }
        }

        Ok(Self { stores, steps })
    }

    pub fn target_version(&self) -> u32 {
        self.steps.len() as u32
    }

    pub async fn migrate(&self) -> LedgerResult<()> {
        let target = self.target_version();

        loop {
            let current = self.stores.state.version().await?;
            if current == target {
                return Ok(());
            }

            if current > target {
                error!(
                    "State version {} is newer than the supported version {}",
                    current, target
                );
                return Err(LedgerError::FatalUnknownState(format!(
                    "state version {} is newer than supported version {}",
                    current, target
                )));
            }

            let next = current + 1;
            let step = &self.steps[current as usize];

            if let Err(e) = step.migrate(&self.stores).await {
                error!("State: Error with migration from {} to {}: {}", current, next, e);
                return Err(match e {
                    LedgerError::FatalUnknownState(_) => e,
                    _ => LedgerError::MigrationFailed {
                        from: current,
                        to: next,
                    },
                });
            }

            self.stores.state.set_version(next).await?;
            info!("State: Migrated to version {}", next);
        }
    }
}

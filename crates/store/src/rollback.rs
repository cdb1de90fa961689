//! The rollback coordinator.
//!
//! Rollback restores every tracked relation to the state it had at an
//! earlier version: rows born after the target are deleted, rows the
//! deleted successors had closed are reopened, heads are re-derived, and
//! the tip moves back — all inside one write transaction, so a partial
//! rollback is never observable.
//!
//! Rollback is an infrequent, operator-triggered maintenance action. It
//! holds the writer gate for its whole duration (ingestion is paused) and
//! flips the store status to `RollingBack` for observability. Readers are
//! not blocked; they keep reading their own snapshots and may observe the
//! pre-rollback state until the rollback commits.

use parking_lot::RwLock;
use snafu::ResultExt;
use tracing::info;

use tidemark_types::{
    DepositorBadge, MetadataValue, ResourcePreference, ResourceSupply, StateVersion, TokenAmount,
};

use crate::collection::Aggregates;
use crate::error::{
    CommitSnafu, Result, RollbackTargetInvalidSnafu, StorageSnafu, TableSnafu, TransactionSnafu,
};
use crate::history::History;
use crate::store::{LedgerStore, StoreStatus};
use crate::tables::{Tables, TIP_KEY};

/// What a completed rollback removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackReport {
    /// The tip before the rollback.
    pub previous_tip: StateVersion,
    /// The restored version.
    pub target: StateVersion,
    /// Total history and snapshot rows deleted.
    pub rows_removed: u64,
}

/// Flips the status to `RollingBack` and restores it on drop, so a failed
/// rollback cannot leave the store stuck.
struct StatusGuard<'a> {
    status: &'a RwLock<StoreStatus>,
}

impl<'a> StatusGuard<'a> {
    fn engage(status: &'a RwLock<StoreStatus>) -> Self {
        *status.write() = StoreStatus::RollingBack;
        Self { status }
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        *self.status.write() = StoreStatus::Active;
    }
}

impl LedgerStore {
    /// Atomically restores the whole store to `target`.
    ///
    /// # Errors
    ///
    /// Returns `RollbackTargetInvalid` — before any mutation — if the store
    /// is empty, the target is beyond the tip, or the target precedes
    /// genesis.
    pub fn rollback_to(&self, target: StateVersion) -> Result<RollbackReport> {
        let _writer = self.write_gate.lock();

        let tip = self.tip()?;
        let Some(tip) = tip else {
            return RollbackTargetInvalidSnafu { target, reason: "store is empty" }.fail();
        };
        if target > tip {
            return RollbackTargetInvalidSnafu {
                target,
                reason: format!("target is beyond the tip ({tip})"),
            }
            .fail();
        }
        if let Some(genesis) = self.genesis()? {
            if target < genesis {
                return RollbackTargetInvalidSnafu {
                    target,
                    reason: format!("target precedes genesis ({genesis})"),
                }
                .fail();
            }
        }

        let _status = StatusGuard::engage(&self.status);
        info!(
            target = target.value(),
            tip = tip.value(),
            "rolling back history"
        );

        let txn = self.db.begin_write().context(TransactionSnafu)?;
        let mut rows_removed = 0u64;
        {
            macro_rules! rollback_history {
                ($value_type:ty, $rows:expr, $head:expr) => {{
                    let mut rows = txn.open_table($rows).context(TableSnafu)?;
                    let mut head = txn.open_table($head).context(TableSnafu)?;
                    rows_removed +=
                        History::rollback::<$value_type>(&mut rows, &mut head, target)?;
                }};
            }

            rollback_history!(MetadataValue, Tables::METADATA_HISTORY, Tables::METADATA_HEAD);
            rollback_history!(
                TokenAmount,
                Tables::VALIDATOR_STAKE_HISTORY,
                Tables::VALIDATOR_STAKE_HEAD
            );
            rollback_history!(
                ResourceSupply,
                Tables::RESOURCE_SUPPLY_HISTORY,
                Tables::RESOURCE_SUPPLY_HEAD
            );
            rollback_history!(
                TokenAmount,
                Tables::ACCOUNT_BALANCE_HISTORY,
                Tables::ACCOUNT_BALANCE_HEAD
            );
            rollback_history!(
                ResourcePreference,
                Tables::RESOURCE_PREFERENCE_HISTORY,
                Tables::RESOURCE_PREFERENCE_HEAD
            );
            rollback_history!(
                DepositorBadge,
                Tables::AUTHORIZED_DEPOSITOR_HISTORY,
                Tables::AUTHORIZED_DEPOSITOR_HEAD
            );

            for aggregate in [
                Tables::ACCOUNT_RESOURCE_AGGREGATE,
                Tables::RESOURCE_PREFERENCE_AGGREGATE,
                Tables::AUTHORIZED_DEPOSITOR_AGGREGATE,
            ] {
                let mut table = txn.open_table(aggregate).context(TableSnafu)?;
                rows_removed += Aggregates::rollback(&mut table, target)?;
            }

            let mut meta = txn.open_table(Tables::STORE_META).context(TableSnafu)?;
            meta.insert(TIP_KEY, target.value()).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;

        info!(
            target = target.value(),
            rows_removed,
            "rollback complete"
        );
        Ok(RollbackReport { previous_tip: tip, target, rows_removed })
    }
}

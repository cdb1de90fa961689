//! Incremental aggregation: running totals folded over the History Ledger.
//!
//! A folded fact's stored value is always the running combination of every
//! delta ingested so far, so reads never re-sum history. Correctness
//! property: folding transaction-by-transaction in ingestion order equals
//! summing all deltas up to that version.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tidemark_types::{ResourceSupply, StateVersion, SupplyDelta};

use crate::error::Result;
use crate::history::{FactTableMut, History};

/// A fact maintained as a running fold of per-transaction deltas.
pub trait Fold: Serialize + DeserializeOwned + Sized {
    /// One transaction's contribution.
    type Delta;

    /// The value before anything happened.
    fn identity() -> Self;

    /// Combines the running value with one more delta.
    fn combine(&self, delta: &Self::Delta) -> Self;

    /// True if the delta would change nothing. No-op deltas must not write
    /// a history row, or quiescent entities grow unbounded history.
    fn is_noop(delta: &Self::Delta) -> bool;
}

impl Fold for ResourceSupply {
    type Delta = SupplyDelta;

    fn identity() -> Self {
        Self::ZERO
    }

    fn combine(&self, delta: &Self::Delta) -> Self {
        self.apply(delta)
    }

    fn is_noop(delta: &Self::Delta) -> bool {
        delta.is_zero()
    }
}

/// Folds one delta into `key`'s running value at `at`.
///
/// Reads the current value (identity if the key is new), combines, and
/// appends the result. Returns `false` when the delta was a no-op and
/// nothing was written.
pub fn fold<F: Fold>(
    rows: &mut FactTableMut<'_>,
    head: &mut FactTableMut<'_>,
    key: &[u8],
    delta: &F::Delta,
    at: StateVersion,
) -> Result<bool> {
    if F::is_noop(delta) {
        return Ok(false);
    }
    let previous = History::read_current::<F>(head, key)?
        .map(|entry| entry.value)
        .unwrap_or_else(F::identity);
    let next = previous.combine(delta);
    History::append(rows, head, key, &next, at)?;
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;
    use crate::tables::Tables;
    use redb::Database;
    use std::sync::Arc;
    use tidemark_types::TokenAmount;

    fn test_db() -> Arc<Database> {
        let db = StorageEngine::open_in_memory().expect("open engine").db();
        let txn = db.begin_write().unwrap();
        {
            let _ = txn.open_table(Tables::RESOURCE_SUPPLY_HISTORY).unwrap();
            let _ = txn.open_table(Tables::RESOURCE_SUPPLY_HEAD).unwrap();
        }
        txn.commit().unwrap();
        db
    }

    fn fold_supply(db: &Database, delta: &SupplyDelta, at: u64) -> bool {
        let txn = db.begin_write().unwrap();
        let written = {
            let mut rows = txn.open_table(Tables::RESOURCE_SUPPLY_HISTORY).unwrap();
            let mut head = txn.open_table(Tables::RESOURCE_SUPPLY_HEAD).unwrap();
            fold::<ResourceSupply>(&mut rows, &mut head, b"res", delta, StateVersion::new(at))
                .unwrap()
        };
        txn.commit().unwrap();
        written
    }

    fn current_supply(db: &Database) -> Option<ResourceSupply> {
        let txn = db.begin_read().unwrap();
        let head = txn.open_table(Tables::RESOURCE_SUPPLY_HEAD).unwrap();
        History::read_current::<ResourceSupply>(&head, b"res").unwrap().map(|e| e.value)
    }

    #[test]
    fn test_mint_then_burn_matches_raw_sums() {
        let db = test_db();
        fold_supply(&db, &SupplyDelta::mint(TokenAmount::from_units(100)), 10);
        fold_supply(&db, &SupplyDelta::burn(TokenAmount::from_units(30)), 20);

        let supply = current_supply(&db).unwrap();
        assert_eq!(supply.total, TokenAmount::from_units(70));
        assert_eq!(supply.minted, TokenAmount::from_units(100));
        assert_eq!(supply.burnt, TokenAmount::from_units(30));
    }

    #[test]
    fn test_fold_equals_delta_sum_at_every_version() {
        let db = test_db();
        let deltas = [
            (5u64, SupplyDelta::mint(TokenAmount::from_units(10))),
            (6, SupplyDelta::mint(TokenAmount::from_units(7))),
            (9, SupplyDelta::burn(TokenAmount::from_units(4))),
        ];
        for (at, delta) in &deltas {
            fold_supply(&db, delta, *at);
        }

        let txn = db.begin_read().unwrap();
        let rows = txn.open_table(Tables::RESOURCE_SUPPLY_HISTORY).unwrap();
        for version in 5..=10u64 {
            let folded =
                History::read_at::<ResourceSupply>(&rows, b"res", StateVersion::new(version))
                    .unwrap()
                    .unwrap();
            let expected = deltas
                .iter()
                .filter(|(at, _)| *at <= version)
                .fold(ResourceSupply::ZERO, |acc, (_, d)| acc.apply(d));
            assert_eq!(folded.value, expected, "mismatch at version {version}");
        }
    }

    #[test]
    fn test_zero_delta_writes_nothing() {
        let db = test_db();
        fold_supply(&db, &SupplyDelta::mint(TokenAmount::from_units(1)), 10);
        let written = fold_supply(&db, &SupplyDelta::ZERO, 20);
        assert!(!written);

        // The open entry is untouched.
        let txn = db.begin_read().unwrap();
        let head = txn.open_table(Tables::RESOURCE_SUPPLY_HEAD).unwrap();
        let entry = History::read_current::<ResourceSupply>(&head, b"res").unwrap().unwrap();
        assert_eq!(entry.from_version, StateVersion::new(10));
    }
}

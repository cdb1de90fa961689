//! End-to-end properties of the versioned history store.
//!
//! These tests drive the public API only: ingest committed transactions,
//! read facts at pinned versions, page collections through cursors, and
//! roll history back. The rollback test compares full store dumps, so "an
//! exact inverse" means byte-for-byte equality across every relation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use tidemark_store::{
    CommittedTransaction, FactChange, IngestOutcome, LedgerStore, PageRequest, StoreConfig,
};
use tidemark_types::{
    AccountAddress, DepositorBadge, EntityAddress, LedgerStateSelector, MetadataValue,
    ResourceAddress, ResourcePreference, StateVersion, SupplyDelta, TokenAmount, ValidatorAddress,
};

fn open_store() -> LedgerStore {
    LedgerStore::open_in_memory(StoreConfig::default()).expect("open store")
}

fn tx(at: u64, changes: Vec<FactChange>) -> CommittedTransaction {
    CommittedTransaction { state_version: StateVersion::new(at), changes }
}

fn balance(account: &str, resource: &str, units: i64) -> FactChange {
    FactChange::Balance {
        account: AccountAddress::new(account),
        resource: ResourceAddress::new(resource),
        amount: TokenAmount::from_units(units),
    }
}

fn stake(validator: &str, units: i64) -> FactChange {
    FactChange::ValidatorStake {
        validator: ValidatorAddress::new(validator),
        staked: TokenAmount::from_units(units),
    }
}

#[test]
fn append_read_round_trip_through_the_public_api() {
    let store = open_store();
    let validator = ValidatorAddress::new("val_1");

    // The source starts mid-ledger at version 10.
    store.commit_transaction(&tx(10, vec![stake("val_1", 100)])).unwrap();
    for at in 11..15 {
        store.commit_transaction(&tx(at, vec![])).unwrap();
    }
    store.commit_transaction(&tx(15, vec![stake("val_1", 200)])).unwrap();

    let reader = store.reader();
    let at = |v: u64| {
        reader
            .validator_stake(&validator, LedgerStateSelector::AtVersion(StateVersion::new(v)))
            .unwrap()
            .map(|entry| entry.value)
    };

    assert_eq!(at(10), Some(TokenAmount::from_units(100)));
    assert_eq!(at(14), Some(TokenAmount::from_units(100)));
    assert_eq!(at(15), Some(TokenAmount::from_units(200)));
    assert_eq!(at(9), None, "the key did not exist yet at version 9");

    let current =
        reader.validator_stake(&validator, LedgerStateSelector::Latest).unwrap().unwrap();
    assert_eq!(current.value, TokenAmount::from_units(200));
    assert!(current.is_open());
}

#[test]
fn rollback_is_an_exact_inverse() {
    let store = open_store();
    let account = AccountAddress::new("acc_1");
    let gold = ResourceAddress::new("res_gold");

    store
        .commit_transaction(&tx(
            1,
            vec![
                balance("acc_1", "res_gold", 10),
                FactChange::Supply {
                    resource: gold.clone(),
                    delta: SupplyDelta::mint(TokenAmount::from_units(10)),
                },
                FactChange::Metadata {
                    entity: EntityAddress::new("res_gold"),
                    name: "symbol".to_string(),
                    value: MetadataValue { bytes: b"GLD".to_vec(), locked: true },
                },
            ],
        ))
        .unwrap();
    store
        .commit_transaction(&tx(
            2,
            vec![
                FactChange::PreferenceSet {
                    account: account.clone(),
                    resource: gold.clone(),
                    preference: ResourcePreference::Allowed,
                },
                FactChange::DepositorAdded {
                    account: account.clone(),
                    badge: DepositorBadge::Resource {
                        resource: ResourceAddress::new("res_badge"),
                    },
                },
            ],
        ))
        .unwrap();
    store.commit_transaction(&tx(3, vec![stake("val_1", 50)])).unwrap();

    let dump_at_three = store.snapshot().unwrap();

    // Arbitrary further changes: updates to existing keys, brand-new keys,
    // membership growth and removal, supply folds.
    store
        .commit_transaction(&tx(
            4,
            vec![
                balance("acc_1", "res_gold", 99),
                balance("acc_1", "res_silver", 5),
                balance("acc_2", "res_gold", 1),
                FactChange::Supply {
                    resource: gold.clone(),
                    delta: SupplyDelta::burn(TokenAmount::from_units(3)),
                },
            ],
        ))
        .unwrap();
    store
        .commit_transaction(&tx(
            5,
            vec![
                FactChange::PreferenceRemoved { account: account.clone(), resource: gold.clone() },
                FactChange::Metadata {
                    entity: EntityAddress::new("res_gold"),
                    name: "symbol".to_string(),
                    value: MetadataValue { bytes: b"AUR".to_vec(), locked: false },
                },
                stake("val_2", 1000),
            ],
        ))
        .unwrap();

    let report = store.rollback_to(StateVersion::new(3)).unwrap();
    assert_eq!(report.previous_tip, StateVersion::new(5));
    assert!(report.rows_removed > 0);

    let dump_after_rollback = store.snapshot().unwrap();
    assert_eq!(
        dump_after_rollback, dump_at_three,
        "rollback must restore every relation byte-for-byte"
    );
}

#[test]
fn redelivered_transaction_changes_nothing() {
    let store = open_store();
    store.commit_transaction(&tx(1, vec![stake("val_1", 10)])).unwrap();
    store.commit_transaction(&tx(2, vec![stake("val_1", 20)])).unwrap();

    let dump = store.snapshot().unwrap();

    // Re-deliver version 1 with a conflicting payload.
    let outcome = store.commit_transaction(&tx(1, vec![stake("val_1", 777)])).unwrap();
    assert_eq!(outcome, IngestOutcome::AlreadyIngested);
    assert_eq!(store.snapshot().unwrap(), dump);
}

#[test]
fn pagination_is_stable_under_growth() {
    let store = open_store();
    let account = AccountAddress::new("acc_1");

    // Five members enter the collection in one transaction at version 20.
    store.commit_transaction(&tx(19, vec![])).unwrap();
    store
        .commit_transaction(&tx(
            20,
            (1..=5).map(|i| balance("acc_1", &format!("res_{i}"), i)).collect(),
        ))
        .unwrap();

    let reader = store.reader();
    let first = reader
        .owned_resources(
            &account,
            &PageRequest::First {
                selector: LedgerStateSelector::AtVersion(StateVersion::new(20)),
                limit: 2,
            },
        )
        .unwrap()
        .unwrap();

    assert_eq!(first.total_count, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].resource, ResourceAddress::new("res_1"));
    assert_eq!(first.items[1].resource, ResourceAddress::new("res_2"));

    // Walk the cursor to offset 4: exactly the fifth member.
    let second = reader
        .owned_resources(
            &account,
            &PageRequest::Continue { cursor: first.next_cursor.unwrap() },
        )
        .unwrap()
        .unwrap();
    let third = reader
        .owned_resources(
            &account,
            &PageRequest::Continue { cursor: second.next_cursor.unwrap() },
        )
        .unwrap()
        .unwrap();

    assert_eq!(third.items.len(), 1);
    assert_eq!(third.items[0].resource, ResourceAddress::new("res_5"));
    assert_eq!(third.total_count, 5);
    assert!(third.next_cursor.is_none());
}

#[test]
fn incremental_aggregation_matches_raw_delta_sums() {
    let store = open_store();
    let gold = ResourceAddress::new("res_gold");

    store
        .commit_transaction(&tx(
            1,
            vec![FactChange::Supply {
                resource: gold.clone(),
                delta: SupplyDelta::mint(TokenAmount::from_units(100)),
            }],
        ))
        .unwrap();
    store
        .commit_transaction(&tx(
            2,
            vec![FactChange::Supply {
                resource: gold.clone(),
                delta: SupplyDelta::burn(TokenAmount::from_units(30)),
            }],
        ))
        .unwrap();

    let reader = store.reader();
    let supply =
        reader.resource_supply(&gold, LedgerStateSelector::Latest).unwrap().unwrap().value;
    assert_eq!(supply.total, TokenAmount::from_units(70));
    assert_eq!(supply.minted, TokenAmount::from_units(100));
    assert_eq!(supply.burnt, TokenAmount::from_units(30));
}

#[test]
fn zero_supply_delta_leaves_no_trace() {
    let store = open_store();
    let gold = ResourceAddress::new("res_gold");

    store
        .commit_transaction(&tx(
            1,
            vec![FactChange::Supply {
                resource: gold.clone(),
                delta: SupplyDelta::mint(TokenAmount::from_units(1)),
            }],
        ))
        .unwrap();
    let dump = store.snapshot().unwrap();

    // A quiescent transaction for the same resource.
    store
        .commit_transaction(&tx(
            2,
            vec![FactChange::Supply { resource: gold.clone(), delta: SupplyDelta::ZERO }],
        ))
        .unwrap();

    let after = store.snapshot().unwrap();
    // Only the tip moved; the supply relation grew no rows.
    assert_eq!(after.relations, dump.relations);
    assert_eq!(after.meta.get("tip"), Some(&2));
}

#[test]
fn nan_amounts_survive_storage() {
    let store = open_store();
    store
        .commit_transaction(&tx(
            1,
            vec![FactChange::Balance {
                account: AccountAddress::new("acc_1"),
                resource: ResourceAddress::new("res_gold"),
                amount: TokenAmount::NAN,
            }],
        ))
        .unwrap();

    let reader = store.reader();
    let entry = reader
        .balance(
            &AccountAddress::new("acc_1"),
            &ResourceAddress::new("res_gold"),
            LedgerStateSelector::Latest,
        )
        .unwrap()
        .unwrap();
    assert!(entry.value.is_nan());
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("history.redb");

    {
        let store = LedgerStore::open(&path, StoreConfig::default()).unwrap();
        store.commit_transaction(&tx(1, vec![stake("val_1", 10)])).unwrap();
        store.commit_transaction(&tx(2, vec![stake("val_1", 20)])).unwrap();
    }

    let store = LedgerStore::open(&path, StoreConfig::default()).unwrap();
    assert_eq!(store.tip().unwrap(), Some(StateVersion::new(2)));

    let reader = store.reader();
    let entry = reader
        .validator_stake(
            &ValidatorAddress::new("val_1"),
            LedgerStateSelector::AtVersion(StateVersion::new(1)),
        )
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, TokenAmount::from_units(10));
}

#[test]
fn readers_see_consistent_state_across_relations() {
    let store = open_store();
    let gold = ResourceAddress::new("res_gold");

    // Balance and supply always move together in each transaction; any
    // consistent read must agree between the two relations.
    for at in 1..=10u64 {
        store
            .commit_transaction(&tx(
                at,
                vec![
                    balance("acc_1", "res_gold", at as i64),
                    FactChange::Supply {
                        resource: gold.clone(),
                        delta: SupplyDelta::mint(TokenAmount::from_units(1)),
                    },
                ],
            ))
            .unwrap();
    }

    let reader = store.reader();
    for at in 1..=10u64 {
        let selector = LedgerStateSelector::AtVersion(StateVersion::new(at));
        let balance = reader
            .balance(&AccountAddress::new("acc_1"), &gold, selector)
            .unwrap()
            .unwrap()
            .value;
        let supply = reader.resource_supply(&gold, selector).unwrap().unwrap().value;
        assert_eq!(balance, TokenAmount::from_units(at as i64));
        assert_eq!(supply.total, TokenAmount::from_units(at as i64));
    }
}

//! Pending-set convergence over a sequence of ledger snapshots.

use casuma::codec::SubscriptionDatum;
use casuma::contract::SubscriptionContract;
use casuma::domain::{
    Lifecycle, Network, NetworkId, PubKeyHash, Subscription, TimeMs, TxOutput, Value,
};
use casuma::engine::{group_utxos, reconcile};
use casuma::ledger::{
    LedgerClient, MockCompiler, MockKey, MockLedger, MockWallet,
};
use casuma::tx::{open_subscription, BalancingFinalizer, OpenRequest, TxContext};
use std::collections::HashSet;
use std::sync::Arc;

const DAY_MS: i64 = 86_400_000;

fn datum(funds: u64, next: i64) -> SubscriptionDatum {
    SubscriptionDatum::new(
        PubKeyHash::new([1; 28]),
        PubKeyHash::new([2; 28]),
        Value::ada(funds),
        Value::ada(1),
        DAY_MS,
        TimeMs::new(next),
    )
    .unwrap()
}

async fn open(
    ledger: &Arc<MockLedger>,
    wallet: &MockWallet,
    contract: &SubscriptionContract,
    funds: u64,
) -> Subscription {
    let ctx = TxContext::new(
        ledger.as_ref(),
        wallet,
        &BalancingFinalizer,
        contract,
        2_000_000,
    );
    let request = OpenRequest {
        vendor: MockKey::from_seed("vendor").pub_key_hash(),
        funds: Value::ada(funds),
        price: Value::ada(1),
        interval_ms: DAY_MS,
        first_withdrawal: TimeMs::new(1_800_000_000_000),
    };
    open_subscription(&ctx, &request).await.unwrap().pending
}

#[tokio::test]
async fn test_opening_survives_until_seen_then_drops() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let key = MockKey::from_seed("customer");
    // two outputs so a second open can be built before the first confirms
    ledger.fund(key.address(NetworkId::Testnet), Value::ada(30));
    ledger.fund(key.address(NetworkId::Testnet), Value::ada(30));
    let wallet = MockWallet::new(key, ledger.clone());
    let contract = SubscriptionContract::load(&MockCompiler::new(), Network::Preview)
        .await
        .unwrap();

    let mut pending = vec![open(&ledger, &wallet, &contract, 10).await];
    pending.push(open(&ledger, &wallet, &contract, 12).await);
    assert!(pending.iter().all(|p| p.lifecycle() == Lifecycle::Opening));

    // any number of syncs before confirmation keeps both
    for _ in 0..3 {
        let snapshot = group_utxos(&ledger.utxos_at(&contract.address).await.unwrap());
        pending = reconcile(&pending, &snapshot).pending;
        assert_eq!(pending.len(), 2);
    }

    ledger.confirm();
    let snapshot = group_utxos(&ledger.utxos_at(&contract.address).await.unwrap());
    let next = reconcile(&pending, &snapshot);
    assert_eq!(next.confirmed, 2);
    assert!(next.pending.is_empty());
}

#[tokio::test]
async fn test_discarded_open_stays_pending() {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let key = MockKey::from_seed("customer");
    ledger.fund(key.address(NetworkId::Testnet), Value::ada(30));
    let wallet = MockWallet::new(key, ledger.clone());
    let contract = SubscriptionContract::load(&MockCompiler::new(), Network::Preview)
        .await
        .unwrap();

    let pending = vec![open(&ledger, &wallet, &contract, 10).await];
    assert_eq!(ledger.discard_mempool(), 1);

    let snapshot = group_utxos(&ledger.utxos_at(&contract.address).await.unwrap());
    assert_eq!(reconcile(&pending, &snapshot).pending.len(), 1);
}

#[test]
fn test_grouping_is_idempotent() {
    let ledger = MockLedger::new(Network::Preview);
    let script = casuma::domain::Address::from_validator_hash(
        NetworkId::Testnet,
        casuma::domain::ValidatorHash::new([7; 28]),
    );
    for (funds, next) in [(5, 0), (5, 0), (7, 0), (5, DAY_MS)] {
        let d = datum(funds, next);
        ledger.insert(TxOutput::with_inline_datum(
            script.clone(),
            Value::ada(funds),
            d.to_data(),
        ));
    }
    ledger.insert(TxOutput::new(script.clone(), Value::ada(1)));
    let utxos = ledger.spendable_at(&script);

    let first = group_utxos(&utxos);
    let second = group_utxos(&utxos);
    assert_eq!(first.len(), 3);

    let keys = |subs: &[Subscription]| -> HashSet<Vec<u8>> {
        subs.iter().map(|s| s.key().as_bytes().to_vec()).collect()
    };
    assert_eq!(keys(&first), keys(&second));

    let mut reversed = utxos.clone();
    reversed.reverse();
    assert_eq!(keys(&group_utxos(&reversed)), keys(&first));

    let doubled = first
        .iter()
        .find(|s| s.datum() == &datum(5, 0))
        .unwrap();
    assert_eq!(doubled.outputs().len(), 2);
    assert_eq!(doubled.available(), Value::ada(10));
}

#[test]
fn test_reconcile_is_keyed_by_datum_not_outputs() {
    let closing = Subscription::active(datum(5, 0), vec![]).closing();
    // the same datum seen again, now backed by different outputs
    let seen_again = Subscription::active(datum(5, 0), vec![]);
    let next = reconcile(&[closing.clone()], &[seen_again]);
    assert_eq!(next.pending.len(), 1);
    assert_eq!(next.pending[0].lifecycle(), Lifecycle::Closing);

    let unrelated = Subscription::active(datum(6, 0), vec![]);
    assert!(reconcile(&[closing], &[unrelated]).pending.is_empty());
}

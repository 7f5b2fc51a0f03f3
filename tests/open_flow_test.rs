use casuma::codec::SubscriptionDatum;
use casuma::contract::SubscriptionContract;
use casuma::domain::{Lifecycle, Network, NetworkId, TimeMs, Value};
use casuma::engine::{group_utxos, reconcile};
use casuma::error::BuildError;
use casuma::ledger::{LedgerClient, MockCompiler, MockKey, MockLedger, MockWallet, ServiceError};
use casuma::tx::{open_subscription, BalancingFinalizer, OpenRequest, Stage, TxContext};
use parking_lot::Mutex;
use std::sync::Arc;

const NOW: i64 = 1_700_000_040_000;
const DAY_MS: i64 = 86_400_000;
const FEE_PROBE: u64 = 2_000_000;

struct Fixture {
    ledger: Arc<MockLedger>,
    customer: MockWallet,
    vendor: MockKey,
    contract: SubscriptionContract,
}

async fn setup() -> Fixture {
    let ledger = Arc::new(MockLedger::new(Network::Preview));
    let customer_key = MockKey::from_seed("customer");
    ledger.fund(customer_key.address(NetworkId::Testnet), Value::ada(50));
    let contract = SubscriptionContract::load(&MockCompiler::new(), Network::Preview)
        .await
        .unwrap();
    Fixture {
        customer: MockWallet::new(customer_key, ledger.clone()),
        vendor: MockKey::from_seed("vendor"),
        ledger,
        contract,
    }
}

fn request(fx: &Fixture, funds: Value) -> OpenRequest {
    OpenRequest {
        vendor: fx.vendor.pub_key_hash(),
        funds,
        price: Value::ada(1),
        interval_ms: DAY_MS,
        first_withdrawal: TimeMs::new(NOW + 10 * 60 * 1000),
    }
}

#[tokio::test]
async fn test_open_locks_funds_under_initial_datum() {
    let fx = setup().await;
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );

    let submitted = open_subscription(&ctx, &request(&fx, Value::ada(10)))
        .await
        .unwrap();

    let pending = &submitted.pending;
    assert_eq!(pending.lifecycle(), Lifecycle::Opening);
    assert_eq!(pending.lifecycle().index(), 0);
    assert_eq!(pending.customer(), fx.customer.pub_key_hash());
    assert_eq!(pending.vendor(), fx.vendor.pub_key_hash());

    let locked = &submitted.tx.outputs[0];
    let params = fx.ledger.params().await.unwrap();
    assert_eq!(locked.address, fx.contract.address);
    assert_eq!(locked.value, Value::ada(10));
    assert!(locked.value.lovelace >= params.min_lovelace(locked));
    let datum = SubscriptionDatum::from_data(locked.inline_datum().unwrap()).unwrap();
    assert_eq!(&datum, pending.datum());
    assert_eq!(fx.ledger.mempool_len(), 1);
}

#[tokio::test]
async fn test_open_becomes_active_after_confirmation() {
    let fx = setup().await;
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );
    let submitted = open_subscription(&ctx, &request(&fx, Value::ada(10)))
        .await
        .unwrap();
    let pending = vec![submitted.pending];

    let before = group_utxos(&fx.ledger.utxos_at(&fx.contract.address).await.unwrap());
    assert!(before.is_empty());
    assert_eq!(reconcile(&pending, &before).pending.len(), 1);

    fx.ledger.confirm();
    let after = group_utxos(&fx.ledger.utxos_at(&fx.contract.address).await.unwrap());
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].lifecycle(), Lifecycle::Active);
    assert_eq!(after[0], pending[0]);

    let next = reconcile(&pending, &after);
    assert!(next.pending.is_empty());
    assert_eq!(next.confirmed, 1);
}

#[tokio::test]
async fn test_open_raises_small_funds_to_minimum_deposit() {
    let fx = setup().await;
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );

    let submitted = open_subscription(&ctx, &request(&fx, Value::lovelace(1)))
        .await
        .unwrap();

    let params = fx.ledger.params().await.unwrap();
    let locked = &submitted.tx.outputs[0];
    let datum = SubscriptionDatum::from_data(locked.inline_datum().unwrap()).unwrap();
    // the datum is the source of truth for funds, so it must match the raised value
    assert_eq!(datum.funds, locked.value);
    assert_eq!(locked.value.lovelace, params.min_lovelace(locked));
    assert_eq!(submitted.pending.funds(), &locked.value);
}

#[tokio::test]
async fn test_stages_are_announced_in_order() {
    let fx = setup().await;
    let seen = Mutex::new(Vec::new());
    let listener = |stage: Stage| seen.lock().push(stage);
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    )
    .with_stage_listener(&listener);

    open_subscription(&ctx, &request(&fx, Value::ada(10)))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            Stage::Building,
            Stage::Signing,
            Stage::Verifying,
            Stage::Submitting
        ]
    );
}

#[tokio::test]
async fn test_declined_signature_submits_nothing() {
    let fx = setup().await;
    fx.customer.set_reject_signing(true);
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );

    let err = open_subscription(&ctx, &request(&fx, Value::ada(10)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::Service(ServiceError::Rejected("user declined to sign".to_string()))
    );
    assert_eq!(err.to_string(), "user declined to sign");
    assert_eq!(fx.ledger.mempool_len(), 0);
}

#[tokio::test]
async fn test_lost_acknowledgment_is_a_failure() {
    let fx = setup().await;
    fx.ledger
        .fail_next_submit(ServiceError::Network("connection reset".to_string()));
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );

    let err = open_subscription(&ctx, &request(&fx, Value::ada(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Service(ServiceError::Network(_))));
    assert!(fx.ledger.submitted().is_empty());
}

#[tokio::test]
async fn test_open_beyond_balance_is_refused() {
    let fx = setup().await;
    let ctx = TxContext::new(
        fx.ledger.as_ref(),
        &fx.customer,
        &BalancingFinalizer,
        &fx.contract,
        FEE_PROBE,
    );

    let err = open_subscription(&ctx, &request(&fx, Value::ada(60)))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Precondition(msg) if msg.starts_with("insufficient funds")));
    assert_eq!(fx.ledger.mempool_len(), 0);
}

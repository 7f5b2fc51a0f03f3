use anyhow::Context;
use casuma::domain::{TimeMs, Value};
use casuma::form::SubscriptionForm;
use casuma::ledger::{MockCompiler, MockKey, MockLedger, MockWallet};
use casuma::session::ManualClock;
use casuma::{Config, Session, SessionDeps};
use std::sync::Arc;

const TEN_MINUTES_MS: i64 = 10 * 60 * 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let network = config.network;

    let ledger = Arc::new(MockLedger::new(network));
    let customer_key = MockKey::from_seed("customer");
    let vendor_key = MockKey::from_seed("vendor");
    ledger.fund(customer_key.address(network.id()), Value::ada(50));
    ledger.fund(vendor_key.address(network.id()), Value::ada(20));

    let clock = Arc::new(ManualClock::new(TimeMs::now()));
    let session_for = |key: MockKey| {
        let wallet = Arc::new(MockWallet::new(key, ledger.clone()).with_network_id(network.id()));
        SessionDeps::new(ledger.clone(), wallet, Arc::new(MockCompiler::new()))
            .with_clock(clock.clone())
    };

    let customer = Session::connect(config.clone(), session_for(customer_key))
        .await
        .context("customer connect")?;
    let vendor = Session::connect(config, session_for(vendor_key))
        .await
        .context("vendor connect")?;

    let form = SubscriptionForm {
        vendor: vendor.base_address().to_bech32(),
        funds: "10".to_string(),
        price: "1".to_string(),
        ..customer.new_form()?
    };
    let opened = customer.open_subscription(&form).await?;
    tracing::info!("Open submitted as {}", opened.tx_id);

    ledger.confirm();
    customer.sync_ledger().await?;
    vendor.sync_ledger().await?;

    clock.advance(TEN_MINUTES_MS + 60_000);
    let key = opened.pending.key().clone();
    let withdrawn = vendor.withdraw(&key).await?;
    tracing::info!("Withdraw submitted as {}", withdrawn.tx_id);

    ledger.confirm();
    customer.sync_ledger().await?;
    vendor.sync_ledger().await?;

    for (who, session) in [("customer", &customer), ("vendor", &vendor)] {
        let overview = session.overview().context("session disconnected")?;
        println!("{}: {}", who, serde_json::to_string_pretty(&overview)?);
    }
    Ok(())
}

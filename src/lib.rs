pub mod codec;
pub mod config;
pub mod contract;
pub mod domain;
pub mod engine;
pub mod error;
pub mod form;
pub mod ledger;
pub mod session;
pub mod tx;

pub use codec::{DatumKey, SubscriptionDatum};
pub use config::Config;
pub use contract::SubscriptionContract;
pub use domain::{Address, Lifecycle, Network, Subscription, TimeMs, Value};
pub use engine::{group_utxos, reconcile};
pub use error::{BuildError, SessionError};
pub use form::SubscriptionForm;
pub use ledger::{LedgerClient, MockCompiler, MockKey, MockLedger, MockWallet, ScriptCompiler, Wallet};
pub use session::{Scheduler, Session, SessionDeps, SyncOutcome};

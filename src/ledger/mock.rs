//! In-memory collaborators for tests and the demo binary.
//!
//! `MockLedger` keeps a UTxO set plus a mempool. Submitted transactions are fully
//! validated (inputs, balance, fee, signatures, subscription validator) but only
//! become visible after an explicit `confirm()`, which makes confirmation latency
//! something a test controls.

use super::{
    LedgerClient, ProtocolParams, ScriptCompiler, ServiceError, Validator, Wallet, WalletState,
};
use crate::codec::SubscriptionDatum;
use crate::contract::check_spend;
use crate::domain::{
    Address, Network, NetworkId, OutputRef, PubKeyHash, TxId, TxOutput, Utxo, ValidatorHash,
    Value,
};
use crate::tx::{Tx, Witness};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const PLUTUS_V2_PREFIX: u8 = 0x02;

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn hash28(bytes: &[u8]) -> [u8; 28] {
    let digest = sha256(&[bytes]);
    let mut out = [0u8; 28];
    out.copy_from_slice(&digest[..28]);
    out
}

/// Deterministic signing key derived from a seed phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockKey {
    vkey: [u8; 32],
}

impl MockKey {
    pub fn from_seed(seed: &str) -> Self {
        Self {
            vkey: sha256(&[seed.as_bytes()]),
        }
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        PubKeyHash::new(hash28(&self.vkey))
    }

    /// Enterprise address of this key.
    pub fn address(&self, network: NetworkId) -> Address {
        Address::from_pub_key_hash(network, self.pub_key_hash())
    }

    pub fn sign(&self, tx_id: &TxId) -> Witness {
        Witness {
            signer: self.pub_key_hash(),
            vkey: self.vkey,
            signature: Self::signature(&self.vkey, tx_id),
        }
    }

    fn signature(vkey: &[u8; 32], tx_id: &TxId) -> Vec<u8> {
        let mut sig = sha256(&[vkey.as_slice(), tx_id.as_bytes()]).to_vec();
        sig.extend_from_slice(&sha256(&[tx_id.as_bytes(), vkey.as_slice()]));
        sig
    }

    pub fn verify(witness: &Witness, tx_id: &TxId) -> bool {
        witness.signer == PubKeyHash::new(hash28(&witness.vkey))
            && witness.signature == Self::signature(&witness.vkey, tx_id)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, TxOutput>,
    mempool: Vec<Tx>,
    submitted: Vec<TxId>,
    genesis_seq: u32,
    query_failure: Option<ServiceError>,
    submit_failure: Option<ServiceError>,
}

impl LedgerState {
    fn pending_spends(&self) -> HashSet<OutputRef> {
        self.mempool
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.utxo.out_ref))
            .collect()
    }
}

/// In-memory ledger with an explicit confirmation step.
#[derive(Debug)]
pub struct MockLedger {
    params: ProtocolParams,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        Self {
            params: ProtocolParams::for_network(network),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    /// Seed a confirmed output, as if created before the session began.
    pub fn with_utxo(self, address: Address, value: Value) -> Self {
        self.fund(address, value);
        self
    }

    pub fn fund(&self, address: Address, value: Value) -> OutputRef {
        self.insert(TxOutput::new(address, value))
    }

    /// Seed an arbitrary confirmed output (e.g. one carrying a datum).
    pub fn insert(&self, output: TxOutput) -> OutputRef {
        let mut state = self.state.lock();
        state.genesis_seq += 1;
        // the slot anchor keeps ids of ledgers on different networks apart
        let anchor = self.params.slots.zero_time.as_ms().to_be_bytes();
        let id = TxId::new(sha256(&[
            b"genesis".as_slice(),
            &anchor,
            &state.genesis_seq.to_be_bytes(),
        ]));
        let out_ref = OutputRef::new(id, 0);
        state.utxos.insert(out_ref, output);
        out_ref
    }

    /// Apply every mempool transaction in submission order. Returns how many.
    pub fn confirm(&self) -> usize {
        let mut state = self.state.lock();
        let mempool = std::mem::take(&mut state.mempool);
        for tx in &mempool {
            let id = tx.id();
            for input in &tx.inputs {
                state.utxos.remove(&input.utxo.out_ref);
            }
            for (i, output) in tx.outputs.iter().enumerate() {
                state.utxos.insert(OutputRef::new(id, i as u32), output.clone());
            }
            info!("Confirmed tx {}", id);
        }
        mempool.len()
    }

    /// Drop the mempool, as if the transactions were never included.
    pub fn discard_mempool(&self) -> usize {
        std::mem::take(&mut self.state.lock().mempool).len()
    }

    pub fn mempool_len(&self) -> usize {
        self.state.lock().mempool.len()
    }

    pub fn mempool(&self) -> Vec<Tx> {
        self.state.lock().mempool.clone()
    }

    /// Ids of every accepted submission.
    pub fn submitted(&self) -> Vec<TxId> {
        self.state.lock().submitted.clone()
    }

    pub fn set_query_failure(&self, failure: Option<ServiceError>) {
        self.state.lock().query_failure = failure;
    }

    /// The next `submit` fails with `failure` without validating.
    pub fn fail_next_submit(&self, failure: ServiceError) {
        self.state.lock().submit_failure = Some(failure);
    }

    /// Confirmed outputs at `address` not spent by a mempool transaction.
    pub fn spendable_at(&self, address: &Address) -> Vec<Utxo> {
        let state = self.state.lock();
        let spent = state.pending_spends();
        state
            .utxos
            .iter()
            .filter(|(r, o)| &o.address == address && !spent.contains(r))
            .map(|(r, o)| Utxo::new(*r, o.clone()))
            .collect()
    }

    fn validate(&self, state: &LedgerState, tx: &Tx) -> Result<(), String> {
        let id = tx.id();
        let spent = state.pending_spends();

        let mut seen = HashSet::new();
        for input in &tx.inputs {
            let r = input.utxo.out_ref;
            if !seen.insert(r) {
                return Err(format!("duplicate input {}", r));
            }
            match state.utxos.get(&r) {
                Some(out) if out == &input.utxo.output && !spent.contains(&r) => {}
                _ => return Err(format!("unknown or spent input {}", r)),
            }
        }

        let owed = tx
            .output_value()
            .checked_add(&Value::lovelace(tx.fee))
            .ok_or("value overflow")?;
        if tx.input_value() != owed {
            return Err(format!(
                "value not conserved: inputs {}, outputs plus fee {}",
                tx.input_value(),
                owed
            ));
        }

        let script_inputs = tx.script_inputs().count();
        let size = tx.to_cbor().len();
        let min_fee = self.params.min_fee(size, script_inputs);
        if tx.fee < min_fee {
            return Err(format!("fee {} below minimum {}", tx.fee, min_fee));
        }
        if size > self.params.max_tx_size {
            return Err(format!("transaction too large: {} bytes", size));
        }

        for output in &tx.outputs {
            let floor = self.params.min_lovelace(output);
            if output.value.lovelace < floor {
                return Err(format!(
                    "output below minimum deposit: {} < {}",
                    output.value.lovelace, floor
                ));
            }
        }

        for witness in &tx.witnesses {
            if !MockKey::verify(witness, &id) {
                return Err(format!("invalid signature by {}", witness.signer));
            }
        }
        for signer in tx.expected_signers() {
            if !tx.is_signed_by(&signer) {
                return Err(format!("missing signature from {}", signer));
            }
        }

        if script_inputs > 0 || tx.inputs.iter().any(|i| is_script(&i.utxo)) {
            self.validate_scripts(state, tx)?;
        }
        Ok(())
    }

    fn validate_scripts(&self, state: &LedgerState, tx: &Tx) -> Result<(), String> {
        let collateral: u64 = tx
            .collateral
            .iter()
            .map(|c| match state.utxos.get(&c.out_ref) {
                Some(out) if out.value.is_pure_lovelace() => Ok(out.value.lovelace),
                _ => Err(format!("unusable collateral {}", c.out_ref)),
            })
            .sum::<Result<u64, String>>()?;
        let required = self.params.min_collateral(tx.fee);
        if collateral < required {
            return Err(format!("collateral {} below {}", collateral, required));
        }

        for input in &tx.inputs {
            let Some(hash) = input.utxo.output.address.validator_hash() else {
                continue;
            };
            let r = input.utxo.out_ref;
            if !tx.scripts.iter().any(|s| s.hash == hash) {
                return Err(format!("missing script {} for {}", hash, r));
            }
            if input.redeemer.is_none() {
                return Err(format!("missing redeemer for {}", r));
            }
            let datum = input
                .utxo
                .output
                .inline_datum()
                .ok_or_else(|| format!("missing datum for {}", r))
                .and_then(|d| {
                    SubscriptionDatum::from_data(d).map_err(|e| format!("bad datum at {}: {}", r, e))
                })?;
            check_spend(&datum, tx, hash, &self.params.slots)
                .map_err(|e| format!("validator failed for {}: {}", r, e))?;
        }
        Ok(())
    }
}

fn is_script(utxo: &Utxo) -> bool {
    utxo.output.address.validator_hash().is_some()
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, ServiceError> {
        let state = self.state.lock();
        if let Some(failure) = &state.query_failure {
            return Err(failure.clone());
        }
        Ok(state
            .utxos
            .iter()
            .filter(|(_, o)| &o.address == address)
            .map(|(r, o)| Utxo::new(*r, o.clone()))
            .collect())
    }

    async fn has_utxo(&self, out_ref: &OutputRef) -> Result<bool, ServiceError> {
        let state = self.state.lock();
        if let Some(failure) = &state.query_failure {
            return Err(failure.clone());
        }
        Ok(state.utxos.contains_key(out_ref))
    }

    async fn params(&self) -> Result<ProtocolParams, ServiceError> {
        Ok(self.params.clone())
    }

    async fn submit(&self, tx: &Tx) -> Result<TxId, ServiceError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.submit_failure.take() {
            return Err(failure);
        }
        self.validate(&state, tx).map_err(ServiceError::Rejected)?;

        let id = tx.id();
        debug!("Accepted tx {} into mempool", id);
        state.mempool.push(tx.clone());
        state.submitted.push(id);
        Ok(id)
    }
}

#[derive(Debug)]
struct WalletControl {
    key: MockKey,
    unresponsive: bool,
    reject_signing: bool,
}

/// Single-key wallet whose outputs live in a `MockLedger`.
#[derive(Debug)]
pub struct MockWallet {
    ledger: Arc<MockLedger>,
    network_id: NetworkId,
    control: Mutex<WalletControl>,
}

impl MockWallet {
    pub fn new(key: MockKey, ledger: Arc<MockLedger>) -> Self {
        Self {
            ledger,
            network_id: NetworkId::Testnet,
            control: Mutex::new(WalletControl {
                key,
                unresponsive: false,
                reject_signing: false,
            }),
        }
    }

    pub fn with_network_id(mut self, network_id: NetworkId) -> Self {
        self.network_id = network_id;
        self
    }

    pub fn address(&self) -> Address {
        self.control.lock().key.address(self.network_id)
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.control.lock().key.pub_key_hash()
    }

    /// Every call fails until cleared, like a connector that went away.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.control.lock().unresponsive = unresponsive;
    }

    pub fn set_reject_signing(&self, reject: bool) {
        self.control.lock().reject_signing = reject;
    }

    /// Switch the active account, as a user would in the wallet extension.
    pub fn switch_key(&self, key: MockKey) {
        self.control.lock().key = key;
    }

    fn check_responsive(&self) -> Result<(), ServiceError> {
        if self.control.lock().unresponsive {
            return Err(ServiceError::Unavailable("wallet not responding".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn network_id(&self) -> Result<NetworkId, ServiceError> {
        self.check_responsive()?;
        Ok(self.network_id)
    }

    async fn state(&self) -> Result<WalletState, ServiceError> {
        self.check_responsive()?;
        let address = self.address();
        let utxos = self.ledger.spendable_at(&address);
        Ok(WalletState::new(address, utxos))
    }

    async fn sign(&self, tx: &Tx) -> Result<Vec<Witness>, ServiceError> {
        self.check_responsive()?;
        let control = self.control.lock();
        if control.reject_signing {
            return Err(ServiceError::Rejected("user declined to sign".to_string()));
        }
        Ok(vec![control.key.sign(&tx.id())])
    }
}

/// Compiler stand-in: the program is the source text and the hash is derived
/// from it, so the script address is stable for a given source.
#[derive(Debug, Clone, Default)]
pub struct MockCompiler;

impl MockCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptCompiler for MockCompiler {
    async fn compile(&self, source: &str) -> Result<Validator, ServiceError> {
        if source.trim().is_empty() {
            return Err(ServiceError::Rejected("empty validator source".to_string()));
        }
        let program = source.as_bytes().to_vec();
        let mut tagged = vec![PLUTUS_V2_PREFIX];
        tagged.extend_from_slice(&program);
        let hash = ValidatorHash::new(hash28(&tagged));
        Ok(Validator { hash, program })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{BalancingFinalizer, TxFinalizer};

    fn setup() -> (Arc<MockLedger>, MockKey) {
        let key = MockKey::from_seed("alice");
        let ledger = Arc::new(
            MockLedger::new(Network::Preview)
                .with_utxo(key.address(NetworkId::Testnet), Value::ada(20)),
        );
        (ledger, key)
    }

    async fn payment(ledger: &MockLedger, key: &MockKey, to: Address, ada: u64) -> Tx {
        let from = key.address(NetworkId::Testnet);
        let mut tx = Tx::new();
        tx.add_inputs(ledger.spendable_at(&from));
        tx.add_output(TxOutput::new(to, Value::ada(ada)));
        let params = ledger.params().await.unwrap();
        BalancingFinalizer
            .finalize(tx, &params, &from, &[])
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_then_confirm() {
        let (ledger, key) = setup();
        let bob = MockKey::from_seed("bob").address(NetworkId::Testnet);
        let mut tx = payment(&ledger, &key, bob.clone(), 5).await;
        tx.add_witnesses(vec![key.sign(&tx.id())]);

        let id = ledger.submit(&tx).await.unwrap();
        assert_eq!(id, tx.id());
        assert!(ledger.utxos_at(&bob).await.unwrap().is_empty());
        assert!(ledger.spendable_at(&key.address(NetworkId::Testnet)).is_empty());

        assert_eq!(ledger.confirm(), 1);
        let received = ledger.utxos_at(&bob).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].out_ref, OutputRef::new(id, 0));
        assert!(ledger.has_utxo(&received[0].out_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_ledgers_on_other_networks_do_not_share_outputs() {
        let (preview, key) = setup();
        let preprod = MockLedger::new(Network::Preprod);
        let seeded = preprod.fund(key.address(NetworkId::Testnet), Value::ada(20));

        assert!(preprod.has_utxo(&seeded).await.unwrap());
        assert!(!preview.has_utxo(&seeded).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsigned_tx_rejected() {
        let (ledger, key) = setup();
        let tx = payment(&ledger, &key, key.address(NetworkId::Testnet), 5).await;
        let err = ledger.submit(&tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(msg) if msg.starts_with("missing signature")));
    }

    #[tokio::test]
    async fn test_unbalanced_tx_rejected() {
        let (ledger, key) = setup();
        let mut tx = payment(&ledger, &key, key.address(NetworkId::Testnet), 5).await;
        tx.fee += 1;
        tx.add_witnesses(vec![key.sign(&tx.id())]);
        let err = ledger.submit(&tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(msg) if msg.starts_with("value not conserved")));
    }

    #[tokio::test]
    async fn test_double_spend_rejected() {
        let (ledger, key) = setup();
        let mut tx = payment(&ledger, &key, key.address(NetworkId::Testnet), 5).await;
        tx.add_witnesses(vec![key.sign(&tx.id())]);
        ledger.submit(&tx).await.unwrap();
        assert!(ledger.submit(&tx).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (ledger, key) = setup();
        ledger.set_query_failure(Some(ServiceError::Network("down".to_string())));
        assert!(ledger.utxos_at(&key.address(NetworkId::Testnet)).await.is_err());
        ledger.set_query_failure(None);

        ledger.fail_next_submit(ServiceError::Network("ack lost".to_string()));
        let mut tx = payment(&ledger, &key, key.address(NetworkId::Testnet), 5).await;
        tx.add_witnesses(vec![key.sign(&tx.id())]);
        assert!(ledger.submit(&tx).await.is_err());
        assert!(ledger.submit(&tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_wallet_reports_spendable_outputs() {
        let (ledger, key) = setup();
        let wallet = MockWallet::new(key.clone(), ledger.clone());
        let state = wallet.state().await.unwrap();
        assert_eq!(state.balance(), Value::ada(20));
        assert_eq!(state.owner(), Some(key.pub_key_hash()));

        wallet.set_unresponsive(true);
        assert!(wallet.network_id().await.is_err());
    }

    #[tokio::test]
    async fn test_wallet_signature_verifies() {
        let (ledger, key) = setup();
        let wallet = MockWallet::new(key, ledger);
        let tx = Tx::new();
        let witnesses = wallet.sign(&tx).await.unwrap();
        assert!(MockKey::verify(&witnesses[0], &tx.id()));
        assert!(!MockKey::verify(&witnesses[0], &TxId::new([0; 32])));

        wallet.set_reject_signing(true);
        assert!(wallet.sign(&tx).await.is_err());
    }

    #[tokio::test]
    async fn test_compiler_is_deterministic() {
        let a = MockCompiler::new().compile("spending x").await.unwrap();
        let b = MockCompiler::new().compile("spending x").await.unwrap();
        let c = MockCompiler::new().compile("spending y").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a.hash, c.hash);
        assert!(MockCompiler::new().compile("  ").await.is_err());
    }
}

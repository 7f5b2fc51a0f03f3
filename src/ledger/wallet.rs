//! Snapshot of the connected wallet and coin selection over it.

use crate::domain::{Address, PubKeyHash, Utxo, Value, ValueError};

/// What the wallet reports on each refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletState {
    pub change_address: Address,
    pub utxos: Vec<Utxo>,
}

impl WalletState {
    pub fn new(change_address: Address, utxos: Vec<Utxo>) -> Self {
        Self {
            change_address,
            utxos,
        }
    }

    pub fn balance(&self) -> Value {
        Utxo::sum_value(&self.utxos)
    }

    /// Payment key hash of the change address; identifies the user.
    pub fn owner(&self) -> Option<PubKeyHash> {
        self.change_address.pub_key_hash()
    }

    /// Address compared across refreshes to detect an account switch.
    pub fn base_address(&self) -> &Address {
        &self.change_address
    }

    /// First output, used to confirm the wallet and ledger agree on the network.
    pub fn reference_utxo(&self) -> Option<&Utxo> {
        self.utxos.first()
    }

    /// Smallest-first selection covering `target`.
    ///
    /// Returns `(selected, spare)`; spare outputs are handed to the finalizer for
    /// fee top-up. Outputs that add nothing still missing are left as spare.
    pub fn pick_utxos(&self, target: &Value) -> Result<(Vec<Utxo>, Vec<Utxo>), ValueError> {
        let mut sorted = self.utxos.clone();
        sorted.sort_by(|a, b| {
            a.value()
                .lovelace
                .cmp(&b.value().lovelace)
                .then_with(|| a.out_ref.cmp(&b.out_ref))
        });

        let mut selected = Vec::new();
        let mut spare = Vec::new();
        let mut total = Value::zero();

        for utxo in sorted {
            if total.covers(target) || !contributes(&total, target, utxo.value()) {
                spare.push(utxo);
                continue;
            }
            total = total.try_add(utxo.value())?;
            selected.push(utxo);
        }

        if !total.covers(target) {
            return Err(ValueError::Underflow {
                have: self.balance(),
                need: target.clone(),
            });
        }
        Ok((selected, spare))
    }

    /// Smallest pure-lovelace output holding at least `min`.
    pub fn pick_collateral(&self, min: u64) -> Option<Utxo> {
        self.utxos
            .iter()
            .filter(|u| u.value().is_pure_lovelace() && u.value().lovelace >= min)
            .min_by_key(|u| u.value().lovelace)
            .cloned()
    }
}

fn contributes(total: &Value, target: &Value, candidate: &Value) -> bool {
    if total.lovelace < target.lovelace && candidate.lovelace > 0 {
        return true;
    }
    target
        .assets
        .iter()
        .any(|(p, t, q)| total.assets.get(p, t) < q && candidate.assets.get(p, t) > 0)
}

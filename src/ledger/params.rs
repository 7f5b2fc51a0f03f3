//! Protocol parameters and the time/slot conversion of a network.

use crate::domain::{Network, Slot, TimeMs, TxOutput};
use serde::{Deserialize, Serialize};

/// Fixed per-output overhead added to the serialized size before pricing.
const OUTPUT_OVERHEAD_BYTES: u64 = 160;

/// Wall-clock anchor of slot numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub zero_time: TimeMs,
    pub zero_slot: Slot,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    pub fn for_network(network: Network) -> Self {
        let (zero_time, zero_slot) = match network {
            Network::Preview => (1_666_656_000_000, 0),
            Network::Preprod => (1_655_769_600_000, 86_400),
            Network::Mainnet => (1_596_059_091_000, 4_492_800),
        };
        Self {
            zero_time: TimeMs::new(zero_time),
            zero_slot,
            slot_length_ms: 1_000,
        }
    }

    /// Slot containing `time`. Times before the anchor map to the anchor slot.
    pub fn time_to_slot(&self, time: TimeMs) -> Slot {
        let elapsed = time.as_ms().saturating_sub(self.zero_time.as_ms()).max(0) as u64;
        self.zero_slot + elapsed / self.slot_length_ms.max(1)
    }

    /// Start time of `slot`.
    pub fn slot_to_time(&self, slot: Slot) -> TimeMs {
        let elapsed = slot.saturating_sub(self.zero_slot) * self.slot_length_ms;
        self.zero_time.plus_ms(elapsed as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    pub coins_per_utxo_byte: u64,
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    /// Flat execution budget charged per spent script input.
    pub script_input_fee: u64,
    pub collateral_percent: u64,
    pub max_tx_size: usize,
    pub slots: SlotConfig,
}

impl ProtocolParams {
    pub fn for_network(network: Network) -> Self {
        Self {
            coins_per_utxo_byte: 4_310,
            min_fee_a: 44,
            min_fee_b: 155_381,
            script_input_fee: 400_000,
            collateral_percent: 150,
            max_tx_size: 16_384,
            slots: SlotConfig::for_network(network),
        }
    }

    /// Smallest lovelace amount `output` may carry, given its serialized size.
    pub fn min_lovelace(&self, output: &TxOutput) -> u64 {
        let size = output.to_cbor().len() as u64;
        (OUTPUT_OVERHEAD_BYTES + size) * self.coins_per_utxo_byte
    }

    pub fn min_fee(&self, tx_size: usize, script_inputs: usize) -> u64 {
        self.min_fee_a * tx_size as u64
            + self.min_fee_b
            + self.script_input_fee * script_inputs as u64
    }

    /// Collateral the ledger demands for a transaction paying `fee`.
    pub fn min_collateral(&self, fee: u64) -> u64 {
        (fee * self.collateral_percent).div_ceil(100)
    }

    pub fn time_to_slot(&self, time: TimeMs) -> Slot {
        self.slots.time_to_slot(time)
    }

    pub fn slot_to_time(&self, slot: Slot) -> TimeMs {
        self.slots.slot_to_time(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SubscriptionDatum;
    use crate::domain::{Address, NetworkId, PubKeyHash, ValidatorHash, Value};

    #[test]
    fn test_slot_conversion_is_floor() {
        let slots = SlotConfig::for_network(Network::Preview);
        let t = TimeMs::new(1_666_656_000_000 + 12_345);
        assert_eq!(slots.time_to_slot(t), 12);
        assert_eq!(slots.slot_to_time(12).as_ms(), 1_666_656_012_000);
        assert!(slots.slot_to_time(slots.time_to_slot(t)) <= t);
    }

    #[test]
    fn test_time_before_anchor_clamps() {
        let slots = SlotConfig::for_network(Network::Preprod);
        assert_eq!(slots.time_to_slot(TimeMs::new(0)), 86_400);
    }

    #[test]
    fn test_min_lovelace_grows_with_datum() {
        let params = ProtocolParams::for_network(Network::Preview);
        let plain = TxOutput::new(
            Address::from_pub_key_hash(NetworkId::Testnet, PubKeyHash::new([1; 28])),
            Value::ada(2),
        );
        let datum = SubscriptionDatum::new(
            PubKeyHash::new([1; 28]),
            PubKeyHash::new([2; 28]),
            Value::ada(2),
            Value::ada(1),
            1_000,
            TimeMs::new(0),
        )
        .unwrap();
        let locked = TxOutput::with_inline_datum(
            Address::from_validator_hash(NetworkId::Testnet, ValidatorHash::new([3; 28])),
            Value::ada(2),
            datum.to_data(),
        );
        assert!(params.min_lovelace(&plain) < params.min_lovelace(&locked));
        assert_eq!(
            params.min_lovelace(&plain),
            (160 + plain.to_cbor().len() as u64) * 4_310
        );
    }

    #[test]
    fn test_min_collateral_rounds_up() {
        let params = ProtocolParams::for_network(Network::Preview);
        assert_eq!(params.min_collateral(101), 152);
    }
}

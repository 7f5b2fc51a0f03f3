//! Fee computation and change assignment.

use super::Tx;
use crate::domain::{Address, TxOutput, Utxo, Value, ValueError};
use crate::ledger::ProtocolParams;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::debug;

const MAX_BALANCE_ROUNDS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    #[error("insufficient funds: {0}")]
    Insufficient(#[from] ValueError),
    #[error("transaction too large ({size} > {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("fee did not converge")]
    Diverged,
}

/// Turns a draft into a balanced transaction ready for signing.
pub trait TxFinalizer: Send + Sync + fmt::Debug {
    /// `spare` outputs may be added as inputs to pay fees; leftover value goes to
    /// `change_address`.
    fn finalize(
        &self,
        tx: Tx,
        params: &ProtocolParams,
        change_address: &Address,
        spare: &[Utxo],
    ) -> Result<Tx, FinalizeError>;
}

/// Linear-fee balancer.
///
/// Raises every output to its minimum deposit, then iterates fee and change until
/// the fee covers the size of the signed transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancingFinalizer;

impl TxFinalizer for BalancingFinalizer {
    fn finalize(
        &self,
        mut tx: Tx,
        params: &ProtocolParams,
        change_address: &Address,
        spare: &[Utxo],
    ) -> Result<Tx, FinalizeError> {
        for output in tx.outputs.iter_mut() {
            // a wider amount can raise the floor again
            loop {
                let floor = params.min_lovelace(output);
                if output.value.lovelace >= floor {
                    break;
                }
                debug!("Raising output to minimum deposit {}", floor);
                output.value.lovelace = floor;
            }
        }

        let base_outputs = tx.outputs.clone();
        let mut spare: VecDeque<Utxo> = spare
            .iter()
            .filter(|u| !tx.inputs.iter().any(|i| i.utxo.out_ref == u.out_ref))
            .cloned()
            .collect();
        let mut fee = 0u64;

        for _ in 0..MAX_BALANCE_ROUNDS {
            let owed = Value::sum(base_outputs.iter().map(|o| &o.value))
                .try_add(&Value::lovelace(fee))?;
            let change = match tx.input_value().try_sub(&owed) {
                Ok(change) => change,
                Err(shortfall) => {
                    add_spare(&mut tx, &mut spare).ok_or(shortfall)?;
                    continue;
                }
            };

            tx.outputs = base_outputs.clone();
            if !change.is_zero() {
                let change_output = TxOutput::new(change_address.clone(), change);
                let floor = params.min_lovelace(&change_output);
                if change_output.value.lovelace < floor {
                    let need = owed.try_add(&Value::lovelace(floor))?;
                    add_spare(&mut tx, &mut spare).ok_or_else(|| ValueError::Underflow {
                        have: tx.input_value(),
                        need,
                    })?;
                    continue;
                }
                tx.outputs.push(change_output);
            }

            tx.fee = fee;
            let signers = tx.expected_signers().len();
            let size = tx.estimated_size(signers);
            let needed = params.min_fee(size, tx.script_inputs().count());
            if needed <= fee {
                if size > params.max_tx_size {
                    return Err(FinalizeError::TooLarge {
                        size,
                        max: params.max_tx_size,
                    });
                }
                debug!("Finalized tx: {} bytes, fee {}", size, fee);
                return Ok(tx);
            }
            fee = needed;
        }

        Err(FinalizeError::Diverged)
    }
}

fn add_spare(tx: &mut Tx, spare: &mut VecDeque<Utxo>) -> Option<()> {
    let utxo = spare.pop_front()?;
    debug!("Adding spare input {}", utxo.out_ref);
    tx.add_input(utxo);
    Some(())
}

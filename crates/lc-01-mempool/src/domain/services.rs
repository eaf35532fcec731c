//! Domain services for the Mempool subsystem.
//!
//! Stateless transaction checks. Context-free shape checks fail with a
//! consensus score; checks against local limits fail with score zero.

use super::entities::{Coin, CoinView, MempoolConfig, Transaction};
use shared_types::VerificationError;
use std::collections::HashSet;

/// Largest amount any output (or sum of outputs) may carry.
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Context-free structural checks.
pub fn check_sanity(tx: &Transaction) -> Result<(), VerificationError> {
    if tx.inputs.is_empty() {
        return Err(VerificationError::consensus("bad-txns-vin-empty", "no inputs"));
    }
    if tx.outputs.is_empty() {
        return Err(VerificationError::consensus("bad-txns-vout-empty", "no outputs"));
    }

    let mut total = 0u64;
    for output in &tx.outputs {
        if output.value > MAX_MONEY {
            return Err(VerificationError::consensus(
                "bad-txns-vout-toolarge",
                "output value out of range",
            ));
        }
        total = match total.checked_add(output.value) {
            Some(t) if t <= MAX_MONEY => t,
            _ => {
                return Err(VerificationError::consensus(
                    "bad-txns-txouttotal-toolarge",
                    "total output value out of range",
                ))
            }
        };
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(VerificationError::consensus(
                "bad-txns-inputs-duplicate",
                "duplicate input",
            ));
        }
        if input.prevout.is_null() && !tx.is_coinbase() {
            return Err(VerificationError::consensus(
                "bad-txns-prevout-null",
                "null prevout in non-coinbase",
            ));
        }
    }
    Ok(())
}

/// Checks input values against outputs and returns the fee.
///
/// Every input must already be present in `view`.
pub fn check_inputs(tx: &Transaction, view: &CoinView) -> Result<u64, VerificationError> {
    let input_value = view.input_value(tx).ok_or_else(|| {
        VerificationError::consensus("bad-txns-inputvalues-outofrange", "input values out of range")
    })?;
    if input_value > MAX_MONEY {
        return Err(VerificationError::consensus(
            "bad-txns-inputvalues-outofrange",
            "input values out of range",
        ));
    }
    let output_value = tx.output_value().unwrap_or(u64::MAX);
    if input_value < output_value {
        return Err(VerificationError::consensus(
            "bad-txns-in-belowout",
            format!("inputs {input_value} below outputs {output_value}"),
        ));
    }
    Ok(input_value - output_value)
}

/// Coinbase outputs must mature before the pool accepts a spend of them.
pub fn check_maturity(
    view: &CoinView,
    tip_height: u32,
    maturity: u32,
) -> Result<(), VerificationError> {
    let spend_height = i64::from(tip_height) + 1;
    let immature = view
        .iter()
        .filter(|coin| coin.coinbase && coin.height >= 0)
        .any(|coin: &Coin| spend_height - coin.height < i64::from(maturity));
    if immature {
        return Err(VerificationError::policy(
            "bad-txns-premature-spend-of-coinbase",
            "coinbase output spent before maturity",
        ));
    }
    Ok(())
}

/// Local relay policy: dust outputs and the minimum fee rate.
pub fn check_policy(
    tx: &Transaction,
    fee: u64,
    size: usize,
    config: &MempoolConfig,
) -> Result<(), VerificationError> {
    if tx
        .outputs
        .iter()
        .any(|out| !out.is_null_data() && out.value < config.dust_threshold)
    {
        return Err(VerificationError::policy("dust", "output below dust threshold"));
    }

    let min_fee = min_fee_for_size(size, config.min_relay_fee);
    if fee < min_fee {
        return Err(VerificationError::policy(
            "insufficient fee",
            format!("fee {fee} below minimum {min_fee}"),
        ));
    }
    Ok(())
}

/// Minimum fee for a transaction of `size` bytes at `rate` per kilobyte.
pub fn min_fee_for_size(size: usize, rate: u64) -> u64 {
    let fee = rate.saturating_mul(size as u64) / 1000;
    if fee == 0 && rate > 0 {
        rate
    } else {
        fee
    }
}

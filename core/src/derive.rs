//! Deterministic contract addresses.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::address::Address;
use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::state::{encode_multisig_data, MultisigConfig};
use crate::Result;

/// Workchain multisig wallets are deployed to.
pub const BASECHAIN: i32 = 0;

/// Builds a `StateInit` with code and data and nothing else.
///
/// `split_depth` and `special` are absent, and the library dictionary is
/// empty, giving the bit string `00110` and two references.
pub fn state_init_cell(code: Cell, data: Cell) -> Result<Cell> {
    let mut b = CellBuilder::new();
    b.store_uint(0b00, 2)?
        .store_maybe_ref(Some(code))?
        .store_maybe_ref(Some(data))?
        .store_bit(false)?;
    b.build()
}

pub fn address_of(workchain: i32, state_init: &Cell) -> Address {
    Address::new(workchain, *state_init.hash())
}

/// Data cell the wallet is deployed with: seqno zero and `signers_num`
/// equal to the actual signer count.
pub fn initial_data_cell(config: &MultisigConfig) -> Result<Cell> {
    let initial = MultisigConfig {
        next_order_seqno: BigUint::zero(),
        signers_num: config.signers.len().min(u8::MAX as usize) as u8,
        ..config.clone()
    };
    encode_multisig_data(&initial)
}

/// Recomputes the basechain address a wallet with `config` and `code`
/// was deployed at.
pub fn derive_address(config: &MultisigConfig, code: &Cell) -> Result<Address> {
    let data = initial_data_cell(config)?;
    let state_init = state_init_cell(code.clone(), data)?;
    Ok(address_of(BASECHAIN, &state_init))
}

//! Persistent data of the multisig v2 wallet.

use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::dict::{build_dict, load_dict, parse_dict, store_dict, Dict};
use crate::slice::Slice;
use crate::{DecodeError, Result};

/// Width of the stored `next_order_seqno`.
pub const ORDER_SEQNO_BITS: usize = 256;

/// Key width of the signer and proposer dictionaries.
pub const SIGNER_INDEX_BITS: usize = 8;

/// Decoded multisig data cell.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigConfig {
    #[cfg_attr(feature = "json", serde(with = "crate::serde::biguint_serde"))]
    pub next_order_seqno: BigUint,
    pub threshold: u8,
    /// Declared signer count, stored separately from the dictionary.
    pub signers_num: u8,
    pub signers: Dict<Address>,
    pub proposers: Dict<Address>,
    pub allow_arbitrary_seqno: bool,
}

/// Business rule broken by an otherwise well-formed [`MultisigConfig`].
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateInvariant {
    NoSigners,
    SignerCountMismatch { declared: u8, actual: usize },
    SignerIndicesNotSequential,
    ProposerIndicesNotSequential,
    ZeroThreshold,
    ThresholdExceedsSigners { threshold: u8, signers: u8 },
    ArbitrarySeqnoNotZero,
}

impl fmt::Display for StateInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSigners => write!(f, "signer set is empty"),
            Self::SignerCountMismatch { declared, actual } => write!(
                f,
                "signers_num is {declared} but the dictionary holds {actual} signers"
            ),
            Self::SignerIndicesNotSequential => write!(f, "signer indices are not 0..n"),
            Self::ProposerIndicesNotSequential => write!(f, "proposer indices are not 0..n"),
            Self::ZeroThreshold => write!(f, "threshold is zero"),
            Self::ThresholdExceedsSigners { threshold, signers } => {
                write!(f, "threshold {threshold} exceeds {signers} signers")
            }
            Self::ArbitrarySeqnoNotZero => write!(
                f,
                "arbitrary order seqno is enabled but next_order_seqno is not zero"
            ),
        }
    }
}

fn indexed(addresses: Vec<Address>) -> Dict<Address> {
    addresses
        .into_iter()
        .enumerate()
        .map(|(i, a)| (i as u64, a))
        .collect()
}

fn is_sequential<V>(dict: &Dict<V>) -> bool {
    dict.keys().enumerate().all(|(i, k)| *k == i as u64)
}

impl MultisigConfig {
    /// Fresh configuration as deployed: seqno zero, `signers_num` taken
    /// from the signer list.
    pub fn new(
        threshold: u8,
        signers: Vec<Address>,
        proposers: Vec<Address>,
        allow_arbitrary_seqno: bool,
    ) -> Self {
        Self {
            next_order_seqno: BigUint::zero(),
            threshold,
            signers_num: signers.len().min(u8::MAX as usize) as u8,
            signers: indexed(signers),
            proposers: indexed(proposers),
            allow_arbitrary_seqno,
        }
    }

    pub fn signer_list(&self) -> Vec<Address> {
        self.signers.values().copied().collect()
    }

    pub fn proposer_list(&self) -> Vec<Address> {
        self.proposers.values().copied().collect()
    }

    /// Every business rule this config breaks, in evaluation order.
    pub fn violations(&self) -> Vec<StateInvariant> {
        let mut out = Vec::new();
        if self.signers.is_empty() {
            out.push(StateInvariant::NoSigners);
        }
        if self.signers.len() != self.signers_num as usize {
            out.push(StateInvariant::SignerCountMismatch {
                declared: self.signers_num,
                actual: self.signers.len(),
            });
        }
        if !is_sequential(&self.signers) {
            out.push(StateInvariant::SignerIndicesNotSequential);
        }
        if !is_sequential(&self.proposers) {
            out.push(StateInvariant::ProposerIndicesNotSequential);
        }
        if self.threshold == 0 {
            out.push(StateInvariant::ZeroThreshold);
        } else if self.threshold > self.signers_num {
            out.push(StateInvariant::ThresholdExceedsSigners {
                threshold: self.threshold,
                signers: self.signers_num,
            });
        }
        if self.allow_arbitrary_seqno && !self.next_order_seqno.is_zero() {
            out.push(StateInvariant::ArbitrarySeqnoNotZero);
        }
        out
    }

    /// Fails with the first violated invariant.
    pub fn validate(&self) -> std::result::Result<(), StateInvariant> {
        match self.violations().into_iter().next() {
            Some(invariant) => Err(invariant),
            None => Ok(()),
        }
    }
}

fn load_addr_value(slice: &mut Slice<'_>) -> Result<Address> {
    slice.load_address()
}

fn store_addr_value(builder: &mut CellBuilder, address: &Address) -> Result<()> {
    builder.store_address(address).map(|_| ())
}

/// Reads `^Hashmap 8 MsgAddressInt`.
pub(crate) fn load_address_map(slice: &mut Slice<'_>) -> Result<Dict<Address>> {
    let root = slice.load_ref()?;
    parse_dict(root, SIGNER_INDEX_BITS, load_addr_value)
}

/// Reads `HashmapE 8 MsgAddressInt`.
pub(crate) fn load_address_map_e(slice: &mut Slice<'_>) -> Result<Dict<Address>> {
    load_dict(slice, SIGNER_INDEX_BITS, load_addr_value)
}

/// Writes a non-empty address dictionary as `^Hashmap`.
pub(crate) fn store_address_map(builder: &mut CellBuilder, map: &Dict<Address>) -> Result<()> {
    let root = build_dict(map, SIGNER_INDEX_BITS, store_addr_value)?.ok_or_else(|| {
        DecodeError::MalformedDictionary("signer dictionary must not be empty".into())
    })?;
    builder.store_ref(root)?;
    Ok(())
}

pub(crate) fn store_address_map_e(builder: &mut CellBuilder, map: &Dict<Address>) -> Result<()> {
    store_dict(builder, map, SIGNER_INDEX_BITS, store_addr_value)
}

/// Decodes the multisig data cell, requiring every bit and reference to
/// be consumed.
///
/// Only structural problems are errors here; business rules are left to
/// [`MultisigConfig::violations`].
pub fn decode_multisig_data(cell: &Cell) -> Result<MultisigConfig> {
    let mut slice = cell.parse();
    let next_order_seqno = slice.load_big_uint(ORDER_SEQNO_BITS)?;
    let threshold = slice.load_u8()?;
    let signers = load_address_map(&mut slice)?;
    let signers_num = slice.load_u8()?;
    let proposers = load_address_map_e(&mut slice)?;
    let allow_arbitrary_seqno = slice.load_bit()?;
    slice.end_parse()?;

    Ok(MultisigConfig {
        next_order_seqno,
        threshold,
        signers_num,
        signers,
        proposers,
        allow_arbitrary_seqno,
    })
}

/// Inverse of [`decode_multisig_data`].
pub fn encode_multisig_data(config: &MultisigConfig) -> Result<Cell> {
    let mut b = CellBuilder::new();
    b.store_big_uint(&config.next_order_seqno, ORDER_SEQNO_BITS)?
        .store_uint(config.threshold as u64, 8)?;
    store_address_map(&mut b, &config.signers)?;
    b.store_uint(config.signers_num as u64, 8)?;
    store_address_map_e(&mut b, &config.proposers)?;
    b.store_bit(config.allow_arbitrary_seqno)?;
    b.build()
}

/// Result of the `get_multisig_data` getter.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigGetterData {
    /// `-1` when arbitrary order seqnos are allowed.
    #[cfg_attr(feature = "json", serde(with = "crate::serde::bigint_serde"))]
    pub next_order_seqno: BigInt,
    pub threshold: u8,
    pub signers: Vec<Address>,
    pub proposers: Vec<Address>,
}

impl MultisigGetterData {
    /// What the getter must return for a contract holding `config`.
    pub fn expected_from(config: &MultisigConfig) -> Self {
        let next_order_seqno = if config.allow_arbitrary_seqno {
            BigInt::from(-1)
        } else {
            BigInt::from(config.next_order_seqno.clone())
        };
        Self {
            next_order_seqno,
            threshold: config.threshold,
            signers: config.signer_list(),
            proposers: config.proposer_list(),
        }
    }
}

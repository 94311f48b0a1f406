//! Order messages exchanged between a multisig wallet and its order
//! contracts.

use num_bigint::BigUint;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::cell::Cell;
use crate::dict::{parse_dict, Dict};
use crate::interface::MessageRecord;
use crate::slice::Slice;
use crate::state::{load_address_map, load_address_map_e, SIGNER_INDEX_BITS};
use crate::{DecodeError, Result};

/// Message and action operation codes.
pub mod op {
    /// Proposer or signer asks the wallet to deploy a new order.
    pub const NEW_ORDER: u32 = 0xf718510f;
    /// Order contract tells the wallet to execute its actions.
    pub const EXECUTE: u32 = 0x75097f5d;
    /// Wallet initialises a freshly deployed order.
    pub const INIT: u32 = 0x9c73fba2;

    /// Order action: send an arbitrary internal message.
    pub const SEND_MESSAGE: u32 = 0xf1381e5b;
    /// Order action: replace threshold, signers and proposers.
    pub const UPDATE_MULTISIG_PARAMS: u32 = 0x1d0cfbd3;
}

/// Width of an order id.
pub const ORDER_ID_BITS: usize = 256;

/// Width of the order expiry timestamp.
pub const EXPIRY_BITS: usize = 48;

/// `StateInit` of an order contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStateInit {
    pub code: Cell,
    pub multisig_address: Address,
    pub order_id: BigUint,
}

/// Decodes the `StateInit` the wallet attaches to a new order.
///
/// # Errors
///
/// - [`DecodeError::InvalidInitStatePrefix`] when `split_depth` or
///   `special` is present.
/// - [`DecodeError::MissingReference`] when code or data is absent.
/// - [`DecodeError::InvalidInitStateLibraries`] when libraries are attached.
/// - [`DecodeError::TrailingData`] when either cell has unread content.
pub fn decode_new_order_init_state(cell: &Cell) -> Result<OrderStateInit> {
    let mut slice = cell.parse();
    let prefix = slice.load_uint(2)?;
    if prefix != 0 {
        return Err(DecodeError::InvalidInitStatePrefix(prefix));
    }
    let code = slice.load_maybe_ref()?.ok_or(DecodeError::MissingReference)?;
    let data = slice.load_maybe_ref()?.ok_or(DecodeError::MissingReference)?;
    if slice.load_bit()? {
        return Err(DecodeError::InvalidInitStateLibraries);
    }
    slice.end_parse()?;

    let mut data = data.parse();
    let multisig_address = data.load_address()?;
    let order_id = data.load_big_uint(ORDER_ID_BITS)?;
    data.end_parse()?;

    Ok(OrderStateInit {
        code: code.clone(),
        multisig_address,
        order_id,
    })
}

/// Body of `op::INIT`, sent by the wallet to a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInit {
    pub query_id: u64,
    pub threshold: u8,
    pub signers: Dict<Address>,
    pub expires_at: u64,
    /// Raw action cells, keyed by action index.
    pub actions: Dict<Cell>,
    /// Index of the signer who approved on creation, if any.
    pub approved_by: Option<u8>,
}

impl OrderInit {
    /// Decodes every action; the first malformed one fails the call.
    pub fn decoded_actions(&self) -> Result<Dict<OrderAction>> {
        self.actions
            .iter()
            .map(|(k, cell)| OrderAction::decode(cell).map(|a| (*k, a)))
            .collect()
    }
}

/// Body of `op::EXECUTE`, sent by an order back to the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOrder {
    pub query_id: u64,
    pub order_id: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEnvelope {
    NewOrder(OrderInit),
    ExecuteOrder(ExecuteOrder),
}

fn load_action_cell(slice: &mut Slice<'_>) -> Result<Cell> {
    slice.load_ref().cloned()
}

fn load_order_init(slice: &mut Slice<'_>) -> Result<OrderInit> {
    let query_id = slice.load_u64()?;
    let threshold = slice.load_u8()?;
    let signers = load_address_map(slice)?;
    let expires_at = slice.load_uint(EXPIRY_BITS)?;
    let actions = parse_dict(slice.load_ref()?, SIGNER_INDEX_BITS, load_action_cell)?;
    let approved_by = if slice.load_bit()? {
        Some(slice.load_u8()?)
    } else {
        None
    };
    slice.end_parse()?;

    Ok(OrderInit {
        query_id,
        threshold,
        signers,
        expires_at,
        actions,
        approved_by,
    })
}

fn load_execute(slice: &mut Slice<'_>) -> Result<ExecuteOrder> {
    Ok(ExecuteOrder {
        query_id: slice.load_u64()?,
        order_id: slice.load_big_uint(ORDER_ID_BITS)?,
    })
}

/// Decodes an order-related body by its 32-bit op.
pub fn decode_order_envelope(body: &Cell) -> Result<OrderEnvelope> {
    let mut slice = body.parse();
    match slice.load_u32()? {
        op::INIT => load_order_init(&mut slice).map(OrderEnvelope::NewOrder),
        op::EXECUTE => load_execute(&mut slice).map(OrderEnvelope::ExecuteOrder),
        found => Err(DecodeError::InvalidOperation { found }),
    }
}

/// Decodes an `op::EXECUTE` body. Anything after the order id is ignored.
pub fn decode_execute_order(body: &Cell) -> Result<ExecuteOrder> {
    let mut slice = body.parse();
    match slice.load_u32()? {
        op::EXECUTE => load_execute(&mut slice),
        found => Err(DecodeError::InvalidOperation { found }),
    }
}

/// Outbound message that deploys and initialises an order contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderMessage {
    pub order_address: Address,
    pub order_id: BigUint,
    pub state_init: OrderStateInit,
    pub init: OrderInit,
}

pub fn decode_new_order_message(msg: &MessageRecord) -> Result<NewOrderMessage> {
    let order_address = msg
        .destination_address()?
        .ok_or(DecodeError::MissingMessageField("destination"))?;
    let init_state = msg
        .init_state_cell()?
        .ok_or(DecodeError::MissingMessageField("init state"))?;
    let body = msg
        .body_cell()?
        .ok_or(DecodeError::MissingMessageField("body"))?;

    let state_init = decode_new_order_init_state(&init_state)?;
    let mut slice = body.parse();
    let init = match slice.load_u32()? {
        op::INIT => load_order_init(&mut slice)?,
        found => return Err(DecodeError::InvalidOperation { found }),
    };

    Ok(NewOrderMessage {
        order_address,
        order_id: state_init.order_id.clone(),
        state_init,
        init,
    })
}

/// One entry of an order's action dictionary.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    SendMessage {
        mode: u8,
        /// Raw `MessageRelaxed` cell, base64 BoC when serialised.
        #[cfg_attr(feature = "json", serde(with = "crate::serde::cell_serde"))]
        message: Cell,
    },
    UpdateMultisigParams {
        threshold: u8,
        signers: Dict<Address>,
        proposers: Dict<Address>,
    },
    Unknown(#[cfg_attr(feature = "json", serde(with = "crate::serde::cell_serde"))] Cell),
}

impl OrderAction {
    pub fn decode(cell: &Cell) -> Result<Self> {
        let mut slice = cell.parse();
        let action = match slice.preload_uint(32).ok().map(|v| v as u32) {
            Some(op::SEND_MESSAGE) => {
                slice.skip_bits(32)?;
                Self::SendMessage {
                    mode: slice.load_u8()?,
                    message: slice.load_ref()?.clone(),
                }
            }
            Some(op::UPDATE_MULTISIG_PARAMS) => {
                slice.skip_bits(32)?;
                Self::UpdateMultisigParams {
                    threshold: slice.load_u8()?,
                    signers: load_address_map(&mut slice)?,
                    proposers: load_address_map_e(&mut slice)?,
                }
            }
            _ => return Ok(Self::Unknown(cell.clone())),
        };
        slice.end_parse()?;
        Ok(action)
    }
}

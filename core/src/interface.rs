//! Records exchanged with a [`ChainReader`](crate::check::ChainReader):
//! account snapshots and transactions, with cell payloads still in their
//! base64 BoC form.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::cell::Cell;
use crate::Result;

/// Default path to the verifier configuration template.
pub const VERIFIER_CONFIG_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../templates/verifier_config.json"
);

/// Lifecycle status of an account as reported by the indexer.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "json", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Uninit,
    Frozen,
    Nonexist,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Uninit => "uninit",
            Self::Frozen => "frozen",
            Self::Nonexist => "nonexist",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "uninit" | "uninitialized" => Ok(Self::Uninit),
            "frozen" => Ok(Self::Frozen),
            "nonexist" | "nonexistent" => Ok(Self::Nonexist),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

fn parse_cell(boc: Option<&str>) -> Result<Option<Cell>> {
    boc.map(Cell::from_base64).transpose()
}

fn parse_address(s: Option<&str>) -> Result<Option<Address>> {
    s.map(str::parse).transpose()
}

/// Snapshot of one account.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub status: AccountStatus,
    /// Base64 BoC of the code cell.
    pub code: Option<String>,
    /// Base64 BoC of the data cell.
    pub data: Option<String>,
    /// Balance in nanotons.
    #[cfg_attr(feature = "json", serde(with = "crate::serde::biguint_serde"))]
    pub balance: BigUint,
}

impl AccountState {
    pub fn code_cell(&self) -> Result<Option<Cell>> {
        parse_cell(self.code.as_deref())
    }

    pub fn data_cell(&self) -> Result<Option<Cell>> {
        parse_cell(self.data.as_deref())
    }
}

/// One internal message attached to a transaction.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Base64 BoC of the message body.
    pub body: Option<String>,
    /// Base64 BoC of the attached `StateInit`.
    pub init_state: Option<String>,
}

impl MessageRecord {
    pub fn body_cell(&self) -> Result<Option<Cell>> {
        parse_cell(self.body.as_deref())
    }

    pub fn init_state_cell(&self) -> Result<Option<Cell>> {
        parse_cell(self.init_state.as_deref())
    }

    pub fn source_address(&self) -> Result<Option<Address>> {
        parse_address(self.source.as_deref())
    }

    pub fn destination_address(&self) -> Result<Option<Address>> {
        parse_address(self.destination.as_deref())
    }
}

/// A transaction on the inspected account.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: String,
    pub lt: u64,
    pub in_msg: Option<MessageRecord>,
    pub out_msgs: Vec<MessageRecord>,
}

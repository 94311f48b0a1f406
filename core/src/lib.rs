/// Address type and its string forms
pub mod address;
/// Bag-of-cells (de)serialisation
pub mod boc;
/// Inverse construction of cells
pub mod builder;
/// Immutable cell DAG with representation hashes
pub mod cell;
/// Consistency protocol for deployed multisig wallets
pub mod check;
/// Deterministic contract address derivation
pub mod derive;
/// Fixed-key-width trie dictionaries
pub mod dict;
pub mod error;
/// Records supplied by a chain reader
pub mod interface;
/// Order messages and actions
pub mod order;
#[cfg(feature = "json")]
pub mod serde;
/// Read cursor over one cell
pub mod slice;
/// Multisig persistent data
pub mod state;

pub use address::Address;
pub use builder::CellBuilder;
pub use cell::Cell;
pub use check::{
    ChainReader, CheckOptions, CheckStep, ConsistencyChecker, EventOutcome, LastOrderEvent,
    OrderEventKind, VerificationReport,
};
pub use dict::Dict;
pub use error::{CheckError, DecodeError, EventError};
pub use interface::{AccountState, AccountStatus, MessageRecord, TransactionRecord};
pub use slice::Slice;
pub use state::{MultisigConfig, MultisigGetterData, StateInvariant};

pub type Result<T> = std::result::Result<T, DecodeError>;

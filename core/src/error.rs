use thiserror::Error;

use crate::check::CheckStep;
use crate::state::StateInvariant;

/// Structural errors raised while decoding cells, bags of cells and
/// the payloads built on top of them.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// A read asked for more bits than the cursor holds.
    #[error("out of bits: requested {requested}, remaining {remaining}")]
    OutOfBits { requested: usize, remaining: usize },

    /// A boundary declared authoritative still had unread content.
    #[error("trailing data: {bits} bits and {refs} refs left unread")]
    TrailingData { bits: usize, refs: usize },

    #[error("malformed dictionary: {0}")]
    MalformedDictionary(String),

    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// A reference was required (or flagged present) but none remained.
    #[error("missing cell reference")]
    MissingReference,

    #[error("invalid state init prefix: expected 0, got {0}")]
    InvalidInitStatePrefix(u64),

    #[error("state init must not carry libraries")]
    InvalidInitStateLibraries,

    #[error("invalid operation code 0x{found:08x}")]
    InvalidOperation { found: u32 },

    #[error("message is missing its {0}")]
    MissingMessageField(&'static str),

    #[error("invalid bag of cells: {0}")]
    InvalidBoc(String),

    /// Pruned branches, library cells and proofs are not handled.
    #[error("exotic cells are not supported")]
    UnsupportedExoticCell,

    #[error("cell overflow: {bits} bits, {refs} refs")]
    CellOverflow { bits: usize, refs: usize },

    #[error("value does not fit in {bits} bits")]
    IntegerOverflow { bits: usize },

    #[error("cell tree exceeds maximum depth")]
    CellTooDeep,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Failures that abort a whole consistency check.
#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("contract is not active (status: {status})")]
    ContractNotActive { status: String },

    #[error("code mismatch: expected {expected}, found {}", found.as_deref().unwrap_or("no code"))]
    CodeMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("invalid multisig state: {0}")]
    InvalidState(StateInvariant),

    #[error("getter mismatch on `{field}`: expected {expected}, got {actual}")]
    GetterMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{step}: {source}")]
    Decode {
        step: CheckStep,
        #[source]
        source: DecodeError,
    },

    #[error("{step}: reader failed: {message}")]
    Reader { step: CheckStep, message: String },

    /// The reader call for `step` did not finish in time.
    #[error("{step}: cancelled")]
    Cancelled { step: CheckStep },
}

/// Failure scoped to a single history entry. Never propagated; the
/// checker turns it into an error outcome on that entry.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The message did not come from (or go to) the address the
    /// multisig itself reports for that order id.
    #[error("fake order")]
    FakeOrder,

    #[error("expected exactly one outbound message, found {0}")]
    UnexpectedOutMessages(usize),

    #[error("inbound message has no source")]
    MissingSource,

    #[error("reader failed: {0}")]
    Reader(String),

    /// A reader call for this entry timed out. Aborts the whole scan.
    #[error("cancelled")]
    Cancelled,
}

//! Immutable cells: up to 1023 data bits and up to four references to
//! other cells, forming a DAG identified by representation hashes.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::slice::Slice;
use crate::{DecodeError, Result};

/// Maximum number of data bits a cell can hold.
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can hold.
pub const MAX_CELL_REFS: usize = 4;

/// Maximum depth accepted for a cell tree.
pub const MAX_CELL_DEPTH: u16 = 1024;

/// Shared, read-only handle to a cell.
///
/// Cloning is cheap. Two cells compare equal iff their representation
/// hashes are equal.
#[derive(Clone)]
pub struct Cell(Arc<CellInner>);

struct CellInner {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Cell>,
    hash: [u8; 32],
    depth: u16,
}

impl Cell {
    /// Creates an ordinary cell from left-aligned `data` holding `bit_len` bits.
    ///
    /// Bits past `bit_len` are ignored.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::CellOverflow`] if the bit or reference limits are exceeded,
    ///   or `data` is too short for `bit_len`.
    /// - [`DecodeError::CellTooDeep`] if the resulting tree exceeds [`MAX_CELL_DEPTH`].
    pub fn new(data: Vec<u8>, bit_len: usize, refs: Vec<Cell>) -> Result<Self> {
        let byte_len = bit_len.div_ceil(8);
        if bit_len > MAX_CELL_BITS || refs.len() > MAX_CELL_REFS || data.len() < byte_len {
            return Err(DecodeError::CellOverflow {
                bits: bit_len,
                refs: refs.len(),
            });
        }

        let mut data = data;
        data.truncate(byte_len);
        if bit_len % 8 != 0 {
            if let Some(last) = data.last_mut() {
                *last &= 0xffu8 << (8 - bit_len % 8);
            }
        }

        let depth = match refs.iter().map(Cell::depth).max() {
            Some(max) if max >= MAX_CELL_DEPTH => return Err(DecodeError::CellTooDeep),
            Some(max) => max + 1,
            None => 0,
        };

        let hash = representation_hash(&data, bit_len, &refs);
        Ok(Self(Arc::new(CellInner {
            data,
            bit_len,
            refs,
            hash,
            depth,
        })))
    }

    /// A cell with no bits and no references.
    pub fn empty() -> Self {
        Self(Arc::new(CellInner {
            data: Vec::new(),
            bit_len: 0,
            refs: Vec::new(),
            hash: representation_hash(&[], 0, &[]),
            depth: 0,
        }))
    }

    /// Number of data bits.
    pub fn bit_len(&self) -> usize {
        self.0.bit_len
    }

    /// Left-aligned data bytes; unused low bits of the last byte are zero.
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    pub fn refs(&self) -> &[Cell] {
        &self.0.refs
    }

    /// Representation hash of this cell.
    pub fn hash(&self) -> &[u8; 32] {
        &self.0.hash
    }

    /// Longest path, in references, from this cell to a leaf.
    pub fn depth(&self) -> u16 {
        self.0.depth
    }

    /// Reads the bit at `index`; callers must stay below [`Cell::bit_len`].
    pub(crate) fn bit(&self, index: usize) -> bool {
        (self.0.data[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// Opens a cursor at the start of this cell.
    pub fn parse(&self) -> Slice<'_> {
        Slice::new(self)
    }

    /// Descriptor bytes `d1`, `d2` of an ordinary level-0 cell.
    pub(crate) fn descriptors(&self) -> [u8; 2] {
        descriptors(self.0.bit_len, self.0.refs.len())
    }

    /// Data bytes with the completion tag appended when the bit length
    /// is not a multiple of eight.
    pub(crate) fn padded_data(&self) -> Vec<u8> {
        padded(&self.0.data, self.0.bit_len)
    }
}

fn descriptors(bit_len: usize, refs: usize) -> [u8; 2] {
    let d1 = refs as u8;
    let d2 = (bit_len / 8 + bit_len.div_ceil(8)) as u8;
    [d1, d2]
}

fn padded(data: &[u8], bit_len: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    if bit_len % 8 != 0 {
        if let Some(last) = out.last_mut() {
            *last |= 1 << (7 - bit_len % 8);
        }
    }
    out
}

fn representation_hash(data: &[u8], bit_len: usize, refs: &[Cell]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(descriptors(bit_len, refs.len()));
    hasher.update(padded(data, bit_len));
    for child in refs {
        hasher.update(child.depth().to_be_bytes());
    }
    for child in refs {
        hasher.update(child.hash());
    }
    hasher.finalize().into()
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash.hash(state);
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("bits", &self.bit_len())
            .field("refs", &self.refs().len())
            .field("hash", &hex::encode(self.hash()))
            .finish()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

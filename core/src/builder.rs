//! Cell construction, the inverse of [`Slice`](crate::slice::Slice).

use num_bigint::BigUint;

use crate::address::Address;
use crate::cell::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
use crate::{DecodeError, Result};

/// Accumulates bits and references for a single cell.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Cell>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    fn reserve(&self, bits: usize, refs: usize) -> Result<()> {
        if self.bit_len + bits > MAX_CELL_BITS || self.refs.len() + refs > MAX_CELL_REFS {
            return Err(DecodeError::CellOverflow {
                bits: self.bit_len + bits,
                refs: self.refs.len() + refs,
            });
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.reserve(1, 0)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Stores the low `bits` bits of `value`, big-endian.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::IntegerOverflow`] if `value` does not fit in `bits`.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(DecodeError::IntegerOverflow { bits });
        }
        self.reserve(bits, 0)?;
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        if value.bits() > bits as u64 {
            return Err(DecodeError::IntegerOverflow { bits });
        }
        self.reserve(bits, 0)?;
        for i in (0..bits as u64).rev() {
            self.push_bit(value.bit(i));
        }
        Ok(self)
    }

    /// Stores the first `bit_len` bits of left-aligned `bytes`.
    pub fn store_bits(&mut self, bytes: &[u8], bit_len: usize) -> Result<&mut Self> {
        if bytes.len() * 8 < bit_len {
            return Err(DecodeError::CellOverflow {
                bits: bit_len,
                refs: 0,
            });
        }
        self.reserve(bit_len, 0)?;
        for i in 0..bit_len {
            self.push_bit((bytes[i / 8] >> (7 - i % 8)) & 1 == 1);
        }
        Ok(self)
    }

    /// Stores an `addr_std` without anycast.
    pub fn store_address(&mut self, address: &Address) -> Result<&mut Self> {
        let workchain = i8::try_from(address.workchain).map_err(|_| {
            DecodeError::MalformedAddress(format!(
                "workchain {} does not fit addr_std",
                address.workchain
            ))
        })?;
        self.reserve(2 + 1 + 8 + 256, 0)?;
        self.store_uint(0b10, 2)?
            .store_bit(false)?
            .store_uint(workchain as u8 as u64, 8)?
            .store_bits(&address.hash, 256)
    }

    pub fn store_ref(&mut self, cell: Cell) -> Result<&mut Self> {
        self.reserve(0, 1)?;
        self.refs.push(cell);
        Ok(self)
    }

    /// Stores `Maybe ^Cell`: a presence bit followed by the optional reference.
    pub fn store_maybe_ref(&mut self, cell: Option<Cell>) -> Result<&mut Self> {
        match cell {
            Some(cell) => {
                self.reserve(1, 1)?;
                self.store_bit(true)?.store_ref(cell)
            }
            None => self.store_bit(false),
        }
    }

    pub fn build(&self) -> Result<Cell> {
        Cell::new(self.data.clone(), self.bit_len, self.refs.clone())
    }
}

//! Sequential reader over the bits and references of one cell.

use num_bigint::BigUint;

use crate::address::Address;
use crate::cell::Cell;
use crate::{DecodeError, Result};

/// Read cursor over a single [`Cell`].
///
/// Every `load_*` call either consumes exactly what it reads or fails
/// without a partial result. Callers that claim to describe a cell
/// completely finish with [`Slice::end_parse`].
#[derive(Debug, Clone)]
pub struct Slice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> Slice<'a> {
    pub fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.refs().len() - self.ref_pos
    }

    pub fn is_drained(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    fn ensure_bits(&self, requested: usize) -> Result<()> {
        let remaining = self.remaining_bits();
        if requested > remaining {
            return Err(DecodeError::OutOfBits {
                requested,
                remaining,
            });
        }
        Ok(())
    }

    pub fn load_bit(&mut self) -> Result<bool> {
        self.ensure_bits(1)?;
        let bit = self.cell.bit(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Reads `bits` (at most 64) as a big-endian unsigned integer.
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Like [`Slice::load_uint`], without advancing.
    pub fn preload_uint(&self, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(DecodeError::IntegerOverflow { bits });
        }
        self.ensure_bits(bits)?;
        Ok((self.bit_pos..self.bit_pos + bits)
            .fold(0u64, |acc, i| (acc << 1) | self.cell.bit(i) as u64))
    }

    pub fn load_u8(&mut self) -> Result<u8> {
        self.load_uint(8).map(|v| v as u8)
    }

    pub fn load_u32(&mut self) -> Result<u32> {
        self.load_uint(32).map(|v| v as u32)
    }

    pub fn load_u64(&mut self) -> Result<u64> {
        self.load_uint(64)
    }

    /// Reads `bits` of any width as a big-endian unsigned integer.
    pub fn load_big_uint(&mut self, bits: usize) -> Result<BigUint> {
        let bytes = self.load_bits(bits)?;
        let padding = bytes.len() * 8 - bits;
        Ok(BigUint::from_bytes_be(&bytes) >> padding)
    }

    /// Reads `bits` into left-aligned bytes; unused low bits of the last
    /// byte are zero.
    pub fn load_bits(&mut self, bits: usize) -> Result<Vec<u8>> {
        self.ensure_bits(bits)?;
        let mut out = vec![0u8; bits.div_ceil(8)];
        for i in 0..bits {
            if self.cell.bit(self.bit_pos + i) {
                out[i / 8] |= 1 << (7 - i % 8);
            }
        }
        self.bit_pos += bits;
        Ok(out)
    }

    /// Reads a 256-bit hash.
    pub fn load_hash(&mut self) -> Result<[u8; 32]> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&self.load_bits(256)?);
        Ok(hash)
    }

    pub fn skip_bits(&mut self, bits: usize) -> Result<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Reads a `MsgAddressInt` that must be an `addr_std` without anycast.
    pub fn load_address(&mut self) -> Result<Address> {
        self.load_maybe_address()?.ok_or_else(|| {
            DecodeError::MalformedAddress("addr_none where an address is required".into())
        })
    }

    /// Reads `addr_none` as `None`, or an `addr_std` without anycast.
    pub fn load_maybe_address(&mut self) -> Result<Option<Address>> {
        match self.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    return Err(DecodeError::MalformedAddress(
                        "anycast is not supported".into(),
                    ));
                }
                let workchain = self.load_u8()? as i8;
                let hash = self.load_hash()?;
                Ok(Some(Address::new(workchain as i32, hash)))
            }
            0b01 => Err(DecodeError::MalformedAddress(
                "external address where an internal one is required".into(),
            )),
            _ => Err(DecodeError::MalformedAddress(
                "addr_var is not supported".into(),
            )),
        }
    }

    pub fn load_ref(&mut self) -> Result<&'a Cell> {
        let cell = self
            .cell
            .refs()
            .get(self.ref_pos)
            .ok_or(DecodeError::MissingReference)?;
        self.ref_pos += 1;
        Ok(cell)
    }

    /// Reads `Maybe ^Cell`.
    pub fn load_maybe_ref(&mut self) -> Result<Option<&'a Cell>> {
        if self.load_bit()? {
            self.load_ref().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Fails with [`DecodeError::TrailingData`] unless every bit and
    /// reference has been consumed.
    pub fn end_parse(&self) -> Result<()> {
        if self.is_drained() {
            Ok(())
        } else {
            Err(DecodeError::TrailingData {
                bits: self.remaining_bits(),
                refs: self.remaining_refs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CellBuilder;

    fn sample() -> Cell {
        let mut b = CellBuilder::new();
        b.store_uint(0xdead_beef, 32)
            .unwrap()
            .store_bit(true)
            .unwrap()
            .store_big_uint(&BigUint::from(0x1234_5678_9abc_u64), 257)
            .unwrap()
            .store_maybe_ref(Some(Cell::empty()))
            .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn reads_in_order() {
        let cell = sample();
        let mut s = cell.parse();
        assert_eq!(s.preload_uint(8).unwrap(), 0xde);
        assert_eq!(s.load_u32().unwrap(), 0xdead_beef);
        assert!(s.load_bit().unwrap());
        assert_eq!(
            s.load_big_uint(257).unwrap(),
            BigUint::from(0x1234_5678_9abc_u64)
        );
        assert_eq!(s.load_maybe_ref().unwrap(), Some(&Cell::empty()));
        s.end_parse().unwrap();
    }

    #[test]
    fn out_of_bits() {
        let cell = sample();
        let mut s = cell.parse();
        s.skip_bits(290).unwrap();
        assert_eq!(
            s.load_uint(8).unwrap_err(),
            DecodeError::OutOfBits {
                requested: 8,
                remaining: 1
            }
        );
        // a failed read consumes nothing
        assert_eq!(s.remaining_bits(), 1);
    }

    #[test]
    fn trailing_data() {
        let cell = sample();
        let mut s = cell.parse();
        s.skip_bits(33).unwrap();
        assert_eq!(
            s.end_parse().unwrap_err(),
            DecodeError::TrailingData {
                bits: 258,
                refs: 1
            }
        );
    }

    #[test]
    fn missing_reference() {
        let mut b = CellBuilder::new();
        b.store_bit(true).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(
            cell.parse().load_maybe_ref().unwrap_err(),
            DecodeError::MissingReference
        );
        assert_eq!(
            Cell::empty().parse().load_ref().unwrap_err(),
            DecodeError::MissingReference
        );
    }

    #[test]
    fn addresses() {
        let address = Address::new(-1, [0xab; 32]);
        let mut b = CellBuilder::new();
        b.store_address(&address)
            .unwrap()
            .store_uint(0, 2)
            .unwrap()
            .store_uint(0b01, 2)
            .unwrap();
        let cell = b.build().unwrap();
        let mut s = cell.parse();
        assert_eq!(s.load_address().unwrap(), address);
        assert_eq!(s.load_maybe_address().unwrap(), None);
        assert!(matches!(
            s.load_maybe_address(),
            Err(DecodeError::MalformedAddress(_))
        ));

        let mut b = CellBuilder::new();
        b.store_uint(0b10, 2).unwrap().store_bit(true).unwrap();
        let anycast = b.build().unwrap();
        assert!(matches!(
            anycast.parse().load_address(),
            Err(DecodeError::MalformedAddress(_))
        ));
    }
}

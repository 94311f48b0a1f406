//! Bag-of-cells (BoC) serialisation.
//!
//! Only the generic `b5ee9c72` layout is understood. Cells are stored
//! parent-first, so every reference must point to a later index; this is
//! what rules out cycles on load.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cell::{Cell, MAX_CELL_REFS};
use crate::{DecodeError, Result};

/// Leading four bytes of a generic bag of cells.
pub const BOC_MAGIC: u32 = 0xb5ee_9c72;

/// Upper bound on the number of cells accepted in one bag.
pub const MAX_BOC_CELLS: usize = 1 << 16;

const FLAG_HAS_INDEX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;

fn invalid(msg: impl Into<String>) -> DecodeError {
    DecodeError::InvalidBoc(msg.into())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| invalid("unexpected end of data"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_uint(&mut self, n: usize) -> Result<usize> {
        let value = self
            .take(n)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64);
        usize::try_from(value).map_err(|_| invalid("integer does not fit usize"))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

/// Deserialises every root of a bag of cells.
///
/// # Errors
///
/// - [`DecodeError::InvalidBoc`] on a malformed header, truncated data, a
///   CRC mismatch, trailing bytes, or a reference that does not point to a
///   later cell.
/// - [`DecodeError::UnsupportedExoticCell`] for pruned, library or proof cells.
pub fn deserialize_boc(bytes: &[u8]) -> Result<Vec<Cell>> {
    let mut reader = ByteReader::new(bytes);

    if reader.read_uint(4)? as u32 != BOC_MAGIC {
        return Err(invalid("unknown magic"));
    }

    let flags = reader.read_u8()?;
    let has_index = flags & FLAG_HAS_INDEX != 0;
    let has_crc = flags & FLAG_HAS_CRC32C != 0;
    let ref_size = (flags & 0x07) as usize;
    if ref_size == 0 || ref_size > 4 {
        return Err(invalid(format!("invalid reference size {ref_size}")));
    }
    let offset_size = reader.read_u8()? as usize;
    if offset_size == 0 || offset_size > 8 {
        return Err(invalid(format!("invalid offset size {offset_size}")));
    }

    let cell_count = reader.read_uint(ref_size)?;
    let root_count = reader.read_uint(ref_size)?;
    let absent_count = reader.read_uint(ref_size)?;
    let cells_size = reader.read_uint(offset_size)?;

    if cell_count == 0 || cell_count > MAX_BOC_CELLS {
        return Err(invalid(format!("unsupported cell count {cell_count}")));
    }
    if root_count == 0 || root_count > cell_count {
        return Err(invalid(format!("invalid root count {root_count}")));
    }
    if absent_count != 0 {
        return Err(invalid("absent cells are not supported"));
    }

    let roots = (0..root_count)
        .map(|_| reader.read_uint(ref_size))
        .collect::<Result<Vec<_>>>()?;
    if roots.iter().any(|r| *r >= cell_count) {
        return Err(invalid("root index out of range"));
    }
    if has_index {
        reader.take(cell_count * offset_size)?;
    }
    let cell_bytes = reader.take(cells_size)?;

    if has_crc {
        let payload_len = reader.pos;
        let stored = u32::from_le_bytes(
            reader
                .take(4)?
                .try_into()
                .map_err(|_| invalid("truncated crc"))?,
        );
        if crc32c(&bytes[..payload_len]) != stored {
            return Err(invalid("crc32c mismatch"));
        }
    }
    if !reader.is_empty() {
        return Err(invalid("trailing bytes after bag of cells"));
    }

    let mut cells_reader = ByteReader::new(cell_bytes);
    let raw = (0..cell_count)
        .map(|index| read_raw_cell(&mut cells_reader, index, cell_count, ref_size))
        .collect::<Result<Vec<_>>>()?;
    if !cells_reader.is_empty() {
        return Err(invalid("cell data size mismatch"));
    }

    // children always sit at higher indices, so build back to front
    let mut built: Vec<Option<Cell>> = vec![None; cell_count];
    for (index, raw) in raw.into_iter().enumerate().rev() {
        let refs = raw
            .refs
            .iter()
            .map(|r| built[*r].clone().ok_or_else(|| invalid("unresolved reference")))
            .collect::<Result<Vec<_>>>()?;
        built[index] = Some(Cell::new(raw.data, raw.bit_len, refs)?);
    }

    roots
        .into_iter()
        .map(|r| built[r].clone().ok_or_else(|| invalid("unresolved root")))
        .collect()
}

fn read_raw_cell(
    reader: &mut ByteReader<'_>,
    index: usize,
    cell_count: usize,
    ref_size: usize,
) -> Result<RawCell> {
    let d1 = reader.read_u8()?;
    let d2 = reader.read_u8()?;

    let ref_count = (d1 & 0x07) as usize;
    let exotic = d1 & 0x08 != 0;
    let with_hashes = d1 & 0x10 != 0;
    let level_mask = d1 >> 5;

    if ref_count > MAX_CELL_REFS {
        return Err(invalid(format!("cell {index} has {ref_count} references")));
    }
    if exotic {
        return Err(DecodeError::UnsupportedExoticCell);
    }
    if level_mask != 0 {
        return Err(invalid(format!("ordinary cell {index} has non-zero level")));
    }
    if with_hashes {
        // one hash and one depth for a level-0 cell
        reader.take(32 + 2)?;
    }

    let data_len = (d2 as usize).div_ceil(2);
    let data = reader.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data.last().copied().unwrap_or(0);
        if last == 0 {
            return Err(invalid(format!("cell {index} lacks a completion tag")));
        }
        let bit_len = data_len * 8 - last.trailing_zeros() as usize - 1;
        if bit_len % 8 == 0 {
            return Err(invalid(format!("cell {index} has a non-canonical length")));
        }
        bit_len
    };

    let refs = (0..ref_count)
        .map(|_| {
            let r = reader.read_uint(ref_size)?;
            if r <= index || r >= cell_count {
                return Err(invalid(format!(
                    "cell {index} references cell {r}, which is not later in the bag"
                )));
            }
            Ok(r)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RawCell {
        data,
        bit_len,
        refs,
    })
}

/// Serialises a single-root bag of cells with a CRC32C trailer and no index.
pub fn serialize_boc(root: &Cell) -> Vec<u8> {
    let order = topological_order(root);
    let index: HashMap<[u8; 32], usize> = order
        .iter()
        .enumerate()
        .map(|(i, cell)| (*cell.hash(), i))
        .collect();

    let ref_size = bytes_needed(order.len());
    let mut cells = Vec::new();
    for cell in &order {
        cells.extend_from_slice(&cell.descriptors());
        cells.extend_from_slice(&cell.padded_data());
        for child in cell.refs() {
            write_uint(&mut cells, index[child.hash()], ref_size);
        }
    }
    let offset_size = bytes_needed(cells.len());

    let mut out = Vec::with_capacity(cells.len() + 32);
    out.extend_from_slice(&BOC_MAGIC.to_be_bytes());
    out.push(FLAG_HAS_CRC32C | ref_size as u8);
    out.push(offset_size as u8);
    write_uint(&mut out, order.len(), ref_size);
    write_uint(&mut out, 1, ref_size);
    write_uint(&mut out, 0, ref_size);
    write_uint(&mut out, cells.len(), offset_size);
    write_uint(&mut out, 0, ref_size);
    out.extend_from_slice(&cells);
    let crc = crc32c(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Unique cells of the tree rooted at `root`, parents before children.
fn topological_order(root: &Cell) -> Vec<Cell> {
    fn visit(cell: &Cell, seen: &mut HashSet<[u8; 32]>, post: &mut Vec<Cell>) {
        if !seen.insert(*cell.hash()) {
            return;
        }
        for child in cell.refs() {
            visit(child, seen, post);
        }
        post.push(cell.clone());
    }

    let mut seen = HashSet::new();
    let mut post = Vec::new();
    visit(root, &mut seen, &mut post);
    post.reverse();
    post
}

fn bytes_needed(value: usize) -> usize {
    let bits = usize::BITS - value.leading_zeros();
    (bits as usize).div_ceil(8).max(1)
}

fn write_uint(out: &mut Vec<u8>, value: usize, size: usize) {
    out.extend_from_slice(&(value as u64).to_be_bytes()[8 - size..]);
}

/// CRC-32C (Castagnoli), reflected.
fn crc32c(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |mut crc, &byte| {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x82f6_3b78
            } else {
                crc >> 1
            };
        }
        crc
    })
}

impl Cell {
    /// Parses a bag of cells that must contain exactly one root.
    pub fn from_boc(bytes: &[u8]) -> Result<Self> {
        let mut roots = deserialize_boc(bytes)?;
        if roots.len() != 1 {
            return Err(invalid(format!("expected one root, found {}", roots.len())));
        }
        Ok(roots.remove(0))
    }

    /// Parses a standard-base64 bag of cells with exactly one root.
    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_boc(&STANDARD.decode(s.trim())?)
    }

    pub fn to_boc(&self) -> Vec<u8> {
        serialize_boc(self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_boc())
    }
}

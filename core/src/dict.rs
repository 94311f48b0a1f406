//! Fixed-key-width dictionaries (`Hashmap n X` / `HashmapE n X`) stored
//! as binary tries of cells.
//!
//! Each node starts with a label holding the next run of key bits. A node
//! whose label exhausts the key is a leaf and holds the value; any other
//! node is a fork with exactly two references (key bit 0, then 1).

use std::collections::BTreeMap;

use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::slice::Slice;
use crate::{DecodeError, Result};

/// Decoded dictionary, keyed by the unsigned key value.
pub type Dict<V> = BTreeMap<u64, V>;

/// Widest key supported by [`Dict`].
pub const MAX_KEY_BITS: usize = 64;

fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::MalformedDictionary(msg.into())
}

/// Number of bits needed to store a label length in `0..=max`.
fn len_bits(max: usize) -> usize {
    (usize::BITS - max.leading_zeros()) as usize
}

/// `bits` ones in the low end of a `u64`.
fn ones(bits: usize) -> u64 {
    match bits {
        0 => 0,
        64.. => u64::MAX,
        n => u64::MAX >> (64 - n),
    }
}

/// Reads a `HashmapE`: a presence bit and, if set, the root reference.
pub fn load_dict<V, F>(slice: &mut Slice<'_>, key_bits: usize, value: F) -> Result<Dict<V>>
where
    F: FnMut(&mut Slice<'_>) -> Result<V>,
{
    match slice.load_maybe_ref()? {
        Some(root) => parse_dict(root, key_bits, value),
        None => Ok(Dict::new()),
    }
}

/// Decodes a non-empty `Hashmap` whose root node is `root`.
///
/// `value` is handed the leaf cursor positioned right after the label and
/// must consume the leaf completely.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedDictionary`] when a label is truncated
/// or longer than the remaining key, a fork does not hold exactly two
/// references and no data, or a leaf has unread content. Errors produced
/// by `value` are passed through.
pub fn parse_dict<V, F>(root: &Cell, key_bits: usize, mut value: F) -> Result<Dict<V>>
where
    F: FnMut(&mut Slice<'_>) -> Result<V>,
{
    if key_bits > MAX_KEY_BITS {
        return Err(malformed(format!("key width {key_bits} is not supported")));
    }
    let mut out = Dict::new();
    parse_node(root, key_bits, 0, &mut value, &mut out)?;
    Ok(out)
}

fn parse_node<V, F>(
    cell: &Cell,
    remaining: usize,
    prefix: u64,
    value: &mut F,
    out: &mut Dict<V>,
) -> Result<()>
where
    F: FnMut(&mut Slice<'_>) -> Result<V>,
{
    let mut slice = cell.parse();
    let (label, len) = read_label(&mut slice, remaining).map_err(|e| match e {
        DecodeError::OutOfBits { .. } => malformed("truncated label"),
        other => other,
    })?;
    let key = prefix.checked_shl(len as u32).unwrap_or(0) | label;
    let rest = remaining - len;

    if rest == 0 {
        let v = value(&mut slice)?;
        if !slice.is_drained() {
            return Err(malformed(format!(
                "leaf {key} has {} unread bits and {} unread refs",
                slice.remaining_bits(),
                slice.remaining_refs()
            )));
        }
        out.insert(key, v);
        return Ok(());
    }

    if slice.remaining_bits() != 0 || slice.remaining_refs() != 2 {
        return Err(malformed(format!(
            "fork must hold two refs and no data, found {} bits and {} refs",
            slice.remaining_bits(),
            slice.remaining_refs()
        )));
    }
    let left = slice.load_ref()?;
    let right = slice.load_ref()?;
    parse_node(left, rest - 1, key << 1, value, out)?;
    parse_node(right, rest - 1, (key << 1) | 1, value, out)
}

/// Reads a `HmLabel ~n m`, returning the label bits and their count.
fn read_label(slice: &mut Slice<'_>, max: usize) -> Result<(u64, usize)> {
    let too_long = |len: usize| malformed(format!("label of {len} bits exceeds {max} key bits"));

    if !slice.load_bit()? {
        // hml_short$0 len:(Unary ~n) s:(n * Bit)
        let mut len = 0;
        while slice.load_bit()? {
            len += 1;
            if len > max {
                return Err(too_long(len));
            }
        }
        return Ok((slice.load_uint(len)?, len));
    }

    let same = slice.load_bit()?;
    if !same {
        // hml_long$10 n:(#<= m) s:(n * Bit)
        let len = slice.load_uint(len_bits(max))? as usize;
        if len > max {
            return Err(too_long(len));
        }
        Ok((slice.load_uint(len)?, len))
    } else {
        // hml_same$11 v:Bit n:(#<= m)
        let bit = slice.load_bit()?;
        let len = slice.load_uint(len_bits(max))? as usize;
        if len > max {
            return Err(too_long(len));
        }
        Ok((if bit { ones(len) } else { 0 }, len))
    }
}

/// Writes the cheapest label encoding, preferring short, then long,
/// then same on ties.
fn write_label(builder: &mut CellBuilder, label: u64, len: usize, max: usize) -> Result<()> {
    let k = len_bits(max);
    let short = 2 * len + 2;
    let long = 2 + k + len;
    let same = 3 + k;
    let uniform = len <= 1 || label == 0 || label == ones(len);

    if uniform && same < short && same < long {
        let bit = len > 0 && label & 1 == 1;
        builder
            .store_uint(0b11, 2)?
            .store_bit(bit)?
            .store_uint(len as u64, k)?;
    } else if long < short {
        builder
            .store_uint(0b10, 2)?
            .store_uint(len as u64, k)?
            .store_uint(label, len)?;
    } else {
        builder.store_bit(false)?;
        for _ in 0..len {
            builder.store_bit(true)?;
        }
        builder.store_bit(false)?.store_uint(label, len)?;
    }
    Ok(())
}

/// Serialises `entries` as a `Hashmap`, returning `None` when empty.
///
/// `store` writes one value into its leaf builder.
pub fn build_dict<V, F>(entries: &Dict<V>, key_bits: usize, mut store: F) -> Result<Option<Cell>>
where
    F: FnMut(&mut CellBuilder, &V) -> Result<()>,
{
    if key_bits > MAX_KEY_BITS {
        return Err(malformed(format!("key width {key_bits} is not supported")));
    }
    if entries.is_empty() {
        return Ok(None);
    }
    if let Some(key) = entries.keys().find(|k| **k & !ones(key_bits) != 0) {
        return Err(malformed(format!("key {key} does not fit in {key_bits} bits")));
    }

    let items: Vec<(u64, &V)> = entries.iter().map(|(k, v)| (*k, v)).collect();
    build_node(&items, key_bits, &mut store).map(Some)
}

fn build_node<V, F>(items: &[(u64, &V)], remaining: usize, store: &mut F) -> Result<Cell>
where
    F: FnMut(&mut CellBuilder, &V) -> Result<()>,
{
    let mut builder = CellBuilder::new();

    if let [(key, value)] = items {
        write_label(&mut builder, *key, remaining, remaining)?;
        store(&mut builder, value)?;
        return builder.build();
    }

    // items are sorted, so the first and last key bound the shared prefix
    let first = items[0].0;
    let last = items[items.len() - 1].0;
    let rest = len_bits_u64(first ^ last);
    let prefix_len = remaining - rest;
    write_label(
        &mut builder,
        first.checked_shr(rest as u32).unwrap_or(0),
        prefix_len,
        remaining,
    )?;

    let branch = rest - 1;
    let mask = ones(branch);
    let split = items.partition_point(|(k, _)| (k >> branch) & 1 == 0);

    let left: Vec<(u64, &V)> = items[..split].iter().map(|(k, v)| (k & mask, *v)).collect();
    let right: Vec<(u64, &V)> = items[split..].iter().map(|(k, v)| (k & mask, *v)).collect();
    builder
        .store_ref(build_node(&left, branch, store)?)?
        .store_ref(build_node(&right, branch, store)?)?;
    builder.build()
}

fn len_bits_u64(value: u64) -> usize {
    (u64::BITS - value.leading_zeros()) as usize
}

/// Writes a `HashmapE`: a presence bit and the optional root.
pub fn store_dict<V, F>(
    builder: &mut CellBuilder,
    entries: &Dict<V>,
    key_bits: usize,
    store: F,
) -> Result<()>
where
    F: FnMut(&mut CellBuilder, &V) -> Result<()>,
{
    let root = build_dict(entries, key_bits, store)?;
    builder.store_maybe_ref(root)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_u16(b: &mut CellBuilder, v: &u16) -> Result<()> {
        b.store_uint(*v as u64, 16).map(|_| ())
    }

    fn load_u16(s: &mut Slice<'_>) -> Result<u16> {
        s.load_uint(16).map(|v| v as u16)
    }

    #[test]
    fn empty_dict() {
        let mut b = CellBuilder::new();
        store_dict(&mut b, &Dict::<u16>::new(), 8, store_u16).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 1);
        let mut s = cell.parse();
        assert!(load_dict(&mut s, 8, load_u16).unwrap().is_empty());
        s.end_parse().unwrap();
    }

    #[test]
    fn single_entry_is_one_leaf() {
        let dict = Dict::from([(0x2a, 7u16)]);
        let root = build_dict(&dict, 8, store_u16).unwrap().unwrap();
        assert!(root.refs().is_empty());
        // long label: 10, length in four bits, eight key bits
        assert_eq!(root.bit_len(), 14 + 16);
        assert_eq!(parse_dict(&root, 8, load_u16).unwrap(), dict);
    }

    #[test]
    fn many_entries() {
        let dict: Dict<u16> = [0u64, 1, 2, 3, 7, 128, 200, 255]
            .into_iter()
            .map(|k| (k, (k * 3) as u16))
            .collect();
        let root = build_dict(&dict, 8, store_u16).unwrap().unwrap();
        assert_eq!(root.refs().len(), 2);
        assert_eq!(parse_dict(&root, 8, load_u16).unwrap(), dict);
    }

    #[test]
    fn wide_keys() {
        let dict = Dict::from([(0u64, 1u16), (u64::MAX, 2), (1 << 63, 3)]);
        let root = build_dict(&dict, 64, store_u16).unwrap().unwrap();
        assert_eq!(parse_dict(&root, 64, load_u16).unwrap(), dict);
    }

    #[test]
    fn label_encodings() {
        let encode = |label: u64, len: usize, max: usize| {
            let mut b = CellBuilder::new();
            write_label(&mut b, label, len, max).unwrap();
            let cell = b.build().unwrap();
            let bits = cell.parse().load_uint(cell.bit_len()).unwrap();
            (bits, cell.bit_len())
        };
        // short wins for tiny labels
        assert_eq!(encode(0b1, 1, 8), (0b0101, 4));
        // long: 10, len in 4 bits, label
        assert_eq!(encode(0b1011_0, 5, 8), (0b10_0101_10110, 11));
        // same: 11, bit, len in 4 bits
        assert_eq!(encode(0xff, 8, 8), (0b11_1_1000, 7));
        assert_eq!(encode(0, 0, 0), (0b00, 2));

        for (label, len) in [(0b1, 1), (0b10110, 5), (0xff, 8), (0, 7), (0x5a, 8)] {
            let mut b = CellBuilder::new();
            write_label(&mut b, label, len, 8).unwrap();
            let cell = b.build().unwrap();
            assert_eq!(read_label(&mut cell.parse(), 8).unwrap(), (label, len));
        }
    }

    #[test]
    fn truncated_label_is_malformed() {
        // short label announcing three ones, then cut off
        let mut b = CellBuilder::new();
        b.store_uint(0b0111, 4).unwrap();
        let root = b.build().unwrap();
        assert_eq!(
            parse_dict(&root, 8, load_u16).unwrap_err(),
            DecodeError::MalformedDictionary("truncated label".into())
        );
    }

    #[test]
    fn label_longer_than_key() {
        // hml_long with length 9 for an 8-bit key
        let mut b = CellBuilder::new();
        b.store_uint(0b10, 2).unwrap().store_uint(9, 4).unwrap();
        let root = b.build().unwrap();
        assert!(matches!(
            parse_dict(&root, 8, load_u16),
            Err(DecodeError::MalformedDictionary(_))
        ));
    }

    #[test]
    fn fork_missing_branch() {
        let mut b = CellBuilder::new();
        // empty short label, then a single ref where a fork needs two
        b.store_uint(0b00, 2).unwrap().store_ref(Cell::empty()).unwrap();
        let root = b.build().unwrap();
        assert!(matches!(
            parse_dict(&root, 8, load_u16),
            Err(DecodeError::MalformedDictionary(_))
        ));
    }

    #[test]
    fn leaf_with_trailing_data() {
        let mut b = CellBuilder::new();
        write_label(&mut b, 3, 8, 8).unwrap();
        b.store_uint(1, 16).unwrap().store_bit(true).unwrap();
        let root = b.build().unwrap();
        assert!(matches!(
            parse_dict(&root, 8, load_u16),
            Err(DecodeError::MalformedDictionary(_))
        ));
    }
}

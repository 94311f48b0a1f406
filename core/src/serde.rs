/// Serde helper to (de)serialize [BigUint] as decimal strings.
#[cfg(feature = "json")]
pub mod biguint_serde {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse::<BigUint>().map_err(de::Error::custom)
    }
}

/// Serde helper to (de)serialize signed [BigInt] getter values as
/// decimal strings.
#[cfg(feature = "json")]
pub mod bigint_serde {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigInt, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<BigInt, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse::<BigInt>().map_err(de::Error::custom)
    }
}

/// Serde helper to (de)serialize a [Cell](crate::cell::Cell) as a
/// base64 BoC.
#[cfg(feature = "json")]
pub mod cell_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::cell::Cell;

    pub fn serialize<S>(cell: &Cell, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&cell.to_base64())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Cell, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        Cell::from_base64(&s).map_err(de::Error::custom)
    }
}

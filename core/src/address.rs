//! Internal account addresses (`addr_std`).

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
#[cfg(feature = "json")]
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::DecodeError;

/// Tag bits of a user-friendly address.
const FRIENDLY_BOUNCEABLE: u8 = 0x11;
const FRIENDLY_NON_BOUNCEABLE: u8 = 0x51;
const FRIENDLY_TESTNET: u8 = 0x80;

/// A workchain id plus the 256-bit account id within it.
///
/// Displays in raw form (`0:4f2a…`). Parses raw form as well as the
/// 48-character user-friendly form (standard or URL-safe base64).
#[cfg_attr(feature = "json", derive(SerializeDisplay, DeserializeFromStr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub workchain: i32,
    pub hash: [u8; 32],
}

impl Address {
    pub const fn new(workchain: i32, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    fn from_raw(s: &str) -> Result<Self, DecodeError> {
        let (wc, hash) = s
            .split_once(':')
            .ok_or_else(|| DecodeError::MalformedAddress(format!("not a raw address: {s}")))?;
        let workchain = wc
            .parse::<i32>()
            .map_err(|e| DecodeError::MalformedAddress(format!("workchain `{wc}`: {e}")))?;
        let bytes = hex::decode(hash)?;
        let hash = bytes
            .try_into()
            .map_err(|_| DecodeError::MalformedAddress("account id must be 32 bytes".into()))?;
        Ok(Self::new(workchain, hash))
    }

    fn from_friendly(s: &str) -> Result<Self, DecodeError> {
        let bytes = if s.contains(['-', '_']) {
            URL_SAFE.decode(s)?
        } else {
            STANDARD.decode(s)?
        };
        if bytes.len() != 36 {
            return Err(DecodeError::MalformedAddress(format!(
                "user-friendly address must decode to 36 bytes, got {}",
                bytes.len()
            )));
        }

        let expected = crc16(&bytes[..34]);
        let found = u16::from_be_bytes([bytes[34], bytes[35]]);
        if expected != found {
            return Err(DecodeError::MalformedAddress("checksum mismatch".into()));
        }

        let tag = bytes[0] & !FRIENDLY_TESTNET;
        if tag != FRIENDLY_BOUNCEABLE && tag != FRIENDLY_NON_BOUNCEABLE {
            return Err(DecodeError::MalformedAddress(format!(
                "unknown address tag 0x{:02x}",
                bytes[0]
            )));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self::new(bytes[1] as i8 as i32, hash))
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::from_raw(s)
        } else if s.len() == 48 {
            Self::from_friendly(s)
        } else {
            Err(DecodeError::MalformedAddress(format!(
                "unrecognised address format: {s}"
            )))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

/// CRC-16/XMODEM, as used by user-friendly addresses.
fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |mut crc, &byte| {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

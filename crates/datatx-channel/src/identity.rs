use std::fmt;
use std::str::FromStr;

use datatx_frame::{SENTINEL, SEPARATOR};

use crate::error::{ChannelError, Result};

/// Width of a generated identity: a 128-bit value needs at most 25 base-36
/// digits.
pub const ID_SUFFIX_LEN: usize = 25;

/// Longest identity accepted from a caller.
pub const MAX_ID_LEN: usize = 256;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a random 25-character base-36 string.
///
/// Two independent 64-bit random values are packed into one 128-bit integer.
/// Uniqueness is statistical, not cryptographic.
pub fn id_suffix() -> String {
    let high: u64 = rand::random();
    let low: u64 = rand::random();
    let value = (u128::from(high) << 64) | u128::from(low);
    format!("{:0>width$}", to_base36(value), width = ID_SUFFIX_LEN)
}

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(ID_SUFFIX_LEN);
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

/// Address of one channel endpoint on the local machine.
///
/// Used as the source and target fields of every frame, so it may not
/// contain the field separator or the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// Validate a caller-chosen identity.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(ChannelError::InvalidId(format!(
                "length {} (must be 1..={MAX_ID_LEN})",
                id.len()
            )));
        }
        if id.contains(SEPARATOR) || id.contains(SENTINEL) {
            return Err(ChannelError::InvalidId(format!(
                "'{}' contains a reserved character",
                id.escape_debug()
            )));
        }
        Ok(Self(id))
    }

    /// A fresh random identity.
    pub fn random() -> Self {
        Self(id_suffix())
    }

    /// `prefix` followed by a fresh random suffix, e.g. `myapp-0k3…`.
    pub fn with_prefix(prefix: &str) -> Result<Self> {
        Self::new(format!("{prefix}{}", id_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

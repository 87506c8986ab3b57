//! Token colors and colored balances

use crate::codec::{self, CodecError, Reader};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};

pub const COLOR_LENGTH: usize = 32;

/// Token color. The all-zero color is the base currency.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize)]
pub struct Color(pub [u8; COLOR_LENGTH]);

impl Color {
    pub const BASE: Color = Color([0u8; COLOR_LENGTH]);

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; COLOR_LENGTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: COLOR_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Color(arr))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Color::BASE {
            f.write_str("BASE")
        } else {
            f.write_str(&bs58::encode(self.0).into_string())
        }
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({})", self)
    }
}

impl FromStr for Color {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "BASE" {
            return Ok(Color::BASE);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CodecError::Invalid(format!("base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Amounts per color. Zero entries are never stored, so two balances
/// holding the same tokens compare (and encode) equal.
#[derive(Clone, PartialEq, Eq, Default, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ColoredBalances(BTreeMap<Color, i64>);

impl ColoredBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance holding only base currency
    pub fn base(amount: i64) -> Self {
        let mut b = Self::new();
        b.add(Color::BASE, amount);
        b
    }

    pub fn get(&self, color: &Color) -> i64 {
        self.0.get(color).copied().unwrap_or(0)
    }

    /// Add `amount` of `color`. Overflow panics; amounts that come
    /// from requests or state go through `checked_add`.
    pub fn add(&mut self, color: Color, amount: i64) {
        if self.checked_add(color, amount).is_none() {
            panic!("balance overflow: {} + {} of {}", self.get(&color), amount, color);
        }
    }

    /// Add `amount` of `color`; `None` on i64 overflow, leaving the
    /// balance unchanged
    pub fn checked_add(&mut self, color: Color, amount: i64) -> Option<()> {
        let v = self.get(&color).checked_add(amount)?;
        if v == 0 {
            self.0.remove(&color);
        } else {
            self.0.insert(color, v);
        }
        Some(())
    }

    /// Sum of both balances, or `None` if any color overflows
    pub fn checked_sum(&self, other: &ColoredBalances) -> Option<ColoredBalances> {
        let mut out = self.clone();
        for (color, amount) in other.iter() {
            out.checked_add(*color, *amount)?;
        }
        Some(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Color, &i64)> {
        self.0.iter()
    }

    /// Encoding: u16 entry count, then (color, i64) pairs in color order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.0.len() * (COLOR_LENGTH + 8));
        codec::write_u16(&mut buf, self.0.len() as u16);
        for (color, amount) in &self.0 {
            buf.extend_from_slice(&color.0);
            codec::write_i64(&mut buf, *amount);
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let n = r.read_u16()?;
        let mut out = Self::new();
        for _ in 0..n {
            let color = Color(r.read_array::<COLOR_LENGTH>()?);
            let amount = r.read_i64()?;
            out.checked_add(color, amount)
                .ok_or_else(|| CodecError::Invalid(format!("amount of {} overflows", color)))?;
        }
        r.finish()?;
        Ok(out)
    }
}

impl FromIterator<(Color, i64)> for ColoredBalances {
    fn from_iter<I: IntoIterator<Item = (Color, i64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (color, amount) in iter {
            out.add(color, amount);
        }
        out
    }
}

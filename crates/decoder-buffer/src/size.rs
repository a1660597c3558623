// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable byte sizes for pool configuration.
//!
//! A [`ByteSize`] is how capacities, growth units and budgets are written in
//! configuration files: `"16M"`, `"512KB"`, `"1G"` or a raw byte count.

use crate::BufferError;
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// A byte count with SI-style suffix parsing.
///
/// # Parsing
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"64K"` or `"64KB"` → 64 × 1024 bytes
/// - `"4096"` or `"4096B"` → raw byte count
///
/// Zero is allowed: a zero allocation unit means "grow by exactly what is
/// needed".
///
/// # Examples
/// ```
/// use decoder_buffer::ByteSize;
///
/// let s = ByteSize::parse("16M").unwrap();
/// assert_eq!(s.as_bytes(), 16 * 1024 * 1024);
/// assert_eq!(s.to_string(), "16 MB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(usize);

impl ByteSize {
    /// A size of `bytes` bytes.
    pub const fn from_bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    /// A size of `kb` kibibytes.
    pub const fn from_kb(kb: usize) -> Self {
        Self(kb * KIB)
    }

    /// A size of `mb` mebibytes.
    pub const fn from_mb(mb: usize) -> Self {
        Self(mb * MIB)
    }

    /// The size in bytes.
    pub const fn as_bytes(&self) -> usize {
        self.0
    }

    /// Parses a human-readable size. Case-insensitive; surrounding and
    /// inner whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, BufferError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BufferError::InvalidSize("empty size string".to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        let (digits, multiplier) = [
            ("GB", GIB),
            ("G", GIB),
            ("MB", MIB),
            ("M", MIB),
            ("KB", KIB),
            ("K", KIB),
            ("B", 1),
        ]
        .iter()
        .find_map(|(suffix, mult)| upper.strip_suffix(suffix).map(|d| (d.trim(), *mult)))
        .unwrap_or((upper.as_str(), 1));

        let value: usize = digits.parse().map_err(|_| {
            BufferError::InvalidSize(format!(
                "'{trimmed}': expected a number followed by an optional K, M or G suffix"
            ))
        })?;

        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| BufferError::InvalidSize(format!("'{trimmed}' overflows usize")))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes >= GIB && bytes % GIB == 0 {
            write!(f, "{} GB", bytes / GIB)
        } else if bytes >= MIB && bytes % MIB == 0 {
            write!(f, "{} MB", bytes / MIB)
        } else if bytes >= KIB && bytes % KIB == 0 {
            write!(f, "{} KB", bytes / KIB)
        } else {
            write!(f, "{bytes} B")
        }
    }
}

impl std::str::FromStr for ByteSize {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<usize> for ByteSize {
    fn from(bytes: usize) -> Self {
        Self(bytes)
    }
}

impl serde::Serialize for ByteSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ByteSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(usize),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(Self(bytes)),
            Raw::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

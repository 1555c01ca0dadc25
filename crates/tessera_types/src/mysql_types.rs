//! ENUM, SET and BIT values.

use std::fmt;

use tessera_error::{DbError, Result};

/// An ENUM value. `value` is the 1-based index into the column's elements,
/// zero for the empty "error" member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enum {
    pub name: String,
    pub value: u64,
}

impl Enum {
    pub fn parse_with_name(elems: &[String], name: &str) -> Result<Self> {
        for (idx, elem) in elems.iter().enumerate() {
            if elem.eq_ignore_ascii_case(name) {
                return Ok(Enum {
                    name: elem.clone(),
                    value: idx as u64 + 1,
                });
            }
        }
        // A numeric string selects by position.
        if let Ok(num) = name.parse::<u64>() {
            return Self::parse_with_value(elems, num);
        }
        Err(DbError::new(format!("Item '{name}' not found in enum")))
    }

    pub fn parse_with_value(elems: &[String], value: u64) -> Result<Self> {
        if value == 0 {
            return Ok(Enum {
                name: String::new(),
                value: 0,
            });
        }
        let name = elems
            .get(value as usize - 1)
            .ok_or_else(|| DbError::new(format!("Enum value {value} out of range")))?;
        Ok(Enum {
            name: name.clone(),
            value,
        })
    }
}

impl fmt::Display for Enum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A SET value. Bit `i` of `value` is set when element `i` is a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Set {
    pub name: String,
    pub value: u64,
}

impl Set {
    pub fn parse_with_name(elems: &[String], name: &str) -> Result<Self> {
        if name.is_empty() {
            return Ok(Set {
                name: String::new(),
                value: 0,
            });
        }
        let mut value = 0_u64;
        for member in name.split(',') {
            let idx = elems
                .iter()
                .position(|e| e.eq_ignore_ascii_case(member))
                .ok_or_else(|| DbError::new(format!("Item '{member}' not found in set")))?;
            value |= 1 << idx;
        }
        Self::parse_with_value(elems, value)
    }

    pub fn parse_with_value(elems: &[String], value: u64) -> Result<Self> {
        if elems.len() < 64 && value >> elems.len() != 0 {
            return Err(DbError::new(format!("Set value {value} out of range")));
        }
        let name = elems
            .iter()
            .enumerate()
            .filter(|(idx, _)| value & (1 << idx) != 0)
            .map(|(_, e)| e.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Set { name, value })
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// BIT or hex/bit literal bytes, big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinaryLiteral(pub Vec<u8>);

impl BinaryLiteral {
    /// Big-endian bytes of `v` using `byte_size` bytes, or the minimal width
    /// when `byte_size` is `None`.
    pub fn from_u64(v: u64, byte_size: Option<usize>) -> Self {
        let bytes = v.to_be_bytes();
        let size = match byte_size {
            Some(n) => n.clamp(1, 8),
            None => (8 - (v.leading_zeros() as usize / 8)).max(1),
        };
        BinaryLiteral(bytes[8 - size..].to_vec())
    }

    /// Interpret as an unsigned integer. Leading zero bytes are ignored.
    pub fn to_u64(&self) -> Result<u64> {
        let trimmed: &[u8] = match self.0.iter().position(|&b| b != 0) {
            Some(idx) => &self.0[idx..],
            None => &[],
        };
        if trimmed.len() > 8 {
            return Err(DbError::new("Binary literal too long for BIGINT UNSIGNED"));
        }
        Ok(trimmed.iter().fold(0_u64, |acc, &b| (acc << 8) | b as u64))
    }
}

impl fmt::Display for BinaryLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

//! Literal pool at the end of the constant segment.
//!
//! Float constants take 8 bytes aligned to 8 within the segment. String
//! constants take a u16 length, the bytes and a terminating zero.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use zlang_core::CompilationError;

use super::{ByteWriter, MAX_STRING_LEN};

/// A pooled constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Float(OrderedFloat<f64>),
    Str(String),
}

/// Deduplicated literals with their constant-segment addresses.
#[derive(Debug, Clone)]
pub struct LiteralPool {
    /// Constant-segment offset of the first pool byte.
    base: usize,
    bytes: ByteWriter,
    index: FxHashMap<Literal, u32>,
}

impl LiteralPool {
    /// Create an empty pool starting at segment offset `base`.
    pub fn new(base: usize) -> Self {
        Self {
            base,
            bytes: ByteWriter::new(),
            index: FxHashMap::default(),
        }
    }

    /// Add or get an existing literal, returning its segment address.
    ///
    /// Strings longer than 65535 bytes fail with `FieldOverflow`.
    pub fn add(&mut self, literal: Literal) -> Result<u32, CompilationError> {
        if let Some(&address) = self.index.get(&literal) {
            return Ok(address);
        }

        let address = match &literal {
            Literal::Float(value) => {
                self.bytes.align(self.base, 8);
                let address = self.address();
                self.bytes.write_f64(value.0);
                address
            }
            Literal::Str(value) => {
                let len = u16::try_from(value.len()).map_err(|_| CompilationError::FieldOverflow {
                    what: "string constant",
                    value: value.chars().take(32).collect(),
                    max: MAX_STRING_LEN,
                    unit: "bytes",
                })?;
                let address = self.address();
                self.bytes.write_u16(len);
                self.bytes.write_bytes(value.as_bytes());
                self.bytes.write_u8(0);
                address
            }
        };
        self.index.insert(literal, address);
        Ok(address)
    }

    pub fn add_float(&mut self, value: f64) -> u32 {
        // Floats never overflow.
        self.add(Literal::Float(OrderedFloat(value))).unwrap_or_default()
    }

    pub fn add_str(&mut self, value: &str) -> Result<u32, CompilationError> {
        self.add(Literal::Str(value.to_string()))
    }

    /// Address of a literal already in the pool.
    pub fn get(&self, literal: &Literal) -> Option<u32> {
        self.index.get(literal).copied()
    }

    /// Number of distinct literals.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Size of the pool in bytes.
    pub fn size(&self) -> usize {
        self.bytes.position()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    fn address(&self) -> u32 {
        (self.base + self.bytes.position()) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_deduplicated() {
        let mut pool = LiteralPool::new(0);
        let a = pool.add_str("hello").unwrap();
        let b = pool.add_float(1.5);
        assert_eq!(pool.add_str("hello").unwrap(), a);
        assert_eq!(pool.add_float(1.5), b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(&Literal::Str("hello".into())), Some(a));
    }

    #[test]
    fn strings_are_length_prefixed_and_terminated() {
        let mut pool = LiteralPool::new(100);
        assert_eq!(pool.add_str("ab").unwrap(), 100);
        let mut expected = 2u16.to_ne_bytes().to_vec();
        expected.extend_from_slice(b"ab\0");
        assert_eq!(pool.as_bytes(), expected.as_slice());
    }

    #[test]
    fn floats_are_aligned_within_the_segment() {
        let mut pool = LiteralPool::new(4);
        pool.add_str("x").unwrap();
        // 4 + 4 bytes of string, already aligned.
        assert_eq!(pool.add_float(2.0), 8);
        pool.add_str("y").unwrap();
        // 16 + 4, padded to 24.
        assert_eq!(pool.add_float(3.0), 24);
        assert_eq!(&pool.as_bytes()[20..28], &3.0f64.to_ne_bytes());
    }

    #[test]
    fn oversized_strings_overflow() {
        let mut pool = LiteralPool::new(0);
        let long = "a".repeat(MAX_STRING_LEN + 1);
        assert!(matches!(
            pool.add_str(&long),
            Err(CompilationError::FieldOverflow { max: 65535, .. })
        ));
        assert!(pool.is_empty());
    }
}

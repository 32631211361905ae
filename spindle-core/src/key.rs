//! Keys, key selectors and key-value pairs.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A single key-value pair returned by a range read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Describes a key relative to the keys present in the database.
///
/// A selector is resolved by first finding the last key less than `key`
/// (or less than or equal, when `or_equal` is set), then moving `offset`
/// keys forward (positive) or backward (negative) from there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySelector {
    pub key: Bytes,
    pub or_equal: bool,
    pub offset: i32,
}

impl KeySelector {
    pub fn new(key: impl Into<Bytes>, or_equal: bool, offset: i32) -> Self {
        Self {
            key: key.into(),
            or_equal,
            offset,
        }
    }

    /// The greatest key strictly less than `key`.
    pub fn last_less_than(key: impl Into<Bytes>) -> Self {
        Self::new(key, false, 0)
    }

    /// The greatest key less than or equal to `key`.
    pub fn last_less_or_equal(key: impl Into<Bytes>) -> Self {
        Self::new(key, true, 0)
    }

    /// The least key strictly greater than `key`.
    pub fn first_greater_than(key: impl Into<Bytes>) -> Self {
        Self::new(key, true, 1)
    }

    /// The least key greater than or equal to `key`.
    pub fn first_greater_or_equal(key: impl Into<Bytes>) -> Self {
        Self::new(key, false, 1)
    }
}

impl Add<i32> for KeySelector {
    type Output = KeySelector;

    fn add(mut self, rhs: i32) -> KeySelector {
        self.offset += rhs;
        self
    }
}

impl Sub<i32> for KeySelector {
    type Output = KeySelector;

    fn sub(mut self, rhs: i32) -> KeySelector {
        self.offset -= rhs;
        self
    }
}

/// Returns the key immediately following `key` in byte order (`key` + `\x00`).
pub fn key_after(key: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(key.len() + 1);
    buf.put_slice(key);
    buf.put_u8(0x00);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_constructors() {
        let sel = KeySelector::first_greater_or_equal(&b"apple"[..]);
        assert_eq!(sel, KeySelector::new(&b"apple"[..], false, 1));

        let sel = KeySelector::first_greater_than(&b"apple"[..]);
        assert!(sel.or_equal);
        assert_eq!(sel.offset, 1);

        let sel = KeySelector::last_less_than(&b"apple"[..]);
        assert!(!sel.or_equal);
        assert_eq!(sel.offset, 0);

        let sel = KeySelector::last_less_or_equal(&b"apple"[..]);
        assert!(sel.or_equal);
        assert_eq!(sel.offset, 0);
    }

    #[test]
    fn test_selector_offset_arithmetic() {
        let sel = KeySelector::first_greater_or_equal(&b"k"[..]) + 3;
        assert_eq!(sel.offset, 4);
        let sel = sel - 5;
        assert_eq!(sel.offset, -1);
    }

    #[test]
    fn test_key_after() {
        assert_eq!(&key_after(b"abc")[..], b"abc\x00");
        assert_eq!(&key_after(b"")[..], b"\x00");
    }
}

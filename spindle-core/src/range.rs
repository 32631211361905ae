//! Key ranges and the prefix-range helper.

use crate::key::KeySelector;
use crate::{Error, Result};
use bytes::Bytes;

/// Anything that can describe the endpoints of a range read.
pub trait Range {
    fn begin_selector(&self) -> KeySelector;
    fn end_selector(&self) -> KeySelector;
}

/// A range with exact key endpoints, usable for clears and conflict ranges.
pub trait ExactRange: Range {
    fn begin_key(&self) -> &[u8];
    fn end_key(&self) -> &[u8];
}

/// The half-open range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub begin: Bytes,
    pub end: Bytes,
}

impl KeyRange {
    pub fn new(begin: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// The range of all keys starting with `prefix`.
    pub fn starts_with(prefix: &[u8]) -> Result<Self> {
        prefix_range(prefix)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= &self.begin[..] && key < &self.end[..]
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

impl Range for KeyRange {
    fn begin_selector(&self) -> KeySelector {
        KeySelector::first_greater_or_equal(self.begin.clone())
    }

    fn end_selector(&self) -> KeySelector {
        KeySelector::first_greater_or_equal(self.end.clone())
    }
}

impl ExactRange for KeyRange {
    fn begin_key(&self) -> &[u8] {
        &self.begin
    }

    fn end_key(&self) -> &[u8] {
        &self.end
    }
}

/// A range whose endpoints are key selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectorRange {
    pub begin: KeySelector,
    pub end: KeySelector,
}

impl SelectorRange {
    pub fn new(begin: KeySelector, end: KeySelector) -> Self {
        Self { begin, end }
    }
}

impl Range for SelectorRange {
    fn begin_selector(&self) -> KeySelector {
        self.begin.clone()
    }

    fn end_selector(&self) -> KeySelector {
        self.end.clone()
    }
}

/// Returns the first key that does not start with `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. Fails when the prefix is empty or made only of `0xFF`.
pub fn strinc(prefix: &[u8]) -> Result<Bytes> {
    match prefix.iter().rposition(|&b| b != 0xFF) {
        Some(i) => {
            let mut out = prefix[..=i].to_vec();
            out[i] += 1;
            Ok(Bytes::from(out))
        }
        None => Err(Error::KeyOutsideLegalRange),
    }
}

/// Computes `[prefix, strinc(prefix))`, the range of keys beginning with `prefix`.
pub fn prefix_range(prefix: &[u8]) -> Result<KeyRange> {
    let end = strinc(prefix)?;
    Ok(KeyRange {
        begin: Bytes::copy_from_slice(prefix),
        end,
    })
}

//! Range read options, streaming modes, mutation and conflict range kinds.

use serde::{Deserialize, Serialize};

/// Trades off latency against bandwidth for successive range pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// Fetch the entire range as early as possible.
    WantAll,
    /// Start with small pages and grow them as iteration proceeds.
    #[default]
    Iterator,
    /// Fetch exactly the requested limit in one round trip.
    Exact,
    Small,
    Medium,
    Large,
    /// Fetch as much as possible per round trip, one page at a time.
    Serial,
}

impl StreamingMode {
    /// Wire code used by instruction tapes and engines.
    pub fn code(self) -> i32 {
        match self {
            StreamingMode::WantAll => -2,
            StreamingMode::Iterator => -1,
            StreamingMode::Exact => 0,
            StreamingMode::Small => 1,
            StreamingMode::Medium => 2,
            StreamingMode::Large => 3,
            StreamingMode::Serial => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(StreamingMode::WantAll),
            -1 => Some(StreamingMode::Iterator),
            0 => Some(StreamingMode::Exact),
            1 => Some(StreamingMode::Small),
            2 => Some(StreamingMode::Medium),
            3 => Some(StreamingMode::Large),
            4 => Some(StreamingMode::Serial),
            _ => None,
        }
    }
}

/// How a range read is carried out.
///
/// The default reads the whole range in ascending order, page by page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeOptions {
    /// Maximum number of pairs returned; 0 means no limit.
    pub limit: usize,
    pub mode: StreamingMode,
    /// Read in descending key order. With a limit, the last `limit` pairs
    /// of the range are returned.
    pub reverse: bool,
}

impl RangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_mode(mut self, mode: StreamingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Atomic read-modify-write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationType {
    /// Little-endian integer addition.
    Add,
    BitAnd,
    BitOr,
    BitXor,
}

impl MutationType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "add" => Some(MutationType::Add),
            "bit_and" | "and" => Some(MutationType::BitAnd),
            "bit_or" | "or" => Some(MutationType::BitOr),
            "bit_xor" | "xor" => Some(MutationType::BitXor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictRangeType {
    Read,
    Write,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_options_default() {
        let opts = RangeOptions::default();
        assert_eq!(opts.limit, 0);
        assert_eq!(opts.mode, StreamingMode::Iterator);
        assert!(!opts.reverse);
    }

    #[test]
    fn test_range_options_builder() {
        let opts = RangeOptions::new()
            .with_limit(10)
            .with_mode(StreamingMode::WantAll)
            .with_reverse(true);
        assert_eq!(opts.limit, 10);
        assert_eq!(opts.mode, StreamingMode::WantAll);
        assert!(opts.reverse);
    }

    #[test]
    fn test_streaming_mode_codes_round_trip() {
        for code in -2..=4 {
            let mode = StreamingMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert_eq!(StreamingMode::from_code(9), None);
    }

    #[test]
    fn test_streaming_mode_serde_names() {
        let json = serde_json::to_string(&StreamingMode::WantAll).unwrap();
        assert_eq!(json, "\"want_all\"");
    }

    #[test]
    fn test_mutation_from_name() {
        assert_eq!(MutationType::from_name("ADD"), Some(MutationType::Add));
        assert_eq!(MutationType::from_name("bit_xor"), Some(MutationType::BitXor));
        assert_eq!(MutationType::from_name("max"), None);
    }
}

use crate::backoff::BackoffPolicy;

/// Engine configuration for limits, paging and retry backoff
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of armed watches across all transactions
    pub max_watches: usize,

    /// Number of versions kept readable behind the latest commit
    pub version_window: i64,

    /// Maximum key length in bytes
    pub max_key_size: usize,

    /// Maximum value length in bytes
    pub max_value_size: usize,

    /// Rows in the first page of an `Iterator` mode read
    pub iterator_initial_rows: usize,

    /// Upper bound for `Iterator` mode pages
    pub iterator_max_rows: usize,

    /// Rows per page for the `Small`, `Medium`, `Large` and `Serial` modes
    pub small_rows: usize,
    pub medium_rows: usize,
    pub large_rows: usize,
    pub serial_rows: usize,

    /// Delay policy applied by `on_error` to retryable codes
    pub backoff: BackoffPolicy,

    /// Addresses reported by locality lookups
    pub addresses: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_watches: 10_000,
            version_window: 5_000,
            max_key_size: 10_000,
            max_value_size: 100_000,
            iterator_initial_rows: 8,
            iterator_max_rows: 1024,
            small_rows: 16,
            medium_rows: 64,
            large_rows: 256,
            serial_rows: 1024,
            backoff: BackoffPolicy::default(),
            addresses: vec!["127.0.0.1:4500".to_string()],
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_watches(mut self, max: usize) -> Self {
        self.max_watches = max;
        self
    }

    pub fn with_version_window(mut self, window: i64) -> Self {
        self.version_window = window;
        self
    }

    pub fn with_max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    pub fn with_max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Set the first and the largest page size of `Iterator` mode reads
    pub fn with_iterator_rows(mut self, initial: usize, max: usize) -> Self {
        self.iterator_initial_rows = initial;
        self.iterator_max_rows = max;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = addresses;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.version_window <= 0 {
            return Err("version_window must be greater than 0".to_string());
        }

        if self.max_key_size == 0 || self.max_value_size == 0 {
            return Err("key and value size limits must be greater than 0".to_string());
        }

        if self.iterator_initial_rows == 0 {
            return Err("iterator_initial_rows must be greater than 0".to_string());
        }

        if self.iterator_max_rows < self.iterator_initial_rows {
            return Err("iterator_max_rows must not be below iterator_initial_rows".to_string());
        }

        if [self.small_rows, self.medium_rows, self.large_rows, self.serial_rows].contains(&0) {
            return Err("page sizes must be greater than 0".to_string());
        }

        self.backoff.validate()
    }
}

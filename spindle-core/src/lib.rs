pub mod engine;
pub mod error;
pub mod error_code;
pub mod key;
pub mod options;
pub mod range;

pub use engine::{
    Callback, DatabaseId, Engine, EngineResult, FutureId, RangeRequest, TransactionId,
};
pub use error::{EngineError, Error, Result};
pub use error_code::ErrorCode;
pub use key::{key_after, KeySelector, KeyValue};
pub use options::{ConflictRangeType, MutationType, RangeOptions, StreamingMode};
pub use range::{prefix_range, strinc, ExactRange, KeyRange, Range, SelectorRange};

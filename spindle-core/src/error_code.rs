//! Numeric error codes shared by the client layer and engines.

pub type ErrorCode = i32;

pub const SUCCESS: ErrorCode = 0;
pub const OPERATION_FAILED: ErrorCode = 1000;
pub const PAST_VERSION: ErrorCode = 1007;
pub const FUTURE_VERSION: ErrorCode = 1009;
pub const NOT_COMMITTED: ErrorCode = 1020;
pub const COMMIT_UNKNOWN_RESULT: ErrorCode = 1021;
pub const TRANSACTION_CANCELLED: ErrorCode = 1025;
pub const TRANSACTION_TIMED_OUT: ErrorCode = 1031;
pub const TOO_MANY_WATCHES: ErrorCode = 1032;
pub const WATCHES_DISABLED: ErrorCode = 1034;
pub const PROCESS_BEHIND: ErrorCode = 1037;
pub const OPERATION_CANCELLED: ErrorCode = 1101;
pub const FUTURE_RELEASED: ErrorCode = 1102;
pub const CLIENT_INVALID_OPERATION: ErrorCode = 2000;
pub const KEY_OUTSIDE_LEGAL_RANGE: ErrorCode = 2004;
pub const INVERTED_RANGE: ErrorCode = 2005;
pub const NETWORK_NOT_SETUP: ErrorCode = 2008;
pub const NETWORK_ALREADY_SETUP: ErrorCode = 2009;
pub const FUTURE_NOT_SET: ErrorCode = 2015;
/// Signals that a read found no value. The client maps it to an absent
/// value rather than an error.
pub const VALUE_NOT_PRESENT: ErrorCode = 2017;
pub const KEY_TOO_LARGE: ErrorCode = 2102;
pub const VALUE_TOO_LARGE: ErrorCode = 2103;
pub const API_VERSION_UNSET: ErrorCode = 2200;
pub const API_VERSION_ALREADY_SET: ErrorCode = 2201;
pub const API_VERSION_INVALID: ErrorCode = 2202;
pub const API_VERSION_NOT_SUPPORTED: ErrorCode = 2203;
pub const EXACT_MODE_WITHOUT_LIMITS: ErrorCode = 2210;
pub const ENCODING_FAILED: ErrorCode = 2300;
pub const UNKNOWN_ERROR: ErrorCode = 4000;
pub const INTERNAL_ERROR: ErrorCode = 4100;

/// Returns the built-in description for a code.
pub fn describe(code: ErrorCode) -> &'static str {
    match code {
        SUCCESS => "Success",
        OPERATION_FAILED => "Operation failed",
        PAST_VERSION => "Transaction is too old to perform reads or be committed",
        FUTURE_VERSION => "Request for future version",
        NOT_COMMITTED => "Transaction not committed due to conflict with another transaction",
        COMMIT_UNKNOWN_RESULT => "Transaction may or may not have committed",
        TRANSACTION_CANCELLED => "Operation aborted because the transaction was cancelled",
        TRANSACTION_TIMED_OUT => "Operation aborted because the transaction timed out",
        TOO_MANY_WATCHES => "Too many watches currently set",
        WATCHES_DISABLED => "Watches cannot be set if read your writes is disabled",
        PROCESS_BEHIND => "Storage process does not have recent mutations",
        OPERATION_CANCELLED => "Asynchronous operation cancelled",
        FUTURE_RELEASED => "Future has been released",
        CLIENT_INVALID_OPERATION => "Invalid API call",
        KEY_OUTSIDE_LEGAL_RANGE => "Key outside legal range",
        INVERTED_RANGE => "Range begin key larger than end key",
        NETWORK_NOT_SETUP => "Action not possible before the network is configured",
        NETWORK_ALREADY_SETUP => "Network can be configured only once",
        FUTURE_NOT_SET => "Future not ready",
        VALUE_NOT_PRESENT => "Requested value is not present",
        KEY_TOO_LARGE => "Key length exceeds limit",
        VALUE_TOO_LARGE => "Value length exceeds limit",
        API_VERSION_UNSET => "API version is not set",
        API_VERSION_ALREADY_SET => "API version may be set only once",
        API_VERSION_INVALID => "API version is not valid",
        API_VERSION_NOT_SUPPORTED => "API version not supported",
        EXACT_MODE_WITHOUT_LIMITS => "EXACT streaming mode requires limits, but none were given",
        ENCODING_FAILED => "Key or value encoding failed",
        INTERNAL_ERROR => "An internal error occurred",
        _ => "Unknown error",
    }
}

use thiserror::Error;

/// Configuration errors raised while building or loading a rule database.
///
/// A probe that simply does not match is never an error; these variants are
/// only produced at load or compile time, and any of them aborts the load.
#[derive(Error, Debug)]
pub enum MagicError {
    #[error("Truncated stream: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown matcher tag: {0}")]
    UnknownMatcherTag(u8),

    #[error("Invalid offset size {0}, expected 1, 2 or 4")]
    InvalidOffsetSize(u8),

    #[error("Invalid endian id: {0}")]
    InvalidEndian(u8),

    #[error("Invalid test operator: {0:?}")]
    InvalidOperator(char),

    #[error("Operator {operator:?} is not supported by {matcher} matchers")]
    UnsupportedOperator { operator: char, matcher: &'static str },

    #[error("Invalid test operand: {0}")]
    InvalidOperand(String),

    #[error("String data is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Invalid format expression: {0}")]
    InvalidFormat(String),

    #[error("Unknown named rule: {0}")]
    UnknownName(String),

    #[error("Rule tree nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Invalid ruleset header: {0}")]
    InvalidHeader(String),

    #[error("Ruleset checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MagicError>;

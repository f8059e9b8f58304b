//!
//! # Model Result and Error Types
//!

// Crates.io
use serde::{Deserialize, Serialize};

/// # Rule-File Parsing Contexts
/// Stacked while parsing, and reported with errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleParseContext {
    Header,
    DensityModel,
    Section,
    SubBlock,
    DistTable,
    MeasurementLog,
}

/// # Rule-File Parse Error Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleParseErrorType {
    /// Unrecognized keyword
    InvalidKey,
    /// Malformed or out-of-range value
    InvalidValue,
    /// Missing keyword at a required location
    RequiredWord { expected: String },
    /// Input ended mid-section
    UnexpectedEof,
    /// All other errors
    Other,
}

///
/// # RC Model Error Enumeration
///
pub enum RcxError {
    /// Malformed rule-file or measurement-log content
    Parse {
        msg: Option<String>,
        tp: RuleParseErrorType,
        /// Line number, one-based
        line: usize,
        /// Text of the offending line
        text: String,
        ctx: Vec<RuleParseContext>,
    },
    /// Layer-relationship index requested for an invalid (under, over) pair
    IndexOutOfRange {
        met: usize,
        under: usize,
        over: usize,
        layer_count: usize,
    },
    /// Wrapped errors, generally IO and from other crates
    Boxed(Box<dyn std::error::Error + Send + Sync>),
    /// String message-valued errors
    Str(String),
}
impl RcxError {
    /// Create a [RcxError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] of our [RcxError::Str] variant
    pub fn fail<T>(s: impl Into<String>) -> RcxResult<T> {
        Err(Self::msg(s))
    }
    /// Boolean indication of whether this is a [RcxError::Parse]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
impl std::fmt::Debug for RcxError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Parse {
                msg,
                tp,
                line,
                text,
                ctx,
            } => write!(
                f,
                "Rule Parse Error: {:?} at line {}: `{}` \n - {} \n - {:?}",
                tp,
                line,
                text,
                msg.as_deref().unwrap_or(""),
                ctx
            ),
            Self::IndexOutOfRange {
                met,
                under,
                over,
                layer_count,
            } => write!(
                f,
                "Invalid OverUnder Index: met={} under={} over={} layer_count={}",
                met, under, over, layer_count
            ),
            Self::Boxed(err) => std::fmt::Debug::fmt(err, f),
            Self::Str(err) => std::fmt::Display::fmt(err, f),
        }
    }
}
impl std::fmt::Display for RcxError {
    /// Delegates to the [Debug] implementation
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for RcxError {}
impl From<crate::utils::ser::Error> for RcxError {
    fn from(e: crate::utils::ser::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::io::Error> for RcxError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::str::Utf8Error> for RcxError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<rust_decimal::Error> for RcxError {
    fn from(e: rust_decimal::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<String> for RcxError {
    /// Also covers `derive_builder` build failures
    fn from(e: String) -> Self {
        Self::Str(e)
    }
}
impl From<&str> for RcxError {
    fn from(e: &str) -> Self {
        Self::Str(e.into())
    }
}

/// RC-Model Result Type
pub type RcxResult<T> = Result<T, RcxError>;

//!
//! # Extraction Errors
//!

// Local imports
use crate::models::RcxError;
use crate::utils::ser;

///
/// # Extraction Error Enumeration
///
pub enum ExtractError {
    /// Errors reading or querying the RC model
    Model(RcxError),
    /// No usable RC model: no rules, no corners, or no corner for a requested rate
    NoModel(String),
    /// Run stopped by its [crate::Cancel] flag
    Cancelled,
    /// Wrapped errors, generally IO and from other crates
    Boxed(Box<dyn std::error::Error + Send + Sync>),
    /// String message-valued errors
    Str(String),
}
impl ExtractError {
    /// Create a [ExtractError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] of our [ExtractError::Str] variant
    pub fn fail<T>(s: impl Into<String>) -> ExtractResult<T> {
        Err(Self::msg(s))
    }
}
impl std::fmt::Debug for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Model(err) => std::fmt::Debug::fmt(err, f),
            Self::NoModel(msg) => write!(f, "No usable RC model: {}", msg),
            Self::Cancelled => write!(f, "Extraction cancelled"),
            Self::Boxed(err) => std::fmt::Debug::fmt(err, f),
            Self::Str(err) => std::fmt::Display::fmt(err, f),
        }
    }
}
impl std::fmt::Display for ExtractError {
    /// Delegates to the [Debug] implementation
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for ExtractError {}
impl From<RcxError> for ExtractError {
    fn from(e: RcxError) -> Self {
        Self::Model(e)
    }
}
impl From<ser::Error> for ExtractError {
    fn from(e: ser::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<String> for ExtractError {
    /// Also covers `derive_builder` build failures
    fn from(e: String) -> Self {
        Self::Str(e)
    }
}
impl From<&str> for ExtractError {
    fn from(e: &str) -> Self {
        Self::Str(e.into())
    }
}

/// Extraction Result Type
pub type ExtractResult<T> = Result<T, ExtractError>;

//!
//! # RCX21 Internal Utilities Crate
//!
//! Shared helpers for the rcx21 crates:
//! keyword enumerations, serialized-file IO, and error-reporting helpers.
//!

pub mod enumstr;
pub use enumstr::*;

pub mod ser;
pub use ser::*;

pub mod error;
pub use error::*;

#[cfg(test)]
mod tests;

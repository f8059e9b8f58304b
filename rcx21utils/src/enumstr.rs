//!
//! # Keyword Enumeration Module
//!
//! Defines the [enumstr] macro and paired [EnumStr] trait,
//! which map fieldless enums to and from the keywords of text formats.
//! Rule files and measurement logs spell relationship kinds, flags and
//! record markers as fixed upper-case words; each such set is an [enumstr] enum.
//!
//! Example:
//!
//! ```rs
//! use rcx21utils::enumstr;
//!
//! enumstr!(
//! /// # Rule-File Flag States
//! FlagState {
//!     On: "ON",
//!     Off: "OFF",
//!  }
//! );
//! ```
//!

///
/// # Keyword Enumeration Trait
///
/// * `to_str` converts a variant to its keyword.
/// * `from_str` parses a keyword, returning `None` for anything else.
/// * `variants` lists every variant, in declaration order.
///
pub trait EnumStr: Sized + Copy + 'static {
    fn to_str(&self) -> &'static str;
    fn from_str(txt: &str) -> Option<Self>;
    fn variants() -> &'static [Self];
    /// Parse `txt` ignoring ASCII case.
    fn from_str_nocase(txt: &str) -> Option<Self> {
        Self::variants()
            .iter()
            .find(|v| v.to_str().eq_ignore_ascii_case(txt))
            .copied()
    }
}

///
/// # Keyword Enumeration Macro
///
/// Creates a fieldless `enum` which:
/// * Implements [EnumStr] for conversions to and from its keywords.
/// * Implements [std::fmt::Display], writing the keyword.
/// * Derives the ordering and hashing traits, so variants can key maps.
///
/// Callers must have `serde::{Serialize, Deserialize}` in scope.
///
#[macro_export]
macro_rules! enumstr {
    (   $(#[$meta: meta])*
        $enum_name: ident {
        $( $variant: ident : $strval: literal ),* $(,)?
    }) => {
        $(#[$meta])*
        #[allow(dead_code)]
        #[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $enum_name {
            $( #[doc=$strval]
                $variant ),*
        }
        impl $crate::EnumStr for $enum_name {
            fn to_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $strval),*,
                }
            }
            /// Case-sensitive keyword match.
            fn from_str(txt: &str) -> Option<Self> {
                match txt {
                    $( $strval => Some(Self::$variant)),*,
                    _ => None,
                }
            }
            fn variants() -> &'static [Self] {
                &[ $( Self::$variant ),* ]
            }
        }
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", $crate::EnumStr::to_str(self))
            }
        }
    }
}

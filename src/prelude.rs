// prelude.rs - Convenient re-exports for the idiomatic API.
//
//! # Prelude
//!
//! ```
//! use onigvm::prelude::*;
//! use onigvm::encodings::ONIG_ENCODING_ASCII;
//!
//! let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
//! b.plus(true, |b| b.class(b"0123456789"));
//! let re = Regex::from_program(b.build().unwrap());
//! let m = re.find("answer: 42").unwrap().unwrap();
//! assert_eq!(m.as_str(), Some("42"));
//! ```

pub use crate::api::{Captures, CapturesIter, FindIter, Match, Regex, RegexBuilder};
pub use crate::error::RegexError;
pub use crate::regcomp::ProgramBuilder;
pub use crate::regexec::CacheThreshold;

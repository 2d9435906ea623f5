//! # onigvm
//!
//! The backtracking matching engine of an Oniguruma/Onigmo-style regex
//! library, with linear-time memoization and SIMD-accelerated literal
//! search via [`memchr`](https://crates.io/crates/memchr).
//!
//! Programs are not parsed from pattern text. They are assembled with
//! [`regcomp::ProgramBuilder`], which emits the bytecode a regex compiler
//! would and derives the search metadata.
//!
//! ## Quick Start
//!
//! ```rust
//! use onigvm::prelude::*;
//! use onigvm::encodings::ONIG_ENCODING_UTF8;
//!
//! // [a-z]+
//! let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
//! b.plus(true, |b| b.class_ranges(&[], &[(b'a' as u32, b'z' as u32)], false));
//! let re = Regex::from_program(b.build().unwrap());
//!
//! let m = re.find("abc123").unwrap().unwrap();
//! assert_eq!(m.range(), 0..3);
//! ```
//!
//! ## Low-Level API
//!
//! ```rust
//! use onigvm::encodings::ONIG_ENCODING_UTF8;
//! use onigvm::oniguruma::*;
//! use onigvm::regcomp::ProgramBuilder;
//! use onigvm::regsearch::onig_search;
//!
//! // (THX)(\d+)
//! let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
//! b.capture(1, |b| b.literal(b"THX"));
//! b.capture(2, |b| b.plus(true, |b| b.class(b"0123456789")));
//! let reg = b.build().unwrap();
//!
//! let input = b"movie THX1138";
//! let mut region = OnigRegion::new();
//! let start = onig_search(&reg, input, input.len(), 0, input.len(), Some(&mut region), ONIG_OPTION_NONE);
//! assert_eq!(start, Ok(Some(6)));
//! assert_eq!(region.pos(2), Some((9, 13)));
//! ```
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`regcomp`] | Program assembler |
//! | [`regexec`] | VM executor and frame stack |
//! | [`regcache`] | Match cache analysis |
//! | [`regsearch`] | Search driver, scan |
//! | [`regint`] | Internal types and opcodes |
//! | [`oniguruma`] | Public types, options and regions |
//! | [`regenc`] | Encoding trait |
//! | [`regerror`] | Error messages |
//! | [`regtrav`] | Capture tree traversal |
//! | [`api`] | `Regex`, `Match`, `Captures` |

pub mod api;
pub mod encodings;
pub mod error;
pub mod oniguruma;
pub mod prelude;
pub mod regcache;
pub mod regcomp;
pub mod regenc;
pub mod regerror;
pub mod regexec;
pub mod regint;
pub mod regsearch;
pub mod regtrav;
pub mod unicode;

// api.rs - Idiomatic Rust API over assembled programs.
//
// Wraps onig_match/onig_search with Rust-native types: Regex,
// RegexBuilder, Match, Captures, FindIter. Every search reports engine
// failures (limits, interrupts, malformed input) as Err and a mismatch as
// Ok(None).

use std::ops::Range;

use crate::error::RegexError;
use crate::oniguruma::*;
use crate::regcomp::ProgramBuilder;
use crate::regenc::enclen;
use crate::regexec::{onig_match_with_param, CacheThreshold, MatchParam};
use crate::regint::RegexType;
use crate::regsearch::onig_search_with_param;

/// Search-time settings carried by a [`Regex`]. `None` keeps the global
/// default.
#[derive(Clone, Copy, Debug, Default)]
struct SearchConfig {
    options: OnigOptionType,
    retry_limit_in_match: Option<u64>,
    retry_limit_in_search: Option<u64>,
    match_stack_limit: Option<u32>,
    time_limit: Option<u64>,
    cache_threshold: Option<CacheThreshold>,
}

impl SearchConfig {
    fn param(&self) -> MatchParam<'static> {
        let mut param = MatchParam::new();
        if let Some(n) = self.retry_limit_in_match {
            param.set_retry_limit_in_match(n);
        }
        if let Some(n) = self.retry_limit_in_search {
            param.set_retry_limit_in_search(n);
        }
        if let Some(n) = self.match_stack_limit {
            param.set_match_stack_limit_size(n);
        }
        if let Some(ms) = self.time_limit {
            param.set_time_limit(ms);
        }
        if let Some(t) = self.cache_threshold {
            param.set_cache_threshold(t);
        }
        param
    }
}

/// A program ready to match.
///
/// # Examples
///
/// ```
/// use onigvm::api::Regex;
/// use onigvm::encodings::ONIG_ENCODING_UTF8;
/// use onigvm::regcomp::ProgramBuilder;
///
/// // [0-9]+
/// let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
/// b.plus(true, |b| b.class(b"0123456789"));
/// let re = Regex::from_program(b.build().unwrap());
///
/// let m = re.find("hello 42").unwrap().unwrap();
/// assert_eq!(m.as_str(), Some("42"));
/// assert_eq!(m.range(), 6..8);
/// ```
pub struct Regex {
    inner: RegexType,
    config: SearchConfig,
}

impl Regex {
    /// Wrap an assembled program with default search settings.
    pub fn from_program(program: RegexType) -> Regex {
        Regex {
            inner: program,
            config: SearchConfig::default(),
        }
    }

    /// Create a [`RegexBuilder`] to set search options and limits.
    pub fn builder(program: ProgramBuilder) -> RegexBuilder {
        RegexBuilder::new(program)
    }

    fn search(
        &self,
        text: &[u8],
        start: usize,
        range: usize,
        region: Option<&mut OnigRegion>,
    ) -> Result<Option<usize>, RegexError> {
        let mut param = self.config.param();
        onig_search_with_param(&self.inner, text, text.len(), start, range, region, self.config.options, &mut param)
    }

    fn search_match<'t>(&self, text: &'t [u8], start: usize, range: usize) -> Result<Option<Match<'t>>, RegexError> {
        let mut region = OnigRegion::new();
        Ok(self
            .search(text, start, range, Some(&mut region))?
            .and_then(|_| Match::from_region(text, &region)))
    }

    /// The first match in `text`.
    pub fn find<'t>(&self, text: &'t str) -> Result<Option<Match<'t>>, RegexError> {
        self.find_bytes(text.as_bytes())
    }

    /// The first match in `text` (as bytes).
    pub fn find_bytes<'t>(&self, text: &'t [u8]) -> Result<Option<Match<'t>>, RegexError> {
        self.search_match(text, 0, text.len())
    }

    /// The first match starting at or after byte `start`. Anchors and
    /// lookbehinds still see the text before `start`.
    pub fn find_at<'t>(&self, text: &'t [u8], start: usize) -> Result<Option<Match<'t>>, RegexError> {
        self.search_match(text, start, text.len())
    }

    /// The last match start in `text`, searching backwards from its end.
    pub fn rfind<'t>(&self, text: &'t [u8]) -> Result<Option<Match<'t>>, RegexError> {
        self.search_match(text, text.len(), 0)
    }

    /// Whether `text` matches anywhere.
    pub fn is_match(&self, text: &str) -> Result<bool, RegexError> {
        let text = text.as_bytes();
        Ok(self.search(text, 0, text.len(), None)?.is_some())
    }

    /// A match starting exactly at byte `at`.
    pub fn match_at<'t>(&self, text: &'t [u8], at: usize) -> Result<Option<Match<'t>>, RegexError> {
        let mut param = self.config.param();
        let end = onig_match_with_param(&self.inner, text, text.len(), at, None, self.config.options, &mut param)?;
        Ok(end.map(|end| Match { text, start: at, end }))
    }

    /// The first match with every capture group.
    pub fn captures<'t>(&'t self, text: &'t str) -> Result<Option<Captures<'t>>, RegexError> {
        self.captures_bytes(text.as_bytes())
    }

    /// The first match with every capture group (bytes).
    pub fn captures_bytes<'t>(&'t self, text: &'t [u8]) -> Result<Option<Captures<'t>>, RegexError> {
        let mut region = OnigRegion::new();
        Ok(self
            .search(text, 0, text.len(), Some(&mut region))?
            .map(|_| Captures { text, region }))
    }

    /// Every successive match in `text`; an empty match moves the next
    /// search one character on.
    pub fn find_iter<'r, 't>(&'r self, text: &'t str) -> FindIter<'r, 't> {
        self.find_iter_bytes(text.as_bytes())
    }

    pub fn find_iter_bytes<'r, 't>(&'r self, text: &'t [u8]) -> FindIter<'r, 't> {
        FindIter {
            regex: self,
            text,
            next_start: Some(0),
            param: self.config.param(),
        }
    }

    /// Number of capture groups (excluding group 0).
    pub fn captures_len(&self) -> usize {
        self.inner.num_mem
    }

    /// The underlying program, for the `onig_*` functions.
    pub fn as_raw(&self) -> &RegexType {
        &self.inner
    }
}

impl std::fmt::Debug for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regex")
            .field("ops", &self.inner.ops.len())
            .field("captures", &self.inner.num_mem)
            .finish_non_exhaustive()
    }
}

// === RegexBuilder ===

/// Assembles a [`Regex`] with search options and limits.
///
/// # Examples
///
/// ```
/// use onigvm::api::Regex;
/// use onigvm::encodings::ONIG_ENCODING_ASCII;
/// use onigvm::regcomp::ProgramBuilder;
///
/// let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
/// b.star(true, |b| b.literal(b"a"));
/// let re = Regex::builder(b).find_not_empty(true).build().unwrap();
/// assert_eq!(re.find("baa").unwrap().unwrap().range(), 1..3);
/// ```
pub struct RegexBuilder {
    program: ProgramBuilder,
    config: SearchConfig,
}

impl RegexBuilder {
    pub fn new(program: ProgramBuilder) -> Self {
        RegexBuilder {
            program,
            config: SearchConfig::default(),
        }
    }

    fn flag(mut self, flag: OnigOptionType, yes: bool) -> Self {
        if yes {
            self.config.options |= flag;
        } else {
            self.config.options &= !flag;
        }
        self
    }

    /// Prefer the longest match over the leftmost one.
    pub fn find_longest(self, yes: bool) -> Self {
        self.flag(ONIG_OPTION_FIND_LONGEST, yes)
    }

    /// Reject empty matches.
    pub fn find_not_empty(self, yes: bool) -> Self {
        self.flag(ONIG_OPTION_FIND_NOT_EMPTY, yes)
    }

    /// The text start is not a line start.
    pub fn not_bol(self, yes: bool) -> Self {
        self.flag(ONIG_OPTION_NOTBOL, yes)
    }

    /// The text end is not a line end.
    pub fn not_eol(self, yes: bool) -> Self {
        self.flag(ONIG_OPTION_NOTEOL, yes)
    }

    /// Reject subjects that are not valid in the program's encoding.
    pub fn check_validity(self, yes: bool) -> Self {
        self.flag(ONIG_OPTION_CHECK_VALIDITY_OF_STRING, yes)
    }

    /// Set a raw `ONIG_OPTION_*` search flag.
    pub fn option(mut self, flag: OnigOptionType) -> Self {
        self.config.options |= flag;
        self
    }

    pub fn retry_limit_in_match(mut self, n: u64) -> Self {
        self.config.retry_limit_in_match = Some(n);
        self
    }

    pub fn retry_limit_in_search(mut self, n: u64) -> Self {
        self.config.retry_limit_in_search = Some(n);
        self
    }

    pub fn match_stack_limit(mut self, frames: u32) -> Self {
        self.config.match_stack_limit = Some(frames);
        self
    }

    /// Deadline per call in milliseconds; 0 disables it.
    pub fn time_limit(mut self, msec: u64) -> Self {
        self.config.time_limit = Some(msec);
        self
    }

    pub fn cache_threshold(mut self, t: CacheThreshold) -> Self {
        self.config.cache_threshold = Some(t);
        self
    }

    /// Assemble the program into a [`Regex`].
    pub fn build(self) -> Result<Regex, RegexError> {
        Ok(Regex {
            inner: self.program.build()?,
            config: self.config,
        })
    }
}

// === Match ===

/// A single match result referencing the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'t> {
    text: &'t [u8],
    start: usize,
    end: usize,
}

impl<'t> Match<'t> {
    fn from_region(text: &'t [u8], region: &OnigRegion) -> Option<Self> {
        region.pos(0).map(|(start, end)| Match { text, start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte offset of the end of the match (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn as_bytes(&self) -> &'t [u8] {
        &self.text[self.start..self.end]
    }

    /// The matched text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'t str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// === Captures ===

/// All capture groups from a single match.
///
/// Group 0 is the entire match.
pub struct Captures<'t> {
    text: &'t [u8],
    region: OnigRegion,
}

impl<'t> Captures<'t> {
    /// Capture group `i`, or `None` if the group did not participate.
    pub fn get(&self, i: usize) -> Option<Match<'t>> {
        self.region.pos(i).map(|(start, end)| Match {
            text: self.text,
            start,
            end,
        })
    }

    /// Number of capture groups (including group 0).
    pub fn len(&self) -> usize {
        self.region.num_regs as usize
    }

    pub fn is_empty(&self) -> bool {
        self.region.num_regs == 0
    }

    /// Every recorded occurrence of the history groups, rooted at group 0.
    pub fn history(&self) -> Option<&OnigCaptureTreeNode> {
        self.region.history_root.as_deref()
    }

    /// The raw region, for the `onig_*` functions.
    pub fn region(&self) -> &OnigRegion {
        &self.region
    }

    pub fn iter(&self) -> CapturesIter<'_, 't> {
        CapturesIter {
            captures: self,
            index: 0,
        }
    }
}

impl std::fmt::Debug for Captures<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|m| m.map(|m| m.range()))).finish()
    }
}

// === CapturesIter ===

/// Iterator over capture groups in a [`Captures`].
pub struct CapturesIter<'c, 't> {
    captures: &'c Captures<'t>,
    index: usize,
}

impl<'c, 't> Iterator for CapturesIter<'c, 't> {
    type Item = Option<Match<'t>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.captures.len() {
            return None;
        }
        let m = self.captures.get(self.index);
        self.index += 1;
        Some(m)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.captures.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CapturesIter<'_, '_> {}

// === FindIter ===

/// Iterator over successive matches in a text. An engine error is yielded
/// once and ends the iteration.
pub struct FindIter<'r, 't> {
    regex: &'r Regex,
    text: &'t [u8],
    next_start: Option<usize>,
    param: MatchParam<'static>,
}

impl<'r, 't> Iterator for FindIter<'r, 't> {
    type Item = Result<Match<'t>, RegexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start.take()?;
        let text = self.text;
        let mut region = OnigRegion::new();
        let found = onig_search_with_param(
            &self.regex.inner,
            text,
            text.len(),
            start,
            text.len(),
            Some(&mut region),
            self.regex.config.options,
            &mut self.param,
        );
        let m = match found {
            Ok(Some(_)) => Match::from_region(text, &region)?,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        self.next_start = if !m.is_empty() {
            Some(m.end)
        } else if m.end < text.len() {
            Some(m.end + enclen(self.regex.inner.enc, text, m.end))
        } else {
            None
        };
        Some(Ok(m))
    }
}

// regint.rs - Internal types: OpCode, Operation, BitSet, MemStatus and the
// compiled program (RegexType).

use std::sync::OnceLock;

use crate::oniguruma::*;
use crate::regcache::CacheAnalysis;
use crate::regenc::OnigEncoding;

// === Config Constants ===
pub const INIT_MATCH_STACK_SIZE: usize = 160;
pub const DEFAULT_MATCH_STACK_LIMIT_SIZE: u32 = 0;
pub const DEFAULT_RETRY_LIMIT_IN_MATCH: u64 = 10_000_000;
pub const DEFAULT_RETRY_LIMIT_IN_SEARCH: u64 = 0;
pub const DEFAULT_TIME_LIMIT_MSEC: u64 = 0;
pub const CHECK_INTERRUPT_INTERVAL: u64 = 512;

// === Internal Constants ===
pub const CHAR_MAP_SIZE: usize = 256;
pub const INFINITE_LEN: OnigLen = ONIG_INFINITE_DISTANCE;
pub const INFINITE_REPEAT: i32 = REPEAT_INFINITE;

/// Literals shorter than this use the naive `Exact` scan.
pub const OPT_EXACT_MAXLEN: usize = 24;
pub const BM_MIN_LEN: usize = 3;
/// Backward Boyer-Moore only pays off on windows at least this wide.
pub const BM_BACKWARD_SEARCH_LENGTH_THRESHOLD: usize = 100;

#[inline]
pub fn is_infinite_repeat(n: i32) -> bool {
    n == INFINITE_REPEAT
}

// === Bytecode Types ===
pub type RelAddrType = i32;
pub type AbsAddrType = usize;
pub type LengthType = usize;
pub type MemNumType = usize;

// === MemStatus (bit status for captures) ===
pub type MemStatusType = u32;

pub const MEM_STATUS_BITS_NUM: usize = 32;

/// Groups past bit 31 share bit 0.
#[inline]
pub fn mem_status_at(stats: MemStatusType, n: usize) -> bool {
    if n < MEM_STATUS_BITS_NUM {
        (stats & (1u32 << n)) != 0
    } else {
        (stats & 1) != 0
    }
}

#[inline]
pub fn mem_status_on(stats: &mut MemStatusType, n: usize) {
    if n < MEM_STATUS_BITS_NUM {
        if n != 0 {
            *stats |= 1u32 << n;
        }
    } else {
        *stats |= 1;
    }
}

// === BitSet (256 bits for single-byte character classes) ===
pub const BITS_PER_BYTE: usize = 8;
pub const SINGLE_BYTE_SIZE: usize = 1 << BITS_PER_BYTE;
pub const BITS_IN_ROOM: usize = 32;
pub const BITSET_REAL_SIZE: usize = SINGLE_BYTE_SIZE / BITS_IN_ROOM;
pub type Bits = u32;
pub type BitSet = [Bits; BITSET_REAL_SIZE];

#[inline]
pub fn bs_room(pos: usize) -> usize {
    pos >> 5
}

#[inline]
pub fn bs_bit(pos: usize) -> u32 {
    1u32 << (pos & 0x1f)
}

#[inline]
pub fn bitset_at(bs: &BitSet, pos: usize) -> bool {
    (bs[bs_room(pos)] & bs_bit(pos)) != 0
}

#[inline]
pub fn bitset_set_bit(bs: &mut BitSet, pos: usize) {
    bs[bs_room(pos)] |= bs_bit(pos);
}

/// Sorted, non-overlapping code point ranges of a multi-byte class.
pub fn is_in_code_range(ranges: &[OnigCodeRange], code: OnigCodePoint) -> bool {
    ranges
        .binary_search_by(|r| {
            if r.to < code {
                std::cmp::Ordering::Less
            } else if r.from > code {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

// === Anchor Flags ===
pub const ANCR_BEGIN_BUF: u32 = 1 << 0;
pub const ANCR_BEGIN_LINE: u32 = 1 << 1;
pub const ANCR_BEGIN_POSITION: u32 = 1 << 2;
pub const ANCR_END_BUF: u32 = 1 << 3;
pub const ANCR_SEMI_END_BUF: u32 = 1 << 4;
pub const ANCR_END_LINE: u32 = 1 << 5;
pub const ANCR_WORD_BOUND: u32 = 1 << 6;
pub const ANCR_NOT_WORD_BOUND: u32 = 1 << 7;
pub const ANCR_WORD_BEGIN: u32 = 1 << 8;
pub const ANCR_WORD_END: u32 = 1 << 9;
pub const ANCR_PREC_READ: u32 = 1 << 10;
pub const ANCR_PREC_READ_NOT: u32 = 1 << 11;
pub const ANCR_LOOK_BEHIND: u32 = 1 << 12;
pub const ANCR_LOOK_BEHIND_NOT: u32 = 1 << 13;
pub const ANCR_ANYCHAR_STAR: u32 = 1 << 14;
pub const ANCR_ANYCHAR_STAR_ML: u32 = 1 << 15;
pub const ANCR_KEEP: u32 = 1 << 16;

/// Anchors the search driver knows how to exploit.
pub const ANCR_SEARCHABLE: u32 = ANCR_BEGIN_BUF
    | ANCR_BEGIN_POSITION
    | ANCR_BEGIN_LINE
    | ANCR_END_BUF
    | ANCR_SEMI_END_BUF
    | ANCR_END_LINE
    | ANCR_ANYCHAR_STAR
    | ANCR_ANYCHAR_STAR_ML;

// === OpCode Enum ===
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Finish = 0,
    End,

    Exact1,
    Exact2,
    Exact3,
    Exact4,
    Exact5,
    ExactN,
    ExactMb2N1,
    ExactMb2N2,
    ExactMb2N3,
    ExactMb2N,
    ExactMb3N,
    ExactMbN,
    Exact1Ic,
    ExactNIc,

    CClass,
    CClassMb,
    CClassMix,
    CClassNot,
    CClassMbNot,
    CClassMixNot,

    AnyChar,
    AnyCharMl,
    AnyCharStar,
    AnyCharMlStar,
    AnyCharStarPeekNext,
    AnyCharMlStarPeekNext,

    Word,
    NotWord,
    WordBound,
    NotWordBound,
    WordBegin,
    WordEnd,

    AsciiWord,
    NotAsciiWord,
    AsciiWordBound,
    NotAsciiWordBound,
    AsciiWordBegin,
    AsciiWordEnd,

    BeginBuf,
    EndBuf,
    BeginLine,
    EndLine,
    SemiEndBuf,
    BeginPosition,

    Backref1,
    Backref2,
    BackrefN,
    BackrefNIc,
    BackrefMulti,
    BackrefMultiIc,
    BackrefWithLevel,
    /// Succeeds without consuming when any listed group is set.
    BackrefCheck,

    MemoryStart,
    MemoryStartPush,
    MemoryEndPush,
    MemoryEndPushRec,
    MemoryEnd,
    MemoryEndRec,

    Keep,

    Fail,
    Jump,
    Push,
    Pop,
    PushOrJumpExact1,
    PushIfPeekNext,
    Repeat,
    RepeatNg,
    RepeatInc,
    RepeatIncNg,
    RepeatIncSg,
    RepeatIncNgSg,
    NullCheckStart,
    NullCheckEnd,
    NullCheckEndMemst,
    NullCheckEndMemstPush,

    PushPos,
    PopPos,
    PushPosNot,
    FailPos,
    PushStopBt,
    PopStopBt,
    LookBehind,
    PushLookBehindNot,
    FailLookBehindNot,
    PushAbsentPos,
    Absent,
    AbsentEnd,

    Call,
    Return,

    Condition,
}

impl OpCode {
    pub fn is_backref(self) -> bool {
        matches!(
            self,
            OpCode::Backref1
                | OpCode::Backref2
                | OpCode::BackrefN
                | OpCode::BackrefNIc
                | OpCode::BackrefMulti
                | OpCode::BackrefMultiIc
                | OpCode::BackrefWithLevel
                | OpCode::BackrefCheck
        )
    }

    pub fn is_repeat_inc(self) -> bool {
        matches!(
            self,
            OpCode::RepeatInc | OpCode::RepeatIncNg | OpCode::RepeatIncSg | OpCode::RepeatIncNgSg
        )
    }
}

// === Stack Pop Level ===
/// How much bookkeeping a failure pop has to undo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StackPopLevel {
    /// No capture or repeat frames exist.
    Free,
    /// Only capture-start frames exist.
    MemStart,
    All,
}

// === Optimize Type ===
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizeType {
    None,
    /// Naive scan for the literal.
    Exact,
    /// Sunday quick search.
    ExactBm,
    /// Quick search stepping by character boundaries.
    ExactBmNotRev,
    ExactIc,
    ExactBmIc,
    ExactBmNotRevIc,
    /// "Can start a match" byte map.
    Map,
}

// === Operation (compiled instruction) ===
#[derive(Clone, Debug)]
pub struct Operation {
    pub opcode: OpCode,
    pub payload: OperationPayload,
}

impl Operation {
    pub fn new(opcode: OpCode, payload: OperationPayload) -> Self {
        Operation { opcode, payload }
    }

    pub fn plain(opcode: OpCode) -> Self {
        Operation {
            opcode,
            payload: OperationPayload::None,
        }
    }
}

/// Operands of one instruction. Relative addresses count from the
/// instruction's own index.
#[derive(Clone, Debug)]
pub enum OperationPayload {
    None,
    /// Literal bytes; pre-folded for the `Ic` forms.
    Exact {
        s: Vec<u8>,
    },
    CClass {
        bsp: Box<BitSet>,
    },
    CClassMb {
        mb: Vec<OnigCodeRange>,
    },
    CClassMix {
        bsp: Box<BitSet>,
        mb: Vec<OnigCodeRange>,
    },
    AnyCharStarPeekNext {
        c: u8,
    },
    MemNum {
        num: MemNumType,
    },
    BackrefMulti {
        ns: Vec<MemNumType>,
    },
    BackrefWithLevel {
        ignore_case: bool,
        nest_level: i32,
        ns: Vec<MemNumType>,
    },
    Jump {
        addr: RelAddrType,
    },
    PushOrJumpExact1 {
        addr: RelAddrType,
        c: u8,
    },
    Repeat {
        id: usize,
        addr: RelAddrType,
    },
    RepeatInc {
        id: usize,
    },
    LookBehind {
        len: LengthType,
    },
    PushLookBehindNot {
        addr: RelAddrType,
        len: LengthType,
    },
    Call {
        addr: AbsAddrType,
    },
    Condition {
        mem: MemNumType,
        addr: RelAddrType,
    },
}

// === Compiled program ===

/// An immutable compiled matcher: instructions plus the metadata the VM
/// and the search driver consult.
pub struct RegexType {
    pub ops: Vec<Operation>,
    pub num_mem: usize,
    pub num_repeat: usize,
    pub num_null_check: usize,
    pub num_call: usize,
    /// Groups whose every occurrence is recorded in the capture tree.
    pub capture_history: MemStatusType,
    /// Groups whose start is kept on the stack (`MemoryStartPush`).
    pub bt_mem_start: MemStatusType,
    /// Groups whose end is kept on the stack (`MemoryEndPush`).
    pub bt_mem_end: MemStatusType,
    pub stack_pop_level: StackPopLevel,
    pub repeat_range: Vec<OnigRepeatRange>,

    pub enc: OnigEncoding,
    pub options: OnigOptionType,
    pub case_fold_flag: OnigCaseFoldType,

    // optimization info
    pub optimize: OptimizeType,
    pub threshold_len: usize,
    pub anchor: u32,
    pub anchor_dmin: OnigLen,
    pub anchor_dmax: OnigLen,
    pub sub_anchor: u32,
    pub exact: Vec<u8>,
    pub map: [u8; CHAR_MAP_SIZE],
    /// Forward skip table for the Boyer-Moore variants.
    pub bm_skip: Vec<usize>,
    pub dmin: OnigLen,
    pub dmax: OnigLen,

    pub(crate) int_map_backward: OnceLock<Vec<usize>>,
    pub(crate) cache_analysis: OnceLock<CacheAnalysis>,
}

impl RegexType {
    /// An empty program for `enc`; the assembler fills it in.
    pub(crate) fn empty(enc: OnigEncoding, options: OnigOptionType) -> Self {
        RegexType {
            ops: Vec::new(),
            num_mem: 0,
            num_repeat: 0,
            num_null_check: 0,
            num_call: 0,
            capture_history: 0,
            bt_mem_start: 0,
            bt_mem_end: 0,
            stack_pop_level: StackPopLevel::Free,
            repeat_range: Vec::new(),
            enc,
            options,
            case_fold_flag: ONIGENC_CASE_FOLD_DEFAULT,
            optimize: OptimizeType::None,
            threshold_len: 0,
            anchor: 0,
            anchor_dmin: 0,
            anchor_dmax: 0,
            sub_anchor: 0,
            exact: Vec::new(),
            map: [0; CHAR_MAP_SIZE],
            bm_skip: Vec::new(),
            dmin: 0,
            dmax: 0,
            int_map_backward: OnceLock::new(),
            cache_analysis: OnceLock::new(),
        }
    }

    pub fn num_mem(&self) -> usize {
        self.num_mem
    }

    pub fn encoding(&self) -> OnigEncoding {
        self.enc
    }
}

// === Option helpers ===
#[inline]
pub fn opton_multiline(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_MULTILINE) != 0
}

#[inline]
pub fn opton_find_longest(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_FIND_LONGEST) != 0
}

#[inline]
pub fn opton_find_not_empty(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_FIND_NOT_EMPTY) != 0
}

/// Either of the options that make the VM look past the first success.
#[inline]
pub fn opton_find_condition(option: OnigOptionType) -> bool {
    (option & (ONIG_OPTION_FIND_LONGEST | ONIG_OPTION_FIND_NOT_EMPTY)) != 0
}

#[inline]
pub fn opton_notbol(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NOTBOL) != 0
}

#[inline]
pub fn opton_noteol(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NOTEOL) != 0
}

#[inline]
pub fn opton_not_begin_string(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NOT_BEGIN_STRING) != 0
}

#[inline]
pub fn opton_not_end_string(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NOT_END_STRING) != 0
}

#[inline]
pub fn opton_not_begin_position(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NOT_BEGIN_POSITION) != 0
}

#[inline]
pub fn opton_newline_crlf(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_NEWLINE_CRLF) != 0
}

#[inline]
pub fn opton_check_validity_of_string(option: OnigOptionType) -> bool {
    (option & ONIG_OPTION_CHECK_VALIDITY_OF_STRING) != 0
}

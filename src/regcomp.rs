// regcomp.rs - Program assembler.
//
// ProgramBuilder emits the bytecode layouts a regex compiler produces:
// literals, classes, alternations, loops with null checks, captures,
// lookarounds, calls. It also derives the metadata the VM and the search
// driver read. It never parses pattern syntax: programs are written out
// through its emitters or structured helpers, and every jump target is a
// symbolic Label resolved in build().

use crate::error::RegexError;
use crate::oniguruma::*;
use crate::regenc::*;
use crate::regint::*;

// ============================================================================
// Labels and fixups
// ============================================================================

/// A jump target inside the program being assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(usize);

/// An instruction whose address operand is resolved on build.
#[derive(Clone, Copy, Debug)]
struct Fixup {
    op: usize,
    label: Label,
}

/// Literal search hint waiting for build().
#[derive(Clone, Debug)]
enum OptimizeHint {
    None,
    Exact { literal: Vec<u8>, ignore_case: bool },
    Map { bytes: Vec<u8> },
}

/// Assembles a [`RegexType`].
///
/// ```
/// use onigvm::encodings::ONIG_ENCODING_ASCII;
/// use onigvm::regcomp::ProgramBuilder;
///
/// // (a|b)+c
/// let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
/// b.plus(true, |b| b.capture(1, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"b"))));
/// b.literal(b"c");
/// let reg = b.build().unwrap();
/// assert_eq!(reg.num_mem, 1);
/// ```
pub struct ProgramBuilder {
    reg: RegexType,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    /// Whether the sequence being emitted always consumes input.
    consumes: bool,
    in_alt: usize,
    in_not: usize,
    in_var_repeat: usize,
    in_repeat: usize,
    recursive: MemStatusType,
    hint: OptimizeHint,
    opt_dmin: OnigLen,
    opt_dmax: OnigLen,
    threshold_len: Option<usize>,
    error: Option<RegexError>,
}

impl ProgramBuilder {
    pub fn new(enc: OnigEncoding) -> Self {
        Self::with_options(enc, ONIG_OPTION_NONE)
    }

    /// `options` become the program's compile-time options (multiline,
    /// ignore case, find longest, ...).
    pub fn with_options(enc: OnigEncoding, options: OnigOptionType) -> Self {
        ProgramBuilder {
            reg: RegexType::empty(enc, options),
            labels: Vec::new(),
            fixups: Vec::new(),
            consumes: false,
            in_alt: 0,
            in_not: 0,
            in_var_repeat: 0,
            in_repeat: 0,
            recursive: 0,
            hint: OptimizeHint::None,
            opt_dmin: 0,
            opt_dmax: 0,
            threshold_len: None,
            error: None,
        }
    }

    pub fn set_case_fold_flag(&mut self, flag: OnigCaseFoldType) {
        self.reg.case_fold_flag = flag;
    }

    /// Records the first assembly error; build() reports it.
    fn fail_with(&mut self, e: RegexError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    // ========================================================================
    // Low-level emission
    // ========================================================================

    fn add_op(&mut self, opcode: OpCode, payload: OperationPayload) -> usize {
        let idx = self.reg.ops.len();
        self.reg.ops.push(Operation::new(opcode, payload));
        idx
    }

    fn add_op_to(&mut self, opcode: OpCode, payload: OperationPayload, label: Label) -> usize {
        let idx = self.add_op(opcode, payload);
        self.fixups.push(Fixup { op: idx, label });
        idx
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next instruction emitted.
    pub fn bind(&mut self, label: Label) {
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => *slot = Some(self.reg.ops.len()),
            _ => self.fail_with(RegexError::InvalidArgument),
        }
    }

    /// Emits an opcode that takes no operand (anchors, scope ends, `Fail`,
    /// `Pop`, `Return`, ...).
    pub fn emit(&mut self, opcode: OpCode) {
        if !takes_no_operand(opcode) {
            self.fail_with(RegexError::InvalidArgument);
            return;
        }
        self.add_op(opcode, OperationPayload::None);
    }

    pub fn jump(&mut self, label: Label) {
        self.add_op_to(OpCode::Jump, OperationPayload::Jump { addr: 0 }, label);
    }

    /// Pushes a choice resuming at `label`.
    pub fn push(&mut self, label: Label) {
        self.add_op_to(OpCode::Push, OperationPayload::Jump { addr: 0 }, label);
    }

    pub fn pop(&mut self) {
        self.emit(OpCode::Pop);
    }

    pub fn fail(&mut self) {
        self.emit(OpCode::Fail);
    }

    /// Pushes a choice at `label` when the next byte is `c`, otherwise
    /// jumps there.
    pub fn push_or_jump_exact1(&mut self, label: Label, c: u8) {
        self.add_op_to(
            OpCode::PushOrJumpExact1,
            OperationPayload::PushOrJumpExact1 { addr: 0, c },
            label,
        );
    }

    /// Pushes a choice at `label` only when the next byte is `c`.
    pub fn push_if_peek_next(&mut self, label: Label, c: u8) {
        self.add_op_to(
            OpCode::PushIfPeekNext,
            OperationPayload::PushOrJumpExact1 { addr: 0, c },
            label,
        );
    }

    pub fn call(&mut self, label: Label) {
        self.reg.num_call += 1;
        self.add_op_to(OpCode::Call, OperationPayload::Call { addr: 0 }, label);
    }

    pub fn ret(&mut self) {
        self.emit(OpCode::Return);
    }

    pub fn memory_start(&mut self, n: usize) {
        if self.note_group(n) {
            if self.in_alt > 0 || self.in_not > 0 || self.in_var_repeat > 0 {
                mem_status_on(&mut self.reg.bt_mem_start, n);
            }
            self.add_op(OpCode::MemoryStart, OperationPayload::MemNum { num: n });
        }
    }

    pub fn memory_end(&mut self, n: usize) {
        if self.note_group(n) {
            self.add_op(OpCode::MemoryEnd, OperationPayload::MemNum { num: n });
        }
    }

    fn note_group(&mut self, n: usize) -> bool {
        if n == 0 {
            self.fail_with(RegexError::InvalidArgument);
            return false;
        }
        self.reg.num_mem = self.reg.num_mem.max(n);
        true
    }

    /// Registers a counted repeat and returns its id.
    pub fn new_repeat(&mut self, lower: i32, upper: i32) -> usize {
        if lower < 0 || (!is_infinite_repeat(upper) && upper < lower) {
            self.fail_with(RegexError::InvalidArgument);
        }
        self.reg.repeat_range.push(OnigRepeatRange { lower, upper });
        self.reg.num_repeat = self.reg.repeat_range.len();
        self.reg.num_repeat - 1
    }

    pub fn repeat_start(&mut self, id: usize, exit: Label, greedy: bool) {
        let opcode = if greedy { OpCode::Repeat } else { OpCode::RepeatNg };
        self.add_op_to(opcode, OperationPayload::Repeat { id, addr: 0 }, exit);
    }

    /// `search` selects the increments that locate their counter by
    /// scanning the stack, needed when the repeat can be re-entered before
    /// it finished.
    pub fn repeat_inc(&mut self, id: usize, greedy: bool, search: bool) {
        let opcode = match (greedy, search) {
            (true, false) => OpCode::RepeatInc,
            (false, false) => OpCode::RepeatIncNg,
            (true, true) => OpCode::RepeatIncSg,
            (false, true) => OpCode::RepeatIncNgSg,
        };
        self.add_op(opcode, OperationPayload::RepeatInc { id });
    }

    pub fn push_pos_not(&mut self, exit: Label) {
        self.add_op_to(OpCode::PushPosNot, OperationPayload::Jump { addr: 0 }, exit);
    }

    pub fn look_behind(&mut self, len: usize) {
        self.add_op(OpCode::LookBehind, OperationPayload::LookBehind { len });
    }

    pub fn push_look_behind_not(&mut self, exit: Label, len: usize) {
        self.add_op_to(
            OpCode::PushLookBehindNot,
            OperationPayload::PushLookBehindNot { addr: 0, len },
            exit,
        );
    }

    pub fn absent_op(&mut self, exit: Label) {
        self.add_op_to(OpCode::Absent, OperationPayload::Jump { addr: 0 }, exit);
    }

    /// Jumps to `label` when group `n` is unset.
    pub fn condition_op(&mut self, n: usize, label: Label) {
        self.add_op_to(OpCode::Condition, OperationPayload::Condition { mem: n, addr: 0 }, label);
    }

    /// Allocates an id for a `null_check_start`/`null_check_end` pair.
    pub fn new_null_check(&mut self) -> usize {
        self.reg.num_null_check += 1;
        self.reg.num_null_check - 1
    }

    pub fn null_check_start(&mut self, id: usize) {
        self.add_op(OpCode::NullCheckStart, OperationPayload::MemNum { num: id });
    }

    /// `opcode` is one of the `NullCheckEnd*` forms.
    pub fn null_check_end(&mut self, id: usize, opcode: OpCode) {
        if !matches!(
            opcode,
            OpCode::NullCheckEnd | OpCode::NullCheckEndMemst | OpCode::NullCheckEndMemstPush
        ) {
            self.fail_with(RegexError::InvalidArgument);
            return;
        }
        self.add_op(opcode, OperationPayload::MemNum { num: id });
    }

    // ========================================================================
    // Characters
    // ========================================================================

    pub fn literal(&mut self, s: &[u8]) {
        if s.is_empty() {
            return;
        }
        let (mb_len, str_len) = literal_shape(self.reg.enc, s);
        let opcode = select_str_opcode(mb_len, str_len);
        self.add_op(opcode, OperationPayload::Exact { s: s.to_vec() });
        self.consumes = true;
    }

    /// Case-insensitive literal; `s` is folded with the program's case-fold
    /// flag.
    pub fn literal_ic(&mut self, s: &[u8]) {
        if s.is_empty() {
            return;
        }
        let enc = self.reg.enc;
        let folded = fold_bytes(enc, self.reg.case_fold_flag, s);
        let opcode = if enc.mbc_enc_len(s) == s.len() {
            OpCode::Exact1Ic
        } else {
            OpCode::ExactNIc
        };
        self.add_op(opcode, OperationPayload::Exact { s: folded });
        self.consumes = true;
    }

    /// Class of single bytes.
    pub fn class(&mut self, bytes: &[u8]) {
        self.class_ranges(bytes, &[], false);
    }

    pub fn class_not(&mut self, bytes: &[u8]) {
        self.class_ranges(bytes, &[], true);
    }

    /// Class of single bytes plus code point ranges. Ranges that encode as
    /// one byte are folded into the byte set.
    pub fn class_ranges(&mut self, bytes: &[u8], ranges: &[(OnigCodePoint, OnigCodePoint)], not: bool) {
        let enc = self.reg.enc;
        let mut bs: BitSet = [0; BITSET_REAL_SIZE];
        for &b in bytes {
            bitset_set_bit(&mut bs, b as usize);
        }
        let mut mb: Vec<OnigCodeRange> = Vec::new();
        for &(from, to) in ranges {
            if from > to {
                self.fail_with(RegexError::InvalidArgument);
                return;
            }
            let mut from = from;
            while from <= to && from < SINGLE_BYTE_SIZE as OnigCodePoint && enc.code_to_mbclen(from) == Some(1) {
                bitset_set_bit(&mut bs, from as usize);
                from += 1;
            }
            if from <= to {
                mb.push(OnigCodeRange { from, to });
            }
        }
        mb.sort_by_key(|r| r.from);
        let mut merged: Vec<OnigCodeRange> = Vec::with_capacity(mb.len());
        for r in mb {
            match merged.last_mut() {
                Some(last) if r.from <= last.to.saturating_add(1) => last.to = last.to.max(r.to),
                _ => merged.push(r),
            }
        }

        let has_sb = bs.iter().any(|&w| w != 0);
        if merged.is_empty() {
            let opcode = if not { OpCode::CClassNot } else { OpCode::CClass };
            self.add_op(opcode, OperationPayload::CClass { bsp: Box::new(bs) });
        } else if has_sb {
            let opcode = if not { OpCode::CClassMixNot } else { OpCode::CClassMix };
            self.add_op(opcode, OperationPayload::CClassMix { bsp: Box::new(bs), mb: merged });
        } else {
            let opcode = if not { OpCode::CClassMbNot } else { OpCode::CClassMb };
            self.add_op(opcode, OperationPayload::CClassMb { mb: merged });
        }
        self.consumes = true;
    }

    /// `.`; matches newline too under the multiline option.
    pub fn any_char(&mut self) {
        let opcode = if opton_multiline(self.reg.options) {
            OpCode::AnyCharMl
        } else {
            OpCode::AnyChar
        };
        self.add_op(opcode, OperationPayload::None);
        self.consumes = true;
    }

    pub fn any_char_ml(&mut self) {
        self.add_op(OpCode::AnyCharMl, OperationPayload::None);
        self.consumes = true;
    }

    /// `.*` as a single instruction.
    pub fn any_char_star(&mut self) {
        let opcode = if opton_multiline(self.reg.options) {
            OpCode::AnyCharMlStar
        } else {
            OpCode::AnyCharStar
        };
        self.add_op(opcode, OperationPayload::None);
    }

    /// `.*` followed by the byte `c`: only positions before a `c` are
    /// worth a choice.
    pub fn any_char_star_peek_next(&mut self, c: u8) {
        let opcode = if opton_multiline(self.reg.options) {
            OpCode::AnyCharMlStarPeekNext
        } else {
            OpCode::AnyCharStarPeekNext
        };
        self.add_op(opcode, OperationPayload::AnyCharStarPeekNext { c });
    }

    pub fn word(&mut self) {
        self.add_op(OpCode::Word, OperationPayload::None);
        self.consumes = true;
    }

    pub fn not_word(&mut self) {
        self.add_op(OpCode::NotWord, OperationPayload::None);
        self.consumes = true;
    }

    pub fn ascii_word(&mut self) {
        self.add_op(OpCode::AsciiWord, OperationPayload::None);
        self.consumes = true;
    }

    pub fn not_ascii_word(&mut self) {
        self.add_op(OpCode::NotAsciiWord, OperationPayload::None);
        self.consumes = true;
    }

    // ========================================================================
    // Anchors
    // ========================================================================

    pub fn begin_buf(&mut self) {
        self.emit(OpCode::BeginBuf);
    }

    pub fn end_buf(&mut self) {
        self.emit(OpCode::EndBuf);
    }

    pub fn begin_line(&mut self) {
        self.emit(OpCode::BeginLine);
    }

    pub fn end_line(&mut self) {
        self.emit(OpCode::EndLine);
    }

    pub fn semi_end_buf(&mut self) {
        self.emit(OpCode::SemiEndBuf);
    }

    pub fn begin_position(&mut self) {
        self.emit(OpCode::BeginPosition);
    }

    pub fn word_bound(&mut self) {
        self.emit(OpCode::WordBound);
    }

    pub fn not_word_bound(&mut self) {
        self.emit(OpCode::NotWordBound);
    }

    pub fn word_begin(&mut self) {
        self.emit(OpCode::WordBegin);
    }

    pub fn word_end(&mut self) {
        self.emit(OpCode::WordEnd);
    }

    pub fn ascii_word_bound(&mut self) {
        self.emit(OpCode::AsciiWordBound);
    }

    pub fn ascii_word_end(&mut self) {
        self.emit(OpCode::AsciiWordEnd);
    }

    /// `\K`
    pub fn keep(&mut self) {
        self.emit(OpCode::Keep);
    }

    // ========================================================================
    // Groups and references
    // ========================================================================

    /// Capture group `n` around `body`.
    pub fn capture(&mut self, n: usize, body: impl FnOnce(&mut Self)) {
        self.memory_start(n);
        let consumes = self.sub(body);
        self.memory_end(n);
        self.consumes |= consumes;
    }

    /// Records every occurrence of group `n` (1..=31) in the capture tree.
    pub fn capture_history(&mut self, n: usize) {
        if n == 0 || n > ONIG_MAX_CAPTURE_HISTORY_GROUP {
            self.fail_with(RegexError::InvalidArgument);
            return;
        }
        mem_status_on(&mut self.reg.capture_history, n);
    }

    /// Group `n` is entered recursively through a call.
    pub fn mark_recursive(&mut self, n: usize) {
        mem_status_on(&mut self.recursive, n);
    }

    pub fn backref(&mut self, n: usize) {
        match n {
            0 => self.fail_with(RegexError::InvalidArgument),
            1 => {
                self.add_op(OpCode::Backref1, OperationPayload::None);
            }
            2 => {
                self.add_op(OpCode::Backref2, OperationPayload::None);
            }
            _ => {
                self.add_op(OpCode::BackrefN, OperationPayload::MemNum { num: n });
            }
        }
    }

    pub fn backref_ic(&mut self, n: usize) {
        if n == 0 {
            self.fail_with(RegexError::InvalidArgument);
            return;
        }
        self.add_op(OpCode::BackrefNIc, OperationPayload::MemNum { num: n });
    }

    /// Reference to whichever of `ns` matches first (named groups sharing
    /// a name).
    pub fn backref_multi(&mut self, ns: &[usize], ignore_case: bool) {
        let opcode = if ignore_case {
            OpCode::BackrefMultiIc
        } else {
            OpCode::BackrefMulti
        };
        self.add_op(opcode, OperationPayload::BackrefMulti { ns: ns.to_vec() });
    }

    /// Reference resolved at call nesting level `level` relative to the
    /// current one.
    pub fn backref_with_level(&mut self, ns: &[usize], level: i32, ignore_case: bool) {
        for &n in ns {
            mem_status_on(&mut self.reg.bt_mem_start, n);
            mem_status_on(&mut self.reg.bt_mem_end, n);
        }
        self.add_op(
            OpCode::BackrefWithLevel,
            OperationPayload::BackrefWithLevel {
                ignore_case,
                nest_level: level,
                ns: ns.to_vec(),
            },
        );
    }

    /// Zero-width test that any of `ns` is set.
    pub fn backref_check(&mut self, ns: &[usize]) {
        self.add_op(OpCode::BackrefCheck, OperationPayload::BackrefMulti { ns: ns.to_vec() });
    }

    // ========================================================================
    // Alternation
    // ========================================================================

    /// `a|b`
    pub fn alt(&mut self, a: impl FnOnce(&mut Self), b: impl FnOnce(&mut Self)) {
        let next = self.new_label();
        let end = self.new_label();
        self.in_alt += 1;
        self.push(next);
        let ca = self.sub(a);
        self.jump(end);
        self.bind(next);
        let cb = self.sub(b);
        self.bind(end);
        self.in_alt -= 1;
        self.consumes |= ca && cb;
    }

    /// `b0|b1|...|bn`
    pub fn alternation(&mut self, branches: &[&dyn Fn(&mut ProgramBuilder)]) {
        let Some((last, init)) = branches.split_last() else {
            return;
        };
        let end = self.new_label();
        let mut all_consume = true;
        self.in_alt += 1;
        for branch in init {
            let next = self.new_label();
            self.push(next);
            all_consume &= self.sub(|b| branch(b));
            self.jump(end);
            self.bind(next);
        }
        all_consume &= self.sub(|b| last(b));
        self.bind(end);
        self.in_alt -= 1;
        self.consumes |= all_consume;
    }

    // ========================================================================
    // Quantifiers
    // ========================================================================

    /// `body*` or `body*?`
    pub fn star(&mut self, greedy: bool, body: impl FnOnce(&mut Self)) {
        let top = self.new_label();
        let exit = self.new_label();
        self.enter_repeat(true);
        if greedy {
            self.bind(top);
            self.push(exit);
            self.loop_body(true, body);
            self.jump(top);
            self.bind(exit);
        } else {
            let test = self.new_label();
            self.jump(test);
            self.bind(top);
            self.loop_body(true, body);
            self.bind(test);
            self.push(top);
        }
        self.leave_repeat(true);
    }

    /// `body+` or `body+?`
    pub fn plus(&mut self, greedy: bool, body: impl FnOnce(&mut Self)) {
        let top = self.new_label();
        self.enter_repeat(true);
        let consumes = if greedy {
            let entry = self.new_label();
            let exit = self.new_label();
            self.jump(entry);
            self.bind(top);
            self.push(exit);
            self.bind(entry);
            let c = self.loop_body(true, body);
            self.jump(top);
            self.bind(exit);
            c
        } else {
            self.bind(top);
            let c = self.loop_body(true, body);
            self.push(top);
            c
        };
        self.leave_repeat(true);
        self.consumes |= consumes;
    }

    /// `body?` or `body??`
    pub fn optional(&mut self, greedy: bool, body: impl FnOnce(&mut Self)) {
        let exit = self.new_label();
        self.enter_repeat(true);
        if greedy {
            self.push(exit);
            self.sub(body);
        } else {
            let take = self.new_label();
            self.push(take);
            self.jump(exit);
            self.bind(take);
            self.sub(body);
        }
        self.bind(exit);
        self.leave_repeat(true);
    }

    /// `body{lower,upper}` with a counter; `upper` is [`REPEAT_INFINITE`]
    /// for no upper bound.
    pub fn repeat(&mut self, lower: i32, upper: i32, greedy: bool, body: impl FnOnce(&mut Self)) {
        if upper == 0 {
            return;
        }
        let infinite = is_infinite_repeat(upper);
        let id = self.new_repeat(lower, upper);
        let exit = self.new_label();
        let var = infinite || upper != lower;
        let search = self.in_repeat > 0;
        self.enter_repeat(var);
        self.repeat_start(id, exit, greedy);
        let consumes = self.loop_body(infinite, body);
        self.repeat_inc(id, greedy, search);
        self.bind(exit);
        self.leave_repeat(var);
        self.consumes |= consumes && lower > 0;
    }

    /// `(?:c...)*`: the body can only start with the byte `c`.
    pub fn star_head_exact(&mut self, c: u8, body: impl FnOnce(&mut Self)) {
        let top = self.new_label();
        let exit = self.new_label();
        self.enter_repeat(true);
        self.bind(top);
        self.push_or_jump_exact1(exit, c);
        self.loop_body(true, body);
        self.jump(top);
        self.bind(exit);
        self.leave_repeat(true);
    }

    /// `body*c`: leaving the loop only pays off before a `c`.
    pub fn star_peek_next(&mut self, c: u8, body: impl FnOnce(&mut Self)) {
        let top = self.new_label();
        let exit = self.new_label();
        self.enter_repeat(true);
        self.bind(top);
        self.push_if_peek_next(exit, c);
        self.loop_body(true, body);
        self.jump(top);
        self.bind(exit);
        self.leave_repeat(true);
    }

    fn enter_repeat(&mut self, var: bool) {
        self.in_repeat += 1;
        if var {
            self.in_var_repeat += 1;
        }
    }

    fn leave_repeat(&mut self, var: bool) {
        self.in_repeat -= 1;
        if var {
            self.in_var_repeat -= 1;
        }
    }

    /// Emits `body` and reports whether it always consumes input.
    fn sub(&mut self, body: impl FnOnce(&mut Self)) -> bool {
        let outer = std::mem::replace(&mut self.consumes, false);
        body(self);
        std::mem::replace(&mut self.consumes, outer)
    }

    /// Emits a loop body. An unbounded loop whose body can match empty is
    /// wrapped in a null check; the check's start is spliced in front of
    /// the body once its emptiness is known.
    fn loop_body(&mut self, unbounded: bool, body: impl FnOnce(&mut Self)) -> bool {
        let at = self.reg.ops.len();
        let first_label = self.labels.len();
        let consumes = self.sub(body);
        if unbounded && !consumes {
            let id = self.new_null_check();
            let mut end_op = OpCode::NullCheckEnd;
            let mut groups: Vec<usize> = Vec::new();
            for op in &self.reg.ops[at..] {
                match (op.opcode, &op.payload) {
                    (OpCode::Call, _) => end_op = OpCode::NullCheckEndMemstPush,
                    (OpCode::MemoryStart, OperationPayload::MemNum { num }) => {
                        if end_op == OpCode::NullCheckEnd {
                            end_op = OpCode::NullCheckEndMemst;
                        }
                        groups.push(*num);
                    }
                    _ => {}
                }
            }
            // the capture-aware check reads the groups' start frames
            for n in groups {
                mem_status_on(&mut self.reg.bt_mem_start, n);
            }
            self.insert_op(
                at,
                first_label,
                Operation::new(OpCode::NullCheckStart, OperationPayload::MemNum { num: id }),
            );
            self.add_op(end_op, OperationPayload::MemNum { num: id });
        }
        consumes
    }

    /// Inserts `op` at `at`. Labels bound past `at`, and labels created
    /// from `first_label` on that are bound at `at`, move with the code.
    fn insert_op(&mut self, at: usize, first_label: usize, op: Operation) {
        self.reg.ops.insert(at, op);
        for (id, slot) in self.labels.iter_mut().enumerate() {
            if let Some(pos) = slot {
                if *pos > at || (*pos == at && id >= first_label) {
                    *pos += 1;
                }
            }
        }
        for f in &mut self.fixups {
            if f.op >= at {
                f.op += 1;
            }
        }
    }

    // ========================================================================
    // Lookaround, atomic, absent, conditional
    // ========================================================================

    /// `(?=body)`
    pub fn lookahead(&mut self, body: impl FnOnce(&mut Self)) {
        self.emit(OpCode::PushPos);
        self.sub(body);
        self.emit(OpCode::PopPos);
    }

    /// `(?!body)`
    pub fn negative_lookahead(&mut self, body: impl FnOnce(&mut Self)) {
        let exit = self.new_label();
        self.in_not += 1;
        self.push_pos_not(exit);
        self.sub(body);
        self.emit(OpCode::FailPos);
        self.bind(exit);
        self.in_not -= 1;
    }

    /// `(?<=body)` where `body` matches exactly `len` characters.
    pub fn lookbehind(&mut self, len: usize, body: impl FnOnce(&mut Self)) {
        self.look_behind(len);
        self.sub(body);
    }

    /// `(?<!body)` where `body` matches exactly `len` characters.
    pub fn negative_lookbehind(&mut self, len: usize, body: impl FnOnce(&mut Self)) {
        let exit = self.new_label();
        self.in_not += 1;
        self.push_look_behind_not(exit, len);
        self.sub(body);
        self.emit(OpCode::FailLookBehindNot);
        self.bind(exit);
        self.in_not -= 1;
    }

    /// `(?>body)`
    pub fn atomic(&mut self, body: impl FnOnce(&mut Self)) {
        self.emit(OpCode::PushStopBt);
        let consumes = self.sub(body);
        self.emit(OpCode::PopStopBt);
        self.consumes |= consumes;
    }

    /// `(?~body)`: the longest text that contains no match of `body`.
    pub fn absent(&mut self, body: impl FnOnce(&mut Self)) {
        let exit = self.new_label();
        self.emit(OpCode::PushAbsentPos);
        self.absent_op(exit);
        self.sub(body);
        self.emit(OpCode::AbsentEnd);
        self.bind(exit);
    }

    /// `(?(n)yes|no)`
    pub fn condition(&mut self, n: usize, yes: impl FnOnce(&mut Self), no: impl FnOnce(&mut Self)) {
        let other = self.new_label();
        let end = self.new_label();
        self.condition_op(n, other);
        let cy = self.sub(yes);
        self.jump(end);
        self.bind(other);
        let cn = self.sub(no);
        self.bind(end);
        self.consumes |= cy && cn;
    }

    // ========================================================================
    // Optimize info
    // ========================================================================

    /// A literal every match contains, `dmin..=dmax` bytes after the match
    /// start.
    pub fn set_exact(&mut self, literal: &[u8], dmin: OnigLen, dmax: OnigLen) {
        self.hint = OptimizeHint::Exact {
            literal: literal.to_vec(),
            ignore_case: false,
        };
        self.opt_dmin = dmin;
        self.opt_dmax = dmax;
    }

    /// Like [`set_exact`](Self::set_exact) for a literal matched without
    /// regard to case.
    pub fn set_exact_ic(&mut self, literal: &[u8], dmin: OnigLen, dmax: OnigLen) {
        self.hint = OptimizeHint::Exact {
            literal: literal.to_vec(),
            ignore_case: true,
        };
        self.opt_dmin = dmin;
        self.opt_dmax = dmax;
    }

    /// Bytes that can appear `dmin..=dmax` bytes after a match start.
    pub fn set_map(&mut self, bytes: &[u8], dmin: OnigLen, dmax: OnigLen) {
        self.hint = OptimizeHint::Map { bytes: bytes.to_vec() };
        self.opt_dmin = dmin;
        self.opt_dmax = dmax;
    }

    /// `ANCR_*` flags holding for every match.
    pub fn set_anchor(&mut self, flags: u32) {
        self.reg.anchor = flags;
    }

    /// Length bounds of the match text in front of an end anchor.
    pub fn set_anchor_dist(&mut self, min: OnigLen, max: OnigLen) {
        self.reg.anchor_dmin = min;
        self.reg.anchor_dmax = max;
    }

    /// `ANCR_BEGIN_LINE` or `ANCR_END_LINE` right around the exact literal.
    pub fn set_sub_anchor(&mut self, flags: u32) {
        self.reg.sub_anchor = flags;
    }

    /// Inputs shorter than `n` bytes from the start cannot match.
    pub fn set_threshold_len(&mut self, n: usize) {
        self.threshold_len = Some(n);
    }

    // ========================================================================
    // Build
    // ========================================================================

    pub fn build(mut self) -> Result<RegexType, RegexError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let mut reg = self.reg;
        reg.ops.push(Operation::new(OpCode::End, OperationPayload::None));

        for f in &self.fixups {
            let target = self
                .labels
                .get(f.label.0)
                .copied()
                .flatten()
                .ok_or(RegexError::InvalidArgument)?;
            patch_address(&mut reg.ops[f.op], f.op, target)?;
        }

        // capture history and recursion keep their groups on the stack
        reg.bt_mem_start |= reg.capture_history | self.recursive;
        reg.bt_mem_end |= reg.capture_history;
        let num_mem = reg.num_mem;
        let num_call = reg.num_call;
        let (bt_start, bt_end, recursive) = (reg.bt_mem_start, reg.bt_mem_end, self.recursive);
        for op in &mut reg.ops {
            let OperationPayload::MemNum { num } = op.payload else {
                continue;
            };
            match op.opcode {
                OpCode::MemoryStart if mem_status_at(bt_start, num) => op.opcode = OpCode::MemoryStartPush,
                OpCode::MemoryEnd => {
                    let push = mem_status_at(bt_end, num);
                    let rec = mem_status_at(recursive, num);
                    op.opcode = match (push, rec) {
                        (true, true) => OpCode::MemoryEndPushRec,
                        (true, false) => OpCode::MemoryEndPush,
                        (false, true) => OpCode::MemoryEndRec,
                        (false, false) => OpCode::MemoryEnd,
                    };
                }
                _ => {}
            }
            let is_group_op = matches!(
                op.opcode,
                OpCode::MemoryStart
                    | OpCode::MemoryStartPush
                    | OpCode::MemoryEnd
                    | OpCode::MemoryEndPush
                    | OpCode::MemoryEndRec
                    | OpCode::MemoryEndPushRec
            );
            if is_group_op && num > num_mem {
                return Err(RegexError::InvalidArgument);
            }
        }
        if num_call > 0 {
            for op in &mut reg.ops {
                op.opcode = match op.opcode {
                    OpCode::RepeatInc => OpCode::RepeatIncSg,
                    OpCode::RepeatIncNg => OpCode::RepeatIncNgSg,
                    other => other,
                };
            }
        }

        reg.stack_pop_level = if reg.num_repeat != 0 || reg.bt_mem_end != 0 {
            StackPopLevel::All
        } else if reg.bt_mem_start != 0 {
            StackPopLevel::MemStart
        } else {
            StackPopLevel::Free
        };

        set_optimize_info(&mut reg, self.hint, self.opt_dmin, self.opt_dmax, self.threshold_len);
        Ok(reg)
    }
}

fn takes_no_operand(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::Finish
            | OpCode::End
            | OpCode::AnyChar
            | OpCode::AnyCharMl
            | OpCode::AnyCharStar
            | OpCode::AnyCharMlStar
            | OpCode::Word
            | OpCode::NotWord
            | OpCode::WordBound
            | OpCode::NotWordBound
            | OpCode::WordBegin
            | OpCode::WordEnd
            | OpCode::AsciiWord
            | OpCode::NotAsciiWord
            | OpCode::AsciiWordBound
            | OpCode::NotAsciiWordBound
            | OpCode::AsciiWordBegin
            | OpCode::AsciiWordEnd
            | OpCode::BeginBuf
            | OpCode::EndBuf
            | OpCode::BeginLine
            | OpCode::EndLine
            | OpCode::SemiEndBuf
            | OpCode::BeginPosition
            | OpCode::Backref1
            | OpCode::Backref2
            | OpCode::Keep
            | OpCode::Fail
            | OpCode::Pop
            | OpCode::PushPos
            | OpCode::PopPos
            | OpCode::FailPos
            | OpCode::PushStopBt
            | OpCode::PopStopBt
            | OpCode::FailLookBehindNot
            | OpCode::PushAbsentPos
            | OpCode::AbsentEnd
            | OpCode::Return
    )
}

fn patch_address(op: &mut Operation, at: usize, target: usize) -> Result<(), RegexError> {
    match &mut op.payload {
        OperationPayload::Jump { addr }
        | OperationPayload::PushOrJumpExact1 { addr, .. }
        | OperationPayload::Repeat { addr, .. }
        | OperationPayload::PushLookBehindNot { addr, .. }
        | OperationPayload::Condition { addr, .. } => {
            *addr = RelAddrType::try_from(target as i64 - at as i64).map_err(|_| RegexError::InvalidArgument)?;
        }
        OperationPayload::Call { addr } => *addr = target,
        _ => return Err(RegexError::InvalidArgument),
    }
    Ok(())
}

// ============================================================================
// Literal shapes
// ============================================================================

/// (bytes per character, character count) when every character of `s`
/// has the same width; width 0 otherwise.
fn literal_shape(enc: OnigEncoding, s: &[u8]) -> (usize, usize) {
    let mut width = None;
    let mut count = 0;
    let mut p = 0;
    while p < s.len() {
        let n = enc.mbc_enc_len(&s[p..]);
        match width {
            None => width = Some(n),
            Some(w) if w != n => return (0, s.len()),
            _ => {}
        }
        count += 1;
        p += n;
    }
    (width.unwrap_or(1), count)
}

/// Select the opcode for a string of `str_len` characters of `mb_len`
/// bytes each.
fn select_str_opcode(mb_len: usize, str_len: usize) -> OpCode {
    match mb_len {
        1 => match str_len {
            1 => OpCode::Exact1,
            2 => OpCode::Exact2,
            3 => OpCode::Exact3,
            4 => OpCode::Exact4,
            5 => OpCode::Exact5,
            _ => OpCode::ExactN,
        },
        2 => match str_len {
            1 => OpCode::ExactMb2N1,
            2 => OpCode::ExactMb2N2,
            3 => OpCode::ExactMb2N3,
            _ => OpCode::ExactMb2N,
        },
        3 => OpCode::ExactMb3N,
        _ => OpCode::ExactMbN,
    }
}

/// Case-folds every character of `s`.
pub(crate) fn fold_bytes(enc: OnigEncoding, flag: OnigCaseFoldType, s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut buf = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
    let mut p = 0;
    while p < s.len() {
        let n = enc.mbc_case_fold(flag, &mut p, s.len(), s, &mut buf);
        out.extend_from_slice(&buf[..n]);
    }
    out
}

// ============================================================================
// Optimize info
// ============================================================================

fn set_optimize_info(
    reg: &mut RegexType,
    hint: OptimizeHint,
    dmin: OnigLen,
    dmax: OnigLen,
    threshold_len: Option<usize>,
) {
    let enc = reg.enc;
    let allow_reverse = onigenc_is_singlebyte(enc) || onigenc_is_unicode_encoding(enc);
    let min_width = match hint {
        OptimizeHint::None => {
            reg.optimize = OptimizeType::None;
            return;
        }
        OptimizeHint::Exact { literal, .. } if literal.is_empty() => {
            reg.optimize = OptimizeType::None;
            return;
        }
        OptimizeHint::Exact {
            literal,
            ignore_case: false,
        } => {
            reg.optimize = if literal.len() < BM_MIN_LEN {
                OptimizeType::Exact
            } else if allow_reverse {
                OptimizeType::ExactBm
            } else {
                OptimizeType::ExactBmNotRev
            };
            if literal.len() >= BM_MIN_LEN {
                reg.bm_skip = quick_search_skip(&literal, false);
            }
            let n = literal.len();
            reg.exact = literal;
            n
        }
        OptimizeHint::Exact {
            literal,
            ignore_case: true,
        } => {
            let folded = fold_bytes(enc, reg.case_fold_flag, &literal);
            // the byte-level skip is only sound when folding never changes
            // a character's width
            let fixed_width = folded.is_ascii()
                && (onigenc_is_singlebyte(enc) || case_fold_is_ascii_only(reg.case_fold_flag));
            reg.optimize = if folded.len() < BM_MIN_LEN || !fixed_width {
                OptimizeType::ExactIc
            } else if allow_reverse {
                OptimizeType::ExactBmIc
            } else {
                OptimizeType::ExactBmNotRevIc
            };
            if reg.optimize != OptimizeType::ExactIc {
                reg.bm_skip = quick_search_skip(&folded, true);
            }
            reg.exact = folded;
            // a folded literal can match fewer bytes than it has
            1
        }
        OptimizeHint::Map { bytes } => {
            reg.map = [0; CHAR_MAP_SIZE];
            for b in bytes {
                reg.map[b as usize] = 1;
            }
            reg.optimize = OptimizeType::Map;
            1
        }
    };
    reg.dmin = dmin;
    reg.dmax = dmax;
    reg.threshold_len = match threshold_len {
        Some(n) => n,
        None if dmin != INFINITE_LEN => dmin as usize + min_width,
        None => 0,
    };
}

/// Sunday quick-search shift table: the distance from the byte after the
/// window to its last occurrence in `s`, `len + 1` for absent bytes.
fn quick_search_skip(s: &[u8], ignore_case: bool) -> Vec<usize> {
    let len = s.len();
    let mut skip = vec![len + 1; CHAR_MAP_SIZE];
    for (i, &b) in s.iter().enumerate() {
        skip[b as usize] = len - i;
        if ignore_case {
            skip[b.to_ascii_uppercase() as usize] = len - i;
        }
    }
    skip
}

/// Backward Boyer-Moore shift table, built on the first backward search
/// that needs it.
pub(crate) fn backward_skip(s: &[u8]) -> Vec<usize> {
    let len = s.len();
    let mut skip = vec![len; CHAR_MAP_SIZE];
    for i in (1..len).rev() {
        skip[s[i] as usize] = i;
    }
    skip
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::{ONIG_ENCODING_ASCII, ONIG_ENCODING_UTF8};

    fn opcodes(reg: &RegexType) -> Vec<OpCode> {
        reg.ops.iter().map(|op| op.opcode).collect()
    }

    #[test]
    fn literal_opcode_by_width() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.literal(b"abc");
        b.literal("éè".as_bytes());
        b.literal("日本".as_bytes());
        b.literal("aé".as_bytes());
        let reg = b.build().unwrap();
        assert_eq!(
            opcodes(&reg),
            vec![
                OpCode::Exact3,
                OpCode::ExactMb2N2,
                OpCode::ExactMb3N,
                OpCode::ExactMbN,
                OpCode::End
            ]
        );
    }

    #[test]
    fn alternation_layout_resolves_labels() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.alt(|b| b.literal(b"a"), |b| b.literal(b"b"));
        let reg = b.build().unwrap();
        assert_eq!(
            opcodes(&reg),
            vec![OpCode::Push, OpCode::Exact1, OpCode::Jump, OpCode::Exact1, OpCode::End]
        );
        assert!(matches!(reg.ops[0].payload, OperationPayload::Jump { addr: 3 }));
        assert!(matches!(reg.ops[2].payload, OperationPayload::Jump { addr: 2 }));
    }

    #[test]
    fn null_check_only_for_empty_bodies() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        assert!(!opcodes(&reg).contains(&OpCode::NullCheckStart));

        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.optional(true, |b| b.literal(b"a")));
        let reg = b.build().unwrap();
        let ops = opcodes(&reg);
        let start = ops.iter().position(|&o| o == OpCode::NullCheckStart).unwrap();
        let end = ops.iter().position(|&o| o == OpCode::NullCheckEnd).unwrap();
        assert_eq!(start, 1);
        assert_eq!(ops[end + 1], OpCode::Jump);
        // the loop-back jump still lands on the outer Push
        let OperationPayload::Jump { addr } = reg.ops[end + 1].payload else {
            panic!("jump expected");
        };
        assert_eq!((end + 1) as i32 + addr, 0);
    }

    #[test]
    fn capture_in_empty_loop_uses_memst_check() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.capture(1, |b| b.optional(true, |b| b.literal(b"a"))));
        let reg = b.build().unwrap();
        let ops = opcodes(&reg);
        assert!(ops.contains(&OpCode::NullCheckEndMemst));
        assert!(ops.contains(&OpCode::MemoryStartPush));
        assert_eq!(reg.stack_pop_level, StackPopLevel::MemStart);
    }

    #[test]
    fn top_level_capture_uses_plain_ops() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.capture(1, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        assert_eq!(
            opcodes(&reg),
            vec![OpCode::MemoryStart, OpCode::Exact1, OpCode::MemoryEnd, OpCode::End]
        );
        assert_eq!(reg.stack_pop_level, StackPopLevel::Free);
    }

    #[test]
    fn capture_history_forces_push_variants() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.capture_history(2);
        b.capture(2, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        assert_eq!(
            opcodes(&reg),
            vec![OpCode::MemoryStartPush, OpCode::Exact1, OpCode::MemoryEndPush, OpCode::End]
        );
        assert_eq!(reg.num_mem, 2);
        assert_eq!(reg.stack_pop_level, StackPopLevel::All);
    }

    #[test]
    fn nested_counted_repeat_searches_its_counter() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.repeat(2, 3, true, |b| b.literal(b"a")));
        let reg = b.build().unwrap();
        assert!(opcodes(&reg).contains(&OpCode::RepeatIncSg));
    }

    #[test]
    fn calls_switch_repeats_to_search_variant() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        let sub = b.new_label();
        let done = b.new_label();
        b.call(sub);
        b.jump(done);
        b.bind(sub);
        b.repeat(1, 2, true, |b| b.literal(b"x"));
        b.ret();
        b.bind(done);
        let reg = b.build().unwrap();
        assert!(opcodes(&reg).contains(&OpCode::RepeatIncSg));
        assert!(matches!(reg.ops[0].payload, OperationPayload::Call { addr: 2 }));
    }

    #[test]
    fn unbound_label_is_rejected() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        let l = b.new_label();
        b.jump(l);
        assert_eq!(b.build().err(), Some(RegexError::InvalidArgument));
    }

    #[test]
    fn bad_repeat_bounds_are_rejected() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.repeat(3, 2, true, |b| b.literal(b"a"));
        assert!(b.build().is_err());
    }

    #[test]
    fn class_ranges_split_single_and_multibyte() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.class_ranges(b"_", &[(0x61, 0x7a), (0x3b1, 0x3c9), (0x391, 0x3a9)], false);
        let reg = b.build().unwrap();
        let OperationPayload::CClassMix { ref bsp, ref mb } = reg.ops[0].payload else {
            panic!("mixed class expected");
        };
        assert!(bitset_at(bsp, b'q' as usize));
        assert!(bitset_at(bsp, b'_' as usize));
        assert_eq!(mb.len(), 2);
        assert!(mb[0].from < mb[1].from);
    }

    #[test]
    fn exact_optimization_selection() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.literal(b"ab");
        b.set_exact(b"ab", 0, 0);
        let reg = b.build().unwrap();
        assert_eq!(reg.optimize, OptimizeType::Exact);
        assert_eq!(reg.threshold_len, 2);

        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.literal(b"hello");
        b.set_exact(b"hello", 0, 0);
        let reg = b.build().unwrap();
        assert_eq!(reg.optimize, OptimizeType::ExactBm);
        assert_eq!(reg.bm_skip[b'o' as usize], 1);
        assert_eq!(reg.bm_skip[b'l' as usize], 2);
        assert_eq!(reg.bm_skip[b'z' as usize], 6);

        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.literal_ic(b"cat");
        b.set_exact_ic(b"CAT", 0, 0);
        let reg = b.build().unwrap();
        assert_eq!(reg.exact, b"cat".to_vec());
        assert_eq!(reg.optimize, OptimizeType::ExactIc);
    }

    #[test]
    fn backward_skip_table() {
        let skip = backward_skip(b"abcb");
        assert_eq!(skip[b'b' as usize], 1);
        assert_eq!(skip[b'c' as usize], 2);
        assert_eq!(skip[b'a' as usize], 4);
    }
}

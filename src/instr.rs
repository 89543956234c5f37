/*!
This module defines the instructions that make up the intermediate
representation consumed by the code generator, along with the types that
aid in traversing instruction streams.

Stream layout
-------------

A compiled pattern is a flat sequence of [`Instr`] ending in a single
[`InstrKind::Null`]. The stream is flat but logically a tree: composite
instructions (groups, alternations, lookarounds) own the contiguous range
of instructions that follows them, up to an end index stored inside the
composite itself. Quantifiers own exactly the instruction that follows
them. Every such reference is an index into the same stream ([`InstrId`]),
pointing strictly after the referencing instruction.

For example, `(ab)+c` compiles to:

```text
00000: PLUS
00001: CGROUP(0) 00003
00002: WORD "ab"
00003: WORD "c"
00004: NULL
```

where `PLUS` wraps the instruction after it (the group), and the group's
stored end index points one past its last child.

Walkers never recurse over a parallel tree; they hop from an instruction
to its next sibling using the stored end indices (see [`next_sibling`]).

The code generator may mark instructions as skipped while it compiles
dead alternation arms; the mark is transient state that does not affect
ownership of the instruction's payload.
*/

use std::fmt::{Display, Formatter};

use bstr::BString;

/// Index of an instruction within its stream.
pub type InstrId = usize;

/// How an instruction's operand, if any, is encoded.
///
/// The code generator uses this classification to traverse a stream
/// without knowing every instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// The instruction has no operand.
    None,
    /// The operand is the instruction that immediately follows
    /// (quantifiers).
    Inline,
    /// The operand is one or more stream indices stored in the
    /// instruction (groups, alternations, lookarounds).
    Target,
}

/// The body of a bracketed class, expanded to an explicit enumeration.
///
/// `runes` holds every member of the class, ranges already unfolded.
/// `widths` is parallel to `runes` and holds the number of bytes each
/// member occupies in its UTF-8 encoding; members with a width greater
/// than one must be matched as multi-byte literals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassBody {
    runes: Vec<char>,
    widths: Vec<u8>,
}

impl ClassBody {
    pub(crate) fn push(&mut self, rune: char) {
        self.runes.push(rune);
        self.widths.push(rune.len_utf8() as u8);
    }

    /// The members of the class, in expansion order.
    #[inline]
    pub fn runes(&self) -> &[char] {
        self.runes.as_slice()
    }

    /// Per-member encoded widths, parallel to [`ClassBody::runes`].
    #[inline]
    pub fn widths(&self) -> &[u8] {
        self.widths.as_slice()
    }

    /// Returns true if the given rune is a member of the class.
    pub fn contains(&self, rune: char) -> bool {
        self.runes.contains(&rune)
    }

    /// Number of members in the class.
    #[inline]
    pub fn len(&self) -> usize {
        self.runes.len()
    }

    /// True if the class has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runes.is_empty()
    }
}

/// Each of the instruction kinds, together with their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    /// Matches a literal run of bytes.
    Word(BString),
    /// Matches any rune, or any rune except newline unless the pattern
    /// enables `DotMatchesNewLine`.
    Dot,
    /// Matches any member of the class.
    Set(ClassBody),
    /// Matches anything that is not a member of the class.
    NSet(ClassBody),
    /// Matches one of the `\s`/`\w`/`\d` families. `class` is the
    /// lowercase family letter; `negated` is true for the uppercase
    /// (complement) forms.
    UClass {
        /// Lowercase family letter: `s`, `w` or `d`.
        class: u8,
        /// True for `\S`, `\W`, `\D`.
        negated: bool,
    },
    /// Matches at the start of the input (`^`).
    Begin,
    /// Matches at the end of the input (`$`).
    End,
    /// Matches whatever the capture group with this 0-based index
    /// matched.
    Back(u32),
    /// Zero or one of the following instruction (`?`).
    Opt,
    /// Zero or more of the following instruction, greedy (`*`).
    Star,
    /// Zero or more of the following instruction, lazy (`*?`).
    MStar,
    /// One or more of the following instruction, greedy (`+`).
    Plus,
    /// One or more of the following instruction, lazy (`+?`).
    MPlus,
    /// A counted repetition of the following instruction (`{m}`,
    /// `{m,}`, `{m,n}`). `max` is `None` for the open-ended form.
    Rep {
        /// Minimum number of repetitions.
        min: u32,
        /// Maximum number of repetitions, if bounded.
        max: Option<u32>,
    },
    /// An alternation fork. The first arm is the range `[id+1, mid)`,
    /// the second arm is `[mid, end)`.
    Or {
        /// Start of the second arm.
        mid: InstrId,
        /// One past the last instruction of the alternation.
        end: InstrId,
    },
    /// A non-capturing group owning the range `[id+1, end)`.
    Group {
        /// One past the last child.
        end: InstrId,
    },
    /// A capturing group owning the range `[id+1, end)`.
    CGroup {
        /// One past the last child.
        end: InstrId,
        /// 0-based capture index, dense in source order.
        index: u32,
    },
    /// Positive lookahead `(?=...)`.
    Lookahead {
        /// One past the last child.
        end: InstrId,
    },
    /// Negative lookahead `(?!...)`.
    NLookahead {
        /// One past the last child.
        end: InstrId,
    },
    /// Positive lookbehind `(?<=...)`. The body always has a fixed
    /// match width, recorded in the instruction's cached length.
    Lookbehind {
        /// One past the last child.
        end: InstrId,
    },
    /// Negative lookbehind `(?<!...)`.
    NLookbehind {
        /// One past the last child.
        end: InstrId,
    },
    /// Terminates the instruction stream.
    Null,
}

impl InstrKind {
    /// How this kind's operand is encoded. See [`Arg`].
    pub fn arg(&self) -> Arg {
        match self {
            InstrKind::Opt
            | InstrKind::Star
            | InstrKind::MStar
            | InstrKind::Plus
            | InstrKind::MPlus
            | InstrKind::Rep { .. } => Arg::Inline,
            InstrKind::Or { .. }
            | InstrKind::Group { .. }
            | InstrKind::CGroup { .. }
            | InstrKind::Lookahead { .. }
            | InstrKind::NLookahead { .. }
            | InstrKind::Lookbehind { .. }
            | InstrKind::NLookbehind { .. } => Arg::Target,
            _ => Arg::None,
        }
    }

    /// For [`Arg::Target`] kinds, the index one past the last owned
    /// child.
    pub fn end(&self) -> Option<InstrId> {
        match self {
            InstrKind::Or { end, .. }
            | InstrKind::Group { end }
            | InstrKind::CGroup { end, .. }
            | InstrKind::Lookahead { end }
            | InstrKind::NLookahead { end }
            | InstrKind::Lookbehind { end }
            | InstrKind::NLookbehind { end } => Some(*end),
            _ => None,
        }
    }
}

/// A single instruction in a compiled stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    kind: InstrKind,
    len: Option<u32>,
    len_from: Option<InstrId>,
    skipped: bool,
}

impl Instr {
    pub(crate) fn new(kind: InstrKind) -> Self {
        Self { kind, len: None, len_from: None, skipped: false }
    }

    pub(crate) fn with_len(kind: InstrKind, len: u32) -> Self {
        Self { kind, len: Some(len), len_from: None, skipped: false }
    }

    /// The instruction's kind and payload.
    #[inline]
    pub fn kind(&self) -> &InstrKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut InstrKind {
        &mut self.kind
    }

    /// Statically-known match width in bytes, if the instruction has
    /// one. `None` means the width varies between matches.
    #[inline]
    pub fn len(&self) -> Option<u32> {
        self.len
    }

    pub(crate) fn set_len(&mut self, len: Option<u32>) {
        self.len = len;
    }

    /// The composite instruction that most recently computed this
    /// instruction's width, if any. Diagnostic aid.
    #[inline]
    pub fn len_from(&self) -> Option<InstrId> {
        self.len_from
    }

    pub(crate) fn set_len_from(&mut self, owner: InstrId) {
        self.len_from = Some(owner);
    }

    /// True if the code generator marked this instruction as dead.
    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Marks or unmarks this instruction as dead during compilation.
    /// Releasing a stream is insensitive to these marks.
    pub fn set_skipped(&mut self, yes: bool) {
        self.skipped = yes;
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            InstrKind::Word(lit) => write!(f, "WORD {lit:?}"),
            InstrKind::Dot => write!(f, "DOT"),
            InstrKind::Set(class) => {
                write!(f, "SET")?;
                for rune in class.runes() {
                    write!(f, " {rune:?}")?;
                }
                Ok(())
            }
            InstrKind::NSet(class) => {
                write!(f, "NSET")?;
                for rune in class.runes() {
                    write!(f, " {rune:?}")?;
                }
                Ok(())
            }
            InstrKind::UClass { class, negated } => {
                let letter = if *negated {
                    class.to_ascii_uppercase()
                } else {
                    *class
                };
                write!(f, "USET \\{}", letter as char)
            }
            InstrKind::Begin => write!(f, "BEGIN"),
            InstrKind::End => write!(f, "END"),
            InstrKind::Back(index) => write!(f, "BACK {index}"),
            InstrKind::Opt => write!(f, "OPT"),
            InstrKind::Star => write!(f, "STAR"),
            InstrKind::MStar => write!(f, "MSTAR"),
            InstrKind::Plus => write!(f, "PLUS"),
            InstrKind::MPlus => write!(f, "MPLUS"),
            InstrKind::Rep { min, max: Some(max) } => {
                write!(f, "REP {min},{max}")
            }
            InstrKind::Rep { min, max: None } => write!(f, "REP {min},"),
            InstrKind::Or { mid, end } => write!(f, "OR {mid:05} {end:05}"),
            InstrKind::Group { end } => write!(f, "GROUP {end:05}"),
            InstrKind::CGroup { end, index } => {
                write!(f, "CGROUP({index}) {end:05}")
            }
            InstrKind::Lookahead { end } => write!(f, "LAHEAD {end:05}"),
            InstrKind::NLookahead { end } => write!(f, "NLAHEAD {end:05}"),
            InstrKind::Lookbehind { end } => write!(f, "LBEHIND {end:05}"),
            InstrKind::NLookbehind { end } => write!(f, "NLBEHIND {end:05}"),
            InstrKind::Null => write!(f, "NULL"),
        }
    }
}

/// Returns the index of the instruction that follows `id` at the same
/// nesting level, hopping over the bodies of composites and quantifiers.
pub fn next_sibling(instrs: &[Instr], id: InstrId) -> InstrId {
    match instrs[id].kind().arg() {
        // The composite owns everything up to its stored end.
        Arg::Target => instrs[id].kind().end().unwrap(),
        // The quantifier owns the instruction that follows it.
        Arg::Inline => next_sibling(instrs, id + 1),
        Arg::None => id + 1,
    }
}

/*! Compiles a token list into an instruction stream.

The compiler performs a single pass over the tokens produced by
[`crate::tokenizer`], guided by the maps that [`structure`] extracts
beforehand. Instructions are emitted into a flat stream; references
between them (group ends, alternation arms) are indices into that stream,
patched as soon as the referenced position is known:

- A quantifier is emitted *before* the atom or group it wraps.
- An alternation fork is emitted before its first arm; its `mid` index is
  patched when the second arm starts and its `end` index when the
  enclosing group closes (or the pattern ends).
- A group instruction is emitted at `(` and its `end` index is patched
  at `)`.

While a look-behind is open every emitted construct must have a
statically-known match width; [`len`] performs that analysis and the
results are cached in the instructions themselves.
*/

use std::fmt::{Display, Formatter};

use bstr::BString;
use log::*;

use crate::instr::{Instr, InstrId, InstrKind};
use crate::tokenizer::{tokenize, Token, TokenKind};
use crate::{Error, Flag, Flags, Span, DEFAULT_MAX_NESTING};

pub(crate) mod classes;
pub(crate) mod len;
pub(crate) mod structure;


/// Compiles a pattern with the given initial flags.
///
/// This is a shorthand for [`Parser::new().flags(flags).parse(pattern)`].
///
/// [`Parser::new().flags(flags).parse(pattern)`]: Parser::parse
pub fn parse(pattern: &str, flags: Flags) -> Result<ParseResult, Error> {
    Parser::new().flags(flags).parse(pattern)
}

/// A pattern compiler.
///
/// Configure it with the builder methods, then call [`Parser::parse`]:
///
/// ```rust
/// use rejit::{Flag, Parser};
///
/// let result = Parser::new()
///     .flags(Flag::CaseInsensitive.into())
///     .max_nesting(64)
///     .parse("(foo|bar)+")
///     .unwrap();
///
/// assert_eq!(result.groups(), 1);
/// ```
pub struct Parser {
    flags: Flags,
    max_nesting: usize,
}

impl Parser {
    /// Creates a new [`Parser`] with no flags set and the default
    /// nesting ceiling.
    pub fn new() -> Self {
        Self { flags: Flags::none(), max_nesting: DEFAULT_MAX_NESTING }
    }

    /// Sets the initial flags, as if the pattern started with the
    /// corresponding `(?...)` group.
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the ceiling for group and alternation nesting. Patterns
    /// nesting deeper than this fail with [`Error::TooDeep`].
    pub fn max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Compiles the pattern into an instruction stream.
    pub fn parse(&self, pattern: &str) -> Result<ParseResult, Error> {
        let tokens = tokenize(pattern)?;
        let map = structure::analyze(&tokens, self.max_nesting)?;

        let result = Compiler::new(
            pattern,
            tokens,
            map,
            self.flags,
            self.max_nesting,
        )
        .compile()?;

        debug!(
            "compiled /{}/ into {} instructions, {} capture groups",
            pattern,
            result.instrs.len(),
            result.groups,
        );

        Ok(result)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// The outcome of compiling a pattern.
///
/// Holds the instruction stream plus the metadata the code generator
/// needs: how many capture groups the pattern has, how deep groups nest
/// (which sizes the runtime stack), and the flags in effect after inline
/// `(?...)` groups have been applied.
pub struct ParseResult {
    instrs: Vec<Instr>,
    groups: u32,
    max_depth: usize,
    flags: Flags,
}

impl ParseResult {
    /// The instruction stream. Flat, terminated by a single
    /// [`InstrKind::Null`].
    #[inline]
    pub fn instrs(&self) -> &[Instr] {
        self.instrs.as_slice()
    }

    /// Mutable access to the instruction stream, used by the code
    /// generator to mark dead instructions as skipped.
    #[inline]
    pub fn instrs_mut(&mut self) -> &mut [Instr] {
        self.instrs.as_mut_slice()
    }

    /// Consumes the result, returning the instruction stream.
    pub fn into_instrs(self) -> Vec<Instr> {
        self.instrs
    }

    /// Number of capture groups. Their indices are dense: every value
    /// in `0..groups` belongs to exactly one capturing group, assigned
    /// in source order.
    #[inline]
    pub fn groups(&self) -> u32 {
        self.groups
    }

    /// Maximum number of simultaneously open groups observed while
    /// compiling.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flags in effect: the caller's plus any set inline with `(?...)`.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }
}

impl Display for ParseResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        for (id, instr) in self.instrs.iter().enumerate() {
            writeln!(f, "{id:05}: {instr}")?;
        }
        Ok(())
    }
}

/// An emitted alternation fork waiting for its indices to be patched.
#[derive(Debug, Clone, Copy)]
struct PendingFork {
    /// Stream index of the `Or` instruction.
    id: InstrId,
    /// Token index where the second arm starts.
    mid_token: usize,
    /// Token index that closes the alternation, if it closes before the
    /// end of the pattern.
    end_token: Option<usize>,
}

struct Compiler<'src> {
    pattern: &'src str,
    tokens: Vec<Token>,
    map: structure::StructureMap,
    max_nesting: usize,

    instrs: Vec<Instr>,
    /// Emitted composites awaiting their closing `)`.
    open: Vec<InstrId>,
    /// Emitted forks whose `mid`/`end` are not resolved yet.
    pending: Vec<PendingFork>,
    /// Number of look-behind groups currently open.
    lbh: usize,

    groups: u32,
    max_depth: usize,
    flags: Flags,
}

impl<'src> Compiler<'src> {
    fn new(
        pattern: &'src str,
        tokens: Vec<Token>,
        map: structure::StructureMap,
        flags: Flags,
        max_nesting: usize,
    ) -> Self {
        // One instruction per token plus the terminator is the worst
        // case, so the stream never reallocates while indices into it
        // are being patched.
        let capacity = tokens.len() + 1;
        Self {
            pattern,
            tokens,
            map,
            max_nesting,
            instrs: Vec::with_capacity(capacity),
            open: Vec::new(),
            pending: Vec::new(),
            lbh: 0,
            groups: 0,
            max_depth: 0,
            flags,
        }
    }

    fn compile(mut self) -> Result<ParseResult, Error> {
        let mut i = 0;

        while i < self.tokens.len() {
            let token = self.tokens[i].clone();

            self.max_depth = self.max_depth.max(self.open.len());

            // The second arm of the fork on top of the pending stack
            // starts at this token.
            if let Some(&PendingFork { id, mid_token, .. }) =
                self.pending.last()
            {
                if mid_token == i {
                    let next = self.instrs.len();
                    if let InstrKind::Or { mid, .. } =
                        self.instrs[id].kind_mut()
                    {
                        *mid = next;
                    }
                }
            }

            // Forks whose alternation closes at this token: resolve
            // their end and, inside a look-behind, check that both arms
            // have the same fixed width.
            while let Some(&PendingFork {
                id,
                mid_token,
                end_token: Some(end_token),
            }) = self.pending.last()
            {
                if end_token != i {
                    break;
                }
                let next = self.instrs.len();
                if let InstrKind::Or { end, .. } = self.instrs[id].kind_mut()
                {
                    *end = next;
                }
                if self.lbh > 0
                    && len::match_len(&mut self.instrs, id).is_none()
                {
                    return Err(Error::VariableLookBehind {
                        pos: self.tokens[mid_token].span.start(),
                    });
                }
                self.pending.pop();
            }

            // An alternation forks at this token: emit the fork before
            // its first arm.
            if let Some(mid_token) = self.map.pipes[i].mid {
                if self.pending.len() + 1 >= self.max_nesting {
                    return Err(Error::TooDeep { pos: token.span.start() });
                }
                let id =
                    self.emit(Instr::new(InstrKind::Or { mid: 0, end: 0 }));
                self.pending.push(PendingFork {
                    id,
                    mid_token,
                    end_token: self.map.pipes[i].end,
                });
            }

            // The quantifier binding this atom, emitted before it.
            let mut deferred_rep = None;
            if let Some(s) = self.map.suffix[i] {
                deferred_rep = self.emit_suffix(i, s)?;
            }

            let mut opened_group = false;

            match token.kind {
                TokenKind::Word => {
                    let lit = self.unescape(&token.span);
                    // `(?...)` prefixes may have trimmed the token down
                    // to nothing.
                    if !lit.is_empty() {
                        let width = lit.len() as u32;
                        self.emit(Instr::with_len(
                            InstrKind::Word(lit),
                            width,
                        ));
                    }
                }
                TokenKind::Caret => {
                    self.emit(Instr::with_len(InstrKind::Begin, 0));
                }
                TokenKind::Dollar => {
                    self.emit(Instr::with_len(InstrKind::End, 0));
                }
                TokenKind::Dot => {
                    self.emit(Instr::with_len(InstrKind::Dot, 1));
                }
                TokenKind::LParen => {
                    let (last, opened) = self.open_group(i)?;
                    i = last;
                    opened_group = opened;
                }
                TokenKind::RParen => {
                    self.close_group(&token)?;
                }
                TokenKind::Set => {
                    let span = &token.span;
                    let negated =
                        self.pattern.as_bytes()[span.start()] == b'^';
                    let body =
                        &self.pattern[span.start() + 1..span.end() - 1];
                    let class = classes::expand(body, span.start() + 1)?;
                    let kind = if negated {
                        InstrKind::NSet(class)
                    } else {
                        InstrKind::Set(class)
                    };
                    self.emit(Instr::with_len(kind, 1));
                }
                TokenKind::MetaClass => {
                    let letter =
                        self.pattern.as_bytes()[token.span.start() + 1];
                    self.emit(Instr::new(InstrKind::UClass {
                        class: letter.to_ascii_lowercase(),
                        negated: letter.is_ascii_uppercase(),
                    }));
                }
                TokenKind::Backref => {
                    let digit =
                        self.pattern.as_bytes()[token.span.start() + 1];
                    // Backreferences are \1 to \9; there is no group 0.
                    if digit == b'0' {
                        return Err(Error::Syntax {
                            pos: token.span.start(),
                        });
                    }
                    if self.lbh > 0 {
                        // What a backreference matches is only known at
                        // match time.
                        return Err(Error::VariableLookBehind {
                            pos: token.span.start(),
                        });
                    }
                    self.emit(Instr::new(InstrKind::Back(
                        (digit - b'1') as u32,
                    )));
                }
                // Handled by the fork and suffix steps above.
                TokenKind::Pipe
                | TokenKind::Question
                | TokenKind::Star
                | TokenKind::Plus
                | TokenKind::Repeat => {}
            }

            // A counted repetition's width depends on its body, which
            // did not exist when the quantifier was emitted. A group
            // body is checked when its `)` closes instead.
            if let Some(rep_id) = deferred_rep {
                if self.lbh > 0
                    && !opened_group
                    && len::match_len(&mut self.instrs, rep_id).is_none()
                {
                    return Err(Error::VariableLookBehind {
                        pos: token.span.start(),
                    });
                }
            }

            i += 1;
        }

        let null_id = self.emit(Instr::new(InstrKind::Null));

        if !self.open.is_empty() {
            return Err(Error::Unbalanced { pos: self.pattern.len() });
        }

        // Alternations that ran to the end of the pattern close at the
        // terminator.
        while let Some(fork) = self.pending.pop() {
            debug_assert!(fork.end_token.is_none());
            if let InstrKind::Or { end, .. } = self.instrs[fork.id].kind_mut()
            {
                *end = null_id;
            }
        }

        Ok(ParseResult {
            instrs: self.instrs,
            groups: self.groups,
            max_depth: self.max_depth,
            flags: self.flags,
        })
    }

    /// Emits the quantifier at token `s` binding the atom at token `i`.
    ///
    /// Returns the id of the emitted instruction when it is a counted
    /// repetition, whose width check must wait until its body exists.
    fn emit_suffix(
        &mut self,
        i: usize,
        s: usize,
    ) -> Result<Option<InstrId>, Error> {
        let kind = match self.tokens[s].kind {
            TokenKind::Star => InstrKind::Star,
            TokenKind::Plus => InstrKind::Plus,
            TokenKind::Question => InstrKind::Opt,
            TokenKind::Repeat => self.parse_rep(s)?,
            _ => unreachable!(),
        };

        // A `?` right after the quantifier selects its lazy variant.
        let lazy = self
            .tokens
            .get(s + 1)
            .is_some_and(|t| t.kind == TokenKind::Question);
        let kind = match kind {
            InstrKind::Star if lazy => InstrKind::MStar,
            InstrKind::Plus if lazy => InstrKind::MPlus,
            kind => kind,
        };

        let is_rep = matches!(kind, InstrKind::Rep { .. });
        let id = self.emit(Instr::new(kind));

        if is_rep {
            Ok(Some(id))
        } else {
            if self.lbh > 0 {
                // `*`, `+`, `?` and their lazy variants never have a
                // fixed width.
                return Err(Error::VariableLookBehind {
                    pos: self.tokens[i].span.start(),
                });
            }
            Ok(None)
        }
    }

    /// Parses the `{m}`, `{m,}` or `{m,n}` body of the token at `s`.
    fn parse_rep(&self, s: usize) -> Result<InstrKind, Error> {
        let span = &self.tokens[s].span;
        let body = &self.pattern[span.start() + 1..span.end() - 1];
        let base = span.start() + 1;

        let (min_digits, max_digits) = match body.find(',') {
            Some(comma) => (&body[..comma], Some((&body[comma + 1..], comma))),
            None => (body, None),
        };

        let min = parse_count(min_digits, base)?;
        let max = match max_digits {
            None => Some(min),
            Some(("", _)) => None,
            Some((digits, comma)) => {
                Some(parse_count(digits, base + comma + 1)?)
            }
        };

        Ok(InstrKind::Rep { min, max })
    }

    /// Handles a `(` at token `i`, recognizing the `(?...)` prefixes.
    ///
    /// Returns the index of the last token consumed and whether a
    /// composite was actually opened (inline flag groups open nothing).
    fn open_group(&mut self, i: usize) -> Result<(usize, bool), Error> {
        let prefixed = i + 2 < self.tokens.len()
            && self.tokens[i + 1].kind == TokenKind::Question
            && self.tokens[i + 2].kind == TokenKind::Word;

        let mut kind = None;

        if prefixed {
            let word = self.tokens[i + 2].span.clone();
            let mut word_runes = self.pattern[word.range()].chars();

            match word_runes.next() {
                Some(':') => {
                    self.trim_token(i + 2, 1);
                    kind = Some(InstrKind::Group { end: 0 });
                }
                Some('=') => {
                    self.trim_token(i + 2, 1);
                    kind = Some(InstrKind::Lookahead { end: 0 });
                }
                Some('!') => {
                    self.trim_token(i + 2, 1);
                    kind = Some(InstrKind::NLookahead { end: 0 });
                }
                Some('<') => {
                    kind = match word_runes.next() {
                        Some('=') => Some(InstrKind::Lookbehind { end: 0 }),
                        Some('!') => Some(InstrKind::NLookbehind { end: 0 }),
                        _ => {
                            return Err(Error::Syntax {
                                pos: word.start() + 1,
                            })
                        }
                    };
                    self.trim_token(i + 2, 2);
                    self.lbh += 1;
                }
                Some(_) => {
                    // `(?letters)` switches flags on for the rest of the
                    // pattern and emits nothing.
                    if i + 3 < self.tokens.len()
                        && self.tokens[i + 3].kind == TokenKind::RParen
                    {
                        for c in self.pattern[word.range()].chars() {
                            match c {
                                'i' => self.flags.set(Flag::CaseInsensitive),
                                's' => {
                                    self.flags.set(Flag::DotMatchesNewLine)
                                }
                                _ => {}
                            }
                        }
                        return Ok((i + 3, false));
                    }
                }
                None => {}
            }
        }

        let kind = kind.unwrap_or_else(|| {
            let index = self.groups;
            self.groups += 1;
            InstrKind::CGroup { end: 0, index }
        });

        if self.open.len() + 1 >= self.max_nesting {
            return Err(Error::TooDeep {
                pos: self.tokens[i].span.start(),
            });
        }

        let id = self.emit(Instr::new(kind));
        self.open.push(id);

        Ok((i, true))
    }

    /// Handles a `)`: resolves the composite's end index and, inside a
    /// look-behind, checks that its body has a fixed width.
    fn close_group(&mut self, token: &Token) -> Result<(), Error> {
        let id = match self.open.pop() {
            Some(id) => id,
            None => {
                return Err(Error::Unbalanced { pos: token.span.start() })
            }
        };

        let next = self.instrs.len();
        match self.instrs[id].kind_mut() {
            InstrKind::Group { end }
            | InstrKind::CGroup { end, .. }
            | InstrKind::Lookahead { end }
            | InstrKind::NLookahead { end }
            | InstrKind::Lookbehind { end }
            | InstrKind::NLookbehind { end } => *end = next,
            _ => unreachable!(),
        }

        if self.lbh > 0 && len::body_len(&mut self.instrs, id).is_none() {
            return Err(Error::VariableLookBehind {
                pos: token.span.start(),
            });
        }

        if matches!(
            self.instrs[id].kind(),
            InstrKind::Lookbehind { .. } | InstrKind::NLookbehind { .. }
        ) {
            self.lbh -= 1;
        }

        Ok(())
    }

    /// Advances the start of the token's span by `bytes`, dropping a
    /// recognized `(?...)` prefix from the word that carried it.
    fn trim_token(&mut self, i: usize, bytes: u32) {
        self.tokens[i].span.0.start += bytes;
    }

    /// Copies the literal bytes of a word span, dropping the
    /// backslashes that escape other runes.
    fn unescape(&self, span: &Span) -> BString {
        let bytes = &self.pattern.as_bytes()[span.range()];
        let mut lit = Vec::with_capacity(bytes.len());
        let mut escaped = false;
        for &b in bytes {
            if escaped {
                lit.push(b);
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else {
                lit.push(b);
            }
        }
        BString::from(lit)
    }

    fn emit(&mut self, instr: Instr) -> InstrId {
        let id = self.instrs.len();
        self.instrs.push(instr);
        id
    }
}

fn parse_count(digits: &str, pos: usize) -> Result<u32, Error> {
    if digits.is_empty() {
        return Err(Error::InvalidCount { pos });
    }
    if let Some(bad) = digits.find(|c: char| !c.is_ascii_digit()) {
        return Err(Error::InvalidCount { pos: pos + bad });
    }
    digits.parse().map_err(|_| Error::InvalidCount { pos })
}

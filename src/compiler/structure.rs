/*! Structure analysis of the token list.

Suffix operators bind to the token *before* them, and an alternation fork
must be emitted *before* the first instruction of its first arm, at a point
that is only known once the whole enclosing group has been seen. Instead of
backtracking, the compiler runs this analysis pass first, which produces
two per-token maps:

- `suffix[i]` — the index of the suffix operator that binds to the atom or
  group ending at token `i`, if any.

- `pipes[i]` — alternation geometry. When `pipes[i].mid` is set, the token
  at index `i` is where an alternation fork must be emitted, and `mid` is
  the index of the first token of the fork's second arm. `end` is the index
  of the token that closes the alternation (its group's `)`), or `None`
  when the alternation runs to the end of the pattern.

Each additional `|` within the same group chains a new fork at the start
of the previous fork's second arm, so `a|b|c` becomes a right-nested pair
of binary forks.
*/

use crate::tokenizer::{Token, TokenKind};
use crate::Error;

/// Alternation geometry for one token position. See the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PipeSlot {
    pub(crate) mid: Option<usize>,
    pub(crate) end: Option<usize>,
}

/// Per-token suffix and alternation maps. See the module docs.
pub(crate) struct StructureMap {
    pub(crate) suffix: Vec<Option<usize>>,
    pub(crate) pipes: Vec<PipeSlot>,
}

/// Builds the suffix and alternation maps for a token list.
pub(crate) fn analyze(
    tokens: &[Token],
    max_nesting: usize,
) -> Result<StructureMap, Error> {
    let mut suffix = vec![None; tokens.len()];
    let mut pipes = vec![PipeSlot::default(); tokens.len()];

    // Token indices of the currently open `(`s.
    let mut groups: Vec<usize> = Vec::new();
    // Forks waiting for the token that closes them: fork slot index and
    // the group depth the fork belongs to.
    let mut pending: Vec<(usize, usize)> = Vec::new();
    // The token a suffix operator would bind to.
    let mut prev: Option<usize> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => {
                if groups.len() + 1 >= max_nesting {
                    return Err(Error::TooDeep { pos: token.span.start() });
                }
                groups.push(i);
                prev = None;
            }
            TokenKind::RParen => {
                let depth = groups.len();
                match groups.pop() {
                    // A suffix after `)` binds to the whole group.
                    Some(open) => prev = Some(open),
                    None => {
                        return Err(Error::Unbalanced {
                            pos: token.span.start(),
                        })
                    }
                }
                // Every fork opened inside this group closes here.
                while pending.last().map(|(_, d)| *d) == Some(depth) {
                    let (slot, _) = pending.pop().unwrap();
                    pipes[slot].end = Some(i);
                }
            }
            k if k.is_suffix() => match prev {
                Some(p) => {
                    suffix[p] = Some(i);
                    prev = None;
                }
                // A stray `?` is ignored, which keeps `(?...)` group
                // prefixes parseable after their `?` has been tokenized.
                None if k == TokenKind::Question => {}
                None => {
                    return Err(Error::Syntax { pos: token.span.start() })
                }
            },
            TokenKind::Pipe => {
                if i + 1 == tokens.len() {
                    return Err(Error::Syntax { pos: token.span.start() });
                }
                let depth = groups.len();
                let slot = match pending.last() {
                    // Another arm at the same depth: chain the new fork
                    // at the start of the previous fork's second arm.
                    Some((s, d)) if *d == depth => pipes[*s].mid.unwrap(),
                    _ => groups.last().map(|g| g + 1).unwrap_or(0),
                };
                if pending.len() + 1 >= max_nesting {
                    return Err(Error::TooDeep { pos: token.span.start() });
                }
                pipes[slot].mid = Some(i + 1);
                pending.push((slot, depth));
                prev = None;
            }
            _ => prev = Some(i),
        }
    }

    Ok(StructureMap { suffix, pipes })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::analyze;
    use crate::tokenizer::tokenize;
    use crate::{Error, DEFAULT_MAX_NESTING};

    fn suffixes(pattern: &str) -> Vec<Option<usize>> {
        let tokens = tokenize(pattern).unwrap();
        analyze(&tokens, DEFAULT_MAX_NESTING).unwrap().suffix
    }

    fn pipes(pattern: &str) -> Vec<(Option<usize>, Option<usize>)> {
        let tokens = tokenize(pattern).unwrap();
        analyze(&tokens, DEFAULT_MAX_NESTING)
            .unwrap()
            .pipes
            .iter()
            .map(|p| (p.mid, p.end))
            .collect()
    }

    #[test]
    fn suffix_binds_preceding_atom() {
        // a + b
        assert_eq!(suffixes("a+b"), vec![Some(1), None, None]);
        // a b{2} -> the run is split by nothing; `ab` coalesces, so the
        // suffix binds the whole word token
        assert_eq!(suffixes("ab{2}"), vec![Some(1), None]);
    }

    #[test]
    fn suffix_binds_group() {
        // ( ab ) + c
        assert_eq!(
            suffixes("(ab)+c"),
            vec![Some(3), None, None, None, None]
        );
    }

    #[test]
    fn stray_question_is_ignored() {
        assert_eq!(suffixes("?a"), vec![None, None]);
        // ( ? :ab )
        assert_eq!(suffixes("(?:ab)"), vec![None, None, None, None]);
    }

    #[test]
    fn stray_suffix_is_an_error() {
        let tokens = tokenize("*a").unwrap();
        assert_eq!(
            analyze(&tokens, DEFAULT_MAX_NESTING).err(),
            Some(Error::Syntax { pos: 0 })
        );
        let tokens = tokenize("a++").unwrap();
        assert_eq!(
            analyze(&tokens, DEFAULT_MAX_NESTING).err(),
            Some(Error::Syntax { pos: 2 })
        );
    }

    #[test]
    fn trailing_pipe_is_an_error() {
        let tokens = tokenize("a|").unwrap();
        assert_eq!(
            analyze(&tokens, DEFAULT_MAX_NESTING).err(),
            Some(Error::Syntax { pos: 1 })
        );
    }

    #[test]
    fn top_level_pipe() {
        // a | b -> fork at slot 0, second arm starts at token 2, no end
        assert_eq!(
            pipes("a|b"),
            vec![(Some(2), None), (None, None), (None, None)]
        );
    }

    #[test]
    fn pipe_inside_group_closes_at_rparen() {
        // ( a | b ) c
        assert_eq!(
            pipes("(a|b)c"),
            vec![
                (None, None),
                (Some(3), Some(4)),
                (None, None),
                (None, None),
                (None, None),
                (None, None),
            ]
        );
    }

    #[test]
    fn chained_pipes_share_the_end() {
        // ( a | b | c )
        assert_eq!(
            pipes("(a|b|c)"),
            vec![
                (None, None),
                (Some(3), Some(6)),
                (None, None),
                (Some(5), Some(6)),
                (None, None),
                (None, None),
                (None, None),
            ]
        );
    }

    #[test]
    fn unmatched_rparen() {
        let tokens = tokenize("a)").unwrap();
        assert_eq!(
            analyze(&tokens, DEFAULT_MAX_NESTING).err(),
            Some(Error::Unbalanced { pos: 1 })
        );
    }

    #[test]
    fn nesting_ceiling() {
        let pattern = "(".repeat(300);
        let tokens = tokenize(&pattern).unwrap();
        assert_eq!(
            analyze(&tokens, DEFAULT_MAX_NESTING).err(),
            Some(Error::TooDeep { pos: 255 })
        );
    }
}

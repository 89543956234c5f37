/*! Expansion of bracketed classes.

The body of a `[...]` token is turned into an explicit enumeration of its
member runes, a [`ClassBody`], before it is attached to a `Set`/`NSet`
instruction. Ranges like `a-z` are unfolded and every member is tagged with
its encoded width, so the matcher can treat non-ASCII members as multi-byte
literals.
*/

use crate::instr::ClassBody;
use crate::Error;

/// Expands the inner body of a bracketed class.
///
/// `body` excludes the surrounding brackets and the negation `^`, if any.
/// `base` is the byte offset of `body` within the whole pattern, used for
/// error positions.
///
/// A backslash makes the following rune a literal member. An unescaped
/// `a-b` appends the runes that follow `a`, up to and including `b` (the
/// `a` itself was appended when it was seen). A `-` that has no rune on
/// one of its sides is a literal member.
pub(crate) fn expand(body: &str, base: usize) -> Result<ClassBody, Error> {
    let runes: Vec<(usize, char)> = body.char_indices().collect();
    let mut class = ClassBody::default();
    let mut escaped = false;
    let mut i = 0;

    while i < runes.len() {
        let (off, rune) = runes[i];

        if escaped {
            escaped = false;
            class.push(rune);
        } else if rune == '\\' {
            escaped = true;
        } else if rune == '-' && i > 0 && i + 1 < runes.len() {
            let start = runes[i - 1].1;
            let end = runes[i + 1].1;
            if start > end {
                return Err(Error::InvalidRange { pos: base + off });
            }
            for r in (start..=end).skip(1) {
                class.push(r);
            }
            // The end rune is consumed by the range.
            i += 1;
        } else {
            class.push(rune);
        }

        i += 1;
    }

    Ok(class)
}

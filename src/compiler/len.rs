/*! Match-width analysis.

Computes the statically-known match width, in bytes, of an instruction or
of a composite's body, walking the flat stream through the end indices
stored in composite instructions. A width of `None` means the construct
can match spans of different lengths.

Look-behinds must have a fixed width, so the compiler runs this analysis
whenever a quantifier is emitted or a group closes while a look-behind is
open, and fails the parse when the result is `None`. Computed widths are
cached in each instruction.
*/

use crate::instr::{next_sibling, Instr, InstrId, InstrKind};

/// Width of the instruction at `id` as seen by its enclosing sequence.
///
/// Zero-width assertions, lookarounds included, contribute zero. The
/// result is cached in the instruction, except for lookarounds, whose
/// cached width is reserved for their body width (see [`body_len`]).
pub(crate) fn match_len(instrs: &mut [Instr], id: InstrId) -> Option<u32> {
    let len = match instrs[id].kind() {
        InstrKind::Word(lit) => Some(lit.len() as u32),
        InstrKind::Dot | InstrKind::Set(_) | InstrKind::NSet(_) => Some(1),
        InstrKind::UClass { .. }
        | InstrKind::Back(_)
        | InstrKind::Opt
        | InstrKind::Star
        | InstrKind::MStar
        | InstrKind::Plus
        | InstrKind::MPlus => None,
        InstrKind::Rep { min, max } => {
            let (min, max) = (*min, *max);
            if max == Some(min) && id + 1 < instrs.len() {
                match_len(instrs, id + 1)
                    .and_then(|w| w.checked_mul(min))
            } else {
                None
            }
        }
        InstrKind::Begin | InstrKind::End | InstrKind::Null => Some(0),
        InstrKind::Lookahead { .. }
        | InstrKind::NLookahead { .. }
        | InstrKind::Lookbehind { .. }
        | InstrKind::NLookbehind { .. } => return Some(0),
        InstrKind::Group { end } | InstrKind::CGroup { end, .. } => {
            let end = *end;
            range_len(instrs, id, id + 1, end)
        }
        InstrKind::Or { mid, end } => {
            let (mid, end) = (*mid, *end);
            let first = range_len(instrs, id, id + 1, mid);
            let second = range_len(instrs, id, mid, end);
            if first == second {
                first
            } else {
                None
            }
        }
    };
    instrs[id].set_len(len);
    len
}

/// Width of the body of the composite at `id`, cached in the composite.
///
/// For groups this equals their [`match_len`]; for lookarounds it is the
/// number of bytes the assertion examines, which the code generator needs
/// even though the assertion itself consumes nothing.
pub(crate) fn body_len(instrs: &mut [Instr], id: InstrId) -> Option<u32> {
    let end = instrs[id].kind().end().unwrap_or(id + 1);
    let len = range_len(instrs, id, id + 1, end);
    instrs[id].set_len(len);
    len
}

/// Sum of the widths of the siblings in `[from, to)`, owned by `owner`.
fn range_len(
    instrs: &mut [Instr],
    owner: InstrId,
    from: InstrId,
    to: InstrId,
) -> Option<u32> {
    let mut total: u32 = 0;
    let mut id = from;
    while id < to {
        let width = match_len(instrs, id);
        instrs[id].set_len_from(owner);
        total = total.checked_add(width?)?;
        id = next_sibling(instrs, id);
    }
    Some(total)
}

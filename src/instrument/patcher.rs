//! Redirection of control-flow references after an instruction has been displaced.
//!
//! When code is inserted before an instruction, every construct that entered at that
//! instruction must enter at the inserted code instead: exception clause boundaries and the
//! operands of branches, `leave` and `switch`. Since all of them hold [`InstrId`] handles, the
//! rewrite is a lookup-and-replace over the method body.

use crate::{
    assembly::{InstrId, Operand},
    metadata::method::MethodBody,
};

fn repoint(reference: &mut InstrId, displaced: InstrId, replacement: InstrId) -> usize {
    if *reference == displaced {
        *reference = replacement;
        1
    } else {
        0
    }
}

fn repoint_optional(
    reference: &mut Option<InstrId>,
    displaced: InstrId,
    replacement: InstrId,
) -> usize {
    match reference {
        Some(reference) => repoint(reference, displaced, replacement),
        None => 0,
    }
}

/// Redirect every reference to `displaced` in `body` to `replacement`.
///
/// Exception clause boundaries (filter start, try start and end, handler start and end) are
/// repointed as well as branch targets and every matching `switch` case. Returns the number of
/// references rewritten.
pub fn patch_references(body: &mut MethodBody, displaced: InstrId, replacement: InstrId) -> usize {
    let mut patched = 0;

    for handler in &mut body.exception_handlers {
        patched += repoint_optional(&mut handler.filter_start, displaced, replacement);
        patched += repoint(&mut handler.try_start, displaced, replacement);
        patched += repoint_optional(&mut handler.try_end, displaced, replacement);
        patched += repoint(&mut handler.handler_start, displaced, replacement);
        patched += repoint_optional(&mut handler.handler_end, displaced, replacement);
    }

    for instruction in body.instructions.instructions_mut() {
        match &mut instruction.operand {
            Operand::Target(target) => patched += repoint(target, displaced, replacement),
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    patched += repoint(target, displaced, replacement);
                }
            }
            _ => {}
        }
    }

    patched
}

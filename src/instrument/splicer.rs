//! Probe insertion in front of a selected instruction.
//!
//! A probe is the sequence
//!
//! ```text
//! ldstr   <hits file>
//! ldc.i4  <id>
//! call    void Hit(string, int32)
//! ```
//!
//! placed immediately before the instruction it reports. Every branch and exception clause that
//! entered at that instruction is redirected to the `ldstr`, so the probe runs on every path
//! that reaches the instruction.

use crate::{
    assembly::{opcodes, Immediate, InstrId, Instruction, Operand},
    instrument::patcher::patch_references,
    metadata::{method::MethodBody, token::Token},
    Result,
};

/// Extra operand stack slots a probe needs at its insertion point.
pub const PROBE_STACK_DEPTH: u16 = 2;

/// Tokens a probe refers to, valid within one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTarget {
    /// User string holding the hits file path
    pub hits_file: Token,
    /// Member reference of the hit recording method
    pub hit_method: Token,
}

/// Insert a probe reporting `id` in front of `target` and redirect all references to it.
///
/// Returns the handle of the probe's first instruction.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `target` is not part of `body`, and
/// [`crate::Error::Error`] if `id` does not fit into an `int32` constant.
pub fn splice_probe(
    body: &mut MethodBody,
    target: InstrId,
    probe: &ProbeTarget,
    id: u32,
) -> Result<InstrId> {
    let Ok(id) = i32::try_from(id) else {
        return Err(crate::Error::Error(format!(
            "Probe id {id} exceeds the int32 range"
        )));
    };

    let sequence = [
        Instruction::new(opcodes::LDSTR, Operand::Token(probe.hits_file))?,
        Instruction::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(id)))?,
        Instruction::new(opcodes::CALL, Operand::Token(probe.hit_method))?,
    ];

    let Some(position) = body.instructions.position(target) else {
        return Err(malformed_error!(
            "Probe target {:?} is not part of the method body",
            target
        ));
    };

    let mut entry = None;
    for (index, instruction) in sequence.into_iter().enumerate() {
        let inserted = body.instructions.insert_at(position + index, instruction)?;
        entry.get_or_insert(inserted);
    }
    let Some(entry) = entry else {
        return Err(malformed_error!("Empty probe sequence"));
    };

    patch_references(body, target, entry);
    Ok(entry)
}

//! CIL instruction encoding.
//!
//! [`encode_stream`] lays out an [`InstructionStream`] in program order, computes every branch
//! displacement from the final layout and emits the IL bytes. Short branch forms whose
//! displacement no longer fits into a signed byte (typically after probes were inserted between
//! a branch and its target) are widened to their long forms in place. Widening only grows the
//! layout, so the fix-point iteration terminates.
//!
//! ```rust
//! use cilcover::assembly::{decode_stream, encode_stream};
//!
//! let code = [0x00, 0x2B, 0x00, 0x2A]; // nop; br.s +0; ret
//! let mut stream = decode_stream(&code)?;
//! let encoded = encode_stream(&mut stream)?;
//! assert_eq!(encoded.code, code);
//! # Ok::<(), cilcover::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{Immediate, InstrId, Instruction, Operand, OperandType},
        opcodes,
        stream::InstructionStream,
    },
    file::writer::Writer,
    Result,
};

/// Result of encoding an instruction stream.
#[derive(Debug, Clone)]
pub struct EncodedCode {
    /// The IL bytes
    pub code: Vec<u8>,
    /// Offset of every instruction within `code`
    pub offsets: HashMap<InstrId, u32>,
}

impl EncodedCode {
    /// Offset of `id` in the encoded code.
    #[must_use]
    pub fn offset_of(&self, id: InstrId) -> Option<u32> {
        self.offsets.get(&id).copied()
    }

    /// Offset of `id`, or the end of the code for `None` (an open-ended region boundary).
    #[must_use]
    pub fn offset_or_end(&self, id: Option<InstrId>) -> Option<u32> {
        match id {
            Some(id) => self.offset_of(id),
            None => u32::try_from(self.code.len()).ok(),
        }
    }
}

/// Long form of a short branch opcode.
#[must_use]
pub fn long_branch_opcode(opcode: u8) -> Option<u8> {
    match opcode {
        opcodes::BR_S..=opcodes::BLT_UN_S => Some(opcode + opcodes::SHORT_TO_LONG_BRANCH),
        opcodes::LEAVE_S => Some(opcodes::LEAVE),
        _ => None,
    }
}

fn layout(stream: &InstructionStream) -> Result<HashMap<InstrId, u32>> {
    let mut offsets = HashMap::with_capacity(stream.len());
    let mut offset = 0_usize;
    for (id, instruction) in stream.iter() {
        let Ok(current) = u32::try_from(offset) else {
            return Err(malformed_error!("Method body exceeds the 4 GiB code limit"));
        };
        offsets.insert(id, current);
        offset += instruction.size();
    }
    Ok(offsets)
}

fn displacement(
    offsets: &HashMap<InstrId, u32>,
    target: InstrId,
    next_offset: i64,
) -> Result<i64> {
    match offsets.get(&target) {
        Some(target_offset) => Ok(i64::from(*target_offset) - next_offset),
        None => Err(malformed_error!(
            "Branch target {:?} is not part of the method body",
            target
        )),
    }
}

/// Widen every short branch whose displacement does not fit. Returns `true` if anything changed.
fn widen_short_branches(
    stream: &mut InstructionStream,
    offsets: &HashMap<InstrId, u32>,
) -> Result<bool> {
    let mut overflowing = Vec::new();
    for (id, instruction) in stream.iter() {
        if instruction.op_type != OperandType::ShortTarget {
            continue;
        }
        let Operand::Target(target) = instruction.operand else {
            continue;
        };

        let start = offsets.get(&id).copied().unwrap_or_default();
        let next_offset = i64::from(start) + instruction.size() as i64;
        let delta = displacement(offsets, target, next_offset)?;
        if i8::try_from(delta).is_err() {
            overflowing.push(id);
        }
    }

    for id in &overflowing {
        let Some(instruction) = stream.get_mut(*id) else {
            continue;
        };
        let Some(long_opcode) = long_branch_opcode(instruction.opcode) else {
            return Err(malformed_error!(
                "No long form for short branch {}",
                instruction.mnemonic
            ));
        };

        let mut widened =
            Instruction::from_parts(instruction.prefix, long_opcode, instruction.operand.clone())?;
        widened.offset = instruction.offset;
        *instruction = widened;
    }

    Ok(!overflowing.is_empty())
}

/// Encodes `stream` into IL bytes, widening short branches where required.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a branch targets an instruction outside the stream.
pub fn encode_stream(stream: &mut InstructionStream) -> Result<EncodedCode> {
    let mut offsets = layout(stream)?;
    while widen_short_branches(stream, &offsets)? {
        offsets = layout(stream)?;
    }

    let mut writer = Writer::new();
    for (_, instruction) in stream.iter() {
        encode_instruction(&mut writer, instruction, &offsets)?;
    }

    Ok(EncodedCode {
        code: writer.into_inner(),
        offsets,
    })
}

fn encode_instruction(
    writer: &mut Writer,
    instruction: &Instruction,
    offsets: &HashMap<InstrId, u32>,
) -> Result<()> {
    let next_offset = i64::try_from(writer.pos() + instruction.size()).unwrap_or(i64::MAX);

    if instruction.prefix == opcodes::FE_PREFIX {
        writer.write_le(opcodes::FE_PREFIX);
    }
    writer.write_le(instruction.opcode);

    match (&instruction.operand, instruction.op_type) {
        (Operand::None, _) => {}
        (Operand::Immediate(value), _) => match *value {
            Immediate::Int8(value) => writer.write_le(value),
            Immediate::UInt8(value) => writer.write_le(value),
            Immediate::UInt16(value) => writer.write_le(value),
            Immediate::Int32(value) => writer.write_le(value),
            Immediate::Int64(value) => writer.write_le(value),
            Immediate::Float32(value) => writer.write_le(value),
            Immediate::Float64(value) => writer.write_le(value),
        },
        (Operand::Token(token), _) => writer.write_le(token.value()),
        (Operand::Target(target), OperandType::ShortTarget) => {
            let delta = displacement(offsets, *target, next_offset)?;
            let Ok(delta) = i8::try_from(delta) else {
                return Err(malformed_error!(
                    "Short branch displacement {} out of range",
                    delta
                ));
            };
            writer.write_le(delta);
        }
        (Operand::Target(target), _) => {
            let delta = displacement(offsets, *target, next_offset)?;
            let Ok(delta) = i32::try_from(delta) else {
                return Err(malformed_error!("Branch displacement {} out of range", delta));
            };
            writer.write_le(delta);
        }
        (Operand::Switch(targets), _) => {
            let Ok(count) = u32::try_from(targets.len()) else {
                return Err(malformed_error!("Switch table too large"));
            };
            writer.write_le(count);
            for target in targets {
                let delta = displacement(offsets, *target, next_offset)?;
                let Ok(delta) = i32::try_from(delta) else {
                    return Err(malformed_error!("Switch displacement {} out of range", delta));
                };
                writer.write_le(delta);
            }
        }
    }

    Ok(())
}

//! CIL instruction decoding.
//!
//! Decoding happens in two passes. [`decode_instruction`] reads one instruction from a
//! [`crate::Parser`] and reports the absolute IL offsets its branch operand points at.
//! [`decode_stream`] decodes a whole method body this way and then resolves every offset to the
//! [`InstrId`] of the instruction starting there, rejecting targets that fall between
//! instruction boundaries or outside the body.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilcover::assembly::{decode_stream, Operand};
//!
//! // brtrue.s +1; nop; ret
//! let code = [0x2D, 0x01, 0x00, 0x2A];
//! let stream = decode_stream(&code)?;
//! assert_eq!(stream.len(), 3);
//!
//! let ids = stream.ids();
//! let branch = stream.get(ids[0]).unwrap();
//! assert_eq!(branch.operand, Operand::Target(ids[2]));
//! # Ok::<(), cilcover::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{Immediate, InstrId, Instruction, Operand, OperandType},
        instructions, opcodes,
        stream::InstructionStream,
    },
    file::parser::Parser,
    metadata::token::Token,
    Error, Result,
};

/// Placeholder used for branch operands until [`decode_stream`] resolves them.
const UNRESOLVED: InstrId = InstrId(u32::MAX);

/// A single instruction as read from the byte stream, before branch resolution.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// The decoded instruction; branch operands still hold unresolved placeholders
    pub instruction: Instruction,
    /// Absolute IL offsets of the branch or switch targets, in operand order
    pub targets: Vec<u32>,
}

/// Decodes a single CIL instruction at the current parser position.
///
/// The parser position is taken as the instruction's IL offset.
///
/// # Errors
/// Returns [`crate::Error::InvalidOpcode`] for reserved or unknown opcodes,
/// [`crate::Error::OutOfBounds`] for truncated operands and [`crate::Error::Malformed`] if a
/// branch displacement leaves the addressable range.
pub fn decode_instruction(parser: &mut Parser) -> Result<DecodedInstruction> {
    let offset = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let (prefix, opcode) = if first_byte == opcodes::FE_PREFIX {
        (opcodes::FE_PREFIX, parser.read_le::<u8>()?)
    } else {
        (0, first_byte)
    };

    let Some(entry) = instructions::lookup(prefix, opcode) else {
        return Err(Error::InvalidOpcode(
            (u16::from(prefix) << 8) | u16::from(opcode),
        ));
    };

    let mut displacements = Vec::new();
    let operand = match entry.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::ShortTarget => {
            displacements.push(i64::from(parser.read_le::<i8>()?));
            Operand::Target(UNRESOLVED)
        }
        OperandType::Target => {
            displacements.push(i64::from(parser.read_le::<i32>()?));
            Operand::Target(UNRESOLVED)
        }
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count.saturating_mul(4) > parser.remaining() {
                return Err(out_of_bounds_error!());
            }

            for _ in 0..case_count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }
            Operand::Switch(vec![UNRESOLVED; case_count])
        }
    };

    let next_offset = parser.pos() as i64;
    let mut targets = Vec::with_capacity(displacements.len());
    for displacement in displacements {
        let target = next_offset + displacement;
        let Ok(target) = u32::try_from(target) else {
            return Err(malformed_error!(
                "Branch at IL_{:04x} targets invalid offset {}",
                offset,
                target
            ));
        };
        targets.push(target);
    }

    let mut instruction = Instruction::from_parts(prefix, opcode, operand)?;
    let Ok(offset) = u32::try_from(offset) else {
        return Err(malformed_error!("Instruction offset {} is too large", offset));
    };
    instruction.offset = Some(offset);

    Ok(DecodedInstruction {
        instruction,
        targets,
    })
}

/// Decodes a complete CIL code block into an [`InstructionStream`] with resolved branches.
///
/// # Errors
/// Returns any error of [`decode_instruction`], and [`crate::Error::BranchTarget`] if a branch or
/// switch target does not start an instruction of `code`.
pub fn decode_stream(code: &[u8]) -> Result<InstructionStream> {
    let mut parser = Parser::new(code);
    let mut stream = InstructionStream::new();
    let mut pending = Vec::new();

    while parser.has_more_data() {
        let decoded = decode_instruction(&mut parser)?;
        let id = stream.push(decoded.instruction);
        if !decoded.targets.is_empty() {
            pending.push((id, decoded.targets));
        }
    }

    let offsets = stream.offset_map();
    for (id, targets) in pending {
        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            match offsets.get(&target) {
                Some(target_id) => resolved.push(*target_id),
                None => return Err(Error::BranchTarget(target)),
            }
        }

        if let Some(instruction) = stream.get_mut(id) {
            instruction.operand = resolve_operand(&instruction.operand, resolved)?;
        }
    }

    Ok(stream)
}

fn resolve_operand(operand: &Operand, resolved: Vec<InstrId>) -> Result<Operand> {
    match (operand, resolved.as_slice()) {
        (Operand::Target(_), [target]) => Ok(Operand::Target(*target)),
        (Operand::Switch(cases), _) if cases.len() == resolved.len() => {
            Ok(Operand::Switch(resolved))
        }
        _ => Err(malformed_error!("Branch operand does not match its targets")),
    }
}

impl InstructionStream {
    /// Map from original IL offset to handle for every decoded instruction.
    #[must_use]
    pub fn offset_map(&self) -> HashMap<u32, InstrId> {
        self.iter()
            .filter_map(|(id, instruction)| instruction.offset.map(|offset| (offset, id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{FlowType, InstructionCategory};

    #[test]
    fn decode_instruction_basic() {
        // ldloc.s 16
        let mut parser = Parser::new(&[0x11, 0x10]);
        let result = decode_instruction(&mut parser).unwrap();

        assert_eq!(result.instruction.offset, Some(0));
        assert_eq!(result.instruction.size(), 2);
        assert_eq!(result.instruction.mnemonic, "ldloc.s");
        assert_eq!(result.instruction.category, InstructionCategory::LoadStore);
        assert!(result.targets.is_empty());
        match result.instruction.operand {
            Operand::Immediate(Immediate::UInt8(value)) => assert_eq!(value, 0x10),
            other => panic!("Expected uint8 immediate, got {other:?}"),
        }
    }

    #[test]
    fn decode_instruction_two_byte() {
        let mut parser = Parser::new(&[0xFE, 0x01]);
        let result = decode_instruction(&mut parser).unwrap();

        assert_eq!(result.instruction.prefix, 0xFE);
        assert_eq!(result.instruction.opcode, 0x01);
        assert_eq!(result.instruction.mnemonic, "ceq");
        assert_eq!(result.instruction.flow_type, FlowType::Sequential);
    }

    #[test]
    fn decode_instruction_branch_target() {
        let mut parser = Parser::new(&[0x00, 0x2B, 0x0A]);
        parser.advance_by(1).unwrap();
        let result = decode_instruction(&mut parser).unwrap();

        assert_eq!(result.instruction.mnemonic, "br.s");
        assert_eq!(result.targets, vec![3 + 10]);
    }

    #[test]
    fn decode_instruction_backward_branch_before_start() {
        let mut parser = Parser::new(&[0x2B, 0xF0]);
        assert!(matches!(
            decode_instruction(&mut parser),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn decode_instruction_invalid_opcode() {
        let mut parser = Parser::new(&[0xFF]);
        assert!(matches!(
            decode_instruction(&mut parser),
            Err(Error::InvalidOpcode(0x00FF))
        ));
    }

    #[test]
    fn decode_instruction_truncated() {
        let mut parser = Parser::new(&[0x72, 0x01, 0x00]);
        assert!(matches!(
            decode_instruction(&mut parser),
            Err(Error::OutOfBounds { .. })
        ));

        // switch claiming far more cases than bytes available
        let mut parser = Parser::new(&[0x45, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(decode_instruction(&mut parser).is_err());
    }

    #[test]
    fn decode_stream_resolves_branches() {
        let code = [
            0x00, // IL_0000: nop
            0x2C, 0x02, // IL_0001: brfalse.s IL_0005
            0x00, // IL_0003: nop
            0x00, // IL_0004: nop
            0x2B, 0xFA, // IL_0005: br.s IL_0001
            0x2A, // IL_0007: ret
        ];

        let stream = decode_stream(&code).unwrap();
        let ids = stream.ids().to_vec();
        assert_eq!(ids.len(), 6);

        assert_eq!(stream.get(ids[1]).unwrap().operand, Operand::Target(ids[4]));
        assert_eq!(stream.get(ids[4]).unwrap().operand, Operand::Target(ids[1]));
        assert_eq!(stream.get(ids[5]).unwrap().offset, Some(7));
    }

    #[test]
    fn decode_stream_resolves_switch() {
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00, // IL_0000: switch (2 cases)
            0x01, 0x00, 0x00, 0x00, // case 0 -> IL_000e
            0x00, 0x00, 0x00, 0x00, // case 1 -> IL_000d
            0x00, // IL_000d: nop
            0x2A, // IL_000e: ret
        ];

        let stream = decode_stream(&code).unwrap();
        let ids = stream.ids().to_vec();
        assert_eq!(
            stream.get(ids[0]).unwrap().operand,
            Operand::Switch(vec![ids[2], ids[1]])
        );
    }

    #[test]
    fn decode_stream_rejects_mid_instruction_target() {
        // br.s into the middle of ldc.i4
        let code = [0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert!(matches!(decode_stream(&code), Err(Error::BranchTarget(3))));

        // branch past the end of the body
        let code = [0x2B, 0x05, 0x2A];
        assert!(matches!(decode_stream(&code), Err(Error::BranchTarget(7))));
    }

    #[test]
    fn decode_stream_empty() {
        let stream = decode_stream(&[]).unwrap();
        assert!(stream.is_empty());
    }
}

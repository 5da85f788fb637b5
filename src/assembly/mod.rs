//! CIL instruction model and codec.
//!
//! This module turns the IL bytes of a method body into an editable [`InstructionStream`] and
//! back. Branch and switch operands are resolved to stable [`InstrId`] handles while decoding, so
//! instructions can be inserted anywhere in the stream without recomputing displacements by
//! hand; the encoder lays the stream out again and widens short branches as needed.
//!
//! # Key Types
//! - [`Instruction`] - A single CIL instruction with its operand
//! - [`InstructionStream`] - Instructions of a method body in program order
//! - [`Operand`] - Instruction operands (immediates, tokens, targets)
//! - [`FlowType`] - How instructions affect control flow
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_stream`] - Decode a code block with resolved branch targets
//! - [`encode_stream`] - Lay out and encode a stream
//!
//! # Example
//! ```rust
//! use cilcover::assembly::{decode_stream, encode_stream, opcodes, Instruction, Operand};
//!
//! let mut stream = decode_stream(&[0x00, 0x2A])?; // nop, ret
//! let ret = stream.ids()[1];
//! stream.insert_before(ret, Instruction::new(opcodes::NOP, Operand::None)?)?;
//!
//! let encoded = encode_stream(&mut stream)?;
//! assert_eq!(encoded.code, vec![0x00, 0x00, 0x2A]);
//! # Ok::<(), cilcover::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod instructions;
pub mod opcodes;
mod stream;

pub use decoder::{decode_instruction, decode_stream, DecodedInstruction};
pub use encoder::{encode_stream, long_branch_opcode, EncodedCode};
pub use instruction::{
    FlowType, Immediate, InstrId, Instruction, InstructionCategory, Operand, OperandType,
};
pub use instructions::*;
pub use stream::InstructionStream;

//! CIL instruction representation and opcode metadata.
//!
//! Instructions inside a method body refer to each other through [`InstrId`] handles instead of
//! byte offsets. A handle stays valid while instructions are inserted around it, so branch
//! operands and exception handler boundaries survive body rewriting as long as every reference
//! is redirected by handle (see [`crate::instrument::patcher`]).
//!
//! # Key Components
//!
//! - [`crate::assembly::instruction::Instruction`] - A single instruction with its operand
//! - [`crate::assembly::instruction::Operand`] - Type-safe operand representation
//! - [`crate::assembly::instruction::OperandType`] - Operand encoding of an opcode
//! - [`crate::assembly::instruction::FlowType`] - Control flow behavior classification
//! - [`crate::assembly::instruction::InstructionCategory`] - Functional instruction grouping
//!
//! # Usage Examples
//!
//! ```rust
//! use cilcover::assembly::{opcodes, Immediate, Instruction, Operand};
//!
//! let push = Instruction::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(42)))?;
//! assert_eq!(push.mnemonic, "ldc.i4");
//! assert_eq!(push.size(), 5);
//!
//! // Operands are checked against the opcode
//! assert!(Instruction::new(opcodes::RET, Operand::Immediate(Immediate::Int32(1))).is_err());
//! # Ok::<(), cilcover::Error>(())
//! ```

use std::fmt;

use crate::{assembly::instructions, metadata::token::Token, Error, Result};

/// Stable handle of an instruction within one [`crate::assembly::InstructionStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub u32);

impl InstrId {
    /// Returns the arena index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Types of operands for CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Branch target encoded as a signed 8-bit displacement
    ShortTarget,
    /// Branch target encoded as a signed 32-bit displacement
    Target,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Returns the size in bytes of this operand type.
    ///
    /// Returns `None` for `Switch`, whose size depends on the number of targets.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::ShortTarget => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token | OperandType::Target => {
                Some(4)
            }
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            OperandType::None => "no operand",
            OperandType::Int8 => "an int8 immediate",
            OperandType::UInt8 => "a uint8 immediate",
            OperandType::UInt16 => "a uint16 immediate",
            OperandType::Int32 => "an int32 immediate",
            OperandType::Int64 => "an int64 immediate",
            OperandType::Float32 => "a float32 immediate",
            OperandType::Float64 => "a float64 immediate",
            OperandType::Token => "a metadata token",
            OperandType::ShortTarget | OperandType::Target => "a branch target",
            OperandType::Switch => "a switch table",
        }
    }
}

/// Represents an immediate value embedded in CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// Represents an operand after decoding.
///
/// Branch operands reference instructions by handle; the byte displacement is recomputed by
/// the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Metadata token reference
    Token(Token),
    /// Branch target
    Target(InstrId),
    /// Switch table with one target per case
    Switch(Vec<InstrId>),
}

impl Operand {
    fn matches(&self, op_type: OperandType) -> bool {
        matches!(
            (op_type, self),
            (OperandType::None, Operand::None)
                | (OperandType::Int8, Operand::Immediate(Immediate::Int8(_)))
                | (OperandType::UInt8, Operand::Immediate(Immediate::UInt8(_)))
                | (OperandType::UInt16, Operand::Immediate(Immediate::UInt16(_)))
                | (OperandType::Int32, Operand::Immediate(Immediate::Int32(_)))
                | (OperandType::Int64, Operand::Immediate(Immediate::Int64(_)))
                | (OperandType::Float32, Operand::Immediate(Immediate::Float32(_)))
                | (OperandType::Float64, Operand::Immediate(Immediate::Float64(_)))
                | (OperandType::Token, Operand::Token(_))
                | (
                    OperandType::ShortTarget | OperandType::Target,
                    Operand::Target(_)
                )
                | (OperandType::Switch, Operand::Switch(_))
        )
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Categorization of instructions by their primary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Arithmetic operations (add, sub, mul, div, rem, neg)
    Arithmetic,
    /// Bitwise and logical operations (and, or, xor, not, shl, shr)
    BitwiseLogical,
    /// Comparison operations (ceq, cgt, clt)
    Comparison,
    /// Control flow operations (br, switch, ret, call)
    ControlFlow,
    /// Type conversion operations (conv.i4, conv.r8, box)
    Conversion,
    /// Load and store operations (ldloc, stelem, ldarg)
    LoadStore,
    /// Object model operations (newobj, ldfld, castclass)
    ObjectModel,
    /// Prefix instructions (unaligned, volatile, tail, constrained, no, readonly)
    ///
    /// A prefix must be immediately followed by the instruction it modifies.
    Prefix,
    /// Miscellaneous operations (nop, break, dup)
    Misc,
}

/// A CIL instruction inside a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Primary opcode byte
    pub opcode: u8,
    /// Prefix byte (`0xFE` for two-byte opcodes, 0 otherwise)
    pub prefix: u8,
    /// Human-readable instruction mnemonic (e.g., "add", "ldloc.s", "ret")
    pub mnemonic: &'static str,
    /// Functional categorization of this instruction
    pub category: InstructionCategory,
    /// How this instruction affects control flow
    pub flow_type: FlowType,
    /// Encoding of the operand
    pub op_type: OperandType,
    /// The operand data for this instruction
    pub operand: Operand,
    /// IL offset at which this instruction was decoded, `None` for inserted instructions
    pub offset: Option<u32>,
}

impl Instruction {
    /// Create a single-byte opcode instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for reserved opcodes and
    /// [`crate::Error::InvalidOperand`] if `operand` does not fit the opcode.
    pub fn new(opcode: u8, operand: Operand) -> Result<Self> {
        Self::from_parts(0, opcode, operand)
    }

    /// Create a two-byte (`0xFE` page) opcode instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for reserved opcodes and
    /// [`crate::Error::InvalidOperand`] if `operand` does not fit the opcode.
    pub fn new_fe(opcode: u8, operand: Operand) -> Result<Self> {
        Self::from_parts(0xFE, opcode, operand)
    }

    /// Create an instruction from its prefix byte and opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for reserved opcodes and
    /// [`crate::Error::InvalidOperand`] if `operand` does not fit the opcode.
    pub fn from_parts(prefix: u8, opcode: u8, operand: Operand) -> Result<Self> {
        let Some(entry) = instructions::lookup(prefix, opcode) else {
            return Err(Error::InvalidOpcode(
                (u16::from(prefix) << 8) | u16::from(opcode),
            ));
        };

        if !operand.matches(entry.op_type) {
            return Err(Error::InvalidOperand {
                mnemonic: entry.instr,
                expected: entry.op_type.describe(),
            });
        }

        Ok(Instruction {
            opcode,
            prefix,
            mnemonic: entry.instr,
            category: entry.category,
            flow_type: entry.flow,
            op_type: entry.op_type,
            operand,
            offset: None,
        })
    }

    /// Returns `true` for prefix instructions, which must not be separated from their successor.
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        self.category == InstructionCategory::Prefix
    }

    /// Check if this instruction is a branch instruction.
    ///
    /// Returns `true` for any instruction carrying instruction-valued operands: conditional and
    /// unconditional branches, `leave` and `switch`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.operand, Operand::Target(_) | Operand::Switch(_))
    }

    /// Returns the targets of this instruction's branch operand, empty for non-branches.
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Returns the encoded size of the opcode bytes alone.
    #[must_use]
    pub fn opcode_size(&self) -> usize {
        if self.prefix == 0xFE {
            2
        } else {
            1
        }
    }

    /// Returns the encoded size of this instruction in bytes, given its current form.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand_size = match (&self.operand, self.op_type.size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 0,
        };
        self.opcode_size() + operand_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes;

    #[test]
    fn create_with_operands() {
        let ldstr = Instruction::new(opcodes::LDSTR, Operand::Token(Token::new(0x7000_0001)))
            .unwrap();
        assert_eq!(ldstr.mnemonic, "ldstr");
        assert_eq!(ldstr.size(), 5);
        assert_eq!(ldstr.offset, None);
        assert!(!ldstr.is_branch());

        let ceq = Instruction::new_fe(opcodes::FE_CEQ, Operand::None).unwrap();
        assert_eq!(ceq.size(), 2);
        assert_eq!(ceq.category, InstructionCategory::Comparison);
    }

    #[test]
    fn operand_mismatch() {
        let result = Instruction::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int8(1)));
        assert!(matches!(
            result,
            Err(Error::InvalidOperand {
                mnemonic: "ldc.i4",
                ..
            })
        ));
    }

    #[test]
    fn reserved_opcode() {
        assert!(matches!(
            Instruction::new(0x24, Operand::None),
            Err(Error::InvalidOpcode(0x0024))
        ));
        assert!(matches!(
            Instruction::new_fe(0x08, Operand::None),
            Err(Error::InvalidOpcode(0xFE08))
        ));
    }

    #[test]
    fn branch_targets_and_sizes() {
        let br = Instruction::new(opcodes::BR_S, Operand::Target(InstrId(3))).unwrap();
        assert!(br.is_branch());
        assert_eq!(br.targets(), vec![InstrId(3)]);
        assert_eq!(br.size(), 2);

        let switch = Instruction::new(
            opcodes::SWITCH,
            Operand::Switch(vec![InstrId(1), InstrId(2), InstrId(1)]),
        )
        .unwrap();
        assert_eq!(switch.size(), 1 + 4 + 12);
        assert_eq!(switch.targets().len(), 3);
    }

    #[test]
    fn prefix_detection() {
        let tail = Instruction::new_fe(opcodes::FE_TAIL, Operand::None).unwrap();
        assert!(tail.is_prefix());
        let unaligned = Instruction::new_fe(
            opcodes::FE_UNALIGNED,
            Operand::Immediate(Immediate::UInt8(1)),
        )
        .unwrap();
        assert!(unaligned.is_prefix());
        assert!(!Instruction::new(opcodes::NOP, Operand::None)
            .unwrap()
            .is_prefix());
    }
}

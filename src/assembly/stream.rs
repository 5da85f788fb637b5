//! Instruction storage with stable handles.
//!
//! [`InstructionStream`] keeps every instruction of a method body in an arena and records program
//! order separately. Inserting an instruction appends it to the arena and splices its handle into
//! the order, so existing [`InstrId`]s held elsewhere in the body keep pointing at the same
//! instruction.
//!
//! ```rust
//! use cilcover::assembly::{opcodes, Instruction, InstructionStream, Operand};
//!
//! let mut stream = InstructionStream::new();
//! let ret = stream.push(Instruction::new(opcodes::RET, Operand::None)?);
//! let nop = stream.insert_before(ret, Instruction::new(opcodes::NOP, Operand::None)?)?;
//!
//! assert_eq!(stream.ids(), &[nop, ret]);
//! assert_eq!(stream.previous(ret), Some(nop));
//! # Ok::<(), cilcover::Error>(())
//! ```

use std::fmt::Write;

use crate::{
    assembly::instruction::{InstrId, Instruction, Operand},
    Error, Result,
};

/// Instructions of one method body in program order, addressed by stable handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionStream {
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
}

impl InstructionStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        InstructionStream {
            arena: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Number of instructions in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the stream holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn allocate(&mut self, instruction: Instruction) -> InstrId {
        #[allow(clippy::cast_possible_truncation)]
        let id = InstrId(self.arena.len() as u32);
        self.arena.push(instruction);
        id
    }

    /// Append an instruction at the end of the stream.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.allocate(instruction);
        self.order.push(id);
        id
    }

    /// Insert an instruction at program position `index` (`index == len()` appends).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the end of the stream.
    pub fn insert_at(&mut self, index: usize, instruction: Instruction) -> Result<InstrId> {
        if index > self.order.len() {
            return Err(out_of_bounds_error!());
        }

        let id = self.allocate(instruction);
        self.order.insert(index, id);
        Ok(id)
    }

    /// Insert an instruction immediately before `target`.
    ///
    /// No reference to `target` is changed; redirecting branches and handlers is the caller's
    /// responsibility.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `target` is not part of this stream.
    pub fn insert_before(&mut self, target: InstrId, instruction: Instruction) -> Result<InstrId> {
        let Some(index) = self.position(target) else {
            return Err(malformed_error!(
                "Instruction {:?} is not part of the stream",
                target
            ));
        };
        self.insert_at(index, instruction)
    }

    /// Program position of `id`.
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Returns the instruction behind `id`.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id.index())
    }

    /// Returns the instruction behind `id` mutably.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.arena.get_mut(id.index())
    }

    /// Handles in program order.
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// First instruction in program order.
    #[must_use]
    pub fn first(&self) -> Option<InstrId> {
        self.order.first().copied()
    }

    /// Instruction immediately preceding `id` in program order.
    #[must_use]
    pub fn previous(&self, id: InstrId) -> Option<InstrId> {
        match self.position(id) {
            Some(index) if index > 0 => Some(self.order[index - 1]),
            _ => None,
        }
    }

    /// Iterate `(handle, instruction)` pairs in program order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.arena.get(id.index()).map(|instruction| (*id, instruction)))
    }

    /// Iterate every instruction mutably, in no particular order.
    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> + '_ {
        self.arena.iter_mut()
    }

    /// Finds the instruction decoded at `offset`.
    #[must_use]
    pub fn find_by_offset(&self, offset: u32) -> Option<InstrId> {
        self.iter()
            .find(|(_, instruction)| instruction.offset == Some(offset))
            .map(|(id, _)| id)
    }

    /// Original IL offset reported for `id`.
    ///
    /// Inserted instructions carry no offset of their own and report the offset of the next
    /// decoded instruction in program order, i.e. the instruction they were inserted in front of.
    #[must_use]
    pub fn original_offset(&self, id: InstrId) -> Option<u32> {
        let start = self.position(id)?;
        self.order[start..]
            .iter()
            .filter_map(|candidate| self.arena.get(candidate.index()))
            .find_map(|instruction| instruction.offset)
    }

    /// Render `id` as `IL_xxxx: mnemonic operand` using original offsets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `id` is not part of this stream.
    pub fn describe(&self, id: InstrId) -> Result<String> {
        let Some(instruction) = self.get(id) else {
            return Err(malformed_error!("Instruction {:?} is not part of the stream", id));
        };

        let mut text = format!(
            "{}: {}",
            self.label(id),
            instruction.mnemonic
        );
        match &instruction.operand {
            Operand::None => {}
            Operand::Immediate(value) => write!(text, " {value}").map_err(fmt_error)?,
            Operand::Token(token) => write!(text, " {token}").map_err(fmt_error)?,
            Operand::Target(target) => write!(text, " {}", self.label(*target)).map_err(fmt_error)?,
            Operand::Switch(targets) => {
                let labels: Vec<String> = targets.iter().map(|target| self.label(*target)).collect();
                write!(text, " ({})", labels.join(", ")).map_err(fmt_error)?;
            }
        }

        Ok(text)
    }

    fn label(&self, id: InstrId) -> String {
        match self.original_offset(id) {
            Some(offset) => format!("IL_{offset:04x}"),
            None => "IL_????".to_string(),
        }
    }
}

fn fmt_error(error: std::fmt::Error) -> Error {
    Error::Error(error.to_string())
}

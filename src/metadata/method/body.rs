//! Parsing and serialization of CIL method bodies.
//!
//! This module decodes a method body with its exception handling regions and encodes it back. Both tiny and fat method headers as specified by ECMA-335 are supported; on
//! serialization the smallest header and exception section format able to hold the body is
//! chosen automatically.
//!
//! # Examples
//!
//! ```rust
//! use cilcover::metadata::method::MethodBody;
//!
//! // tiny header (code size 2): nop, ret
//! let mut body = MethodBody::parse(&[0x0A, 0x00, 0x2A])?;
//! assert_eq!(body.max_stack, 8);
//! assert_eq!(body.instructions.len(), 2);
//!
//! let encoded = body.encode()?;
//! assert_eq!(encoded.bytes, vec![0x0A, 0x00, 0x2A]);
//! # Ok::<(), cilcover::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

use std::collections::HashMap;

use crate::{
    assembly::{decode_stream, encode_stream, EncodedCode, InstrId, InstructionStream},
    file::{io::read_le_at, writer::Writer},
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
    },
    Error, Result,
};

/// Size of a fat method header in bytes.
const FAT_HEADER_SIZE: usize = 12;
/// Size of a small exception clause in bytes.
const SMALL_CLAUSE_SIZE: usize = 12;
/// Size of a fat exception clause in bytes.
const FAT_CLAUSE_SIZE: usize = 24;

/// Exception clause with byte ranges, as stored in the method data sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawClause {
    flags: ExceptionHandlerFlags,
    try_offset: u32,
    try_length: u32,
    handler_offset: u32,
    handler_length: u32,
    class_token_or_filter: u32,
}

impl RawClause {
    fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}

/// A method body with its decoded instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum number of items on the operand stack
    pub max_stack: u16,
    /// Flag, indicating to call default constructor on all local variables
    pub init_locals: bool,
    /// `MetaData` token for a signature describing the layout of the local variables for the method. 0 == no local variables
    pub local_var_sig_token: u32,
    /// Instructions in program order
    pub instructions: InstructionStream,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

/// A serialized method body.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// Encoded body including the header
    pub bytes: Vec<u8>,
    /// Offset of every instruction relative to the start of the code
    pub offsets: HashMap<InstrId, u32>,
}

impl MethodBody {
    /// Create an empty body with the given stack depth.
    #[must_use]
    pub fn new(max_stack: u16) -> Self {
        MethodBody {
            max_stack,
            init_locals: false,
            local_var_sig_token: 0,
            instructions: InstructionStream::new(),
            exception_handlers: Vec::new(),
        }
    }

    /// Parse a method body from its serialized form.
    ///
    /// # Arguments
    /// * `data` - The encoded body of one method, starting at its header
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed, or if a branch or
    /// exception clause does not start on an instruction boundary.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = data[0];
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_00000011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodBody {
                    max_stack: 8,
                    init_locals: false,
                    local_var_sig_token: 0,
                    instructions: decode_stream(&data[1..=size_code])?,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < FAT_HEADER_SIZE {
                    return Err(out_of_bounds_error!());
                }

                let mut cursor = 0;
                let first_duo = read_le_at::<u16>(data, &mut cursor)?;
                let max_stack = read_le_at::<u16>(data, &mut cursor)?;
                let size_code = read_le_at::<u32>(data, &mut cursor)? as usize;
                let local_var_sig_token = read_le_at::<u32>(data, &mut cursor)?;

                let size_header = usize::from(first_duo >> 12) * 4;
                let Some(code_end) = size_header.checked_add(size_code) else {
                    return Err(out_of_bounds_error!());
                };
                if size_header < FAT_HEADER_SIZE || data.len() < code_end {
                    return Err(out_of_bounds_error!());
                }

                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000111111111111_u16);
                let instructions = decode_stream(&data[size_header..code_end])?;

                // Exception Handling -> II.25.4.6
                let raw_clauses = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::parse_sections(data, code_end)?
                } else {
                    Vec::new()
                };

                let offsets = instructions.offset_map();
                #[allow(clippy::cast_possible_truncation)]
                let code_size = size_code as u32;
                let exception_handlers = raw_clauses
                    .iter()
                    .map(|clause| Self::resolve_clause(clause, &offsets, code_size))
                    .collect::<Result<Vec<_>>>()?;

                Ok(MethodBody {
                    max_stack,
                    init_locals: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig_token,
                    instructions,
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    fn parse_sections(data: &[u8], code_end: usize) -> Result<Vec<RawClause>> {
        let mut clauses = Vec::new();
        let mut cursor = (code_end + 3) & !3;

        while data.len() >= cursor + 4 {
            let section_flags = SectionFlags::from_bits_truncate(data[cursor]);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                break;
            }

            let section_start = cursor;
            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let section_size = (read_le_at::<u32>(data, &mut cursor)? >> 8) as usize;
                if section_size < 4 || data.len() < section_start + section_size {
                    return Err(out_of_bounds_error!());
                }

                for _ in 0..(section_size - 4) / FAT_CLAUSE_SIZE {
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = ExceptionHandlerFlags::from_bits_truncate(
                        read_le_at::<u32>(data, &mut cursor)? as u16,
                    );
                    clauses.push(RawClause {
                        flags,
                        try_offset: read_le_at::<u32>(data, &mut cursor)?,
                        try_length: read_le_at::<u32>(data, &mut cursor)?,
                        handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                        handler_length: read_le_at::<u32>(data, &mut cursor)?,
                        class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
                cursor = section_start + section_size;
            } else {
                let section_size = usize::from(data[cursor + 1]);
                if section_size < 4 || data.len() < section_start + section_size {
                    return Err(out_of_bounds_error!());
                }

                cursor += 4;
                for _ in 0..(section_size - 4) / SMALL_CLAUSE_SIZE {
                    clauses.push(RawClause {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut cursor,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
                cursor = section_start + section_size;
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
            cursor = (cursor + 3) & !3;
        }

        Ok(clauses)
    }

    fn resolve_clause(
        clause: &RawClause,
        offsets: &HashMap<u32, InstrId>,
        code_size: u32,
    ) -> Result<ExceptionHandler> {
        let start = |offset: u32| -> Result<InstrId> {
            offsets
                .get(&offset)
                .copied()
                .ok_or(Error::BranchTarget(offset))
        };
        let end = |offset: u32, length: u32| -> Result<Option<InstrId>> {
            let Some(end) = offset.checked_add(length) else {
                return Err(malformed_error!("Exception clause range overflows"));
            };
            if end == code_size {
                Ok(None)
            } else {
                start(end).map(Some)
            }
        };

        let is_filter = clause.flags.contains(ExceptionHandlerFlags::FILTER);
        let is_typed = !is_filter
            && !clause
                .flags
                .intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT);

        Ok(ExceptionHandler {
            flags: clause.flags,
            try_start: start(clause.try_offset)?,
            try_end: end(clause.try_offset, clause.try_length)?,
            handler_start: start(clause.handler_offset)?,
            handler_end: end(clause.handler_offset, clause.handler_length)?,
            filter_start: if is_filter {
                Some(start(clause.class_token_or_filter)?)
            } else {
                None
            },
            class_token: if is_typed {
                Token::new(clause.class_token_or_filter)
            } else {
                Token::new(0)
            },
        })
    }

    fn raw_clause(handler: &ExceptionHandler, code: &EncodedCode) -> Result<RawClause> {
        let resolve = |id: Option<InstrId>| -> Result<u32> {
            code.offset_or_end(id).ok_or_else(|| {
                malformed_error!("Exception clause references an instruction outside the body")
            })
        };

        let try_offset = resolve(Some(handler.try_start))?;
        let try_end = resolve(handler.try_end)?;
        let handler_offset = resolve(Some(handler.handler_start))?;
        let handler_end = resolve(handler.handler_end)?;
        if try_end < try_offset || handler_end < handler_offset {
            return Err(malformed_error!("Exception clause ends before it starts"));
        }

        let class_token_or_filter = match handler.filter_start {
            Some(filter) if handler.is_filter() => resolve(Some(filter))?,
            _ => handler.class_token.value(),
        };

        Ok(RawClause {
            flags: handler.flags,
            try_offset,
            try_length: try_end - try_offset,
            handler_offset,
            handler_length: handler_end - handler_offset,
            class_token_or_filter,
        })
    }

    /// Serialize this body.
    ///
    /// Short branches that no longer reach their target are widened in place.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a branch or exception clause references an
    /// instruction that is not part of the body.
    pub fn encode(&mut self) -> Result<EncodedBody> {
        let code = encode_stream(&mut self.instructions)?;
        let clauses = self
            .exception_handlers
            .iter()
            .map(|handler| Self::raw_clause(handler, &code))
            .collect::<Result<Vec<_>>>()?;

        let mut writer = Writer::new();
        let is_tiny = code.code.len() < 64
            && self.max_stack <= 8
            && self.local_var_sig_token == 0
            && !self.init_locals
            && clauses.is_empty();

        if is_tiny {
            #[allow(clippy::cast_possible_truncation)]
            let header = ((code.code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8;
            writer.write_le(header);
            writer.write_bytes(&code.code);
        } else {
            let mut flags = MethodBodyFlags::FAT_FORMAT;
            if self.init_locals {
                flags |= MethodBodyFlags::INIT_LOCALS;
            }
            if !clauses.is_empty() {
                flags |= MethodBodyFlags::MORE_SECTS;
            }

            let Ok(code_size) = u32::try_from(code.code.len()) else {
                return Err(malformed_error!("Method body code is too large"));
            };
            #[allow(clippy::cast_possible_truncation)]
            let header_dwords = (FAT_HEADER_SIZE / 4) as u16;
            writer.write_le(flags.bits() | (header_dwords << 12));
            writer.write_le(self.max_stack);
            writer.write_le(code_size);
            writer.write_le(self.local_var_sig_token);
            writer.write_bytes(&code.code);

            if !clauses.is_empty() {
                writer.align(4);
                Self::write_section(&mut writer, &clauses)?;
            }
        }

        Ok(EncodedBody {
            bytes: writer.into_inner(),
            offsets: code.offsets,
        })
    }

    fn write_section(writer: &mut Writer, clauses: &[RawClause]) -> Result<()> {
        let small_size = 4 + clauses.len() * SMALL_CLAUSE_SIZE;
        if small_size <= usize::from(u8::MAX) && clauses.iter().all(RawClause::fits_small) {
            writer.write_le(SectionFlags::EHTABLE.bits());
            #[allow(clippy::cast_possible_truncation)]
            writer.write_le(small_size as u8);
            writer.write_le(0_u16);
            for clause in clauses {
                #[allow(clippy::cast_possible_truncation)]
                {
                    writer.write_le(clause.flags.bits());
                    writer.write_le(clause.try_offset as u16);
                    writer.write_le(clause.try_length as u8);
                    writer.write_le(clause.handler_offset as u16);
                    writer.write_le(clause.handler_length as u8);
                }
                writer.write_le(clause.class_token_or_filter);
            }
            return Ok(());
        }

        let fat_size = 4 + clauses.len() * FAT_CLAUSE_SIZE;
        let Ok(fat_size) = u32::try_from(fat_size) else {
            return Err(malformed_error!("Too many exception clauses"));
        };
        if fat_size > 0x00FF_FFFF {
            return Err(malformed_error!("Too many exception clauses"));
        }

        let kind = SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT;
        writer.write_le(u32::from(kind.bits()) | (fat_size << 8));
        for clause in clauses {
            writer.write_le(u32::from(clause.flags.bits()));
            writer.write_le(clause.try_offset);
            writer.write_le(clause.try_length);
            writer.write_le(clause.handler_offset);
            writer.write_le(clause.handler_length);
            writer.write_le(clause.class_token_or_filter);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{opcodes, Instruction, Operand};

    /// try { nop; leave.s END } catch (0x01000001) { pop; leave.s END } END: ret
    fn try_catch_body() -> Vec<u8> {
        let code = [
            0x00, // IL_0000: nop
            0xDE, 0x03, // IL_0001: leave.s IL_0006
            0x26, // IL_0003: pop
            0xDE, 0x00, // IL_0004: leave.s IL_0006
            0x2A, // IL_0006: ret
        ];

        let mut data = vec![0x1B, 0x30]; // fat, more sects, init locals, header size 3
        data.extend_from_slice(&2_u16.to_le_bytes());
        data.extend_from_slice(&(code.len() as u32).to_le_bytes());
        data.extend_from_slice(&0x1100_0001_u32.to_le_bytes());
        data.extend_from_slice(&code);
        data.push(0x00); // align to 4
        data.extend_from_slice(&[0x01, 16, 0x00, 0x00]); // small EH section, one clause
        data.extend_from_slice(&0_u16.to_le_bytes()); // EXCEPTION
        data.extend_from_slice(&0_u16.to_le_bytes()); // try offset
        data.push(3); // try length
        data.extend_from_slice(&3_u16.to_le_bytes()); // handler offset
        data.push(3); // handler length
        data.extend_from_slice(&0x0100_0001_u32.to_le_bytes());
        data
    }

    #[test]
    fn tiny() {
        let body = MethodBody::parse(&[0x0E, 0x00, 0x17, 0x2A]).unwrap();
        assert_eq!(body.max_stack, 8);
        assert!(!body.init_locals);
        assert_eq!(body.local_var_sig_token, 0);
        assert_eq!(body.instructions.len(), 3);
        assert!(body.exception_handlers.is_empty());
    }

    #[test]
    fn tiny_out_of_bounds() {
        assert!(matches!(
            MethodBody::parse(&[0x0E, 0x00]),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(MethodBody::parse(&[]).is_err());
        assert!(MethodBody::parse(&[0x01]).is_err());
    }

    #[test]
    fn fat_with_exception_handler() {
        let data = try_catch_body();
        let body = MethodBody::parse(&data).unwrap();

        assert_eq!(body.max_stack, 2);
        assert!(body.init_locals);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert_eq!(body.exception_handlers.len(), 1);

        let ids = body.instructions.ids().to_vec();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, ids[0]);
        assert_eq!(handler.try_end, Some(ids[2]));
        assert_eq!(handler.handler_start, ids[2]);
        assert_eq!(handler.handler_end, Some(ids[4]));
        assert_eq!(handler.filter_start, None);
        assert_eq!(handler.class_token, Token::new(0x0100_0001));
    }

    #[test]
    fn fat_roundtrip_is_stable() {
        let data = try_catch_body();
        let mut body = MethodBody::parse(&data).unwrap();
        let encoded = body.encode().unwrap();
        assert_eq!(encoded.bytes, data);
    }

    #[test]
    fn handler_to_end_of_body() {
        // try { nop; leave.s IL_0003 } IL_0003: ret; finally { endfinally } at the end of code
        let code = [0x00, 0xDE, 0x00, 0x2A, 0xDC];
        let mut data = vec![0x0B, 0x30];
        data.extend_from_slice(&1_u16.to_le_bytes());
        data.extend_from_slice(&(code.len() as u32).to_le_bytes());
        data.extend_from_slice(&0_u32.to_le_bytes());
        data.extend_from_slice(&code);
        data.extend_from_slice(&[0x00, 0x00, 0x00]); // align to 4
        data.extend_from_slice(&[0x01, 16, 0x00, 0x00]);
        data.extend_from_slice(&2_u16.to_le_bytes()); // FINALLY
        data.extend_from_slice(&0_u16.to_le_bytes());
        data.push(3);
        data.extend_from_slice(&4_u16.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&0_u32.to_le_bytes());

        let mut body = MethodBody::parse(&data).unwrap();
        let handler = &body.exception_handlers[0];
        assert!(handler.flags.contains(ExceptionHandlerFlags::FINALLY));
        assert_eq!(handler.handler_end, None);
        assert_eq!(handler.class_token, Token::new(0));

        assert_eq!(body.encode().unwrap().bytes, data);
    }

    #[test]
    fn clause_off_boundary_is_rejected() {
        let mut data = try_catch_body();
        // try length 2 ends inside leave.s
        let try_length_pos = data.len() - 8;
        data[try_length_pos] = 2;
        assert!(matches!(
            MethodBody::parse(&data),
            Err(Error::BranchTarget(2))
        ));
    }

    #[test]
    fn encode_switches_to_fat_header() {
        let mut body = MethodBody::new(10);
        body.instructions
            .push(Instruction::new(opcodes::RET, Operand::None).unwrap());

        let encoded = body.encode().unwrap();
        assert_eq!(encoded.bytes.len(), FAT_HEADER_SIZE + 1);
        assert_eq!(encoded.bytes[0] & 0x03, 0x03);

        let reparsed = MethodBody::parse(&encoded.bytes).unwrap();
        assert_eq!(reparsed.max_stack, 10);
        assert_eq!(reparsed.instructions.len(), 1);
    }

    #[test]
    fn encode_uses_fat_section_for_large_offsets() {
        let mut body = MethodBody::new(1);
        let first = body
            .instructions
            .push(Instruction::new(opcodes::NOP, Operand::None).unwrap());
        for _ in 0..300 {
            body.instructions
                .push(Instruction::new(opcodes::NOP, Operand::None).unwrap());
        }
        let handler = body
            .instructions
            .push(Instruction::new(opcodes::ENDFINALLY, Operand::None).unwrap());
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: first,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: None,
            filter_start: None,
            class_token: Token::new(0),
        });

        let encoded = body.encode().unwrap();
        let section = (FAT_HEADER_SIZE + 302 + 3) & !3;
        assert_eq!(
            encoded.bytes[section],
            (SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits()
        );

        let reparsed = MethodBody::parse(&encoded.bytes).unwrap();
        let ids = reparsed.instructions.ids().to_vec();
        assert_eq!(reparsed.exception_handlers[0].try_end, Some(ids[301]));
        assert_eq!(reparsed.exception_handlers[0].handler_end, None);
    }
}

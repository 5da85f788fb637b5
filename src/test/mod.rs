//! Shared builders and factories for unit tests.

pub mod factories;

use crate::{
    assembly::decode_stream,
    metadata::{
        method::{MethodBody, MethodDef},
        sequencepoints::{RawSequencePoint, SequencePoint},
    },
};

/// Builder for methods with decoded bodies and anchored sequence points.
pub struct MethodBuilder {
    name: String,
    max_stack: u16,
    code: Vec<u8>,
    points: Vec<RawSequencePoint>,
}

impl MethodBuilder {
    pub fn new(name: &str) -> Self {
        MethodBuilder {
            name: name.to_string(),
            max_stack: 8,
            code: vec![0x2A],
            points: Vec::new(),
        }
    }

    pub fn with_code(mut self, max_stack: u16, code: &[u8]) -> Self {
        self.max_stack = max_stack;
        self.code = code.to_vec();
        self
    }

    /// Add a visible sequence point `(start_line, start_col, end_line, end_col)` at `il_offset`.
    pub fn with_point(mut self, il_offset: u32, document: usize, span: (u32, u16, u32, u16)) -> Self {
        self.points.push(RawSequencePoint {
            il_offset,
            document,
            start_line: span.0,
            start_col: span.1,
            end_line: span.2,
            end_col: span.3,
            is_hidden: false,
        });
        self
    }

    pub fn build(self) -> MethodDef {
        let mut body = MethodBody::new(self.max_stack);
        body.instructions = decode_stream(&self.code).unwrap();
        let offsets = body.instructions.offset_map();

        let sequence_points = self
            .points
            .iter()
            .map(|raw| SequencePoint::anchor(raw, offsets[&raw.il_offset]))
            .collect();

        MethodDef {
            name: self.name,
            flags: 0x0096,
            impl_flags: 0,
            signature: vec![0x00, 0x00, 0x01],
            body: Some(body),
            sequence_points,
        }
    }
}

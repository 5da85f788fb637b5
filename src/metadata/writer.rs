//! Module image and symbol file serialization.
//!
//! The writer is the inverse of [`crate::metadata::loader`]. Method bodies are re-encoded while
//! the image is written; the resulting instruction offsets are used to key every sequence point
//! again, so the symbol file always matches the bodies written next to it.

use log::debug;

use crate::{
    file::writer::Writer,
    metadata::{
        loader::{IMAGE_MAGIC, IMAGE_MAJOR_VERSION, IMAGE_MINOR_VERSION},
        method::MethodDef,
        module::{Module, TypeDef},
        symbols::{MethodDebugRecord, SymbolFile},
        token::Token,
    },
    Result,
};

struct ImageWriter {
    writer: Writer,
    next_method_row: u32,
    records: Vec<MethodDebugRecord>,
}

impl ImageWriter {
    fn write_type(&mut self, ty: &mut TypeDef) -> Result<()> {
        self.writer.write_le(ty.flags);
        self.writer.write_prefixed_string_utf8(&ty.namespace);
        self.writer.write_prefixed_string_utf8(&ty.name);

        self.writer.write_count(ty.methods.len())?;
        for method in &mut ty.methods {
            self.write_method(method)?;
        }

        self.writer.write_count(ty.nested_types.len())?;
        for nested in &mut ty.nested_types {
            self.write_type(nested)?;
        }
        Ok(())
    }

    fn write_method(&mut self, method: &mut MethodDef) -> Result<()> {
        let token = Token::from_parts(Token::METHOD_DEF, self.next_method_row);
        self.next_method_row += 1;

        self.writer.write_le(method.flags);
        self.writer.write_le(method.impl_flags);
        self.writer.write_prefixed_string_utf8(&method.name);
        self.writer.write_blob(&method.signature)?;

        let Some(body) = method.body.as_mut() else {
            self.writer.write_le(0_u8);
            return Ok(());
        };

        let encoded = body.encode()?;
        self.writer.write_le(1_u8);
        self.writer.write_blob(&encoded.bytes)?;

        if method.sequence_points.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(method.sequence_points.len());
        for point in &method.sequence_points {
            let Some(offset) = encoded.offsets.get(&point.instruction) else {
                return Err(malformed_error!(
                    "Sequence point of {} references an instruction outside its body",
                    method.name
                ));
            };
            points.push(point.to_raw(*offset));
        }
        points.sort_by_key(|point| point.il_offset);

        self.records.push(MethodDebugRecord { token, points });
        Ok(())
    }
}

pub(crate) fn write_module(module: &mut Module) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let mut image = ImageWriter {
        writer: Writer::new(),
        next_method_row: 1,
        records: Vec::new(),
    };

    image.writer.write_le(IMAGE_MAGIC);
    image.writer.write_le(IMAGE_MAJOR_VERSION);
    image.writer.write_le(IMAGE_MINOR_VERSION);
    image.writer.write_prefixed_string_utf8(&module.name);

    image.writer.write_count(module.custom_attributes.len())?;
    for attribute in &module.custom_attributes {
        image.writer.write_prefixed_string_utf8(&attribute.type_name);
    }

    image.writer.write_count(module.member_refs.len())?;
    for member in &module.member_refs {
        image.writer.write_prefixed_string_utf8(&member.scope);
        image.writer.write_prefixed_string_utf8(&member.type_name);
        image.writer.write_prefixed_string_utf8(&member.name);
        image.writer.write_blob(&member.signature)?;
    }

    image.writer.write_count(module.user_strings.len())?;
    for value in &module.user_strings {
        image.writer.write_prefixed_string_utf8(value);
    }

    image.writer.write_count(module.types.len())?;
    for ty in &mut module.types {
        image.write_type(ty)?;
    }

    let symbols = match &module.symbols {
        Some(symbols) => Some(
            SymbolFile {
                documents: symbols.documents.clone(),
                methods: image.records,
            }
            .to_bytes()?,
        ),
        None => None,
    };

    let bytes = image.writer.into_inner();
    debug!("Serialized module {} ({} bytes)", module.name, bytes.len());
    Ok((bytes, symbols))
}

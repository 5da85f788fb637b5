//! Module image parsing and debug information attachment.
//!
//! ```text
//! u32   magic   = 0x4D4C_4943  ("CILM")
//! u16   major   = 1
//! u16   minor   = 0
//! str   module name
//! count custom attributes, each: str attribute type name
//! count member references, each: str scope, str type full name, str member name, blob signature
//! count user strings, each: str value
//! count top-level types, each TypeDef:
//!       u32 flags, str namespace, str name,
//!       count methods, each: u16 flags, u16 impl flags, str name, blob signature,
//!                            u8 has_body, [blob method body]
//!       count nested types, each TypeDef
//! ```

use log::{debug, warn};

use crate::{
    file::parser::Parser,
    metadata::{
        method::{MethodBody, MethodDef},
        module::{CustomAttribute, MemberRef, Module, ModuleSymbols, TypeDef},
        sequencepoints::SequencePoint,
        symbols::SymbolFile,
    },
    Result,
};

/// Magic number at the start of every module image.
pub const IMAGE_MAGIC: u32 = 0x4D4C_4943;
/// Supported major image version.
pub const IMAGE_MAJOR_VERSION: u16 = 1;
/// Image minor version written by this crate.
pub const IMAGE_MINOR_VERSION: u16 = 0;

/// Deepest type nesting accepted while parsing.
const MAX_NESTING_DEPTH: usize = 64;

pub(crate) fn parse_image(data: &[u8]) -> Result<Module> {
    let mut parser = Parser::new(data);

    let magic = parser.read_le::<u32>()?;
    if magic != IMAGE_MAGIC {
        return Err(malformed_error!("Invalid module image magic - 0x{:08X}", magic));
    }
    let major = parser.read_le::<u16>()?;
    let _minor = parser.read_le::<u16>()?;
    if major != IMAGE_MAJOR_VERSION {
        return Err(malformed_error!("Unsupported module image version {}", major));
    }

    let name = parser.read_prefixed_string_utf8()?;

    let mut custom_attributes = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        custom_attributes.push(CustomAttribute {
            type_name: parser.read_prefixed_string_utf8()?,
        });
    }

    let mut member_refs = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        member_refs.push(MemberRef {
            scope: parser.read_prefixed_string_utf8()?,
            type_name: parser.read_prefixed_string_utf8()?,
            name: parser.read_prefixed_string_utf8()?,
            signature: parser.read_blob()?.to_vec(),
        });
    }

    let mut user_strings = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        user_strings.push(parser.read_prefixed_string_utf8()?);
    }

    let mut types = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        types.push(parse_type(&mut parser, 0)?);
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after module image",
            parser.remaining()
        ));
    }

    debug!("Parsed module {} with {} top-level types", name, types.len());
    Ok(Module {
        name,
        custom_attributes,
        member_refs,
        user_strings,
        types,
        symbols: None,
    })
}

fn parse_type(parser: &mut Parser, depth: usize) -> Result<TypeDef> {
    if depth > MAX_NESTING_DEPTH {
        return Err(malformed_error!("Type nesting exceeds {} levels", MAX_NESTING_DEPTH));
    }

    let flags = parser.read_le::<u32>()?;
    let namespace = parser.read_prefixed_string_utf8()?;
    let name = parser.read_prefixed_string_utf8()?;

    let mut methods = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        methods.push(parse_method(parser)?);
    }

    let mut nested_types = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        nested_types.push(parse_type(parser, depth + 1)?);
    }

    Ok(TypeDef {
        flags,
        namespace,
        name,
        methods,
        nested_types,
    })
}

fn parse_method(parser: &mut Parser) -> Result<MethodDef> {
    let flags = parser.read_le::<u16>()?;
    let impl_flags = parser.read_le::<u16>()?;
    let name = parser.read_prefixed_string_utf8()?;
    let signature = parser.read_blob()?.to_vec();

    let body = match parser.read_le::<u8>()? {
        0 => None,
        1 => Some(MethodBody::parse(parser.read_blob()?)?),
        other => {
            return Err(malformed_error!(
                "Invalid body marker {} for method {}",
                other,
                name
            ))
        }
    };

    Ok(MethodDef {
        name,
        flags,
        impl_flags,
        signature,
        body,
        sequence_points: Vec::new(),
    })
}

pub(crate) fn attach_symbols(module: &mut Module, symbols: SymbolFile) -> Result<()> {
    let document_count = symbols.documents.len();

    for record in symbols.methods {
        let Some(method) = module.method_mut(record.token) else {
            warn!(
                "Dropping debug information of unknown method {}",
                record.token
            );
            continue;
        };
        let Some(body) = method.body.as_ref() else {
            warn!(
                "Dropping debug information of method {} without body",
                method.name
            );
            continue;
        };

        let offsets = body.instructions.offset_map();
        let mut points = Vec::with_capacity(record.points.len());
        for raw in &record.points {
            if raw.document >= document_count {
                return Err(malformed_error!(
                    "Sequence point of {} references unknown document {}",
                    method.name,
                    raw.document + 1
                ));
            }

            match offsets.get(&raw.il_offset) {
                Some(instruction) => points.push(SequencePoint::anchor(raw, *instruction)),
                None => warn!(
                    "Dropping sequence point at IL_{:04x} of {}: no instruction starts there",
                    raw.il_offset, method.name
                ),
            }
        }
        method.sequence_points = points;
    }

    module.symbols = Some(ModuleSymbols {
        documents: symbols.documents,
    });
    Ok(())
}

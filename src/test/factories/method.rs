//! Factory methods for method body test data.

use crate::{
    assembly::decode_stream,
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
    metadata::token::Token,
};

/// A body decoded from raw IL `code`, without exception handlers.
pub fn body_from_code(max_stack: u16, code: &[u8]) -> MethodBody {
    let mut body = MethodBody::new(max_stack);
    body.instructions = decode_stream(code).unwrap();
    body
}

/// A `try { nop } finally { }` body:
///
/// ```text
/// IL_0000: nop            try start
/// IL_0001: leave.s IL_0004
/// IL_0003: endfinally     try end, handler start
/// IL_0004: ret            handler end
/// ```
pub fn try_finally_body() -> MethodBody {
    let mut body = body_from_code(8, &[0x00, 0xDE, 0x01, 0xDC, 0x2A]);
    let at = |offset| body.instructions.find_by_offset(offset).unwrap();
    let handler = ExceptionHandler {
        flags: ExceptionHandlerFlags::FINALLY,
        try_start: at(0x00),
        try_end: Some(at(0x03)),
        handler_start: at(0x03),
        handler_end: Some(at(0x04)),
        filter_start: None,
        class_token: Token::new(0),
    };
    body.exception_handlers.push(handler);
    body
}

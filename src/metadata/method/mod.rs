//! Method definitions and their bodies.
//!
//! A [`MethodDef`] is one method row of a module: its name and flags plus an
//! optional [`MethodBody`]. Methods that came with debug information also carry their
//! [`crate::metadata::sequencepoints::SequencePoint`]s, anchored to instructions of the body.
//!
//! # Key Types
//! - [`MethodDef`] - A method definition
//! - [`MethodBody`] - Instructions and exception handlers of a method
//! - [`ExceptionHandler`] - A protected region and its handler
//! - [`MethodBodyFlags`], [`SectionFlags`] - Method header and data section flags

mod body;
mod exceptions;
mod types;

pub use body::{EncodedBody, MethodBody};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;

use crate::metadata::sequencepoints::SequencePoint;

/// Name of a static type initializer.
pub const CCTOR_NAME: &str = ".cctor";

/// Attributes of a synthesized type initializer: `private static hidebysig specialname rtspecialname`.
pub const CCTOR_FLAGS: u16 = 0x1891;

/// Signature blob of `void ()` with the default calling convention.
pub const VOID_NO_ARGS_SIGNATURE: [u8; 3] = [0x00, 0x00, 0x01];

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Raw method attributes, see [`MethodAccessFlags`] and [`MethodModifiers`]
    pub flags: u16,
    /// Raw method implementation attributes
    pub impl_flags: u16,
    /// Method signature blob
    pub signature: Vec<u8>,
    /// Body, `None` for methods without IL
    pub body: Option<MethodBody>,
    /// Sequence points of the body, empty without debug information
    pub sequence_points: Vec<SequencePoint>,
}

impl MethodDef {
    /// Create a `private static` type initializer whose body is a single `ret`.
    ///
    /// # Errors
    /// Propagates instruction construction errors.
    pub fn new_type_initializer() -> crate::Result<Self> {
        let mut body = MethodBody::new(0);
        body.instructions.push(crate::assembly::Instruction::new(
            crate::assembly::opcodes::RET,
            crate::assembly::Operand::None,
        )?);

        Ok(MethodDef {
            name: CCTOR_NAME.to_string(),
            flags: CCTOR_FLAGS,
            impl_flags: 0,
            signature: VOID_NO_ARGS_SIGNATURE.to_vec(),
            body: Some(body),
            sequence_points: Vec::new(),
        })
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        MethodModifiers::from_method_flags(u32::from(self.flags)).contains(MethodModifiers::STATIC)
    }

    /// Returns `true` for a static type initializer (`.cctor`).
    #[must_use]
    pub fn is_type_initializer(&self) -> bool {
        self.name == CCTOR_NAME
            && self.is_static()
            && MethodModifiers::from_method_flags(u32::from(self.flags))
                .contains(MethodModifiers::RTSPECIAL_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_type_initializer() {
        let cctor = MethodDef::new_type_initializer().unwrap();
        assert!(cctor.is_type_initializer());
        assert_eq!(
            MethodAccessFlags::from_method_flags(u32::from(cctor.flags)),
            MethodAccessFlags::PRIVATE
        );

        let body = cctor.body.unwrap();
        assert_eq!(body.instructions.len(), 1);
        let (_, ret) = body.instructions.iter().next().unwrap();
        assert_eq!(ret.mnemonic, "ret");
    }

    #[test]
    fn instance_cctor_is_not_an_initializer() {
        let mut method = MethodDef::new_type_initializer().unwrap();
        method.flags &= !(MethodModifiers::STATIC.bits() as u16);
        assert!(!method.is_type_initializer());
    }
}

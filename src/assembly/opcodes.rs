//! CIL opcode byte constants (ECMA-335) used when building and rewriting method bodies.
//!
//! Single-byte opcodes are named after their mnemonic (e.g. [`CALL`] = `0x28`). Two-byte
//! opcodes share the first byte [`FE_PREFIX`]; their second byte carries an `FE_` prefix
//! (e.g. [`FE_CEQ`] = `0x01` for `ceq`, encoded `0xFE 0x01`).
#![allow(missing_docs)]

// Misc
pub const NOP: u8 = 0x00;
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;

// Argument / local shorthand
pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const LDLOC_S: u8 = 0x11;

// Constants
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;
pub const LDC_I8: u8 = 0x21;
pub const LDC_R8: u8 = 0x23;

// Call / return
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;
pub const CALLVIRT: u8 = 0x6F;
pub const NEWOBJ: u8 = 0x73;

// Branches: short forms 0x2B..=0x37 map onto long forms 0x38..=0x44
pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BLT_UN_S: u8 = 0x37;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const BLT_UN: u8 = 0x44;
pub const SWITCH: u8 = 0x45;

// Arithmetic
pub const ADD: u8 = 0x58;
pub const SUB: u8 = 0x59;

// Object model
pub const LDSTR: u8 = 0x72;
pub const THROW: u8 = 0x7A;
pub const LDSFLD: u8 = 0x7E;
pub const STSFLD: u8 = 0x80;
pub const UNBOX_ANY: u8 = 0xA5;
pub const LDTOKEN: u8 = 0xD0;
pub const CONV_U: u8 = 0xE0;

// Exception handling
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

// Two-byte page
pub const FE_PREFIX: u8 = 0xFE;
pub const FE_CEQ: u8 = 0x01;
pub const FE_LDARG: u8 = 0x09;
pub const FE_ENDFILTER: u8 = 0x11;
pub const FE_UNALIGNED: u8 = 0x12;
pub const FE_VOLATILE: u8 = 0x13;
pub const FE_TAIL: u8 = 0x14;
pub const FE_CONSTRAINED: u8 = 0x16;
pub const FE_NO: u8 = 0x19;
pub const FE_RETHROW: u8 = 0x1A;
pub const FE_READONLY: u8 = 0x1E;

/// Difference between a short branch opcode and its long form.
pub const SHORT_TO_LONG_BRANCH: u8 = BR - BR_S;

//! Static CIL opcode tables (ECMA-335 Partition III).
//!
//! [`INSTRUCTIONS`] is indexed by the single opcode byte (`0x00`-`0xE0`), [`INSTRUCTIONS_FE`] by
//! the second byte of the two-byte `0xFE xx` page. Reserved slots carry an empty mnemonic; the
//! decoder rejects them.

use crate::assembly::instruction::{FlowType, InstructionCategory, OperandType};

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction<'a> {
    /// Mnemonic of the opcode, empty for reserved slots
    pub instr: &'a str,
    /// Operand encoding following the opcode bytes
    pub op_type: OperandType,
    /// Functional categorization of the opcode
    pub category: InstructionCategory,
    /// How the opcode affects control flow
    pub flow: FlowType,
}

impl CilInstruction<'_> {
    /// Returns `true` for reserved table slots.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.instr.is_empty()
    }
}

const fn op(
    instr: &'static str,
    op_type: OperandType,
    category: InstructionCategory,
    flow: FlowType,
) -> CilInstruction<'static> {
    CilInstruction {
        instr,
        op_type,
        category,
        flow,
    }
}

use FlowType::{
    Call, ConditionalBranch as Cond, EndFinally, Leave, Return, Sequential as Seq, Switch,
    Throw, UnconditionalBranch as Uncond,
};
use InstructionCategory::{
    Arithmetic as Arith, BitwiseLogical as Bits, Comparison as Cmp, ControlFlow as Ctrl,
    Conversion as Conv, LoadStore as Ls, Misc, ObjectModel as Obj, Prefix,
};
use OperandType::{
    Float32, Float64, Int32, Int64, Int8, None as No, ShortTarget, Switch as SwitchTable,
    Target, Token, UInt16, UInt8,
};

const RESERVED: CilInstruction<'static> = op("", No, Misc, Seq);

/// Single-byte opcodes, indexed by opcode value.
pub static INSTRUCTIONS: [CilInstruction<'static>; 225] = [
    op("nop", No, Misc, Seq),                    // 0x00
    op("break", No, Misc, Seq),                  // 0x01
    op("ldarg.0", No, Ls, Seq),                  // 0x02
    op("ldarg.1", No, Ls, Seq),                  // 0x03
    op("ldarg.2", No, Ls, Seq),                  // 0x04
    op("ldarg.3", No, Ls, Seq),                  // 0x05
    op("ldloc.0", No, Ls, Seq),                  // 0x06
    op("ldloc.1", No, Ls, Seq),                  // 0x07
    op("ldloc.2", No, Ls, Seq),                  // 0x08
    op("ldloc.3", No, Ls, Seq),                  // 0x09
    op("stloc.0", No, Ls, Seq),                  // 0x0A
    op("stloc.1", No, Ls, Seq),                  // 0x0B
    op("stloc.2", No, Ls, Seq),                  // 0x0C
    op("stloc.3", No, Ls, Seq),                  // 0x0D
    op("ldarg.s", UInt8, Ls, Seq),               // 0x0E
    op("ldarga.s", UInt8, Ls, Seq),              // 0x0F
    op("starg.s", UInt8, Ls, Seq),               // 0x10
    op("ldloc.s", UInt8, Ls, Seq),               // 0x11
    op("ldloca.s", UInt8, Ls, Seq),              // 0x12
    op("stloc.s", UInt8, Ls, Seq),               // 0x13
    op("ldnull", No, Ls, Seq),                   // 0x14
    op("ldc.i4.m1", No, Ls, Seq),                // 0x15
    op("ldc.i4.0", No, Ls, Seq),                 // 0x16
    op("ldc.i4.1", No, Ls, Seq),                 // 0x17
    op("ldc.i4.2", No, Ls, Seq),                 // 0x18
    op("ldc.i4.3", No, Ls, Seq),                 // 0x19
    op("ldc.i4.4", No, Ls, Seq),                 // 0x1A
    op("ldc.i4.5", No, Ls, Seq),                 // 0x1B
    op("ldc.i4.6", No, Ls, Seq),                 // 0x1C
    op("ldc.i4.7", No, Ls, Seq),                 // 0x1D
    op("ldc.i4.8", No, Ls, Seq),                 // 0x1E
    op("ldc.i4.s", Int8, Ls, Seq),               // 0x1F
    op("ldc.i4", Int32, Ls, Seq),                // 0x20
    op("ldc.i8", Int64, Ls, Seq),                // 0x21
    op("ldc.r4", Float32, Ls, Seq),              // 0x22
    op("ldc.r8", Float64, Ls, Seq),              // 0x23
    RESERVED,                                    // 0x24
    op("dup", No, Misc, Seq),                    // 0x25
    op("pop", No, Misc, Seq),                    // 0x26
    op("jmp", Token, Ctrl, Call),                // 0x27
    op("call", Token, Ctrl, Call),               // 0x28
    op("calli", Token, Ctrl, Call),              // 0x29
    op("ret", No, Ctrl, Return),                 // 0x2A
    op("br.s", ShortTarget, Ctrl, Uncond),       // 0x2B
    op("brfalse.s", ShortTarget, Ctrl, Cond),    // 0x2C
    op("brtrue.s", ShortTarget, Ctrl, Cond),     // 0x2D
    op("beq.s", ShortTarget, Ctrl, Cond),        // 0x2E
    op("bge.s", ShortTarget, Ctrl, Cond),        // 0x2F
    op("bgt.s", ShortTarget, Ctrl, Cond),        // 0x30
    op("ble.s", ShortTarget, Ctrl, Cond),        // 0x31
    op("blt.s", ShortTarget, Ctrl, Cond),        // 0x32
    op("bne.un.s", ShortTarget, Ctrl, Cond),     // 0x33
    op("bge.un.s", ShortTarget, Ctrl, Cond),     // 0x34
    op("bgt.un.s", ShortTarget, Ctrl, Cond),     // 0x35
    op("ble.un.s", ShortTarget, Ctrl, Cond),     // 0x36
    op("blt.un.s", ShortTarget, Ctrl, Cond),     // 0x37
    op("br", Target, Ctrl, Uncond),              // 0x38
    op("brfalse", Target, Ctrl, Cond),           // 0x39
    op("brtrue", Target, Ctrl, Cond),            // 0x3A
    op("beq", Target, Ctrl, Cond),               // 0x3B
    op("bge", Target, Ctrl, Cond),               // 0x3C
    op("bgt", Target, Ctrl, Cond),               // 0x3D
    op("ble", Target, Ctrl, Cond),               // 0x3E
    op("blt", Target, Ctrl, Cond),               // 0x3F
    op("bne.un", Target, Ctrl, Cond),            // 0x40
    op("bge.un", Target, Ctrl, Cond),            // 0x41
    op("bgt.un", Target, Ctrl, Cond),            // 0x42
    op("ble.un", Target, Ctrl, Cond),            // 0x43
    op("blt.un", Target, Ctrl, Cond),            // 0x44
    op("switch", SwitchTable, Ctrl, Switch),     // 0x45
    op("ldind.i1", No, Ls, Seq),                 // 0x46
    op("ldind.u1", No, Ls, Seq),                 // 0x47
    op("ldind.i2", No, Ls, Seq),                 // 0x48
    op("ldind.u2", No, Ls, Seq),                 // 0x49
    op("ldind.i4", No, Ls, Seq),                 // 0x4A
    op("ldind.u4", No, Ls, Seq),                 // 0x4B
    op("ldind.i8", No, Ls, Seq),                 // 0x4C
    op("ldind.i", No, Ls, Seq),                  // 0x4D
    op("ldind.r4", No, Ls, Seq),                 // 0x4E
    op("ldind.r8", No, Ls, Seq),                 // 0x4F
    op("ldind.ref", No, Ls, Seq),                // 0x50
    op("stind.ref", No, Ls, Seq),                // 0x51
    op("stind.i1", No, Ls, Seq),                 // 0x52
    op("stind.i2", No, Ls, Seq),                 // 0x53
    op("stind.i4", No, Ls, Seq),                 // 0x54
    op("stind.i8", No, Ls, Seq),                 // 0x55
    op("stind.r4", No, Ls, Seq),                 // 0x56
    op("stind.r8", No, Ls, Seq),                 // 0x57
    op("add", No, Arith, Seq),                   // 0x58
    op("sub", No, Arith, Seq),                   // 0x59
    op("mul", No, Arith, Seq),                   // 0x5A
    op("div", No, Arith, Seq),                   // 0x5B
    op("div.un", No, Arith, Seq),                // 0x5C
    op("rem", No, Arith, Seq),                   // 0x5D
    op("rem.un", No, Arith, Seq),                // 0x5E
    op("and", No, Bits, Seq),                    // 0x5F
    op("or", No, Bits, Seq),                     // 0x60
    op("xor", No, Bits, Seq),                    // 0x61
    op("shl", No, Bits, Seq),                    // 0x62
    op("shr", No, Bits, Seq),                    // 0x63
    op("shr.un", No, Bits, Seq),                 // 0x64
    op("neg", No, Arith, Seq),                   // 0x65
    op("not", No, Bits, Seq),                    // 0x66
    op("conv.i1", No, Conv, Seq),                // 0x67
    op("conv.i2", No, Conv, Seq),                // 0x68
    op("conv.i4", No, Conv, Seq),                // 0x69
    op("conv.i8", No, Conv, Seq),                // 0x6A
    op("conv.r4", No, Conv, Seq),                // 0x6B
    op("conv.r8", No, Conv, Seq),                // 0x6C
    op("conv.u4", No, Conv, Seq),                // 0x6D
    op("conv.u8", No, Conv, Seq),                // 0x6E
    op("callvirt", Token, Ctrl, Call),           // 0x6F
    op("cpobj", Token, Obj, Seq),                // 0x70
    op("ldobj", Token, Obj, Seq),                // 0x71
    op("ldstr", Token, Obj, Seq),                // 0x72
    op("newobj", Token, Obj, Call),              // 0x73
    op("castclass", Token, Obj, Seq),            // 0x74
    op("isinst", Token, Obj, Seq),               // 0x75
    op("conv.r.un", No, Conv, Seq),              // 0x76
    RESERVED,                                    // 0x77
    RESERVED,                                    // 0x78
    op("unbox", Token, Obj, Seq),                // 0x79
    op("throw", No, Ctrl, Throw),                // 0x7A
    op("ldfld", Token, Obj, Seq),                // 0x7B
    op("ldflda", Token, Obj, Seq),               // 0x7C
    op("stfld", Token, Obj, Seq),                // 0x7D
    op("ldsfld", Token, Obj, Seq),               // 0x7E
    op("ldsflda", Token, Obj, Seq),              // 0x7F
    op("stsfld", Token, Obj, Seq),               // 0x80
    op("stobj", Token, Obj, Seq),                // 0x81
    op("conv.ovf.i1.un", No, Conv, Seq),         // 0x82
    op("conv.ovf.i2.un", No, Conv, Seq),         // 0x83
    op("conv.ovf.i4.un", No, Conv, Seq),         // 0x84
    op("conv.ovf.i8.un", No, Conv, Seq),         // 0x85
    op("conv.ovf.u1.un", No, Conv, Seq),         // 0x86
    op("conv.ovf.u2.un", No, Conv, Seq),         // 0x87
    op("conv.ovf.u4.un", No, Conv, Seq),         // 0x88
    op("conv.ovf.u8.un", No, Conv, Seq),         // 0x89
    op("conv.ovf.i.un", No, Conv, Seq),          // 0x8A
    op("conv.ovf.u.un", No, Conv, Seq),          // 0x8B
    op("box", Token, Conv, Seq),                 // 0x8C
    op("newarr", Token, Obj, Seq),               // 0x8D
    op("ldlen", No, Obj, Seq),                   // 0x8E
    op("ldelema", Token, Obj, Seq),              // 0x8F
    op("ldelem.i1", No, Ls, Seq),                // 0x90
    op("ldelem.u1", No, Ls, Seq),                // 0x91
    op("ldelem.i2", No, Ls, Seq),                // 0x92
    op("ldelem.u2", No, Ls, Seq),                // 0x93
    op("ldelem.i4", No, Ls, Seq),                // 0x94
    op("ldelem.u4", No, Ls, Seq),                // 0x95
    op("ldelem.i8", No, Ls, Seq),                // 0x96
    op("ldelem.i", No, Ls, Seq),                 // 0x97
    op("ldelem.r4", No, Ls, Seq),                // 0x98
    op("ldelem.r8", No, Ls, Seq),                // 0x99
    op("ldelem.ref", No, Ls, Seq),               // 0x9A
    op("stelem.i", No, Ls, Seq),                 // 0x9B
    op("stelem.i1", No, Ls, Seq),                // 0x9C
    op("stelem.i2", No, Ls, Seq),                // 0x9D
    op("stelem.i4", No, Ls, Seq),                // 0x9E
    op("stelem.i8", No, Ls, Seq),                // 0x9F
    op("stelem.r4", No, Ls, Seq),                // 0xA0
    op("stelem.r8", No, Ls, Seq),                // 0xA1
    op("stelem.ref", No, Ls, Seq),               // 0xA2
    op("ldelem", Token, Ls, Seq),                // 0xA3
    op("stelem", Token, Ls, Seq),                // 0xA4
    op("unbox.any", Token, Obj, Seq),            // 0xA5
    RESERVED,                                    // 0xA6
    RESERVED,                                    // 0xA7
    RESERVED,                                    // 0xA8
    RESERVED,                                    // 0xA9
    RESERVED,                                    // 0xAA
    RESERVED,                                    // 0xAB
    RESERVED,                                    // 0xAC
    RESERVED,                                    // 0xAD
    RESERVED,                                    // 0xAE
    RESERVED,                                    // 0xAF
    RESERVED,                                    // 0xB0
    RESERVED,                                    // 0xB1
    RESERVED,                                    // 0xB2
    op("conv.ovf.i1", No, Conv, Seq),            // 0xB3
    op("conv.ovf.u1", No, Conv, Seq),            // 0xB4
    op("conv.ovf.i2", No, Conv, Seq),            // 0xB5
    op("conv.ovf.u2", No, Conv, Seq),            // 0xB6
    op("conv.ovf.i4", No, Conv, Seq),            // 0xB7
    op("conv.ovf.u4", No, Conv, Seq),            // 0xB8
    op("conv.ovf.i8", No, Conv, Seq),            // 0xB9
    op("conv.ovf.u8", No, Conv, Seq),            // 0xBA
    RESERVED,                                    // 0xBB
    RESERVED,                                    // 0xBC
    RESERVED,                                    // 0xBD
    RESERVED,                                    // 0xBE
    RESERVED,                                    // 0xBF
    RESERVED,                                    // 0xC0
    RESERVED,                                    // 0xC1
    op("refanyval", Token, Obj, Seq),            // 0xC2
    op("ckfinite", No, Arith, Seq),              // 0xC3
    RESERVED,                                    // 0xC4
    RESERVED,                                    // 0xC5
    op("mkrefany", Token, Obj, Seq),             // 0xC6
    RESERVED,                                    // 0xC7
    RESERVED,                                    // 0xC8
    RESERVED,                                    // 0xC9
    RESERVED,                                    // 0xCA
    RESERVED,                                    // 0xCB
    RESERVED,                                    // 0xCC
    RESERVED,                                    // 0xCD
    RESERVED,                                    // 0xCE
    RESERVED,                                    // 0xCF
    op("ldtoken", Token, Ls, Seq),               // 0xD0
    op("conv.u2", No, Conv, Seq),                // 0xD1
    op("conv.u1", No, Conv, Seq),                // 0xD2
    op("conv.i", No, Conv, Seq),                 // 0xD3
    op("conv.ovf.i", No, Conv, Seq),             // 0xD4
    op("conv.ovf.u", No, Conv, Seq),             // 0xD5
    op("add.ovf", No, Arith, Seq),               // 0xD6
    op("add.ovf.un", No, Arith, Seq),            // 0xD7
    op("mul.ovf", No, Arith, Seq),               // 0xD8
    op("mul.ovf.un", No, Arith, Seq),            // 0xD9
    op("sub.ovf", No, Arith, Seq),               // 0xDA
    op("sub.ovf.un", No, Arith, Seq),            // 0xDB
    op("endfinally", No, Ctrl, EndFinally),      // 0xDC
    op("leave", Target, Ctrl, Leave),            // 0xDD
    op("leave.s", ShortTarget, Ctrl, Leave),     // 0xDE
    op("stind.i", No, Ls, Seq),                  // 0xDF
    op("conv.u", No, Conv, Seq),                 // 0xE0
];

/// Two-byte opcodes, indexed by the byte following the `0xFE` prefix.
pub static INSTRUCTIONS_FE: [CilInstruction<'static>; 31] = [
    op("arglist", No, Misc, Seq),                // 0xFE 0x00
    op("ceq", No, Cmp, Seq),                     // 0xFE 0x01
    op("cgt", No, Cmp, Seq),                     // 0xFE 0x02
    op("cgt.un", No, Cmp, Seq),                  // 0xFE 0x03
    op("clt", No, Cmp, Seq),                     // 0xFE 0x04
    op("clt.un", No, Cmp, Seq),                  // 0xFE 0x05
    op("ldftn", Token, Obj, Seq),                // 0xFE 0x06
    op("ldvirtftn", Token, Obj, Seq),            // 0xFE 0x07
    RESERVED,                                    // 0xFE 0x08
    op("ldarg", UInt16, Ls, Seq),                // 0xFE 0x09
    op("ldarga", UInt16, Ls, Seq),               // 0xFE 0x0A
    op("starg", UInt16, Ls, Seq),                // 0xFE 0x0B
    op("ldloc", UInt16, Ls, Seq),                // 0xFE 0x0C
    op("ldloca", UInt16, Ls, Seq),               // 0xFE 0x0D
    op("stloc", UInt16, Ls, Seq),                // 0xFE 0x0E
    op("localloc", No, Misc, Seq),               // 0xFE 0x0F
    RESERVED,                                    // 0xFE 0x10
    op("endfilter", No, Ctrl, EndFinally),       // 0xFE 0x11
    op("unaligned.", UInt8, Prefix, Seq),        // 0xFE 0x12
    op("volatile.", No, Prefix, Seq),            // 0xFE 0x13
    op("tail.", No, Prefix, Seq),                // 0xFE 0x14
    op("initobj", Token, Obj, Seq),              // 0xFE 0x15
    op("constrained.", Token, Prefix, Seq),      // 0xFE 0x16
    op("cpblk", No, Misc, Seq),                  // 0xFE 0x17
    op("initblk", No, Misc, Seq),                // 0xFE 0x18
    op("no.", UInt8, Prefix, Seq),               // 0xFE 0x19
    op("rethrow", No, Ctrl, Throw),              // 0xFE 0x1A
    RESERVED,                                    // 0xFE 0x1B
    op("sizeof", Token, Obj, Seq),               // 0xFE 0x1C
    op("refanytype", No, Obj, Seq),              // 0xFE 0x1D
    op("readonly.", No, Prefix, Seq),            // 0xFE 0x1E
];

/// Looks up the table entry of an opcode.
///
/// `prefix` is `0xFE` for the two-byte page and `0` otherwise. Returns `None` for unknown and
/// reserved opcodes.
#[must_use]
pub fn lookup(prefix: u8, opcode: u8) -> Option<&'static CilInstruction<'static>> {
    let entry = match prefix {
        0 => INSTRUCTIONS.get(opcode as usize),
        0xFE => INSTRUCTIONS_FE.get(opcode as usize),
        _ => None,
    }?;

    if entry.is_reserved() {
        None
    } else {
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes;

    #[test]
    fn table_anchors() {
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::NOP)].instr, "nop");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::RET)].instr, "ret");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::SWITCH)].instr, "switch");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::LDSTR)].instr, "ldstr");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::UNBOX_ANY)].instr, "unbox.any");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::LDTOKEN)].instr, "ldtoken");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::LEAVE_S)].instr, "leave.s");
        assert_eq!(INSTRUCTIONS[usize::from(opcodes::CONV_U)].instr, "conv.u");
        assert_eq!(INSTRUCTIONS_FE[usize::from(opcodes::FE_CEQ)].instr, "ceq");
        assert_eq!(INSTRUCTIONS_FE[usize::from(opcodes::FE_TAIL)].instr, "tail.");
        assert_eq!(
            INSTRUCTIONS_FE[usize::from(opcodes::FE_READONLY)].instr,
            "readonly."
        );
    }

    #[test]
    fn prefixes_are_categorized() {
        let prefixes: Vec<&str> = INSTRUCTIONS_FE
            .iter()
            .filter(|entry| entry.category == InstructionCategory::Prefix)
            .map(|entry| entry.instr)
            .collect();
        assert_eq!(
            prefixes,
            ["unaligned.", "volatile.", "tail.", "constrained.", "no.", "readonly."]
        );
        assert!(INSTRUCTIONS
            .iter()
            .all(|entry| entry.category != InstructionCategory::Prefix));
    }

    #[test]
    fn reserved_lookup() {
        assert!(lookup(0, 0x24).is_none());
        assert!(lookup(0xFE, 0x08).is_none());
        assert!(lookup(0xFE, 0x40).is_none());
        assert!(lookup(0, 0xF0).is_none());
        assert_eq!(lookup(0, opcodes::CALL).map(|e| e.instr), Some("call"));
    }
}

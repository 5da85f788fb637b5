//! # cilcover Prelude
//!
//! Re-exports of the types needed to configure and run an instrumentation and to inspect
//! modules.

pub use crate::{Error, Result};

pub use crate::instrument::{
    AssemblyBackupRecord, InstrumentConfig, InstrumentationPoint, Instrumenter, MethodInfo,
    ModuleOutcome, ProbeApi, RunResult, SkipReason, SourceScope,
};

pub use crate::metadata::{
    method::{ExceptionHandler, MethodBody, MethodDef},
    module::{Module, TypeDef},
    sequencepoints::SequencePoint,
    symbols::SymbolFile,
    token::Token,
};

pub use crate::assembly::{InstrId, Instruction, InstructionStream, Operand};

//! Shared fixtures for the integration tests: temporary work roots with source files and
//! modules built through the public object model.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use cilcover::{
    assembly::{decode_stream, Immediate, InstrId, Operand},
    instrument::{InstrumentConfig, SourceScope},
    metadata::{
        method::{MethodBody, MethodDef},
        module::{MemberRef, Module, ModuleSymbols, TypeDef},
        sequencepoints::{RawSequencePoint, SequencePoint},
        token::Token,
    },
    Result,
};
use tempfile::TempDir;

/// Hits file embedded by every test run.
pub const HITS_FILE: &str = "/tmp/cilcover-tests/hits";

/// A temporary work root.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Ok(Workspace {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a source file, returning its absolute path as recorded in debug information.
    pub fn source(&self, relative: &str, lines: &[&str]) -> Result<String> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, lines.join("\n"))?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Write `module` and its symbol file below the work root.
    pub fn module(&self, relative: &str, module: &mut Module) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        module.write_to_file(&path)?;
        Ok(path)
    }

    /// Configuration with `sources` in scope.
    pub fn config<S: AsRef<str>>(&self, sources: &[S]) -> InstrumentConfig {
        let sources = sources.iter().map(|source| source.as_ref().to_string());
        InstrumentConfig::default()
            .with_hits_file(HITS_FILE)
            .with_scope(SourceScope::new(&self.root(), sources))
    }
}

/// A visible sequence point `(start_line, start_col)-(end_line, end_col)` at `il_offset`.
pub fn point(
    il_offset: u32,
    document: usize,
    start: (u32, u16),
    end: (u32, u16),
) -> RawSequencePoint {
    RawSequencePoint {
        il_offset,
        document,
        start_line: start.0,
        start_col: start.1,
        end_line: end.0,
        end_col: end.1,
        is_hidden: false,
    }
}

/// A static method with a body decoded from `code` and the given sequence points.
pub fn method(name: &str, code: &[u8], points: &[RawSequencePoint]) -> Result<MethodDef> {
    let mut body = MethodBody::new(8);
    body.instructions = decode_stream(code)?;
    let offsets = body.instructions.offset_map();

    let sequence_points = points
        .iter()
        .map(|raw| SequencePoint::anchor(raw, offsets[&raw.il_offset]))
        .collect();

    Ok(MethodDef {
        name: name.to_string(),
        flags: 0x0096,
        impl_flags: 0,
        signature: vec![0x00, 0x00, 0x01],
        body: Some(body),
        sequence_points,
    })
}

/// A module named `name` declaring `types` after the module type, with debug information
/// listing `documents`. It references `System.Console::WriteLine` as MemberRef row 1 and
/// holds the user string `"Hello"` as row 1.
pub fn module<S: AsRef<str>>(name: &str, documents: &[S], types: Vec<TypeDef>) -> Module {
    let mut module = Module::new(name);
    module.user_strings.push("Hello".to_string());
    module.member_refs.push(MemberRef::new(
        "System.Console",
        "System.Console",
        "WriteLine",
        vec![0x00, 0x01, 0x01, 0x0E],
    ));
    module.types.extend(types);
    module.symbols = Some(ModuleSymbols {
        documents: documents
            .iter()
            .map(|document| document.as_ref().to_string())
            .collect(),
    });
    module
}

/// A type `namespace.name` with `methods`.
pub fn type_with(namespace: &str, name: &str, methods: Vec<MethodDef>) -> TypeDef {
    let mut ty = TypeDef::new(namespace, name);
    ty.methods = methods;
    ty
}

fn hit_token(module: &Module) -> Option<Token> {
    module
        .member_refs
        .iter()
        .position(|member| member.name == "Hit")
        .map(|index| Token::from_parts(Token::MEMBER_REF, index as u32 + 1))
}

/// Handles of the probe sequences in `body`, `[ldstr, ldc.i4, call]` each.
pub fn probes(module: &Module, body: &MethodBody) -> Vec<[InstrId; 3]> {
    let Some(hit) = hit_token(module) else {
        return Vec::new();
    };

    let ids = body.instructions.ids();
    let mut probes = Vec::new();
    for (index, id) in ids.iter().enumerate() {
        let instruction = body.instructions.get(*id).unwrap();
        if instruction.mnemonic == "call" && instruction.operand == Operand::Token(hit) {
            assert!(index >= 2, "probe call without arguments");
            probes.push([ids[index - 2], ids[index - 1], *id]);
        }
    }
    probes
}

/// Ids passed to the hit method by every probe of `module`, in method and program order.
pub fn embedded_ids(module: &Module) -> Vec<u32> {
    let mut ids = Vec::new();
    for (_, method) in module.methods() {
        let Some(body) = method.body.as_ref() else {
            continue;
        };
        for [_, constant, _] in probes(module, body) {
            match body.instructions.get(constant).unwrap().operand {
                Operand::Immediate(Immediate::Int32(id)) => ids.push(id as u32),
                ref other => panic!("probe id operand expected, found {other:?}"),
            }
        }
    }
    ids
}

/// `body` with its probes removed, one line per instruction. Branch targets and exception
/// clause boundaries are printed as indexes into the listing; a target at a probe resolves to
/// the instruction the probe guards.
pub fn without_probes(module: &Module, body: &MethodBody) -> Vec<String> {
    let probe_ids: HashSet<InstrId> = probes(module, body).into_iter().flatten().collect();
    let kept: Vec<InstrId> = body
        .instructions
        .ids()
        .iter()
        .copied()
        .filter(|id| !probe_ids.contains(id))
        .collect();

    let resolve = |target: InstrId| -> String {
        let start = body.instructions.position(target).unwrap();
        body.instructions.ids()[start..]
            .iter()
            .find_map(|id| kept.iter().position(|candidate| candidate == id))
            .map_or_else(|| "end".to_string(), |index| format!("#{index}"))
    };

    let mut listing: Vec<String> = kept
        .iter()
        .map(|id| {
            let instruction = body.instructions.get(*id).unwrap();
            let operand = match &instruction.operand {
                Operand::Target(target) => resolve(*target),
                Operand::Switch(targets) => targets
                    .iter()
                    .map(|target| resolve(*target))
                    .collect::<Vec<_>>()
                    .join(","),
                other => format!("{other:?}"),
            };
            format!("{} {}", instruction.mnemonic, operand)
        })
        .collect();

    let boundary = |id: Option<InstrId>| id.map_or_else(|| "end".to_string(), resolve);
    for handler in &body.exception_handlers {
        listing.push(format!(
            "clause {:?} try {}..{} handler {}..{} filter {}",
            handler.flags,
            resolve(handler.try_start),
            boundary(handler.try_end),
            resolve(handler.handler_start),
            boundary(handler.handler_end),
            handler
                .filter_start
                .map_or_else(|| "none".to_string(), resolve),
        ));
    }
    listing
}

/// Load a module with its symbol file.
pub fn load(path: &Path) -> Result<Module> {
    Module::from_file(path)
}

/// The method named `name`.
pub fn method_named<'a>(module: &'a Module, name: &str) -> &'a MethodDef {
    module
        .methods()
        .into_iter()
        .map(|(_, method)| method)
        .find(|method| method.name == name)
        .unwrap()
}

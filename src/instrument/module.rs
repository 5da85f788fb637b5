//! Instrumentation of a single module.
//!
//! [`ModuleInstrumenter::instrument`] takes one module file from pristine to instrumented:
//!
//! 1. A backup left by an earlier run is restored first, so reruns never stack probes.
//! 2. Modules without a symbol file, or without a sequence point in a source file in scope,
//!    are skipped untouched.
//! 3. A module still carrying the marker attribute ([`ModuleState::Marked`]) without a backup
//!    to restore is an error; instrumenting it again would report every statement twice.
//! 4. The module and its symbol file are backed up, the marker is added, the companion is
//!    copied next to the module and a call to the companion's initializer is prepended to the
//!    module initializer.
//! 5. Every method receives a probe in front of each instrumentable sequence point, and the
//!    module and its symbol file are written back in place.
//!
//! Within a method, instrumentation stops for good at the first sequence point group of a
//! document out of scope, and at the first selected instruction preceded by a prefix
//! instruction. Probes already placed in that method are kept.

use std::path::{Path, PathBuf};

use log::{debug, info};
use strum::Display;

use crate::{
    assembly::{opcodes, Instruction, Operand},
    instrument::{
        config::InstrumentConfig,
        result::{AssemblyBackupRecord, InstrumentationPoint, MethodInfo},
        run::IdAllocator,
        selector::SourceCache,
        splicer::{splice_probe, ProbeTarget, PROBE_STACK_DEPTH},
    },
    metadata::{
        method::MethodDef,
        module::{MemberRef, Module, TypeDef},
        sequencepoints::SequencePoint,
        symbols::SymbolFile,
    },
    Error, Result,
};

/// Instrumentation state of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModuleState {
    /// No marker attribute; the module may be instrumented
    Pristine,
    /// The marker attribute is present
    Marked,
}

impl ModuleState {
    /// State of `module` with respect to the marker attribute `marker`.
    #[must_use]
    pub fn of(module: &Module, marker: &str) -> Self {
        if module.has_custom_attribute(marker) {
            ModuleState::Marked
        } else {
            ModuleState::Pristine
        }
    }
}

/// Why a module was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// No symbol file accompanies the module
    #[strum(to_string = "no debug symbols")]
    MissingSymbols,
    /// No sequence point of the module lies in a source file in scope
    #[strum(to_string = "no source file in scope")]
    NoSourceInScope,
}

/// A module that received probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedModule {
    /// Pristine copies of the module and its symbol file
    pub backup: AssemblyBackupRecord,
    /// Where the companion was copied to, if one is configured
    pub companion: Option<PathBuf>,
    /// Probes placed, in id order
    pub points: Vec<InstrumentationPoint>,
}

/// Result of processing one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// The module was left as it is
    Skipped(SkipReason),
    /// The module was rewritten
    Instrumented(InstrumentedModule),
}

/// Path of the backup of `path`: the path with `suffix` appended.
#[must_use]
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn restore_file(backup: &Path, original: &Path) -> Result<bool> {
    if !backup.is_file() {
        return Ok(false);
    }

    std::fs::copy(backup, original)?;
    std::fs::remove_file(backup)?;
    Ok(true)
}

/// Copy the backups of `record` over the files they were taken of and delete them.
///
/// Returns `true` if at least one file was restored.
///
/// # Errors
/// Returns [`crate::Error::FileError`] if a backup cannot be copied or removed.
pub fn restore(record: &AssemblyBackupRecord) -> Result<bool> {
    let module = restore_file(&record.backup_path, &record.original_path)?;
    let symbols = restore_file(&record.symbols_backup_path, &record.symbols_original_path)?;
    Ok(module || symbols)
}

struct ModuleContext<'m> {
    assembly: String,
    documents: &'m [String],
    probe: ProbeTarget,
}

/// Instruments modules one at a time, sharing the id sequence and source cache of a run.
pub struct ModuleInstrumenter<'a> {
    config: &'a InstrumentConfig,
    sources: &'a mut SourceCache,
    ids: &'a mut IdAllocator,
}

impl<'a> ModuleInstrumenter<'a> {
    /// Create an instrumenter drawing probe ids from `ids`.
    pub fn new(
        config: &'a InstrumentConfig,
        sources: &'a mut SourceCache,
        ids: &'a mut IdAllocator,
    ) -> Self {
        ModuleInstrumenter {
            config,
            sources,
            ids,
        }
    }

    /// Backup paths used for the module at `path`.
    #[must_use]
    pub fn backup_record(&self, path: &Path) -> AssemblyBackupRecord {
        let symbols = SymbolFile::path_for(path);
        AssemblyBackupRecord {
            backup_path: backup_path(path, &self.config.backup_suffix),
            original_path: path.to_path_buf(),
            symbols_backup_path: backup_path(&symbols, &self.config.backup_suffix),
            symbols_original_path: symbols,
        }
    }

    /// Instrument the module at `path` in place.
    ///
    /// # Errors
    /// Returns [`crate::Error::AlreadyInstrumented`] if the module carries the marker attribute
    /// and no backup exists, [`crate::Error::FileError`] on I/O failures, and any error of
    /// parsing or writing the module.
    pub fn instrument(&mut self, path: &Path) -> Result<ModuleOutcome> {
        let backup = self.backup_record(path);
        if restore(&backup)? {
            debug!("Restored {} from {}", path.display(), backup.backup_path.display());
        }

        if !backup.symbols_original_path.is_file() {
            return Ok(Self::skip(path, SkipReason::MissingSymbols));
        }

        let mut module = Module::from_file(path)?;
        let documents = match &module.symbols {
            Some(symbols) => symbols.documents.clone(),
            None => return Ok(Self::skip(path, SkipReason::MissingSymbols)),
        };

        if !self.has_source_in_scope(&module, &documents) {
            return Ok(Self::skip(path, SkipReason::NoSourceInScope));
        }

        if ModuleState::of(&module, &self.config.marker_attribute) == ModuleState::Marked {
            return Err(Error::AlreadyInstrumented(path.to_path_buf()));
        }

        std::fs::copy(path, &backup.backup_path)?;
        std::fs::copy(
            &backup.symbols_original_path,
            &backup.symbols_backup_path,
        )?;

        module.add_custom_attribute(&self.config.marker_attribute);
        let companion = self.deploy_companion(path)?;
        self.inject_initializer(&mut module)?;

        let context = ModuleContext {
            assembly: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| module.name.clone()),
            documents: &documents,
            probe: self.import_probe(&mut module),
        };

        let mut points = Vec::new();
        for ty in &mut module.types {
            let class = ty.full_name();
            self.instrument_type(ty, &class, &context, &mut points)?;
        }

        module.write_to_file(path)?;
        info!(
            "Instrumented {} with {} probes",
            path.display(),
            points.len()
        );

        Ok(ModuleOutcome::Instrumented(InstrumentedModule {
            backup,
            companion,
            points,
        }))
    }

    fn skip(path: &Path, reason: SkipReason) -> ModuleOutcome {
        debug!("Skipping {}: {}", path.display(), reason);
        ModuleOutcome::Skipped(reason)
    }

    fn has_source_in_scope(&self, module: &Module, documents: &[String]) -> bool {
        module.methods().iter().any(|(_, method)| {
            method.sequence_points.iter().any(|point| {
                documents
                    .get(point.document)
                    .is_some_and(|document| self.config.scope.contains(document))
            })
        })
    }

    fn deploy_companion(&self, path: &Path) -> Result<Option<PathBuf>> {
        let Some(companion) = &self.config.companion else {
            return Ok(None);
        };
        let Some(file_name) = companion.file_name() else {
            return Err(Error::Error(format!(
                "Companion path {} has no file name",
                companion.display()
            )));
        };

        let target = path.with_file_name(file_name);
        if target != *companion {
            std::fs::copy(companion, &target)?;
            debug!("Copied {} to {}", companion.display(), target.display());
        }
        Ok(Some(target))
    }

    fn import_probe(&self, module: &mut Module) -> ProbeTarget {
        let api = &self.config.probe;
        ProbeTarget {
            hits_file: module.intern_user_string(&self.config.hits_file),
            hit_method: module.import_member_ref(MemberRef::new(
                &api.scope,
                &api.type_name,
                &api.hit_method,
                api.hit_signature(),
            )),
        }
    }

    /// Prepend `ldstr <hits file>; call Init(string)` to the module initializer.
    fn inject_initializer(&self, module: &mut Module) -> Result<()> {
        let api = &self.config.probe;
        let init = module.import_member_ref(MemberRef::new(
            &api.scope,
            &api.type_name,
            &api.init_method,
            api.init_signature(),
        ));
        let hits_file = module.intern_user_string(&self.config.hits_file);

        let initializer = module.module_initializer_mut()?;
        let Some(body) = initializer.body.as_mut() else {
            return Err(malformed_error!("Module initializer has no body"));
        };

        body.instructions.insert_at(
            0,
            Instruction::new(opcodes::LDSTR, Operand::Token(hits_file))?,
        )?;
        body.instructions
            .insert_at(1, Instruction::new(opcodes::CALL, Operand::Token(init))?)?;
        body.max_stack = body.max_stack.max(1);
        Ok(())
    }

    fn instrument_type(
        &mut self,
        ty: &mut TypeDef,
        class: &str,
        context: &ModuleContext<'_>,
        points: &mut Vec<InstrumentationPoint>,
    ) -> Result<()> {
        for nested in &mut ty.nested_types {
            let nested_class = format!("{}/{}", class, nested.full_name());
            self.instrument_type(nested, &nested_class, context, points)?;
        }

        for method in &mut ty.methods {
            self.instrument_method(method, class, context, points)?;
        }
        Ok(())
    }

    fn instrument_method(
        &mut self,
        method: &mut MethodDef,
        class: &str,
        context: &ModuleContext<'_>,
        points: &mut Vec<InstrumentationPoint>,
    ) -> Result<()> {
        let Some(body) = method.body.as_mut() else {
            return Ok(());
        };

        let mut groups: Vec<(usize, Vec<SequencePoint>)> = Vec::new();
        for point in &method.sequence_points {
            match groups.iter_mut().find(|(document, _)| *document == point.document) {
                Some((_, group)) => group.push(*point),
                None => groups.push((point.document, vec![*point])),
            }
        }

        let mut probes = 0;
        'groups: for (index, group) in groups {
            let Some(document) = context.documents.get(index) else {
                return Err(malformed_error!(
                    "Sequence point of {} references unknown document {}",
                    method.name,
                    index + 1
                ));
            };
            let Some(relative) = self.config.scope.resolve(document) else {
                debug!(
                    "Stopping at {}::{}: {} is out of scope",
                    class, method.name, document
                );
                break;
            };

            for point in group {
                if self.sources.select(Path::new(document), &point)?.is_none() {
                    continue;
                }

                let preceded_by_prefix = body
                    .instructions
                    .previous(point.instruction)
                    .and_then(|previous| body.instructions.get(previous))
                    .is_some_and(Instruction::is_prefix);
                if preceded_by_prefix {
                    debug!(
                        "Stopping at {}::{}: statement at line {} follows a prefix",
                        class, method.name, point.start_line
                    );
                    break 'groups;
                }

                let instruction = body.instructions.describe(point.instruction)?;
                let id = self.ids.allocate();
                splice_probe(body, point.instruction, &context.probe, id)?;
                probes += 1;

                points.push(InstrumentationPoint {
                    id,
                    source_relative_path: relative.to_string(),
                    start_line: point.start_line,
                    end_line: point.end_line,
                    start_column: point.start_col,
                    end_column: point.end_col,
                    instruction,
                    method: MethodInfo {
                        assembly: context.assembly.clone(),
                        class: class.to_string(),
                        name: method.name.clone(),
                    },
                });
            }
        }

        if probes > 0 {
            body.max_stack = body.max_stack.saturating_add(PROBE_STACK_DEPTH);
        }
        Ok(())
    }
}

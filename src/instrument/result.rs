//! The outcome of an instrumentation run.
//!
//! A [`RunResult`] lists every probe embedded during the run, keyed by the source file the probed
//! statement belongs to, together with the backups and companion copies the run created. Report
//! tooling joins it with the ids recorded in the hits file. All types serialize with `serde`
//! using camel-cased field names.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

/// The method a probe was placed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    /// Assembly name, the module file name without extension
    pub assembly: String,
    /// Declaring type, nested types separated by `/` (`App.Outer/Inner`)
    pub class: String,
    /// Method name
    pub name: String,
}

/// One probed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationPoint {
    /// Id reported by the probe, unique within the run
    pub id: u32,
    /// Source file relative to the work root
    pub source_relative_path: String,
    /// First line of the statement (1-based)
    pub start_line: u32,
    /// Last line of the statement (1-based)
    pub end_line: u32,
    /// First column of the statement (1-based)
    pub start_column: u16,
    /// Column after the statement (1-based)
    pub end_column: u16,
    /// The probed instruction, `IL_xxxx: mnemonic operand`
    pub instruction: String,
    /// Method containing the statement
    pub method: MethodInfo,
}

/// Pristine copies of one instrumented module and its symbol file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyBackupRecord {
    /// Backup of the module
    pub backup_path: PathBuf,
    /// The instrumented module
    pub original_path: PathBuf,
    /// Backup of the symbol file
    pub symbols_backup_path: PathBuf,
    /// The rewritten symbol file
    pub symbols_original_path: PathBuf,
}

/// Everything an instrumentation run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Work root the source paths are relative to
    pub source_root: String,
    /// Hits file the probes report to
    pub hits_file: String,
    /// Probes per source file, in the order they were placed
    pub files: BTreeMap<String, Vec<InstrumentationPoint>>,
    /// Backups of every instrumented module
    pub instrumented_assemblies: Vec<AssemblyBackupRecord>,
    /// Companion copies placed next to instrumented modules
    pub extra_assemblies: Vec<PathBuf>,
}

impl RunResult {
    /// Number of probes placed.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// All probes, file by file.
    pub fn points(&self) -> impl Iterator<Item = &InstrumentationPoint> + '_ {
        self.files.values().flatten()
    }

    /// The probe reporting `id`.
    #[must_use]
    pub fn point(&self, id: u32) -> Option<&InstrumentationPoint> {
        self.points().find(|point| point.id == id)
    }

    pub(crate) fn add_point(&mut self, point: InstrumentationPoint) {
        self.files
            .entry(point.source_relative_path.clone())
            .or_default()
            .push(point);
    }

    pub(crate) fn add_extra_assembly(&mut self, path: PathBuf) {
        if !self.extra_assemblies.contains(&path) {
            self.extra_assemblies.push(path);
        }
    }
}

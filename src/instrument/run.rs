//! Instrumentation of a list of modules.
//!
//! Modules are processed strictly in the order given, on the calling thread. Probe ids come from
//! a single [`IdAllocator`] owned by the run, so they increase across module boundaries and a
//! run over the same pristine modules always assigns the same ids. A path listed more than once
//! is processed at its first occurrence only.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    instrument::{
        config::InstrumentConfig,
        module::{ModuleInstrumenter, ModuleOutcome},
        result::RunResult,
        selector::SourceCache,
    },
    Result,
};

/// Hands out probe ids `1, 2, 3, …`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        IdAllocator { next: 1 }
    }
}

impl IdAllocator {
    /// Create an allocator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id.
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn allocated(&self) -> u32 {
        self.next - 1
    }
}

/// Runs the instrumentation of a set of modules.
///
/// # Examples
///
/// ```rust,no_run
/// use cilcover::instrument::{InstrumentConfig, Instrumenter, SourceScope};
/// use std::path::PathBuf;
///
/// let config = InstrumentConfig::default()
///     .with_hits_file("/work/coverage/hits")
///     .with_scope(SourceScope::new("/work", ["/work/src/Program.cs"]));
/// let result = Instrumenter::new(config).run(&[PathBuf::from("/work/bin/App.dll")])?;
/// println!("{} statements instrumented", result.point_count());
/// # Ok::<(), cilcover::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Instrumenter {
    config: InstrumentConfig,
}

impl Instrumenter {
    /// Create an instrumenter for `config`.
    #[must_use]
    pub fn new(config: InstrumentConfig) -> Self {
        Instrumenter { config }
    }

    /// The configuration of this instrumenter.
    #[must_use]
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Instrument `modules` in order.
    ///
    /// # Errors
    /// Stops at the first module that fails, most notably with
    /// [`crate::Error::AlreadyInstrumented`]; modules processed before it stay instrumented.
    pub fn run<P: AsRef<Path>>(&self, modules: &[P]) -> Result<RunResult> {
        let mut result = RunResult {
            source_root: self.config.scope.root().to_string(),
            hits_file: self.config.hits_file.clone(),
            ..RunResult::default()
        };
        let mut sources = SourceCache::new();
        let mut ids = IdAllocator::new();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        for path in modules {
            if !seen.insert(path.as_ref().to_path_buf()) {
                debug!("Skipping {}: listed twice", path.as_ref().display());
                continue;
            }

            let mut instrumenter = ModuleInstrumenter::new(&self.config, &mut sources, &mut ids);
            let ModuleOutcome::Instrumented(module) = instrumenter.instrument(path.as_ref())? else {
                continue;
            };

            result.instrumented_assemblies.push(module.backup);
            if let Some(companion) = module.companion {
                result.add_extra_assembly(companion);
            }
            for point in module.points {
                result.add_point(point);
            }
        }

        info!(
            "Instrumented {} of {} modules, {} probes in {} source files",
            result.instrumented_assemblies.len(),
            modules.len(),
            ids.allocated(),
            result.files.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocated(), 0);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocated(), 2);
    }

    #[test]
    fn empty_run() {
        let config = InstrumentConfig::default().with_hits_file("/tmp/hits");
        let result = Instrumenter::new(config).run::<&Path>(&[]).unwrap();
        assert_eq!(result.hits_file, "/tmp/hits");
        assert_eq!(result.point_count(), 0);
        assert!(result.instrumented_assemblies.is_empty());
    }
}

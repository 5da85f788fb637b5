//! Statement coverage instrumentation of modules.
//!
//! The pipeline, from the leaves up:
//!
//! - [`scope`] - decides which debug documents are in scope and names them relative to the
//!   work root
//! - [`selector`] - extracts the source text of a sequence point and rejects block boundaries
//! - [`patcher`] - redirects branches and exception clauses to inserted code
//! - [`splicer`] - inserts a probe in front of an instruction
//! - [`module`] - takes one module from pristine to instrumented and writes it back
//! - [`run`] - processes a list of modules into a [`RunResult`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilcover::instrument::{InstrumentConfig, Instrumenter, SourceScope};
//!
//! let config = InstrumentConfig::default()
//!     .with_hits_file("/work/coverage/hits")
//!     .with_scope(SourceScope::new("/work", ["/work/src/Program.cs", "/work/src/Util.cs"]))
//!     .with_companion("/tools/CilCover.HitServices.dll");
//!
//! let result = Instrumenter::new(config).run(&["/work/bin/App.dll"])?;
//! for (file, points) in &result.files {
//!     println!("{file}: {} statements", points.len());
//! }
//! # Ok::<(), cilcover::Error>(())
//! ```

pub mod config;
pub mod module;
pub mod patcher;
pub mod result;
pub mod run;
pub mod scope;
pub mod selector;
pub mod splicer;

pub use config::{InstrumentConfig, ProbeApi};
pub use module::{ModuleInstrumenter, ModuleOutcome, ModuleState, SkipReason};
pub use result::{AssemblyBackupRecord, InstrumentationPoint, MethodInfo, RunResult};
pub use run::{IdAllocator, Instrumenter};
pub use scope::SourceScope;

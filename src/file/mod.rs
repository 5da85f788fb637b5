//! Binary buffer access for module images, symbol files and IL streams.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - Cursor-based, bounds-checked reader
//! - [`crate::file::writer::Writer`] - Growable writer producing the encodings the parser reads
//! - [`crate::file::io`] - Low-level little-endian primitives shared by both
//!
//! Module images are read fully into memory; the instrumenter mutates the in-memory model and
//! writes a new image over the original file, so no file stays mapped while it is rewritten.

pub mod io;
pub mod parser;
pub mod writer;

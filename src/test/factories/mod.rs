//! Factory methods for unit test data.

mod method;
mod module;

pub use method::*;
pub use module::*;

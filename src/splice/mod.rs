//! The byte-stream adaptation layer: a writer/reader pair that splices
//! variable-size consumer writes/reads across record-sized provider
//! buffers, and an "extended" pair layered on top that enforces logical
//! message and nested group boundaries.

pub mod ext_reader;
pub mod ext_writer;
pub mod reader;
pub mod writer;

pub use ext_reader::ExtendedReader;
pub use ext_writer::{ExtendedWriter, Passthrough};
pub use reader::Reader;
pub use writer::{Reclaimed, Writer};

//! Versioned binary records.
//!
//! Every persisted entity is a stack of layers (item, container, specialization), each
//! led by its own version tag. [`VersionLadder`] turns the per-version read steps of a
//! layer into data so old saves keep loading as layers grow fields.

mod reader;
mod version;
mod writer;

pub use reader::{RecordReader, Upgrade};
pub use version::{ReadStep, VersionLadder, VersionedRecord};
pub use writer::RecordWriter;

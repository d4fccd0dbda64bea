//! Binary archive layers.
//!
//! `raw` is the seekable byte archive. `strings` and `references` intern names and asset
//! paths into tables written after the body; [`StateWriter`] stacks the string interner
//! outermost, then the reference interner, then the raw archive.

pub mod property;
pub mod raw;
pub mod references;
pub mod strings;
pub mod varint;

pub use property::{PropertyDecoder, PropertyEncoder};
pub use raw::{ArchiveReader, ArchiveWriter};
pub use references::{ObjectRef, ReferenceTracker, StateReader, StateWriter};
pub use strings::{StringInterner, StringTable};

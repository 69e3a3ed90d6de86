//! Purpose: Define the stable public Rust API boundary for dgread.
//! Exports: Read pipeline entry points, options, and the value-tree types they return.
//! Role: Public, additive-only surface used by the CLI and embedding hosts.
//! Invariants: Callers receive either a complete result or an `Error`; no partial trees.
//! Invariants: Scratch files never outlive the call that created them.

mod reader;

pub use crate::core::column::{Column, Group, TypedColumn};
pub use crate::core::decode::DecodeLimits;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::ColumnKind;
pub use crate::core::source::{
    IoWarning, RandomScratchNamer, ScratchNamer, ShortWritePolicy, default_scratch_dir,
};
pub use crate::core::tree::{FILENAME_FIELD, Field, NativeValue, Record};
pub use reader::{LoadedGroup, ReadOptions, ReadOutcome, Reader, group_summary, read_dyn_group};

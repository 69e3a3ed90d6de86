//! Purpose: Centralize DynGroup wire constants, type tags, and version gating.
//! Exports: `DG_MAGIC`, `DG_FORMAT_VERSION`, `SUPPORTED_DG_FORMAT_VERSIONS`, `ColumnKind`,
//!   `format_version_error`.
//! Role: Single source of truth for the byte layout read by `core::decode`.
//! Invariants: All multi-byte integers and floats are little-endian.
//! Invariants: Type tags map 1:1 onto `TypedColumn` variants; unknown tags are format errors.
//! Invariants: Version list is additive; bump only for incompatible layout changes.

use crate::core::error::{Error, ErrorKind};

pub const DG_MAGIC: [u8; 4] = *b"DGRP";
pub const DG_FORMAT_VERSION: u32 = 1;
pub const SUPPORTED_DG_FORMAT_VERSIONS: &[u32] = &[DG_FORMAT_VERSION];

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub const PLAIN_SUFFIX: &str = "dg";
pub const COMPRESSED_SUFFIX: &str = "dgz";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Ints = 1,
    Shorts = 2,
    Floats = 3,
    Bytes = 4,
    Strings = 5,
    Nested = 6,
}

impl ColumnKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ColumnKind::Ints),
            2 => Some(ColumnKind::Shorts),
            3 => Some(ColumnKind::Floats),
            4 => Some(ColumnKind::Bytes),
            5 => Some(ColumnKind::Strings),
            6 => Some(ColumnKind::Nested),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Ints => "int32",
            ColumnKind::Shorts => "int16",
            ColumnKind::Floats => "float32",
            ColumnKind::Bytes => "byte",
            ColumnKind::Strings => "string",
            ColumnKind::Nested => "group",
        }
    }
}

pub fn format_version_error(detected: u32) -> Error {
    let supported = SUPPORTED_DG_FORMAT_VERSIONS
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::new(ErrorKind::Format)
        .with_message(format!(
            "unsupported dg format version {detected} (supported: {supported})"
        ))
        .with_hint("Re-export the file with a writer that emits a supported version.")
}

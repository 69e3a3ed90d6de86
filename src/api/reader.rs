// Read pipeline: resolve and inflate, decode, then build the record.
// Every stage drops what it acquired before its error reaches the caller.
use std::path::PathBuf;

use serde_json::{Value, json};

use crate::core::column::{Column, Group, TypedColumn};
use crate::core::decode::{DecodeLimits, decode_group};
use crate::core::error::Error;
use crate::core::source::{
    ByteSource, IoWarning, OpenedSource, RandomScratchNamer, ScratchNamer, ShortWritePolicy,
    default_scratch_dir,
};
use crate::core::tree::{Record, build_record};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadOptions {
    pub scratch_dir: PathBuf,
    pub limits: DecodeLimits,
    pub short_write: ShortWritePolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            limits: DecodeLimits::default(),
            short_write: ShortWritePolicy::default(),
        }
    }
}

impl ReadOptions {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.limits.max_depth = max_depth;
        self
    }

    pub fn with_short_write(mut self, policy: ShortWritePolicy) -> Self {
        self.short_write = policy;
        self
    }
}

/// A decoded group together with the path it was resolved from.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedGroup {
    pub group: Group,
    pub filename: String,
    pub warnings: Vec<IoWarning>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadOutcome {
    pub record: Record,
    pub warnings: Vec<IoWarning>,
}

pub struct Reader {
    options: ReadOptions,
    namer: Box<dyn ScratchNamer>,
}

impl Reader {
    pub fn new(options: ReadOptions) -> Self {
        Self {
            options,
            namer: Box::new(RandomScratchNamer),
        }
    }

    pub fn with_namer(mut self, namer: impl ScratchNamer + 'static) -> Self {
        self.namer = Box::new(namer);
        self
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Resolves, inflates, and decodes `request`. The scratch file (if any)
    /// is removed before this returns.
    pub fn load(&self, request: &str) -> Result<LoadedGroup, Error> {
        let source = ByteSource::new(
            &self.options.scratch_dir,
            self.namer.as_ref(),
            self.options.short_write,
        );
        let OpenedSource {
            reader,
            resolved,
            scratch,
            warnings,
        } = source.open(request)?;
        let filename = resolved.to_string_lossy().into_owned();

        let decoded = decode_group(reader, self.options.limits);
        drop(scratch);
        let group = decoded.map_err(|err| {
            tracing::debug!(path = %filename, error = %err, "not recognized as dg format");
            err.with_path(&resolved)
        })?;

        Ok(LoadedGroup {
            group,
            filename,
            warnings,
        })
    }

    pub fn read(&self, request: &str) -> Result<ReadOutcome, Error> {
        let LoadedGroup {
            group,
            filename,
            warnings,
        } = self.load(request)?;
        let record = build_record(group, &filename)
            .map_err(|err| err.with_path(filename.as_str()))?;
        Ok(ReadOutcome { record, warnings })
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new(ReadOptions::default())
    }
}

/// Reads `request` with default options.
pub fn read_dyn_group(request: &str) -> Result<ReadOutcome, Error> {
    Reader::default().read(request)
}

/// Schema listing of a group: names, kinds, and element counts, recursively.
pub fn group_summary(group: &Group) -> Value {
    Value::Array(group.columns().iter().map(column_summary).collect())
}

fn column_summary(column: &Column) -> Value {
    let mut value = json!({
        "name": column.name,
        "kind": column.data.kind().name(),
        "len": column.data.len(),
    });
    if let TypedColumn::Nested(children) = &column.data {
        value["columns"] = Value::Array(children.iter().map(column_summary).collect());
    }
    value
}

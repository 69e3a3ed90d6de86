//! Purpose: Recursive-descent decoder from a plain DynGroup byte stream to a `Group`.
//! Exports: `DecodeLimits`, `decode_group`.
//! Role: Middle stage of the read pipeline; knows nothing about files or gzip.
//! Invariants: Any under-run, unknown tag, or limit violation fails the whole decode.
//! Invariants: No partial `Group` is returned; in-progress columns drop with the error.
//! Invariants: Errors carry the byte offset where decoding stopped.
use std::io::{self, BufReader, Read};

use bstr::BString;

use crate::core::column::{Column, Group, TypedColumn};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{self, ColumnKind, DG_MAGIC};

// Declared counts are untrusted; grow past this only as data actually arrives.
const MAX_PREALLOC_ELEMENTS: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_MAX_NAME_LEN: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodeLimits {
    /// Deepest allowed nesting of group columns; 0 rejects any nested column.
    pub max_depth: usize,
    pub max_name_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

pub fn decode_group<R: Read>(reader: R, limits: DecodeLimits) -> Result<Group, Error> {
    let mut ctx = DecodeContext::new(reader, limits);
    ctx.read_header()?;
    let column_count = ctx.read_u32("column count")?;
    let columns = ctx.read_columns(column_count, 0)?;
    ctx.expect_end()?;
    tracing::debug!(columns = columns.len(), bytes = ctx.offset, "decoded dyn group");
    Ok(Group::new(columns))
}

struct DecodeContext<R> {
    reader: BufReader<R>,
    offset: u64,
    limits: DecodeLimits,
}

impl<R: Read> DecodeContext<R> {
    fn new(reader: R, limits: DecodeLimits) -> Self {
        Self {
            reader: BufReader::new(reader),
            offset: 0,
            limits,
        }
    }

    fn format_error(&self, message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Format)
            .with_message(message)
            .with_offset(self.offset)
    }

    fn read_header(&mut self) -> Result<(), Error> {
        let mut magic = [0u8; 4];
        self.fill(&mut magic, "header")?;
        if magic != DG_MAGIC {
            return Err(Error::new(ErrorKind::Format)
                .with_message("bad dg magic")
                .with_offset(0)
                .with_hint("The file is not a DynGroup container."));
        }
        let version = self.read_u32("format version")?;
        if !format::SUPPORTED_DG_FORMAT_VERSIONS.contains(&version) {
            return Err(format::format_version_error(version).with_offset(4));
        }
        Ok(())
    }

    fn read_columns(&mut self, count: u32, depth: usize) -> Result<Vec<Column>, Error> {
        let mut columns = Vec::with_capacity(prealloc(count));
        for _ in 0..count {
            columns.push(self.read_column(depth)?);
        }
        Ok(columns)
    }

    fn read_column(&mut self, depth: usize) -> Result<Column, Error> {
        let name = self.read_name()?;
        let tag_offset = self.offset;
        let tag = self.read_u8("type tag")?;
        let Some(kind) = ColumnKind::from_tag(tag) else {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!("unknown type tag {tag} for column \"{name}\""))
                .with_offset(tag_offset));
        };
        let count = self.read_u32("element count")?;

        let data = match kind {
            ColumnKind::Ints => TypedColumn::Ints(self.read_fixed::<i32, 4>(
                count,
                "int32 payload",
                i32::from_le_bytes,
            )?),
            ColumnKind::Shorts => TypedColumn::Shorts(self.read_fixed::<i16, 2>(
                count,
                "int16 payload",
                i16::from_le_bytes,
            )?),
            ColumnKind::Floats => TypedColumn::Floats(self.read_fixed::<f32, 4>(
                count,
                "float32 payload",
                f32::from_le_bytes,
            )?),
            ColumnKind::Bytes => {
                TypedColumn::Bytes(self.read_bytes(count as usize, "byte payload")?.into())
            }
            ColumnKind::Strings => TypedColumn::Strings(self.read_strings(count)?),
            ColumnKind::Nested => {
                if depth >= self.limits.max_depth {
                    return Err(self.format_error(format!(
                        "group column \"{name}\" exceeds max nesting depth {}",
                        self.limits.max_depth
                    )));
                }
                TypedColumn::Nested(self.read_columns(count, depth + 1)?.into())
            }
        };
        Ok(Column { name, data })
    }

    fn read_name(&mut self) -> Result<String, Error> {
        let len = self.read_u32("column name length")? as usize;
        if len > self.limits.max_name_len {
            return Err(self.format_error(format!(
                "column name length {len} exceeds limit {}",
                self.limits.max_name_len
            )));
        }
        let start = self.offset;
        let raw = self.read_bytes(len, "column name")?;
        String::from_utf8(raw).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("column name is not valid utf-8")
                .with_offset(start)
                .with_source(err)
        })
    }

    fn read_strings(&mut self, count: u32) -> Result<Box<[BString]>, Error> {
        let mut values = Vec::with_capacity(prealloc(count));
        for _ in 0..count {
            let len = self.read_u32("string length")? as usize;
            values.push(BString::from(self.read_bytes(len, "string payload")?));
        }
        Ok(values.into_boxed_slice())
    }

    fn read_fixed<T, const N: usize>(
        &mut self,
        count: u32,
        what: &str,
        decode: impl Fn([u8; N]) -> T,
    ) -> Result<Box<[T]>, Error> {
        let mut values = Vec::with_capacity(prealloc(count));
        for _ in 0..count {
            let mut buf = [0u8; N];
            self.fill(&mut buf, what)?;
            values.push(decode(buf));
        }
        Ok(values.into_boxed_slice())
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC_ELEMENTS));
        let mut chunk = [0u8; READ_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK);
            self.fill(&mut chunk[..n], what)?;
            out.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        Ok(out)
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, what)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<(), Error> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.format_error(format!("truncated {what}")))
            }
            Err(err) => Err(Error::new(ErrorKind::Io)
                .with_message(format!("failed to read {what}"))
                .with_offset(self.offset)
                .with_source(err)),
        }
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        let mut next = [0u8; 1];
        loop {
            match self.reader.read(&mut next) {
                Ok(0) => return Ok(()),
                Ok(_) => return Err(self.format_error("trailing bytes after last column")),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(Error::new(ErrorKind::Io)
                        .with_message("failed to read past last column")
                        .with_offset(self.offset)
                        .with_source(err));
                }
            }
        }
    }
}

fn prealloc(count: u32) -> usize {
    (count as usize).min(MAX_PREALLOC_ELEMENTS)
}

#[cfg(test)]
mod tests {
    use super::{DecodeLimits, decode_group};
    use crate::core::column::{Column, TypedColumn};
    use crate::core::error::ErrorKind;
    use crate::core::format::{ColumnKind, DG_FORMAT_VERSION, DG_MAGIC};
    use bstr::BString;

    #[derive(Default)]
    struct Wire(Vec<u8>);

    impl Wire {
        fn container(columns: u32) -> Self {
            let mut wire = Wire::default();
            wire.0.extend_from_slice(&DG_MAGIC);
            wire.u32(DG_FORMAT_VERSION).u32(columns);
            wire
        }

        fn u32(&mut self, value: u32) -> &mut Self {
            self.0.extend_from_slice(&value.to_le_bytes());
            self
        }

        fn column(&mut self, name: &str, kind: ColumnKind, count: u32) -> &mut Self {
            self.u32(name.len() as u32);
            self.0.extend_from_slice(name.as_bytes());
            self.0.push(kind.tag());
            self.u32(count)
        }

        fn raw(&mut self, bytes: &[u8]) -> &mut Self {
            self.0.extend_from_slice(bytes);
            self
        }

        fn string(&mut self, value: &str) -> &mut Self {
            self.u32(value.len() as u32).raw(value.as_bytes())
        }
    }

    fn decode(wire: &Wire) -> Result<crate::core::column::Group, crate::core::error::Error> {
        decode_group(wire.0.as_slice(), DecodeLimits::default())
    }

    #[test]
    fn decodes_flat_columns_in_order() {
        let mut wire = Wire::container(4);
        wire.column("trialtype", ColumnKind::Ints, 2)
            .raw(&7i32.to_le_bytes())
            .raw(&(-3i32).to_le_bytes());
        wire.column("rt", ColumnKind::Shorts, 1).raw(&512i16.to_le_bytes());
        wire.column("gain", ColumnKind::Floats, 1).raw(&1.5f32.to_le_bytes());
        wire.column("flags", ColumnKind::Bytes, 3).raw(&[0, 1, 255]);

        let group = decode(&wire).expect("decode");
        let names: Vec<&str> = group.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["trialtype", "rt", "gain", "flags"]);
        assert_eq!(group.get("trialtype"), Some(&TypedColumn::Ints(vec![7, -3].into())));
        assert_eq!(group.get("rt"), Some(&TypedColumn::Shorts(vec![512].into())));
        assert_eq!(group.get("gain"), Some(&TypedColumn::Floats(vec![1.5].into())));
        assert_eq!(group.get("flags"), Some(&TypedColumn::Bytes(vec![0, 1, 255].into())));
    }

    #[test]
    fn decodes_nested_groups_recursively() {
        let mut wire = Wire::container(1);
        wire.column("stim", ColumnKind::Nested, 3);
        wire.column("ids", ColumnKind::Ints, 1).raw(&42i32.to_le_bytes());
        wire.column("labels", ColumnKind::Strings, 2).string("left").string("right");
        wire.column("deeper", ColumnKind::Nested, 1);
        wire.column("empty", ColumnKind::Floats, 0);

        let group = decode(&wire).expect("decode");
        let expected = TypedColumn::Nested(
            vec![
                Column::new("ids", TypedColumn::Ints(vec![42].into())),
                Column::new(
                    "labels",
                    TypedColumn::Strings(vec![BString::from("left"), BString::from("right")].into()),
                ),
                Column::new(
                    "deeper",
                    TypedColumn::Nested(
                        vec![Column::new("empty", TypedColumn::Floats(Vec::new().into()))].into(),
                    ),
                ),
            ]
            .into(),
        );
        assert_eq!(group.get("stim"), Some(&expected));
    }

    #[test]
    fn empty_container_is_valid() {
        let group = decode(&Wire::container(0)).expect("decode");
        assert!(group.is_empty());
    }

    #[test]
    fn bad_magic_is_format_error() {
        let mut wire = Wire::default();
        wire.raw(b"NOPE").u32(1).u32(0);
        let err = decode(&wire).expect_err("bad magic");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn unsupported_version_is_format_error() {
        let mut wire = Wire::default();
        wire.raw(&DG_MAGIC).u32(DG_FORMAT_VERSION + 1).u32(0);
        let err = decode(&wire).expect_err("version");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(4));
    }

    #[test]
    fn truncated_payload_fails_whole_decode() {
        let mut wire = Wire::container(2);
        wire.column("ok", ColumnKind::Ints, 1).raw(&1i32.to_le_bytes());
        wire.column("short", ColumnKind::Ints, 4).raw(&1i32.to_le_bytes());
        let err = decode(&wire).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.message(), Some("truncated int32 payload"));
    }

    #[test]
    fn missing_columns_are_truncation() {
        let mut wire = Wire::container(3);
        wire.column("only", ColumnKind::Bytes, 1).raw(&[9]);
        let err = decode(&wire).expect_err("count mismatch");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut wire = Wire::container(1);
        wire.u32(1).raw(b"x").raw(&[99]).u32(0);
        let err = decode(&wire).expect_err("tag");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(12 + 4 + 1));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut wire = Wire::container(0);
        wire.raw(&[0]);
        let err = decode(&wire).expect_err("trailing");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn nesting_beyond_limit_is_rejected() {
        let mut wire = Wire::container(1);
        for level in 0..4 {
            wire.column(&format!("g{level}"), ColumnKind::Nested, 1);
        }
        wire.column("leaf", ColumnKind::Ints, 0);

        let limits = DecodeLimits {
            max_depth: 3,
            ..DecodeLimits::default()
        };
        let err = decode_group(wire.0.as_slice(), limits).expect_err("depth");
        assert_eq!(err.kind(), ErrorKind::Format);

        let limits = DecodeLimits {
            max_depth: 4,
            ..DecodeLimits::default()
        };
        decode_group(wire.0.as_slice(), limits).expect("within limit");
    }

    #[test]
    fn oversized_name_is_rejected_before_reading_it() {
        let mut wire = Wire::container(1);
        wire.u32(1 << 20);
        let limits = DecodeLimits {
            max_name_len: 16,
            ..DecodeLimits::default()
        };
        let err = decode_group(wire.0.as_slice(), limits).expect_err("name");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn hostile_count_does_not_preallocate() {
        let mut wire = Wire::container(1);
        wire.column("huge", ColumnKind::Floats, u32::MAX);
        let err = decode(&wire).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}

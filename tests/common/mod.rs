// Fixture helpers: encode groups to DynGroup bytes and write .dg/.dgz files.
#![allow(dead_code)]
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::BString;
use dgread::api::{Column, TypedColumn};
use dgread::core::format::{DG_FORMAT_VERSION, DG_MAGIC};
use flate2::Compression;
use flate2::write::GzEncoder;

pub fn encode_group(columns: &[Column]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&DG_MAGIC);
    out.extend_from_slice(&DG_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(columns.len() as u32).to_le_bytes());
    for column in columns {
        encode_column(&mut out, column);
    }
    out
}

fn encode_column(out: &mut Vec<u8>, column: &Column) {
    out.extend_from_slice(&(column.name.len() as u32).to_le_bytes());
    out.extend_from_slice(column.name.as_bytes());
    out.push(column.data.kind().tag());
    out.extend_from_slice(&(column.data.len() as u32).to_le_bytes());
    match &column.data {
        TypedColumn::Ints(values) => values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        TypedColumn::Shorts(values) => values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        TypedColumn::Floats(values) => values
            .iter()
            .for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        TypedColumn::Bytes(values) => out.extend_from_slice(values),
        TypedColumn::Strings(values) => {
            for value in values.iter() {
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value);
            }
        }
        TypedColumn::Nested(children) => {
            for child in children.iter() {
                encode_column(out, child);
            }
        }
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("compress");
    encoder.finish().expect("finish")
}

pub fn write_dg(dir: &Path, file_name: &str, columns: &[Column]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, encode_group(columns)).expect("write dg");
    path
}

pub fn write_dgz(dir: &Path, file_name: &str, columns: &[Column]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, gzip(&encode_group(columns))).expect("write dgz");
    path
}

pub fn strings(values: &[&str]) -> TypedColumn {
    TypedColumn::Strings(values.iter().map(|v| BString::from(*v)).collect())
}

/// A small session file: flat columns of every scalar kind plus one nested column.
pub fn sample_columns() -> Vec<Column> {
    vec![
        Column::new("trialtype", TypedColumn::Ints(vec![0, 1, 1, 2].into())),
        Column::new("rt", TypedColumn::Shorts(vec![312, -1, 455, 298].into())),
        Column::new("gain", TypedColumn::Floats(vec![0.5, 1.25, -2.0, 0.0].into())),
        Column::new("status", TypedColumn::Bytes(vec![1, 0, 1, 1].into())),
        Column::new("subject", strings(&["m1", "m1", "m2", "m2"])),
        Column::new(
            "stim",
            TypedColumn::Nested(
                vec![
                    Column::new("ids", TypedColumn::Ints(vec![10, 20].into())),
                    Column::new("labels", strings(&["left", "right"])),
                    Column::new(
                        "positions",
                        TypedColumn::Nested(
                            vec![Column::new(
                                "x",
                                TypedColumn::Floats(vec![-4.5, 4.5].into()),
                            )]
                            .into(),
                        ),
                    ),
                ]
                .into(),
            ),
        ),
    ]
}

pub fn dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read_dir").count()
}

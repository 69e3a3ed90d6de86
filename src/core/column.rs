//! Purpose: In-memory tree of decoded DynGroup columns.
//! Exports: `TypedColumn`, `Column`, `Group`.
//! Role: Output of `core::decode`, input of `core::tree`.
//! Invariants: Element counts are fixed at construction (boxed slices never grow).
//! Invariants: Each `TypedColumn` holds exactly one element kind; no mixed arrays.
//! Invariants: Column order is preserved exactly as read from the wire.
use bstr::BString;

use crate::core::format::ColumnKind;

#[derive(Clone, Debug, PartialEq)]
pub enum TypedColumn {
    Ints(Box<[i32]>),
    Shorts(Box<[i16]>),
    Floats(Box<[f32]>),
    Bytes(Box<[u8]>),
    Strings(Box<[BString]>),
    Nested(Box<[Column]>),
}

impl TypedColumn {
    pub fn kind(&self) -> ColumnKind {
        match self {
            TypedColumn::Ints(_) => ColumnKind::Ints,
            TypedColumn::Shorts(_) => ColumnKind::Shorts,
            TypedColumn::Floats(_) => ColumnKind::Floats,
            TypedColumn::Bytes(_) => ColumnKind::Bytes,
            TypedColumn::Strings(_) => ColumnKind::Strings,
            TypedColumn::Nested(_) => ColumnKind::Nested,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::Ints(values) => values.len(),
            TypedColumn::Shorts(values) => values.len(),
            TypedColumn::Floats(values) => values.len(),
            TypedColumn::Bytes(values) => values.len(),
            TypedColumn::Strings(values) => values.len(),
            TypedColumn::Nested(columns) => columns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named entry; sub-columns of a nested column carry their wire names too.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: TypedColumn,
}

impl Column {
    pub fn new(name: impl Into<String>, data: TypedColumn) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Group {
    columns: Vec<Column>,
}

impl Group {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// First column with the given name.
    pub fn get(&self, name: &str) -> Option<&TypedColumn> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.data)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

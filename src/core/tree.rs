// Conversion from a decoded `Group` into the boundary-facing `Record`.
// Consumes the group; a failed conversion drops everything built so far.
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::core::column::{Column, Group, TypedColumn};
use crate::core::error::{Error, ErrorKind};

pub const FILENAME_FIELD: &str = "filename";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NativeValue {
    Numbers(Vec<f64>),
    Strings(Vec<String>),
    Cells(Vec<NativeValue>),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: NativeValue,
}

/// Ordered fields of one decoded file; the last field is always `filename`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn filename(&self) -> &str {
        match self.fields.last() {
            Some(Field {
                value: NativeValue::Text(filename),
                ..
            }) => filename,
            _ => "",
        }
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

// Written as a map in field order; duplicate names are emitted as-is.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

pub fn build_record(group: Group, filename: &str) -> Result<Record, Error> {
    let columns = group.into_columns();
    let mut fields = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        if column.name.is_empty() {
            return Err(Error::new(ErrorKind::Conversion)
                .with_message(format!("column {} has an empty name", fields.len())));
        }
        if column.name == FILENAME_FIELD {
            return Err(Error::new(ErrorKind::Conversion)
                .with_message(format!("column name \"{FILENAME_FIELD}\" is reserved")));
        }
        let Column { name, data } = column;
        let value = convert(&name, data)?;
        fields.push(Field { name, value });
    }
    fields.push(Field {
        name: FILENAME_FIELD.to_string(),
        value: NativeValue::Text(filename.to_string()),
    });
    Ok(Record { fields })
}

fn convert(name: &str, data: TypedColumn) -> Result<NativeValue, Error> {
    let value = match data {
        TypedColumn::Ints(values) => {
            NativeValue::Numbers(values.iter().map(|&v| f64::from(v)).collect())
        }
        TypedColumn::Shorts(values) => {
            NativeValue::Numbers(values.iter().map(|&v| f64::from(v)).collect())
        }
        TypedColumn::Floats(values) => {
            NativeValue::Numbers(values.iter().map(|&v| f64::from(v)).collect())
        }
        // Byte columns hold C `char` data, which is signed on the platforms the format came from.
        TypedColumn::Bytes(values) => {
            NativeValue::Numbers(values.iter().map(|&v| f64::from(v as i8)).collect())
        }
        TypedColumn::Strings(values) => {
            let mut out = Vec::with_capacity(values.len());
            for (idx, value) in values.into_vec().into_iter().enumerate() {
                let text = String::from_utf8(value.into()).map_err(|err| {
                    Error::new(ErrorKind::Conversion)
                        .with_message(format!("string {idx} of column \"{name}\" is not valid utf-8"))
                        .with_source(err)
                })?;
                out.push(text);
            }
            NativeValue::Strings(out)
        }
        TypedColumn::Nested(columns) => {
            let mut cells = Vec::with_capacity(columns.len());
            for column in columns.into_vec() {
                cells.push(convert(name, column.data)?);
            }
            NativeValue::Cells(cells)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{FILENAME_FIELD, NativeValue, build_record};
    use crate::core::column::{Column, Group, TypedColumn};
    use crate::core::error::ErrorKind;
    use bstr::BString;

    #[test]
    fn numeric_kinds_convert_elementwise() {
        let group = Group::new(vec![
            Column::new("i", TypedColumn::Ints(vec![i32::MIN, 0, i32::MAX].into())),
            Column::new("s", TypedColumn::Shorts(vec![-2, 2].into())),
            Column::new("f", TypedColumn::Floats(vec![0.25, -1.5].into())),
            Column::new("b", TypedColumn::Bytes(vec![65, 200].into())),
        ]);
        let record = build_record(group, "trial.dg").expect("build");
        assert_eq!(
            record.get("i"),
            Some(&NativeValue::Numbers(vec![f64::from(i32::MIN), 0.0, f64::from(i32::MAX)]))
        );
        assert_eq!(record.get("s"), Some(&NativeValue::Numbers(vec![-2.0, 2.0])));
        assert_eq!(record.get("f"), Some(&NativeValue::Numbers(vec![0.25, -1.5])));
        assert_eq!(record.get("b"), Some(&NativeValue::Numbers(vec![65.0, -56.0])));
    }

    #[test]
    fn filename_is_appended_last() {
        let group = Group::new(vec![Column::new("a", TypedColumn::Ints(vec![1].into()))]);
        let record = build_record(group, "data/trial.dgz").expect("build");
        let names: Vec<&str> = record.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", FILENAME_FIELD]);
        assert_eq!(record.filename(), "data/trial.dgz");
    }

    #[test]
    fn nested_columns_become_cells() {
        let group = Group::new(vec![Column::new(
            "stim",
            TypedColumn::Nested(
                vec![
                    Column::new("x", TypedColumn::Ints(vec![1, 2].into())),
                    Column::new("y", TypedColumn::Strings(vec![BString::from("go")].into())),
                    Column::new("z", TypedColumn::Nested(Vec::new().into())),
                ]
                .into(),
            ),
        )]);
        let record = build_record(group, "t.dg").expect("build");
        assert_eq!(
            record.get("stim"),
            Some(&NativeValue::Cells(vec![
                NativeValue::Numbers(vec![1.0, 2.0]),
                NativeValue::Strings(vec!["go".to_string()]),
                NativeValue::Cells(Vec::new()),
            ]))
        );
    }

    #[test]
    fn invalid_utf8_string_is_conversion_error() {
        let group = Group::new(vec![
            Column::new("ok", TypedColumn::Ints(vec![1].into())),
            Column::new(
                "names",
                TypedColumn::Strings(vec![BString::from(vec![0xff, 0xfe])].into()),
            ),
        ]);
        let err = build_record(group, "t.dg").expect_err("utf8");
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        let reserved = Group::new(vec![Column::new(
            FILENAME_FIELD,
            TypedColumn::Ints(Vec::new().into()),
        )]);
        assert_eq!(
            build_record(reserved, "t.dg").expect_err("reserved").kind(),
            ErrorKind::Conversion
        );

        let empty = Group::new(vec![Column::new("", TypedColumn::Ints(Vec::new().into()))]);
        assert_eq!(
            build_record(empty, "t.dg").expect_err("empty").kind(),
            ErrorKind::Conversion
        );
    }

    #[test]
    fn serializes_in_field_order_with_duplicates() {
        let group = Group::new(vec![
            Column::new("z", TypedColumn::Ints(vec![1].into())),
            Column::new("a", TypedColumn::Strings(vec![BString::from("x")].into())),
            Column::new("z", TypedColumn::Shorts(vec![2].into())),
        ]);
        let record = build_record(group, "t.dg").expect("build");
        let json = serde_json::to_string(&record).expect("json");
        assert_eq!(
            json,
            r#"{"z":[1.0],"a":["x"],"z":[2.0],"filename":"t.dg"}"#
        );
    }
}

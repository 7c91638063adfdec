//! Purpose: Decode loaded column buffers into rows, one row per `next` call.
//! Exports: `ScanCursor`, `CursorResult`, `Row`, `Value`, `decode_i32_le`, `decode_f32_le`, `decode_str`.
//! Role: Per-scan state behind the public scan API and the C ABI.
//! Invariants: Rows come out in increasing row order; values follow the projected column order.
//! Invariants: A closed cursor holds no buffers and rejects `next`/`restart` with `Usage`.
//! Notes: Cells are decoded lazily; a corrupt cell fails that call only.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::core::column::ColumnBuffer;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::DataType;
use crate::core::schema::FileDescriptor;

/// A decoded cell. Serializes as a bare JSON string or number; non-finite
/// floats have no JSON number form and serialize as `"NaN"`, `"inf"`, or `"-inf"`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Float(f32),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(value) => serializer.serialize_str(value),
            Value::Int(value) => serializer.serialize_i32(*value),
            Value::Float(value) if value.is_finite() => serializer.serialize_f32(*value),
            Value::Float(value) => serializer.serialize_str(non_finite_label(*value)),
        }
    }
}

/// Matches `f32`'s `Display`, so TSV and JSON spell these values the same way.
fn non_finite_label(value: f32) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(value) => f.write_str(value),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
        }
    }
}

/// One decoded row. Serializes as a JSON array of values.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    pub values: Vec<Value>,
}

#[derive(Debug, PartialEq)]
pub enum CursorResult {
    Row(Row),
    EndOfScan,
}

#[derive(Debug)]
pub struct ScanCursor {
    descriptor: FileDescriptor,
    buffers: Vec<ColumnBuffer>,
    row_index: u64,
    closed: bool,
}

impl ScanCursor {
    /// `buffers` are the projected columns, already in descriptor order.
    pub fn open(descriptor: FileDescriptor, buffers: Vec<ColumnBuffer>) -> Self {
        Self {
            descriptor,
            buffers,
            row_index: 0,
            closed: false,
        }
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    /// Names of the columns each row carries, in row order.
    pub fn columns(&self) -> Vec<&str> {
        self.buffers.iter().map(|buffer| buffer.name.as_str()).collect()
    }

    pub fn num_rows(&self) -> u64 {
        self.descriptor.num_rows()
    }

    pub fn row_index(&self) -> u64 {
        self.row_index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn next(&mut self) -> Result<CursorResult, Error> {
        self.ensure_open()?;
        if self.row_index >= self.num_rows() {
            return Ok(CursorResult::EndOfScan);
        }
        let row = self.row_index;
        let mut values = Vec::with_capacity(self.buffers.len());
        for buffer in &self.buffers {
            values.push(decode_cell(buffer, row)?);
        }
        self.row_index += 1;
        Ok(CursorResult::Row(Row { values }))
    }

    pub fn restart(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.row_index = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffers = Vec::new();
        self.row_index = 0;
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::new(ErrorKind::Usage).with_message("scan is closed"));
        }
        Ok(())
    }
}

pub fn decode_i32_le(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

pub fn decode_f32_le(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_le_bytes(bytes))
}

/// Bytes up to the first NUL (or the whole cell) as UTF-8.
pub fn decode_str(cell: &[u8]) -> Result<&str, std::str::Utf8Error> {
    let end = cell.iter().position(|byte| *byte == 0).unwrap_or(cell.len());
    std::str::from_utf8(&cell[..end])
}

fn decode_cell(buffer: &ColumnBuffer, row: u64) -> Result<Value, Error> {
    let cell = buffer.cell(row)?;
    match buffer.data_type {
        DataType::Str => decode_str(cell)
            .map(|value| Value::Str(value.to_string()))
            .map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("string cell is not valid UTF-8")
                    .with_column(buffer.name.as_str())
                    .with_row(row)
                    .with_offset(buffer.start_offset + row * buffer.element_width() as u64)
                    .with_source(err)
            }),
        DataType::Int => word(buffer, row, cell).map(|bytes| Value::Int(decode_i32_le(bytes))),
        DataType::Float => word(buffer, row, cell).map(|bytes| Value::Float(decode_f32_le(bytes))),
    }
}

fn word(buffer: &ColumnBuffer, row: u64, cell: &[u8]) -> Result<[u8; 4], Error> {
    <[u8; 4]>::try_from(cell).map_err(|_| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("expected a 4-byte cell, found {} bytes", cell.len()))
            .with_column(buffer.name.as_str())
            .with_row(row)
    })
}

#[cfg(test)]
mod tests {
    use super::{CursorResult, Row, ScanCursor, Value, decode_f32_le, decode_i32_le, decode_str};
    use crate::core::column::load_column;
    use crate::core::error::ErrorKind;
    use crate::core::fixture::{FixtureColumn, FixtureFile, farm};
    use crate::core::meta::ParseOptions;
    use crate::core::range::RangeReader;
    use crate::core::schema::resolve_from_reader;
    use std::path::Path;

    fn open_cursor(path: &Path) -> ScanCursor {
        let mut reader = RangeReader::open(path).expect("open");
        let descriptor =
            resolve_from_reader(&mut reader, &ParseOptions::default()).expect("resolve");
        let buffers = descriptor
            .columns
            .iter()
            .map(|column| load_column(&mut reader, column).expect("load"))
            .collect();
        ScanCursor::open(descriptor, buffers)
    }

    fn drain(cursor: &mut ScanCursor) -> Vec<Row> {
        let mut rows = Vec::new();
        while let CursorResult::Row(row) = cursor.next().expect("next") {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn decodes_little_endian_words() {
        assert_eq!(decode_i32_le([0x01, 0x00, 0x00, 0x00]), 1);
        assert_eq!(decode_i32_le([0xff, 0xff, 0xff, 0xff]), -1);
        assert_eq!(decode_f32_le([0x00, 0x00, 0x80, 0x3f]), 1.0);
        assert_eq!(decode_f32_le([0x00, 0x00, 0x20, 0xc1]), -10.0);
    }

    #[test]
    fn strings_stop_at_first_nul() {
        let mut cell = [0u8; 32];
        cell[..5].copy_from_slice(b"sheep");
        cell[6] = b'x';
        assert_eq!(decode_str(&cell).unwrap(), "sheep");
        assert_eq!(decode_str(&[b'a'; 32]).unwrap(), "a".repeat(32));
        assert_eq!(decode_str(&[0u8; 32]).unwrap(), "");
        assert!(decode_str(&[0xff, 0xfe, 0]).is_err());
    }

    #[test]
    fn farm_rows_pair_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = farm().write_to(dir.path(), "farm.db721");
        let mut cursor = open_cursor(&path);
        assert_eq!(cursor.columns(), vec!["sheep_count", "farm_name"]);

        let rows = drain(&mut cursor);
        assert_eq!(
            rows,
            vec![
                Row {
                    values: vec![Value::Int(10), Value::Str("Cornfield Acres".into())]
                },
                Row {
                    values: vec![Value::Int(20), Value::Str("Dew Drop Farm".into())]
                },
                Row {
                    values: vec![Value::Int(30), Value::Str("Windy Ridge".into())]
                },
            ]
        );
        assert_eq!(cursor.next().expect("end"), CursorResult::EndOfScan);
        assert_eq!(cursor.next().expect("still end"), CursorResult::EndOfScan);
    }

    #[test]
    fn restart_replays_the_same_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = FixtureFile::new("T", 2)
            .column("w", FixtureColumn::Float(vec![0.5, -1.25, 3.0, 7.75, 9.0]))
            .column("n", FixtureColumn::Int(vec![5, 4, 3, 2, 1]));
        let path = fixture.write_to(dir.path(), "t.db721");
        let mut cursor = open_cursor(&path);

        let first = drain(&mut cursor);
        assert_eq!(first.len(), 5);
        assert_eq!(first[1].values, vec![Value::Float(-1.25), Value::Int(4)]);

        cursor.next().expect("partial");
        cursor.restart().expect("restart");
        assert_eq!(cursor.row_index(), 0);
        assert_eq!(drain(&mut cursor), first);
    }

    #[test]
    fn invalid_utf8_cell_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = FixtureFile::new("T", 4)
            .column("s", FixtureColumn::strs(&["ok", "bad"]))
            .write_to(dir.path(), "t.db721");
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[32] = 0xff;
        std::fs::write(&path, &bytes).expect("write");

        let mut cursor = open_cursor(&path);
        assert!(matches!(cursor.next().expect("row 0"), CursorResult::Row(_)));
        let err = cursor.next().expect_err("row 1");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.row(), Some(1));
        assert_eq!(err.column(), Some("s"));
        assert_eq!(err.offset(), Some(32));
        cursor.close();
        assert!(cursor.is_closed());
    }

    #[test]
    fn closed_cursor_rejects_use() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = farm().write_to(dir.path(), "farm.db721");
        let mut cursor = open_cursor(&path);
        cursor.close();
        cursor.close();
        assert_eq!(cursor.next().expect_err("closed").kind(), ErrorKind::Usage);
        assert_eq!(cursor.restart().expect_err("closed").kind(), ErrorKind::Usage);
        assert!(cursor.columns().is_empty());
    }

    #[test]
    fn rows_serialize_as_arrays() {
        let row = Row {
            values: vec![Value::Str("a".into()), Value::Int(-3), Value::Float(1.5)],
        };
        let json = serde_json::to_string(&row).expect("json");
        assert_eq!(json, r#"["a",-3,1.5]"#);
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn non_finite_floats_stay_distinct() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = FixtureFile::new("T", 4)
            .column(
                "w",
                FixtureColumn::Float(vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 1.0]),
            )
            .write_to(dir.path(), "t.db721");
        let mut cursor = open_cursor(&path);
        let rows = drain(&mut cursor);
        assert_eq!(rows.len(), 4);
        assert!(matches!(rows[0].values[0], Value::Float(value) if value.is_nan()));
        assert_eq!(rows[1].values, vec![Value::Float(f32::INFINITY)]);
        assert_eq!(rows[2].values, vec![Value::Float(f32::NEG_INFINITY)]);

        let json = rows
            .iter()
            .map(|row| serde_json::to_string(row).expect("json"))
            .collect::<Vec<_>>();
        assert_eq!(json, vec![r#"["NaN"]"#, r#"["inf"]"#, r#"["-inf"]"#, "[1.0]"]);
        let text = rows
            .iter()
            .map(|row| row.values[0].to_string())
            .collect::<Vec<_>>();
        assert_eq!(text, vec!["NaN", "inf", "-inf", "1"]);
    }

    #[test]
    fn cursor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ScanCursor>();
    }
}

//! Purpose: Resolve a db721 file's footer metadata into typed column descriptors.
//! Exports: `resolve`, `resolve_with`, `resolve_from_reader`, `FileDescriptor`, `ColumnDescriptor`.
//! Role: Turns the metadata token stream into the layout used by loading and decoding.
//! Invariants: Column order is the appearance order of keys under `Columns`.
//! Invariants: Every block but the last holds exactly `Max Values Per Block` records.
//! Invariants: All columns report the same record count; a mismatch is rejected.
//! Invariants: Every column region lies before the metadata footer.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::format::{
    DataType, FOOTER_LEN_BYTES, KEY_BLOCK_STATS, KEY_COLUMNS, KEY_MAX, KEY_MAX_LEN,
    KEY_MAX_VALUES_PER_BLOCK, KEY_MIN, KEY_MIN_LEN, KEY_NUM, KEY_NUM_BLOCKS, KEY_START_OFFSET,
    KEY_TABLE, KEY_TYPE,
};
use crate::core::meta::{Document, ParseOptions, Scalar, TokenId, TokenKind, tokenize};
use crate::core::range::RangeReader;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Str(String),
    Int(i64),
    Float(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockStats {
    pub num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<StatValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<StatValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_len: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub start_offset: u64,
    pub num_blocks: u32,
    pub block_stats: Vec<BlockStats>,
    num_records: u64,
}

impl ColumnDescriptor {
    pub fn element_width(&self) -> u32 {
        self.data_type.element_width()
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Length of the column's data region in bytes.
    pub fn byte_len(&self) -> u64 {
        self.num_records * u64::from(self.element_width())
    }

    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.byte_len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileDescriptor {
    pub table_name: String,
    pub max_values_per_block: u32,
    pub columns: Vec<ColumnDescriptor>,
    pub file_size: u64,
    pub metadata_len: u32,
}

impl FileDescriptor {
    /// Row count shared by every column.
    pub fn num_rows(&self) -> u64 {
        self.columns
            .first()
            .map(ColumnDescriptor::num_records)
            .unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn schema(&self) -> Vec<(String, DataType)> {
        self.columns
            .iter()
            .map(|column| (column.name.clone(), column.data_type))
            .collect()
    }

    /// First byte of the metadata text; column data must end at or before it.
    pub fn data_region_end(&self) -> u64 {
        self.file_size - FOOTER_LEN_BYTES - u64::from(self.metadata_len)
    }
}

pub fn resolve(path: impl AsRef<Path>) -> Result<FileDescriptor, Error> {
    resolve_with(path, &ParseOptions::default())
}

pub fn resolve_with(path: impl AsRef<Path>, options: &ParseOptions) -> Result<FileDescriptor, Error> {
    let mut reader = RangeReader::open(path)?;
    resolve_from_reader(&mut reader, options)
}

pub fn resolve_from_reader(
    reader: &mut RangeReader,
    options: &ParseOptions,
) -> Result<FileDescriptor, Error> {
    let path = reader.path().to_path_buf();
    let file_size = reader.file_size();

    let footer = reader
        .read_exact_range(FOOTER_LEN_BYTES, 0, true)
        .map_err(|err| err.with_hint("File is too small to hold a db721 metadata footer."))?;
    let metadata_len = read_u32_le(&footer);

    let metadata = reader
        .read_exact_range(u64::from(metadata_len), FOOTER_LEN_BYTES, true)
        .map_err(|err| {
            err.with_field("metadata_len")
                .with_hint("The trailing metadata length exceeds the file; the file is truncated or not db721.")
        })?;
    let metadata_start = file_size - FOOTER_LEN_BYTES - u64::from(metadata_len);

    let text = std::str::from_utf8(&metadata).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message("metadata is not valid UTF-8")
            .with_path(&path)
            .with_offset(metadata_start + err.valid_up_to() as u64)
            .with_source(err)
    })?;
    let doc = tokenize(text, options).map_err(|err| err.shift_offset(metadata_start).with_path(&path))?;

    let layout = FooterLayout {
        file_size,
        metadata_len,
    };
    let descriptor = build_descriptor(&doc, layout).map_err(|err| err.or_path(&path))?;

    tracing::debug!(
        path = %path.display(),
        table = %descriptor.table_name,
        columns = descriptor.columns.len(),
        rows = descriptor.num_rows(),
        max_values_per_block = descriptor.max_values_per_block,
        "resolved db721 metadata"
    );
    Ok(descriptor)
}

#[derive(Clone, Copy, Debug)]
struct FooterLayout {
    file_size: u64,
    metadata_len: u32,
}

fn build_descriptor(doc: &Document<'_>, layout: FooterLayout) -> Result<FileDescriptor, Error> {
    let root = doc.root();
    let table_name = doc
        .str_value(required(doc, root, KEY_TABLE)?)
        .map_err(|err| err.with_field(KEY_TABLE))?
        .into_owned();
    let max_values_per_block = doc
        .u32_value(required(doc, root, KEY_MAX_VALUES_PER_BLOCK)?)
        .map_err(|err| err.with_field(KEY_MAX_VALUES_PER_BLOCK))?;
    if max_values_per_block == 0 {
        return Err(Error::new(ErrorKind::SchemaConsistency)
            .with_message("max values per block must be positive")
            .with_field(KEY_MAX_VALUES_PER_BLOCK));
    }

    let columns_id = required(doc, root, KEY_COLUMNS)?;
    expect_object(doc, columns_id, KEY_COLUMNS)?;

    let names = doc.get_keys(columns_id);
    let mut seen = HashSet::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(Error::new(ErrorKind::SchemaConsistency)
                .with_message(format!("duplicate column {name:?}"))
                .with_column(name.into_owned()));
        }
        let column_id = doc
            .get_value(columns_id, &name)
            .ok_or_else(|| missing_field(KEY_COLUMNS).with_column(&*name))?;
        let column = parse_column(doc, &name, column_id, max_values_per_block)
            .map_err(|err| err.with_column(&*name))?;
        columns.push(column);
    }

    check_equal_counts(&columns)?;

    let data_end = layout.file_size - FOOTER_LEN_BYTES - u64::from(layout.metadata_len);
    for column in &columns {
        check_bounds(column, data_end)?;
    }

    Ok(FileDescriptor {
        table_name,
        max_values_per_block,
        columns,
        file_size: layout.file_size,
        metadata_len: layout.metadata_len,
    })
}

fn parse_column(
    doc: &Document<'_>,
    name: &str,
    id: TokenId,
    max_values_per_block: u32,
) -> Result<ColumnDescriptor, Error> {
    expect_object(doc, id, name)?;

    let type_tag = doc
        .str_value(required(doc, id, KEY_TYPE)?)
        .map_err(|err| err.with_field(KEY_TYPE))?;
    let data_type = DataType::from_tag(&type_tag)?;
    let start_offset = doc
        .u64_value(required(doc, id, KEY_START_OFFSET)?)
        .map_err(|err| err.with_field(KEY_START_OFFSET))?;
    let num_blocks = doc
        .u32_value(required(doc, id, KEY_NUM_BLOCKS)?)
        .map_err(|err| err.with_field(KEY_NUM_BLOCKS))?;
    let stats_id = required(doc, id, KEY_BLOCK_STATS)?;
    expect_object(doc, stats_id, KEY_BLOCK_STATS)?;

    let stat_entries = doc.entries(stats_id).count();
    if stat_entries != num_blocks as usize {
        return Err(Error::new(ErrorKind::SchemaConsistency)
            .with_message(format!(
                "block_stats has {stat_entries} entries but num_blocks is {num_blocks}"
            ))
            .with_field(KEY_BLOCK_STATS));
    }

    let mut block_stats = Vec::with_capacity(num_blocks as usize);
    for block in 0..num_blocks {
        let key = block.to_string();
        let block_id = doc
            .get_value(stats_id, &key)
            .ok_or_else(|| missing_field(&format!("{KEY_BLOCK_STATS}.{key}")))?;
        let stats = parse_block_stats(doc, block_id, &key)?;
        let is_last = block + 1 == num_blocks;
        if !is_last && stats.num != max_values_per_block {
            return Err(Error::new(ErrorKind::SchemaConsistency)
                .with_message(format!(
                    "block {block} holds {} records; every block but the last must hold {max_values_per_block}",
                    stats.num
                ))
                .with_field(format!("{KEY_BLOCK_STATS}.{key}.{KEY_NUM}")));
        }
        if is_last && (stats.num == 0 || stats.num > max_values_per_block) {
            return Err(Error::new(ErrorKind::SchemaConsistency)
                .with_message(format!(
                    "last block holds {} records; expected 1..={max_values_per_block}",
                    stats.num
                ))
                .with_field(format!("{KEY_BLOCK_STATS}.{key}.{KEY_NUM}")));
        }
        block_stats.push(stats);
    }

    let num_records = match block_stats.last() {
        Some(last) => {
            u64::from(num_blocks - 1) * u64::from(max_values_per_block) + u64::from(last.num)
        }
        None => 0,
    };
    debug_assert_eq!(
        num_records,
        block_stats.iter().map(|stats| u64::from(stats.num)).sum::<u64>()
    );

    Ok(ColumnDescriptor {
        name: name.to_string(),
        data_type,
        start_offset,
        num_blocks,
        block_stats,
        num_records,
    })
}

fn parse_block_stats(doc: &Document<'_>, id: TokenId, key: &str) -> Result<BlockStats, Error> {
    let field = |name: &str| format!("{KEY_BLOCK_STATS}.{key}.{name}");
    expect_object(doc, id, &format!("{KEY_BLOCK_STATS}.{key}"))?;

    let num_id = doc
        .get_value(id, KEY_NUM)
        .ok_or_else(|| missing_field(&field(KEY_NUM)))?;
    let num = doc
        .u32_value(num_id)
        .map_err(|err| err.with_field(field(KEY_NUM)))?;

    let stat = |name: &str| -> Result<Option<StatValue>, Error> {
        match doc.get_value(id, name) {
            Some(value_id) => doc
                .scalar(value_id)
                .map(stat_value)
                .map_err(|err| err.with_field(field(name))),
            None => Ok(None),
        }
    };
    let len = |name: &str| -> Result<Option<u32>, Error> {
        match doc.get_value(id, name) {
            Some(value_id) => doc
                .u32_value(value_id)
                .map(Some)
                .map_err(|err| err.with_field(field(name))),
            None => Ok(None),
        }
    };

    Ok(BlockStats {
        num,
        min: stat(KEY_MIN)?,
        max: stat(KEY_MAX)?,
        min_len: len(KEY_MIN_LEN)?,
        max_len: len(KEY_MAX_LEN)?,
    })
}

fn stat_value(scalar: Scalar<'_>) -> Option<StatValue> {
    match scalar {
        Scalar::Str(value) => Some(StatValue::Str(value.into_owned())),
        Scalar::Int(value) => Some(StatValue::Int(value)),
        Scalar::Float(value) => Some(StatValue::Float(value)),
        Scalar::Bool(_) | Scalar::Null => None,
    }
}

fn check_equal_counts(columns: &[ColumnDescriptor]) -> Result<(), Error> {
    let Some(first) = columns.first() else {
        return Ok(());
    };
    for column in &columns[1..] {
        if column.num_records != first.num_records {
            return Err(Error::new(ErrorKind::SchemaConsistency)
                .with_message(format!(
                    "column {:?} has {} records but column {:?} has {}",
                    column.name, column.num_records, first.name, first.num_records
                ))
                .with_column(column.name.as_str())
                .with_hint("db721 scans require every column to hold the same number of rows."));
        }
    }
    Ok(())
}

fn check_bounds(column: &ColumnDescriptor, data_end: u64) -> Result<(), Error> {
    let end = column
        .num_records
        .checked_mul(u64::from(column.element_width()))
        .and_then(|len| column.start_offset.checked_add(len));
    match end {
        Some(end) if end <= data_end => Ok(()),
        _ => Err(Error::new(ErrorKind::TruncatedRead)
            .with_message(format!(
                "column data ends past the metadata footer (data region ends at {data_end})"
            ))
            .with_column(column.name.as_str())
            .with_offset(column.start_offset)
            .with_expected_len(column.num_records.saturating_mul(u64::from(column.element_width())))),
    }
}

fn required(doc: &Document<'_>, container: TokenId, key: &str) -> Result<TokenId, Error> {
    doc.get_value(container, key)
        .ok_or_else(|| missing_field(key))
}

fn expect_object(doc: &Document<'_>, id: TokenId, field: &str) -> Result<(), Error> {
    if doc.kind(id) == TokenKind::Object {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Parse)
        .with_message(format!("{field} must be an object"))
        .with_field(field)
        .with_offset(doc.token(id).start as u64))
}

fn missing_field(field: &str) -> Error {
    Error::new(ErrorKind::MissingField)
        .with_message(format!("missing required metadata field {field:?}"))
        .with_field(field)
}

fn read_u32_le(buf: &[u8]) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[0..4]);
    u32::from_le_bytes(out)
}

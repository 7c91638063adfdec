// Test-only db721 file builder shared by unit and integration tests.
// Kept free of crate imports so integration tests can include it by path.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const STR_CELL: usize = 32;

#[derive(Clone, Debug)]
pub enum FixtureColumn {
    Str(Vec<String>),
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl FixtureColumn {
    pub fn strs(values: &[&str]) -> Self {
        FixtureColumn::Str(values.iter().map(|value| value.to_string()).collect())
    }

    fn len(&self) -> usize {
        match self {
            FixtureColumn::Str(values) => values.len(),
            FixtureColumn::Int(values) => values.len(),
            FixtureColumn::Float(values) => values.len(),
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            FixtureColumn::Str(_) => "str",
            FixtureColumn::Int(_) => "int",
            FixtureColumn::Float(_) => "float",
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            FixtureColumn::Str(values) => {
                for value in values {
                    let mut cell = [0u8; STR_CELL];
                    let bytes = value.as_bytes();
                    let len = bytes.len().min(STR_CELL);
                    cell[..len].copy_from_slice(&bytes[..len]);
                    out.extend_from_slice(&cell);
                }
            }
            FixtureColumn::Int(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            FixtureColumn::Float(values) => {
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        out
    }

    fn block_stats_json(&self, range: std::ops::Range<usize>) -> String {
        let num = range.len();
        match self {
            FixtureColumn::Str(values) => {
                let block = &values[range];
                let min = block.iter().min().cloned().unwrap_or_default();
                let max = block.iter().max().cloned().unwrap_or_default();
                let min_len = block.iter().map(String::len).min().unwrap_or(0);
                let max_len = block.iter().map(String::len).max().unwrap_or(0);
                format!(
                    "{{\"num\": {num}, \"min\": {}, \"max\": {}, \"min_len\": {min_len}, \"max_len\": {max_len}}}",
                    quote(&min),
                    quote(&max)
                )
            }
            FixtureColumn::Int(values) => {
                let block = &values[range];
                let min = block.iter().min().copied().unwrap_or(0);
                let max = block.iter().max().copied().unwrap_or(0);
                format!("{{\"num\": {num}, \"min\": {min}, \"max\": {max}}}")
            }
            FixtureColumn::Float(values) => {
                // NaN and infinities have no JSON spelling; stats cover finite values only.
                let finite = values[range]
                    .iter()
                    .copied()
                    .filter(|value| value.is_finite())
                    .collect::<Vec<_>>();
                if finite.is_empty() {
                    return format!("{{\"num\": {num}}}");
                }
                let min = finite.iter().copied().fold(f32::INFINITY, f32::min);
                let max = finite.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                format!("{{\"num\": {num}, \"min\": {min:?}, \"max\": {max:?}}}")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct FixtureFile {
    pub table: String,
    pub max_values_per_block: usize,
    pub columns: Vec<(String, FixtureColumn)>,
    /// Emit column data in reverse order so `start_offset` order differs from key order.
    pub reverse_data_order: bool,
}

impl FixtureFile {
    pub fn new(table: &str, max_values_per_block: usize) -> Self {
        Self {
            table: table.to_string(),
            max_values_per_block,
            columns: Vec::new(),
            reverse_data_order: false,
        }
    }

    pub fn column(mut self, name: &str, column: FixtureColumn) -> Self {
        self.columns.push((name.to_string(), column));
        self
    }

    pub fn reverse_data_order(mut self) -> Self {
        self.reverse_data_order = true;
        self
    }

    /// Data section bytes plus the metadata text that describes them.
    pub fn parts(&self) -> (Vec<u8>, String) {
        let mut data = Vec::new();
        let mut offsets = vec![0usize; self.columns.len()];
        let order: Vec<usize> = if self.reverse_data_order {
            (0..self.columns.len()).rev().collect()
        } else {
            (0..self.columns.len()).collect()
        };
        for idx in order {
            offsets[idx] = data.len();
            data.extend_from_slice(&self.columns[idx].1.encode());
        }

        let mut column_entries = Vec::new();
        for (idx, (name, column)) in self.columns.iter().enumerate() {
            let total = column.len();
            let max = self.max_values_per_block.max(1);
            let num_blocks = total.div_ceil(max);
            let blocks = (0..num_blocks)
                .map(|block| {
                    let start = block * max;
                    let end = (start + max).min(total);
                    format!("\"{block}\": {}", column.block_stats_json(start..end))
                })
                .collect::<Vec<_>>()
                .join(", ");
            column_entries.push(format!(
                "{}: {{\"type\": \"{}\", \"block_stats\": {{{blocks}}}, \"num_blocks\": {num_blocks}, \"start_offset\": {}}}",
                quote(name),
                column.type_tag(),
                offsets[idx]
            ));
        }

        let metadata = format!(
            "{{\"Table\": {}, \"Columns\": {{{}}}, \"Max Values Per Block\": {}}}",
            quote(&self.table),
            column_entries.join(", "),
            self.max_values_per_block
        );
        (data, metadata)
    }

    pub fn build(&self) -> Vec<u8> {
        let (data, metadata) = self.parts();
        assemble(&data, &metadata)
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).expect("write fixture");
        path
    }
}

/// Concatenates data, metadata text, and the little-endian metadata length.
pub fn assemble(data: &[u8], metadata: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + metadata.len() + 4);
    out.extend_from_slice(data);
    out.extend_from_slice(metadata.as_bytes());
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    out
}

pub fn write_raw(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture");
    path
}

/// The 3-row farm table used across scan tests.
pub fn farm() -> FixtureFile {
    FixtureFile::new("Farm", 4)
        .column("sheep_count", FixtureColumn::Int(vec![10, 20, 30]))
        .column(
            "farm_name",
            FixtureColumn::strs(&["Cornfield Acres", "Dew Drop Farm", "Windy Ridge"]),
        )
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

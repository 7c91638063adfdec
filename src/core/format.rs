//! Purpose: Centralize db721 on-disk constants and the column type tags.
//! Exports: `DataType`, `FOOTER_LEN_BYTES`, `STR_WIDTH`, metadata key names.
//! Role: Single source for byte widths and key spellings used by resolve and decode.
//! Invariants: Element widths are fixed per type (str=32, int=4, float=4).
//! Invariants: Type tags are matched exactly; unknown tags are never defaulted.

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

/// Size of the little-endian u32 metadata length that ends every file.
pub const FOOTER_LEN_BYTES: u64 = 4;
pub const STR_WIDTH: u32 = 32;
pub const INT_WIDTH: u32 = 4;
pub const FLOAT_WIDTH: u32 = 4;

pub const KEY_TABLE: &str = "Table";
pub const KEY_MAX_VALUES_PER_BLOCK: &str = "Max Values Per Block";
pub const KEY_COLUMNS: &str = "Columns";
pub const KEY_TYPE: &str = "type";
pub const KEY_START_OFFSET: &str = "start_offset";
pub const KEY_NUM_BLOCKS: &str = "num_blocks";
pub const KEY_BLOCK_STATS: &str = "block_stats";
pub const KEY_NUM: &str = "num";
pub const KEY_MIN: &str = "min";
pub const KEY_MAX: &str = "max";
pub const KEY_MIN_LEN: &str = "min_len";
pub const KEY_MAX_LEN: &str = "max_len";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Str,
    Int,
    Float,
}

impl DataType {
    pub fn from_tag(tag: &str) -> Result<Self, Error> {
        match tag {
            "str" => Ok(DataType::Str),
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            other => Err(Error::new(ErrorKind::UnsupportedType)
                .with_message(format!("unsupported column type {other:?}"))
                .with_field(KEY_TYPE)),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            DataType::Str => "str",
            DataType::Int => "int",
            DataType::Float => "float",
        }
    }

    pub fn element_width(self) -> u32 {
        match self {
            DataType::Str => STR_WIDTH,
            DataType::Int => INT_WIDTH,
            DataType::Float => FLOAT_WIDTH,
        }
    }
}

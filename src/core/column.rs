// Whole-column loads: one contiguous read per column region.
use crate::core::error::{Error, ErrorKind};
use crate::core::format::DataType;
use crate::core::range::RangeReader;
use crate::core::schema::ColumnDescriptor;

/// Raw bytes of one column region plus what is needed to slice it.
#[derive(Clone, Debug)]
pub struct ColumnBuffer {
    pub name: String,
    pub data_type: DataType,
    pub start_offset: u64,
    pub num_records: u64,
    bytes: Vec<u8>,
}

impl ColumnBuffer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element_width(&self) -> usize {
        self.data_type.element_width() as usize
    }

    /// Bytes of record `row`, or `Corrupt` when the row lies outside the buffer.
    pub fn cell(&self, row: u64) -> Result<&[u8], Error> {
        let width = self.element_width() as u64;
        let start = row.checked_mul(width);
        let end = start.and_then(|start| start.checked_add(width));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.bytes.len() as u64 => {
                Ok(&self.bytes[start as usize..end as usize])
            }
            _ => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "row {row} lies outside the {}-byte column buffer",
                    self.bytes.len()
                ))
                .with_column(self.name.as_str())
                .with_row(row)),
        }
    }
}

pub fn load_column(
    reader: &mut RangeReader,
    column: &ColumnDescriptor,
) -> Result<ColumnBuffer, Error> {
    let length = column.byte_len();
    let bytes = reader
        .read_exact_range(length, column.start_offset, false)
        .map_err(|err| err.with_column(column.name.as_str()))?;
    tracing::trace!(
        column = %column.name,
        offset = column.start_offset,
        len = length,
        "loaded column"
    );
    Ok(ColumnBuffer {
        name: column.name.clone(),
        data_type: column.data_type,
        start_offset: column.start_offset,
        num_records: column.num_records(),
        bytes,
    })
}

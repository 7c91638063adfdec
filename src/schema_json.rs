//! Purpose: JSON shapes for file descriptors, columns, and block statistics.
//! Exports: `descriptor_json`, `column_json`, `column_stats_json`.
//! Role: Keep `schema --json` and `stats` envelopes consistent.
//! Invariants: Columns are listed in descriptor order; blocks in block-index order.

use std::path::Path;

use db721::api::{BlockStats, ColumnDescriptor, Error, ErrorKind, FileDescriptor};
use serde_json::{Map, Value, json};

pub(crate) fn descriptor_json(path: &Path, descriptor: &FileDescriptor) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(path.display().to_string()));
    map.insert("table".to_string(), json!(descriptor.table_name));
    map.insert("num_rows".to_string(), json!(descriptor.num_rows()));
    map.insert(
        "max_values_per_block".to_string(),
        json!(descriptor.max_values_per_block),
    );
    map.insert("file_size".to_string(), json!(descriptor.file_size));
    map.insert("metadata_len".to_string(), json!(descriptor.metadata_len));
    map.insert(
        "columns".to_string(),
        Value::Array(descriptor.columns.iter().map(column_json).collect()),
    );
    Value::Object(map)
}

pub(crate) fn column_json(column: &ColumnDescriptor) -> Value {
    json!({
        "name": column.name,
        "type": column.data_type.tag(),
        "start_offset": column.start_offset,
        "num_blocks": column.num_blocks,
        "num_records": column.num_records(),
    })
}

pub(crate) fn column_stats_json(column: &ColumnDescriptor) -> Result<Value, Error> {
    let mut value = column_json(column);
    let blocks = column
        .block_stats
        .iter()
        .enumerate()
        .map(|(index, stats)| block_stats_json(index, stats))
        .collect::<Result<Vec<_>, _>>()?;
    if let Value::Object(map) = &mut value {
        map.insert("blocks".to_string(), Value::Array(blocks));
    }
    Ok(value)
}

fn block_stats_json(index: usize, stats: &BlockStats) -> Result<Value, Error> {
    let encoded = serde_json::to_value(stats).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode block stats")
            .with_source(err)
    })?;
    let mut map = Map::new();
    map.insert("block".to_string(), json!(index));
    if let Value::Object(fields) = encoded {
        map.extend(fields);
    }
    Ok(Value::Object(map))
}

//! CSV and JSON views of a result set. Neither file is read back by the
//! program.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::MatchRow;

/// Header is the sorted union of row keys; null values become empty cells.
/// Nothing is written for an empty result set.
pub fn export_csv(rows: &[MatchRow], path: &Path) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let records = rows
        .iter()
        .map(|row| -> Result<Map<String, Value>> {
            match serde_json::to_value(row)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let header: BTreeSet<&str> = records.iter().flat_map(|r| r.keys().map(String::as_str)).collect();

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for record in &records {
        writer.write_record(header.iter().map(|key| cell(record.get(*key))))?;
    }
    writer.flush()?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pretty-printed JSON array. An empty result set writes `[]`.
pub fn export_json(rows: &[MatchRow], path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, rows)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

//! Batch import of rows under a committed schema.
//!
//! Rows stream from the source file and commit in fixed-size batches for
//! bounded memory; a cell that fails to coerce under the committed schema
//! is recovered locally as the widened string fallback and logged, never
//! aborting the import. The staged batches only become the dataset's
//! record generation once every batch has committed, so a failing stream
//! leaves the dataset untouched.

use std::{collections::BTreeMap, path::Path};

use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde_json::json;

use crate::{
    dataset::{ImportLogEntry, LogLevel, Record},
    error::{Result, SchemaMismatch},
    io_utils,
    schema::Schema,
    value::{self, Value},
};

/// Outcome of a fully committed batch sequence.
#[derive(Debug)]
pub struct ImportOutcome {
    pub records: Vec<Record>,
    pub imported: usize,
    pub fallback_cells: usize,
    pub entries: Vec<ImportLogEntry>,
}

/// Stream the data rows of a CSV file as decoded cells, empty cell = null.
/// Undecodable bytes degrade to replacement characters rather than
/// aborting mid-file.
pub fn read_rows(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<impl Iterator<Item = Result<Vec<Option<String>>>>> {
    let reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    Ok(reader.into_byte_records().map(move |record| {
        let record = record?;
        let cells = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    return None;
                }
                let (decoded, _) = io_utils::decode_bytes_lossy(field, encoding);
                let trimmed = decoded.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect();
        Ok(cells)
    }))
}

/// Coerce one cell under its declared column type. Failure to coerce is
/// the locally recovered [`SchemaMismatch`]: the caller stores the string
/// fallback and keeps going.
fn coerce_cell(
    schema: &Schema,
    position: usize,
    raw: Option<String>,
) -> std::result::Result<Option<Value>, SchemaMismatch> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let column = &schema.columns[position];
    match value::parse_typed(&raw, &column.datatype) {
        Some(parsed) => Ok(parsed),
        None => Err(SchemaMismatch {
            column: column.name.clone(),
            raw,
        }),
    }
}

/// Consume a lazy row stream, coercing cells and committing records in
/// `batch_size` chunks. Returns the staged records plus the per-batch log
/// entries; the caller installs them atomically via
/// [`crate::dataset::Dataset::replace_records`].
pub fn import_batch<I>(schema: &Schema, rows: I, batch_size: usize) -> Result<ImportOutcome>
where
    I: IntoIterator<Item = Result<Vec<Option<String>>>>,
{
    let batch_size = batch_size.max(1);
    let width = schema.columns.len();
    let mut committed: Vec<Record> = Vec::new();
    let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
    let mut entries: Vec<ImportLogEntry> = Vec::new();
    let mut fallback_per_column: BTreeMap<String, usize> = BTreeMap::new();
    let mut fallback_cells = 0usize;

    for row in rows {
        let mut cells = row?;
        // Short rows pad with nulls; extra cells are dropped. Position is
        // authoritative, the header row fixed the width.
        cells.resize(width, None);

        let mut values: Vec<Option<Value>> = Vec::with_capacity(width);
        for (position, raw) in cells.into_iter().enumerate() {
            match coerce_cell(schema, position, raw) {
                Ok(value) => values.push(value),
                Err(mismatch) => {
                    debug!(
                        "Cell '{}' in column '{}' does not coerce to {}; storing as string",
                        mismatch.raw, mismatch.column, schema.columns[position].datatype
                    );
                    fallback_cells += 1;
                    *fallback_per_column.entry(mismatch.column).or_insert(0) += 1;
                    values.push(Some(Value::String(mismatch.raw)));
                }
            }
        }
        batch.push(Record::new(values));

        if batch.len() >= batch_size {
            committed.append(&mut batch);
            info!("Committed batch of {} row(s), {} total", batch_size, committed.len());
            entries.push(ImportLogEntry::new(
                LogLevel::Info,
                format!("Imported {} rows", committed.len()),
                json!({ "batch_size": batch_size }),
            ));
        }
    }

    if !batch.is_empty() {
        committed.append(&mut batch);
    }

    if fallback_cells > 0 {
        warn!(
            "{fallback_cells} cell(s) failed schema coercion and defaulted to string"
        );
        entries.push(ImportLogEntry::new(
            LogLevel::Warning,
            format!("{fallback_cells} cells defaulted to string"),
            json!({ "columns": fallback_per_column }),
        ));
    }

    let imported = committed.len();
    Ok(ImportOutcome {
        records: committed,
        imported,
        fallback_cells,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType};

    fn schema_of(types: &[(&str, ColumnType)]) -> Schema {
        Schema {
            columns: types
                .iter()
                .enumerate()
                .map(|(position, (name, datatype))| ColumnSpec {
                    name: (*name).to_string(),
                    datatype: *datatype,
                    nullable: true,
                    unique: false,
                    position,
                })
                .collect(),
        }
    }

    fn rows_of(rows: Vec<Vec<Option<&str>>>) -> Vec<Result<Vec<Option<String>>>> {
        rows.into_iter()
            .map(|row| Ok(row.into_iter().map(|c| c.map(str::to_string)).collect()))
            .collect()
    }

    #[test]
    fn coercion_failure_falls_back_to_string_and_logs() {
        let schema = schema_of(&[("amount", ColumnType::Integer)]);
        let rows = rows_of(vec![vec![Some("12")], vec![Some("oops")], vec![None]]);
        let outcome = import_batch(&schema, rows, 10).expect("import");

        assert_eq!(outcome.imported, 3);
        assert_eq!(outcome.fallback_cells, 1);
        assert_eq!(outcome.records[0].value(0), Some(&Value::Integer(12)));
        assert_eq!(
            outcome.records[1].value(0),
            Some(&Value::String("oops".to_string()))
        );
        assert_eq!(outcome.records[2].value(0), None);
        assert!(outcome
            .entries
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.contains("defaulted to string")));
    }

    #[test]
    fn batches_emit_progress_entries() {
        let schema = schema_of(&[("n", ColumnType::Integer)]);
        let rows = rows_of((0..5).map(|_| vec![Some("1")]).collect());
        let outcome = import_batch(&schema, rows, 2).expect("import");
        assert_eq!(outcome.imported, 5);
        let progress = outcome
            .entries
            .iter()
            .filter(|e| e.level == LogLevel::Info)
            .count();
        assert_eq!(progress, 2);
    }

    #[test]
    fn short_rows_pad_with_nulls() {
        let schema = schema_of(&[("a", ColumnType::String), ("b", ColumnType::String)]);
        let rows = rows_of(vec![vec![Some("x")]]);
        let outcome = import_batch(&schema, rows, 10).expect("import");
        assert_eq!(outcome.records[0].len(), 2);
        assert_eq!(outcome.records[0].value(1), None);
    }

    #[test]
    fn failing_stream_propagates_without_partial_commit() {
        let schema = schema_of(&[("n", ColumnType::Integer)]);
        let rows: Vec<Result<Vec<Option<String>>>> = vec![
            Ok(vec![Some("1".to_string())]),
            Err(crate::error::CoreError::malformed("truncated stream")),
        ];
        assert!(import_batch(&schema, rows, 10).is_err());
    }
}

//! Structural analysis of raw tabular files.
//!
//! Given raw file bytes this module detects the field delimiter and text
//! encoding, extracts and normalizes the header row, and runs the type
//! inferencer per column over a bounded sample to produce a [`Schema`]
//! plus realized [`ColumnStats`].

use std::{collections::HashSet, path::Path};

use encoding_rs::Encoding;
use itertools::Itertools;
use log::{debug, info};

use crate::{
    config::CoreConfig,
    error::{CoreError, Result},
    io_utils,
    schema::{self, ColumnSpec, ColumnStats, Schema, TypeCandidate},
};

/// Delimiter candidates in priority order; ties resolve to the earliest.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Result of structural analysis: everything the importer and the
/// generators need to know about one source file.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub schema: Schema,
    pub stats: Vec<ColumnStats>,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub rows_sampled: usize,
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

/// Pick the delimiter whose parse of the sampled lines yields a fully
/// consistent field count of at least two columns. The widest consistent
/// candidate wins; ties break by candidate priority. A delimiter that
/// never splits (width 1) does not delimit, so it only wins when every
/// candidate agrees the file is single-column; otherwise the input is
/// structurally ragged and analysis fails.
pub fn detect_delimiter(sample: &str) -> Result<u8> {
    let mut best: Option<(u8, usize)> = None;
    let mut all_single_column = true;
    for &candidate in &DELIMITER_CANDIDATES {
        let mut reader = io_utils::open_csv_reader(sample.as_bytes(), candidate, false);
        let counts: Vec<usize> = reader
            .byte_records()
            .filter_map(|record| record.ok())
            .map(|record| record.len())
            .collect();
        if counts.is_empty() || !counts.iter().all_equal() {
            all_single_column = false;
            continue;
        }
        let width = counts[0];
        debug!(
            "Delimiter candidate '{}' splits {} sampled line(s) into {} field(s)",
            printable_delimiter(candidate),
            counts.len(),
            width
        );
        if width > 1 {
            all_single_column = false;
            if best.is_none_or(|(_, best_width)| width > best_width) {
                best = Some((candidate, width));
            }
        }
    }
    if let Some((delimiter, _)) = best {
        return Ok(delimiter);
    }
    if all_single_column {
        return Ok(DELIMITER_CANDIDATES[0]);
    }
    Err(CoreError::malformed(
        "no delimiter candidate yields a consistent column count",
    ))
}

/// Take the first `lines` lines of decoded text for the delimiter probe.
fn sample_lines(text: &str, lines: usize) -> String {
    text.lines().take(lines.max(1)).join("\n")
}

/// Full structural analysis of one file: delimiter, encoding, header
/// normalization, bounded-sample inference, per-column statistics.
pub fn analyze_path(path: &Path, config: &CoreConfig) -> Result<Analysis> {
    let head = io_utils::read_head(path)?;
    if head.is_empty() {
        return Err(CoreError::malformed(format!(
            "input file {path:?} is empty"
        )));
    }
    let encoding = io_utils::probe_encoding(&head, config.fallback_encoding());
    let (head_text, _) = io_utils::decode_bytes_lossy(&head, encoding);
    let delimiter = detect_delimiter(&sample_lines(&head_text, config.delimiter_sample_lines))?;
    info!(
        "Analyzing {:?}: delimiter '{}', encoding {}",
        path,
        printable_delimiter(delimiter),
        encoding.name()
    );

    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let raw_headers = io_utils::reader_headers(&mut reader, encoding)?;
    let headers = schema::normalize_headers(&raw_headers);

    let mut candidates = vec![TypeCandidate::new(); headers.len()];
    let mut null_counts = vec![0usize; headers.len()];
    let mut distinct: Vec<HashSet<String>> = vec![HashSet::new(); headers.len()];
    let mut samples: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    let mut record = csv::ByteRecord::new();
    let mut rows_sampled = 0usize;
    while reader.read_byte_record(&mut record)? {
        if config.sample_rows > 0 && rows_sampled >= config.sample_rows {
            break;
        }
        for (idx, _) in headers.iter().enumerate() {
            let raw = match record.get(idx) {
                Some(field) if !field.is_empty() => {
                    let (decoded, _) = io_utils::decode_bytes_lossy(field, encoding);
                    let trimmed = decoded.trim().to_string();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed)
                    }
                }
                _ => None,
            };
            match raw {
                Some(cell) => {
                    candidates[idx].update(&cell);
                    if distinct[idx].insert(cell.clone())
                        && samples[idx].len() < config.sample_value_cap
                    {
                        samples[idx].push(cell);
                    }
                }
                None => null_counts[idx] += 1,
            }
        }
        rows_sampled += 1;
    }

    if rows_sampled == 0 {
        return Err(CoreError::malformed(format!(
            "input file {path:?} has zero data rows"
        )));
    }

    let columns = headers
        .iter()
        .enumerate()
        .map(|(position, name)| {
            let nullable = null_counts[position] > 0;
            let unique_count = distinct[position].len();
            ColumnSpec {
                name: name.clone(),
                datatype: candidates[position].decide(),
                nullable,
                // Heuristic over the sample only; not a constraint.
                unique: !nullable && unique_count == rows_sampled,
                position,
            }
        })
        .collect();

    let stats = headers
        .iter()
        .enumerate()
        .map(|(idx, _)| ColumnStats {
            null_count: null_counts[idx],
            unique_count: distinct[idx].len(),
            sample_values: samples[idx].clone(),
        })
        .collect();

    info!(
        "Analysis complete for {:?}: {} column(s) over {} sampled row(s)",
        path,
        headers.len(),
        rows_sampled
    );

    Ok(Analysis {
        schema: Schema { columns },
        stats,
        delimiter,
        encoding,
        rows_sampled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_wins_priority_ties() {
        // Single-column view is consistent under every candidate.
        assert_eq!(detect_delimiter("alpha\nbeta\ngamma").unwrap(), b',');
    }

    #[test]
    fn widest_consistent_candidate_wins() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3").unwrap(), b';');
        assert_eq!(detect_delimiter("a|b\n1|2").unwrap(), b'|');
        assert_eq!(detect_delimiter("a\tb\n1\t2").unwrap(), b'\t');
    }

    #[test]
    fn quoted_fields_do_not_fool_the_probe() {
        assert_eq!(
            detect_delimiter("name,notes\n\"x\",\"a;b;c;d\"\n\"y\",\"p;q\"").unwrap(),
            b','
        );
    }

    #[test]
    fn ragged_rows_yield_malformed_input() {
        let err = detect_delimiter("a,b,c\n1,2\n1,2,3,4").unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
    }
}

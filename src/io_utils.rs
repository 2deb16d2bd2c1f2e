//! I/O utilities for CSV reading and encoding resolution.
//!
//! All file input in tabxml flows through this module:
//!
//! - **Reader construction**: `open_csv_reader` / `open_csv_reader_from_path`
//!   build `csv` readers with the pipeline's quoting defaults.
//! - **Encoding**: a UTF-8 validity probe over the file head, with decode
//!   helpers via `encoding_rs` for the configured fallback.
//!
//! Generated XML/XSD output is always UTF-8 and does not pass through here.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8};

use crate::error::{CoreError, Result};

/// Bytes inspected by the encoding probe and delimiter detection.
pub const HEAD_SAMPLE_BYTES: usize = 64 * 1024;

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|err| CoreError::malformed(format!("cannot open input file {path:?}: {err}")))?;
    Ok(open_csv_reader(BufReader::new(file), delimiter, has_headers))
}

/// Read up to [`HEAD_SAMPLE_BYTES`] from the start of the file.
pub fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)
        .map_err(|err| CoreError::malformed(format!("cannot open input file {path:?}: {err}")))?;
    let mut head = Vec::with_capacity(8 * 1024);
    file.take(HEAD_SAMPLE_BYTES as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// UTF-8 validity probe. A trailing truncated multi-byte sequence (the
/// sample may end mid-character) still counts as valid UTF-8.
pub fn probe_encoding(head: &[u8], fallback: &'static Encoding) -> &'static Encoding {
    match std::str::from_utf8(head) {
        Ok(_) => UTF_8,
        Err(err) if err.error_len().is_none() => UTF_8,
        Err(_) => fallback,
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(CoreError::malformed(format!(
            "failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

/// Lossy decode used on the import path, where a stray undecodable byte
/// degrades to U+FFFD instead of aborting the batch. Returns whether a
/// replacement happened so callers can log it.
pub fn decode_bytes_lossy(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_accepts_valid_utf8() {
        assert_eq!(
            probe_encoding("id,name\n1,café".as_bytes(), encoding_rs::WINDOWS_1252),
            UTF_8
        );
    }

    #[test]
    fn probe_accepts_truncated_trailing_sequence() {
        let mut bytes = "café".as_bytes().to_vec();
        bytes.pop();
        assert_eq!(probe_encoding(&bytes, encoding_rs::WINDOWS_1252), UTF_8);
    }

    #[test]
    fn probe_falls_back_on_invalid_utf8() {
        // 0xE9 is 'é' in windows-1252 but invalid standalone UTF-8.
        let bytes = b"caf\xE9,1\n";
        assert_eq!(
            probe_encoding(bytes, encoding_rs::WINDOWS_1252),
            encoding_rs::WINDOWS_1252
        );
    }

    #[test]
    fn lossy_decode_flags_replacements() {
        let (text, had_errors) = decode_bytes_lossy(b"a\xFFb", UTF_8);
        assert!(had_errors);
        assert!(text.contains('\u{FFFD}'));
    }
}

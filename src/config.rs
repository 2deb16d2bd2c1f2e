use std::{fs::File, path::{Path, PathBuf}};

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_SAMPLE_ROWS: usize = 2_000;
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_SAMPLE_VALUE_CAP: usize = 5;
pub const DEFAULT_DELIMITER_SAMPLE_LINES: usize = 10;

/// Tunables for the ingestion/projection pipeline.
///
/// Loadable from YAML so embedding transports can ship a config file, but
/// every field has a sensible default and `CoreConfig::default()` is the
/// common path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Rows sampled during structural analysis. 0 means the full file.
    pub sample_rows: usize,
    /// Records committed per import batch.
    pub batch_size: usize,
    /// Cap on per-column sample values retained in ColumnStats.
    pub sample_value_cap: usize,
    /// Lines inspected by the delimiter probe.
    pub delimiter_sample_lines: usize,
    /// Encoding label used when the UTF-8 probe fails.
    pub fallback_encoding: String,
    /// Indent width for generated XML/XSD documents.
    pub xml_indent: usize,
    /// Optional directory where generated artifacts are also written.
    pub artifact_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            batch_size: DEFAULT_BATCH_SIZE,
            sample_value_cap: DEFAULT_SAMPLE_VALUE_CAP,
            delimiter_sample_lines: DEFAULT_DELIMITER_SAMPLE_LINES,
            fallback_encoding: "windows-1252".to_string(),
            xml_indent: 2,
            artifact_dir: None,
        }
    }
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    pub fn fallback_encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.fallback_encoding.trim().as_bytes()).unwrap_or(UTF_8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoreConfig::default();
        assert_eq!(config.sample_rows, DEFAULT_SAMPLE_ROWS);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.fallback_encoding(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn unknown_encoding_label_falls_back_to_utf8() {
        let config = CoreConfig {
            fallback_encoding: "no-such-encoding".to_string(),
            ..CoreConfig::default()
        };
        assert_eq!(config.fallback_encoding(), UTF_8);
    }
}

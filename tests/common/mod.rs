#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a CSV file from raw lines.
    pub fn write_csv(&self, name: &str, lines: &[&str]) -> PathBuf {
        self.write(name, &(lines.join("\n") + "\n"))
    }
}

/// The Season fixture from the query-layer acceptance checks:
/// Kharif x45, Rabi x35, Whole Year x20, with a numeric Area column.
pub fn season_csv() -> String {
    let mut lines = vec!["Season,Area".to_string()];
    for i in 0..45 {
        lines.push(format!("Kharif,{}", 100 + i));
    }
    for i in 0..35 {
        lines.push(format!("Rabi,{}", 200 + i));
    }
    for i in 0..20 {
        lines.push(format!("Whole Year,{}", 300 + i));
    }
    lines.join("\n") + "\n"
}

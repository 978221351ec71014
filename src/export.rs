use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Flat record handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub url: String,
    pub service_type: String,
    pub content: String,
    pub timestamp: String,
}

impl From<(String, String, String, String)> for OutputRecord {
    fn from((url, service_type, content, timestamp): (String, String, String, String)) -> Self {
        Self {
            url,
            service_type,
            content,
            timestamp,
        }
    }
}

/// Overwrite `path` with all records as a pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[OutputRecord]) -> Result<()> {
    write_json(path, records)
}

/// Overwrite `path` with `value` as pretty-printed UTF-8 JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

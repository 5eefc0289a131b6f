//! Reading records from files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

/// Read a single JSON record.
pub fn read_record(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let record = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(record)
}

/// Stream asset records out of several files.
///
/// Each file may hold one object, one array of objects, or a sequence of
/// JSON values such as JSON Lines. Files are opened up front; parse errors
/// surface lazily as items of the stream.
pub fn asset_stream(
    paths: &[PathBuf],
) -> Result<impl Iterator<Item = std::result::Result<Value, serde_json::Error>>> {
    let mut readers = Vec::with_capacity(paths.len());
    for path in paths {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        readers.push(BufReader::new(file));
    }

    Ok(readers.into_iter().flat_map(|reader| {
        serde_json::Deserializer::from_reader(reader)
            .into_iter::<Value>()
            .flat_map(|item| match item {
                Ok(Value::Array(items)) => items.into_iter().map(Ok).collect::<Vec<_>>(),
                other => vec![other],
            })
    }))
}

//! Read/write object records as JSON.
//!
//! A record is the serialized `PfsObject`: identifiers, the spectrum, the
//! photometric inputs and, once fitted, the continuum, best-fit synthesis and
//! abundance result.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::domain::PfsObject;
use crate::error::AppError;

pub fn read_record_json(path: &Path) -> Result<PfsObject, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open record '{}': {e}", path.display()))
    })?;
    let object: PfsObject = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        AppError::new(2, format!("Invalid record JSON '{}': {e}", path.display()))
    })?;
    Ok(object)
}

pub fn write_record_json(path: &Path, object: &PfsObject) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create output dir '{}': {e}", parent.display()),
            )
        })?;
    }
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create record '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, object)
        .map_err(|e| AppError::new(2, format!("Failed to write record JSON: {e}")))?;
    Ok(())
}

/// Conventional output file name for an object: `pfsabund-{id}.json`.
pub fn record_file_name(object: &PfsObject) -> String {
    format!("pfsabund-{}.json", object.id)
}

/// `*.json` files directly inside `dir`, sorted by name.
pub fn list_records(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::new(2, format!("Failed to read directory '{}': {e}", dir.display()))
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AppError::new(2, format!("Failed to list '{}': {e}", dir.display())))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

//! Shared load -> fit -> write logic used by the `fit` and `batch` commands.
//!
//! Objects are independent, so a batch fits them in parallel; results come
//! back in input order regardless of scheduling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::domain::{FitConfig, PfsObject};
use crate::error::AppError;
use crate::fit::AbundanceFitter;
use crate::grid::SynthLibrary;
use crate::io::{list_records, read_record_json, record_file_name, write_catalog_csv, write_record_json};
use crate::mask::MaskSet;
use crate::report::BatchEntry;

/// Everything a fit needs besides the object itself.
#[derive(Debug)]
pub struct RunContext {
    pub library: SynthLibrary,
    pub masks: MaskSet,
    pub config: FitConfig,
}

/// Where fitted records and catalog rows go.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub out_dir: PathBuf,
    pub catalog: Option<PathBuf>,
}

/// A fitted object and the record file it was written to.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub object: PfsObject,
    pub record_path: PathBuf,
}

/// Fit one object and return the enriched record.
pub fn fit_object(ctx: &RunContext, mut object: PfsObject) -> Result<PfsObject, AppError> {
    AbundanceFitter::new(&ctx.library, &ctx.masks, &ctx.config)
        .measure(&mut object)
        .map_err(|e| e.context(&object.id))?;
    Ok(object)
}

/// Fit one object, write its record and append it to the catalog.
pub fn run_fit(ctx: &RunContext, object: PfsObject, output: &OutputSpec) -> Result<FitOutcome, AppError> {
    let object = fit_object(ctx, object)?;
    let record_path = write_output_record(&object, &output.out_dir)?;
    if let Some(catalog) = &output.catalog {
        write_catalog_csv(catalog, std::slice::from_ref(&object), true)?;
    }
    Ok(FitOutcome { object, record_path })
}

/// Fit every record found in `inputs` (files or directories of `*.json`).
///
/// Per-object failures are reported in the returned entries; only failures
/// that affect the whole run (no inputs, unwritable catalog) are errors.
pub fn run_batch(ctx: &RunContext, inputs: &[PathBuf], output: &OutputSpec) -> Result<Vec<BatchEntry>, AppError> {
    let paths = expand_inputs(inputs)?;
    if paths.is_empty() {
        return Err(AppError::new(2, "No record files found in the batch inputs."));
    }
    tracing::info!(objects = paths.len(), "starting batch");

    let loaded: Vec<Result<PfsObject, AppError>> = paths.par_iter().map(|p| read_record_json(p)).collect();
    let loaded = reject_duplicate_ids(loaded);

    let entries: Vec<BatchEntry> = paths
        .par_iter()
        .zip(loaded)
        .map(|(path, record)| {
            let outcome = record
                .and_then(|object| fit_object(ctx, object))
                .and_then(|object| {
                    write_output_record(&object, &output.out_dir)?;
                    Ok(object)
                });
            if let Err(e) = &outcome {
                tracing::warn!(path = %path.display(), exit_code = e.exit_code(), error = %e, "object failed");
            }
            BatchEntry {
                source: path.display().to_string(),
                outcome,
            }
        })
        .collect();

    if let Some(catalog) = &output.catalog {
        let fitted: Vec<PfsObject> = entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().ok().cloned())
            .collect();
        write_catalog_csv(catalog, &fitted, true)?;
    }
    Ok(entries)
}

fn write_output_record(object: &PfsObject, out_dir: &Path) -> Result<PathBuf, AppError> {
    let path = out_dir.join(record_file_name(object));
    write_record_json(&path, object)?;
    tracing::debug!(path = %path.display(), "wrote record");
    Ok(path)
}

/// Records sharing an object id would overwrite each other's output, so every
/// occurrence of a repeated id fails.
fn reject_duplicate_ids(loaded: Vec<Result<PfsObject, AppError>>) -> Vec<Result<PfsObject, AppError>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for object in loaded.iter().flatten() {
        *counts.entry(object.id.to_string()).or_default() += 1;
    }
    loaded
        .into_iter()
        .map(|record| {
            let object = record?;
            let id = object.id.to_string();
            match counts.get(&id) {
                Some(&n) if n > 1 => Err(AppError::new(
                    2,
                    format!("Object {id} appears in {n} batch inputs."),
                )),
                _ => Ok(object),
            }
        })
        .collect()
}

fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            out.extend(list_records(input)?);
        } else if input.is_file() {
            out.push(input.clone());
        } else {
            return Err(AppError::new(
                2,
                format!("Batch input '{}' does not exist.", input.display()),
            ));
        }
    }
    Ok(out)
}

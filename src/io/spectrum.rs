//! Spectrum tables (CSV) and their conversion into object records.
//!
//! Accepted columns (case-insensitive, BOM tolerated):
//!
//! - wavelength: `wvl`, `wavelength`, `lambda`, `wave`
//! - flux: `flux`
//! - uncertainty: `ivar`, or `err` / `error` / `sigma` (converted to `1/err^2`)
//!
//! Rows that fail to parse are skipped and reported, like the rest of the
//! pipeline's ingest.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Spectrum;
use crate::error::AppError;

const WVL_COLUMNS: &[&str] = &["wvl", "wavelength", "lambda", "wave"];
const ERR_COLUMNS: &[&str] = &["err", "error", "sigma"];
/// Row errors spelled out in the ingest warning; the rest are counted.
const LOGGED_ROW_ERRORS: usize = 3;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// First `limit` row errors joined with `; `, plus a count of the rest.
pub fn describe_row_errors(errors: &[RowError], limit: usize) -> String {
    let mut out = errors
        .iter()
        .take(limit)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if errors.len() > limit {
        out.push_str(&format!(" (+{} more)", errors.len() - limit));
    }
    out
}

#[derive(Debug, Clone)]
pub struct SpectrumTable {
    pub spectrum: Spectrum,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Copy)]
enum Uncertainty {
    Ivar(usize),
    Sigma(usize),
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    wvl: usize,
    flux: usize,
    unc: Uncertainty,
}

pub fn load_spectrum_csv(path: &Path) -> Result<SpectrumTable, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns = resolve_columns(&build_header_map(&headers))?;

    let mut rows: Vec<(f64, f64, f64)> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, columns));
        match parsed {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No valid spectrum rows in '{}'.", path.display()),
        ));
    }
    if !row_errors.is_empty() {
        tracing::warn!(
            path = %path.display(),
            skipped = row_errors.len(),
            rows = %describe_row_errors(&row_errors, LOGGED_ROW_ERRORS),
            "skipped malformed spectrum rows"
        );
    }

    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let spectrum = Spectrum {
        wvl: rows.iter().map(|r| r.0).collect(),
        flux: rows.iter().map(|r| r.1).collect(),
        ivar: rows.iter().map(|r| r.2).collect(),
    };
    spectrum.validate()?;

    Ok(SpectrumTable {
        spectrum,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn find(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn resolve_columns(header_map: &HashMap<String, usize>) -> Result<Columns, AppError> {
    let wvl = find(header_map, WVL_COLUMNS).ok_or_else(|| {
        AppError::new(
            2,
            format!("Missing wavelength column (one of {}).", WVL_COLUMNS.join(", ")),
        )
    })?;
    let flux = find(header_map, &["flux"])
        .ok_or_else(|| AppError::new(2, "Missing required column: `flux`"))?;
    let unc = match (header_map.get("ivar"), find(header_map, ERR_COLUMNS)) {
        (Some(&i), _) => Uncertainty::Ivar(i),
        (None, Some(i)) => Uncertainty::Sigma(i),
        (None, None) => {
            return Err(AppError::new(
                2,
                "Missing uncertainty column (`ivar`, `err`, `error` or `sigma`).",
            ));
        }
    };
    Ok(Columns { wvl, flux, unc })
}

fn parse_row(record: &StringRecord, columns: Columns) -> Result<(f64, f64, f64), String> {
    let field = |idx: usize, name: &str| -> Result<f64, String> {
        let raw = record
            .get(idx)
            .ok_or_else(|| format!("missing `{name}` field"))?;
        raw.parse::<f64>()
            .map_err(|_| format!("invalid `{name}` value '{raw}'"))
    };

    let wvl = field(columns.wvl, "wavelength")?;
    if !wvl.is_finite() || wvl <= 0.0 {
        return Err(format!("wavelength must be positive, got {wvl}"));
    }
    let flux = field(columns.flux, "flux")?;
    let ivar = match columns.unc {
        Uncertainty::Ivar(i) => field(i, "ivar")?,
        Uncertainty::Sigma(i) => {
            let err = field(i, "err")?;
            if err.is_finite() && err > 0.0 {
                1.0 / (err * err)
            } else {
                0.0
            }
        }
    };
    if ivar.is_nan() || ivar < 0.0 {
        return Err(format!("inverse variance must be >= 0, got {ivar}"));
    }
    Ok((wvl, flux, ivar))
}

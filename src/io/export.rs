//! Abundance catalog export (CSV, one row per fitted object).
//!
//! The catalog is meant to be easy to consume in spreadsheets or downstream
//! scripts. Missing values (unfitted objects, absent errors, elements without
//! enough pixels) are written as empty cells.

use std::fs::OpenOptions;
use std::path::Path;

use crate::domain::{Element, Measurement, PfsObject};
use crate::error::AppError;

const BASE_COLUMNS: &[&str] = &[
    "object_id",
    "cat_id",
    "tract",
    "patch",
    "obj_id",
    "teff",
    "teff_err",
    "logg",
    "logg_err",
    "vt",
    "feh",
    "feh_err",
    "alphafe",
    "alphafe_err",
    "converged",
    "iterations",
    "reduced_chi2",
];

/// Column names, including `{x}_fe` / `{x}_fe_err` for every element.
pub fn catalog_header() -> Vec<String> {
    let mut out: Vec<String> = BASE_COLUMNS.iter().map(|s| s.to_string()).collect();
    for e in Element::ALL {
        let sym = e.symbol().to_ascii_lowercase();
        out.push(format!("{sym}_fe"));
        out.push(format!("{sym}_fe_err"));
    }
    out
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.filter(|x| x.is_finite())
        .map(|x| format!("{x:.precision$}"))
        .unwrap_or_default()
}

fn measurement(m: Option<&Measurement>, precision: usize) -> [String; 2] {
    [
        opt(m.map(|m| m.value), precision),
        opt(m.and_then(|m| m.error), precision),
    ]
}

/// One catalog row for `object`.
pub fn catalog_row(object: &PfsObject) -> Vec<String> {
    let id = &object.id;
    let mut row = vec![
        id.to_string(),
        id.cat_id.to_string(),
        id.tract.to_string(),
        id.patch.clone(),
        id.obj_id.to_string(),
    ];

    let abund = object.abund.as_ref();
    row.extend(measurement(abund.map(|a| &a.teff), 1));
    row.extend(measurement(abund.map(|a| &a.logg), 3));
    row.push(opt(abund.map(|a| a.vt), 3));
    row.extend(measurement(abund.map(|a| &a.feh), 4));
    row.extend(measurement(abund.map(|a| &a.alphafe), 4));
    row.push(abund.map(|a| a.converged.to_string()).unwrap_or_default());
    row.push(abund.map(|a| a.iterations.to_string()).unwrap_or_default());
    row.push(opt(abund.map(|a| a.reduced_chi2), 4));

    for e in Element::ALL {
        let ratio = abund.and_then(|a| a.element(e));
        row.push(opt(ratio.map(|r| r.value), 4));
        row.push(opt(ratio.and_then(|r| r.error), 4));
    }
    row
}

/// Write (or append to) a catalog CSV.
///
/// When appending to a non-empty file the header is not repeated.
pub fn write_catalog_csv(path: &Path, objects: &[PfsObject], append: bool) -> Result<(), AppError> {
    let has_content = append && std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| {
            AppError::new(2, format!("Failed to open catalog '{}': {e}", path.display()))
        })?;

    let mut writer = csv::Writer::from_writer(file);
    if !has_content {
        writer
            .write_record(catalog_header())
            .map_err(|e| AppError::new(2, format!("Failed to write catalog header: {e}")))?;
    }
    for object in objects {
        writer
            .write_record(catalog_row(object))
            .map_err(|e| AppError::new(2, format!("Failed to write catalog row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush catalog: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AbundanceResult, ElementRatio, ObjectId, Photometry, Spectrum};

    fn fitted_object(obj_id: u64) -> PfsObject {
        let id = ObjectId {
            cat_id: 1,
            tract: 2,
            patch: "3,4".to_string(),
            obj_id,
            visits: vec![],
        };
        let mut obj = PfsObject::new(id, Spectrum::default(), Photometry::default());
        obj.abund = Some(AbundanceResult {
            teff: Measurement::new(4512.34, Some(40.0)),
            logg: Measurement::new(1.5, None),
            vt: 1.785,
            feh: Measurement::new(-1.5123, Some(0.02)),
            alphafe: Measurement::new(0.31, Some(0.05)),
            elements: vec![ElementRatio {
                element: Element::Ca,
                value: 0.25,
                error: Some(0.07),
                npix: 20,
            }],
            logg_fitted: false,
            converged: true,
            iterations: 4,
            chi2: 100.0,
            reduced_chi2: 1.02,
            npix_feh: 60,
            npix_alpha: 40,
        });
        obj
    }

    #[test]
    fn rows_match_header_width() {
        let obj = fitted_object(1);
        assert_eq!(catalog_row(&obj).len(), catalog_header().len());
        let unfitted = PfsObject::new(obj.id.clone(), Spectrum::default(), Photometry::default());
        let row = catalog_row(&unfitted);
        assert_eq!(row.len(), catalog_header().len());
        assert!(row[5..].iter().all(String::is_empty));
    }

    #[test]
    fn append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        write_catalog_csv(&path, &[fitted_object(1)], true).unwrap();
        write_catalog_csv(&path, &[fitted_object(2)], true).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][col("teff")], "4512.3");
        assert_eq!(&rows[0][col("logg_err")], "");
        assert_eq!(&rows[1][col("ca_fe")], "0.2500");
        assert_eq!(&rows[1][col("mg_fe")], "");
    }

    #[test]
    fn overwrite_replaces_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        write_catalog_csv(&path, &[fitted_object(1), fitted_object(2)], false).unwrap();
        write_catalog_csv(&path, &[fitted_object(3)], false).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 1);
    }
}

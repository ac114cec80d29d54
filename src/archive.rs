/*!
 * Find the products to process.
 *
 * Products are either taken from a single directory, or from the operational archive where each
 * day has its own directory, `<root>/YYYY/MM/DD/ssi`.
 */

use crate::{collocate::ProcessingMode, product::SatelliteProduct, satellite::ProductArea};
use chrono::{Datelike, NaiveDateTime};
use std::path::{Path, PathBuf};

/// A product file selected for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFile {
    pub path: PathBuf,
    /// Acquisition time from the product header.
    pub acquired: NaiveDateTime,
}

/// The archive directories covering every day from start to end, inclusive.
pub fn archive_dirs<P: AsRef<Path>>(
    root: P,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<PathBuf> {
    let root = root.as_ref();
    let last = end.date();

    let mut dirs = vec![];
    let mut day = Some(start.date());
    while let Some(d) = day.filter(|d| *d <= last) {
        dirs.push(
            root.join(format!("{:04}", d.year()))
                .join(format!("{:02}", d.month()))
                .join(format!("{:02}", d.day()))
                .join("ssi"),
        );
        day = d.succ_opt();
    }

    dirs
}

/**
 * Scan directories for the products of a processing mode.
 *
 * The file names are filtered first, then the header of every candidate is read and only
 * products acquired strictly between start and end are kept. The result is sorted by
 * acquisition time.
 *
 * # Arguments
 * * dirs - the directories to scan, missing directories are skipped.
 * * mode - decides which file names are candidates.
 * * area - the product area, required for passes.
 */
pub fn find_products(
    dirs: &[PathBuf],
    mode: ProcessingMode,
    area: Option<ProductArea>,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<ProductFile> {
    let mut products: Vec<ProductFile> = dirs
        .iter()
        .filter(|dir| {
            let exists = dir.is_dir();
            if !exists {
                log::debug!("skipping missing directory {}", dir.display());
            }
            exists
        })
        .flat_map(|dir| walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).into_iter())
        .filter_map(|res| res.ok())
        // Only regular files.
        .filter(|entry| entry.path().is_file())
        .map(|entry| {
            let fname: String = entry.file_name().to_string_lossy().to_string();
            (entry, fname)
        })
        .filter(|(_entry, fname)| mode.accepts(fname, area))
        .filter_map(|(entry, fname)| match SatelliteProduct::read_header(entry.path()) {
            Ok(header) => Some(ProductFile {
                path: entry.into_path(),
                acquired: header.acquired,
            }),
            Err(err) => {
                log::warn!("skipping {}: {}", fname, err);
                None
            }
        })
        .filter(|product| product.acquired > start && product.acquired < end)
        .collect();

    products.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.path.cmp(&b.path)));

    products
}

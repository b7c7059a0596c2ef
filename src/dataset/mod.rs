//! Dataset loading with caching and a fallback retrieval path
//!
//! The student performance dataset is a semicolon-delimited CSV. Resolution
//! order for a source string:
//!
//! 1. An existing local path is read directly.
//! 2. A cached copy under `.data/` is reused.
//! 3. The primary URL is fetched and cached.
//! 4. On fetch failure, the UCI zip archive is fetched and the CSV member
//!    extracted from it.
//!
//! When every path is exhausted the error names the manual remediation.

mod frame;

pub use frame::{CellValue, Frame};

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Primary dataset URL (plain CSV).
pub const DATA_URL: &str =
    "https://archive.ics.uci.edu/ml/machine-learning-databases/00320/student-mat.csv";

/// Fallback archive URL containing the same CSV as a member.
pub const DATA_ZIP_URL: &str =
    "https://archive.ics.uci.edu/ml/machine-learning-databases/00320/student.zip";

/// Local cache directory for downloaded datasets.
pub const CACHE_DIR: &str = ".data";

/// Name of the cached CSV file and of the archive member.
pub const DATASET_FILE: &str = "student-mat.csv";

/// Field delimiter used by the dataset.
pub const DATASET_DELIMITER: u8 = b';';

/// Regression target column.
pub const TARGET_COLUMN: &str = "G3";

/// Load the dataset from a local path or URL, with caching and fallbacks.
///
/// # Errors
///
/// Returns [`Error::Retrieval`] when the primary and fallback downloads both
/// fail, or a parse error if the file is malformed.
pub fn load_dataset(source: &str) -> Result<Frame> {
    let local = Path::new(source);
    if local.exists() {
        return Frame::from_delimited_path(local, DATASET_DELIMITER);
    }

    let cache_dir = ensure_cache_dir()?;
    let cached = cache_dir.join(DATASET_FILE);
    if cached.exists() {
        tracing::debug!(path = %cached.display(), "using cached dataset");
        return Frame::from_delimited_path(&cached, DATASET_DELIMITER);
    }

    match download_file(source, &cached) {
        Ok(()) => Frame::from_delimited_path(&cached, DATASET_DELIMITER),
        Err(primary_err) => {
            tracing::warn!(error = %primary_err, "primary dataset fetch failed, trying archive fallback");
            let zip_path = cache_dir.join("student.zip");
            download_file(DATA_ZIP_URL, &zip_path)
                .and_then(|()| extract_member(&zip_path, DATASET_FILE, &cached))
                .map_err(|fallback_err| {
                    Error::Retrieval(format!(
                        "unable to download the student performance dataset \
                         (primary: {primary_err}; fallback: {fallback_err})."
                    ))
                })?;
            Frame::from_delimited_path(&cached, DATASET_DELIMITER)
        }
    }
}

fn ensure_cache_dir() -> Result<PathBuf> {
    let dir = PathBuf::from(CACHE_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn download_file(url: &str, destination: &Path) -> Result<()> {
    tracing::info!(url, "downloading dataset");
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let bytes = response.bytes()?;
    let mut file = File::create(destination)?;
    file.write_all(&bytes)?;
    Ok(())
}

fn extract_member(zip_path: &Path, member: &str, destination: &Path) -> Result<()> {
    let archive_file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(archive_file)?;
    let mut source = archive.by_name(member)?;
    let mut target = File::create(destination)?;
    std::io::copy(&mut source, &mut target)?;
    Ok(())
}

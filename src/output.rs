//! Output layout helpers: run-date naming, idempotent directory creation and
//! atomic artifact writes.

use crate::error::Result;
use chrono::{DateTime, TimeZone};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Format a timestamp as the run date used in directory and file names (`YYYYMMDD`)
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use papercast::output::run_date_string;
///
/// let ts = Utc.with_ymd_and_hms(2024, 10, 18, 9, 30, 0).unwrap();
/// assert_eq!(run_date_string(&ts), "20241018");
/// ```
pub fn run_date_string<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%Y%m%d").to_string()
}

/// Check that a user-supplied run date is exactly eight digits
pub fn is_valid_run_date(date: &str) -> bool {
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && chrono::NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
}

/// Create a directory and its parents; an existing directory is not an error
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Turn an item identifier into a safe file stem
///
/// Path separators and other characters that are awkward in file names are
/// replaced with `_`, so identifiers can never escape the output directory.
#[must_use]
pub fn safe_file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match stem.trim_matches('.') {
        "" => "_".to_string(),
        _ => stem,
    }
}

/// Claim a file name within one output directory
///
/// Distinct identifiers can sanitize to the same name (`a:b` and `a_b` both
/// become `a_b`). The first claimant keeps `name`; later ones get a numeric
/// suffix before the extension (`a_b_2.pdf`, `a_b_3.pdf`, ...).
pub fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 2u32;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write `contents` to `path` atomically
///
/// The bytes go to a hidden temporary file in the same directory which is then
/// renamed over the final path, so readers never observe a partial artifact.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path_for(path);

    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_name = format!(".{}.{}.tmp", name, std::process::id());
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

//! Timestamped JSON snapshots on disk

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Compact ISO-8601 basic form, safe in file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

pub fn timestamp_token(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Keeps only characters that are safe in a file name
pub fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Writes `value` to a new `<dir>/<prefix>_<timestamp>.json`.
///
/// The name is claimed with `create_new`, so two writers racing on the same
/// microsecond get `_1`, `_2`, ... suffixes instead of overwriting each other.
pub async fn write_new_json<T: Serialize>(
    dir: &Path,
    prefix: &str,
    at: DateTime<Utc>,
    value: &T,
) -> io::Result<PathBuf> {
    let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::create_dir_all(dir).await?;

    let base = format!("{}_{}", prefix, timestamp_token(at));
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.json", base)
        } else {
            format!("{}_{}.json", base, attempt)
        };
        let path = dir.join(name);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(&body).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Replaces `path` through a sibling temp file and a rename
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &body).await?;
    fs::rename(&tmp, path).await
}

/// Runs `op` and retries it once on failure
pub async fn with_one_retry<T, F, Fut>(operation: &str, mut op: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(operation, error = %first, "Write failed, retrying once");
            op().await
        }
    }
}

/// Timestamp encoded in a snapshot name produced by [`write_new_json`]
pub fn parse_snapshot_timestamp(file_name: &str, prefix: &str) -> Option<DateTime<Utc>> {
    let rest = file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(".json")?;
    let token = match rest.find('Z') {
        Some(end) => &rest[..=end],
        None => rest,
    };
    NaiveDateTime::parse_from_str(token, PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Deletes `<prefix>_*.json` files in `dir` stamped before `cutoff`
pub async fn remove_snapshots_before(
    dir: &Path,
    prefix: &str,
    cutoff: DateTime<Utc>,
) -> io::Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(stamp) = name
            .to_str()
            .and_then(|n| parse_snapshot_timestamp(n, prefix))
        else {
            continue;
        };
        if stamp < cutoff {
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_round_trips_through_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = format!("alert_{}_2.json", timestamp_token(at));
        assert_eq!(name, "alert_20240309T140507.000000Z_2.json");
        assert_eq!(parse_snapshot_timestamp(&name, "alert"), Some(at));
        assert_eq!(parse_snapshot_timestamp(&name, "metrics"), None);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("my file.v2"), "my_file_v2");
        assert_eq!(sanitize(""), "unnamed");
    }

    #[tokio::test]
    async fn test_same_instant_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let at = Utc::now();
        let first = write_new_json(dir.path(), "metrics", at, &1).await.unwrap();
        let second = write_new_json(dir.path(), "metrics", at, &2).await.unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_1.json"));
    }

    #[tokio::test]
    async fn test_remove_snapshots_before_cutoff() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        write_new_json(dir.path(), "health", now - Duration::days(10), &"old")
            .await
            .unwrap();
        write_new_json(dir.path(), "health", now, &"new").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let removed = remove_snapshots_before(dir.path(), "health", now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}

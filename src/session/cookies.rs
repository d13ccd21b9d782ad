//! Cookie store persistence: a single JSON file at `.cookies.json`
//! (`{timestamp, cookies}`), written atomically (write-then-rename) and
//! read back only when still within the configured TTL.

use std::path::Path;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::types::CookieStore;

/// Load the cookie store at `path` if it exists and is fresher than `ttl`.
/// Missing file, unparsable contents, or an expired timestamp all return
/// `None` rather than an error — an absent or stale cookie jar just means
/// the session starts logged-out.
pub fn load_if_fresh(path: &Path, ttl: Duration) -> Option<CookieStore> {
    let bytes = std::fs::read(path).ok()?;
    let store: CookieStore = serde_json::from_slice(&bytes).ok()?;
    let now_ms = now_epoch_ms();
    if store.age_hours(now_ms) * 3600.0 > ttl.as_secs_f64() {
        return None;
    }
    Some(store)
}

/// Persist `cookies` to `path`, stamped with the current time. Writes to a
/// sibling temp file and renames into place so a concurrent reader never
/// observes a partial write.
pub fn save(path: &Path, cookies: Vec<serde_json::Value>) -> Result<(), ScrapeError> {
    let store = CookieStore {
        timestamp: now_epoch_ms(),
        cookies,
    };
    let bytes = serde_json::to_vec_pretty(&store)
        .map_err(|e| ScrapeError::FetchTransport(format!("cookie serialization: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &bytes)
        .map_err(|e| ScrapeError::FetchTransport(format!("cookie write: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| ScrapeError::FetchTransport(format!("cookie rename: {e}")))?;
    Ok(())
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn round_trips_fresh_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookies.json");
        save(&path, vec![serde_json::json!({"name": "session", "value": "abc"})]).unwrap();

        let loaded = load_if_fresh(&path, Duration::from_secs(3600)).unwrap();
        assert_eq!(loaded.cookies.len(), 1);
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookies.json");
        assert!(load_if_fresh(&path, Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn expired_cookies_are_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cookies.json");
        let stale = CookieStore {
            timestamp: now_epoch_ms() - 1_000 * 3600 * 48,
            cookies: vec![],
        };
        std::fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

        assert!(load_if_fresh(&path, Duration::from_secs(3600 * 24)).is_none());
    }
}

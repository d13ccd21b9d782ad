//! Shared constants.

/// Desktop Chrome UA string used both for the browser engine's own identity
/// and (impersonated) for the light fetch path's header set.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable). Chrome ships a new
/// stable roughly every 4 weeks; review this quarterly.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

use std::time::Duration;

use crate::policy::ExpirationPolicy;

/// Immutable runtime settings. Built once at process start, from `WISP_*`
/// environment variables or as a literal, and passed explicitly into the
/// components that need them. Nothing reads ambient state later.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum ciphertext size in bytes ($WISP_SIZE_LIMIT_BYTES).
    pub size_limit_bytes: usize,
    /// Maximum metadata size in bytes ($WISP_META_LIMIT_BYTES).
    pub meta_limit_bytes: usize,
    /// Maximum view count a note may be created with ($WISP_MAX_VIEWS).
    pub max_views: u32,
    /// Maximum (and default) note lifetime ($WISP_MAX_EXPIRATION, minutes).
    pub max_expiration: Duration,
    /// Length of generated note ids in characters ($WISP_ID_LENGTH).
    pub id_length: usize,
    /// When false every note is burn-after-reading: one view, default
    /// expiry, whatever the caller asked for ($WISP_ALLOW_ADVANCED).
    pub allow_advanced: bool,
    /// Create/read admissions per window per client
    /// ($WISP_RATE_LIMIT_CREATE, $WISP_RATE_LIMIT_READ).
    pub rate_limit_create: u32,
    pub rate_limit_read: u32,
    /// Rate-limit window length ($WISP_RATE_WINDOW_SECS).
    pub rate_limit_window: Duration,
    /// Deadline for a single backend call ($WISP_BACKEND_TIMEOUT_SECS).
    pub backend_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size_limit_bytes: 80 * 1024 * 1024,
            meta_limit_bytes: 4 * 1024,
            max_views: 100,
            max_expiration: Duration::from_secs(360 * 60),
            id_length: 32,
            allow_advanced: true,
            rate_limit_create: 20,
            rate_limit_read: 60,
            rate_limit_window: Duration::from_secs(60),
            backend_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Read the `WISP_*` environment, falling back to defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            size_limit_bytes: env_parse("WISP_SIZE_LIMIT_BYTES", d.size_limit_bytes),
            meta_limit_bytes: env_parse("WISP_META_LIMIT_BYTES", d.meta_limit_bytes),
            max_views: env_parse("WISP_MAX_VIEWS", d.max_views),
            max_expiration: Duration::from_secs(env_parse("WISP_MAX_EXPIRATION", 360u64) * 60),
            id_length: env_parse("WISP_ID_LENGTH", d.id_length),
            allow_advanced: std::env::var("WISP_ALLOW_ADVANCED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(d.allow_advanced),
            rate_limit_create: env_parse("WISP_RATE_LIMIT_CREATE", d.rate_limit_create),
            rate_limit_read: env_parse("WISP_RATE_LIMIT_READ", d.rate_limit_read),
            rate_limit_window: Duration::from_secs(env_parse("WISP_RATE_WINDOW_SECS", 60u64)),
            backend_timeout: Duration::from_secs(env_parse("WISP_BACKEND_TIMEOUT_SECS", 5u64)),
        }
    }

    /// The validation slice of this config.
    pub fn policy(&self) -> ExpirationPolicy {
        ExpirationPolicy {
            size_limit_bytes: self.size_limit_bytes,
            meta_limit_bytes: self.meta_limit_bytes,
            max_views: self.max_views,
            max_expiration: self.max_expiration,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

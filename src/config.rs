use core::{fmt, time::Duration};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "STRINGDEDUP_";

/// Per-pool configuration, fixed at construction
///
/// All knobs default to off: results are validated, keep-alive is disabled and the raw shared
/// byte variant is refused.
///
/// ```rust
/// use core::time::Duration;
/// use stringdedup::PoolConfig;
///
/// let config = PoolConfig::from_toml_str("keep_alive_ms = 2000").unwrap();
/// assert_eq!(config.keep_alive, Duration::from_secs(2));
/// assert!(!config.dont_validate_results);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Trust the digest on a hit and skip the byte comparison
    ///
    /// Faster, but a digest collision silently returns the wrong content.
    pub dont_validate_results: bool,

    /// Minimum time the pool itself keeps freshly interned content alive, zero disables
    #[serde(rename = "keep_alive_ms", with = "millis")]
    pub keep_alive: Duration,

    /// Acknowledges that [`Pool::intern_bytes`](crate::Pool::intern_bytes) hands out a buffer
    /// shared with every other caller
    pub allow_unsafe_bytes: bool,
}

impl PoolConfig {
    #[must_use]
    #[inline]
    pub const fn with_dont_validate_results(mut self, value: bool) -> Self {
        self.dont_validate_results = value;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_allow_unsafe_bytes(mut self, value: bool) -> Self {
        self.allow_unsafe_bytes = value;
        self
    }

    #[inline]
    pub const fn keep_alive_enabled(&self) -> bool { !self.keep_alive.is_zero() }

    /// Parses a TOML document, missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Reads `STRINGDEDUP_DONT_VALIDATE_RESULTS`, `STRINGDEDUP_KEEP_ALIVE_MS` and
    /// `STRINGDEDUP_ALLOW_UNSAFE_BYTES`
    pub fn from_env() -> Self { Self::from_env_with_prefix(ENV_PREFIX) }

    /// Same as [`from_env`](Self::from_env) with a custom variable prefix
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env_with_prefix(prefix: &str) -> Self {
        let key = |name: &str| format!("{prefix}{name}");
        let defaults = Self::default();
        Self {
            dont_validate_results: bool::parse_from_env_or(
                &key("DONT_VALIDATE_RESULTS"),
                defaults.dont_validate_results,
            ),
            keep_alive: u64::parse_from_env(&key("KEEP_ALIVE_MS"))
                .map_or(defaults.keep_alive, Duration::from_millis),
            allow_unsafe_bytes: bool::parse_from_env_or(
                &key("ALLOW_UNSAFE_BYTES"),
                defaults.allow_unsafe_bytes,
            ),
        }
    }
}

/// Typed environment variable lookup
pub trait ParseFromEnv: Sized {
    fn parse_from_env(key: &str) -> Option<Self>;

    #[inline]
    fn parse_from_env_or(key: &str, default: Self) -> Self {
        Self::parse_from_env(key).unwrap_or(default)
    }
}

impl ParseFromEnv for bool {
    fn parse_from_env(key: &str) -> Option<bool> {
        let mut val = ::std::env::var(key).ok()?;
        val.make_ascii_lowercase();
        match val.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ParseFromEnv for u64 {
    #[inline]
    fn parse_from_env(key: &str) -> Option<u64> { ::std::env::var(key).ok()?.trim().parse().ok() }
}

#[derive(Debug)]
pub enum ConfigError {
    Toml(toml::de::Error),
    /// The process-wide pool was already built, either by `init` or by first use
    GlobalAlreadyInitialized,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml(e) => write!(f, "invalid pool configuration: {e}"),
            Self::GlobalAlreadyInitialized => f.write_str("global pool is already initialized"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Toml(e) => Some(e),
            Self::GlobalAlreadyInitialized => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    #[inline]
    fn from(e: toml::de::Error) -> Self { Self::Toml(e) }
}

/// `Duration` as whole milliseconds
mod millis {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where D: Deserializer<'de> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Master process configuration (§6), sourced from the environment (and
//! overridable on the command line via [`crate::main`]'s `clap` parser).
//!
//! Kept as a single flat struct with `Duration`/typed fields rather than
//! passing raw env strings around — components take a `Config` reference at
//! construction time instead of re-reading the environment themselves.

use std::time::Duration;

/// Tunables for the queue processor, registry, and scheduler.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker liveness timeout (§3: `T_stale`).
    pub stale_timeout: Duration,
    /// Queue processor cycle period (§4.7).
    pub scheduler_cycle: Duration,
    /// Reservation TTL applied at `reserve()` time (§4.7).
    pub reservation_ttl: Duration,
    /// Default SLA multiplier `k` when a submission omits one.
    pub default_k: f64,
    /// Max tasks pulled from the queue per processor cycle (§4.7).
    pub batch_size: usize,
    /// Path to the hot-reloaded scheduling parameter file (§4.4).
    pub parameter_file: String,
    /// Timeout for a single outbound dispatch call (§6).
    pub dispatch_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Build from environment variables, falling back to the §6 defaults
    /// for anything unset or unparseable.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CLOUDAI_STALE_TIMEOUT_SECS` | 30 |
    /// | `CLOUDAI_SCHEDULER_CYCLE_SECS` | 5 |
    /// | `CLOUDAI_RESERVATION_TTL_SECS` | 300 |
    /// | `CLOUDAI_DEFAULT_K` | 2.0 |
    /// | `CLOUDAI_BATCH_SIZE` | 10 |
    /// | `CLOUDAI_PARAMETER_FILE` | `params.yaml` |
    /// | `CLOUDAI_DISPATCH_TIMEOUT_SECS` | 5 |
    pub fn from_env() -> Self {
        Config {
            stale_timeout: Duration::from_secs(env_or("CLOUDAI_STALE_TIMEOUT_SECS", 30)),
            scheduler_cycle: Duration::from_secs(env_or("CLOUDAI_SCHEDULER_CYCLE_SECS", 5)),
            reservation_ttl: Duration::from_secs(env_or("CLOUDAI_RESERVATION_TTL_SECS", 300)),
            default_k: env_or("CLOUDAI_DEFAULT_K", 2.0),
            batch_size: env_or("CLOUDAI_BATCH_SIZE", 10),
            parameter_file: env_or("CLOUDAI_PARAMETER_FILE", "params.yaml".to_string()),
            dispatch_timeout: Duration::from_secs(env_or("CLOUDAI_DISPATCH_TIMEOUT_SECS", 5)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stale_timeout: Duration::from_secs(30),
            scheduler_cycle: Duration::from_secs(5),
            reservation_ttl: Duration::from_secs(300),
            default_k: 2.0,
            batch_size: 10,
            parameter_file: "params.yaml".to_string(),
            dispatch_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.stale_timeout, Duration::from_secs(30));
        assert_eq!(c.scheduler_cycle, Duration::from_secs(5));
        assert_eq!(c.reservation_ttl, Duration::from_secs(300));
        assert_eq!(c.default_k, 2.0);
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.dispatch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_env_overrides_defaults() {
        std::env::set_var("CLOUDAI_BATCH_SIZE", "25");
        let c = Config::from_env();
        assert_eq!(c.batch_size, 25);
        std::env::remove_var("CLOUDAI_BATCH_SIZE");
    }
}

use std::num::NonZeroUsize;

use crate::network::NetworkConfig;

/// Errors raised when validating configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },
}

/// Server-level configuration for the dispatch core.
///
/// Groups the transport, admission and scheduler settings together with the
/// shared signing secret. Validated once before the listener is bound.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub admission: AdmissionConfig,
    pub scheduler: SchedulerConfig,
    /// Secret appended to the canonical command string before hashing.
    pub signing_secret: String,
}

impl ServerConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.max_body_size == 0 {
            return Err(ConfigError::NotPositive {
                name: "max_body_size",
            });
        }
        self.admission.validate()?;
        self.scheduler.validate()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            admission: AdmissionConfig::default(),
            scheduler: SchedulerConfig::default(),
            signing_secret: nado_core::signing::DEFAULT_SECRET.to_string(),
        }
    }
}

/// Sliding-window admission thresholds, keyed per caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Length of the counting window. Once a window is older than this the
    /// caller starts over.
    pub check_window_secs: u64,
    /// Step by which a saturated window is rolled forward.
    pub refresh_window_secs: u64,
    /// Requests allowed per window.
    pub allow_threshold: u32,
}

impl AdmissionConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::NotPositive` naming the first zero option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_window_secs == 0 {
            return Err(ConfigError::NotPositive {
                name: "check_window_secs",
            });
        }
        if self.refresh_window_secs == 0 {
            return Err(ConfigError::NotPositive {
                name: "refresh_window_secs",
            });
        }
        if self.allow_threshold == 0 {
            return Err(ConfigError::NotPositive {
                name: "allow_threshold",
            });
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            check_window_secs: 60,
            refresh_window_secs: 30,
            allow_threshold: 120,
        }
    }
}

/// Priority scheduler and execution pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of long-lived queue consumers.
    pub worker_count: usize,
    /// Run level-1 units on the accepting task instead of queueing them.
    /// Trades fairness under load for latency on default-priority traffic.
    pub inline_highest_priority: bool,
    /// Upper bound on threads used to run blocking units.
    pub blocking_threads: usize,
}

impl SchedulerConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::NotPositive` if a pool size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NotPositive {
                name: "worker_count",
            });
        }
        if self.blocking_threads == 0 {
            return Err(ConfigError::NotPositive {
                name: "blocking_threads",
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            inline_highest_priority: true,
            blocking_threads: 64,
        }
    }
}

/// `min(32, 2 * cores + 4)`.
#[must_use]
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    (2 * cores + 4).min(32)
}

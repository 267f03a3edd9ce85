//! Per-caller admission control.
//!
//! Callers without an identity are refused outright. Identified callers are
//! rate limited by a sliding-window counter keyed on their address. Records
//! live in a `DashMap`, so updates to one address are serialized by its shard
//! lock while different addresses proceed independently. Records whose
//! window has expired are swept at most once per check window, so the map
//! only holds addresses seen within roughly the last two windows.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use nado_core::{ClockSource, ErrorCode, SystemClock};

use super::config::{AdmissionConfig, ConfigError};

/// Why a caller was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No caller identity was presented.
    IllegalAccess,
    /// The caller's address exhausted its window allowance.
    TooManyRequests,
}

impl Denial {
    #[must_use]
    pub fn code(self) -> ErrorCode {
        match self {
            Self::IllegalAccess => ErrorCode::IllegalAccess,
            Self::TooManyRequests => ErrorCode::TooManyRequests,
        }
    }

    /// Envelope message for this denial, e.g. `[10003]too many requests`.
    #[must_use]
    pub fn message(self) -> String {
        let code = self.code();
        code.tag(code.description())
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().description())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(Denial),
}

/// Counter state for one caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRecord {
    /// Requests counted in the current window.
    pub count: u32,
    /// Start of the current window, milliseconds since the epoch. Never moves
    /// backwards.
    pub window_start: u64,
}

/// Sliding-window admission gate.
pub struct AdmissionController {
    records: DashMap<String, AdmissionRecord>,
    check_window_ms: u64,
    refresh_window_ms: u64,
    allow_threshold: u32,
    clock: Arc<dyn ClockSource>,
    /// Time of the last sweep, milliseconds since the epoch.
    last_sweep: AtomicU64,
}

impl AdmissionController {
    /// Creates a controller reading the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any threshold is zero.
    pub fn new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a controller reading `clock`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any threshold is zero.
    pub fn with_clock(
        config: AdmissionConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now();
        Ok(Self {
            last_sweep: AtomicU64::new(now),
            records: DashMap::new(),
            check_window_ms: config.check_window_secs.saturating_mul(1000),
            refresh_window_ms: config.refresh_window_secs.saturating_mul(1000),
            allow_threshold: config.allow_threshold,
            clock,
        })
    }

    /// Decides whether `identity` calling from `address` may run a unit now.
    pub fn admit(&self, identity: &str, address: &str) -> Admission {
        if identity.is_empty() {
            return Admission::Deny(Denial::IllegalAccess);
        }

        let now = self.clock.now();
        self.maybe_sweep(now);

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut record = self
            .records
            .entry(address.to_string())
            .or_insert(AdmissionRecord {
                count: 0,
                window_start: now,
            });

        if self.step(&mut record, now) {
            Admission::Allow
        } else {
            tracing::debug!(address, count = record.count, "admission denied");
            Admission::Deny(Denial::TooManyRequests)
        }
    }

    /// Snapshot of the record for `address`, if one exists.
    #[must_use]
    pub fn record(&self, address: &str) -> Option<AdmissionRecord> {
        self.records.get(address).map(|r| *r.value())
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Drops every record whose window expired before `now`, returning how
    /// many were removed. An expired record admits exactly like a missing one.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| now.saturating_sub(r.window_start) <= self.check_window_ms);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, tracked = self.records.len(), "admission records swept");
        }
        removed
    }

    // Must run before any entry guard is taken: retain locks every shard.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now.saturating_sub(last) <= self.check_window_ms {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sweep(now);
        }
    }

    fn step(&self, record: &mut AdmissionRecord, now: u64) -> bool {
        loop {
            let age = now.saturating_sub(record.window_start);
            if age > self.check_window_ms {
                record.count = 1;
                record.window_start = record.window_start.max(now);
                return true;
            }
            if record.count < self.allow_threshold {
                record.count += 1;
                return true;
            }
            if age > self.refresh_window_ms {
                record.window_start += self.refresh_window_ms;
                record.count = 0;
                continue;
            }
            return false;
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("tracked", &self.records.len())
            .field("check_window_ms", &self.check_window_ms)
            .field("refresh_window_ms", &self.refresh_window_ms)
            .field("allow_threshold", &self.allow_threshold)
            .finish_non_exhaustive()
    }
}

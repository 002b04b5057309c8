//! Runtime configuration shared by module bootstrap code.

use crate::error::{MayflyError, MayflyResult};

/// Bootstrap configuration used by `mayfly-server` during process startup.
///
/// There is no CLI or environment layer; the defaults carry the protocol's
/// fixed constants, and tests override individual fields through struct
/// update syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// TCP port of the command listener.
    pub port: u16,
    /// Idle-connection timeout in milliseconds.
    pub idle_timeout_ms: u64,
    /// Upper bound of key expirations processed per timer tick.
    pub expiry_budget_per_tick: usize,
    /// Number of destructor worker threads.
    pub destructor_workers: usize,
    /// Sorted sets larger than this are destroyed on the worker pool.
    pub large_container_len: usize,
    /// Poll event buffer capacity.
    pub max_events: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: 1234,
            idle_timeout_ms: 5_000,
            expiry_budget_per_tick: 2_000,
            destructor_workers: 4,
            large_container_len: 1_000,
            max_events: 256,
        }
    }
}

impl RuntimeConfig {
    /// Checks invariants the reactor loop relies on.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::InvalidConfig` for zero worker or budget values.
    pub fn validate(&self) -> MayflyResult<()> {
        if self.destructor_workers == 0 {
            return Err(MayflyError::InvalidConfig(
                "destructor worker count must be non-zero",
            ));
        }
        if self.expiry_budget_per_tick == 0 {
            return Err(MayflyError::InvalidConfig(
                "per-tick expiry budget must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfig;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert_that!(config.validate().is_ok(), eq(true));
        assert_that!(config.port, eq(1234_u16));
        assert_that!(config.idle_timeout_ms, eq(5_000_u64));
    }

    #[rstest]
    fn zero_workers_are_rejected() {
        let config = RuntimeConfig {
            destructor_workers: 0,
            ..RuntimeConfig::default()
        };
        assert_that!(config.validate().is_err(), eq(true));
    }

    #[rstest]
    fn zero_expiry_budget_is_rejected() {
        let config = RuntimeConfig {
            expiry_budget_per_tick: 0,
            ..RuntimeConfig::default()
        };
        assert_that!(config.validate().is_err(), eq(true));
    }
}

//! Middleware construction configuration: the logger/metrics bundle, the per-outcome
//! log-level matrix, and the metric-tag blocklist (spec.md §4.7).

use relay_core::observability::{LogSeverity, Logger, MetricsProvider};
use relay_core::{CoreServices, ResolvedLevels, TagBlocklist};
use std::sync::Arc;

/// Per-outcome level overrides for one direction. Any field left `None` falls back to
/// [`ResolvedLevels::defaults`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LevelOverrides {
    pub success: Option<LogSeverity>,
    pub application_error: Option<LogSeverity>,
    pub client_fault: Option<LogSeverity>,
    pub server_fault: Option<LogSeverity>,
    pub unknown: Option<LogSeverity>,
}

impl LevelOverrides {
    fn resolve(self, defaults: ResolvedLevels) -> ResolvedLevels {
        ResolvedLevels {
            success: self.success.unwrap_or(defaults.success),
            application_error: self.application_error.unwrap_or(defaults.application_error),
            client_fault: self.client_fault.unwrap_or(defaults.client_fault),
            server_fault: self.server_fault.unwrap_or(defaults.server_fault),
            unknown: self.unknown.unwrap_or(defaults.unknown),
        }
    }
}

/// The level matrix from spec.md §4.7: a default block plus optional per-direction
/// overrides.
#[derive(Clone, Copy, Debug, Default)]
pub struct LevelMatrix {
    pub inbound: LevelOverrides,
    pub outbound: LevelOverrides,
}

impl LevelMatrix {
    pub fn resolve_inbound(&self) -> ResolvedLevels {
        self.inbound.resolve(ResolvedLevels::defaults())
    }

    pub fn resolve_outbound(&self) -> ResolvedLevels {
        self.outbound.resolve(ResolvedLevels::defaults())
    }
}

/// Builder-style configuration for a [`crate::middleware::RelayMiddleware`] instance,
/// matching spec.md §4.7's "{logger, metric scope, context-extractor, level-matrix
/// configuration, metric-tag blocklist}".
#[derive(Clone)]
pub struct MiddlewareConfig {
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub levels: LevelMatrix,
    pub tag_blocklist: TagBlocklist,
}

impl MiddlewareConfig {
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { logger, metrics, levels: LevelMatrix::default(), tag_blocklist: TagBlocklist::new() }
    }

    pub fn with_levels(mut self, levels: LevelMatrix) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_blocklist(mut self, tag_blocklist: TagBlocklist) -> Self {
        self.tag_blocklist = tag_blocklist;
        self
    }

    pub(crate) fn core_services(&self) -> CoreServices {
        CoreServices::new(self.logger.clone(), self.metrics.clone()).with_blocklist(self.tag_blocklist.clone())
    }
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self::new(Arc::new(relay_core::observability::NoopLogger), Arc::new(relay_core::observability::NoopMetrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_overrides_fall_back_to_defaults() {
        let matrix = LevelMatrix::default();
        let resolved = matrix.resolve_inbound();
        assert_eq!(resolved.success, LogSeverity::Debug);
        assert_eq!(resolved.client_fault, LogSeverity::Error);
    }

    #[test]
    fn override_replaces_only_its_own_field() {
        let matrix = LevelMatrix {
            inbound: LevelOverrides { success: Some(LogSeverity::Info), ..Default::default() },
            outbound: LevelOverrides::default(),
        };
        let resolved = matrix.resolve_inbound();
        assert_eq!(resolved.success, LogSeverity::Info);
        assert_eq!(resolved.client_fault, LogSeverity::Error);
    }
}

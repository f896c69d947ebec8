//! Crate-wide configuration, with `from_env` overrides matching spec §6's
//! "Environment configuration" list.

use std::time::Duration;

use h3o::Resolution;

use crate::pricing::VehicleRates;

/// All tunables for the dispatch core. Construct with [`CoreConfig::default`]
/// and override individual fields, or load from the process environment with
/// [`CoreConfig::from_env`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// H3 resolution used to index driver locations. Valid range 7-10.
    pub h3_resolution: Resolution,
    /// Maximum k-ring radius the dispatcher will expand to.
    pub max_k: u32,
    /// Default nearby-driver search radius in km.
    pub nearby_radius_km: f64,
    /// Maximum age of a driver's last telemetry update before it is
    /// considered stale and excluded from dispatch.
    pub heartbeat_staleness: Duration,
    /// Period between location-flush batches.
    pub location_flush_period: Duration,
    /// Period between status-flush batches.
    pub status_flush_period: Duration,
    /// Default platform commission rate, overridable via platform config.
    pub default_commission_rate: f64,
    /// Fixed per-ride fees: (service, insurance, platform).
    pub fixed_fees: (f64, f64, f64),
    /// Per-vehicle-type fare rates.
    pub vehicle_rates: VehicleRates,
    /// Max retries for a persistent write before the item is dropped.
    pub max_persistent_retries: u32,
    /// Timeout for ordinary persistent reads.
    pub read_timeout: Duration,
    /// Timeout for the ride-completion transaction.
    pub completion_timeout: Duration,
    /// Flat penalty applied on a stop-riding toggle (spec §9 open question:
    /// preserved as configurable, no cooldown).
    pub stop_riding_penalty: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            h3_resolution: Resolution::Nine,
            max_k: 3,
            nearby_radius_km: 10.0,
            heartbeat_staleness: Duration::from_secs(5 * 60),
            location_flush_period: Duration::from_secs(2),
            status_flush_period: Duration::from_millis(500),
            default_commission_rate: 0.20,
            fixed_fees: (10.0, 2.0, 10.0),
            vehicle_rates: VehicleRates::default(),
            max_persistent_retries: 3,
            read_timeout: Duration::from_secs(5),
            completion_timeout: Duration::from_secs(15),
            stop_riding_penalty: 10.0,
        }
    }
}

impl CoreConfig {
    /// Loads overrides from the process environment, falling back to
    /// defaults (and logging a warning, never failing) on a missing or
    /// unparsable variable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u8("DISPATCH_H3_RESOLUTION") {
            match Resolution::try_from(v) {
                Ok(res) => cfg.h3_resolution = res,
                Err(_) => tracing::warn!(value = v, "invalid DISPATCH_H3_RESOLUTION, keeping default"),
            }
        }
        if let Some(v) = env_parse::<u32>("DISPATCH_MAX_K") {
            cfg.max_k = v;
        }
        if let Some(v) = env_parse::<f64>("DISPATCH_NEARBY_RADIUS_KM") {
            cfg.nearby_radius_km = v;
        }
        if let Some(v) = env_parse::<u64>("DISPATCH_HEARTBEAT_STALENESS_SECS") {
            cfg.heartbeat_staleness = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("DISPATCH_LOCATION_FLUSH_MS") {
            cfg.location_flush_period = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("DISPATCH_STATUS_FLUSH_MS") {
            cfg.status_flush_period = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<f64>("DISPATCH_DEFAULT_COMMISSION_RATE") {
            cfg.default_commission_rate = v;
        }
        if let Some(v) = env_parse::<u32>("DISPATCH_MAX_PERSISTENT_RETRIES") {
            cfg.max_persistent_retries = v;
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, raw, "failed to parse env var, keeping default");
                None
            }
        },
        Err(_) => None,
    }
}

fn env_u8(key: &str) -> Option<u8> {
    env_parse(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.h3_resolution, Resolution::Nine);
        assert_eq!(cfg.max_k, 3);
        assert_eq!(cfg.nearby_radius_km, 10.0);
        assert_eq!(cfg.default_commission_rate, 0.20);
        assert_eq!(cfg.fixed_fees, (10.0, 2.0, 10.0));
    }
}

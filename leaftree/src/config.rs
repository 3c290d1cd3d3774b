//! Compile-time protocol configuration.
//!
//! The `NodeConfig` trait collects every tunable in one place so deployments
//! can tune timing and capacity without touching protocol code. Use
//! `DefaultConfig` unless you know the radio environment well;
//! `BriskConfig` trades energy for faster reconvergence in dense,
//! churn-prone deployments.

use crate::time::Duration;

/// Configuration trait for compile-time protocol tuning.
pub trait NodeConfig {
    /// Port carrying the gossip records.
    const GOSSIP_PORT: u16;

    /// Port carrying application payload frames.
    const DATA_PORT: u16;

    /// Port carrying per-hop acknowledgements.
    const ACK_PORT: u16;

    /// Neighbor entries older than this are evicted.
    const MAX_NEIGHBOR_AGE: Duration;

    /// Base length of one controller period. Each period is jittered by
    /// uniform [0.8, 1.0] and divided by the convergence divisor.
    const PERIOD: Duration;

    /// Periods a leaf stays awake after observing any change.
    const STAY_ACTIVE_PERIODS: u8;

    /// Period divisor applied while the local state is changing, for faster
    /// convergence during churn. Decays by one each period.
    const CHANGE_PERIOD_DIVISOR: u8;

    /// A leaf whose parent entry is older than this stays awake to fetch news.
    const MAX_PARENT_AGE: Duration;

    /// Time to wait for a per-hop acknowledgement.
    const ACK_TIMEOUT: Duration;

    /// Transmission attempts before a payload is dropped.
    const MAX_TRIES: u8;

    /// Base spacing between consecutive sends (jittered by uniform [0.5, 1.0]).
    const NEXT_SEND_DELAY: Duration;

    /// Base backoff after a timeout (scaled by tries² and uniform [0, 1)).
    const FAIL_DELAY: Duration;

    /// Duplicate-detection capacity: one entry per source, FIFO eviction
    /// beyond this many sources.
    const MAX_HISTORY: usize;
}

/// Default configuration matching the reference deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NodeConfig for DefaultConfig {
    const GOSSIP_PORT: u16 = 154;
    const DATA_PORT: u16 = 181;
    const ACK_PORT: u16 = 182;
    const MAX_NEIGHBOR_AGE: Duration = Duration::from_secs(15);
    const PERIOD: Duration = Duration::from_secs(1);
    const STAY_ACTIVE_PERIODS: u8 = 3;
    const CHANGE_PERIOD_DIVISOR: u8 = 3;
    const MAX_PARENT_AGE: Duration = Duration::from_secs(5);
    const ACK_TIMEOUT: Duration = Duration::from_millis(200);
    const MAX_TRIES: u8 = 5;
    const NEXT_SEND_DELAY: Duration = Duration::from_millis(10);
    const FAIL_DELAY: Duration = Duration::from_millis(100);
    const MAX_HISTORY: usize = 30;
}

/// Faster-converging configuration for dense deployments.
///
/// Shorter periods and ages mean more radio traffic and less sleep; use
/// where mains power or frequent topology changes justify it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BriskConfig;

impl NodeConfig for BriskConfig {
    const GOSSIP_PORT: u16 = 154;
    const DATA_PORT: u16 = 181;
    const ACK_PORT: u16 = 182;
    const MAX_NEIGHBOR_AGE: Duration = Duration::from_secs(6);
    const PERIOD: Duration = Duration::from_millis(500);
    const STAY_ACTIVE_PERIODS: u8 = 2;
    const CHANGE_PERIOD_DIVISOR: u8 = 3;
    const MAX_PARENT_AGE: Duration = Duration::from_secs(2);
    const ACK_TIMEOUT: Duration = Duration::from_millis(150);
    const MAX_TRIES: u8 = 4;
    const NEXT_SEND_DELAY: Duration = Duration::from_millis(10);
    const FAIL_DELAY: Duration = Duration::from_millis(50);
    const MAX_HISTORY: usize = 30;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(DefaultConfig::GOSSIP_PORT, 154);
        assert_eq!(DefaultConfig::DATA_PORT, 181);
        assert_eq!(DefaultConfig::ACK_PORT, 182);
        assert_eq!(DefaultConfig::MAX_NEIGHBOR_AGE.as_secs(), 15);
        assert_eq!(DefaultConfig::PERIOD.as_millis(), 1000);
        assert_eq!(DefaultConfig::STAY_ACTIVE_PERIODS, 3);
        assert_eq!(DefaultConfig::MAX_PARENT_AGE.as_secs(), 5);
        assert_eq!(DefaultConfig::ACK_TIMEOUT.as_millis(), 200);
        assert_eq!(DefaultConfig::MAX_TRIES, 5);
        assert_eq!(DefaultConfig::NEXT_SEND_DELAY.as_millis(), 10);
        assert_eq!(DefaultConfig::FAIL_DELAY.as_millis(), 100);
        assert_eq!(DefaultConfig::MAX_HISTORY, 30);
    }

    #[test]
    fn test_ports_are_distinct() {
        let ports = [
            DefaultConfig::GOSSIP_PORT,
            DefaultConfig::DATA_PORT,
            DefaultConfig::ACK_PORT,
        ];
        assert_ne!(ports[0], ports[1]);
        assert_ne!(ports[1], ports[2]);
        assert_ne!(ports[0], ports[2]);
    }

    #[test]
    fn test_brisk_config_converges_faster() {
        assert!(BriskConfig::PERIOD < DefaultConfig::PERIOD);
        assert!(BriskConfig::MAX_NEIGHBOR_AGE < DefaultConfig::MAX_NEIGHBOR_AGE);
        assert!(BriskConfig::MAX_PARENT_AGE < DefaultConfig::MAX_PARENT_AGE);
    }
}

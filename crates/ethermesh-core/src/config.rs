//! Node configuration

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Timing cadences and trust defaults for a node.
///
/// All intervals are in milliseconds of the host-supplied wall clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Ping/keepalive pass cadence
    pub ping_check_interval: u64,

    /// Housekeeping (expired-state cleanup) cadence
    pub housekeeping_period: u64,

    /// Minimum background-task deadline granted to the host
    pub timer_task_granularity: u64,

    /// Ping intervals of trust-anchor silence per desperation level
    pub desperation_increment: u64,

    /// Age at which a joined network re-requests its configuration
    pub network_autoconf_delay: u64,

    /// Recency window for an ordinary peer to count as alive
    pub peer_activity_timeout: u64,

    /// Age at which housekeeping drops a silent ordinary peer
    pub peer_expiration: u64,

    /// Age at which housekeeping drops an unrenewed multicast subscription
    pub multicast_expiration: u64,

    /// Lifetime of outbound frames parked while awaiting a peer
    pub pending_frame_timeout: u64,

    /// Root topology used when nothing authenticated is persisted
    pub default_root_topology: String,

    /// Verifying key for persisted root-topology documents
    pub root_topology_authority: [u8; 32],
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ping_check_interval: crate::PING_CHECK_INTERVAL_MS,
            housekeeping_period: crate::HOUSEKEEPING_PERIOD_MS,
            timer_task_granularity: crate::TIMER_TASK_GRANULARITY_MS,
            desperation_increment: crate::DESPERATION_INCREMENT,
            network_autoconf_delay: crate::NETWORK_AUTOCONF_DELAY_MS,
            peer_activity_timeout: crate::PEER_ACTIVITY_TIMEOUT_MS,
            peer_expiration: crate::PEER_EXPIRATION_MS,
            multicast_expiration: crate::MULTICAST_SUBSCRIPTION_EXPIRE_MS,
            pending_frame_timeout: crate::PENDING_FRAME_TIMEOUT_MS,
            default_root_topology: defaults::DEFAULT_ROOT_TOPOLOGY.to_string(),
            root_topology_authority: defaults::ROOT_TOPOLOGY_AUTHORITY,
        }
    }
}

impl NodeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ping_check_interval == 0 {
            return Err("ping check interval must be nonzero".into());
        }
        if self.timer_task_granularity == 0 {
            return Err("timer task granularity must be nonzero".into());
        }
        if self.timer_task_granularity > self.ping_check_interval {
            return Err(format!(
                "timer task granularity {} exceeds ping check interval {}",
                self.timer_task_granularity, self.ping_check_interval
            ));
        }
        if self.desperation_increment == 0 {
            return Err("desperation increment must be nonzero".into());
        }
        if self.housekeeping_period == 0 {
            return Err("housekeeping period must be nonzero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_granularity_must_not_exceed_ping_interval() {
        let config = NodeConfig {
            timer_task_granularity: 20_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        for field in 0..3 {
            let mut config = NodeConfig::default();
            match field {
                0 => config.ping_check_interval = 0,
                1 => config.timer_task_granularity = 0,
                _ => config.desperation_increment = 0,
            }
            assert!(config.validate().is_err());
        }
    }
}

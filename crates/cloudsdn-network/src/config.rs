//! Simulation configuration.

use serde::{Deserialize, Serialize};

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawSimulationConfig {
    pub scheduling_interval: Option<f64>,
    pub switching_delay: Option<f64>,
    pub host_bandwidth: Option<f64>,
    pub switch_bandwidth: Option<f64>,
    pub state_history_enabled: Option<bool>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Scheduling interval in seconds: the tick granularity used to batch
    /// packet transmissions and to sample the state history.
    pub scheduling_interval: f64,
    /// Delay in seconds between receiving a packet and transmitting the
    /// buffered packets.
    pub switching_delay: f64,
    /// Default host NIC bandwidth in Mb/s.
    pub host_bandwidth: f64,
    /// Default switch downlink bandwidth in Mb/s.
    pub switch_bandwidth: f64,
    /// Whether switches collect per-interval state history.
    pub state_history_enabled: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}

impl SimulationConfig {
    fn from_raw(raw: RawSimulationConfig) -> Self {
        Self {
            scheduling_interval: raw.scheduling_interval.unwrap_or(0.1),
            switching_delay: raw.switching_delay.unwrap_or(0.),
            host_bandwidth: raw.host_bandwidth.unwrap_or(1000.),
            switch_bandwidth: raw.switch_bandwidth.unwrap_or(1000.),
            state_history_enabled: raw.state_history_enabled.unwrap_or(false),
        }
    }

    /// Creates simulation config by parsing parameter values from YAML string
    /// (uses default values if some parameters are absent).
    pub fn from_str(content: &str) -> Self {
        let raw: RawSimulationConfig =
            serde_yaml::from_str(content).unwrap_or_else(|_| panic!("Can't parse YAML from config string"));
        Self::from_raw(raw)
    }

    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let content =
            std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        let raw: RawSimulationConfig = serde_yaml::from_str(&content)
            .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_parameters_fall_back_to_defaults() {
        let config = SimulationConfig::from_str("scheduling_interval: 0.5\nstate_history_enabled: true\n");
        assert_eq!(config.scheduling_interval, 0.5);
        assert!(config.state_history_enabled);
        assert_eq!(config.host_bandwidth, 1000.);
        assert_eq!(config.switching_delay, 0.);
    }
}

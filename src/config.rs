//! Engine configuration
//!
//! Every field has a default, so a configuration file only needs the values
//! it changes:
//!
//! ```rust
//! use mocap_live::EngineConfig;
//!
//! let config = EngineConfig::from_yaml_str("port: 15000\nplayback_rate_divisor: 1\n").unwrap();
//! assert_eq!(config.port, 15000);
//! assert_eq!(config.buffer_pulse_interval, 15);
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::types::DataSetDescriptor;
use crate::{Result, StreamError};

/// Default UDP port of the capture stream
pub const DEFAULT_PORT: u16 = 14043;

/// Tunables for connection, buffering and playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the live data-set
    pub name: String,
    pub bind_address: IpAddr,
    pub port: u16,
    /// Receive timeout while buffering
    pub read_timeout_ms: u64,
    /// Receive timeout while idle, also used for the connect probe
    pub idle_read_timeout_ms: u64,
    /// While reception is disabled, decode one datagram in this many
    pub idle_probe_interval: u32,
    /// Emit a buffer pulse every this many appended frames
    pub buffer_pulse_interval: u32,
    /// Dispatch on every Nth receiver iteration (1 = full rate)
    pub playback_rate_divisor: u32,
    /// Base pacing of playback without a connection; multiplied by the divisor
    pub no_connection_frame_ms: u64,
    pub max_datagram_size: usize,
    /// Decompression limit for a single datagram
    pub max_decoded_size: usize,
    /// Broadcast capacity for notifications
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "live".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            read_timeout_ms: 1000,
            idle_read_timeout_ms: 250,
            idle_probe_interval: 60,
            buffer_pulse_interval: 15,
            playback_rate_divisor: 2,
            no_connection_frame_ms: 16,
            max_datagram_size: 65536,
            max_decoded_size: crate::codec::DEFAULT_MAX_DECODED_SIZE,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StreamError::config_error(format!("YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| StreamError::config_error(format!("YAML: {e}")))
    }

    /// Reject values that would stall or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 8] = [
            ("read_timeout_ms", self.read_timeout_ms > 0),
            ("idle_read_timeout_ms", self.idle_read_timeout_ms > 0),
            ("idle_probe_interval", self.idle_probe_interval > 0),
            ("buffer_pulse_interval", self.buffer_pulse_interval > 0),
            ("playback_rate_divisor", self.playback_rate_divisor > 0),
            ("no_connection_frame_ms", self.no_connection_frame_ms > 0),
            ("max_datagram_size", self.max_datagram_size > 0),
            ("max_decoded_size", self.max_decoded_size > 0),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(StreamError::config_error(format!("{field} must be non-zero"))),
            None => Ok(()),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Descriptor of the live data-set this configuration connects to
    pub fn live_descriptor(&self) -> DataSetDescriptor {
        DataSetDescriptor::Live {
            name: self.name.clone(),
            address: self.bind_address,
            port: self.port,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn idle_read_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_read_timeout_ms)
    }

    pub fn no_connection_frame(&self) -> Duration {
        Duration::from_millis(self.no_connection_frame_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.playback_rate_divisor, 2);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let config = EngineConfig::from_yaml_str(
            "name: stage\nbind_address: 127.0.0.1\nidle_probe_interval: 30\n",
        )?;
        assert_eq!(config.name, "stage");
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.idle_probe_interval, 30);
        assert_eq!(config.read_timeout_ms, 1000);
        Ok(())
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let err = EngineConfig::from_yaml_str("playback_rate_divisor: 0").unwrap_err();
        assert!(err.to_string().contains("playback_rate_divisor"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_yaml_str("port: [not, a, port]"),
            Err(StreamError::Config { .. })
        ));
    }

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let config = EngineConfig { port: 15001, ..EngineConfig::default() };
        let yaml = config.to_yaml_string()?;
        assert_eq!(EngineConfig::from_yaml_str(&yaml)?, config);
        Ok(())
    }

    #[test]
    fn load_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "port: 15002\n")?;
        assert_eq!(EngineConfig::load(&path)?.port, 15002);
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.yaml")),
            Err(StreamError::File { .. })
        ));
        Ok(())
    }

    #[test]
    fn live_descriptor_tracks_port() {
        let a = EngineConfig::default().live_descriptor().id();
        let b = EngineConfig { port: 15000, ..EngineConfig::default() }.live_descriptor().id();
        assert_ne!(a, b);
    }
}

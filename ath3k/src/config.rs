//! Per-device upload settings and the registration table
//!
//! A registration table is a list of personalities: device ids plus the
//! settings the loader needs for that device. Tables are TOML:
//!
//! ```toml
//! [[device]]
//! name = "Atheros AR3011"
//! vendor_id = 0x0cf3
//! product_id = 0x3000
//! pipe_index = 2
//! check_endpoints = [{ number = 2, direction = "out" }]
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, usb::Direction};

/// Upper bound for [UploadConfig::handshake_attempts]
pub const MAX_HANDSHAKE_ATTEMPTS: u8 = 5;

const BUILTIN_PERSONALITIES: &str = include_str!("../personalities.toml");

/// What to do with a matched controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Upload the firmware and let the controller re-enumerate
    Load,
    /// Keep the controller open and unprogrammed
    Mask,
}

impl Default for Policy {
    fn default() -> Self {
        if cfg!(feature = "mask") {
            Policy::Mask
        } else {
            Policy::Load
        }
    }
}

/// Length advertised for each bulk write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteLength {
    /// Whole transfer buffer, even for a short last block
    #[default]
    Buffer,
    /// Actual block length
    Chunk,
}

/// Endpoint to verify before the upload starts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCheck {
    pub number: u8,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Position of the bulk OUT pipe in the interface's endpoint list
    pub pipe_index: Option<u8>,
    pub check_endpoints: Vec<EndpointCheck>,
    pub handshake_attempts: u8,
    pub write_length: WriteLength,
    pub policy: Policy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            pipe_index: None,
            check_endpoints: Vec::new(),
            handshake_attempts: 1,
            write_length: WriteLength::default(),
            policy: Policy::default(),
        }
    }
}

impl UploadConfig {
    /// Handshake attempts, clamped to `1..=MAX_HANDSHAKE_ATTEMPTS`
    pub fn attempts(&self) -> u8 {
        self.handshake_attempts.clamp(1, MAX_HANDSHAKE_ATTEMPTS)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(flatten)]
    pub upload: UploadConfig,
}

impl Personality {
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vendor_id == vid && self.product_id == pid
    }
}

/// Registration table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default, rename = "device")]
    devices: Vec<Personality>,
}

impl Registry {
    /// Table shipped with the crate
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(BUILTIN_PERSONALITIES)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let registry: Registry = toml::from_str(s)?;
        for p in &registry.devices {
            if p.upload.handshake_attempts != p.upload.attempts() {
                log::warn!(
                    "{}: handshake_attempts {} out of range, using {}",
                    p.name,
                    p.upload.handshake_attempts,
                    p.upload.attempts()
                );
            }
        }
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading personalities from {}", path.display());
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// First personality registered for `vid:pid`
    pub fn lookup(&self, vid: u16, pid: u16) -> Option<&Personality> {
        self.devices.iter().find(|p| p.matches(vid, pid))
    }

    pub fn personalities(&self) -> &[Personality] {
        &self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let registry = Registry::builtin().unwrap();
        assert!(!registry.is_empty());
        let ar3011 = registry.lookup(0x0cf3, 0x3000).unwrap();
        assert_eq!(ar3011.upload.pipe_index, Some(2));
        assert_eq!(ar3011.upload.write_length, WriteLength::Buffer);
        assert_eq!(ar3011.upload.attempts(), 1);
        assert!(registry.lookup(0x1234, 0x5678).is_none());
    }

    #[test]
    fn test_parse_table() {
        let registry = Registry::from_toml(
            r#"
            [[device]]
            name = "test"
            vendor_id = 0x0cf3
            product_id = 0x3000
            pipe_index = 2
            handshake_attempts = 9
            write_length = "chunk"
            policy = "mask"
            check_endpoints = [
                { number = 2, direction = "out" },
                { number = 1, direction = "in" },
            ]
            "#,
        )
        .unwrap();
        let p = &registry.personalities()[0];
        assert_eq!(p.upload.attempts(), MAX_HANDSHAKE_ATTEMPTS);
        assert_eq!(p.upload.write_length, WriteLength::Chunk);
        assert_eq!(p.upload.policy, Policy::Mask);
        assert_eq!(
            p.upload.check_endpoints,
            vec![
                EndpointCheck {
                    number: 2,
                    direction: Direction::Out
                },
                EndpointCheck {
                    number: 1,
                    direction: Direction::In
                },
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let registry = Registry::from_toml(
            r#"
            [[device]]
            name = "bare"
            vendor_id = 1
            product_id = 2
            "#,
        )
        .unwrap();
        let p = registry.lookup(1, 2).unwrap();
        assert_eq!(p.upload.pipe_index, None);
        assert!(p.upload.check_endpoints.is_empty());
        assert_eq!(p.upload.policy, Policy::default());
    }

    #[test]
    fn test_zero_attempts() {
        let cfg = UploadConfig {
            handshake_attempts: 0,
            ..Default::default()
        };
        assert_eq!(cfg.attempts(), 1);
    }

    #[test]
    fn test_invalid_table() {
        assert!(matches!(
            Registry::from_toml("[[device]]\nname = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}

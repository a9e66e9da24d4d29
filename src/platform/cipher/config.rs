//! Resolution engine configuration

use crate::error::CipherError;
use crate::Result;
use std::time::Duration;

/// Cache lifetimes, execution deadline and sandbox entry points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherConfig {
    /// Raw script cache lifetime
    pub script_ttl: Duration,
    /// Parsed transform cache lifetime
    pub transform_ttl: Duration,
    /// Resolved signature cache lifetime
    pub signature_ttl: Duration,
    /// Decoded throttle value cache lifetime
    pub throttle_ttl: Duration,
    /// Background sweep period, shorter than every TTL
    pub sweep_interval: Duration,
    /// Hard deadline for one sandboxed execution
    pub execution_timeout: Duration,
    /// Function name the synthesized program exposes
    pub signature_entry_point: String,
    /// Throttle function name called in the full script
    pub throttle_entry_point: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            script_ttl: Duration::from_secs(10 * 60),
            transform_ttl: Duration::from_secs(60 * 60),
            signature_ttl: Duration::from_secs(60 * 60),
            throttle_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            execution_timeout: Duration::from_secs(30),
            signature_entry_point: "decipher".to_string(),
            throttle_entry_point: "ncode".to_string(),
        }
    }
}

impl CipherConfig {
    pub fn with_script_ttl(mut self, ttl: Duration) -> Self {
        self.script_ttl = ttl;
        self
    }

    pub fn with_transform_ttl(mut self, ttl: Duration) -> Self {
        self.transform_ttl = ttl;
        self
    }

    pub fn with_signature_ttl(mut self, ttl: Duration) -> Self {
        self.signature_ttl = ttl;
        self
    }

    pub fn with_throttle_ttl(mut self, ttl: Duration) -> Self {
        self.throttle_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_signature_entry_point(mut self, name: impl Into<String>) -> Self {
        self.signature_entry_point = name.into();
        self
    }

    pub fn with_throttle_entry_point(mut self, name: impl Into<String>) -> Self {
        self.throttle_entry_point = name.into();
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("script_ttl", self.script_ttl),
            ("transform_ttl", self.transform_ttl),
            ("signature_ttl", self.signature_ttl),
            ("throttle_ttl", self.throttle_ttl),
        ];

        for (name, ttl) in ttls {
            if ttl.is_zero() {
                return Err(CipherError::InvalidConfig(format!("{} must be non-zero", name)));
            }
            if self.sweep_interval >= ttl {
                return Err(CipherError::InvalidConfig(format!(
                    "sweep_interval {:?} must be shorter than {} {:?}",
                    self.sweep_interval, name, ttl
                )));
            }
        }

        if self.sweep_interval.is_zero() {
            return Err(CipherError::InvalidConfig(
                "sweep_interval must be non-zero".into(),
            ));
        }
        if self.execution_timeout.is_zero() {
            return Err(CipherError::InvalidConfig(
                "execution_timeout must be non-zero".into(),
            ));
        }

        for (name, value) in [
            ("signature_entry_point", &self.signature_entry_point),
            ("throttle_entry_point", &self.throttle_entry_point),
        ] {
            if !is_identifier(value) {
                return Err(CipherError::InvalidConfig(format!(
                    "{} {:?} is not a valid identifier",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CipherConfig::default();
        assert_eq!(config.script_ttl, Duration::from_secs(600));
        assert_eq!(config.signature_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.signature_entry_point, "decipher");
        assert_eq!(config.throttle_entry_point, "ncode");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sweep_interval_must_be_shorter_than_ttls() {
        let config = CipherConfig::default().with_sweep_interval(Duration::from_secs(600));
        assert!(matches!(
            config.validate(),
            Err(CipherError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(CipherConfig::default()
            .with_throttle_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(CipherConfig::default()
            .with_execution_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_bad_entry_points() {
        assert!(CipherConfig::default()
            .with_throttle_entry_point("")
            .validate()
            .is_err());
        assert!(CipherConfig::default()
            .with_signature_entry_point("alert(1)")
            .validate()
            .is_err());
        assert!(CipherConfig::default()
            .with_signature_entry_point("$dec_1")
            .validate()
            .is_ok());
    }
}

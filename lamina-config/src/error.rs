//! Loader errors

use lamina_core::config::ConfigurationError;

/// Configuration loading errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// TOML syntax error or a value of the wrong type
    Toml,
    /// Snapshot could not be decoded
    Deserialize,
    /// Snapshot could not be encoded
    Serialize,
    /// Version differs from the one this firmware reads
    VersionMismatch { found: u8, expected: u8 },
    /// Configuration rejected by validation
    Invalid(ConfigurationError),
}

impl From<ConfigurationError> for ConfigError {
    fn from(err: ConfigurationError) -> Self {
        ConfigError::Invalid(err)
    }
}

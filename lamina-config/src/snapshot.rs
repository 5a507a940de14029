//! Binary configuration snapshot
//!
//! A validated printer configuration and exposure profile, stored with
//! postcard behind a leading version byte. The version is read before the
//! body, so a snapshot written by another firmware version is rejected
//! with [`ConfigError::VersionMismatch`] rather than a decode error.

use alloc::vec::Vec;

use lamina_core::config::{PrinterConfig, CONFIG_VERSION};
use lamina_core::exposure::ExposureProfile;

use crate::error::ConfigError;
use crate::validate::{validate_exposure_profile, validate_printer_config};

/// Encode a snapshot
pub fn encode_snapshot(
    printer: &PrinterConfig,
    exposure: &ExposureProfile,
) -> Result<Vec<u8>, ConfigError> {
    postcard::to_allocvec(&(CONFIG_VERSION, printer, exposure)).map_err(|_| ConfigError::Serialize)
}

/// Decode and validate a snapshot
pub fn decode_snapshot(bytes: &[u8]) -> Result<(PrinterConfig, ExposureProfile), ConfigError> {
    let (version, body) =
        postcard::take_from_bytes::<u8>(bytes).map_err(|_| ConfigError::Deserialize)?;
    if version != CONFIG_VERSION {
        warn!(
            "Snapshot version mismatch: found {}, expected {}",
            version,
            CONFIG_VERSION
        );
        return Err(ConfigError::VersionMismatch {
            found: version,
            expected: CONFIG_VERSION,
        });
    }

    let (printer, exposure): (PrinterConfig, ExposureProfile) =
        postcard::from_bytes(body).map_err(|_| ConfigError::Deserialize)?;
    if printer.version != CONFIG_VERSION {
        return Err(ConfigError::VersionMismatch {
            found: printer.version,
            expected: CONFIG_VERSION,
        });
    }

    validate_printer_config(&printer)?;
    validate_exposure_profile(&exposure, &printer)?;

    debug!("Read {} byte configuration snapshot", bytes.len());
    Ok((printer, exposure))
}

//! Persisted settings format
//!
//! The register is stored as a postcard-serialized envelope with a magic
//! number, a format version and a CRC32 over the serialized record, so a
//! torn or foreign record is rejected at boot instead of being loaded.

use serde::{Deserialize, Serialize};

use super::record::SettingsRecord;

/// Magic number to identify a settings record ("SWVX")
pub const SETTINGS_MAGIC: u32 = 0x5357_5658;

/// Current settings format version
pub const SETTINGS_VERSION: u8 = 1;

/// Upper bound of the serialized envelope
pub const MAX_PERSISTED_LEN: usize = 48;

/// Upper bound of the serialized record alone
const MAX_RECORD_LEN: usize = 32;

/// Settings encoding and validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Magic number does not match
    BadMagic,
    /// Format version mismatch
    VersionMismatch,
    /// CRC check failed
    CrcMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSettings {
    magic: u32,
    version: u8,
    record: SettingsRecord,
    crc: u32,
}

/// Encode `record` into `buffer`
///
/// Returns the used prefix of `buffer`.
pub fn encode<'a>(
    record: &SettingsRecord,
    buffer: &'a mut [u8],
) -> Result<&'a mut [u8], SettingsError> {
    let envelope = PersistedSettings {
        magic: SETTINGS_MAGIC,
        version: SETTINGS_VERSION,
        record: *record,
        crc: record_crc(record)?,
    };
    postcard::to_slice(&envelope, buffer).map_err(|_| SettingsError::Serialize)
}

/// Decode and validate a persisted record
pub fn decode(bytes: &[u8]) -> Result<SettingsRecord, SettingsError> {
    let envelope: PersistedSettings =
        postcard::from_bytes(bytes).map_err(|_| SettingsError::Deserialize)?;

    if envelope.magic != SETTINGS_MAGIC {
        return Err(SettingsError::BadMagic);
    }
    if envelope.version != SETTINGS_VERSION {
        return Err(SettingsError::VersionMismatch);
    }
    if envelope.crc != record_crc(&envelope.record)? {
        return Err(SettingsError::CrcMismatch);
    }

    Ok(envelope.record)
}

/// CRC32 of the serialized record
fn record_crc(record: &SettingsRecord) -> Result<u32, SettingsError> {
    let mut buffer = [0u8; MAX_RECORD_LEN];
    let bytes = postcard::to_slice(record, &mut buffer).map_err(|_| SettingsError::Serialize)?;
    Ok(crc32(bytes))
}

/// Reflected CRC32 polynomial (IEEE 802.3)
const CRC32_POLY: u32 = 0xEDB8_8320;

/// Bitwise CRC32 with the standard all-ones preset and final inversion
fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |crc, &byte| {
        (0..8).fold(crc ^ u32::from(byte), |c, _| {
            (c >> 1) ^ (CRC32_POLY & (c & 1).wrapping_neg())
        })
    })
}

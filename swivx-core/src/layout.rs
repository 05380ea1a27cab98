//! Flash layout of the log and settings records
//!
//! The log is a logical byte space of `pages * BYTES_PER_PAGE` bytes.
//! Page `i` lives in its own backend record under
//! `LOG_FILE_ID` / `LOG_BASE_KEY + i`; the settings register has a
//! single record of its own.

use swivx_hal::RecordKey;

/// Raw sample bytes per log packet
pub const PACKET_SAMPLES: usize = 14;

/// Timestamp bytes appended to each packet
pub const TIMESTAMP_LEN: usize = 4;

/// Size of a complete log packet
pub const PACKET_SIZE: usize = PACKET_SAMPLES + TIMESTAMP_LEN;

/// Bytes of log data per flash page (1008 words)
pub const BYTES_PER_PAGE: usize = 4032;

/// Packets that fit in one page
pub const PACKETS_PER_PAGE: usize = BYTES_PER_PAGE / PACKET_SIZE;

/// Default number of flash pages reserved for the log
pub const DEFAULT_PAGES_PER_LOG: u8 = 21;

/// Largest log the key space allows
pub const MAX_PAGES_PER_LOG: u8 = 64;

/// Value of an erased flash byte
pub const ERASED_BYTE: u8 = 0xFF;

/// File holding the log pages
pub const LOG_FILE_ID: u16 = 0x1112;

/// Key of log page 0
pub const LOG_BASE_KEY: u16 = 0x0001;

/// File holding the settings register
pub const SETTINGS_FILE_ID: u16 = 0x1111;

/// Key of the settings register
pub const SETTINGS_KEY: u16 = 0x2222;

// Packets must tile a page exactly, or a packet would straddle two records
const _: () = assert!(BYTES_PER_PAGE % PACKET_SIZE == 0);

/// Record key of the settings register
pub const fn settings_key() -> RecordKey {
    RecordKey::new(SETTINGS_FILE_ID, SETTINGS_KEY)
}

/// Record key of log page `page`
pub const fn page_key(page: u8) -> RecordKey {
    RecordKey::new(LOG_FILE_ID, LOG_BASE_KEY + page as u16)
}

/// Log page index encoded in `key`, if it is a log page key
pub fn page_of(key: RecordKey, pages: u8) -> Option<u8> {
    if key.file_id != LOG_FILE_ID || key.key < LOG_BASE_KEY {
        return None;
    }
    let page = key.key - LOG_BASE_KEY;
    if page < pages as u16 {
        Some(page as u8)
    } else {
        None
    }
}

/// Total log capacity in bytes for `pages` pages
pub const fn capacity(pages: u8) -> u32 {
    pages as u32 * BYTES_PER_PAGE as u32
}

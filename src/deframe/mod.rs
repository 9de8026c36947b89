//! Container deframers
//!
//! Three receiver container formats can carry Galileo C/NAV pages:
//! Septentrio SBF blocks, BINEX records and Novatel ASCII logs. Each
//! deframer scans its byte stream, skips anything that is not a valid
//! C/NAV record (framing defects are recoverable: advance and resync)
//! and yields normalized [`CnavPage`](crate::has::CnavPage)s of exactly
//! 462 bits with receiver timing attached.

pub mod binex;
pub mod nov;
pub mod sbf;

use crate::has::CnavPage;
use crate::source::StreamError;

/// Lazily yields C/NAV pages from a container stream
pub trait Deframer {
    /// Advance past exactly one container record. `Ok(Some)` when it
    /// held a C/NAV page, `Ok(None)` when the record was skipped.
    /// Stream-level conditions (EOF, starvation) end the scan.
    fn next_record(&mut self) -> Result<Option<CnavPage>, StreamError>;

    /// Raw container bytes consumed since the last call. Only collected
    /// when the deframer was built with forwarding enabled.
    fn take_raw(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// PPP-Wiz format tag for this container's raw bytes
    fn raw_format(&self) -> u32 {
        0
    }
}

/// Approximate GPS→Unix time conversion. Leap seconds are deliberately
/// ignored; the result stamps PPP-Wiz lines, not measurements.
pub fn gpst_to_unix(week: u16, tow: f64) -> i64 {
    315_964_800 + i64::from(week) * 604_800 + tow as i64
}

/// Locate a byte pattern in a buffer
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

//! Novatel ASCII deframing (GALCNAVRAWPAGEA logs)
//!
//! Each record is one text line `#HEADER;DATA*CRC`: a 10-field comma
//! separated header, 4 or 5 data fields (receiver firmware 17022 added
//! a page ID field) and a CRC-32 over everything between the `#` and
//! the `*`. The last data field is 116 hex digits: 464 bits, of which
//! the final two pad the 462-bit C/NAV page.
//!
//! The C/NAV page CRC was already checked by the receiver; only pages
//! that passed are logged at all.
//!
//! Ref: Novatel OEM7 Commands and Logs Reference, GALCNAVRAWPAGE

use log::debug;

use crate::crc::crc32_novatel;
use crate::has::{CnavPage, CNAV_BYTES};
use crate::source::{ByteSource, StreamError};

use super::Deframer;

const LOG_NAME: &str = "#GALCNAVRAWPAGEA";

/// Firmware versions from here on log the extra page ID field
const PAGEID_SW_VERSION: u32 = 17022;

pub struct NovDeframer {
    src: ByteSource,
    buf: Vec<u8>,
    eof: bool,
    line_no: u64,
}

impl NovDeframer {
    pub fn new(src: ByteSource) -> NovDeframer {
        NovDeframer {
            src,
            buf: Vec::new(),
            eof: false,
            line_no: 0,
        }
    }

    /// Take the next line out of the buffer, reading as needed
    fn next_line(&mut self) -> Result<String, StreamError> {
        loop {
            if let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=nl).collect();
                return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Err(StreamError::Eof);
                }
                let line: Vec<u8> = self.buf.drain(..).collect();
                return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            match self.src.fill(&mut self.buf) {
                Ok(_) => {}
                Err(StreamError::Eof) => self.eof = true,
                Err(e) => return Err(e),
            }
        }
    }

    fn parse_line(&self, line: &str) -> Option<CnavPage> {
        let mut halves = line.splitn(2, ';');
        let head = halves.next()?;
        let rest = halves.next().or_else(|| {
            debug!("NOV-A line {}: no header/data separator", self.line_no);
            None
        })?;

        let header_fields: Vec<&str> = head.split(',').collect();
        if header_fields.len() != 10 {
            debug!(
                "NOV-A line {}: {} header fields instead of 10",
                self.line_no,
                header_fields.len()
            );
            return None;
        }
        if !header_fields[0].contains(LOG_NAME) {
            return None;
        }

        let mut data_crc = rest.splitn(2, '*');
        let data = data_crc.next()?;
        let crc_field = data_crc.next().or_else(|| {
            debug!("NOV-A line {}: CRC missing", self.line_no);
            None
        })?;
        let data_fields: Vec<&str> = data.split(',').collect();

        // CRC covers the canonical log name and everything up to the '*'
        let check = format!(
            "{},{};{}",
            &LOG_NAME[1..],
            header_fields[1..].join(","),
            data
        );
        let wanted = u32::from_str_radix(crc_field.trim(), 16).ok()?;
        let computed = crc32_novatel(check.as_bytes());
        if computed != wanted {
            debug!(
                "NOV-A line {}: CRC mismatch ({:08x} != {:08x})",
                self.line_no, computed, wanted
            );
            return None;
        }

        let sw_version: u32 = header_fields[9].trim().parse().ok()?;
        let cnav_hex = if sw_version < PAGEID_SW_VERSION {
            if data_fields.len() != 4 {
                debug!(
                    "NOV-A line {}: {} data fields for pre-{} firmware",
                    self.line_no,
                    data_fields.len(),
                    PAGEID_SW_VERSION
                );
                return None;
            }
            data_fields[3]
        } else {
            if data_fields.len() != 5 {
                debug!(
                    "NOV-A line {}: {} data fields instead of 5",
                    self.line_no,
                    data_fields.len()
                );
                return None;
            }
            data_fields[4]
        };

        let week: u16 = header_fields[5].trim().parse().ok()?;
        let tow: f64 = header_fields[6].trim().parse().ok()?;

        // 464 bits hex encoded; the last two bits are padding
        let raw = hex_bytes(cnav_hex.trim())?;
        if raw.len() != CNAV_BYTES {
            debug!(
                "NOV-A line {}: {} C/NAV bytes instead of {}",
                self.line_no,
                raw.len(),
                CNAV_BYTES
            );
            return None;
        }
        let mut bits = [0u8; CNAV_BYTES];
        bits.copy_from_slice(&raw);
        bits[CNAV_BYTES - 1] &= 0xfc;

        Some(CnavPage {
            bits,
            tow,
            week: Some(week),
        })
    }
}

impl Deframer for NovDeframer {
    fn next_record(&mut self) -> Result<Option<CnavPage>, StreamError> {
        let line = self.next_line()?;
        self.line_no += 1;
        Ok(self.parse_line(&line))
    }
}

fn hex_bytes(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

//! BINEX deframing (record 0x01, subrecord 0x44)
//!
//! BINEX frames records behind one of several sync bytes that encode
//! direction and endianness; lengths and IDs are Ubnxi variable-length
//! integers (7 payload bits per byte, high bit continues, a 4th byte
//! contributes all 8 bits). The raw-navigation record 0x01 with
//! subrecord 0x44 carries Galileo C/NAV pages: big-endian transmit time
//! (minutes since the GPS epoch plus milliseconds), PRN, a flags byte
//! and a source-dependent run of nav bytes. Only source 20 (E6 C/NAV,
//! 62 bytes) is of interest.
//!
//! Enhanced-CRC records are not supported; their sync bytes simply
//! never match. The record CRC itself is skipped: the flags byte says
//! whether the receiver already validated the page.

use byteorder::{BigEndian, ByteOrder};
use chrono::{Datelike, NaiveDate, Timelike};
use log::{debug, trace};

use crate::has::{CnavPage, CNAV_BYTES};
use crate::sink::PPPWIZ_RAW_BINEX;
use crate::source::{ByteSource, StreamError};

use super::Deframer;

/// Forward-parseable sync bytes: 0xC2/0xE2 (forward little/big endian)
/// and 0xD2/0xF2 (reverse-readable, parsed from the front the same way)
const SYNC_BYTES: [u8; 4] = [0xc2, 0xe2, 0xd2, 0xf2];

/// Record ID carrying raw navigation subrecords
const RECORD_RAW_NAV: u32 = 0x01;

/// Subrecord ID for Galileo C/NAV
const SUBRECORD_CNAV: u32 = 0x44;

/// Nav payload length for source 20 (Galileo E6 C/NAV)
const CNAV_SOURCE_LEN: usize = 62;

/// Records longer than this cannot be a raw-nav record; treat the sync
/// byte as a false positive
const MAX_RECORD_LEN: usize = 1024;

pub struct BinexDeframer {
    src: ByteSource,
    buf: Vec<u8>,
    raw: Vec<u8>,
    forward_raw: bool,
}

/// Decode a Ubnxi at the start of `data`, returning (value, size).
/// `None` when more bytes are needed.
fn read_ubnxi(data: &[u8], big_endian: bool) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for i in 0..4 {
        let b = *data.get(i)?;
        if i < 3 {
            if big_endian {
                value = value << 7 | u32::from(b & 0x7f);
            } else {
                value |= u32::from(b & 0x7f) << (7 * i);
            }
            if b & 0x80 == 0 {
                return Some((value, i + 1));
            }
        } else {
            value += u32::from(b) << 21;
        }
    }
    Some((value, 4))
}

/// CRC field size for a record whose message ended at byte offset `l`
fn crc_len(l: usize) -> usize {
    if l < 128 {
        1
    } else if l < 4096 {
        2
    } else {
        4
    }
}

impl BinexDeframer {
    pub fn new(src: ByteSource, forward_raw: bool) -> BinexDeframer {
        BinexDeframer {
            src,
            buf: Vec::new(),
            raw: Vec::new(),
            forward_raw,
        }
    }

    fn ensure(&mut self, n: usize) -> Result<(), StreamError> {
        while self.buf.len() < n {
            self.src.fill(&mut self.buf)?;
        }
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        if self.forward_raw {
            self.raw.extend_from_slice(&self.buf[..n]);
        }
        self.buf.drain(..n);
    }

    /// Skip to the next plausible record start: a sync byte followed by
    /// record ID 0x01
    fn sync(&mut self) -> Result<(), StreamError> {
        let mut i = 0;
        loop {
            self.ensure(i + 2)?;
            if SYNC_BYTES.contains(&self.buf[i]) && self.buf[i + 1] == RECORD_RAW_NAV as u8 {
                self.consume(i);
                return Ok(());
            }
            i += 1;
            if i >= 4096 {
                // keep the scan buffer bounded
                self.consume(i);
                i = 0;
            }
        }
    }
}

impl Deframer for BinexDeframer {
    fn next_record(&mut self) -> Result<Option<CnavPage>, StreamError> {
        self.sync()?;
        // sync byte bit 5 selects big-endian for begin-of-record syncs
        let big_endian = self.buf[0] & 0x20 != 0;

        // sync + up to two 4-byte Ubnxis
        self.ensure(1 + 8)?;
        let (record_id, id_len) = match read_ubnxi(&self.buf[1..], big_endian) {
            Some(v) => v,
            None => return Err(StreamError::Eof),
        };
        let (length, len_len) = match read_ubnxi(&self.buf[1 + id_len..], big_endian) {
            Some(v) => v,
            None => return Err(StreamError::Eof),
        };
        let length = length as usize;
        if record_id != RECORD_RAW_NAV || length > MAX_RECORD_LEN {
            trace!("not a raw-nav record (id {}, length {})", record_id, length);
            self.consume(1);
            return Ok(None);
        }
        let header_len = 1 + id_len + len_len;
        let total = header_len + length + crc_len(header_len + length - 1);
        self.ensure(total)?;
        let msg = self.buf[header_len..header_len + length].to_vec();
        self.consume(total);

        // subrecord IDs and fields are big-endian regardless of the
        // record layout
        let (sub_id, mut offset) = match read_ubnxi(&msg, true) {
            Some(v) => v,
            None => return Ok(None),
        };
        if sub_id != SUBRECORD_CNAV {
            trace!("skipping BINEX subrecord 0x{:02x}", sub_id);
            return Ok(None);
        }
        if msg.len() < offset + 8 {
            debug!("truncated BINEX 0x01-44 subrecord");
            return Ok(None);
        }
        let tow_min = BigEndian::read_u32(&msg[offset..offset + 4]);
        let tow_ms = BigEndian::read_u16(&msg[offset + 4..offset + 6]);
        // msg[offset + 6] is the PRN
        let flags = msg[offset + 7];
        offset += 8;

        // TODO: the -1 matches observed receiver logs, but the ICD
        // meaning of a raw source field of 0 is still unresolved
        let source = i32::from(flags & 31) - 1;
        let crc_passed = flags & 32 != 0;
        let mid_available = flags & 64 != 0;
        if source != 20 {
            debug!("BINEX nav subrecord from source {}, ignored", source);
            return Ok(None);
        }
        if mid_available {
            match read_ubnxi(&msg[offset..], true) {
                Some((_mid, n)) => offset += n,
                None => return Ok(None),
            }
        }
        if msg.len() < offset + CNAV_SOURCE_LEN {
            debug!("BINEX 0x01-44 subrecord shorter than its nav payload");
            return Ok(None);
        }
        if !crc_passed {
            debug!("BINEX C/NAV page failed the receiver CRC check");
            return Ok(None);
        }

        let mut bits = [0u8; CNAV_BYTES];
        bits.copy_from_slice(&msg[offset..offset + CNAV_BYTES]);
        bits[CNAV_BYTES - 1] &= 0xfc;

        let (tow, week) = time_of_week(tow_min, tow_ms);
        Ok(Some(CnavPage {
            bits,
            tow,
            week: Some(week),
        }))
    }

    fn take_raw(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.raw, Vec::new())
    }

    fn raw_format(&self) -> u32 {
        PPPWIZ_RAW_BINEX
    }
}

/// Time of week and week number from minutes since the GPS epoch
/// (1980-01-06, a Sunday) plus milliseconds
fn time_of_week(minutes: u32, millis: u16) -> (f64, u16) {
    let epoch = NaiveDate::from_ymd(1980, 1, 6).and_hms(0, 0, 0);
    let t = epoch + chrono::Duration::minutes(i64::from(minutes));
    let days = i64::from(t.weekday().num_days_from_sunday());
    let seconds_of_day = i64::from(t.num_seconds_from_midnight());
    let tow = (days * 86400 + seconds_of_day) as f64 + f64::from(millis) / 1000.0;
    let week = (i64::from(minutes) * 60 / 604_800) as u16;
    (tow, week)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(source: u8, crc_passed: bool, tow_min: u32, tow_ms: u16, nav: &[u8]) -> Vec<u8> {
        let mut msg = vec![0x44];
        let mut time = [0u8; 6];
        BigEndian::write_u32(&mut time[0..4], tow_min);
        BigEndian::write_u16(&mut time[4..6], tow_ms);
        msg.extend_from_slice(&time);
        msg.push(5); // PRN
        msg.push((source + 1) & 31 | if crc_passed { 32 } else { 0 });
        msg.extend_from_slice(nav);

        let mut out = vec![0xe2, 0x01, msg.len() as u8];
        out.extend_from_slice(&msg);
        out.push(0xaa); // CRC byte, not verified
        out
    }

    fn deframer(data: Vec<u8>) -> BinexDeframer {
        BinexDeframer::new(ByteSource::from_reader(Box::new(Cursor::new(data))), false)
    }

    #[test]
    fn ubnxi_decoding() {
        assert_eq!(read_ubnxi(&[0x01], true), Some((1, 1)));
        assert_eq!(read_ubnxi(&[0x7f], true), Some((127, 1)));
        // two-byte big-endian: 0x81 0x01 = 128 + 1
        assert_eq!(read_ubnxi(&[0x81, 0x01], true), Some((129, 2)));
        // little-endian puts the low septet first
        assert_eq!(read_ubnxi(&[0x81, 0x01], false), Some((129, 2)));
        assert_eq!(read_ubnxi(&[0x82, 0x01], false), Some((130, 2)));
        assert_eq!(read_ubnxi(&[0x82, 0x01], true), Some((257, 2)));
        assert_eq!(read_ubnxi(&[0x80], true), None);
    }

    #[test]
    fn extracts_cnav_page() {
        let mut nav = vec![0u8; CNAV_SOURCE_LEN];
        nav[0] = 0xff;
        nav[1] = 0xfc;
        // one full week plus five minutes, 500 ms
        let data = record(20, true, 7 * 24 * 60 + 5, 500, &nav);
        let mut df = deframer(data);
        let page = df.next_record().unwrap().unwrap();
        assert_eq!(page.tow, 300.5);
        assert_eq!(page.week, Some(1));
        assert_eq!(page.bits[0], 0xff);
        assert!(matches!(df.next_record(), Err(StreamError::Eof)));
    }

    #[test]
    fn other_sources_are_ignored() {
        let nav = vec![0u8; 31];
        let mut df = deframer(record(7, true, 100, 0, &nav));
        assert!(matches!(df.next_record(), Ok(None)));
    }

    #[test]
    fn unchecked_pages_are_dropped() {
        let nav = vec![0u8; CNAV_SOURCE_LEN];
        let mut df = deframer(record(20, false, 100, 0, &nav));
        assert!(matches!(df.next_record(), Ok(None)));
    }

    #[test]
    fn resyncs_over_garbage() {
        let nav = vec![0x11u8; CNAV_SOURCE_LEN];
        let mut data = vec![0x00, 0xe2, 0x99, 0x42]; // 0xe2 not followed by 0x01
        data.extend(record(20, true, 60, 0, &nav));
        let mut df = deframer(data);
        let page = loop {
            match df.next_record() {
                Ok(Some(p)) => break p,
                Ok(None) => continue,
                Err(e) => panic!("unexpected {:?}", e),
            }
        };
        assert_eq!(page.tow, 3600.0);
    }
}

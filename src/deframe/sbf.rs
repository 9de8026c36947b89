//! SBF (Septentrio Binary Format) deframing
//!
//! SBF is little-endian block framing: a `$@` preamble, a 6-byte header
//! `(crc, id, length)` and a payload. Only block 4024 sub-type 0
//! (GALRawCNAV) is of interest; its payload carries the receiver time
//! and 16 32-bit words of raw C/NAV symbols, already CRC-checked by the
//! receiver.
//!
//! Ref: Septentrio SBF Reference Guide, GALRawCNAV

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::bits::BitWriter;
use crate::has::{CnavPage, CNAV_BYTES};
use crate::sink::PPPWIZ_RAW_SBF;
use crate::source::{ByteSource, StreamError};

use super::{find, Deframer};

const PREAMBLE: [u8; 2] = [0x24, 0x40]; // "$@"
const BLOCK_CNAV: u16 = 4024;

/// Fixed payload part ahead of any padding: tow, week, six status
/// bytes, 16 nav words
const CNAV_PAYLOAD_LEN: usize = 4 + 2 + 6 + 16 * 4;

pub struct SbfDeframer {
    src: ByteSource,
    buf: Vec<u8>,
    raw: Vec<u8>,
    forward_raw: bool,
}

impl SbfDeframer {
    pub fn new(src: ByteSource, forward_raw: bool) -> SbfDeframer {
        SbfDeframer {
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

    /// Skip to just past the next `$@` preamble
    fn sync(&mut self) -> Result<(), StreamError> {
        loop {
            if let Some(idx) = find(&self.buf, &PREAMBLE) {
                self.consume(idx + 2);
                return Ok(());
            }
            // keep one byte in case the preamble straddles a chunk
            let keep = self.buf.len().saturating_sub(1);
            self.consume(keep);
            self.src.fill(&mut self.buf)?;
        }
    }
}

impl Deframer for SbfDeframer {
    fn next_record(&mut self) -> Result<Option<CnavPage>, StreamError> {
        self.sync()?;
        self.ensure(6)?;
        let id = LittleEndian::read_u16(&self.buf[2..4]);
        let length = LittleEndian::read_u16(&self.buf[4..6]) as usize;
        if length % 4 != 0 || length < 8 {
            trace!("SBF block with invalid length {}, resyncing", length);
            return Ok(None);
        }
        let block_len = length - 8;
        self.ensure(6 + block_len)?;
        let block = self.buf[6..6 + block_len].to_vec();
        self.consume(6 + block_len);

        if id & 0xfff8 != BLOCK_CNAV || id & 0x7 != 0 {
            trace!("skipping SBF block type {} sub {}", id & 0xfff8, id & 0x7);
            return Ok(None);
        }
        if block.len() < CNAV_PAYLOAD_LEN {
            debug!("truncated GALRawCNAV block ({} bytes)", block.len());
            return Ok(None);
        }

        let tow_ms = LittleEndian::read_u32(&block[0..4]);
        let wnc = LittleEndian::read_u16(&block[4..6]);
        // block[6] is the SVID; the remaining status bytes are the
        // Viterbi error count, signal source, frequency and a reserved
        // byte
        let crc_passed = block[7];
        if crc_passed != 1 {
            debug!("GALRawCNAV block failed the receiver CRC check");
            return Ok(None);
        }

        let mut wr = BitWriter::new();
        for i in 0..16 {
            wr.write(LittleEndian::read_u32(&block[12 + i * 4..16 + i * 4]), 32);
        }
        let mut bits = [0u8; CNAV_BYTES];
        bits.copy_from_slice(&wr.as_bytes()[..CNAV_BYTES]);
        bits[CNAV_BYTES - 1] &= 0xfc;

        Ok(Some(CnavPage {
            bits,
            tow: f64::from(tow_ms) / 1000.0,
            week: Some(wnc),
        }))
    }

    fn take_raw(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.raw, Vec::new())
    }

    fn raw_format(&self) -> u32 {
        PPPWIZ_RAW_SBF
    }
}

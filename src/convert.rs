//! Pipeline driver
//!
//! Pumps one container record at a time: deframed C/NAV pages go into
//! the HAS assembler, decoded HAS messages into the SSR parser, parsed
//! SSR state through the chosen encoder backend into the sink. Strictly
//! single threaded; ordering is arrival order.

use log::{debug, info, warn};

use crate::deframe::{gpst_to_unix, Deframer};
use crate::genmat::GenMatrix;
use crate::has::HasAssembler;
use crate::sink::Output;
use crate::source::StreamError;
use crate::ssr::encode::{CorrectionUnavailable, System};
use crate::ssr::{igs, rtcm, Ssr, SsrParser};

/// Target SSR wire format
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Format {
    Igs,
    Rtcm3,
}

/// Converts parsed SSR state into framed output messages
pub struct SsrConverter {
    pub format: Format,
    /// Emit a combined orbit+clock message when both blocks are present
    pub compact: bool,
    /// Use the high-rate clock message instead of the low-rate one
    pub hr_clock: bool,
    /// Round update intervals down instead of up
    pub lower_udi: bool,
}

impl SsrConverter {
    pub fn new(format: Format) -> SsrConverter {
        SsrConverter {
            format,
            compact: true,
            hr_clock: false,
            lower_udi: true,
        }
    }

    /// All output messages for one SSR state, in mask order
    pub fn convert(&self, ssr: &Ssr, tow: f64) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for mask in &ssr.masks.gnss {
            match System::from_sys_id(mask.sys_id) {
                Some(sys) => self.convert_system(sys, ssr, tow, &mut out),
                None => {
                    warn!("faulty system key [{}] encountered, proceeding", mask.sys_id);
                }
            }
        }
        out
    }

    fn convert_system(&self, sys: System, ssr: &Ssr, tow: f64, out: &mut Vec<Vec<u8>>) {
        let content = ssr.header.content;
        if self.compact && content.orb && content.clock_full {
            debug!("creating combined orbit+clock message for {}", sys.name());
            self.emit(self.combined(sys, ssr, tow), sys, "combined", out);
        } else {
            if content.orb {
                debug!("creating orbit message for {}", sys.name());
                self.emit(self.orbit(sys, ssr, tow), sys, "orbit", out);
            }
            if content.clock_full || content.clock_sub {
                if self.hr_clock {
                    debug!("creating high-rate clock message for {}", sys.name());
                    self.emit(self.hr_clock_msg(sys, ssr, tow), sys, "clock", out);
                } else {
                    debug!("creating clock message for {}", sys.name());
                    self.emit(self.clock(sys, ssr, tow), sys, "clock", out);
                }
            }
        }
        if content.code_bias {
            debug!("creating code bias message for {}", sys.name());
            self.emit(self.code_bias(sys, ssr, tow), sys, "code bias", out);
        }
        if content.phase_bias {
            debug!("creating phase bias message for {}", sys.name());
            self.emit(self.phase_bias(sys, ssr, tow), sys, "phase bias", out);
        }
    }

    fn emit(
        &self,
        result: Result<Vec<Vec<u8>>, CorrectionUnavailable>,
        sys: System,
        what: &str,
        out: &mut Vec<Vec<u8>>,
    ) {
        match result {
            Ok(pages) => out.extend(pages),
            // absent blocks skip this sub-message only
            Err(e) => debug!("{} {} message skipped: {}", sys.name(), what, e),
        }
    }

    fn orbit(&self, sys: System, ssr: &Ssr, tow: f64) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::orbit(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::orbit(sys, ssr, tow, self.lower_udi),
        }
    }

    fn clock(&self, sys: System, ssr: &Ssr, tow: f64) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::clock(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::clock(sys, ssr, tow, self.lower_udi),
        }
    }

    fn hr_clock_msg(
        &self,
        sys: System,
        ssr: &Ssr,
        tow: f64,
    ) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::hr_clock(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::hr_clock(sys, ssr, tow, self.lower_udi),
        }
    }

    fn combined(
        &self,
        sys: System,
        ssr: &Ssr,
        tow: f64,
    ) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::combined(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::combined(sys, ssr, tow, self.lower_udi),
        }
    }

    fn code_bias(
        &self,
        sys: System,
        ssr: &Ssr,
        tow: f64,
    ) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::code_bias(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::code_bias(sys, ssr, tow, self.lower_udi),
        }
    }

    fn phase_bias(
        &self,
        sys: System,
        ssr: &Ssr,
        tow: f64,
    ) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
        match self.format {
            Format::Igs => igs::phase_bias(sys, ssr, tow, self.lower_udi),
            Format::Rtcm3 => rtcm::phase_bias(sys, ssr, tow, self.lower_udi),
        }
    }
}

/// Counters reported at the end of a run
#[derive(Default)]
pub struct RunStats {
    /// Container records scanned
    pub records: u64,
    /// Records that held a C/NAV page
    pub pages: u64,
    /// HAS messages decoded
    pub decoded: u64,
}

/// Pump the pipeline until end of stream, starvation, or the record cap
/// (`max_records` 0 = unlimited)
pub fn run(
    deframer: &mut dyn Deframer,
    converter: &SsrConverter,
    output: &mut Output,
    max_records: u64,
) -> RunStats {
    let mut assembler = HasAssembler::new(GenMatrix::load());
    let mut parser = SsrParser::new();
    let mut stats = RunStats::default();
    let forward_raw = output.wants_raw();

    while max_records == 0 || stats.records < max_records {
        let record = match deframer.next_record() {
            Ok(r) => {
                stats.records += 1;
                r
            }
            Err(StreamError::Eof) => {
                info!("end of stream reached, ending operation");
                break;
            }
            Err(StreamError::Starved) => {
                warn!("source ran out of data, ending operation");
                break;
            }
            Err(StreamError::Io(e)) => {
                warn!("stream error, ending operation: {}", e);
                break;
            }
        };
        if forward_raw {
            let raw = deframer.take_raw();
            if !raw.is_empty() {
                if let Err(e) = output.write_raw(&raw, deframer.raw_format()) {
                    warn!("sink error, ending operation: {}", e);
                    break;
                }
            }
        }
        let page = match record {
            Some(p) => p,
            None => continue,
        };
        stats.pages += 1;

        let message = match assembler.feed(&page) {
            Some(m) => m,
            None => continue,
        };
        stats.decoded += 1;
        let ssr = match parser.parse(&message.bytes) {
            Some(s) => s,
            None => continue,
        };
        let epoch = gpst_to_unix(page.week.unwrap_or(0), page.tow);
        for frame in converter.convert(&ssr, message.tow) {
            if let Err(e) = output.write_ssr(&frame, epoch) {
                warn!("sink error, ending operation: {}", e);
                return stats;
            }
        }
    }
    info!(
        "out of {} records, {} were C/NAV pages; {} HAS messages decoded and converted",
        stats.records, stats.pages, stats.decoded
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use byteorder::{ByteOrder, LittleEndian};

    use crate::bits::{BitReader, BitWriter};
    use crate::deframe::sbf::SbfDeframer;
    use crate::sink::Sink;
    use crate::source::ByteSource;
    use crate::ssr::SYS_GAL;

    struct VecSink(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Sink for VecSink {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
    }

    /// A single-page HAS message: GAL mask (one satellite, one signal),
    /// orbit and full-clock blocks
    fn has_payload() -> Vec<u8> {
        let mut wr = BitWriter::new();
        // header: toh 600, content mask+orb+clockFull, maskID 0, IOD set 0
        wr.write(600, 12);
        wr.write(0b111000, 6);
        wr.write(0, 4);
        wr.write(0, 5);
        wr.write(0, 5);
        // masks: one system, GAL, PRN 7, signal 0
        wr.write(1, 4);
        wr.write(u32::from(SYS_GAL), 4);
        wr.write(0, 6);
        wr.write(1, 1); // bit position 6 -> PRN 7
        wr.write_zeros(33);
        wr.write(1 << 15, 16);
        wr.write_bool(false);
        wr.write(0, 3);
        wr.write(0, 6);
        // orbit: validity 0, IOD 33, radial +2, in-track +3, cross -4
        wr.write(0, 4);
        wr.write(33, 10);
        wr.write_signed(2, 13);
        wr.write_signed(3, 12);
        wr.write_signed(-4, 12);
        // clock: validity 0, multiplier 1, +40
        wr.write(0, 4);
        wr.write(0, 2);
        wr.write_signed(40, 13);
        wr.pad_to_byte();
        let mut bytes = wr.into_bytes();
        bytes.resize(53, 0); // one page
        bytes
    }

    /// Wrap a 53-byte HAS page into a C/NAV page, then into an SBF
    /// GALRawCNAV block
    fn sbf_block_with_page(payload: &[u8], tow_ms: u32) -> Vec<u8> {
        let mut cnav = BitWriter::new();
        cnav.write(0x3fff, 14); // sync
        cnav.write(1, 2); // status: operational
        cnav.write(0, 2);
        cnav.write(1, 2); // mType
        cnav.write(3, 5); // mID
        cnav.write(0, 5); // mS = 1
        cnav.write(1, 8); // pID
        for &b in payload {
            cnav.write(u32::from(b), 8);
        }
        // pad the 462 C/NAV bits up to 16 32-bit nav words
        while cnav.bit_len() < 512 {
            cnav.write(0, 1);
        }
        let nav = cnav.into_bytes();

        let mut block = vec![0x24, 0x40];
        let mut header = [0u8; 6];
        LittleEndian::write_u16(&mut header[2..4], 4024);
        LittleEndian::write_u16(&mut header[4..6], 84);
        block.extend_from_slice(&header);
        let mut body = vec![0u8; 76];
        LittleEndian::write_u32(&mut body[0..4], tow_ms);
        LittleEndian::write_u16(&mut body[4..6], 2296);
        body[7] = 1; // crc_passed
        for i in 0..16 {
            // the deframer reads nav words as little-endian u32s
            let word = (u32::from(nav[i * 4]) << 24)
                | (u32::from(nav[i * 4 + 1]) << 16)
                | (u32::from(nav[i * 4 + 2]) << 8)
                | u32::from(nav[i * 4 + 3]);
            LittleEndian::write_u32(&mut body[12 + i * 4..16 + i * 4], word);
        }
        block.extend_from_slice(&body);
        block
    }

    #[test]
    fn sbf_to_rtcm_end_to_end() {
        let stream = sbf_block_with_page(&has_payload(), 443_150_000);
        let mut deframer = SbfDeframer::new(
            ByteSource::from_reader(Box::new(Cursor::new(stream))),
            false,
        );
        let converter = SsrConverter::new(Format::Rtcm3);
        let collected = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut output = Output::Plain(Box::new(VecSink(collected.clone())));

        let stats = run(&mut deframer, &converter, &mut output, 0);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.decoded, 1);

        let bytes = collected.borrow().clone();
        assert!(!bytes.is_empty());
        assert_eq!(bytes[0], 0xd3);
        // compact default: one combined orbit+clock message for Galileo
        let mut rd = BitReader::new(&bytes[3..]);
        assert_eq!(rd.read(12), Some(1243));
        rd.skip(20 + 4 + 1 + 1 + 4 + 16 + 4).unwrap();
        assert_eq!(rd.read(6), Some(1)); // one satellite
        assert_eq!(rd.read(6), Some(7)); // PRN 7
        assert_eq!(rd.read(10), Some(33)); // Galileo IODE
        assert_eq!(rd.read_signed(22), Some(-50)); // sign-flipped radial
    }

    #[test]
    fn record_cap_stops_the_run() {
        let mut stream = Vec::new();
        for i in 0..3 {
            stream.extend(sbf_block_with_page(&has_payload(), 1000 * i));
        }
        let mut deframer = SbfDeframer::new(
            ByteSource::from_reader(Box::new(Cursor::new(stream))),
            false,
        );
        let converter = SsrConverter::new(Format::Igs);
        let mut output = Output::Plain(Box::new(VecSink(Default::default())));
        let stats = run(&mut deframer, &converter, &mut output, 2);
        assert_eq!(stats.records, 2);
    }
}

//! SSR state parsed out of decoded HAS messages
//!
//! A HAS message is a sequence of optional blocks announced by a 6-bit
//! content field: satellite/signal masks, orbit corrections, clock
//! corrections (full set or subset), code biases and phase biases. Masks
//! and orbit IOD sets are referenced across messages by 5-bit IDs, so the
//! parser keeps two 32-slot memories; a message that carries neither a
//! mask nor orbits is only decodable while both referenced slots are
//! filled.
//!
//! Ref: Galileo HAS SIS ICD v1.0, section 5 (HAS message content)

pub mod encode;
pub mod igs;
pub mod rtcm;

use log::{debug, warn};

use crate::bits::BitReader;

/// Stream system key for GPS
pub const SYS_GPS: u8 = 0;
/// Stream system key for Galileo
pub const SYS_GAL: u8 = 2;

const SAT_MASK_BITS: usize = 40;
const SIG_MASK_BITS: usize = 16;

/// Raw 13-bit clock sentinel: field not available
const CLOCK_NA: i32 = -4096;
/// Raw 13-bit clock sentinel: satellite must not be used
const CLOCK_DNU: i32 = 4095;

/// The six content flags of the HAS message header, in wire order
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct ContentFlags {
    pub mask: bool,
    pub orb: bool,
    pub clock_full: bool,
    pub clock_sub: bool,
    pub code_bias: bool,
    pub phase_bias: bool,
}

/// HAS message header (32 bits)
#[derive(Clone, Copy, Debug)]
pub struct Header {
    /// Time of hour the corrections refer to, seconds 0..4095
    pub toh: u32,
    pub content: ContentFlags,
    pub mask_id: u8,
    pub iod_set_id: u8,
}

impl Header {
    fn parse(rd: &mut BitReader) -> Option<Header> {
        let toh = rd.read(12)?;
        let content = ContentFlags {
            mask: rd.read_bool()?,
            orb: rd.read_bool()?,
            clock_full: rd.read_bool()?,
            clock_sub: rd.read_bool()?,
            code_bias: rd.read_bool()?,
            phase_bias: rd.read_bool()?,
        };
        rd.skip(4)?; // reserved
        let mask_id = rd.read(5)? as u8;
        let iod_set_id = rd.read(5)? as u8;
        Some(Header {
            toh,
            content,
            mask_id,
            iod_set_id,
        })
    }
}

/// Satellite/signal mask for one GNSS
///
/// Bit position p of `sat_mask` (0 = most significant of the 40) stands
/// for PRN p+1. The DNU mask uses the same indexing and is filled in by
/// clock blocks that carry the do-not-use sentinel.
#[derive(Clone, Debug)]
pub struct SystemMask {
    pub sys_id: u8,
    pub sat_mask: u64,
    pub sig_mask: u16,
    /// Per-(satellite, signal) availability; `None` means all signals
    /// apply to all satellites
    pub cell_mask: Option<Vec<bool>>,
    pub nav_msg: u8,
    pub dnu_mask: u64,
}

impl SystemMask {
    fn parse(rd: &mut BitReader) -> Option<SystemMask> {
        let sys_id = rd.read(4)? as u8;
        let mut sat_mask: u64 = 0;
        for _ in 0..SAT_MASK_BITS {
            sat_mask = sat_mask << 1 | u64::from(rd.read(1)?);
        }
        let sig_mask = rd.read(16)? as u16;
        let cell_flag = rd.read_bool()?;
        let nsat = sat_mask.count_ones() as usize;
        let nsig = sig_mask.count_ones() as usize;
        let cell_mask = if cell_flag {
            let mut cells = Vec::with_capacity(nsat * nsig);
            for _ in 0..nsat * nsig {
                cells.push(rd.read_bool()?);
            }
            Some(cells)
        } else {
            None
        };
        let nav_msg = rd.read(3)? as u8;
        Some(SystemMask {
            sys_id,
            sat_mask,
            sig_mask,
            cell_mask,
            nav_msg,
            dnu_mask: 0,
        })
    }

    /// Number of satellites the mask enables
    pub fn nsat(&self) -> usize {
        self.sat_mask.count_ones() as usize
    }

    /// Number of signals the mask enables
    pub fn nsig(&self) -> usize {
        self.sig_mask.count_ones() as usize
    }

    /// 1-based PRN of the n-th enabled satellite
    pub fn sat_id(&self, n: usize) -> u8 {
        nth_set_bit(self.sat_mask, SAT_MASK_BITS, n) as u8 + 1
    }

    /// HAS signal code (position in the signal mask) of the n-th enabled
    /// signal
    pub fn sig_id(&self, n: usize) -> u8 {
        nth_set_bit(u64::from(self.sig_mask), SIG_MASK_BITS, n) as u8
    }

    /// Mark the n-th enabled satellite as do-not-use
    pub fn set_dnu(&mut self, n: usize) {
        let pos = nth_set_bit(self.sat_mask, SAT_MASK_BITS, n);
        self.dnu_mask |= 1 << (SAT_MASK_BITS - 1 - pos);
    }

    /// Whether the n-th enabled satellite is marked do-not-use
    pub fn is_dnu(&self, n: usize) -> bool {
        let pos = nth_set_bit(self.sat_mask, SAT_MASK_BITS, n);
        self.dnu_mask & 1 << (SAT_MASK_BITS - 1 - pos) != 0
    }

    /// Whether signal column `sig` applies to satellite ordinal `sat`
    pub fn cell(&self, sat: usize, sig: usize) -> bool {
        match &self.cell_mask {
            Some(cells) => cells[sat * self.nsig() + sig],
            None => true,
        }
    }
}

/// Position (from the MSB of a `width`-bit mask) of the n-th set bit.
/// Callers only ask for ordinals that exist in the mask.
fn nth_set_bit(mask: u64, width: usize, n: usize) -> usize {
    let mut seen = 0;
    for pos in 0..width {
        if mask & 1 << (width - 1 - pos) != 0 {
            if seen == n {
                return pos;
            }
            seen += 1;
        }
    }
    panic!("ordinal {} out of range for mask {:x}", n, mask);
}

/// The mask block: one `SystemMask` per GNSS, in transmission order
#[derive(Clone, Debug)]
pub struct Masks {
    pub gnss: Vec<SystemMask>,
}

impl Masks {
    fn parse(rd: &mut BitReader) -> Option<Masks> {
        let nsys = rd.read(4)? as usize;
        let mut gnss = Vec::with_capacity(nsys);
        for _ in 0..nsys {
            gnss.push(SystemMask::parse(rd)?);
        }
        rd.skip(6)?; // reserved
        Some(Masks { gnss })
    }

    pub fn get(&self, sys_id: u8) -> Option<&SystemMask> {
        self.gnss.iter().find(|m| m.sys_id == sys_id)
    }

    pub fn get_mut(&mut self, sys_id: u8) -> Option<&mut SystemMask> {
        self.gnss.iter_mut().find(|m| m.sys_id == sys_id)
    }

    /// Enabled-satellite count for a system, 0 when absent
    pub fn sat_count(&self, sys_id: u8) -> usize {
        self.get(sys_id).map_or(0, |m| m.nsat())
    }

    /// System IDs in ascending order; orbit and full-clock blocks are
    /// laid out this way
    pub fn sys_ids_ascending(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.gnss.iter().map(|m| m.sys_id).collect();
        ids.sort_unstable();
        ids
    }
}

/// Orbit correction for one satellite
///
/// Raw quanta: radial 0.0025 m, in-track and cross-track 0.008 m.
/// `None` marks the not-available sentinel (minimum negative value).
#[derive(Clone, Debug)]
pub struct SatOrbit {
    pub iod: u16,
    pub rad: Option<i16>,
    pub in_track: Option<i16>,
    pub cross_track: Option<i16>,
}

impl SatOrbit {
    fn parse(rd: &mut BitReader, sys_id: u8) -> Option<SatOrbit> {
        let iod_bits = match sys_id {
            SYS_GPS => 8,
            SYS_GAL => 10,
            _ => {
                warn!("orbit block for unknown system {} cannot be read", sys_id);
                return None;
            }
        };
        let iod = rd.read(iod_bits)? as u16;
        let rad = match rd.read_signed(13)? {
            -4096 => None,
            v => Some(v as i16),
        };
        let in_track = match rd.read_signed(12)? {
            -2048 => None,
            v => Some(v as i16),
        };
        let cross_track = match rd.read_signed(12)? {
            -2048 => None,
            v => Some(v as i16),
        };
        Some(SatOrbit {
            iod,
            rad,
            in_track,
            cross_track,
        })
    }

    /// True when every component carries a value
    pub fn complete(&self) -> bool {
        self.rad.is_some() && self.in_track.is_some() && self.cross_track.is_some()
    }
}

/// Orbit block: per system (ascending ID), one entry per enabled
/// satellite
#[derive(Clone, Debug)]
pub struct Orbits {
    pub validity_idx: u8,
    pub systems: Vec<(u8, Vec<SatOrbit>)>,
}

impl Orbits {
    fn parse(rd: &mut BitReader, masks: &Masks) -> Option<Orbits> {
        let validity_idx = rd.read(4)? as u8;
        let mut systems = Vec::new();
        for sys_id in masks.sys_ids_ascending() {
            let nsat = masks.sat_count(sys_id);
            let mut sats = Vec::with_capacity(nsat);
            for _ in 0..nsat {
                sats.push(SatOrbit::parse(rd, sys_id)?);
            }
            systems.push((sys_id, sats));
        }
        Some(Orbits {
            validity_idx,
            systems,
        })
    }

    pub fn get(&self, sys_id: u8) -> Option<&[SatOrbit]> {
        self.systems
            .iter()
            .find(|(id, _)| *id == sys_id)
            .map(|(_, sats)| sats.as_slice())
    }

    /// The IOD set this block defines, for the cross-message memory
    pub fn iods(&self) -> Vec<(u8, Vec<u16>)> {
        self.systems
            .iter()
            .map(|(id, sats)| (*id, sats.iter().map(|s| s.iod).collect()))
            .collect()
    }
}

/// One parsed 13-bit clock field
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockValue {
    /// Raw value in quanta of 0.0025 m times the system multiplier
    Value(i16),
    NotAvailable,
    DoNotUse,
}

/// Clock block covering every masked satellite
#[derive(Clone, Debug)]
pub struct ClockFull {
    pub validity_idx: u8,
    /// (system ID, multiplier, one value per enabled satellite), in
    /// ascending system order
    pub systems: Vec<(u8, u8, Vec<ClockValue>)>,
}

impl ClockFull {
    fn parse(rd: &mut BitReader, masks: &mut Masks) -> Option<ClockFull> {
        let validity_idx = rd.read(4)? as u8;
        let ids = masks.sys_ids_ascending();
        // all multipliers first, then all correction runs
        let mut mults = Vec::with_capacity(ids.len());
        for &sys_id in &ids {
            if masks.sat_count(sys_id) > 0 {
                mults.push(rd.read(2)? as u8 + 1);
            } else {
                mults.push(1);
            }
        }
        let mut systems = Vec::with_capacity(ids.len());
        for (&sys_id, &mult) in ids.iter().zip(&mults) {
            let nsat = masks.sat_count(sys_id);
            let mut values = Vec::with_capacity(nsat);
            for sat in 0..nsat {
                let value = match rd.read_signed(13)? {
                    CLOCK_NA => ClockValue::NotAvailable,
                    CLOCK_DNU => {
                        if let Some(mask) = masks.get_mut(sys_id) {
                            mask.set_dnu(sat);
                        }
                        ClockValue::DoNotUse
                    }
                    v => ClockValue::Value(v as i16),
                };
                values.push(value);
            }
            systems.push((sys_id, mult, values));
        }
        Some(ClockFull {
            validity_idx,
            systems,
        })
    }

    pub fn get(&self, sys_id: u8) -> Option<(u8, &[ClockValue])> {
        self.systems
            .iter()
            .find(|(id, _, _)| *id == sys_id)
            .map(|(_, mult, values)| (*mult, values.as_slice()))
    }
}

/// Clock corrections for one system's satellite subset
#[derive(Clone, Debug)]
pub struct SubClockSystem {
    pub sys_id: u8,
    pub mult: u8,
    /// One value per set bit of the subset mask
    pub values: Vec<ClockValue>,
    /// PRNs matching `values`
    pub prns: Vec<u8>,
    /// Mask ordinals matching `values` (index into the enabled-satellite
    /// sequence of the system mask)
    pub ordinals: Vec<usize>,
}

/// Clock block covering explicit satellite subsets
#[derive(Clone, Debug)]
pub struct ClockSub {
    pub validity_idx: u8,
    pub systems: Vec<SubClockSystem>,
}

impl ClockSub {
    fn parse(rd: &mut BitReader, masks: &mut Masks) -> Option<ClockSub> {
        let validity_idx = rd.read(4)? as u8;
        let nsys = rd.read(4)? as usize;
        let mut systems = Vec::with_capacity(nsys);
        for _ in 0..nsys {
            let sys_id = rd.read(4)? as u8;
            let mult = rd.read(2)? as u8 + 1;
            let nsat = masks.sat_count(sys_id);
            if nsat == 0 {
                warn!("clock subset for unmasked system {}", sys_id);
                return None;
            }
            let mut submask = Vec::with_capacity(nsat);
            for _ in 0..nsat {
                submask.push(rd.read_bool()?);
            }
            let mut values = Vec::new();
            let mut prns = Vec::new();
            let mut ordinals = Vec::new();
            for (sat, &on) in submask.iter().enumerate() {
                if !on {
                    continue;
                }
                ordinals.push(sat);
                let value = match rd.read_signed(13)? {
                    CLOCK_NA => ClockValue::NotAvailable,
                    CLOCK_DNU => {
                        if let Some(mask) = masks.get_mut(sys_id) {
                            mask.set_dnu(sat);
                        }
                        ClockValue::DoNotUse
                    }
                    v => ClockValue::Value(v as i16),
                };
                values.push(value);
                if let Some(mask) = masks.get(sys_id) {
                    prns.push(mask.sat_id(sat));
                }
            }
            systems.push(SubClockSystem {
                sys_id,
                mult,
                values,
                prns,
                ordinals,
            });
        }
        Some(ClockSub {
            validity_idx,
            systems,
        })
    }

    pub fn get(&self, sys_id: u8) -> Option<&SubClockSystem> {
        self.systems.iter().find(|s| s.sys_id == sys_id)
    }
}

/// One code or phase bias
#[derive(Clone, Debug)]
pub struct BiasEntry {
    /// HAS signal code: the signal's position in the 16-bit signal mask
    pub signal: u8,
    /// Raw value, `None` for the not-available sentinel. Quanta: 0.02 m
    /// for code biases, 0.01 cycles for phase biases.
    pub value: Option<i16>,
    /// Phase discontinuity counter (2 bits); 0 for code biases
    pub discontinuity: u8,
}

/// Biases of one satellite
#[derive(Clone, Debug)]
pub struct SatBiases {
    /// 1-based PRN from the satellite mask
    pub prn: u8,
    pub entries: Vec<BiasEntry>,
}

/// A code- or phase-bias block, in mask order
#[derive(Clone, Debug)]
pub struct Biases {
    pub validity_idx: u8,
    pub systems: Vec<(u8, Vec<SatBiases>)>,
}

/// Distinguishes the two bias block layouts
#[derive(Clone, Copy, PartialEq)]
enum BiasKind {
    Code,
    Phase,
}

impl Biases {
    fn parse(rd: &mut BitReader, masks: &Masks, kind: BiasKind) -> Option<Biases> {
        let validity_idx = rd.read(4)? as u8;
        let mut systems = Vec::with_capacity(masks.gnss.len());
        for mask in &masks.gnss {
            let nsig = mask.nsig();
            let mut sats = Vec::with_capacity(mask.nsat());
            for sat in 0..mask.nsat() {
                let mut entries = Vec::new();
                for sig in 0..nsig {
                    if !mask.cell(sat, sig) {
                        continue;
                    }
                    let signal = mask.sig_id(sig);
                    let (value, discontinuity) = match kind {
                        BiasKind::Code => {
                            let raw = rd.read_signed(11)?;
                            (if raw == -1024 { None } else { Some(raw as i16) }, 0)
                        }
                        BiasKind::Phase => {
                            let raw = rd.read_signed(11)?;
                            let disc = rd.read(2)? as u8;
                            (if raw == -1024 { None } else { Some(raw as i16) }, disc)
                        }
                    };
                    entries.push(BiasEntry {
                        signal,
                        value,
                        discontinuity,
                    });
                }
                sats.push(SatBiases {
                    prn: mask.sat_id(sat),
                    entries,
                });
            }
            systems.push((mask.sys_id, sats));
        }
        Some(Biases {
            validity_idx,
            systems,
        })
    }

    pub fn get(&self, sys_id: u8) -> Option<&[SatBiases]> {
        self.systems
            .iter()
            .find(|(id, _)| *id == sys_id)
            .map(|(_, sats)| sats.as_slice())
    }
}

/// Everything one HAS message contributed, with masks resolved
#[derive(Clone, Debug)]
pub struct Ssr {
    pub header: Header,
    pub masks: Masks,
    pub orbits: Option<Orbits>,
    pub clock_full: Option<ClockFull>,
    pub clock_sub: Option<ClockSub>,
    pub code_biases: Option<Biases>,
    pub phase_biases: Option<Biases>,
}

/// Stateful HAS payload parser
///
/// Owns the two 32-slot cross-message memories. Messages that reference
/// an empty mask or IOD slot are discarded, matching the broadcast
/// semantics: such content is only meaningful to receivers that saw the
/// earlier messages.
pub struct SsrParser {
    masks_mem: Vec<Option<Masks>>,
    iods_mem: Vec<Option<Vec<(u8, Vec<u16>)>>>,
}

impl Default for SsrParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SsrParser {
    pub fn new() -> SsrParser {
        SsrParser {
            masks_mem: (0..32).map(|_| None).collect(),
            iods_mem: (0..32).map(|_| None).collect(),
        }
    }

    /// Parse one decoded HAS message (mS·53 bytes). Returns `None` when
    /// the message is truncated, malformed, or references unavailable
    /// mask/IOD state.
    pub fn parse(&mut self, bytes: &[u8]) -> Option<Ssr> {
        let mut rd = BitReader::new(bytes);
        let header = Header::parse(&mut rd)?;
        let mask_slot = header.mask_id as usize;

        if header.content.mask {
            let masks = Masks::parse(&mut rd)?;
            self.masks_mem[mask_slot] = Some(masks);
        } else if self.masks_mem[mask_slot].is_none() {
            debug!(
                "mask {} not available, message discarded",
                header.mask_id
            );
            return None;
        }
        if !header.content.orb && self.iods_mem[header.iod_set_id as usize].is_none() {
            debug!(
                "IOD set {} not available, message discarded",
                header.iod_set_id
            );
            return None;
        }

        let masks = match self.masks_mem[mask_slot].as_mut() {
            Some(m) => m,
            None => return None,
        };

        let mut orbits = None;
        if header.content.orb {
            let block = Orbits::parse(&mut rd, masks)?;
            self.iods_mem[header.iod_set_id as usize] = Some(block.iods());
            orbits = Some(block);
        }
        let mut clock_full = None;
        if header.content.clock_full {
            clock_full = Some(ClockFull::parse(&mut rd, masks)?);
        }
        let mut clock_sub = None;
        if header.content.clock_sub {
            clock_sub = Some(ClockSub::parse(&mut rd, masks)?);
        }
        let mut code_biases = None;
        if header.content.code_bias {
            code_biases = Some(Biases::parse(&mut rd, masks, BiasKind::Code)?);
        }
        let mut phase_biases = None;
        if header.content.phase_bias {
            phase_biases = Some(Biases::parse(&mut rd, masks, BiasKind::Phase)?);
        }

        Some(Ssr {
            header,
            masks: masks.clone(),
            orbits,
            clock_full,
            clock_sub,
            code_biases,
            phase_biases,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn write_header(wr: &mut BitWriter, toh: u32, content: u32, mask_id: u32, iod_set: u32) {
        wr.write(toh, 12);
        wr.write(content, 6);
        wr.write(0, 4);
        wr.write(mask_id, 5);
        wr.write(iod_set, 5);
    }

    /// GAL mask: PRNs 1, 3, 4; signals 0 and 2; no cell mask
    fn write_gal_mask(wr: &mut BitWriter) {
        wr.write(1, 4); // one system
        wr.write(u32::from(SYS_GAL), 4);
        wr.write(0b1011, 4); // sat mask bits 0,2,3 ...
        wr.write(0, 32); // ... of 40
        wr.write(0, 4);
        wr.write(0b1010_0000_0000_0000, 16); // signals 0 and 2
        wr.write_bool(false); // no cell mask
        wr.write(0, 3); // nav message
        wr.write(0, 6); // reserved
    }

    #[test]
    fn mask_only_message() {
        let mut wr = BitWriter::new();
        write_header(&mut wr, 300, 0b100000, 2, 0);
        write_gal_mask(&mut wr);
        wr.pad_to_byte();

        let mut parser = SsrParser::new();
        let ssr = parser.parse(wr.as_bytes()).unwrap();
        assert_eq!(ssr.header.toh, 300);
        assert!(ssr.header.content.mask);
        let mask = ssr.masks.get(SYS_GAL).unwrap();
        assert_eq!(mask.nsat(), 3);
        assert_eq!(mask.nsig(), 2);
        assert_eq!(mask.sat_id(0), 1);
        assert_eq!(mask.sat_id(1), 3);
        assert_eq!(mask.sat_id(2), 4);
        assert_eq!(mask.sig_id(0), 0);
        assert_eq!(mask.sig_id(1), 2);
        assert!(ssr.orbits.is_none());
    }

    #[test]
    fn orbit_and_clock_with_dnu() {
        let mut wr = BitWriter::new();
        write_header(&mut wr, 100, 0b111000, 0, 5);
        write_gal_mask(&mut wr);
        // orbits: validity + 3 sats (GAL: 10-bit IOD)
        wr.write(3, 4);
        for (iod, rad) in &[(10u32, 5i32), (11, -4096), (12, 2)] {
            wr.write(*iod, 10);
            wr.write_signed(*rad, 13);
            wr.write_signed(7, 12);
            wr.write_signed(-7, 12);
        }
        // full clocks: validity, multiplier, 3 values (last one DNU)
        wr.write(1, 4);
        wr.write(1, 2); // multiplier 2
        wr.write_signed(100, 13);
        wr.write_signed(-4096, 13); // N/A
        wr.write_signed(4095, 13); // DNU
        wr.pad_to_byte();

        let mut parser = SsrParser::new();
        let ssr = parser.parse(wr.as_bytes()).unwrap();

        let orbits = ssr.orbits.as_ref().unwrap();
        let sats = orbits.get(SYS_GAL).unwrap();
        assert_eq!(sats[0].iod, 10);
        assert_eq!(sats[0].rad, Some(5));
        assert_eq!(sats[0].in_track, Some(7));
        assert_eq!(sats[0].cross_track, Some(-7));
        assert!(sats[1].rad.is_none());
        assert!(!sats[1].complete());

        let (mult, clocks) = ssr.clock_full.as_ref().unwrap().get(SYS_GAL).unwrap();
        assert_eq!(mult, 2);
        assert_eq!(clocks[0], ClockValue::Value(100));
        assert_eq!(clocks[1], ClockValue::NotAvailable);
        assert_eq!(clocks[2], ClockValue::DoNotUse);

        // the DNU sentinel must be visible in the resolved mask
        let mask = ssr.masks.get(SYS_GAL).unwrap();
        assert!(!mask.is_dnu(0));
        assert!(!mask.is_dnu(1));
        assert!(mask.is_dnu(2));
    }

    #[test]
    fn clock_only_message_needs_both_memories() {
        let mut parser = SsrParser::new();

        // clock-only message with empty memories: discarded
        let mut wr = BitWriter::new();
        write_header(&mut wr, 200, 0b001000, 2, 5);
        wr.write(1, 4);
        wr.write(0, 2);
        for _ in 0..3 {
            wr.write_signed(1, 13);
        }
        wr.pad_to_byte();
        let clock_only = wr.as_bytes().to_vec();
        assert!(parser.parse(&clock_only).is_none());

        // seed mask 2 and IOD set 5
        let mut wr = BitWriter::new();
        write_header(&mut wr, 100, 0b110000, 2, 5);
        write_gal_mask(&mut wr);
        wr.write(3, 4);
        for _ in 0..3 {
            wr.write(1, 10);
            wr.write_signed(1, 13);
            wr.write_signed(1, 12);
            wr.write_signed(1, 12);
        }
        wr.pad_to_byte();
        assert!(parser.parse(wr.as_bytes()).is_some());

        // now the same clock-only message parses against the memories
        let ssr = parser.parse(&clock_only).unwrap();
        let (mult, clocks) = ssr.clock_full.as_ref().unwrap().get(SYS_GAL).unwrap();
        assert_eq!(mult, 1);
        assert_eq!(clocks.len(), 3);
        assert_eq!(ssr.masks.get(SYS_GAL).unwrap().nsat(), 3);
    }

    #[test]
    fn clock_subset_tracks_prns() {
        let mut wr = BitWriter::new();
        write_header(&mut wr, 100, 0b100100, 0, 0);
        write_gal_mask(&mut wr);
        // subset: validity, 1 system, submask 011 -> PRNs 3 and 4
        wr.write(2, 4);
        wr.write(1, 4);
        wr.write(u32::from(SYS_GAL), 4);
        wr.write(0, 2); // multiplier 1
        wr.write(0b011, 3);
        wr.write_signed(40, 13);
        wr.write_signed(4095, 13); // DNU on PRN 4
        wr.pad_to_byte();

        let mut parser = SsrParser::new();
        // clock_sub alone is gated on the IOD memory; seed it via an
        // orbit-carrying message first
        let mut seed = BitWriter::new();
        write_header(&mut seed, 90, 0b110000, 0, 0);
        write_gal_mask(&mut seed);
        seed.write(3, 4);
        for _ in 0..3 {
            seed.write(1, 10);
            seed.write_signed(1, 13);
            seed.write_signed(1, 12);
            seed.write_signed(1, 12);
        }
        seed.pad_to_byte();
        assert!(parser.parse(seed.as_bytes()).is_some());

        let ssr = parser.parse(wr.as_bytes()).unwrap();
        let sub = ssr.clock_sub.as_ref().unwrap().get(SYS_GAL).unwrap();
        assert_eq!(sub.prns, vec![3, 4]);
        assert_eq!(sub.values[0], ClockValue::Value(40));
        assert_eq!(sub.values[1], ClockValue::DoNotUse);
        assert!(ssr.masks.get(SYS_GAL).unwrap().is_dnu(2));
    }

    #[test]
    fn biases_follow_cell_mask() {
        let mut wr = BitWriter::new();
        write_header(&mut wr, 100, 0b100011, 0, 0);
        // mask with a cell mask: 2 sats (PRN 1, 2), 2 signals (0, 2),
        // cells: sat0 both signals, sat1 only signal 2
        wr.write(1, 4);
        wr.write(u32::from(SYS_GAL), 4);
        wr.write(0b11, 2);
        wr.write(0, 32);
        wr.write(0, 6);
        wr.write(0b1010_0000_0000_0000, 16);
        wr.write_bool(true);
        wr.write(0b11, 2); // sat 0 cells
        wr.write(0b01, 2); // sat 1 cells
        wr.write(0, 3);
        wr.write(0, 6);
        // code biases: validity + 3 cells
        wr.write(0, 4);
        wr.write_signed(10, 11);
        wr.write_signed(-1024, 11); // N/A
        wr.write_signed(-3, 11);
        // phase biases: validity + 3 cells with discontinuity bits
        wr.write(0, 4);
        wr.write_signed(5, 11);
        wr.write(1, 2);
        wr.write_signed(6, 11);
        wr.write(2, 2);
        wr.write_signed(7, 11);
        wr.write(3, 2);
        wr.pad_to_byte();

        let mut parser = SsrParser::new();
        // gate needs an IOD set; use slot 0 seeded by an orbit message
        let mut seed = BitWriter::new();
        write_header(&mut seed, 90, 0b110000, 0, 0);
        write_gal_mask(&mut seed);
        seed.write(3, 4);
        for _ in 0..3 {
            seed.write(1, 10);
            seed.write_signed(1, 13);
            seed.write_signed(1, 12);
            seed.write_signed(1, 12);
        }
        seed.pad_to_byte();
        assert!(parser.parse(seed.as_bytes()).is_some());

        let ssr = parser.parse(wr.as_bytes()).unwrap();
        let code = ssr.code_biases.as_ref().unwrap().get(SYS_GAL).unwrap();
        assert_eq!(code.len(), 2);
        assert_eq!(code[0].prn, 1);
        assert_eq!(code[0].entries.len(), 2);
        assert_eq!(code[0].entries[0].signal, 0);
        assert_eq!(code[0].entries[0].value, Some(10));
        assert_eq!(code[0].entries[1].signal, 2);
        assert_eq!(code[0].entries[1].value, None);
        assert_eq!(code[1].prn, 2);
        assert_eq!(code[1].entries.len(), 1);
        assert_eq!(code[1].entries[0].signal, 2);
        assert_eq!(code[1].entries[0].value, Some(-3));

        let phase = ssr.phase_biases.as_ref().unwrap().get(SYS_GAL).unwrap();
        assert_eq!(phase[0].entries[0].value, Some(5));
        assert_eq!(phase[0].entries[0].discontinuity, 1);
        assert_eq!(phase[1].entries[0].value, Some(7));
        assert_eq!(phase[1].entries[0].discontinuity, 3);
    }
}

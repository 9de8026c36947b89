//! RTCM3-SSR message generation
//!
//! Message numbers are `base + type` with base 1056 for GPS and 1239 for
//! Galileo (SSR1 orbit, SSR2 clock, SSR3 code bias, SSR4 combined, SSR6
//! high-rate clock), plus the later phase-bias message types 1265 (GPS)
//! and 1267 (Galileo).
//!
//! RTCM orbit deltas use the opposite sign convention to HAS, so all
//! three components are negated on the way out. Clock corrections keep
//! their sign.
//!
//! Ref: RTCM standard 10403.3, SSR messages

use crate::bits::BitWriter;

use super::encode::{
    clock_units, clock_validities, code_bias_units, orbit_radial_units, orbit_track_units,
    paginate, phase_bias_units, resolve_clocks, signal_id, udi_index, wavelength_mm,
    CorrectionUnavailable, System, IOD_SSR, PROVIDER_ID,
};
use super::{ClockValue, SatOrbit, Ssr};

/// Message number for the numbered SSR types (1, 2, 3, 4, 6)
fn message_number(sys: System, msg: u32) -> u32 {
    let base = match sys {
        System::Gps => 1056,
        System::Gal => 1239,
    };
    base + msg
}

/// Message number for the phase-bias message
fn phase_message_number(sys: System) -> u32 {
    match sys {
        System::Gps => 1265,
        System::Gal => 1267,
    }
}

/// Header length in bits per SSR type ("p" = phase bias)
fn header_bits(msg: u32) -> usize {
    match msg {
        1 | 4 => 68, // + ITRF datum bit
        _ => 67,
    }
}

const PHASE_HEADER_BITS: usize = 69; // + dispersive-bias and MW bits

fn common_header(
    number: u32,
    datum: bool,
    epoch: u32,
    udi: u32,
    multiple: bool,
    nsat: usize,
) -> BitWriter {
    let mut h = BitWriter::new();
    h.write(number, 12);
    h.write(epoch, 20);
    h.write(udi, 4);
    h.write_bool(multiple); // synchronous / multiple message flag
    if datum {
        h.write(0, 1); // ITRF, the Galileo reference datum
    }
    h.write(IOD_SSR, 4);
    h.write(PROVIDER_ID, 16);
    h.write(1, 4); // solution ID: the one HAS service
    h.write(nsat as u32, 6);
    h
}

/// 20-bit SSR epoch: receiver ToW snapped onto the HAS time-of-hour,
/// never moving forward past the receiver time
fn epoch_tow(tow: f64, toh: u32) -> u32 {
    let mut tow_h = (tow / 3600.0).floor() as i64;
    if (tow_h * 3600 + i64::from(toh)) as f64 > tow {
        tow_h -= 1;
    }
    ((tow_h * 3600 + i64::from(toh)) & 0xfffff) as u32
}

/// HAS → RTCM sign convention flip, plus the scale translation
fn write_orbit(body: &mut BitWriter, orb: &SatOrbit) {
    body.write_signed(-orbit_radial_units(orb.rad.unwrap_or(0)), 22);
    body.write_signed(-orbit_track_units(orb.in_track.unwrap_or(0)), 20);
    body.write_signed(-orbit_track_units(orb.cross_track.unwrap_or(0)), 20);
}

/// 8-bit IOD for GPS, full 10-bit IODE for Galileo
fn write_iode(body: &mut BitWriter, sys: System, iod: u16) {
    match sys {
        System::Gps => body.write(u32::from(iod) & 0xff, 8),
        System::Gal => body.write(u32::from(iod), 10),
    }
}

/// SSR1: orbit corrections
pub fn orbit(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let sys_id = sys.sys_id();
    let orbits = ssr.orbits.as_ref().ok_or(CorrectionUnavailable("orbit"))?;
    let sats = orbits.get(sys_id).ok_or(CorrectionUnavailable("orbit"))?;
    let mask = ssr.masks.get(sys_id).ok_or(CorrectionUnavailable("orbit"))?;

    let mut body = BitWriter::new();
    let mut nsat = 0;
    for (i, orb) in sats.iter().enumerate() {
        if !orb.complete() || mask.is_dnu(i) {
            continue;
        }
        body.write(u32::from(mask.sat_id(i)), 6);
        write_iode(&mut body, sys, orb.iod);
        write_orbit(&mut body, orb);
        body.write_zeros(59); // orbit dot terms
        nsat += 1;
    }
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&[orbits.validity_idx], lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = message_number(sys, 1);
    Ok(paginate(&body, header_bits(1), |multiple| {
        common_header(number, true, epoch, udi, multiple, nsat)
    }))
}

fn clock_body(
    sys: System,
    ssr: &Ssr,
    high_rate: bool,
) -> Result<(BitWriter, usize), CorrectionUnavailable> {
    let entries = resolve_clocks(ssr, sys)?;
    let mut body = BitWriter::new();
    let mut nsat = 0;
    for e in &entries {
        let raw = match e.value {
            ClockValue::Value(v) => v,
            _ => continue,
        };
        body.write(u32::from(e.prn), 6);
        body.write_signed(clock_units(raw, e.mult), 22);
        if !high_rate {
            body.write_zeros(48); // C1, C2
        }
        nsat += 1;
    }
    Ok((body, nsat))
}

/// SSR2: clock corrections
pub fn clock(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let (body, nsat) = clock_body(sys, ssr, false)?;
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&clock_validities(ssr), lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = message_number(sys, 2);
    Ok(paginate(&body, header_bits(2), |multiple| {
        common_header(number, false, epoch, udi, multiple, nsat)
    }))
}

/// SSR3: code biases
pub fn code_bias(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let sys_id = sys.sys_id();
    let biases = ssr
        .code_biases
        .as_ref()
        .ok_or(CorrectionUnavailable("code bias"))?;
    let sats = biases.get(sys_id).ok_or(CorrectionUnavailable("code bias"))?;
    let mask = ssr
        .masks
        .get(sys_id)
        .ok_or(CorrectionUnavailable("code bias"))?;

    let mut body = BitWriter::new();
    let mut nsat = 0;
    for (i, sat) in sats.iter().enumerate() {
        let emit: Vec<(u32, i32)> = sat
            .entries
            .iter()
            .filter_map(|e| {
                let raw = e.value?;
                let sig = signal_id(sys, e.signal)?;
                Some((sig, code_bias_units(raw)))
            })
            .collect();
        if emit.is_empty() || mask.is_dnu(i) {
            continue;
        }
        body.write(u32::from(sat.prn), 6);
        body.write(emit.len() as u32, 5);
        for (sig, units) in emit {
            body.write(sig, 5);
            body.write_signed(units, 14);
        }
        nsat += 1;
    }
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&[biases.validity_idx], lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = message_number(sys, 3);
    Ok(paginate(&body, header_bits(3), |multiple| {
        common_header(number, false, epoch, udi, multiple, nsat)
    }))
}

/// SSR4: combined orbit and clock corrections
pub fn combined(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let sys_id = sys.sys_id();
    let orbits = ssr.orbits.as_ref().ok_or(CorrectionUnavailable("orbit"))?;
    let sats = orbits.get(sys_id).ok_or(CorrectionUnavailable("orbit"))?;
    let entries = resolve_clocks(ssr, sys)?;

    let mut body = BitWriter::new();
    let mut nsat = 0;
    for e in &entries {
        let raw = match e.value {
            ClockValue::Value(v) => v,
            _ => continue,
        };
        let orb = match sats.get(e.ordinal) {
            Some(o) if o.complete() => o,
            _ => continue,
        };
        body.write(u32::from(e.prn), 6);
        write_iode(&mut body, sys, orb.iod);
        write_orbit(&mut body, orb);
        body.write_zeros(59);
        body.write_signed(clock_units(raw, e.mult), 22);
        body.write_zeros(48);
        nsat += 1;
    }
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let mut validities = vec![orbits.validity_idx];
    validities.extend(clock_validities(ssr));
    let udi = udi_index(&validities, lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = message_number(sys, 4);
    Ok(paginate(&body, header_bits(4), |multiple| {
        common_header(number, true, epoch, udi, multiple, nsat)
    }))
}

/// SSR6: high-rate clock corrections
pub fn hr_clock(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let (body, nsat) = clock_body(sys, ssr, true)?;
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&clock_validities(ssr), lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = message_number(sys, 6);
    Ok(paginate(&body, header_bits(6), |multiple| {
        common_header(number, false, epoch, udi, multiple, nsat)
    }))
}

/// MT 1265/1267: phase biases
pub fn phase_bias(
    sys: System,
    ssr: &Ssr,
    tow: f64,
    lower_udi: bool,
) -> Result<Vec<Vec<u8>>, CorrectionUnavailable> {
    let sys_id = sys.sys_id();
    let biases = ssr
        .phase_biases
        .as_ref()
        .ok_or(CorrectionUnavailable("phase bias"))?;
    let sats = biases
        .get(sys_id)
        .ok_or(CorrectionUnavailable("phase bias"))?;
    let mask = ssr
        .masks
        .get(sys_id)
        .ok_or(CorrectionUnavailable("phase bias"))?;

    let mut body = BitWriter::new();
    let mut nsat = 0;
    for (i, sat) in sats.iter().enumerate() {
        let emit: Vec<(u32, u8, i32)> = sat
            .entries
            .iter()
            .filter_map(|e| {
                let raw = e.value?;
                let sig = signal_id(sys, e.signal)?;
                let wl = wavelength_mm(sys, e.signal)?;
                Some((sig, e.discontinuity, phase_bias_units(raw, wl)))
            })
            .collect();
        if emit.is_empty() || mask.is_dnu(i) {
            continue;
        }
        body.write(u32::from(sat.prn), 6);
        body.write(emit.len() as u32, 5);
        body.write_zeros(17); // yaw angle + yaw rate
        for (sig, disc, units) in emit {
            body.write(sig, 5);
            body.write_zeros(3); // integer + wide-lane indicators
            body.write(u32::from(disc), 4);
            body.write_signed(units, 20);
        }
        nsat += 1;
    }
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&[biases.validity_idx], lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    let number = phase_message_number(sys);
    Ok(paginate(&body, PHASE_HEADER_BITS, |multiple| {
        let mut h = common_header(number, false, epoch, udi, multiple, nsat);
        h.write(0, 2); // dispersive bias / MW consistency
        h
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitReader;
    use crate::crc::crc24q;
    use crate::ssr::tests_support::{ssr_with_orbit_and_clock, GPS_PRNS};
    use crate::ssr::{BiasEntry, Biases, SatBiases, SubClockSystem, SYS_GPS};

    #[test]
    fn ssr1_flips_orbit_signs() {
        let ssr = ssr_with_orbit_and_clock();
        let pages = orbit(System::Gps, &ssr, 1000.0, true).unwrap();
        assert_eq!(pages.len(), 1);
        let frame = &pages[0];
        let crc = crc24q(&frame[..frame.len() - 3]);
        let trailer = (u32::from(frame[frame.len() - 3]) << 16)
            | (u32::from(frame[frame.len() - 2]) << 8)
            | u32::from(frame[frame.len() - 1]);
        assert_eq!(crc, trailer);

        let payload = &frame[3..frame.len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1057)); // GPS orbit
        rd.skip(20).unwrap(); // epoch
        rd.read(4).unwrap(); // udi
        assert_eq!(rd.read_bool(), Some(false)); // single message
        assert_eq!(rd.read(1), Some(0)); // ITRF
        assert_eq!(rd.read(4), Some(1)); // IOD SSR
        assert_eq!(rd.read(16), Some(270));
        assert_eq!(rd.read(4), Some(1)); // solution ID
        assert_eq!(rd.read(6), Some(2));

        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[0])));
        // GPS IODE is masked to 8 bits
        assert_eq!(rd.read(8), Some(0x23));
        // +2 radial quanta (0.005 m) flip to -50 units of 0.0001 m
        assert_eq!(rd.read_signed(22), Some(-50));
        assert_eq!(rd.read_signed(20), Some(-60));
        assert_eq!(rd.read_signed(20), Some(80));
    }

    #[test]
    fn galileo_keeps_ten_iode_bits() {
        let mut ssr = ssr_with_orbit_and_clock();
        // rebrand the single test system as Galileo
        ssr.masks.gnss[0].sys_id = crate::ssr::SYS_GAL;
        ssr.orbits.as_mut().unwrap().systems[0].0 = crate::ssr::SYS_GAL;
        ssr.clock_full.as_mut().unwrap().systems[0].0 = crate::ssr::SYS_GAL;

        let pages = orbit(System::Gal, &ssr, 1000.0, true).unwrap();
        let payload = &pages[0][3..pages[0].len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1240)); // Galileo orbit
        rd.skip(20 + 4 + 1 + 1 + 4 + 16 + 4 + 6).unwrap();
        rd.skip(6).unwrap(); // PRN
        assert_eq!(rd.read(10), Some(0x123)); // full IODE
    }

    #[test]
    fn ssr2_carries_scaled_clock() {
        let ssr = ssr_with_orbit_and_clock();
        let pages = clock(System::Gps, &ssr, 1000.0, true).unwrap();
        let payload = &pages[0][3..pages[0].len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1058));
        rd.skip(20 + 4 + 1 + 4 + 16 + 4).unwrap();
        assert_eq!(rd.read(6), Some(2));
        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[0])));
        // 40 quanta * multiplier 2 * 25, sign preserved
        assert_eq!(rd.read_signed(22), Some(2000));
        rd.skip(48).unwrap();
        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[1])));
    }

    #[test]
    fn clock_subset_feeds_ssr6() {
        let mut ssr = ssr_with_orbit_and_clock();
        ssr.clock_full = None;
        ssr.clock_sub = Some(crate::ssr::ClockSub {
            validity_idx: 1,
            systems: vec![SubClockSystem {
                sys_id: SYS_GPS,
                mult: 1,
                values: vec![ClockValue::Value(-8)],
                prns: vec![GPS_PRNS[1]],
                ordinals: vec![1],
            }],
        });
        let pages = hr_clock(System::Gps, &ssr, 1000.0, true).unwrap();
        let payload = &pages[0][3..pages[0].len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1062));
        rd.skip(20 + 4 + 1 + 4 + 16 + 4).unwrap();
        assert_eq!(rd.read(6), Some(1));
        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[1])));
        assert_eq!(rd.read_signed(22), Some(-200));
        // high-rate clock: no C1/C2 filler follows, only frame padding
        assert!(rd.remaining() < 8);
    }

    #[test]
    fn phase_bias_message_numbers_and_fields() {
        let mut ssr = ssr_with_orbit_and_clock();
        ssr.phase_biases = Some(Biases {
            validity_idx: 0,
            systems: vec![(
                SYS_GPS,
                vec![
                    SatBiases {
                        prn: GPS_PRNS[0],
                        entries: vec![BiasEntry {
                            signal: 0,
                            value: Some(3),
                            discontinuity: 2,
                        }],
                    },
                    SatBiases {
                        prn: GPS_PRNS[1],
                        entries: vec![BiasEntry {
                            // HAS signal 1 has no GPS mapping: dropped
                            signal: 1,
                            value: Some(3),
                            discontinuity: 0,
                        }],
                    },
                ],
            )],
        });
        let pages = phase_bias(System::Gps, &ssr, 1000.0, true).unwrap();
        let payload = &pages[0][3..pages[0].len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1265));
        rd.skip(20 + 4 + 1 + 4 + 16 + 4).unwrap();
        // only the mappable satellite survives
        assert_eq!(rd.read(6), Some(1));
        rd.skip(2).unwrap(); // dispersive / MW
        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[0])));
        assert_eq!(rd.read(5), Some(1)); // one bias
        rd.skip(17).unwrap(); // yaw
        assert_eq!(rd.read(5), Some(0)); // L1 C/A
        rd.skip(3).unwrap();
        assert_eq!(rd.read(4), Some(2)); // discontinuity
        // 3 quanta on the 190 mm carrier
        assert_eq!(rd.read_signed(20), Some(57));
    }

    #[test]
    fn code_bias_drops_na_and_unmapped() {
        let mut ssr = ssr_with_orbit_and_clock();
        ssr.code_biases = Some(Biases {
            validity_idx: 5,
            systems: vec![(
                SYS_GPS,
                vec![
                    SatBiases {
                        prn: GPS_PRNS[0],
                        entries: vec![
                            BiasEntry {
                                signal: 0,
                                value: Some(-7),
                                discontinuity: 0,
                            },
                            BiasEntry {
                                signal: 0,
                                value: None, // N/A sentinel
                                discontinuity: 0,
                            },
                        ],
                    },
                    SatBiases {
                        prn: GPS_PRNS[1],
                        entries: vec![],
                    },
                ],
            )],
        });
        let pages = code_bias(System::Gps, &ssr, 1000.0, true).unwrap();
        let payload = &pages[0][3..pages[0].len() - 3];
        let mut rd = BitReader::new(payload);
        assert_eq!(rd.read(12), Some(1059));
        rd.skip(20 + 4 + 1 + 4 + 16 + 4).unwrap();
        assert_eq!(rd.read(6), Some(1));
        assert_eq!(rd.read(6), Some(u32::from(GPS_PRNS[0])));
        assert_eq!(rd.read(5), Some(1));
        assert_eq!(rd.read(5), Some(0));
        assert_eq!(rd.read_signed(14), Some(-14));
    }

    #[test]
    fn rtcm_epoch_never_runs_ahead() {
        // receiver at 2:00:10, correction stamped at 59 min: previous hour
        assert_eq!(epoch_tow(2.0 * 3600.0 + 10.0, 3540), 3600 + 3540);
        // correction stamped just behind the receiver: same hour
        assert_eq!(epoch_tow(2.0 * 3600.0 + 100.0, 50), 2 * 3600 + 50);
    }
}

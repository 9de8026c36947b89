//! IGS-SSR message generation
//!
//! All IGS SSR messages share RTCM message number 4076 and are told
//! apart by an 8-bit sub-type: `20·system + message`, with system bases
//! GPS = 1 and Galileo = 3 (these are IGS numbering keys, distinct from
//! the HAS stream's system keys 0 and 2). The messages produced here:
//!
//! * IGM01 orbit, IGM02 clock, IGM03 combined orbit+clock
//! * IGM04 high-rate clock
//! * IGM05 code bias, IGM06 phase bias
//!
//! HAS does not transmit clock derivatives, orbit dot terms, yaw or the
//! phase integer indicators; those fields are zero-filled.
//!
//! Ref: IGS State Space Representation format v1.00

use crate::bits::BitWriter;

use super::encode::{
    clock_units, clock_validities, code_bias_units, orbit_radial_units, orbit_track_units,
    paginate, phase_bias_units, resolve_clocks, signal_id, udi_index, wavelength_mm,
    CorrectionUnavailable, System, IOD_SSR, PROVIDER_ID,
};
use super::{ClockValue, SatOrbit, Ssr};

const MESSAGE_NUMBER: u32 = 4076;
const VERSION: u32 = 1;

/// IGS sub-type base per constellation (not the HAS system key)
fn subtype_base(sys: System) -> u32 {
    match sys {
        System::Gps => 1,
        System::Gal => 3,
    }
}

/// Header length in bits per IGS message number
fn header_bits(msg: u32) -> usize {
    match msg {
        1 | 3 => 79, // + global/regional CRS bit
        6 => 80,     // + dispersive-bias and MW consistency bits
        _ => 78,
    }
}

fn common_header(
    sys: System,
    msg: u32,
    epoch: u32,
    udi: u32,
    multiple: bool,
    nsat: usize,
) -> BitWriter {
    let mut h = BitWriter::new();
    h.write(MESSAGE_NUMBER, 12);
    h.write(VERSION, 3);
    h.write(subtype_base(sys) * 20 + msg, 8);
    h.write(epoch, 20);
    h.write(udi, 4);
    h.write_bool(multiple);
    h.write(IOD_SSR, 4);
    h.write(PROVIDER_ID, 16);
    h.write(0, 4); // solution ID
    match msg {
        1 | 3 => h.write(0, 1), // global CRS
        6 => h.write(0, 2),     // dispersive bias / MW consistency
        _ => {}
    }
    h.write(nsat as u32, 6);
    h
}

/// 20-bit SSR epoch: the receiver ToW snapped onto the HAS time-of-hour.
/// When the message is read early in an hour but refers to the end of
/// one, the previous hour is meant.
fn epoch_tow(tow: f64, toh: u32) -> u32 {
    let mut tow_h = (tow / 3600.0).floor() as i64;
    if (tow % 3600.0) / 60.0 <= 10.0 && f64::from(toh) / 60.0 >= 50.0 {
        tow_h -= 1;
    }
    ((tow_h * 3600 + i64::from(toh)) & 0xfffff) as u32
}

fn write_orbit(body: &mut BitWriter, orb: &SatOrbit) {
    body.write_signed(orbit_radial_units(orb.rad.unwrap_or(0)), 22);
    body.write_signed(orbit_track_units(orb.in_track.unwrap_or(0)), 20);
    body.write_signed(orbit_track_units(orb.cross_track.unwrap_or(0)), 20);
}

/// IGM01: orbit corrections
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
        body.write(u32::from(orb.iod) & 0xff, 8);
        write_orbit(&mut body, orb);
        body.write_zeros(59); // orbit dot terms
        nsat += 1;
    }
    if nsat == 0 {
        return Ok(Vec::new());
    }
    let udi = udi_index(&[orbits.validity_idx], lower_udi);
    let epoch = epoch_tow(tow, ssr.header.toh);
    Ok(paginate(&body, header_bits(1), |multiple| {
        common_header(sys, 1, epoch, udi, multiple, nsat)
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

/// IGM02: clock corrections
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
    Ok(paginate(&body, header_bits(2), |multiple| {
        common_header(sys, 2, epoch, udi, multiple, nsat)
    }))
}

/// IGM03: combined orbit and clock corrections
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
        body.write(u32::from(orb.iod) & 0xff, 8);
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
    Ok(paginate(&body, header_bits(3), |multiple| {
        common_header(sys, 3, epoch, udi, multiple, nsat)
    }))
}

/// IGM04: high-rate clock corrections
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
    Ok(paginate(&body, header_bits(4), |multiple| {
        common_header(sys, 4, epoch, udi, multiple, nsat)
    }))
}

/// IGM05: code biases
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
    Ok(paginate(&body, header_bits(5), |multiple| {
        common_header(sys, 5, epoch, udi, multiple, nsat)
    }))
}

/// IGM06: phase biases
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
            body.write_zeros(3); // signal integer + wide-lane indicators
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
    Ok(paginate(&body, header_bits(6), |multiple| {
        common_header(sys, 6, epoch, udi, multiple, nsat)
    }))
}

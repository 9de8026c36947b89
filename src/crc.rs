/// Calculates the CRC-24Q used by RTCM3 framing
///
/// Generator polynominal 0x864CFB ("Qualcomm" CRC-24), initial value 0,
/// no reflection, no final xor. Every emitted RTCM/IGS frame carries this
/// over preamble + length + payload.
///
/// Described in RTCM standard 10403.3
pub fn crc24q(data: &[u8]) -> u32 {
    let mut crc = crc_any::CRC::create_crc(0x86_4cfb, 24, 0, 0, false);
    crc.digest(data);
    crc.get_crc() as u32
}

/// Calculates the CRC-32 that Novatel ASCII logs carry after the `*`
///
/// Bit-reflected polynomial 0xEDB88320, initial value 0, no final xor.
/// This is *not* the ISO 3309 CRC-32 (that one inverts in and out).
pub fn crc32_novatel(data: &[u8]) -> u32 {
    let mut crc = crc_any::CRC::create_crc(0xedb8_8320, 32, 0, 0, true);
    crc.digest(data);
    crc.get_crc() as u32
}

/// precomputes the CRC table as a constant!
const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// CRC-16 used by Modbus RTU (polynomial 0xA001 reflected, seed 0xFFFF)
///
/// The checksum is transmitted little-endian after the frame body.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}

/// LRC-8 used by Modbus ASCII: the two's complement of the sum of the decoded bytes
pub fn lrc8(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

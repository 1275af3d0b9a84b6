// Page checksum
//
// CRC-32 with polynomial 0x04c11db7, zero initial value, no final XOR,
// processed most-significant bit first.

const OGG_CRC_POLYNOMIAL: u32 = 0x04c1_1db7;

const fn table_entry(index: u32) -> u32 {
    let mut r = index << 24;
    let mut i = 0;
    while i < 8 {
        r = if r & 0x8000_0000 != 0 {
            (r << 1) ^ OGG_CRC_POLYNOMIAL
        } else {
            r << 1
        };
        i += 1;
    }
    r
}

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = table_entry(i as u32);
        i += 1;
    }
    table
}

/// 256-entry lookup table for the page checksum
pub static CRC_LOOKUP: [u32; 256] = build_table();

/// Fold data into a running checksum (start with 0)
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &byte| {
        (crc << 8) ^ CRC_LOOKUP[(((crc >> 24) as u8) ^ byte) as usize]
    })
}

/// Checksum of a single buffer
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}

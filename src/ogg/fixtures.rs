// Helpers for building test streams

use crate::ogg::crc::crc32;
use crate::ogg::splice::paginate;
use crate::ogg::{OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_EOS};

/// Encode a page with an explicit segment table
pub fn raw_page(
    serial: u32,
    sequence: u32,
    header_type: u8,
    granule: u64,
    segments: &[u8],
    data: &[u8],
) -> Vec<u8> {
    assert_eq!(segments.iter().map(|&v| v as usize).sum::<usize>(), data.len());
    let mut buf = Vec::new();
    buf.extend_from_slice(b"OggS");
    buf.push(0);
    buf.push(header_type);
    buf.extend_from_slice(&granule.to_le_bytes());
    buf.extend_from_slice(&serial.to_le_bytes());
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&[0; 4]);
    buf.push(segments.len() as u8);
    buf.extend_from_slice(segments);
    buf.extend_from_slice(data);
    let crc = crc32(&buf);
    buf[22..26].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Encode packets as one logical stream, each packet starting a fresh page.
///
/// Packet i completes with granule position i.
pub fn build_stream(serial: u32, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut sequence = 0;
    for (i, packet) in packets.iter().enumerate() {
        let mut first_flags = 0;
        let mut last_flags = 0;
        if i == 0 {
            first_flags |= OGG_HEADER_TYPE_BOS;
        }
        if i == packets.len() - 1 {
            last_flags |= OGG_HEADER_TYPE_EOS;
        }
        let pages = paginate(packet, serial, sequence, first_flags, last_flags, i as u64).unwrap();
        sequence += pages.len() as u32;
        for page in pages {
            out.extend(page.encode().unwrap());
        }
    }
    out
}

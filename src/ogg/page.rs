use log::{debug, trace};

use crate::error::{OggError, Result};
use crate::ogg::crc::{crc32, crc32_update};
use crate::ogg::{
    OGG_CRC_OFFSET, OGG_GRANULE_NO_PACKET, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION,
    OGG_HEADER_TYPE_EOS, OGG_LACING_CONTINUE, OGG_MAX_CONTINUED_DATA, OGG_MAX_SEGMENTS,
    OGG_MAX_TERMINATED_DATA, OGG_PAGE_HEADER_SIZE, OGG_SIGNATURE,
};
use crate::utils::io::StreamIo;

/// OGG Page
///
/// The payload is owned by the page. The segment table is kept as read from
/// the source so packet boundaries inside the page stay visible; pages built
/// with [`Page::new`] derive theirs from the payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: u64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    /// Position of the page's first byte in its source, if it came from one
    pub offset: Option<u64>,
    data: Vec<u8>,
    segments: Vec<u8>,
}

/// A page exactly as it was framed in the source
struct Frame {
    offset: u64,
    header: Vec<u8>,
    data: Vec<u8>,
}

/// Compute the segment table for a single packet fragment of len bytes.
///
/// A page with the no-packet granule must hold only full 255-byte segments;
/// any other page ends with a terminating lacing value, which is 0 when len
/// is a multiple of 255.
pub fn lacing_values(len: usize, granule_position: u64) -> Result<Vec<u8>> {
    if granule_position == OGG_GRANULE_NO_PACKET {
        if len > OGG_MAX_CONTINUED_DATA {
            return Err(OggError::bad_size(format!(
                "continuing page can hold at most {} bytes, got {}",
                OGG_MAX_CONTINUED_DATA, len
            )));
        }
        if len % 255 != 0 {
            return Err(OggError::bad_size(format!(
                "continuing page must hold a multiple of 255 bytes, got {}",
                len
            )));
        }
        Ok(vec![OGG_LACING_CONTINUE; len / 255])
    } else {
        if len > OGG_MAX_TERMINATED_DATA {
            return Err(OggError::bad_size(format!(
                "terminating page can hold at most {} bytes, got {}",
                OGG_MAX_TERMINATED_DATA, len
            )));
        }
        let mut table = vec![OGG_LACING_CONTINUE; len / 255];
        table.push((len % 255) as u8);
        Ok(table)
    }
}

fn read_frame<S: StreamIo>(source: &mut S) -> Result<Option<Frame>> {
    // Save the current offset for in-place rewrites
    let offset = source.tell()?;

    let mut header = vec![0u8; OGG_PAGE_HEADER_SIZE + OGG_MAX_SEGMENTS];
    let read = source.read_full(&mut header[..OGG_PAGE_HEADER_SIZE])?;
    if read == 0 {
        return Ok(None);
    }
    if read < OGG_PAGE_HEADER_SIZE {
        return Err(OggError::invalid(format!(
            "truncated page header at offset {}: {} of {} bytes",
            offset, read, OGG_PAGE_HEADER_SIZE
        )));
    }

    // Check OGG signature
    if &header[0..4] != OGG_SIGNATURE {
        return Err(OggError::invalid(format!(
            "page signature does not match at offset {}",
            offset
        )));
    }
    if header[4] != 0 {
        return Err(OggError::invalid(format!(
            "unsupported stream structure revision {} at offset {}",
            header[4], offset
        )));
    }

    // Read segment table
    let segment_count = header[26] as usize;
    header.truncate(OGG_PAGE_HEADER_SIZE + segment_count);
    let read = source.read_full(&mut header[OGG_PAGE_HEADER_SIZE..])?;
    if read < segment_count {
        return Err(OggError::invalid(format!(
            "truncated segment table at offset {}: {} of {} entries",
            offset, read, segment_count
        )));
    }

    let data_size: usize = header[OGG_PAGE_HEADER_SIZE..]
        .iter()
        .map(|&x| x as usize)
        .sum();
    let mut data = vec![0u8; data_size];
    let read = source.read_full(&mut data)?;
    if read < data_size {
        return Err(OggError::invalid(format!(
            "truncated page data at offset {}: {} of {} bytes",
            offset, read, data_size
        )));
    }

    // Verify the checksum with the CRC field blanked
    let stored = parse_u32_le(&header[22..26]);
    header[22..26].fill(0);
    let computed = crc32_frame(&header, &data);
    if stored != computed {
        return Err(OggError::invalid(format!(
            "checksum mismatch at offset {}: stored {:#010x}, computed {:#010x}",
            offset, stored, computed
        )));
    }
    header[22..26].copy_from_slice(&stored.to_le_bytes());

    trace!("read page at {} ({} segments, {} bytes)", offset, segment_count, data_size);
    Ok(Some(Frame { offset, header, data }))
}

fn crc32_frame(header: &[u8], data: &[u8]) -> u32 {
    crc32_update(crc32(header), data)
}

fn parse_u32_le(source: &[u8]) -> u32 {
    let mut buffer = [0u8; 4];
    buffer.copy_from_slice(&source[0..4]);
    u32::from_le_bytes(buffer)
}

fn parse_u64_le(source: &[u8]) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(&source[0..8]);
    u64::from_le_bytes(buffer)
}

/// Read the next page as raw bytes, verified but not decoded.
///
/// Returns `None` at a clean end of stream.
pub(crate) fn read_raw_page<S: StreamIo>(source: &mut S) -> Result<Option<Vec<u8>>> {
    Ok(read_frame(source)?.map(|frame| {
        let mut bytes = frame.header;
        bytes.extend_from_slice(&frame.data);
        bytes
    }))
}

/// Serial number of a raw page
pub(crate) fn raw_serial(raw: &[u8]) -> u32 {
    parse_u32_le(&raw[14..18])
}

/// Sequence number of a raw page
pub(crate) fn raw_sequence(raw: &[u8]) -> u32 {
    parse_u32_le(&raw[18..22])
}

/// Overwrite the sequence number of a raw page and refresh its checksum
pub(crate) fn restamp_sequence(raw: &mut [u8], sequence: u32) {
    raw[18..22].copy_from_slice(&sequence.to_le_bytes());
    raw[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4].fill(0);
    let crc = crc32(raw);
    raw[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
}

impl Page {
    /// Build a page holding one packet fragment.
    ///
    /// Fails with BadSize when data cannot be laced on a single page with the
    /// given granule position.
    pub fn new(
        header_type: u8,
        granule_position: u64,
        serial: u32,
        sequence: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        let segments = lacing_values(data.len(), granule_position)?;
        Ok(Page {
            version: 0,
            header_type,
            granule_position,
            serial,
            sequence,
            checksum: 0,
            offset: None,
            data,
            segments,
        })
    }

    /// Read exactly one page from the source's current position.
    ///
    /// End of stream is reported as Invalid; use [`Page::try_read`] when the
    /// caller expects the source to run out.
    pub fn read<S: StreamIo>(source: &mut S) -> Result<Self> {
        Self::try_read(source)?
            .ok_or_else(|| OggError::invalid("end of stream while reading page header"))
    }

    /// Read one page, or `None` if the source is exhausted at a page boundary
    pub fn try_read<S: StreamIo>(source: &mut S) -> Result<Option<Self>> {
        let frame = match read_frame(source)? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        let header = &frame.header;
        let page = Page {
            version: header[4],
            header_type: header[5],
            granule_position: parse_u64_le(&header[6..14]),
            serial: parse_u32_le(&header[14..18]),
            sequence: parse_u32_le(&header[18..22]),
            checksum: parse_u32_le(&header[22..26]),
            offset: Some(frame.offset),
            segments: header[OGG_PAGE_HEADER_SIZE..].to_vec(),
            data: frame.data,
        };
        Ok(Some(page))
    }

    /// Serialize the page, computing its checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let segments = self.segment_table()?;

        let mut buf = Vec::with_capacity(OGG_PAGE_HEADER_SIZE + segments.len() + self.data.len());
        buf.extend_from_slice(OGG_SIGNATURE);
        buf.push(self.version);
        buf.push(self.header_type);
        buf.extend_from_slice(&self.granule_position.to_le_bytes());
        buf.extend_from_slice(&self.serial.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]); // CRC is filled in below
        buf.push(segments.len() as u8);
        buf.extend_from_slice(&segments);
        buf.extend_from_slice(&self.data);

        let crc = crc32(&buf);
        buf[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Write the page to sink as one contiguous byte run, returning its checksum.
    ///
    /// Nothing is written if the page fails validation.
    pub fn write<S: StreamIo>(&self, sink: &mut S) -> Result<u32> {
        let bytes = self.encode()?;
        sink.write_all(&bytes)?;
        let crc = parse_u32_le(&bytes[OGG_CRC_OFFSET..]);
        debug!(
            "wrote page seq {} serial {:#010x} ({} bytes, crc {:#010x})",
            self.sequence,
            self.serial,
            bytes.len(),
            crc
        );
        Ok(crc)
    }

    // A table read from a source is emitted as read. A table with packet
    // boundaries inside the page is kept; anything else is derived from the
    // payload length.
    fn segment_table(&self) -> Result<Vec<u8>> {
        let stored_len: usize = self.segments.iter().map(|&v| v as usize).sum();
        if self.offset.is_some() && stored_len == self.data.len() {
            return Ok(self.segments.clone());
        }

        let interior_boundary = self
            .segments
            .iter()
            .rev()
            .skip(1)
            .any(|&v| v < OGG_LACING_CONTINUE);
        if !interior_boundary {
            return lacing_values(self.data.len(), self.granule_position);
        }
        if self.granule_position == OGG_GRANULE_NO_PACKET {
            return Err(OggError::bad_size(
                "page completing a packet cannot carry the no-packet granule position",
            ));
        }
        Ok(self.segments.clone())
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.data
    }

    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Lacing values of this page
    pub fn segments(&self) -> &[u8] {
        &self.segments
    }

    /// Number of bytes the page occupies in its source
    pub fn encoded_len(&self) -> usize {
        OGG_PAGE_HEADER_SIZE + self.segments.len() + self.data.len()
    }

    pub fn is_continued(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_CONTINUATION != 0
    }

    pub fn is_bos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_EOS != 0
    }

    /// True when the last packet on the page continues onto the next page
    pub fn ends_open(&self) -> bool {
        self.segments.last() == Some(&OGG_LACING_CONTINUE)
    }
}

/// Read exactly one page; see [`Page::read`]
pub fn read_page<S: StreamIo>(source: &mut S) -> Result<Page> {
    Page::read(source)
}

/// Write one page; see [`Page::write`]
pub fn write_page<S: StreamIo>(page: &Page, sink: &mut S) -> Result<u32> {
    page.write(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::utils::io::MemoryIo;

    fn sample_page(len: usize, granule: u64) -> Page {
        let data = (0..len).map(|i| (i * 7 % 251) as u8).collect();
        Page::new(OGG_HEADER_TYPE_BOS, granule, 0x1234_5678, 3, data).unwrap()
    }

    #[test]
    fn test_lacing_values() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0]),
            (1, &[1]),
            (254, &[254]),
            (255, &[255, 0]),
            (256, &[255, 1]),
            (509, &[255, 254]),
            (510, &[255, 255, 0]),
        ];
        for (len, expected) in cases {
            assert_eq!(&lacing_values(*len, 0).unwrap()[..], *expected, "len {}", len);
        }

        let max = lacing_values(OGG_MAX_TERMINATED_DATA, 0).unwrap();
        assert_eq!(max.len(), 255);
        assert!(max[..254].iter().all(|&v| v == 255));
        assert_eq!(max[254], 254);

        let full = lacing_values(OGG_MAX_CONTINUED_DATA, OGG_GRANULE_NO_PACKET).unwrap();
        assert_eq!(full, vec![255u8; 255]);
        assert_eq!(lacing_values(510, OGG_GRANULE_NO_PACKET).unwrap(), vec![255, 255]);
        assert_eq!(lacing_values(0, OGG_GRANULE_NO_PACKET).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_lacing_rejects_bad_sizes() {
        let err = lacing_values(OGG_MAX_CONTINUED_DATA, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSize);
        let err = lacing_values(OGG_MAX_CONTINUED_DATA + 255, OGG_GRANULE_NO_PACKET).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSize);
        let err = lacing_values(256, OGG_GRANULE_NO_PACKET).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSize);
    }

    #[test]
    fn test_roundtrip() {
        for &(len, granule) in &[
            (0usize, 0u64),
            (19, 0),
            (255, 48_000),
            (4_000, 960),
            (OGG_MAX_TERMINATED_DATA, 1),
            (510, OGG_GRANULE_NO_PACKET),
            (OGG_MAX_CONTINUED_DATA, OGG_GRANULE_NO_PACKET),
        ] {
            let page = sample_page(len, granule);
            let bytes = page.encode().unwrap();
            assert_eq!(bytes.len(), page.encoded_len());

            let back = Page::read(&mut MemoryIo::new(bytes.clone())).unwrap();
            let mut expected = page.clone();
            expected.checksum = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
            expected.offset = Some(0);
            assert_eq!(back, expected);
        }
    }

    #[test]
    fn test_write_reports_checksum() {
        let page = sample_page(100, 7);
        let mut io = MemoryIo::default();
        let crc = page.write(&mut io).unwrap();
        let back = Page::read(&mut MemoryIo::new(io.into_inner())).unwrap();
        assert_eq!(back.checksum, crc);
    }

    #[test]
    fn test_bad_size_writes_nothing() {
        let mut page = sample_page(300, 0);
        page.granule_position = OGG_GRANULE_NO_PACKET;
        let mut io = MemoryIo::default();
        let err = page.write(&mut io).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSize);
        assert!(io.get_ref().is_empty());
    }

    #[test]
    fn test_any_bit_flip_is_invalid() {
        let bytes = sample_page(20, 5).encode().unwrap();
        for bit in 0..bytes.len() * 8 {
            let mut corrupt = bytes.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);
            let err = Page::read(&mut MemoryIo::new(corrupt)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "bit {}", bit);
        }
    }

    #[test]
    fn test_bad_sync_consumes_only_header() {
        let mut bytes = sample_page(50, 0).encode().unwrap();
        bytes[0] = b'X';
        let mut io = MemoryIo::new(bytes);
        let err = Page::read(&mut io).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(io.tell().unwrap() <= OGG_PAGE_HEADER_SIZE as u64);
    }

    #[test]
    fn test_truncated_page_is_invalid() {
        let bytes = sample_page(50, 0).encode().unwrap();
        for cut in [1, 26, 27, 28, bytes.len() - 1] {
            let err = Page::read(&mut MemoryIo::new(bytes[..cut].to_vec())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "cut at {}", cut);
        }
    }

    #[test]
    fn test_clean_end_of_stream() {
        let mut io = MemoryIo::new(Vec::new());
        assert!(Page::try_read(&mut io).unwrap().is_none());
        assert_eq!(Page::read(&mut io).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_offsets_are_recorded() {
        let first = sample_page(10, 0).encode().unwrap();
        let second = sample_page(600, 0).encode().unwrap();
        let mut io = MemoryIo::new([first.clone(), second].concat());
        assert_eq!(Page::read(&mut io).unwrap().offset, Some(0));
        let page = Page::read(&mut io).unwrap();
        assert_eq!(page.offset, Some(first.len() as u64));
        assert_eq!(page.segments(), &[255, 255, 90]);
    }

    #[test]
    fn test_multi_packet_page_keeps_its_table() {
        // Two packets of 3 and 2 bytes on one page
        let mut raw = Page::new(0, 10, 1, 0, vec![1, 2, 3, 4, 5]).unwrap().encode().unwrap();
        raw[26] = 2;
        raw.splice(27..28, [3u8, 2u8]);
        raw[22..26].fill(0);
        let crc = crc32(&raw);
        raw[22..26].copy_from_slice(&crc.to_le_bytes());

        let page = Page::read(&mut MemoryIo::new(raw.clone())).unwrap();
        assert_eq!(page.segments(), &[3, 2]);
        assert_eq!(page.encode().unwrap(), raw);
    }

    #[test]
    fn test_empty_page_encodes_as_read() {
        let mut raw = Page::new(OGG_HEADER_TYPE_EOS, 5, 1, 3, Vec::new()).unwrap().encode().unwrap();
        raw[26] = 0;
        raw.remove(27);
        raw[22..26].fill(0);
        let crc = crc32(&raw);
        raw[22..26].copy_from_slice(&crc.to_le_bytes());

        let page = Page::read(&mut MemoryIo::new(raw.clone())).unwrap();
        assert!(page.segments().is_empty());
        assert_eq!(page.encode().unwrap(), raw);
    }

    #[test]
    fn test_restamp_sequence() {
        let mut raw = sample_page(40, 0).encode().unwrap();
        restamp_sequence(&mut raw, 99);
        assert_eq!(raw_sequence(&raw), 99);
        assert_eq!(raw_serial(&raw), 0x1234_5678);
        let page = Page::read(&mut MemoryIo::new(raw)).unwrap();
        assert_eq!(page.sequence, 99);
    }

    #[test]
    fn test_nonzero_revision_rejected() {
        let mut page = sample_page(10, 0);
        page.version = 1;
        let bytes = page.encode().unwrap();
        let err = Page::read(&mut MemoryIo::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}

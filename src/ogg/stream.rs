// Stream context and packet assembler
//
// One OggStream owns one byte store and tracks a single logical stream.
// Pages are read on demand into the arena; packets are cut from them by
// walking lacing values: a run of 255s closed by a value below 255 is one
// packet, and a page ending on 255 leaves the packet open for the next page.

use std::path::Path;

use log::{debug, info};

use crate::error::{OggError, Result};
use crate::ogg::packet::{AssemblerState, Fragment, Packet, PageArena, PageId};
use crate::ogg::splice::{self, SequencePolicy, SpliceReport};
use crate::ogg::{Page, OGG_LACING_CONTINUE};
use crate::utils::io::{FileIo, MemoryIo, StreamIo};

#[derive(Debug, Clone, Copy)]
struct PageCursor {
    page: PageId,
    segment: usize,
    offset: usize,
}

/// Per-file state: tracked serial, page arena and the I/O handle
pub struct OggStream<S: StreamIo> {
    io: S,
    serial: Option<u32>,
    arena: PageArena,
    state: AssemblerState,
    cursor: Option<PageCursor>,
    pending: Packet,
}

impl OggStream<FileIo> {
    /// Open a file for reading and in-place editing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(FileIo::open(path)?))
    }

    /// Open a file for reading only
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(FileIo::open_read_only(path)?))
    }
}

impl OggStream<MemoryIo> {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(MemoryIo::new(data))
    }
}

impl<S: StreamIo> OggStream<S> {
    pub fn new(io: S) -> Self {
        OggStream {
            io,
            serial: None,
            arena: PageArena::new(),
            state: AssemblerState::AwaitingPacketStart,
            cursor: None,
            pending: Packet::default(),
        }
    }

    /// Serial number being tracked, once known
    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// Track this serial instead of the first one encountered
    pub fn select_serial(&mut self, serial: u32) {
        self.serial = Some(serial);
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn arena(&self) -> &PageArena {
        &self.arena
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.arena.get(id)
    }

    pub fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }

    /// Release the context, handing back the I/O handle
    pub fn into_inner(self) -> S {
        self.io
    }

    /// Flush pending writes and release the handle
    pub fn close(mut self) -> Result<()> {
        self.io.flush()
    }

    /// Current position in the byte store
    pub fn position(&mut self) -> Result<u64> {
        self.io.tell()
    }

    /// Go back to the start of the store and forget all pages read so far
    pub fn rewind(&mut self) -> Result<()> {
        self.seek_and_reset(0)
    }

    fn seek_and_reset(&mut self, offset: u64) -> Result<()> {
        self.io.seek(offset)?;
        self.arena.clear();
        self.cursor = None;
        self.pending = Packet::default();
        self.state = AssemblerState::AwaitingPacketStart;
        Ok(())
    }

    /// Read the next page into the arena.
    ///
    /// Returns `None` at a clean end of stream. A page from a different
    /// logical stream is rejected with MultiStream and not stored.
    pub fn next_page(&mut self) -> Result<Option<PageId>> {
        let page = match Page::try_read(&mut self.io)? {
            Some(page) => page,
            None => return Ok(None),
        };

        match self.serial {
            None => {
                debug!("tracking stream serial {:#010x}", page.serial);
                self.serial = Some(page.serial);
            }
            Some(expected) if expected != page.serial => {
                return Err(OggError::MultiStream {
                    expected,
                    found: page.serial,
                });
            }
            Some(_) => {}
        }

        Ok(Some(self.arena.push(page)))
    }

    /// Assemble the next packet, reading pages as needed.
    ///
    /// Returns `None` once the stream ends between packets.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.state == AssemblerState::PacketComplete {
            self.state = AssemblerState::AwaitingPacketStart;
        }

        loop {
            let cursor = match self.cursor {
                Some(c) if self.has_segments_left(c) => c,
                _ => match self.advance_page()? {
                    Some(c) => c,
                    None => return Ok(None),
                },
            };

            let page = self
                .arena
                .get(cursor.page)
                .ok_or_else(|| OggError::not_found(format!("page {} was released", cursor.page)))?;
            let segments = page.segments();
            // A page without lacing values carries no packet data
            if segments.is_empty() {
                continue;
            }

            let mut length = 0usize;
            let mut segment = cursor.segment;
            let mut terminated = false;
            while segment < segments.len() {
                let value = segments[segment];
                length += value as usize;
                segment += 1;
                if value < OGG_LACING_CONTINUE {
                    terminated = true;
                    break;
                }
            }

            self.pending.push(Fragment {
                page: cursor.page,
                offset: cursor.offset,
                length,
                segment_start: cursor.segment,
                segment_end: segment,
            });
            self.cursor = Some(PageCursor {
                page: cursor.page,
                segment,
                offset: cursor.offset + length,
            });

            if terminated {
                self.state = AssemblerState::PacketComplete;
                let packet = std::mem::take(&mut self.pending);
                debug!(
                    "packet of {} bytes over pages {:?}",
                    packet.len(),
                    packet.page_range()
                );
                return Ok(Some(packet));
            }
            self.state = AssemblerState::AccumulatingContinuation;
        }
    }

    fn has_segments_left(&self, cursor: PageCursor) -> bool {
        self.arena
            .get(cursor.page)
            .map_or(false, |page| cursor.segment < page.segments().len())
    }

    // Pull the next page and check it agrees with the assembler state
    fn advance_page(&mut self) -> Result<Option<PageCursor>> {
        let id = match self.next_page()? {
            Some(id) => id,
            None => {
                self.cursor = None;
                if self.state == AssemblerState::AccumulatingContinuation {
                    return Err(OggError::invalid("stream ends inside an unterminated packet"));
                }
                return Ok(None);
            }
        };

        let page = self
            .arena
            .get(id)
            .ok_or_else(|| OggError::not_found(format!("page {} was released", id)))?;
        let accumulating = self.state == AssemblerState::AccumulatingContinuation;
        if accumulating && !page.is_continued() {
            return Err(OggError::invalid(format!(
                "page {} does not continue the open packet",
                page.sequence
            )));
        }
        if !accumulating && page.is_continued() {
            return Err(OggError::invalid(format!(
                "page {} continues a packet that was never started",
                page.sequence
            )));
        }

        let cursor = PageCursor {
            page: id,
            segment: 0,
            offset: 0,
        };
        self.cursor = Some(cursor);
        Ok(Some(cursor))
    }

    /// Lazily assemble packets until the stream ends or an error occurs
    pub fn packets(&mut self) -> Packets<'_, S> {
        Packets {
            stream: self,
            done: false,
        }
    }

    /// Rewind and return the packet at index (0-based)
    pub fn nth_packet(&mut self, index: usize) -> Result<Packet> {
        self.rewind()?;
        for _ in 0..index {
            if self.next_packet()?.is_none() {
                return Err(OggError::not_found(format!("stream has fewer than {} packets", index + 1)));
            }
        }
        self.next_packet()?
            .ok_or_else(|| OggError::not_found(format!("stream has fewer than {} packets", index + 1)))
    }

    /// Copy a packet's payload out of the arena
    pub fn packet_payload(&self, packet: &Packet) -> Result<Vec<u8>> {
        packet
            .payload(&self.arena)
            .ok_or_else(|| OggError::not_found("packet pages were released"))
    }

    /// Drop pages that neither the open packet nor the cursor still need.
    ///
    /// Packets returned earlier lose access to their released pages.
    pub fn release_pages(&mut self) {
        let keep = self
            .pending
            .first_page()
            .or_else(|| {
                self.cursor
                    .filter(|c| self.has_segments_left(*c))
                    .map(|c| c.page)
            })
            .unwrap_or_else(|| self.arena.next_id());
        self.arena.release_before(keep);
    }

    /// Replace a packet's payload in the backing store.
    ///
    /// The packet must come from this stream and own its pages exclusively.
    /// Afterwards the arena is emptied and reading resumes right after the
    /// rewritten pages; recorded offsets of earlier pages are stale.
    ///
    /// No rollback happens on failure: an I/O error part way through can leave
    /// the store inconsistent. Callers that need atomicity should splice a
    /// copy and rename it into place.
    pub fn splice(
        &mut self,
        packet: &Packet,
        payload: &[u8],
        policy: SequencePolicy,
    ) -> Result<SpliceReport> {
        let (first, last) = packet
            .page_range()
            .ok_or_else(|| OggError::not_found("packet has no fragments"))?;
        let span = self
            .arena
            .span(first, last)
            .ok_or_else(|| OggError::not_found("packet pages were released"))?;

        let fragments = packet.fragments();
        if let (Some(head), Some(tail)) = (fragments.first(), fragments.last()) {
            if head.segment_start != 0 {
                return Err(OggError::SharedPage {
                    sequence: span[0].sequence,
                });
            }
            let last_page = span[span.len() - 1];
            if tail.segment_end != last_page.segments().len() {
                return Err(OggError::SharedPage {
                    sequence: last_page.sequence,
                });
            }
        }

        let report = splice::splice_pages(&mut self.io, &span, payload, policy)?;
        info!(
            "spliced {} byte packet at offset {}: {} -> {} bytes on disk",
            payload.len(),
            report.start_offset,
            report.old_len,
            report.new_len
        );
        self.seek_and_reset(report.start_offset + report.new_len)?;
        Ok(report)
    }
}

/// Iterator over the packets of an OggStream
pub struct Packets<'a, S: StreamIo> {
    stream: &'a mut OggStream<S>,
    done: bool,
}

impl<S: StreamIo> Iterator for Packets<'_, S> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.next_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ogg::fixtures::{build_stream, raw_page};
    use crate::ogg::{
        OGG_GRANULE_NO_PACKET, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS,
    };

    #[test]
    fn test_single_page_packets() {
        let data = build_stream(7, &[b"first".to_vec(), b"second".to_vec(), Vec::new()]);
        let mut stream = OggStream::from_bytes(data);

        let packets: Vec<Packet> = stream.packets().collect::<Result<_>>().unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(stream.packet_payload(&packets[0]).unwrap(), b"first");
        assert_eq!(stream.packet_payload(&packets[1]).unwrap(), b"second");
        assert!(packets[2].is_empty());
        assert_eq!(stream.serial(), Some(7));
        assert_eq!(stream.state(), AssemblerState::PacketComplete);
    }

    #[test]
    fn test_packet_continues_across_three_pages() {
        // Page 1: a complete 4-byte packet, then 255 bytes opening packet two.
        // Page 2: 255 more bytes of packet two. Page 3: its last 10 bytes.
        let mut data = Vec::new();
        let p1: Vec<u8> = [vec![1u8; 4], vec![2u8; 255]].concat();
        data.extend(raw_page(9, 0, OGG_HEADER_TYPE_BOS, 0, &[4, 255], &p1));
        data.extend(raw_page(9, 1, OGG_HEADER_TYPE_CONTINUATION, OGG_GRANULE_NO_PACKET, &[255], &[3u8; 255]));
        data.extend(raw_page(9, 2, OGG_HEADER_TYPE_CONTINUATION, 100, &[10], &[4u8; 10]));

        let mut stream = OggStream::from_bytes(data);
        let first = stream.next_packet().unwrap().unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first.fragments().len(), 1);

        let second = stream.next_packet().unwrap().unwrap();
        assert_eq!(second.len(), 520);
        let pages: Vec<PageId> = second.fragments().iter().map(|f| f.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
        assert_eq!(second.fragments()[0].offset, 4);
        assert_eq!(second.fragments()[0].segment_start, 1);

        let payload = stream.packet_payload(&second).unwrap();
        assert_eq!(&payload[..255], &[2u8; 255][..]);
        assert_eq!(&payload[255..510], &[3u8; 255][..]);
        assert_eq!(&payload[510..], &[4u8; 10][..]);

        assert!(stream.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_zero_length_terminator_on_next_page() {
        let mut data = Vec::new();
        data.extend(raw_page(1, 0, OGG_HEADER_TYPE_BOS, OGG_GRANULE_NO_PACKET, &[255], &[5u8; 255]));
        data.extend(raw_page(1, 1, OGG_HEADER_TYPE_CONTINUATION, 0, &[0], &[]));

        let mut stream = OggStream::from_bytes(data);
        let packet = stream.next_packet().unwrap().unwrap();
        assert_eq!(packet.len(), 255);
        assert_eq!(packet.page_range(), Some((0, 1)));
        assert_eq!(packet.fragments()[1].length, 0);
    }

    #[test]
    fn test_trailing_empty_eos_page() {
        let mut data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, 0, &[3], b"abc");
        data.extend(raw_page(1, 1, OGG_HEADER_TYPE_EOS, 0, &[], &[]));

        let mut stream = OggStream::from_bytes(data);
        let lens: Vec<usize> = stream.packets().map(|p| p.unwrap().len()).collect();
        assert_eq!(lens, vec![3]);
        assert_eq!(stream.state(), AssemblerState::AwaitingPacketStart);
        assert_eq!(stream.arena().next_id(), 2);
    }

    #[test]
    fn test_empty_page_between_packets() {
        let mut data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, 0, &[3], b"abc");
        data.extend(raw_page(1, 1, 0, 0, &[], &[]));
        data.extend(raw_page(1, 2, 0, 1, &[2], b"de"));

        let mut stream = OggStream::from_bytes(data);
        let packets: Vec<Packet> = stream.packets().collect::<Result<_>>().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(stream.packet_payload(&packets[1]).unwrap(), b"de");
        assert_eq!(packets[1].page_range(), Some((2, 2)));
    }

    #[test]
    fn test_empty_page_inside_open_packet() {
        let mut data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, OGG_GRANULE_NO_PACKET, &[255], &[7u8; 255]);
        data.extend(raw_page(1, 1, OGG_HEADER_TYPE_CONTINUATION, OGG_GRANULE_NO_PACKET, &[], &[]));
        data.extend(raw_page(1, 2, OGG_HEADER_TYPE_CONTINUATION, 0, &[1], &[8]));

        let mut stream = OggStream::from_bytes(data);
        let packet = stream.next_packet().unwrap().unwrap();
        assert_eq!(packet.len(), 256);
        let pages: Vec<PageId> = packet.fragments().iter().map(|f| f.page).collect();
        assert_eq!(pages, vec![0, 2]);
    }

    #[test]
    fn test_empty_packets_on_one_page() {
        let data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, 0, &[0, 3, 0], b"abc");
        let mut stream = OggStream::from_bytes(data);
        let lens: Vec<usize> = stream.packets().map(|p| p.unwrap().len()).collect();
        assert_eq!(lens, vec![0, 3, 0]);
    }

    #[test]
    fn test_second_serial_is_rejected() {
        let mut data = build_stream(1, &[b"one".to_vec()]);
        data.extend(build_stream(2, &[b"two".to_vec()]));

        let mut stream = OggStream::from_bytes(data);
        assert!(stream.next_packet().unwrap().is_some());
        let err = stream.next_packet().unwrap_err();
        assert_eq!(err, OggError::MultiStream { expected: 1, found: 2 });
    }

    #[test]
    fn test_selected_serial_rejects_others() {
        let data = build_stream(1, &[b"one".to_vec()]);
        let mut stream = OggStream::from_bytes(data);
        stream.select_serial(5);
        assert_eq!(stream.next_page().unwrap_err().kind(), ErrorKind::MultiStream);
    }

    #[test]
    fn test_truncated_packet_is_invalid() {
        let data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, OGG_GRANULE_NO_PACKET, &[255], &[0u8; 255]);
        let mut stream = OggStream::from_bytes(data);
        assert_eq!(stream.next_packet().unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_missing_continuation_flag_is_invalid() {
        let mut data = raw_page(1, 0, OGG_HEADER_TYPE_BOS, OGG_GRANULE_NO_PACKET, &[255], &[0u8; 255]);
        data.extend(raw_page(1, 1, 0, 0, &[1], &[0]));
        let mut stream = OggStream::from_bytes(data);
        assert_eq!(stream.next_packet().unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_stray_continuation_is_invalid() {
        let data = raw_page(1, 0, OGG_HEADER_TYPE_CONTINUATION, 0, &[1], &[0]);
        let mut stream = OggStream::from_bytes(data);
        assert_eq!(stream.next_packet().unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_nth_packet_rewinds() {
        let data = build_stream(3, &[b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
        let mut stream = OggStream::from_bytes(data);
        let third = stream.nth_packet(2).unwrap();
        assert_eq!(stream.packet_payload(&third).unwrap(), b"ccc");
        let first = stream.nth_packet(0).unwrap();
        assert_eq!(stream.packet_payload(&first).unwrap(), b"a");
        assert_eq!(stream.nth_packet(3).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_release_pages_keeps_open_packet() {
        let payloads = vec![vec![1u8; 10], vec![2u8; 70_000], vec![3u8; 10]];
        let data = build_stream(4, &payloads);
        let mut stream = OggStream::from_bytes(data);

        let first = stream.next_packet().unwrap().unwrap();
        stream.release_pages();
        assert!(stream.packet_payload(&first).is_err());

        let big = stream.next_packet().unwrap().unwrap();
        assert_eq!(big.fragments().len(), 2);
        assert_eq!(stream.packet_payload(&big).unwrap(), payloads[1]);
        stream.release_pages();
        let last = stream.next_packet().unwrap().unwrap();
        assert_eq!(stream.packet_payload(&last).unwrap(), payloads[2]);
        assert_eq!(stream.arena().len(), 1);
    }
}

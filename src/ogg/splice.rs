// Splice engine
//
// Replaces the payload of a packet that owns its pages outright. The new
// payload is re-chunked into pages (full 255*255 byte continuation pages,
// then one terminating page). When the rewritten span has the same byte
// length it is written over the old one; otherwise every later page is moved
// by the size difference and the store is truncated or extended to match.

use std::collections::VecDeque;

use log::{debug, info};
use serde::Serialize;

use crate::error::{OggError, Result};
use crate::ogg::page::{raw_sequence, raw_serial, read_raw_page, restamp_sequence};
use crate::ogg::{
    Page, OGG_GRANULE_NO_PACKET, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS,
    OGG_MAX_CONTINUED_DATA, OGG_MAX_TERMINATED_DATA,
};
use crate::utils::io::StreamIo;

/// What happens to sequence numbers of pages after a spliced span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SequencePolicy {
    /// Leave later pages byte-for-byte intact
    #[default]
    Preserve,
    /// Shift later pages of the same stream by the change in page count
    Renumber,
}

/// Outcome of a splice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpliceReport {
    /// Offset of the first rewritten page
    pub start_offset: u64,
    /// Bytes the packet's pages occupied before
    pub old_len: u64,
    /// Bytes the packet's pages occupy now
    pub new_len: u64,
    pub old_pages: usize,
    pub new_pages: usize,
    /// Pages after the span that were moved to a new offset
    pub shifted_pages: usize,
    /// Pages after the span whose sequence number changed
    pub renumbered_pages: usize,
}

impl SpliceReport {
    /// Change in on-disk size
    pub fn delta(&self) -> i64 {
        self.new_len as i64 - self.old_len as i64
    }
}

/// Split one packet's payload into pages.
///
/// Every page but the last carries exactly 255*255 bytes and the no-packet
/// granule; the last page ends the packet with granule_position.
pub fn paginate(
    payload: &[u8],
    serial: u32,
    first_sequence: u32,
    first_flags: u8,
    last_flags: u8,
    granule_position: u64,
) -> Result<Vec<Page>> {
    let mut chunks = Vec::new();
    let mut rest = payload;
    while rest.len() > OGG_MAX_TERMINATED_DATA {
        let (chunk, tail) = rest.split_at(OGG_MAX_CONTINUED_DATA);
        chunks.push(chunk);
        rest = tail;
    }
    chunks.push(rest);

    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let is_last = i + 1 == count;
            let mut flags = if i == 0 {
                first_flags
            } else {
                OGG_HEADER_TYPE_CONTINUATION
            };
            let granule = if is_last {
                flags |= last_flags;
                granule_position
            } else {
                OGG_GRANULE_NO_PACKET
            };
            Page::new(
                flags,
                granule,
                serial,
                first_sequence.wrapping_add(i as u32),
                chunk.to_vec(),
            )
        })
        .collect()
}

/// Lay out replacement pages for a span of pages holding one packet.
///
/// BOS and other first-page flags stay on the first page, EOS and the granule
/// position move to the last one.
pub fn build_pages(span: &[&Page], payload: &[u8]) -> Result<Vec<Page>> {
    let (first, last) = match (span.first(), span.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(OggError::not_found("empty page span")),
    };
    paginate(
        payload,
        first.serial,
        first.sequence,
        first.header_type & !OGG_HEADER_TYPE_EOS,
        last.header_type & OGG_HEADER_TYPE_EOS,
        last.granule_position,
    )
}

// Byte range [start, end) the span occupies; pages must be adjacent
fn span_extent(span: &[&Page]) -> Result<(u64, u64)> {
    let mut start = None;
    let mut end = 0u64;
    for page in span {
        let offset = page.offset.ok_or_else(|| {
            OggError::invalid(format!("page {} has no recorded offset", page.sequence))
        })?;
        if start.is_some() && offset != end {
            return Err(OggError::invalid(format!(
                "page {} at offset {} does not follow the previous page ending at {}",
                page.sequence, offset, end
            )));
        }
        start.get_or_insert(offset);
        end = offset + page.encoded_len() as u64;
    }
    let start = start.ok_or_else(|| OggError::not_found("empty page span"))?;
    Ok((start, end))
}

/// Rewrite the span with pages carrying payload.
///
/// Not atomic: an error while relocating later pages leaves the store
/// partially rewritten.
pub(crate) fn splice_pages<S: StreamIo>(
    io: &mut S,
    span: &[&Page],
    payload: &[u8],
    policy: SequencePolicy,
) -> Result<SpliceReport> {
    let (start, old_end) = span_extent(span)?;
    let pages = build_pages(span, payload)?;
    let serial = span[0].serial;

    let mut new_bytes = Vec::new();
    for page in &pages {
        new_bytes.extend(page.encode()?);
    }

    let page_delta = pages.len() as i64 - span.len() as i64;
    let renumber = policy == SequencePolicy::Renumber && page_delta != 0;
    let mut report = SpliceReport {
        start_offset: start,
        old_len: old_end - start,
        new_len: new_bytes.len() as u64,
        old_pages: span.len(),
        new_pages: pages.len(),
        shifted_pages: 0,
        renumbered_pages: 0,
    };

    if report.new_len == report.old_len && !renumber {
        debug!("span at {} keeps its length, rewriting in place", start);
        io.seek(start)?;
        io.write_all(&new_bytes)?;
        io.flush()?;
        return Ok(report);
    }

    let mut tail = TailReader {
        queue: VecDeque::new(),
        read_pos: old_end,
        eof: false,
    };

    // Anything the new span would overwrite has to be read first
    tail.fill(io, start + report.new_len)?;
    io.seek(start)?;
    io.write_all(&new_bytes)?;
    let mut write_pos = start + report.new_len;

    loop {
        if tail.queue.is_empty() {
            let next = tail.read_pos + 1;
            tail.fill(io, next)?;
        }
        let mut raw = match tail.queue.pop_front() {
            Some(raw) => raw,
            None => break,
        };

        if renumber && raw_serial(&raw) == serial {
            let sequence = raw_sequence(&raw).wrapping_add(page_delta as u32);
            restamp_sequence(&mut raw, sequence);
            report.renumbered_pages += 1;
        }

        tail.fill(io, write_pos + raw.len() as u64)?;
        io.seek(write_pos)?;
        io.write_all(&raw)?;
        write_pos += raw.len() as u64;
        report.shifted_pages += 1;
    }

    if write_pos < tail.read_pos {
        io.truncate(write_pos)?;
    }
    io.flush()?;

    info!(
        "relocated {} pages by {} bytes ({} renumbered)",
        report.shifted_pages,
        report.delta(),
        report.renumbered_pages
    );
    Ok(report)
}

// Pages after the span, read ahead of the write position
struct TailReader {
    queue: VecDeque<Vec<u8>>,
    read_pos: u64,
    eof: bool,
}

impl TailReader {
    // Read whole pages until everything starting before `until` is buffered
    fn fill<S: StreamIo>(&mut self, io: &mut S, until: u64) -> Result<()> {
        while !self.eof && self.read_pos < until {
            io.seek(self.read_pos)?;
            match read_raw_page(io)? {
                Some(raw) => {
                    self.read_pos += raw.len() as u64;
                    self.queue.push_back(raw);
                }
                None => self.eof = true,
            }
        }
        Ok(())
    }
}

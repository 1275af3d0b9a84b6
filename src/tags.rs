// Comment header editing for Ogg Opus and Ogg Vorbis
//
// Both codecs carry their comment header as the second packet of the
// stream. Reading decodes it where it lies; writing re-encodes it and
// splices the new packet over the old one.

use std::fs::File;
use std::io;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{OggError, Result};
use crate::ogg::vorbis::{self, VorbisComment, VORBIS_COMMENT_HEADER};
use crate::ogg::{OggStream, Packet, Page, SequencePolicy, SpliceReport, OGG_GRANULE_NO_PACKET};
use crate::opus;
use crate::utils::io::{FileIo, StreamIo};

/// Codec identified from the first page of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Opus,
    Vorbis,
}

impl Codec {
    /// Identify the codec from a stream's BOS page
    pub fn detect(page: &Page) -> Option<Codec> {
        if opus::recognize(page) {
            Some(Codec::Opus)
        } else if vorbis::is_vorbis_ident(page) {
            Some(Codec::Vorbis)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Opus => "opus",
            Codec::Vorbis => "vorbis",
        }
    }

    /// Decode a comment header packet of this codec
    pub fn decode_comment(&self, packet: &[u8]) -> Result<VorbisComment> {
        match self {
            Codec::Opus => opus::parse_tags(packet),
            Codec::Vorbis => {
                let body = packet
                    .strip_prefix(VORBIS_COMMENT_HEADER.as_slice())
                    .ok_or_else(|| OggError::invalid("comment packet does not start with \\x03vorbis"))?;
                VorbisComment::parse(body)
            }
        }
    }

    /// Encode a comment header packet of this codec
    pub fn encode_comment(&self, comment: &VorbisComment) -> Vec<u8> {
        match self {
            Codec::Opus => opus::encode_tags(comment),
            Codec::Vorbis => {
                let mut packet = VORBIS_COMMENT_HEADER.to_vec();
                packet.extend(comment.to_bytes());
                packet
            }
        }
    }
}

/// A decoded comment header and the packet it was read from
#[derive(Debug, Clone)]
pub struct CommentHeader {
    pub codec: Codec,
    pub comment: VorbisComment,
    pub packet: Packet,
}

/// Locate and decode the comment header of the stream.
///
/// Rewinds the stream first. The returned packet stays valid for a splice
/// until the stream is read further or its pages are released.
pub fn read_tags<S: StreamIo>(stream: &mut OggStream<S>) -> Result<CommentHeader> {
    let head = stream.nth_packet(0)?;
    let first = head
        .first_page()
        .and_then(|id| stream.page(id))
        .ok_or_else(|| OggError::not_found("stream has no pages"))?;
    let codec = Codec::detect(first)
        .ok_or_else(|| OggError::not_found("no Opus or Vorbis identification header"))?;

    let packet = stream
        .next_packet()?
        .ok_or_else(|| OggError::not_found("stream ends before the comment header"))?;
    let comment = codec.decode_comment(&stream.packet_payload(&packet)?)?;
    debug!(
        "{} comment header: {} bytes, {} comments",
        codec.name(),
        packet.len(),
        comment.comments.len()
    );

    Ok(CommentHeader {
        codec,
        comment,
        packet,
    })
}

/// Replace the stream's comment header in its backing store
pub fn write_tags<S: StreamIo>(
    stream: &mut OggStream<S>,
    comment: &VorbisComment,
    policy: SequencePolicy,
) -> Result<SpliceReport> {
    let header = read_tags(stream)?;
    let payload = header.codec.encode_comment(comment);
    stream.splice(&header.packet, &payload, policy)
}

/// Replace a file's comment header without touching the original until the
/// new file is complete.
///
/// The file is copied next to itself, the copy is edited, and the copy is
/// renamed over the original.
pub fn write_tags_atomic<P: AsRef<Path>>(
    path: P,
    comment: &VorbisComment,
    policy: SequencePolicy,
) -> Result<SpliceReport> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut source = File::open(path)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    let permissions = source.metadata()?.permissions();

    let mut stream = OggStream::new(FileIo::from_file(tmp.reopen()?));
    let report = write_tags(&mut stream, comment, policy)?;
    stream.close()?;

    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| OggError::from(e.error))?;
    info!("rewrote {} ({:+} bytes)", path.display(), report.delta());
    Ok(report)
}

/// Whole-stream statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub serial: Option<u32>,
    pub codec: Option<Codec>,
    pub pages: usize,
    pub packets: usize,
    pub bytes: u64,
    /// Granule position of the last page that completes a packet
    pub last_granule: Option<u64>,
    pub eos: bool,
}

/// Walk the whole stream, checking every page and packet on the way
pub fn summarize<S: StreamIo>(stream: &mut OggStream<S>) -> Result<StreamSummary> {
    stream.rewind()?;
    let base = stream.arena().next_id();
    let mut summary = StreamSummary {
        serial: None,
        codec: None,
        pages: 0,
        packets: 0,
        bytes: 0,
        last_granule: None,
        eos: false,
    };

    let mut scanned = base;
    loop {
        let packet = stream.next_packet()?;

        for id in scanned..stream.arena().next_id() {
            if let Some(page) = stream.page(id) {
                if id == base {
                    summary.codec = Codec::detect(page);
                }
                summary.pages += 1;
                summary.bytes += page.encoded_len() as u64;
                if page.granule_position != OGG_GRANULE_NO_PACKET {
                    summary.last_granule = Some(page.granule_position);
                }
                summary.eos |= page.is_eos();
            }
        }
        scanned = stream.arena().next_id();

        match packet {
            Some(_) => summary.packets += 1,
            None => break,
        }
        stream.release_pages();
    }

    summary.serial = stream.serial();
    Ok(summary)
}

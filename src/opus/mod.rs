// OPUS format support (in OGG container)
//
// OPUS File Structure:
// - Identification header: "OpusHead" (8 bytes) on the BOS page, at least
//   19 bytes long
// - Comment header: "OpusTags" (8 bytes) followed by a Vorbis comment block;
//   it starts and ends on page boundaries
// - Audio data pages
//
// Reference:
// - RFC 7845: Ogg Encapsulation for the Opus Audio Codec

use crate::error::{OggError, Result};
use crate::ogg::vorbis::VorbisComment;
use crate::ogg::Page;

pub const OPUS_SIGNATURE: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS: &[u8; 8] = b"OpusTags";

/// Minimum length of an OpusHead packet
pub const OPUS_HEAD_LENGTH: usize = 19;

/// Check if the page is the start of an Ogg Opus stream
pub fn recognize(page: &Page) -> bool {
    page.is_bos()
        && page.payload_len() >= OPUS_HEAD_LENGTH
        && page.payload().starts_with(OPUS_SIGNATURE)
}

/// Decode an OpusTags packet
pub fn parse_tags(packet: &[u8]) -> Result<VorbisComment> {
    let body = packet
        .strip_prefix(OPUS_TAGS.as_slice())
        .ok_or_else(|| OggError::invalid("comment packet does not start with OpusTags"))?;
    VorbisComment::parse(body)
}

/// Encode an OpusTags packet
pub fn encode_tags(comment: &VorbisComment) -> Vec<u8> {
    let mut packet = OPUS_TAGS.to_vec();
    packet.extend(comment.to_bytes());
    packet
}

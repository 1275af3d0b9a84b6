// Ogg container support
//
// OGG Page Layout (all integers little-endian):
// - Capture Pattern: "OggS" (4 bytes)
// - Version: 0 (1 byte)
// - Header Type: 1=continuation, 2=bos, 4=eos (1 byte)
// - Granule Position (8 bytes)
// - Bitstream Serial Number (4 bytes)
// - Page Sequence Number (4 bytes)
// - CRC Checksum (4 bytes)
// - Number of Page Segments (1 byte)
// - Segment Table (variable)
// - Page Data
//
// Packets are split into 255-byte lacing segments; a lacing value below 255
// ends the packet. A page whose last lacing value is 255 leaves its packet
// open for the next page.

pub mod crc;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod packet;
pub mod page;
pub mod splice;
pub mod stream;
pub mod vorbis;

pub use packet::{AssemblerState, Fragment, Packet, PageArena, PageId};
pub use page::Page;
pub use splice::{SequencePolicy, SpliceReport};
pub use stream::OggStream;

// OGG signature
pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";

// OGG page header types
pub const OGG_HEADER_TYPE_CONTINUATION: u8 = 0x01;
pub const OGG_HEADER_TYPE_BOS: u8 = 0x02; // Beginning of Stream
pub const OGG_HEADER_TYPE_EOS: u8 = 0x04; // End of Stream

/// Size of the fixed page header, without the segment table
pub const OGG_PAGE_HEADER_SIZE: usize = 27;

/// Maximum number of lacing values in one segment table
pub const OGG_MAX_SEGMENTS: usize = 255;

/// Lacing value meaning "this packet continues"
pub const OGG_LACING_CONTINUE: u8 = 255;

/// Largest payload a page may carry when no packet ends on it
pub const OGG_MAX_CONTINUED_DATA: usize = 255 * 255;

/// Largest payload a page may carry when a packet ends on it
pub const OGG_MAX_TERMINATED_DATA: usize = 255 * 255 - 1;

/// Granule position marking a page on which no packet completes
pub const OGG_GRANULE_NO_PACKET: u64 = u64::MAX;

/// Byte offset of the checksum field inside the page header
pub(crate) const OGG_CRC_OFFSET: usize = 22;

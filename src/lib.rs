// opustag - Ogg container layer and comment header editor
//
// Reads Ogg pages with checksum verification, assembles packets across page
// boundaries and splices replacement packets back into a file, moving the
// rest of the stream as needed.

pub mod error;
pub mod ogg;
pub mod opus;
pub mod tags;
pub mod utils;

pub use error::{ErrorKind, OggError, Result};
pub use ogg::page::{read_page, write_page};
pub use ogg::vorbis::VorbisComment;
pub use ogg::{
    AssemblerState, Fragment, OggStream, Packet, Page, PageArena, PageId, SequencePolicy,
    SpliceReport,
};
pub use tags::{read_tags, summarize, write_tags, write_tags_atomic, Codec, CommentHeader, StreamSummary};
pub use utils::io::{FileIo, MemoryIo, StreamIo};

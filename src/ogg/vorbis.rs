// Vorbis comment block and Vorbis header recognition
//
// The same comment layout is carried by Ogg Vorbis ("\x03vorbis" prefix,
// trailing framing bit) and Ogg Opus ("OpusTags" prefix, optional padding).

use log::warn;
use serde::Serialize;

use crate::error::{OggError, Result};
use crate::ogg::Page;

/// First bytes of the Vorbis identification header
pub const VORBIS_IDENT_HEADER: &[u8; 7] = b"\x01vorbis";

/// First bytes of the Vorbis comment header
pub const VORBIS_COMMENT_HEADER: &[u8; 7] = b"\x03vorbis";

/// Minimum length of a Vorbis identification header
pub const VORBIS_IDENT_LENGTH: usize = 30;

/// Vorbis comment structure
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VorbisComment {
    pub vendor_string: String,
    pub comments: Vec<(String, String)>,
    /// Bytes following the comment list (framing bit or padding), kept as is
    #[serde(skip)]
    pub trailing: Vec<u8>,
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                OggError::invalid(format!(
                    "comment header truncated while reading {} ({} bytes at {})",
                    what, len, self.pos
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32_le(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl VorbisComment {
    pub fn new(vendor_string: impl Into<String>) -> Self {
        VorbisComment {
            vendor_string: vendor_string.into(),
            ..Default::default()
        }
    }

    /// Parse a comment block (without any codec prefix)
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader { data, pos: 0 };

        let vendor_length = reader.read_u32_le("vendor length")? as usize;
        let vendor_string = String::from_utf8_lossy(reader.take(vendor_length, "vendor string")?).to_string();

        let comment_count = reader.read_u32_le("comment count")? as usize;

        // Every entry needs at least its 4-byte length
        let mut comments = Vec::with_capacity(comment_count.min(reader.rest().len() / 4));
        for _ in 0..comment_count {
            let comment_length = reader.read_u32_le("comment length")? as usize;
            let comment_string = String::from_utf8_lossy(reader.take(comment_length, "comment")?).to_string();

            // Parse comment (format: FIELD=value)
            match comment_string.split_once('=') {
                Some((field, value)) => comments.push((field.to_string(), value.to_string())),
                None => warn!("dropping comment without '=': {:?}", comment_string),
            }
        }

        Ok(VorbisComment {
            vendor_string,
            comments,
            trailing: reader.rest().to_vec(),
        })
    }

    /// Serialize the comment block (without any codec prefix)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.vendor_string.len() as u32).to_le_bytes());
        out.extend_from_slice(self.vendor_string.as_bytes());
        out.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for (field, value) in &self.comments {
            let entry = format!("{}={}", field, value);
            out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.as_bytes());
        }
        out.extend_from_slice(&self.trailing);
        out
    }

    /// Get the first value of a field
    pub fn get(&self, field: &str) -> Option<&String> {
        self.comments
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    }

    /// Get every value of a field, in order
    pub fn get_all(&self, field: &str) -> Vec<&str> {
        self.comments
            .iter()
            .filter(|(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Append a value, keeping existing ones
    pub fn add(&mut self, field: &str, value: &str) -> Result<()> {
        if !is_valid_field_name(field) {
            return Err(OggError::invalid(format!("invalid comment field name {:?}", field)));
        }
        self.comments.push((field.to_string(), value.to_string()));
        Ok(())
    }

    /// Replace every value of a field with a single one.
    ///
    /// The new value takes the position of the first old one.
    pub fn set(&mut self, field: &str, value: &str) -> Result<()> {
        match self.comments.iter().position(|(f, _)| f.eq_ignore_ascii_case(field)) {
            Some(index) => {
                self.comments[index].1 = value.to_string();
                let mut seen = 0;
                self.comments.retain(|(f, _)| {
                    if f.eq_ignore_ascii_case(field) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
                Ok(())
            }
            None => self.add(field, value),
        }
    }

    /// Remove every value of a field, returning how many were removed
    pub fn remove(&mut self, field: &str) -> usize {
        let before = self.comments.len();
        self.comments.retain(|(f, _)| !f.eq_ignore_ascii_case(field));
        before - self.comments.len()
    }

    pub fn clear(&mut self) {
        self.comments.clear();
    }
}

/// Field names are printable ASCII 0x20..=0x7D, excluding '='
pub fn is_valid_field_name(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| (0x20..=0x7D).contains(&b) && b != b'=')
}

/// Check if the page starts a Vorbis stream
pub fn is_vorbis_ident(page: &Page) -> bool {
    page.is_bos()
        && page.payload_len() >= VORBIS_IDENT_LENGTH
        && page.payload().starts_with(VORBIS_IDENT_HEADER)
}

/// Common Vorbis comment field names
pub struct VorbisFields;
impl VorbisFields {
    pub const TITLE: &'static str = "TITLE";
    pub const ARTIST: &'static str = "ARTIST";
    pub const ALBUM: &'static str = "ALBUM";
    pub const DATE: &'static str = "DATE";
    pub const TRACKNUMBER: &'static str = "TRACKNUMBER";
    pub const GENRE: &'static str = "GENRE";
    pub const COMMENT: &'static str = "COMMENT";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ogg::OGG_HEADER_TYPE_BOS;

    fn sample() -> VorbisComment {
        let mut comment = VorbisComment::new("libopus 1.4");
        comment.add(VorbisFields::TITLE, "Song").unwrap();
        comment.add(VorbisFields::ARTIST, "A").unwrap();
        comment.add(VorbisFields::ARTIST, "B").unwrap();
        comment
    }

    #[test]
    fn test_parse_encoded_block() {
        let mut comment = sample();
        comment.trailing = vec![1];
        let parsed = VorbisComment::parse(&comment.to_bytes()).unwrap();
        assert_eq!(parsed, comment);
        assert_eq!(parsed.get("title"), Some(&"Song".to_string()));
        assert_eq!(parsed.get_all("Artist"), vec!["A", "B"]);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let mut comment = VorbisComment::new("v");
        comment.add("COMMENT", "a=b").unwrap();
        let parsed = VorbisComment::parse(&comment.to_bytes()).unwrap();
        assert_eq!(parsed.get("comment"), Some(&"a=b".to_string()));
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut comment = sample();
        comment.set("artist", "C").unwrap();
        assert_eq!(comment.get_all("ARTIST"), vec!["C"]);
        assert_eq!(comment.comments[1], ("ARTIST".to_string(), "C".to_string()));
        comment.set("GENRE", "Jazz").unwrap();
        assert_eq!(comment.comments.len(), 3);
        assert_eq!(comment.remove("genre"), 1);
        assert_eq!(comment.remove("genre"), 0);
    }

    #[test]
    fn test_invalid_field_names() {
        assert!(is_valid_field_name("REPLAYGAIN_TRACK_GAIN"));
        assert!(!is_valid_field_name(""));
        assert!(!is_valid_field_name("A=B"));
        assert!(!is_valid_field_name("TITLE~"));
        assert!(!is_valid_field_name("TÍTULO"));
        let mut comment = VorbisComment::default();
        assert_eq!(comment.add("A=B", "x").unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_truncated_block_is_invalid() {
        let bytes = sample().to_bytes();
        for cut in [0, 3, 10, bytes.len() - 1] {
            let err = VorbisComment::parse(&bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "cut at {}", cut);
        }
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let mut bytes = VorbisComment::new("v").to_bytes();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(VorbisComment::parse(&bytes).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_vorbis_ident_recognition() {
        let mut data = VORBIS_IDENT_HEADER.to_vec();
        data.resize(VORBIS_IDENT_LENGTH, 0);
        let page = Page::new(OGG_HEADER_TYPE_BOS, 0, 1, 0, data.clone()).unwrap();
        assert!(is_vorbis_ident(&page));
        let page = Page::new(0, 0, 1, 0, data).unwrap();
        assert!(!is_vorbis_ident(&page));
    }
}

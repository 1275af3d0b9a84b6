// CLI command implementations
//
// Every command returns the number of files that failed; a failure on one
// file is reported and the rest are still processed.

use anyhow::{bail, Context, Result};
use glob::glob;
use log::debug;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use opustag::{
    read_tags, summarize, write_tags_atomic, Codec, OggStream, SequencePolicy, StreamSummary,
    VorbisComment,
};

use crate::cli::output::OutputFormatter;

/// Expand glob patterns; plain paths are passed through untouched
pub fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }

        let before = paths.len();
        for entry in glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))? {
            paths.push(entry.with_context(|| format!("Cannot read match of {}", pattern))?);
        }
        if paths.len() == before {
            bail!("No files match {}", pattern);
        }
    }
    Ok(paths)
}

#[derive(Serialize)]
struct InfoRecord<'a> {
    file: &'a str,
    #[serde(flatten)]
    summary: StreamSummary,
}

/// Show stream summaries
pub fn command_info(files: &[String], formatter: &OutputFormatter) -> Result<usize> {
    let mut stdout = io::stdout().lock();
    for_each_file(files, formatter, |path| {
        let mut stream = OggStream::open_read_only(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let summary = summarize(&mut stream).with_context(|| format!("Failed to read {}", path.display()))?;

        let name = path.display().to_string();
        if formatter.is_json() {
            formatter.output_json(&InfoRecord { file: &name, summary }, &mut stdout)?;
        } else {
            writeln!(stdout, "{}", name)?;
            let rows = [
                ("serial", summary.serial.map_or("-".to_string(), |s| format!("{:#010x}", s))),
                ("codec", summary.codec.map_or("unknown", |c| c.name()).to_string()),
                ("pages", summary.pages.to_string()),
                ("packets", summary.packets.to_string()),
                ("bytes", summary.bytes.to_string()),
                ("granule", summary.last_granule.map_or("-".to_string(), |g| g.to_string())),
                ("eos", summary.eos.to_string()),
            ];
            formatter.output_table(&rows, &mut stdout)?;
        }
        Ok(())
    })
}

#[derive(Serialize)]
struct PageRecord {
    sequence: u32,
    offset: Option<u64>,
    serial: u32,
    granule_position: u64,
    header_type: u8,
    segments: usize,
    payload_len: usize,
    checksum: u32,
}

/// List the pages of one file
pub fn command_pages(file: &str, formatter: &OutputFormatter) -> Result<usize> {
    let mut stdout = io::stdout().lock();
    let mut stream =
        OggStream::open_read_only(file).with_context(|| format!("Failed to open {}", file))?;

    let mut count = 0;
    while let Some(id) = stream
        .next_page()
        .with_context(|| format!("Failed to read page {} of {}", count, file))?
    {
        if let Some(page) = stream.page(id) {
            let record = PageRecord {
                sequence: page.sequence,
                offset: page.offset,
                serial: page.serial,
                granule_position: page.granule_position,
                header_type: page.header_type,
                segments: page.segments().len(),
                payload_len: page.payload_len(),
                checksum: page.checksum,
            };
            if formatter.is_json() {
                formatter.output_json(&record, &mut stdout)?;
            } else {
                let mut flags = String::new();
                flags.push(if page.is_continued() { 'c' } else { '-' });
                flags.push(if page.is_bos() { 'b' } else { '-' });
                flags.push(if page.is_eos() { 'e' } else { '-' });
                writeln!(
                    stdout,
                    "{:>6} @{:<10} {} granule {:<20} {:>3} segs {:>6} bytes crc {:08x}",
                    record.sequence,
                    record.offset.unwrap_or(0),
                    flags,
                    record.granule_position as i64,
                    record.segments,
                    record.payload_len,
                    record.checksum
                )?;
            }
        }
        count += 1;
        stream.release_pages();
    }

    formatter.print_success(&format!("{}: {} pages", file, count));
    Ok(0)
}

#[derive(Serialize)]
struct TagsRecord<'a> {
    file: &'a str,
    codec: Codec,
    vendor: &'a str,
    comments: &'a [(String, String)],
}

/// Print comment headers
pub fn command_tags(files: &[String], formatter: &OutputFormatter) -> Result<usize> {
    let mut stdout = io::stdout().lock();
    for_each_file(files, formatter, |path| {
        let mut stream = OggStream::open_read_only(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let header = read_tags(&mut stream)
            .with_context(|| format!("Failed to read comment header of {}", path.display()))?;

        let name = path.display().to_string();
        if formatter.is_json() {
            let record = TagsRecord {
                file: &name,
                codec: header.codec,
                vendor: &header.comment.vendor_string,
                comments: &header.comment.comments,
            };
            formatter.output_json(&record, &mut stdout)?;
        } else {
            writeln!(stdout, "{} ({})", name, header.codec.name())?;
            writeln!(stdout, "  vendor: {}", header.comment.vendor_string)?;
            for (field, value) in &header.comment.comments {
                writeln!(stdout, "  {}={}", field, value)?;
            }
        }
        Ok(())
    })
}

/// Edits requested by the set command
#[derive(Debug, Default)]
pub struct TagEdits {
    pub tags: Vec<(String, String)>,
    pub remove: Vec<String>,
    pub clear: bool,
    pub vendor: Option<String>,
}

impl TagEdits {
    /// Apply clear, removals, vendor and assignments, in that order.
    ///
    /// The first assignment of a key replaces its old values; later ones
    /// for the same key are appended.
    pub fn apply(&self, comment: &mut VorbisComment) -> Result<()> {
        if self.clear {
            comment.clear();
        }
        for key in &self.remove {
            let removed = comment.remove(key);
            debug!("removed {} value(s) of {}", removed, key);
        }
        if let Some(vendor) = &self.vendor {
            comment.vendor_string = vendor.clone();
        }

        let mut assigned: Vec<&str> = Vec::new();
        for (key, value) in &self.tags {
            if assigned.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                comment.add(key, value)?;
            } else {
                comment.set(key, value)?;
                assigned.push(key);
            }
        }
        Ok(())
    }
}

/// Rewrite the comment header of one file
pub fn command_set(
    file: &str,
    edits: &TagEdits,
    policy: SequencePolicy,
    in_place: bool,
    formatter: &OutputFormatter,
) -> Result<usize> {
    let path = Path::new(file);

    let report = if in_place {
        let mut stream = OggStream::open(path).with_context(|| format!("Failed to open {}", file))?;
        let header = read_tags(&mut stream)
            .with_context(|| format!("Failed to read comment header of {}", file))?;
        let mut comment = header.comment;
        edits.apply(&mut comment)?;
        let payload = header.codec.encode_comment(&comment);
        let report = stream
            .splice(&header.packet, &payload, policy)
            .with_context(|| format!("Failed to rewrite {}", file))?;
        stream.close().with_context(|| format!("Failed to flush {}", file))?;
        report
    } else {
        let mut comment = {
            let mut stream =
                OggStream::open_read_only(path).with_context(|| format!("Failed to open {}", file))?;
            read_tags(&mut stream)
                .with_context(|| format!("Failed to read comment header of {}", file))?
                .comment
        };
        edits.apply(&mut comment)?;
        write_tags_atomic(path, &comment, policy).with_context(|| format!("Failed to rewrite {}", file))?
    };

    if formatter.is_json() {
        formatter.output_json(&report, &mut io::stdout().lock())?;
    } else {
        formatter.print_success(&format!("Updated comment header of {}", file));
        formatter.print_info(&format!(
            "{} -> {} pages, {:+} bytes, {} later pages moved",
            report.old_pages,
            report.new_pages,
            report.delta(),
            report.shifted_pages
        ));
    }
    Ok(0)
}

#[derive(Serialize)]
struct VerifyRecord<'a> {
    file: &'a str,
    ok: bool,
    pages: usize,
    packets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Walk every page of each file
pub fn command_verify(files: &[String], formatter: &OutputFormatter) -> Result<usize> {
    let mut stdout = io::stdout().lock();
    let mut failed = 0;
    for path in expand_paths(files)? {
        let name = path.display().to_string();
        let result = OggStream::open_read_only(&path).and_then(|mut stream| summarize(&mut stream));

        let record = match &result {
            Ok(summary) => VerifyRecord {
                file: &name,
                ok: true,
                pages: summary.pages,
                packets: summary.packets,
                error: None,
            },
            Err(e) => VerifyRecord {
                file: &name,
                ok: false,
                pages: 0,
                packets: 0,
                error: Some(e.to_string()),
            },
        };
        if !record.ok {
            failed += 1;
        }

        if formatter.is_json() {
            formatter.output_json(&record, &mut stdout)?;
        } else if let Some(error) = &record.error {
            formatter.print_error(&format!("{}: {}", name, error));
        } else {
            formatter.print_success(&format!("{}: {} pages, {} packets", name, record.pages, record.packets));
        }
    }
    Ok(failed)
}

// Run one fallible action per expanded file, counting failures
fn for_each_file<F>(patterns: &[String], formatter: &OutputFormatter, mut action: F) -> Result<usize>
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut failed = 0;
    for path in expand_paths(patterns)? {
        if let Err(e) = action(&path) {
            formatter.print_error(&format!("{:#}", e));
            failed += 1;
        }
    }
    Ok(failed)
}

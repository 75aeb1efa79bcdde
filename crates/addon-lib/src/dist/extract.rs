//! Streaming `.tar.gz` extraction.
//!
//! The archive is decoded on a blocking thread that reads compressed chunks
//! from a channel, so extraction proceeds while the download is still in
//! flight.

use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;

/// Which archive members to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    All,
    /// Only regular files with a `.h` extension (any case)
    HeadersOnly,
}

impl EntryFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        match self {
            EntryFilter::All => true,
            EntryFilter::HeadersOnly => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("h"))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub dest: PathBuf,
    /// Leading path components removed from every member name
    pub strip_components: usize,
    pub filter: EntryFilter,
}

impl ExtractOptions {
    /// Layout used for runtime distributions: drop the top-level
    /// `node-vX.Y.Z/` directory and keep headers only
    pub fn headers_into(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            strip_components: 1,
            filter: EntryFilter::HeadersOnly,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Remove `strip` leading components and refuse anything that would land
/// outside the destination. Returns `None` for members to skip.
fn sanitize_member_path(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut stripped = 0;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if stripped < strip {
                    stripped += 1;
                } else {
                    out.push(part);
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Decode a gzip compressed tar stream from `reader` into `options.dest`.
///
/// The reader is drained to its end even after the last tar member, so a
/// producer feeding it never sees the consumer disappear early.
pub fn unpack_tar_gz<R: Read>(reader: R, options: &ExtractOptions) -> io::Result<ExtractSummary> {
    fs::create_dir_all(&options.dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut summary = ExtractSummary::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.into_owned();
        let Some(relative) = sanitize_member_path(&member, options.strip_components) else {
            if member.components().any(|c| matches!(c, Component::ParentDir)) {
                log::warn!("Skipping archive member outside destination: {:?}", member);
            }
            summary.skipped += 1;
            continue;
        };

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            continue;
        }
        if !kind.is_file() || !options.filter.accepts(&relative) {
            summary.skipped += 1;
            continue;
        }

        let target = options.dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        summary.written += 1;
    }

    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())?;
    io::copy(&mut rest.into_inner(), &mut io::sink())?;

    log::debug!(
        "Extracted {} files into {:?} ({} skipped)",
        summary.written,
        options.dest,
        summary.skipped
    );
    Ok(summary)
}

/// Blocking `Read` over chunks arriving on a tokio channel.
/// End of stream is signalled by every sender being dropped.
pub(crate) struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

use super::error::{DistError, Result};
use super::extract::{self, ChannelReader, ExtractOptions};
use super::types::{ProgressReporter, SilentProgressReporter};
use crate::config;
use futures::StreamExt;
use reqwest::Client;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Compressed chunks buffered between the network and the tar extractor
const EXTRACT_CHANNEL_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    fn hasher(&self) -> StreamHasher {
        match self {
            HashAlgorithm::Sha1 => StreamHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }
}

enum StreamHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl StreamHasher {
    fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamHasher::Sha1(h) => h.update(chunk),
            StreamHasher::Sha256(h) => h.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Sha1(h) => format!("{:x}", h.finalize()),
            StreamHasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Digest a download must match once fully transferred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedDigest {
    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            hex: hex.into(),
        }
    }

    pub fn sha1(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha1,
            hex: hex.into(),
        }
    }

    fn matches(&self, computed: &str) -> bool {
        self.hex.trim().eq_ignore_ascii_case(computed)
    }
}

/// A URL plus the digest it is expected to have, if known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    pub url: String,
    pub expected: Option<ExpectedDigest>,
}

impl DownloadSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected: None,
        }
    }

    pub fn with_digest(mut self, expected: Option<ExpectedDigest>) -> Self {
        self.expected = expected;
        self
    }
}

/// Where transferred bytes go
trait ChunkSink {
    async fn accept(&mut self, chunk: &[u8]) -> Result<()>;
}

impl ChunkSink for Vec<u8> {
    async fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

struct FileSink<'a> {
    file: File,
    path: &'a Path,
}

impl ChunkSink for FileSink<'_> {
    async fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| DistError::io(self.path, e))
    }
}

struct ExtractorSink<'a> {
    tx: mpsc::Sender<Vec<u8>>,
    url: &'a str,
}

impl ChunkSink for ExtractorSink<'_> {
    async fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.tx
            .send(chunk.to_vec())
            .await
            .map_err(|_| DistError::Extract {
                url: self.url.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "archive extractor stopped early",
                ),
            })
    }
}

/// Turns a running byte count into 10% progress steps
struct ProgressSteps {
    total: Option<u64>,
    last_step: u32,
}

impl ProgressSteps {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            last_step: 0,
        }
    }

    /// Percentages crossed since the previous call
    fn advance(&mut self, done: u64) -> Vec<u32> {
        let Some(total) = self.total else {
            return Vec::new();
        };
        let step = ((done.min(total) * 10) / total) as u32;
        if step <= self.last_step {
            return Vec::new();
        }
        let crossed = (self.last_step + 1..=step).map(|s| s * 10).collect();
        self.last_step = step;
        crossed
    }
}

fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|source| DistError::HttpClient { source })
}

struct TransferStats {
    bytes: u64,
    digest: Option<String>,
}

/// Streams HTTP(S) downloads into memory, files or a tar extractor while
/// hashing the bytes as they arrive
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    reporter: Arc<dyn ProgressReporter>,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(build_client(config::USER_AGENT)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            reporter: Arc::new(SilentProgressReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    async fn transfer<S: ChunkSink>(
        &self,
        source: &DownloadSource,
        size_cap: u64,
        sink: &mut S,
    ) -> Result<TransferStats> {
        let url = source.url.as_str();
        let start = Instant::now();
        let download_err = |source| DistError::Download {
            url: url.to_string(),
            source,
        };
        let too_large = || DistError::PayloadTooLarge {
            url: url.to_string(),
            limit: size_cap,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?;

        let total_size = response.content_length();
        log::debug!("Download size: {:?} bytes", total_size);
        if total_size.is_some_and(|len| len > size_cap) {
            return Err(too_large());
        }

        let mut hasher = source.expected.as_ref().map(|e| e.algorithm.hasher());
        let mut progress = ProgressSteps::new(total_size);
        let mut downloaded: u64 = 0;
        let mut chunk_count: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(download_err)?;
            downloaded += chunk.len() as u64;
            if downloaded > size_cap {
                log::warn!("Aborting {}: more than {} bytes received", url, size_cap);
                return Err(too_large());
            }
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk);
            }
            sink.accept(&chunk).await?;
            chunk_count += 1;

            for percent in progress.advance(downloaded) {
                self.reporter.report_percent(url, percent);
            }
        }

        let secs = start.elapsed().as_secs_f64();
        let throughput = (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001); // MB/s
        log::info!(
            "Download stats: url={}, size={} bytes, chunks={}, time={:.2}s, throughput={:.2} MB/s",
            url,
            downloaded,
            chunk_count,
            secs,
            throughput
        );

        Ok(TransferStats {
            bytes: downloaded,
            digest: hasher.map(StreamHasher::finalize_hex),
        })
    }

    fn verify(source: &DownloadSource, stats: &TransferStats) -> Result<()> {
        let (Some(expected), Some(computed)) = (&source.expected, &stats.digest) else {
            return Ok(());
        };
        if !expected.matches(computed) {
            return Err(DistError::ChecksumMismatch {
                url: source.url.clone(),
                algorithm: expected.algorithm.name(),
                expected: expected.hex.clone(),
                actual: computed.clone(),
            });
        }
        log::debug!("{} validated: {}", expected.algorithm.name(), computed);
        Ok(())
    }

    /// Buffer a small response in memory and return it as text
    pub async fn download_string(&self, url: &str) -> Result<String> {
        log::debug!("Downloading to memory: {}", url);
        let mut body = Vec::new();
        self.transfer(&DownloadSource::new(url), config::MANIFEST_SIZE_CAP, &mut body)
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Stream a response to `dest`. Bytes land in a `.part` sibling first and
    /// are only renamed onto `dest` after the digest checks out.
    ///
    /// Returns the computed hex digest when one was requested.
    pub async fn download_file(
        &self,
        source: &DownloadSource,
        size_cap: u64,
        dest: &Path,
    ) -> Result<Option<String>> {
        log::debug!("Downloading: {} -> {:?}", source.url, dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DistError::io(parent, e))?;
        }

        let tmp_name = format!(
            "{}.part",
            dest.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("download")
        );
        let tmp_path = dest.with_file_name(tmp_name);
        let file = File::create(&tmp_path)
            .await
            .map_err(|e| DistError::io(&tmp_path, e))?;
        let mut sink = FileSink {
            file,
            path: &tmp_path,
        };

        let result = async {
            let stats = self.transfer(source, size_cap, &mut sink).await?;
            sink.file
                .flush()
                .await
                .map_err(|e| DistError::io(&tmp_path, e))?;
            sink.file
                .sync_all()
                .await
                .map_err(|e| DistError::io(&tmp_path, e))?;
            Self::verify(source, &stats)?;
            Ok(stats)
        }
        .await;
        drop(sink);

        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&tmp_path, dest)
            .await
            .map_err(|e| DistError::io(dest, e))?;
        log::debug!("Download complete: {:?} ({} bytes)", dest, stats.bytes);
        Ok(stats.digest)
    }

    /// Stream a `.tar.gz` response through gunzip and tar into
    /// `options.dest`, hashing the compressed bytes on the way.
    ///
    /// The digest is checked after the stream has fully drained, so by the
    /// time a mismatch is reported the archive has already been unpacked.
    /// Callers must extract into a location they can discard.
    pub async fn download_tgz(
        &self,
        source: &DownloadSource,
        size_cap: u64,
        options: &ExtractOptions,
    ) -> Result<Option<String>> {
        log::debug!("Downloading and extracting: {} -> {:?}", source.url, options.dest);
        let (tx, rx) = mpsc::channel::<Vec<u8>>(EXTRACT_CHANNEL_DEPTH);
        let extract_options = options.clone();
        let extractor = tokio::task::spawn_blocking(move || {
            extract::unpack_tar_gz(ChannelReader::new(rx), &extract_options)
        });

        let mut sink = ExtractorSink {
            tx,
            url: &source.url,
        };
        let transfer = self.transfer(source, size_cap, &mut sink).await;
        drop(sink);

        let extraction = match extractor.await {
            Ok(result) => result,
            Err(join_err) => Err(std::io::Error::other(join_err.to_string())),
        };

        let stats = match (transfer, extraction) {
            (Ok(stats), Ok(summary)) => {
                log::debug!("Archive {} yielded {} files", source.url, summary.written);
                stats
            }
            (Ok(_), Err(source_err)) | (Err(DistError::Extract { .. }), Err(source_err)) => {
                return Err(DistError::Extract {
                    url: source.url.clone(),
                    source: source_err,
                });
            }
            (Err(e), _) => return Err(e),
        };

        Self::verify(source, &stats)?;
        Ok(stats.digest)
    }
}

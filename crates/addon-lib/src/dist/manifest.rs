use super::downloader::{Downloader, ExpectedDigest};
use super::error::Result;
use super::runtime::Runtime;
use crate::config;
use crate::utils::url::join_url;
use std::collections::HashMap;

/// One line of a `SHASUMS256.txt` manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaSum {
    pub path: String,
    pub sum: String,
}

/// Lookup table of published SHA-256 digests keyed by path relative to the
/// release directory (`node-v18.16.1-headers.tar.gz`, `win-x64/node.lib`)
#[derive(Debug, Clone, Default)]
pub struct ShaManifest {
    entries: Vec<ShaSum>,
    index: HashMap<String, usize>,
}

impl ShaManifest {
    /// Parse `<hex>  <path>` lines. Blank lines and lines missing either
    /// field are ignored; if a path is listed twice the first line wins.
    pub fn parse(text: &str) -> Self {
        let mut manifest = Self::default();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(sum), Some(path)) = (fields.next(), fields.next()) else {
                continue;
            };
            if manifest.index.contains_key(path) {
                continue;
            }
            manifest
                .index
                .insert(path.to_string(), manifest.entries.len());
            manifest.entries.push(ShaSum {
                path: path.to_string(),
                sum: sum.to_string(),
            });
        }
        manifest
    }

    pub fn entries(&self) -> &[ShaSum] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&ShaSum> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest to verify `path` against. A path missing from the manifest
    /// cannot be verified and is let through with a warning.
    pub fn expected_for(&self, path: &str) -> Option<ExpectedDigest> {
        match self.get(path) {
            Some(entry) => Some(ExpectedDigest::sha256(entry.sum.clone())),
            None => {
                log::warn!("No checksum published for '{}', skipping verification", path);
                None
            }
        }
    }
}

/// Fetch `{external_path}/SHASUMS256.txt`.
///
/// Runtimes that publish no manifest yield `Ok(None)` without touching the
/// network.
pub async fn fetch(
    downloader: &Downloader,
    runtime: Runtime,
    external_path: &str,
) -> Result<Option<ShaManifest>> {
    if !runtime.publishes_manifest() {
        log::debug!("{} publishes no checksum manifest", runtime);
        return Ok(None);
    }
    let url = join_url(external_path, config::SHASUMS_FILE)?;
    let text = downloader.download_string(&url).await?;
    let manifest = ShaManifest::parse(&text);
    log::debug!("Loaded {} checksums from {}", manifest.len(), url);
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_lines_and_skips_blanks() {
        let manifest =
            ShaManifest::parse("abc123  node-v1.0.0.tar.gz\ndef456  win-x64/node.lib\n\n");

        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.entries(),
            &[
                ShaSum {
                    path: "node-v1.0.0.tar.gz".into(),
                    sum: "abc123".into()
                },
                ShaSum {
                    path: "win-x64/node.lib".into(),
                    sum: "def456".into()
                },
            ]
        );
        assert_eq!(manifest.get("win-x64/node.lib").unwrap().sum, "def456");
    }

    #[test]
    fn incomplete_lines_and_duplicates() {
        let manifest = ShaManifest::parse("lonely\n   \nfirst a.tar.gz extra\nsecond a.tar.gz\r\n");
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("a.tar.gz").unwrap().sum, "first");
        assert!(manifest.expected_for("missing.lib").is_none());
        assert_eq!(
            manifest.expected_for("a.tar.gz"),
            Some(ExpectedDigest::sha256("first"))
        );
    }

    #[tokio::test]
    async fn fetch_skips_runtimes_without_manifest() {
        let downloader = Downloader::new().unwrap();
        let result = fetch(&downloader, Runtime::Electron, "http://127.0.0.1:9/v1.0.0/")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fetch_reads_node_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v18.16.1/SHASUMS256.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("aa  node-v18.16.1-headers.tar.gz\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let downloader = Downloader::new().unwrap();
        let manifest = fetch(
            &downloader,
            Runtime::Node,
            &format!("{}/v18.16.1/", server.uri()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(manifest.get("node-v18.16.1-headers.tar.gz").unwrap().sum, "aa");
    }
}

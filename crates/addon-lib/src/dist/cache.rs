//! On-disk store of extracted runtime distributions.
//!
//! Layout: `{root}/{runtime}-{arch}/v{version}/` holding the headers kept
//! from the archive and, for Windows targets, the import libraries at their
//! `winLibs` relative paths. Entries are assembled in a staging directory
//! and only renamed into place once every download has been verified.

use super::downloader::{DownloadSource, Downloader};
use super::error::Result;
use super::extract::ExtractOptions;
use super::manifest::{self, ShaManifest};
use super::runtime::{ResolvedTarget, RuntimePathsInfo};
use super::transaction::{CommitOutcome, StagedEntry};
use super::types::Platform;
use crate::config;
use crate::utils::url::join_url;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RuntimeCache {
    root: PathBuf,
    downloader: Downloader,
    platform: Platform,
    runtime_directory: Option<PathBuf>,
}

impl RuntimeCache {
    pub fn new(root: impl Into<PathBuf>, downloader: Downloader) -> Self {
        Self {
            root: root.into(),
            downloader,
            platform: Platform::current(),
            runtime_directory: None,
        }
    }

    /// Target a different OS than the host. Only affects whether import
    /// libraries are part of an entry.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Use a fixed directory (`npm_config_nodedir`, `--runtime-directory`)
    /// instead of the computed entry path
    pub fn with_runtime_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.runtime_directory = dir;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// `{root}/{runtime}-{arch}/v{version}` unless a runtime directory
    /// override is set
    pub fn internal_path(&self, target: &ResolvedTarget) -> PathBuf {
        if let Some(dir) = &self.runtime_directory {
            return dir.clone();
        }
        let options = &target.options;
        self.root
            .join(format!("{}-{}", options.runtime, options.runtime_arch))
            .join(format!("v{}", options.runtime_version))
    }

    /// Absolute paths of the Windows import libraries inside the entry
    pub fn win_lib_paths(&self, target: &ResolvedTarget) -> Vec<PathBuf> {
        let base = self.internal_path(target);
        target
            .paths
            .win_libs
            .iter()
            .map(|lib| base.join(lib.relative_path()))
            .collect()
    }

    /// Directories a compiler needs on its include path
    pub fn include_dirs(&self, target: &ResolvedTarget) -> Vec<PathBuf> {
        let base = self.internal_path(target);
        if target.paths.header_only {
            vec![base.join("include").join("node")]
        } else {
            vec![
                base.join("src"),
                base.join("deps").join("v8").join("include"),
                base.join("deps").join("uv").join("include"),
            ]
        }
    }

    /// True when the entry holds every artifact the target needs. Never
    /// fails: any filesystem error counts as "not downloaded".
    pub fn is_downloaded(&self, target: &ResolvedTarget) -> bool {
        entry_is_complete(&self.internal_path(target), &target.paths, self.platform)
    }

    pub async fn ensure_downloaded(&self, target: &ResolvedTarget) -> Result<()> {
        if self.is_downloaded(target) {
            log::debug!(
                "Runtime distribution found in {:?}",
                self.internal_path(target)
            );
            return Ok(());
        }
        self.download(target).await
    }

    /// Fetch the distribution for `target` and commit it to the cache.
    ///
    /// The header archive and, on Windows, each import library are fetched
    /// concurrently into a staging directory. Any failure fails the whole
    /// download and discards the staging directory. With a runtime directory
    /// override the verified files are merged into it and nothing already
    /// there is removed.
    pub async fn download(&self, target: &ResolvedTarget) -> Result<()> {
        let final_dir = self.internal_path(target);
        let options = &target.options;
        let label = format!(
            "{}-{}-v{}",
            options.runtime, options.runtime_arch, options.runtime_version
        );
        self.downloader.reporter().set_message(&format!(
            "Downloading {} {} headers",
            options.runtime, options.runtime_version
        ));

        // A user supplied directory only ever gains files; computed entries
        // are replaced as a whole
        let staged = if self.runtime_directory.is_some() {
            StagedEntry::begin_within(label, &final_dir)?
        } else {
            StagedEntry::begin(label, &final_dir)?
        };
        if let Err(e) = self.fill(target, &staged).await {
            staged.rollback(&e.to_string());
            return Err(e);
        }

        if self.runtime_directory.is_some() {
            staged.merge()?;
            log::info!("Runtime distribution added to {:?}", final_dir);
            return Ok(());
        }

        let platform = self.platform;
        let paths = target.paths.clone();
        match staged.commit(|dir| entry_is_complete(dir, &paths, platform))? {
            CommitOutcome::Committed => log::info!("Runtime distribution ready in {:?}", final_dir),
            CommitOutcome::AlreadyPresent => {
                log::info!("Using runtime distribution committed concurrently in {:?}", final_dir)
            }
        }
        Ok(())
    }

    async fn fill(&self, target: &ResolvedTarget, staged: &StagedEntry) -> Result<()> {
        let paths = &target.paths;
        let manifest = manifest::fetch(&self.downloader, target.runtime(), &paths.external_path).await?;
        staged.checkpoint("manifest");
        let expected = |relative: &str| manifest.as_ref().and_then(|m: &ShaManifest| m.expected_for(relative));

        let tar_source = DownloadSource::new(join_url(&paths.external_path, &paths.tar_path)?)
            .with_digest(expected(&paths.tar_path));
        let extract_options = ExtractOptions::headers_into(staged.path());

        let mut lib_sources = Vec::new();
        if self.platform.is_windows() {
            for lib in &paths.win_libs {
                let relative = lib.relative_path();
                let source = DownloadSource::new(join_url(&paths.external_path, &relative)?)
                    .with_digest(expected(&relative));
                lib_sources.push((source, staged.path().join(&relative)));
            }
        }

        let tarball = self
            .downloader
            .download_tgz(&tar_source, config::TARBALL_SIZE_CAP, &extract_options);
        let libs = futures::future::join_all(lib_sources.iter().map(|(source, dest)| {
            self.downloader
                .download_file(source, config::WIN_LIB_SIZE_CAP, dest)
        }));
        // Wait for every transfer so nothing still writes into the staging
        // directory once it is rolled back
        let (tar_result, lib_results) = tokio::join!(tarball, libs);
        tar_result?;
        for result in lib_results {
            result?;
        }
        staged.checkpoint("downloads verified");
        Ok(())
    }
}

fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn entry_is_complete(dir: &Path, paths: &RuntimePathsInfo, platform: Platform) -> bool {
    let is_dir = fs::metadata(dir).map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        return false;
    }
    let headers_ok = if paths.header_only {
        is_file(&dir.join("include").join("node").join("node.h"))
    } else {
        is_file(&dir.join("src").join("node.h"))
            && is_file(&dir.join("deps").join("v8").join("include").join("v8.h"))
    };
    if !headers_ok {
        return false;
    }
    if platform.is_windows() {
        return paths
            .win_libs
            .iter()
            .all(|lib| is_file(&dir.join(lib.relative_path())));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::runtime::{Mirrors, Runtime, TargetOptions};

    fn target(runtime: Runtime, version: &str, arch: &str) -> ResolvedTarget {
        TargetOptions::new(runtime, version, arch)
            .resolve(&Mirrors::uniform("http://127.0.0.1:9"))
            .unwrap()
    }

    fn cache(root: &Path, platform: Platform) -> RuntimeCache {
        RuntimeCache::new(root, Downloader::new().unwrap()).with_platform(platform)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn internal_path_layout_and_override() {
        let tmp = tempfile::tempdir().unwrap();
        let t = target(Runtime::Electron, "v28.1.0", "arm64");
        let store = cache(tmp.path(), Platform::Linux);
        assert_eq!(
            store.internal_path(&t),
            tmp.path().join("electron-arm64").join("v28.1.0")
        );

        let custom = tmp.path().join("my-node");
        let store = store.with_runtime_directory(Some(custom.clone()));
        assert_eq!(store.internal_path(&t), custom);
        assert_eq!(
            store.include_dirs(&t),
            vec![custom.join("include").join("node")]
        );
    }

    #[test]
    fn missing_directory_is_not_downloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = cache(tmp.path(), Platform::Linux);
        assert!(!store.is_downloaded(&target(Runtime::Node, "18.16.1", "x64")));
    }

    #[test]
    fn full_source_needs_both_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = cache(tmp.path(), Platform::Linux);
        let t = target(Runtime::Node, "0.12.18", "x64");
        let dir = store.internal_path(&t);

        touch(&dir.join("src/node.h"));
        assert!(!store.is_downloaded(&t));

        touch(&dir.join("deps/v8/include/v8.h"));
        assert!(store.is_downloaded(&t));
        assert_eq!(store.include_dirs(&t).len(), 3);
    }

    #[test]
    fn header_only_entry_must_be_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = cache(tmp.path(), Platform::Linux);
        let t = target(Runtime::Node, "18.16.1", "x64");
        let dir = store.internal_path(&t);

        fs::create_dir_all(dir.join("include/node/node.h")).unwrap();
        assert!(!store.is_downloaded(&t));

        fs::remove_dir(dir.join("include/node/node.h")).unwrap();
        touch(&dir.join("include/node/node.h"));
        assert!(store.is_downloaded(&t));
    }

    #[test]
    fn windows_entry_needs_every_import_library() {
        let tmp = tempfile::tempdir().unwrap();
        let store = cache(tmp.path(), Platform::Windows);
        let t = target(Runtime::Nw, "0.50.0", "x64");
        let dir = store.internal_path(&t);
        touch(&dir.join("src/node.h"));
        touch(&dir.join("deps/v8/include/v8.h"));

        touch(&dir.join("x64/nw.lib"));
        assert!(!store.is_downloaded(&t));

        touch(&dir.join("x64/node.lib"));
        assert!(store.is_downloaded(&t));
        assert_eq!(
            store.win_lib_paths(&t),
            vec![dir.join("x64/nw.lib"), dir.join("x64/node.lib")]
        );

        // Linux ignores import libraries entirely
        fs::remove_file(dir.join("x64/node.lib")).unwrap();
        assert!(cache(tmp.path(), Platform::Linux).is_downloaded(&t));
    }

    #[tokio::test]
    async fn ensure_downloaded_is_a_no_op_for_complete_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = cache(tmp.path(), Platform::Linux);
        let t = target(Runtime::Node, "18.16.1", "x64");
        touch(&store.internal_path(&t).join("include/node/node.h"));

        // The mirror points at a closed port, so any request would fail
        store.ensure_downloaded(&t).await.unwrap();
    }
}

// Index distributor
// Fetches a prebuilt index from a GitHub release when the local copy is
// missing or stale, and records where it came from


use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DistributorConfig, api_base_url};
use crate::database::{
    DOCSTORE_FILE, LAST_UPDATED_FILE, RELEASE_TAG_FILE, VECTORS_DIR, index_files_present,
};
use crate::indexer::write_timestamp;

const API_TIMEOUT_SECONDS: u64 = 30;
const USER_AGENT: &str = concat!("pypsa-helper-bot/", env!("CARGO_PKG_VERSION"));

/// Freshness of the local index directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No index directory
    Absent,
    /// Directory exists but the timestamp is missing or too old
    Stale,
    /// Timestamp is within the configured age
    Fresh,
}

/// Why a release lookup produced nothing
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no release with tag prefix '{prefix}' carrying asset '{asset}'")]
    NotFound { prefix: String, asset: String },

    #[error("release lookup failed: {0}")]
    Network(String),

    #[error("release listing could not be parsed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum DistributorError {
    #[error("no index is available locally and none could be found remotely: {0}")]
    Unavailable(#[source] LookupError),

    #[error("index download failed: {0}")]
    Download(String),

    #[error("index archive could not be installed: {0}")]
    Extract(String),

    #[error("invalid distributor configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A release as returned by the GitHub releases API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// The asset chosen for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub tag: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Local index is fresh and no download was forced
    AlreadyFresh,
    /// A release was downloaded and installed
    Downloaded { tag: String },
    /// No release was found; the existing local index stays in use
    KeptLocal,
}

/// What `status` reports about the local index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub exists: bool,
    pub path: PathBuf,
    pub last_updated: Option<String>,
    pub release_tag: Option<String>,
    pub vectors_size_bytes: Option<u64>,
    pub docstore_size_bytes: Option<u64>,
}

/// Pick the first release, newest first, whose tag and asset match
///
/// Releases are ordered by `created_at` descending; releases without a
/// timestamp, or with equal timestamps, keep their listing order.
#[inline]
pub fn select_release(releases: &[Release], prefix: &str, asset_name: &str) -> Option<ReleaseAsset> {
    let mut ordered: Vec<&Release> = releases.iter().collect();
    if ordered.iter().all(|r| r.created_at.is_some()) {
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    ordered
        .into_iter()
        .filter(|release| release.tag_name.starts_with(prefix))
        .find_map(|release| {
            release
                .assets
                .iter()
                .find(|asset| asset.name == asset_name)
                .map(|asset| ReleaseAsset {
                    tag: release.tag_name.clone(),
                    download_url: asset.browser_download_url.clone(),
                })
        })
}

pub struct IndexDistributor {
    config: DistributorConfig,
    index_path: PathBuf,
    token: Option<String>,
    api_base: Url,
    api_agent: ureq::Agent,
    download_agent: ureq::Agent,
}

impl std::fmt::Debug for IndexDistributor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDistributor")
            .field("owner", &self.config.owner)
            .field("repo", &self.config.repo)
            .field("index_path", &self.index_path)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl IndexDistributor {
    #[inline]
    pub fn new(
        config: DistributorConfig,
        index_path: impl Into<PathBuf>,
        token: Option<String>,
    ) -> Result<Self, DistributorError> {
        let api_base = api_base_url(&config.api_base)
            .map_err(|e| DistributorError::Config(e.to_string()))?;

        let api_agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(API_TIMEOUT_SECONDS)))
            .user_agent(USER_AGENT)
            .build()
            .into();
        let download_agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.download_timeout_seconds)))
            .user_agent(USER_AGENT)
            .build()
            .into();

        Ok(Self {
            config,
            index_path: index_path.into(),
            token,
            api_base,
            api_agent,
            download_agent,
        })
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[inline]
    pub fn index_state(&self) -> IndexState {
        self.index_state_at(SystemTime::now())
    }

    /// Classify the local index as of `now`
    #[inline]
    pub fn index_state_at(&self, now: SystemTime) -> IndexState {
        if !self.index_path.is_dir() {
            return IndexState::Absent;
        }

        let stamp = self.index_path.join(LAST_UPDATED_FILE);
        let Ok(modified) = fs::metadata(&stamp).and_then(|m| m.modified()) else {
            return IndexState::Stale;
        };

        let max_age = Duration::from_secs(self.config.max_age_hours.saturating_mul(3600));
        let age = now.duration_since(modified).unwrap_or_default();
        debug!("Local index is {:.1} hours old", age.as_secs_f64() / 3600.0);

        if age <= max_age {
            IndexState::Fresh
        } else {
            IndexState::Stale
        }
    }

    fn releases_url(&self) -> Result<Url, LookupError> {
        let mut url = self
            .api_base
            .join(&format!(
                "repos/{}/{}/releases",
                self.config.owner, self.config.repo
            ))
            .map_err(|e| LookupError::Malformed(format!("bad releases URL: {}", e)))?;
        url.query_pairs_mut().append_pair("per_page", "100");
        Ok(url)
    }

    /// List releases of the configured repository
    #[inline]
    pub fn list_releases(&self) -> Result<Vec<Release>, LookupError> {
        let url = self.releases_url()?;
        debug!("Fetching releases from {}", url);

        let mut request = self
            .api_agent
            .get(url.as_str())
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("token {}", token));
        }

        let body = request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(404) => LookupError::NotFound {
                    prefix: self.config.tag_prefix.clone(),
                    asset: self.config.asset_name.clone(),
                },
                other => LookupError::Network(other.to_string()),
            })?;

        serde_json::from_str(&body).map_err(|e| LookupError::Malformed(e.to_string()))
    }

    /// Find the newest release that carries the index asset
    #[inline]
    pub fn latest_release(&self) -> Result<ReleaseAsset, LookupError> {
        let releases = self.list_releases()?;
        select_release(&releases, &self.config.tag_prefix, &self.config.asset_name).ok_or_else(
            || LookupError::NotFound {
                prefix: self.config.tag_prefix.clone(),
                asset: self.config.asset_name.clone(),
            },
        )
    }

    /// Download and install the latest release unless the local index is fresh
    #[inline]
    pub fn download_index(&self, force: bool) -> Result<DownloadOutcome, DistributorError> {
        if !force && self.index_state() == IndexState::Fresh {
            info!("Local index is recent. Skipping download.");
            return Ok(DownloadOutcome::AlreadyFresh);
        }

        info!("Looking up the latest index release");
        let asset = match self.latest_release() {
            Ok(asset) => asset,
            Err(e) => {
                warn!("No index release found: {}", e);
                if self.index_path.exists() {
                    info!("Using local index at {}", self.index_path.display());
                    return Ok(DownloadOutcome::KeptLocal);
                }
                return Err(DistributorError::Unavailable(e));
            }
        };

        info!("Found release: {}", asset.tag);
        info!("Downloading from: {}", asset.download_url);

        let archive = self.download_archive(&asset.download_url)?;
        let installed = self.install_archive(&archive, &asset.tag);
        if let Err(e) = fs::remove_file(&archive) {
            debug!("Failed to remove {}: {}", archive.display(), e);
        }
        installed?;

        info!("Index {} downloaded and extracted", asset.tag);
        Ok(DownloadOutcome::Downloaded { tag: asset.tag })
    }

    fn work_dir(&self) -> PathBuf {
        self.index_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    fn download_archive(&self, download_url: &str) -> Result<PathBuf, DistributorError> {
        let work_dir = self.work_dir();
        fs::create_dir_all(&work_dir)?;
        let archive_path = work_dir.join(format!("{}.part", self.config.asset_name));

        match self.fetch_to_file(download_url, &archive_path) {
            Ok(bytes) => {
                info!("Downloaded {:.1} MB", bytes as f64 / 1024.0 / 1024.0);
                Ok(archive_path)
            }
            Err(e) => {
                if archive_path.exists() {
                    if let Err(cleanup) = fs::remove_file(&archive_path) {
                        debug!("Failed to remove partial download: {}", cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn fetch_to_file(&self, download_url: &str, path: &Path) -> Result<u64, DistributorError> {
        let response = self
            .download_agent
            .get(download_url)
            .call()
            .map_err(|e| DistributorError::Download(e.to_string()))?;

        let mut reader = response.into_body().into_reader();
        let mut file = BufWriter::new(File::create(path)?);
        io::copy(&mut reader, &mut file).map_err(|e| DistributorError::Download(e.to_string()))
    }

    /// Unpack `archive` next to the index, then swap it in
    ///
    /// The existing index is only removed once the archive has been unpacked
    /// and found to contain both index files.
    fn install_archive(&self, archive: &Path, tag: &str) -> Result<(), DistributorError> {
        let index_name = self
            .index_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DistributorError::Config("index path has no file name".to_string()))?;

        let unpack_dir = self.work_dir().join(format!("{}.download", index_name));
        if unpack_dir.exists() {
            fs::remove_dir_all(&unpack_dir)?;
        }
        fs::create_dir_all(&unpack_dir)?;

        let installed = self.unpack_and_swap(archive, &unpack_dir, &index_name, tag);

        if unpack_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&unpack_dir) {
                debug!("Failed to remove {}: {}", unpack_dir.display(), e);
            }
        }

        installed
    }

    fn unpack_and_swap(
        &self,
        archive: &Path,
        unpack_dir: &Path,
        index_name: &str,
        tag: &str,
    ) -> Result<(), DistributorError> {
        info!("Extracting index...");
        let file = File::open(archive)?;
        tar::Archive::new(GzDecoder::new(file))
            .unpack(unpack_dir)
            .map_err(|e| DistributorError::Extract(e.to_string()))?;

        let extracted = locate_index_root(unpack_dir, index_name).ok_or_else(|| {
            DistributorError::Extract(format!(
                "archive does not contain {}/ and {}",
                VECTORS_DIR, DOCSTORE_FILE
            ))
        })?;

        if self.index_path.exists() {
            fs::remove_dir_all(&self.index_path)?;
        }
        fs::rename(&extracted, &self.index_path)?;

        fs::write(self.index_path.join(RELEASE_TAG_FILE), tag)?;
        write_timestamp(&self.index_path).map_err(|e| DistributorError::Extract(e.to_string()))
    }

    /// Whether the newest remote release differs from the local tag
    ///
    /// Lookup failures are logged and reported as "no update".
    #[inline]
    pub fn check_for_updates(&self) -> bool {
        let latest = match self.latest_release() {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Could not check for index updates: {}", e);
                return false;
            }
        };

        match self.local_release_tag() {
            Some(local) => local != latest.tag,
            None => true,
        }
    }

    #[inline]
    pub fn local_release_tag(&self) -> Option<String> {
        read_trimmed(&self.index_path.join(RELEASE_TAG_FILE))
    }

    /// Download the index if there is none locally; otherwise use what is there
    #[inline]
    pub fn ensure_index_available(&self) -> Result<(), DistributorError> {
        if self.index_state() == IndexState::Absent {
            info!("Index not found locally. Downloading from GitHub Releases...");
            self.download_index(true)?;
            return Ok(());
        }

        info!("Index found locally at {}", self.index_path.display());
        Ok(())
    }

    #[inline]
    pub fn index_info(&self) -> IndexInfo {
        let exists = self.index_path.exists();
        let mut info = IndexInfo {
            exists,
            path: self.index_path.clone(),
            last_updated: None,
            release_tag: None,
            vectors_size_bytes: None,
            docstore_size_bytes: None,
        };

        if exists {
            info.last_updated = read_trimmed(&self.index_path.join(LAST_UPDATED_FILE));
            info.release_tag = self.local_release_tag();
            info.vectors_size_bytes = dir_size(&self.index_path.join(VECTORS_DIR));
            info.docstore_size_bytes = fs::metadata(self.index_path.join(DOCSTORE_FILE))
                .ok()
                .map(|m| m.len());
        }

        info
    }
}

/// The extracted directory holding the index files, at the top or one level down
fn locate_index_root(unpack_dir: &Path, index_name: &str) -> Option<PathBuf> {
    let named = unpack_dir.join(index_name);
    if index_files_present(&named) {
        return Some(named);
    }
    if index_files_present(unpack_dir) {
        return Some(unpack_dir.to_path_buf());
    }

    fs::read_dir(unpack_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| index_files_present(path))
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn dir_size(path: &Path) -> Option<u64> {
    let entries = fs::read_dir(path).ok()?;
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            total += dir_size(&entry.path()).unwrap_or(0);
        } else {
            total += meta.len();
        }
    }
    Some(total)
}

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{date_dir, parse_dir_date, PART_SUFFIX};
use crate::error::FetchError;
use crate::logging::log_fetch;
use crate::store::ArchiveStore;

/// Transport seam for the feed, so the fetcher can run against a fake in tests.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    /// Stream the body at `url` into `dest`, returning bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut total = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(total)
    }
}

/// The file the update pointer currently names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerTarget {
    pub url: Url,
    pub file_name: String,
    pub date: NaiveDate,
}

/// Resolve the "last update" body to a single archive URL.
///
/// The body lists one entry per line; the last whitespace-separated token of
/// a line is either a full URL or a bare filename relative to `base_url`. The
/// events export line is preferred when several are listed.
pub fn resolve_pointer(body: &str, base_url: &str) -> Result<PointerTarget, FetchError> {
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let line = lines
        .iter()
        .find(|l| l.to_ascii_lowercase().contains(".export."))
        .or_else(|| lines.first())
        .ok_or_else(|| FetchError::MalformedPointer("empty response".to_string()))?;
    let token = line
        .split_whitespace()
        .last()
        .ok_or_else(|| FetchError::MalformedPointer(line.to_string()))?;

    let url = match Url::parse(token) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => Url::parse(base_url)
            .and_then(|base| base.join(token))
            .map_err(|e| FetchError::MalformedPointer(format!("{}: {}", token, e)))?,
    };

    let file_name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FetchError::MalformedPointer(format!("no file name in {}", url)))?;

    let date = file_name
        .get(..8)
        .and_then(parse_dir_date)
        .ok_or_else(|| FetchError::MalformedPointer(format!("no date prefix in {}", file_name)))?;

    Ok(PointerTarget {
        url,
        file_name,
        date,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    AlreadyPresent { path: PathBuf },
}

impl FetchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            FetchOutcome::Downloaded { .. } => "downloaded",
            FetchOutcome::AlreadyPresent { .. } => "already_present",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::AlreadyPresent { path } => path,
        }
    }
}

pub struct ArchiveFetcher<T: FeedTransport> {
    transport: T,
    store: ArchiveStore,
    lastupdate_url: String,
    base_url: String,
}

impl<T: FeedTransport> ArchiveFetcher<T> {
    pub fn new(transport: T, store: ArchiveStore, lastupdate_url: &str, base_url: &str) -> Self {
        Self {
            transport,
            store,
            lastupdate_url: lastupdate_url.to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Download the archive the pointer names into its dated directory.
    ///
    /// Idempotent: once the target exists, further calls return
    /// `AlreadyPresent`. The body is streamed to a `.part` file and renamed
    /// into place only after it is fully written.
    pub async fn fetch_latest(&self) -> Result<FetchOutcome, FetchError> {
        let body = self.transport.get_text(&self.lastupdate_url).await?;
        let target = resolve_pointer(&body, &self.base_url)?;

        let dir = date_dir(self.store.root(), target.date);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&target.file_name);
        if tokio::fs::metadata(&dest).await.is_ok() {
            log_fetch("already_present", target.url.as_str(), dest.to_str(), 0);
            return Ok(FetchOutcome::AlreadyPresent { path: dest });
        }

        let part = dir.join(format!("{}{}", target.file_name, PART_SUFFIX));
        let bytes = match self.transport.download(target.url.as_str(), &part).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(err);
            }
        };

        // Blocking lock: never taken on a runtime thread.
        let store = self.store.clone();
        let (from, to) = (part.clone(), dest.clone());
        let renamed = tokio::task::spawn_blocking(move || {
            let _guard = store.write();
            std::fs::rename(&from, &to)
        })
        .await
        .unwrap_or_else(|err| Err(io::Error::new(io::ErrorKind::Other, err)));
        if let Err(err) = renamed {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err.into());
        }

        log_fetch("downloaded", target.url.as_str(), dest.to_str(), bytes);
        Ok(FetchOutcome::Downloaded { path: dest, bytes })
    }
}

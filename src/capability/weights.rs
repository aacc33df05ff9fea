// Local cache of model weight files.
//
// Each model is keyed by a fixed filename inside the cache directory. A file
// that is already present is reused across restarts; otherwise it is fetched
// once from its configured URL.

use crate::error::LoadError;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Describes one weight file the loader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightFile {
    /// Well-known filename inside the cache directory.
    pub filename: String,
    /// Where to fetch the file when it is not cached.
    pub url: Option<String>,
    /// Expected BLAKE3 digest (hex). Verified when set.
    pub blake3: Option<String>,
    /// Files smaller than this are treated as broken downloads.
    pub min_size_bytes: u64,
}

impl WeightFile {
    pub fn new(filename: impl Into<String>) -> Self {
        WeightFile {
            filename: filename.into(),
            url: None,
            blake3: None,
            min_size_bytes: 0,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_blake3(mut self, digest: Option<String>) -> Self {
        self.blake3 = digest.map(|d| d.to_ascii_lowercase());
        self
    }

    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size_bytes = bytes;
        self
    }
}

pub struct WeightCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl WeightCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("enhancer-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(WeightCache {
            dir: dir.into(),
            client,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file: &WeightFile) -> PathBuf {
        self.dir.join(&file.filename)
    }

    /// Returns the local path of `file`, downloading it first if it is not cached.
    pub async fn ensure(&self, file: &WeightFile) -> Result<PathBuf, LoadError> {
        let path = self.path_for(file);

        if tokio::fs::try_exists(&path).await? {
            let size = tokio::fs::metadata(&path).await?.len();
            if size < file.min_size_bytes {
                warn!(
                    "Cached weights {:?} are too small ({} bytes), fetching again",
                    path, size
                );
            } else {
                match verify_checksum(&path, file).await {
                    Ok(()) => {
                        info!("Using cached weights {:?} ({} bytes)", path, size);
                        return Ok(path);
                    }
                    Err(e @ LoadError::ChecksumMismatch { .. }) if file.url.is_some() => {
                        warn!("Cached weights {:?} are corrupt ({}), fetching again", path, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let url = file.url.as_deref().ok_or_else(|| LoadError::MissingWeights {
            filename: file.filename.clone(),
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;
        warn!("Downloading {} from {}...", file.filename, url);
        let downloaded = self.download(url, &path, file).await?;
        info!("Downloaded {} ({} bytes)", file.filename, downloaded);

        Ok(path)
    }

    // Streams `url` into `<path>.part` and moves it into place once its size
    // and digest check out. A rejected download never reaches `path`.
    async fn download(&self, url: &str, path: &Path, file: &WeightFile) -> Result<u64, LoadError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LoadError::Download(format!(
                "HTTP status: {}",
                response.status()
            )));
        }

        let partial = partial_path(path);
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut hasher = blake3::Hasher::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(out);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            out.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }
        out.flush().await?;
        drop(out);

        if downloaded < file.min_size_bytes {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(LoadError::Download(format!(
                "Downloaded file too small ({} bytes), expected at least {}",
                downloaded, file.min_size_bytes
            )));
        }

        if let Some(expected) = &file.blake3 {
            let actual = hasher.finalize().to_hex().to_string();
            if &actual != expected {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(LoadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&partial, path).await?;
        Ok(downloaded)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn verify_checksum(path: &Path, file: &WeightFile) -> Result<(), LoadError> {
    let Some(expected) = &file.blake3 else {
        return Ok(());
    };

    let path = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || {
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(std::fs::File::open(&path)?)?;
        Ok::<_, LoadError>(hasher.finalize().to_hex().to_string())
    })
    .await
    .map_err(|e| LoadError::Io(format!("Checksum task failed: {}", e)))??;

    if &actual != expected {
        return Err(LoadError::ChecksumMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Attempts at finding a free name before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// A received file as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name of the file inside the store directory.
    pub name: String,
    pub path: PathBuf,
    /// Bytes actually written.
    pub size: u64,
}

/// On-disk destination for received files.
///
/// Each transfer gets a fresh file `{stem}_{unix_micros}{ext}` so concurrent
/// transfers of the same name never overwrite each other.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!("Received files directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new, empty file for an incoming transfer of `name`.
    ///
    /// Opens with create-new semantics; on a collision a random suffix is
    /// added to the uniqueness token and creation is retried.
    pub async fn create_unique(&self, name: &str) -> io::Result<(fs::File, String, PathBuf)> {
        let micros = chrono::Utc::now().timestamp_micros();
        let mut token = micros.to_string();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let unique = unique_name(name, &token);
            let path = self.dir.join(&unique);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, unique, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists, retrying with a new suffix", unique);
                    let suffix = Uuid::new_v4().simple().to_string();
                    token = format!("{}-{}", micros, &suffix[..8]);
                }
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for '{}'", name),
        ))
    }
}

/// Reduce a received name to a bare file name.
///
/// Surrounding whitespace and any directory components are dropped. Returns
/// `None` when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

/// `{stem}_{token}{ext}`, where `ext` keeps its leading dot.
///
/// A leading dot does not start an extension, so `.env` has none.
pub fn unique_name(name: &str, token: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{}_{}{}", stem, token, ext)
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if !name[..idx].trim_start_matches('.').is_empty() => name.split_at(idx),
        _ => (name, ""),
    }
}

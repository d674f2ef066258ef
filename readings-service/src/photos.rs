use std::io;
use std::path::PathBuf;

use time::OffsetDateTime;

/// Filename for a submitted photo: `{meter_id}_{YYYYMMDD_HHMMSS}.jpg`.
///
/// Deterministic per meter and second. Two submissions for the same meter
/// within one second collide; strict uniqueness is explicitly not promised.
pub fn photo_filename(meter_id: &str, ts: OffsetDateTime) -> String {
    format!(
        "{meter_id}_{:04}{:02}{:02}_{:02}{:02}{:02}.jpg",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

/// Human-readable timestamp stored on the reading row: `DD-MM-YYYY HH:MM`.
pub fn display_date(ts: OffsetDateTime) -> String {
    format!(
        "{:02}-{:02}-{:04} {:02}:{:02}",
        ts.day(),
        u8::from(ts.month()),
        ts.year(),
        ts.hour(),
        ts.minute()
    )
}

fn is_safe_basename(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

#[derive(thiserror::Error, Debug)]
pub enum PhotoStoreError {
    #[error("invalid photo filename '{0}'")]
    InvalidFilename(String),
    #[error("photo not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Where evidence photos live. The ledger persists through this seam so the
/// photo-before-row ordering is testable without touching a real directory
/// layout.
#[async_trait::async_trait]
pub trait PhotoStore: Send + Sync {
    /// Persist `bytes` under `filename` and return the stored path exactly as
    /// it should be recorded on the reading row.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, PhotoStoreError>;

    /// Open a previously stored photo by basename.
    async fn open(&self, filename: &str) -> Result<tokio::fs::File, PhotoStoreError>;
}

/// Flat directory of uploaded photos. Only basenames are accepted on both
/// the write and read side, which keeps `/uploads/{filename}` confined to the
/// configured directory.
pub struct FsPhotoStore {
    dir: PathBuf,
}

impl FsPhotoStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait::async_trait]
impl PhotoStore for FsPhotoStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, PhotoStoreError> {
        if !is_safe_basename(filename) {
            return Err(PhotoStoreError::InvalidFilename(filename.to_string()));
        }

        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;

        metrics::counter!("photo_bytes_written_total").increment(bytes.len() as u64);

        Ok(path.display().to_string())
    }

    async fn open(&self, filename: &str) -> Result<tokio::fs::File, PhotoStoreError> {
        if !is_safe_basename(filename) {
            return Err(PhotoStoreError::InvalidFilename(filename.to_string()));
        }

        match tokio::fs::File::open(self.dir.join(filename)).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(PhotoStoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(PhotoStoreError::Io(e)),
        }
    }
}

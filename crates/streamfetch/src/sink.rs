use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::AcquireError;

/// Writes a finished artifact so that the final path only ever holds complete data.
///
/// Bytes go to `<path>.part` first and are renamed into place after a flush.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging file used while writing.
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".part");
        PathBuf::from(name)
    }

    pub async fn write(&self, data: &[u8]) -> Result<PathBuf, AcquireError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let part = self.part_path();
        let result = async {
            let mut file = fs::File::create(&part).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&part, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&part).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = data.len(), "Artifact written");
        Ok(self.path.clone())
    }
}

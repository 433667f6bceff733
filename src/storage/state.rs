//! Fixed-size binary state records, one file per feed

use super::StorageLock;
use super::codec::{FORMAT_VERSION, HEADER_LEN, RecordHeader};
use super::error::{LoadError, SaveError};
use crate::state::records::Record;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    lock: StorageLock,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, lock: StorageLock) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    /// Write header then payload in one pass, truncating any previous file
    pub async fn save(&self, name: &str, payload: &[u8]) -> Result<(), SaveError> {
        let result = self.save_inner(name, payload).await;
        match &result {
            Ok(()) => debug!(record = name, size = payload.len(), "State record saved"),
            Err(e) => warn!(record = name, error = %e, "State record save failed"),
        }
        result
    }

    async fn save_inner(&self, name: &str, payload: &[u8]) -> Result<(), SaveError> {
        let header = RecordHeader::for_payload(payload).ok_or_else(|| SaveError::TooLarge {
            name: name.to_string(),
            len: payload.len(),
        })?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(payload);

        let io_err = |source| SaveError::Io {
            name: name.to_string(),
            source,
        };

        let _guard = self.lock.acquire().await?;
        let mut file = File::create(self.dir.join(name)).await.map_err(io_err)?;
        file.write_all(&frame).await.map_err(io_err)?;
        file.sync_data().await.map_err(io_err)?;
        Ok(())
    }

    /// Read a record back, validating existence, header, format version,
    /// declared size and checksum, in that order
    pub async fn load(&self, name: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        let result = self.load_inner(name, expected_size).await;
        match &result {
            Ok(_) => debug!(record = name, "State record loaded"),
            Err(LoadError::NotFound(_)) => debug!(record = name, "No state record on disk"),
            Err(e) => warn!(record = name, kind = e.kind(), error = %e, "State record load failed"),
        }
        result
    }

    async fn load_inner(&self, name: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        let _guard = self.lock.acquire().await?;

        let mut file = match File::open(self.dir.join(name)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoadError::NotFound(name.to_string()));
            }
            Err(source) => {
                return Err(LoadError::Open {
                    name: name.to_string(),
                    source,
                });
            }
        };

        let mut header_bytes = [0u8; HEADER_LEN];
        file.read_exact(&mut header_bytes)
            .await
            .map_err(|_| LoadError::HeaderRead(name.to_string()))?;
        let header = RecordHeader::decode(&header_bytes);

        if header.version != FORMAT_VERSION {
            return Err(LoadError::VersionMismatch {
                name: name.to_string(),
                found: header.version,
                expected: FORMAT_VERSION,
            });
        }
        if header.size as usize != expected_size {
            return Err(LoadError::SizeMismatch {
                name: name.to_string(),
                found: header.size,
                expected: expected_size,
            });
        }

        let mut payload = vec![0u8; expected_size];
        file.read_exact(&mut payload)
            .await
            .map_err(|_| LoadError::Truncated(name.to_string()))?;

        if !header.verify(&payload) {
            return Err(LoadError::ChecksumMismatch(name.to_string()));
        }
        Ok(payload)
    }

    pub async fn save_record<R: Record>(&self, record: &R) -> Result<(), SaveError> {
        record.check().map_err(|source| {
            warn!(record = R::FILE_NAME, error = %source, "State record not saved");
            SaveError::Encode {
                name: R::FILE_NAME.to_string(),
                source,
            }
        })?;
        self.save(R::FILE_NAME, &record.encode()).await
    }

    pub async fn load_record<R: Record>(&self) -> Result<R, LoadError> {
        let bytes = self.load(R::FILE_NAME, R::ENCODED_LEN).await?;
        R::decode(&bytes).map_err(|source| {
            warn!(record = R::FILE_NAME, error = %source, "State record decode failed");
            LoadError::Decode {
                name: R::FILE_NAME.to_string(),
                source,
            }
        })
    }
}

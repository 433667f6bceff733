//! Small key-value store for values that change too often to rewrite a
//! whole state record, currently the daily battery range

use crate::state::BatteryExtremes;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

const PARTITION: &str = "prefs";
const SOLAR_MIN_KEY: &str = "solarmin";
const SOLAR_MAX_KEY: &str = "solarmax";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PrefsError>;

#[derive(Clone)]
pub struct PrefsStore {
    keyspace: Keyspace,
    prefs: PartitionHandle,
}

impl PrefsStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening prefs store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let prefs = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        Ok(Self { keyspace, prefs })
    }

    fn get_f32(&self, key: &str) -> Result<Option<f32>> {
        let Some(value) = self.prefs.get(key)? else {
            return Ok(None);
        };
        match <[u8; 4]>::try_from(&value[..]) {
            Ok(bytes) => Ok(Some(f32::from_le_bytes(bytes))),
            Err(_) => {
                warn!(key, len = value.len(), "Ignoring malformed pref value");
                Ok(None)
            }
        }
    }

    fn put_f32(&self, key: &str, value: f32) -> Result<()> {
        self.prefs.insert(key, value.to_le_bytes().to_vec())?;
        Ok(())
    }

    /// Stored battery range; missing or malformed values fall back to 100/0
    pub fn load_extremes(&self) -> Result<BatteryExtremes> {
        let defaults = BatteryExtremes::default();
        Ok(BatteryExtremes {
            min: self.get_f32(SOLAR_MIN_KEY)?.unwrap_or(defaults.min),
            max: self.get_f32(SOLAR_MAX_KEY)?.unwrap_or(defaults.max),
        })
    }

    pub fn save_extremes(&self, extremes: &BatteryExtremes) -> Result<()> {
        self.put_f32(SOLAR_MIN_KEY, extremes.min)?;
        self.put_f32(SOLAR_MAX_KEY, extremes.max)?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(min = extremes.min, max = extremes.max, "Battery range saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_extremes_default() {
        let dir = TempDir::new().unwrap();
        let prefs = PrefsStore::open(dir.path().join("prefs")).unwrap();
        assert_eq!(prefs.load_extremes().unwrap(), BatteryExtremes::default());
    }

    #[test]
    fn test_extremes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs");
        {
            let prefs = PrefsStore::open(&path).unwrap();
            prefs
                .save_extremes(&BatteryExtremes { min: 23.5, max: 97.0 })
                .unwrap();
        }
        let prefs = PrefsStore::open(&path).unwrap();
        assert_eq!(
            prefs.load_extremes().unwrap(),
            BatteryExtremes { min: 23.5, max: 97.0 }
        );
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let dir = TempDir::new().unwrap();
        let prefs = PrefsStore::open(dir.path().join("prefs")).unwrap();
        prefs.prefs.insert(SOLAR_MIN_KEY, vec![1u8, 2]).unwrap();
        prefs.put_f32(SOLAR_MAX_KEY, 80.0).unwrap();

        let extremes = prefs.load_extremes().unwrap();
        assert_eq!(extremes.min, 100.0);
        assert_eq!(extremes.max, 80.0);
    }
}

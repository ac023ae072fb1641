//! Optional on-disk persistence of queue history (§4.2, §6:
//! `<root>/queue_history.json`). Atomic write: temp file, then rename.

use std::path::Path;

use crate::error::StorageError;
use crate::model::QueueItemSnapshot;

pub fn save_history(path: &Path, history: &[QueueItemSnapshot]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(history)?;
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_history(path: &Path) -> Result<Vec<QueueItemSnapshot>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

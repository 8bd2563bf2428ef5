//! Serializable parameter state (for checkpointing by the caller).

use serde::{Deserialize, Serialize};

use super::Dkvmn;
use crate::error::{DkvmnError, Result};
use crate::linear::Linear;
use crate::types::{Matrix, SNAPSHOT_VERSION};

/// Trained parameters of a [`Dkvmn`]. Value memory is per-sequence state and
/// is not part of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkvmnSnapshot {
    /// Version number (for migration)
    pub version: String,
    pub batch_size: usize,
    pub key_memory: Matrix,
    pub value_template: Matrix,
    pub erase: Linear,
    pub add: Linear,
}

impl DkvmnSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Dkvmn {
    pub fn snapshot(&self) -> DkvmnSnapshot {
        DkvmnSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            batch_size: self.batch_size,
            key_memory: self.key_memory.clone(),
            value_template: self.value_template.clone(),
            erase: self.value_head.erase().clone(),
            add: self.value_head.add().clone(),
        }
    }

    /// Rebuild a model; every shape is validated as in [`Dkvmn::from_parts`].
    pub fn from_snapshot(snapshot: DkvmnSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DkvmnError::InvalidConfig(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Dkvmn::from_parts(
            snapshot.batch_size,
            snapshot.key_memory,
            snapshot.value_template,
            snapshot.erase,
            snapshot.add,
        )
    }
}

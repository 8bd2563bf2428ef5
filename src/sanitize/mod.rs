//! Numerical Health Checks
//!
//! Non-finite values never abort the forward pass; callers inspect the
//! memory between sequences instead.

use serde::Serialize;
use tracing::warn;

use crate::types::{ValueMemory, MAX_MEMORY_ABS};

/// Whether the slice contains NaN or Inf
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Health report for one value memory.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDiagnostic {
    pub is_healthy: bool,
    pub has_nan: bool,
    pub has_inf: bool,
    /// Largest finite magnitude; 0 when nothing is finite
    pub max_abs: f64,
    pub message: String,
}

/// Diagnose the health of a value memory
pub fn diagnose_value_memory(memory: &ValueMemory) -> MemoryDiagnostic {
    let mut has_nan = false;
    let mut has_inf = false;
    let mut max_abs: f64 = 0.0;

    for &val in memory.data() {
        if val.is_nan() {
            has_nan = true;
        } else if val.is_infinite() {
            has_inf = true;
        } else {
            max_abs = max_abs.max(val.abs());
        }
    }

    let is_healthy = !has_nan && !has_inf && max_abs <= MAX_MEMORY_ABS;

    let message = if is_healthy {
        "Memory is healthy".to_string()
    } else if has_nan {
        "Memory contains NaN values".to_string()
    } else if has_inf {
        "Memory contains infinite values".to_string()
    } else {
        format!("Memory magnitude out of range: {:.2e}", max_abs)
    };

    if !is_healthy {
        warn!(has_nan, has_inf, max_abs, "{}", message);
    }

    MemoryDiagnostic {
        is_healthy,
        has_nan,
        has_inf,
        max_abs,
        message,
    }
}

//! Model and optimizer configuration.
//!
//! Defaults follow the reference ASSISTments 2009 setup. `from_env` overrides
//! individual fields from `DKVMN_*` variables; unparsable values are ignored.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DkvmnError, Result};

const DEFAULT_MEMORY_SIZE: usize = 20;
const DEFAULT_KEY_DIM: usize = 50;
const DEFAULT_VALUE_DIM: usize = 200;
const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_INIT_STD: f64 = 0.1;

const DEFAULT_LEARNING_RATE: f64 = 0.001;
const DEFAULT_MOMENTUM: f64 = 0.9;
const DEFAULT_MAX_GRAD_NORM: f64 = 50.0;

/// Shape and initialisation of one model instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DkvmnConfig {
    /// Number of memory slots shared by key and value memory
    pub memory_size: usize,
    /// Key state dim (question embedding size)
    pub key_dim: usize,
    /// Value state dim (question+answer embedding size)
    pub value_dim: usize,
    /// Fixed for the lifetime of the model
    pub batch_size: usize,
    /// Std of the gating layer weights
    pub init_std: f64,
    /// RNG seed; system time when absent
    pub seed: Option<u64>,
}

impl Default for DkvmnConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            key_dim: DEFAULT_KEY_DIM,
            value_dim: DEFAULT_VALUE_DIM,
            batch_size: DEFAULT_BATCH_SIZE,
            init_std: DEFAULT_INIT_STD,
            seed: None,
        }
    }
}

impl DkvmnConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_size: env_parse("DKVMN_MEMORY_SIZE").unwrap_or(defaults.memory_size),
            key_dim: env_parse("DKVMN_KEY_DIM").unwrap_or(defaults.key_dim),
            value_dim: env_parse("DKVMN_VALUE_DIM").unwrap_or(defaults.value_dim),
            batch_size: env_parse("DKVMN_BATCH_SIZE").unwrap_or(defaults.batch_size),
            init_std: env_parse("DKVMN_INIT_STD").unwrap_or(defaults.init_std),
            seed: env_parse("DKVMN_SEED").or(defaults.seed),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("memory_size", self.memory_size),
            ("key_dim", self.key_dim),
            ("value_dim", self.value_dim),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(DkvmnError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if !self.init_std.is_finite() || self.init_std <= 0.0 {
            return Err(DkvmnError::InvalidConfig(format!(
                "init_std must be positive, got {}",
                self.init_std
            )));
        }
        Ok(())
    }
}

/// Momentum SGD with global gradient-norm clipping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub momentum: f64,
    pub max_grad_norm: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            momentum: DEFAULT_MOMENTUM,
            max_grad_norm: DEFAULT_MAX_GRAD_NORM,
        }
    }
}

impl OptimizerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            learning_rate: env_parse("DKVMN_LEARNING_RATE").unwrap_or(defaults.learning_rate),
            momentum: env_parse("DKVMN_MOMENTUM").unwrap_or(defaults.momentum),
            max_grad_norm: env_parse("DKVMN_MAX_GRAD_NORM").unwrap_or(defaults.max_grad_norm),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(DkvmnError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(DkvmnError::InvalidConfig(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.max_grad_norm.is_nan() || self.max_grad_norm <= 0.0 {
            return Err(DkvmnError::InvalidConfig(format!(
                "max_grad_norm must be positive, got {}",
                self.max_grad_norm
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

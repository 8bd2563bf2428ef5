#![deny(clippy::all)]

//! Dynamic Key-Value Memory Network core for knowledge tracing.
//!
//! A static key memory decides where each question reads and writes; a
//! per-learner value memory holds mastery and evolves through learned
//! erase/add gates. The crate covers the memory module only: addressing,
//! reading, writing, analytic gradients and a momentum optimizer. Embedding
//! layers and the prediction head belong to the caller.

pub mod addressing;
pub mod config;
pub mod error;
pub mod head;
pub mod linear;
pub mod logging;
pub mod matrix;
pub mod memory;
pub mod optim;
pub mod sanitize;
pub mod types;

// Re-export the main types and functions
pub use addressing::correlation_weight;
pub use config::{DkvmnConfig, OptimizerConfig};
pub use error::{DkvmnError, Result};
pub use head::{Addressing, Gates, HeadGroup, WriteHeadGroup};
pub use linear::{Linear, LinearGrads};
pub use memory::{
    backward_sequence, Dkvmn, DkvmnGrads, DkvmnSnapshot, MemorySession, SequenceTrace, StepOutput,
};
pub use optim::{Sgd, StepReport};
pub use sanitize::{diagnose_value_memory, has_invalid_values, MemoryDiagnostic};
pub use types::{Matrix, SlotMemory, ValueMemory};

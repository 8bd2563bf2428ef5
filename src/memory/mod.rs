//! DKVMN Memory Module
//!
//! Core idea:
//! - Key memory `(memory_size, key_dim)` decides *where* to read and write.
//!   It is shared by the whole batch and only changes between sequences,
//!   through the optimizer.
//! - Value memory `(batch_size, memory_size, value_dim)` stores *what* is
//!   known. Every sequence starts from the template broadcast over the batch.
//!
//! One timestep:
//! 1. `w = attention(q)`: softmax over `q · K^T`
//! 2. `r = read(M, w)`: Σ_i w_i M_i
//! 3. `M' = write(M, w, qa)`: erase then add
//!
//! The same `w` feeds read and write. The model never holds the live value
//! memory; callers thread it through [`Dkvmn::step`], or use a
//! [`MemorySession`] which owns it for one sequence.

mod backward;
mod session;
mod snapshot;

pub use backward::{backward_sequence, DkvmnGrads};
pub use session::MemorySession;
pub use snapshot::DkvmnSnapshot;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::DkvmnConfig;
use crate::error::{ensure_batch, ensure_dim, DkvmnError, Result};
use crate::head::{Addressing, Gates, HeadGroup, WriteHeadGroup};
use crate::linear::Linear;
use crate::matrix::normal_vec;
use crate::types::{Matrix, ValueMemory};

/// Result of one attention → read → write timestep.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutput {
    /// `(batch_size, memory_size)`
    pub correlation_weight: Matrix,
    /// `(batch_size, value_dim)`, read before the write
    pub read_content: Matrix,
    /// Value memory for the next timestep
    pub value_memory: ValueMemory,
}

/// Everything the backward pass needs from one forward timestep.
#[derive(Clone, Debug)]
pub(crate) struct StepRecord {
    pub(crate) q_control: Matrix,
    pub(crate) qa_control: Matrix,
    pub(crate) memory_before: ValueMemory,
    pub(crate) correlation_weight: Matrix,
    pub(crate) gates: Gates,
    pub(crate) read_content: Matrix,
}

/// Forward pass over a whole sequence, kept for [`backward_sequence`].
#[derive(Clone, Debug)]
pub struct SequenceTrace {
    steps: Vec<StepRecord>,
    final_memory: ValueMemory,
}

impl SequenceTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn read_contents(&self) -> impl Iterator<Item = &Matrix> + '_ {
        self.steps.iter().map(|s| &s.read_content)
    }

    pub fn correlation_weights(&self) -> impl Iterator<Item = &Matrix> + '_ {
        self.steps.iter().map(|s| &s.correlation_weight)
    }

    pub fn final_memory(&self) -> &ValueMemory {
        &self.final_memory
    }

    pub(crate) fn steps(&self) -> &[StepRecord] {
        &self.steps
    }
}

/// Dynamic Key-Value Memory Network core.
#[derive(Clone, Debug, PartialEq)]
pub struct Dkvmn {
    batch_size: usize,
    key_memory: Matrix,
    value_template: Matrix,
    key_head: HeadGroup,
    value_head: WriteHeadGroup,
}

impl Dkvmn {
    /// Build a model with random parameters.
    ///
    /// Key memory and value template are drawn from N(0, 1); the erase/add
    /// layers from N(0, init_std^2) with zero bias.
    pub fn new(config: &DkvmnConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let key_memory = Matrix::from_vec(
            config.memory_size,
            config.key_dim,
            normal_vec(&mut rng, config.memory_size * config.key_dim, 1.0),
        )?;
        let value_template = Matrix::from_vec(
            config.memory_size,
            config.value_dim,
            normal_vec(&mut rng, config.memory_size * config.value_dim, 1.0),
        )?;
        let value_head =
            WriteHeadGroup::new(config.memory_size, config.value_dim, config.init_std, &mut rng)?;
        let key_head = HeadGroup::new(config.memory_size, config.key_dim)?;

        info!(
            memory_size = config.memory_size,
            key_dim = config.key_dim,
            value_dim = config.value_dim,
            batch_size = config.batch_size,
            seed,
            "DKVMN memory initialised"
        );

        Ok(Self {
            batch_size: config.batch_size,
            key_memory,
            value_template,
            key_head,
            value_head,
        })
    }

    /// Build a model from explicit parameters.
    pub fn from_parts(
        batch_size: usize,
        key_memory: Matrix,
        value_template: Matrix,
        erase: Linear,
        add: Linear,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DkvmnError::InvalidConfig("batch_size must be positive".to_string()));
        }
        ensure_dim("value template slots", key_memory.rows(), value_template.rows())?;
        let key_head = HeadGroup::new(key_memory.rows(), key_memory.cols())?;
        let value_head =
            WriteHeadGroup::from_parts(value_template.rows(), value_template.cols(), erase, add)?;
        Ok(Self {
            batch_size,
            key_memory,
            value_template,
            key_head,
            value_head,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn memory_size(&self) -> usize {
        self.key_memory.rows()
    }

    pub fn key_dim(&self) -> usize {
        self.key_memory.cols()
    }

    pub fn value_dim(&self) -> usize {
        self.value_template.cols()
    }

    pub fn key_memory(&self) -> &Matrix {
        &self.key_memory
    }

    pub fn value_template(&self) -> &Matrix {
        &self.value_template
    }

    pub fn value_head(&self) -> &WriteHeadGroup {
        &self.value_head
    }

    /// Fresh value memory for a new sequence: the template copied per batch item.
    pub fn init_value_memory(&self) -> ValueMemory {
        ValueMemory::broadcast(&self.value_template, self.batch_size)
    }

    /// Stateful view owning the value memory of one sequence.
    pub fn session(&self) -> MemorySession<'_> {
        MemorySession::new(self)
    }

    /// Correlation weight of `control` `(batch_size, key_dim)` against the key memory.
    pub fn attention(&self, control: &Matrix) -> Result<Matrix> {
        ensure_batch(self.batch_size, control.rows())?;
        self.key_head.addressing(control, &self.key_memory)
    }

    /// Read `value_memory` with a weight obtained from [`Dkvmn::attention`].
    pub fn read(&self, value_memory: &ValueMemory, read_weight: &Matrix) -> Result<Matrix> {
        self.check_value_memory(value_memory)?;
        self.value_head
            .read(value_memory, Addressing::Weight(read_weight))
    }

    /// Next value memory after writing `control` `(batch_size, value_dim)`.
    pub fn write(
        &self,
        value_memory: &ValueMemory,
        write_weight: &Matrix,
        control: &Matrix,
    ) -> Result<ValueMemory> {
        self.check_value_memory(value_memory)?;
        self.value_head
            .write(control, value_memory, Some(write_weight))
    }

    /// One full timestep; a single attention call drives both read and write.
    pub fn step(
        &self,
        value_memory: &ValueMemory,
        q_control: &Matrix,
        qa_control: &Matrix,
    ) -> Result<StepOutput> {
        let correlation_weight = self.attention(q_control)?;
        let read_content = self.read(value_memory, &correlation_weight)?;
        let value_memory = self.write(value_memory, &correlation_weight, qa_control)?;
        Ok(StepOutput {
            correlation_weight,
            read_content,
            value_memory,
        })
    }

    /// Run a whole sequence from a fresh value memory, recording every step.
    ///
    /// `q_controls[t]` addresses the key memory, `qa_controls[t]` is written.
    pub fn forward_sequence(
        &self,
        q_controls: &[Matrix],
        qa_controls: &[Matrix],
    ) -> Result<SequenceTrace> {
        if q_controls.is_empty() {
            return Err(DkvmnError::EmptySequence);
        }
        ensure_dim("qa control timesteps", q_controls.len(), qa_controls.len())?;

        let mut memory = self.init_value_memory();
        let mut steps = Vec::with_capacity(q_controls.len());
        for (q_control, qa_control) in q_controls.iter().zip(qa_controls) {
            let correlation_weight = self.attention(q_control)?;
            let read_content = self.read(&memory, &correlation_weight)?;
            ensure_batch(self.batch_size, qa_control.rows())?;
            let gates = self.value_head.gates(qa_control)?;
            let next = crate::head::apply_write(&memory, &correlation_weight, &gates);

            steps.push(StepRecord {
                q_control: q_control.clone(),
                qa_control: qa_control.clone(),
                memory_before: std::mem::replace(&mut memory, next),
                correlation_weight,
                gates,
                read_content,
            });
        }

        Ok(SequenceTrace {
            steps,
            final_memory: memory,
        })
    }

    fn check_value_memory(&self, value_memory: &ValueMemory) -> Result<()> {
        ensure_batch(self.batch_size, value_memory.batch_size())?;
        ensure_dim("value memory slots", self.memory_size(), value_memory.memory_size())?;
        ensure_dim("value memory state dim", self.value_dim(), value_memory.state_dim())
    }

    /// Mutable parameter buffers, in the order of [`DkvmnGrads::param_slices`].
    pub(crate) fn param_slices_mut(&mut self) -> [&mut [f64]; 6] {
        let (erase, add) = self.value_head.layers_mut();
        let (erase_weight, erase_bias) = erase.params_mut();
        let (add_weight, add_bias) = add.params_mut();
        [
            self.key_memory.data_mut(),
            self.value_template.data_mut(),
            erase_weight,
            erase_bias,
            add_weight,
            add_bias,
        ]
    }
}

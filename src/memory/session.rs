//! Stateful attention/read/write over one sequence.

use tracing::debug;

use super::Dkvmn;
use crate::error::Result;
use crate::types::{Matrix, ValueMemory};

/// Owns the live value memory of one sequence.
///
/// `attention` and `read` are pure queries; `write` is the only operation
/// that advances the state. Dropping the session (or calling `reset`)
/// discards the memory; the model itself is never mutated.
#[derive(Debug)]
pub struct MemorySession<'m> {
    model: &'m Dkvmn,
    value_memory: ValueMemory,
    timestep: usize,
}

impl<'m> MemorySession<'m> {
    pub(crate) fn new(model: &'m Dkvmn) -> Self {
        Self {
            model,
            value_memory: model.init_value_memory(),
            timestep: 0,
        }
    }

    pub fn model(&self) -> &'m Dkvmn {
        self.model
    }

    pub fn value_memory(&self) -> &ValueMemory {
        &self.value_memory
    }

    /// Number of writes applied since the last reset.
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn attention(&self, control: &Matrix) -> Result<Matrix> {
        self.model.attention(control)
    }

    pub fn read(&self, read_weight: &Matrix) -> Result<Matrix> {
        self.model.read(&self.value_memory, read_weight)
    }

    /// Replace the held value memory with the written one and return it.
    pub fn write(&mut self, write_weight: &Matrix, control: &Matrix) -> Result<&ValueMemory> {
        self.value_memory = self.model.write(&self.value_memory, write_weight, control)?;
        self.timestep += 1;
        debug!(timestep = self.timestep, "value memory advanced");
        Ok(&self.value_memory)
    }

    /// attention → read → write with one shared weight; returns the read content.
    pub fn step(&mut self, q_control: &Matrix, qa_control: &Matrix) -> Result<Matrix> {
        let weight = self.attention(q_control)?;
        let read_content = self.read(&weight)?;
        self.write(&weight, qa_control)?;
        Ok(read_content)
    }

    /// Start a new sequence from the template.
    pub fn reset(&mut self) {
        self.value_memory = self.model.init_value_memory();
        self.timestep = 0;
    }

    pub fn into_value_memory(self) -> ValueMemory {
        self.value_memory
    }
}

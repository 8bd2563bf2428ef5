//! SGD with Momentum
//!
//! Update rule, applied between sequences only:
//! - clip: g ← g · min(1, max_norm / ‖g‖₂) over all parameters jointly
//! - velocity: v ← μ v + g
//! - parameter: θ ← θ - lr · v
//!
//! Control-input gradients are not touched; they belong to the caller's
//! embedding layers.

use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::error::{ensure_dim, Result};
use crate::memory::{Dkvmn, DkvmnGrads};

/// Outcome of one optimizer step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    /// Gradient norm before clipping
    pub grad_norm: f64,
    pub clipped: bool,
}

#[derive(Clone, Debug)]
pub struct Sgd {
    config: OptimizerConfig,
    velocity: Option<[Vec<f64>; 6]>,
    step_count: u64,
}

impl Sgd {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            learning_rate = config.learning_rate,
            momentum = config.momentum,
            max_grad_norm = config.max_grad_norm,
            "SGD optimizer created"
        );
        Ok(Self {
            config,
            velocity: None,
            step_count: 0,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Override the learning rate (schedules live in the caller).
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
    }

    /// Apply `grads` to `model`.
    pub fn step(&mut self, model: &mut Dkvmn, grads: &DkvmnGrads) -> Result<StepReport> {
        let grad_slices = grads.param_slices();
        let mut params = model.param_slices_mut();
        for (p, g) in params.iter().zip(grad_slices.iter()) {
            ensure_dim("parameter gradient length", p.len(), g.len())?;
        }
        // momentum from a model of another shape; call `reset` first
        if let Some(velocity) = &self.velocity {
            for (v, g) in velocity.iter().zip(grad_slices.iter()) {
                ensure_dim("optimizer velocity length", v.len(), g.len())?;
            }
        }

        let grad_norm = grads.global_norm();
        let clipped = grad_norm > self.config.max_grad_norm;
        let scale = if clipped {
            self.config.max_grad_norm / grad_norm
        } else {
            1.0
        };
        if clipped {
            warn!(grad_norm, max_grad_norm = self.config.max_grad_norm, "gradient clipped");
        }
        if !grad_norm.is_finite() {
            warn!(grad_norm, "non-finite gradient norm");
        }

        let velocity = self
            .velocity
            .get_or_insert_with(|| grad_slices.map(|g| vec![0.0; g.len()]));
        let (lr, momentum) = (self.config.learning_rate, self.config.momentum);
        for ((param, grad), vel) in params
            .iter_mut()
            .zip(grad_slices.iter())
            .zip(velocity.iter_mut())
        {
            for ((p, &g), v) in param.iter_mut().zip(grad.iter()).zip(vel.iter_mut()) {
                *v = momentum * *v + scale * g;
                *p -= lr * *v;
            }
        }

        self.step_count += 1;
        debug!(step = self.step_count, grad_norm, clipped, "optimizer step");
        Ok(StepReport { grad_norm, clipped })
    }

    /// Forget accumulated momentum.
    pub fn reset(&mut self) {
        self.velocity = None;
        self.step_count = 0;
    }
}

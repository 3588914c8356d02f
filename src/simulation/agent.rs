//! Tick-driven entities
//!
//! Anything the engine steps once per tick implements [`Agent`]. The
//! environment type is whatever read-only context the entity needs to decide
//! its next state, and the effect is what the engine gets back.

use super::error::SimResult;
use super::intersection::{Demand, SignalController, SignalMode};

pub trait Agent<Env: ?Sized> {
    type Effect;

    fn advance(&mut self, dt: f64, env: &Env) -> SimResult<Self::Effect>;
}

/// Inputs a signal needs for one tick
#[derive(Debug, Clone, Copy)]
pub struct SignalInput {
    pub demand: Demand,
    pub mode: SignalMode,
}

impl Agent<SignalInput> for SignalController {
    /// Whether the phase flipped
    type Effect = bool;

    fn advance(&mut self, dt: f64, env: &SignalInput) -> SimResult<bool> {
        Ok(self.update_with_mode(dt, env.demand, env.mode))
    }
}

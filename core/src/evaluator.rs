//! Hook for custom per-cell field post-processing.

use thiserror::Error;

use crate::Position;

/// Failure reported by a [`FieldEvaluator`] for a single cell.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("field evaluator failed: {message}")]
pub struct EvaluatorError {
    message: String,
}

impl EvaluatorError {
    /// Creates an error carrying a human readable explanation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Explanation supplied by the evaluator.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Post-processes a field intensity after diffusion and decay.
///
/// Called once per cell per step for the field it is bound to. `current` is
/// the freshly diffused intensity and the returned value replaces it before
/// clamping. On error, or when the result is not finite, the simulator keeps
/// `current` for that cell and carries on with the step.
pub trait FieldEvaluator: Send {
    /// Computes the replacement intensity of the cell at `position`.
    fn evaluate(&mut self, step: u64, position: Position, current: f32)
        -> Result<f32, EvaluatorError>;
}

impl<F> FieldEvaluator for F
where
    F: FnMut(u64, Position, f32) -> Result<f32, EvaluatorError> + Send,
{
    fn evaluate(
        &mut self,
        step: u64,
        position: Position,
        current: f32,
    ) -> Result<f32, EvaluatorError> {
        self(step, position, current)
    }
}

/// Evaluator that returns the diffused intensity unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdentityEvaluator;

impl FieldEvaluator for IdentityEvaluator {
    fn evaluate(
        &mut self,
        _step: u64,
        _position: Position,
        current: f32,
    ) -> Result<f32, EvaluatorError> {
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_act_as_evaluators() {
        let mut doubled = |_step: u64, _position: Position, current: f32| -> Result<f32, EvaluatorError> {
            Ok(current * 2.0)
        };
        assert_eq!(doubled.evaluate(3, Position::new(0, 0, 0), 0.25), Ok(0.5));

        let mut failing = |_step: u64, position: Position, _current: f32| -> Result<f32, EvaluatorError> {
            Err(EvaluatorError::new(format!("no value at x={}", position.x())))
        };
        let error = failing
            .evaluate(0, Position::new(4, 0, 0), 0.1)
            .expect_err("evaluator fails");
        assert_eq!(error.message(), "no value at x=4");
    }

    #[test]
    fn identity_keeps_intensity() {
        assert_eq!(
            IdentityEvaluator.evaluate(9, Position::new(1, 2, 0), 0.75),
            Ok(0.75)
        );
    }
}

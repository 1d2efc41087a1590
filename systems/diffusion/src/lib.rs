#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Field diffusion, decay and production for the Grainfield engine.
//!
//! The system reads one field's current buffer and writes every cell of the
//! next buffer. It never touches the current buffer, so the caller can swap
//! the two once all fields have been advanced.

use grainfield_core::{Field, FieldEvaluator, Lattice, MIN_FIELD};

/// Per-cell coefficients of the occupant for the field being diffused.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    /// Intensity added to the cell each step.
    pub production: f32,
    /// Fraction of the flow the cell lets through.
    pub permeability: f32,
}

impl Coefficients {
    /// Coefficients of an empty cell.
    pub const EMPTY: Self = Self {
        production: 0.0,
        permeability: 1.0,
    };
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One field advanced by a single step.
#[derive(Clone, Copy, Debug)]
pub struct FieldPass<'a> {
    /// Lattice both buffers are laid out on.
    pub lattice: &'a Lattice,
    /// Definition of the field.
    pub field: &'a Field,
    /// Intensities at the start of the step.
    pub current: &'a [f32],
    /// Step number handed to the evaluator hook.
    pub step: u64,
}

/// Totals gathered while filling a next buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiffusionOutcome {
    /// Sum of the stored next intensities.
    pub total: f64,
    /// Cells whose evaluator call failed or returned a non-finite value.
    pub hook_failures: u32,
}

/// Clamps an intensity into the storable range `[MIN_FIELD, 1]`.
///
/// `NaN` collapses to the floor.
#[must_use]
pub fn clamp_intensity(value: f32) -> f32 {
    if value.is_nan() {
        MIN_FIELD
    } else {
        value.clamp(MIN_FIELD, 1.0)
    }
}

/// Computes the next intensity of every cell of `pass.field` into `next`.
///
/// `coefficients` reports the production and permeability of whatever
/// occupies a cell. Each cell follows the explicit update
/// `current * (1 - speed * permeable / n) + production + inflow / n` where
/// `n` counts the field's directions, `permeable` sums neighbour
/// permeabilities along them and `inflow` sums
/// `neighbour * speed * neighbour_permeability` along the opposite
/// directions. A field without directions only receives production. The
/// result decays, passes through `evaluator` when one is bound and is
/// finally clamped.
pub fn diffuse_field<C>(
    pass: FieldPass<'_>,
    next: &mut [f32],
    coefficients: C,
    mut evaluator: Option<&mut dyn FieldEvaluator>,
) -> DiffusionOutcome
where
    C: Fn(usize) -> Coefficients,
{
    let lattice = pass.lattice;
    let speed = pass.field.diffusion_speed();
    let directions = pass.field.directions();
    let opposite = pass.field.opposite_directions();
    let neighbour_count = directions.len() as f32;
    let retained = 1.0 - pass.field.decay_probability();
    let current_at = |index: usize| pass.current.get(index).copied().unwrap_or(MIN_FIELD);

    let mut outcome = DiffusionOutcome::default();
    for (index, slot) in next.iter_mut().enumerate().take(lattice.data_size()) {
        let current = current_at(index);
        let production = coefficients(index).production;

        let mut value = current + production;
        if !directions.is_empty() {
            let permeable: f32 = directions
                .iter()
                .map(|direction| coefficients(lattice.neighbour(index, direction)).permeability)
                .sum();
            let inflow: f32 = opposite
                .iter()
                .map(|direction| {
                    let neighbour = lattice.neighbour(index, direction);
                    current_at(neighbour) * speed * coefficients(neighbour).permeability
                })
                .sum();
            value = current * (1.0 - speed * permeable / neighbour_count)
                + production
                + inflow / neighbour_count;
        }

        let decayed = (f64::from(value) * retained) as f32;
        let evaluated = match evaluator.as_deref_mut() {
            Some(hook) => match hook.evaluate(pass.step, lattice.to_position(index), decayed) {
                Ok(result) if result.is_finite() => result,
                _ => {
                    outcome.hook_failures += 1;
                    decayed
                }
            },
            None => decayed,
        };

        *slot = clamp_intensity(evaluated);
        outcome.total += f64::from(*slot);
    }

    outcome
}

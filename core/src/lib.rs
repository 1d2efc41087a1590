#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Grainfield engine.
//!
//! This crate defines the toroidal lattice, the immutable rule model consumed
//! by the simulator and the message surface that connects adapters to it.
//! Adapters submit [`Command`] values, the world executes them through its
//! `apply` entry point and answers with [`Event`] values. Read-only consumers
//! inspect [`GridSnapshot`] values captured between steps.

mod error;
mod evaluator;
mod lattice;
mod model;

use serde::{Deserialize, Serialize};

pub use error::{EditError, ModelError};
pub use evaluator::{EvaluatorError, FieldEvaluator, IdentityEvaluator};
pub use lattice::{Direction, DirectionSet, Lattice, Position};
pub use model::{
    decay_probability, flatten_noise, AgeSource, Behaviour, Field, FieldCoefficients, FieldId,
    FieldInfluence, FieldPredicate, Grain, GrainId, Operator, Predicate, Reaction, RuleModel,
};

/// Lowest intensity a field cell may hold. Keeps logarithms finite.
pub const MIN_FIELD: f32 = 1e-6;

/// Field readings below this level are treated as zero by behaviour predicates.
pub const FIELD_NOISE_FLOOR: f32 = 1e-4;

/// Exponent sharpening field-influence scores before weighted neighbour choice.
pub const INFLUENCE_SHARPENING_EXPONENT: i32 = 6;

/// Commands that express all permissible simulation mutations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation by a single step.
    Step,
    /// Advances the simulation by several steps in a row.
    StepMany {
        /// Number of steps to run.
        count: u32,
    },
    /// Restores the construction-time layout and clears fields and history.
    Reset,
    /// Paints a grain onto a cell with age zero, replacing any occupant.
    PlaceGrain {
        /// Cell receiving the grain.
        index: usize,
        /// Grain to place.
        grain: GrainId,
    },
    /// Removes whatever occupies a cell.
    ClearCell {
        /// Cell to clear.
        index: usize,
    },
    /// Overrides the intensity of one field at one cell.
    SetFieldValue {
        /// Field to edit.
        field: FieldId,
        /// Cell to edit.
        index: usize,
        /// Requested intensity, clamped to the field range.
        value: f32,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A step finished.
    StepCompleted {
        /// Counters describing the step.
        report: StepReport,
    },
    /// The simulation returned to its construction-time state.
    SimulationReset,
    /// A grain was painted onto a cell.
    GrainPlaced {
        /// Cell that received the grain.
        index: usize,
        /// Grain placed.
        grain: GrainId,
    },
    /// A cell was cleared.
    CellCleared {
        /// Cell that was cleared.
        index: usize,
        /// Grain that occupied the cell, if any.
        previous: Option<GrainId>,
    },
    /// A field intensity was overridden.
    FieldValueSet {
        /// Field that was edited.
        field: FieldId,
        /// Cell that was edited.
        index: usize,
        /// Intensity stored after clamping.
        value: f32,
    },
    /// A direct edit was refused.
    EditRejected {
        /// Specific reason the edit failed.
        reason: EditError,
    },
}

/// Counters describing a single completed step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepReport {
    /// Number of the step that completed, counted from zero.
    pub step: u64,
    /// Agents removed by their half-life.
    pub deaths: u32,
    /// Candidate behaviours recorded before conflict resolution.
    pub candidates: u32,
    /// Candidates dropped because they shared a cell with a surviving candidate.
    pub excluded: u32,
    /// Behaviours applied to the grid.
    pub applied: u32,
}

/// Intensities of one field across the lattice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Field the values belong to.
    pub field: FieldId,
    /// Intensity per cell, indexed like the lattice.
    pub values: Vec<f32>,
}

/// Owned copy of the grid state between steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Number of steps completed when the snapshot was taken.
    pub step: u64,
    /// Occupant of every cell.
    pub agents: Vec<Option<GrainId>>,
    /// Age of every occupant; `None` for empty cells.
    pub ages: Vec<Option<u32>>,
    /// Current intensities of every field in model order.
    pub fields: Vec<FieldSnapshot>,
}

impl GridSnapshot {
    /// Intensities of `field`, if the model defines it.
    #[must_use]
    pub fn field(&self, field: FieldId) -> Option<&[f32]> {
        self.fields
            .iter()
            .find(|snapshot| snapshot.field == field)
            .map(|snapshot| snapshot.values.as_slice())
    }

    /// Number of cells occupied by `grain`.
    #[must_use]
    pub fn population(&self, grain: GrainId) -> usize {
        self.agents
            .iter()
            .filter(|agent| **agent == Some(grain))
            .count()
    }
}

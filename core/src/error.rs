use thiserror::Error;

use crate::{FieldId, GrainId};

/// Configuration errors detected while validating a rule model.
///
/// These surface once, when a simulator is constructed, and never while stepping.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    /// A lattice axis has zero cells.
    #[error("lattice {width}x{height}x{depth} has a zero-sized axis")]
    EmptyLattice {
        /// Requested number of columns.
        width: u32,
        /// Requested number of rows.
        height: u32,
        /// Requested number of layers.
        depth: u32,
    },
    /// Two grains share an identifier.
    #[error("grain {0} is defined more than once")]
    DuplicateGrain(GrainId),
    /// Two fields share an identifier.
    #[error("field {0} is defined more than once")]
    DuplicateField(FieldId),
    /// A grain references a field absent from the model.
    #[error("grain {grain} carries coefficients for unknown field {field}")]
    UnknownGrainField {
        /// Grain declaring the coefficients.
        grain: GrainId,
        /// Field that could not be resolved.
        field: FieldId,
    },
    /// A behaviour references a grain absent from the model.
    #[error("behaviour {behaviour} references unknown grain {grain}")]
    UnknownBehaviourGrain {
        /// Position of the behaviour within the model.
        behaviour: usize,
        /// Grain that could not be resolved.
        grain: GrainId,
    },
    /// A behaviour references a field absent from the model.
    #[error("behaviour {behaviour} references unknown field {field}")]
    UnknownBehaviourField {
        /// Position of the behaviour within the model.
        behaviour: usize,
        /// Field that could not be resolved.
        field: FieldId,
    },
    /// A behaviour probability lies outside `[0, 1]`.
    #[error("behaviour {behaviour} probability {probability} must be between 0.0 and 1.0")]
    InvalidBehaviourProbability {
        /// Position of the behaviour within the model.
        behaviour: usize,
        /// Offending probability.
        probability: f64,
    },
    /// A grain movement probability lies outside `[0, 1]`.
    #[error("grain {grain} movement probability {probability} must be between 0.0 and 1.0")]
    InvalidMovementProbability {
        /// Grain carrying the probability.
        grain: GrainId,
        /// Offending probability.
        probability: f64,
    },
    /// A field diffusion speed lies outside `[0, 1]`.
    #[error("field {field} diffusion speed {speed} must be between 0.0 and 1.0")]
    InvalidDiffusionSpeed {
        /// Field carrying the speed.
        field: FieldId,
        /// Offending speed.
        speed: f32,
    },
    /// A grain half-life is negative or not finite.
    #[error("grain {grain} half-life {half_life} must be finite and non-negative")]
    InvalidGrainHalfLife {
        /// Grain carrying the half-life.
        grain: GrainId,
        /// Offending half-life.
        half_life: f32,
    },
    /// A field half-life is negative or not finite.
    #[error("field {field} half-life {half_life} must be finite and non-negative")]
    InvalidFieldHalfLife {
        /// Field carrying the half-life.
        field: FieldId,
        /// Offending half-life.
        half_life: f32,
    },
    /// An age source points at a neighbour the behaviour never binds.
    #[error("behaviour {behaviour} copies age from neighbour {neighbour} but binds only {bound}")]
    AgeSourceOutOfRange {
        /// Position of the behaviour within the model.
        behaviour: usize,
        /// One-based neighbour position requested.
        neighbour: usize,
        /// Number of neighbours the behaviour binds.
        bound: usize,
    },
    /// The initial layout does not cover the lattice exactly.
    #[error("layout holds {actual} cells but the lattice has {expected}")]
    LayoutSizeMismatch {
        /// Number of cells in the lattice.
        expected: usize,
        /// Number of cells supplied.
        actual: usize,
    },
    /// The initial layout places a grain absent from the model.
    #[error("layout cell {index} holds unknown grain {grain}")]
    UnknownLayoutGrain {
        /// Cell holding the grain.
        index: usize,
        /// Grain that could not be resolved.
        grain: GrainId,
    },
}

/// Reasons a direct grid edit may be rejected.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum EditError {
    /// The cell index lies outside the lattice.
    #[error("cell {index} is outside the lattice")]
    OutOfBounds {
        /// Requested cell index.
        index: usize,
    },
    /// The grain is not part of the rule model.
    #[error("grain {0} is not part of the model")]
    UnknownGrain(GrainId),
    /// The field is not part of the rule model.
    #[error("field {0} is not part of the model")]
    UnknownField(FieldId),
    /// The requested field intensity is NaN or infinite.
    #[error("field intensity must be finite")]
    NonFiniteValue,
}

//! Immutable rule model: grains, fields, behaviours and their sub-clauses.
//!
//! Models are produced by an external editor or persistence layer and are only
//! ever read by the simulation. Every type serializes with serde so scenario
//! files and snapshots can carry them verbatim.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{Direction, DirectionSet, Lattice, ModelError, FIELD_NOISE_FLOOR};

/// Identifier of a grain, unique within a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrainId(u32);

impl GrainId {
    /// Creates a new grain identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a field, unique within a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(u32);

impl FieldId {
    /// Creates a new field identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "~{}", self.0)
    }
}

/// Converts a half-life measured in steps into a per-step decay probability.
///
/// A half-life of zero means the quantity never decays.
#[must_use]
pub fn decay_probability(half_life: f32) -> f64 {
    if half_life > 0.0 {
        1.0 - 2f64.powf(-1.0 / f64::from(half_life))
    } else {
        0.0
    }
}

/// Comparison applied by a [`Predicate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal to the constant.
    Eq,
    /// Different from the constant.
    Ne,
    /// Strictly below the constant.
    Lt,
    /// Below or equal to the constant.
    Le,
    /// Strictly above the constant.
    Gt,
    /// Above or equal to the constant.
    Ge,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// Comparison of a reading against a constant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    operator: Operator,
    value: f64,
}

impl Predicate {
    /// Creates a predicate comparing readings against `value`.
    #[must_use]
    pub const fn new(operator: Operator, value: f64) -> Self {
        Self { operator, value }
    }

    /// Comparison operator.
    #[must_use]
    pub const fn operator(&self) -> Operator {
        self.operator
    }

    /// Constant compared against.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Evaluates the predicate against `reading`.
    #[must_use]
    pub fn check(&self, reading: f64) -> bool {
        match self.operator {
            Operator::Eq => reading == self.value,
            Operator::Ne => reading != self.value,
            Operator::Lt => reading < self.value,
            Operator::Le => reading <= self.value,
            Operator::Gt => reading > self.value,
            Operator::Ge => reading >= self.value,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.value)
    }
}

/// Predicate over the local intensity of one field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldPredicate {
    field: FieldId,
    predicate: Predicate,
}

impl FieldPredicate {
    /// Creates a predicate over `field`.
    #[must_use]
    pub const fn new(field: FieldId, predicate: Predicate) -> Self {
        Self { field, predicate }
    }

    /// Field whose local intensity is inspected.
    #[must_use]
    pub const fn field(&self) -> FieldId {
        self.field
    }

    /// Condition the intensity must satisfy.
    #[must_use]
    pub const fn predicate(&self) -> Predicate {
        self.predicate
    }
}

/// Whose age a product inherits when a behaviour is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeSource {
    /// The product starts at age zero.
    #[default]
    Reset,
    /// The product inherits the main cell's age.
    Main,
    /// The product inherits the age of the k-th bound neighbour, counted from one.
    Neighbour(usize),
}

impl AgeSource {
    /// Decodes the signed editor encoding: `-1` resets, `0` copies the main
    /// cell, `k > 0` copies the k-th bound neighbour.
    #[must_use]
    pub fn from_index(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(0) => Self::Main,
            Ok(neighbour) => Self::Neighbour(neighbour),
            Err(_) => Self::Reset,
        }
    }

    /// Signed editor encoding of the source.
    #[must_use]
    pub fn index(&self) -> i32 {
        match self {
            Self::Reset => -1,
            Self::Main => 0,
            Self::Neighbour(neighbour) => i32::try_from(*neighbour).unwrap_or(i32::MAX),
        }
    }
}

/// Per-field coefficients attached to a grain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldCoefficients {
    field: FieldId,
    #[serde(default)]
    production: f32,
    #[serde(default)]
    influence: f32,
    #[serde(default = "default_permeability")]
    permeability: f32,
}

fn default_permeability() -> f32 {
    1.0
}

impl FieldCoefficients {
    /// Creates neutral coefficients: no production, no influence, fully permeable.
    #[must_use]
    pub const fn new(field: FieldId) -> Self {
        Self {
            field,
            production: 0.0,
            influence: 0.0,
            permeability: 1.0,
        }
    }

    /// Overrides the intensity added to the field every step at the grain's cell.
    #[must_use]
    pub const fn with_production(mut self, production: f32) -> Self {
        self.production = production;
        self
    }

    /// Overrides how strongly the field steers the grain's movement.
    #[must_use]
    pub const fn with_influence(mut self, influence: f32) -> Self {
        self.influence = influence;
        self
    }

    /// Overrides how much of the field may diffuse into the grain's cell.
    #[must_use]
    pub const fn with_permeability(mut self, permeability: f32) -> Self {
        self.permeability = permeability;
        self
    }

    /// Field the coefficients apply to.
    #[must_use]
    pub const fn field(&self) -> FieldId {
        self.field
    }

    /// Intensity produced per step.
    #[must_use]
    pub const fn production(&self) -> f32 {
        self.production
    }

    /// Movement influence weight.
    #[must_use]
    pub const fn influence(&self) -> f32 {
        self.influence
    }

    /// Diffusion permeability.
    #[must_use]
    pub const fn permeability(&self) -> f32 {
        self.permeability
    }
}

/// Agent type that may occupy a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grain {
    id: GrainId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    movement_probability: f64,
    #[serde(default)]
    half_life: f32,
    #[serde(default)]
    movement_directions: DirectionSet,
    #[serde(default)]
    fields: Vec<FieldCoefficients>,
}

impl Grain {
    /// Creates an immortal, immobile grain with no field coefficients.
    #[must_use]
    pub fn new(id: GrainId) -> Self {
        Self {
            id,
            name: String::new(),
            movement_probability: 0.0,
            half_life: 0.0,
            movement_directions: DirectionSet::EMPTY,
            fields: Vec::new(),
        }
    }

    /// Overrides the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the half-life, measured in steps. Zero makes the grain immortal.
    #[must_use]
    pub fn with_half_life(mut self, half_life: f32) -> Self {
        self.half_life = half_life;
        self
    }

    /// Lets the grain move into empty neighbours along `directions`.
    #[must_use]
    pub fn with_movement(mut self, probability: f64, directions: DirectionSet) -> Self {
        self.movement_probability = probability;
        self.movement_directions = directions;
        self
    }

    /// Adds or replaces the coefficients for one field.
    #[must_use]
    pub fn with_field(mut self, coefficients: FieldCoefficients) -> Self {
        self.fields
            .retain(|existing| existing.field() != coefficients.field());
        self.fields.push(coefficients);
        self
    }

    /// Identifier of the grain.
    #[must_use]
    pub const fn id(&self) -> GrainId {
        self.id
    }

    /// Display name, possibly empty.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probability of attempting a move each step.
    #[must_use]
    pub const fn movement_probability(&self) -> f64 {
        self.movement_probability
    }

    /// Half-life in steps; zero means immortal.
    #[must_use]
    pub const fn half_life(&self) -> f32 {
        self.half_life
    }

    /// Directions the grain may move along.
    #[must_use]
    pub const fn movement_directions(&self) -> DirectionSet {
        self.movement_directions
    }

    /// Per-field coefficients declared for the grain.
    #[must_use]
    pub fn fields(&self) -> &[FieldCoefficients] {
        &self.fields
    }

    /// Probability of dying during a single step.
    #[must_use]
    pub fn death_probability(&self) -> f64 {
        decay_probability(self.half_life)
    }

    /// Reports whether the grain is mortal.
    #[must_use]
    pub fn is_mortal(&self) -> bool {
        self.half_life > 0.0
    }

    /// Reports whether the grain ever attempts to move.
    #[must_use]
    pub fn can_move(&self) -> bool {
        self.movement_probability > 0.0 && !self.movement_directions.is_empty()
    }

    /// Intensity the grain adds to `field` each step.
    #[must_use]
    pub fn production(&self, field: FieldId) -> f32 {
        self.coefficients(field)
            .map_or(0.0, FieldCoefficients::production)
    }

    /// Fraction of `field` allowed to diffuse into the grain's cell.
    #[must_use]
    pub fn permeability(&self, field: FieldId) -> f32 {
        self.coefficients(field)
            .map_or(1.0, FieldCoefficients::permeability)
    }

    /// Weight steering the grain's movement along `field`.
    #[must_use]
    pub fn influence(&self, field: FieldId) -> f32 {
        self.coefficients(field)
            .map_or(0.0, FieldCoefficients::influence)
    }

    /// Synthesizes the behaviour that moves this grain into an empty neighbour.
    ///
    /// Returns `None` for grains that never move. The mover keeps its age and
    /// is steered by its own field influences.
    #[must_use]
    pub fn movement_behaviour(&self) -> Option<Behaviour> {
        if !self.can_move() {
            return None;
        }

        let step = Reaction::new(None, Some(self.id), self.movement_directions)
            .with_age_source(AgeSource::Main);
        let behaviour = self
            .fields
            .iter()
            .filter(|coefficients| coefficients.influence() != 0.0)
            .fold(
                Behaviour::new(self.id, None, self.movement_probability).with_reaction(step),
                |behaviour, coefficients| {
                    behaviour.with_field_influence(coefficients.field(), coefficients.influence())
                },
            );
        Some(behaviour)
    }

    fn coefficients(&self, field: FieldId) -> Option<&FieldCoefficients> {
        self.fields
            .iter()
            .find(|coefficients| coefficients.field() == field)
    }
}

/// Diffusible scalar channel laid over the lattice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    id: FieldId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    diffusion_speed: f32,
    #[serde(default)]
    half_life: f32,
    #[serde(default = "default_diffusion_directions")]
    directions: DirectionSet,
    #[serde(default)]
    formula: Option<String>,
}

fn default_diffusion_directions() -> DirectionSet {
    DirectionSet::FOUR
}

impl Field {
    /// Creates a static field: no diffusion, no decay, orthogonal directions.
    #[must_use]
    pub fn new(id: FieldId) -> Self {
        Self {
            id,
            name: String::new(),
            diffusion_speed: 0.0,
            half_life: 0.0,
            directions: DirectionSet::FOUR,
            formula: None,
        }
    }

    /// Overrides the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the diffusion speed and the directions it spreads along.
    #[must_use]
    pub fn with_diffusion(mut self, speed: f32, directions: DirectionSet) -> Self {
        self.diffusion_speed = speed;
        self.directions = directions;
        self
    }

    /// Overrides the decay half-life, measured in steps. Zero disables decay.
    #[must_use]
    pub fn with_half_life(mut self, half_life: f32) -> Self {
        self.half_life = half_life;
        self
    }

    /// Attaches the source of a custom update formula.
    #[must_use]
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Identifier of the field.
    #[must_use]
    pub const fn id(&self) -> FieldId {
        self.id
    }

    /// Display name, possibly empty.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fraction of intensity exchanged with neighbours per step.
    #[must_use]
    pub const fn diffusion_speed(&self) -> f32 {
        self.diffusion_speed
    }

    /// Half-life in steps; zero disables decay.
    #[must_use]
    pub const fn half_life(&self) -> f32 {
        self.half_life
    }

    /// Directions intensity flows out along.
    #[must_use]
    pub const fn directions(&self) -> DirectionSet {
        self.directions
    }

    /// Directions intensity flows in from.
    #[must_use]
    pub fn opposite_directions(&self) -> DirectionSet {
        self.directions.opposite()
    }

    /// Source of the custom update formula, if any.
    #[must_use]
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    /// Fraction of intensity lost per step.
    #[must_use]
    pub fn decay_probability(&self) -> f64 {
        decay_probability(self.half_life)
    }
}

/// Neighbour-matching sub-clause of a [`Behaviour`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    reactive: Option<GrainId>,
    #[serde(default)]
    product: Option<GrainId>,
    #[serde(default)]
    age: AgeSource,
    #[serde(default = "default_reaction_directions")]
    directions: DirectionSet,
}

fn default_reaction_directions() -> DirectionSet {
    DirectionSet::FOUR
}

impl Reaction {
    /// Creates a sub-clause matching `reactive` (`None` matches an empty cell)
    /// and replacing it with `product` (`None` clears the cell).
    #[must_use]
    pub const fn new(
        reactive: Option<GrainId>,
        product: Option<GrainId>,
        directions: DirectionSet,
    ) -> Self {
        Self {
            reactive,
            product,
            age: AgeSource::Reset,
            directions,
        }
    }

    /// Overrides whose age the product inherits.
    #[must_use]
    pub const fn with_age_source(mut self, age: AgeSource) -> Self {
        self.age = age;
        self
    }

    /// Grain the neighbour must hold; `None` requires an empty cell.
    #[must_use]
    pub const fn reactive(&self) -> Option<GrainId> {
        self.reactive
    }

    /// Grain written into the neighbour; `None` clears it.
    #[must_use]
    pub const fn product(&self) -> Option<GrainId> {
        self.product
    }

    /// Whose age the product inherits.
    #[must_use]
    pub const fn age_source(&self) -> AgeSource {
        self.age
    }

    /// Directions the neighbour may be found along.
    #[must_use]
    pub const fn directions(&self) -> DirectionSet {
        self.directions
    }

    /// Reports whether `occupant` satisfies the sub-clause.
    #[must_use]
    pub fn matches(&self, occupant: Option<GrainId>) -> bool {
        occupant == self.reactive
    }
}

/// Weight of one field in the neighbour choice of a behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfluence {
    field: FieldId,
    weight: f32,
}

impl FieldInfluence {
    /// Creates an influence entry.
    #[must_use]
    pub const fn new(field: FieldId, weight: f32) -> Self {
        Self { field, weight }
    }

    /// Field whose gradient steers the choice.
    #[must_use]
    pub const fn field(&self) -> FieldId {
        self.field
    }

    /// Strength and sign of the steering.
    #[must_use]
    pub const fn weight(&self) -> f32 {
        self.weight
    }
}

/// Probabilistic reaction rule centred on one grain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Behaviour {
    reactive: GrainId,
    #[serde(default)]
    product: Option<GrainId>,
    #[serde(default = "default_product_age")]
    product_age: AgeSource,
    #[serde(default)]
    age: Option<Predicate>,
    #[serde(default)]
    field_predicates: Vec<FieldPredicate>,
    probability: f64,
    #[serde(default)]
    reactions: Vec<Reaction>,
    #[serde(default)]
    field_influences: Vec<FieldInfluence>,
}

fn default_product_age() -> AgeSource {
    AgeSource::Main
}

impl Behaviour {
    /// Creates a behaviour turning `reactive` into `product` with the given
    /// per-step probability. The product keeps the main cell's age.
    #[must_use]
    pub fn new(reactive: GrainId, product: Option<GrainId>, probability: f64) -> Self {
        Self {
            reactive,
            product,
            product_age: AgeSource::Main,
            age: None,
            field_predicates: Vec::new(),
            probability,
            reactions: Vec::new(),
            field_influences: Vec::new(),
        }
    }

    /// Overrides whose age the main product inherits.
    #[must_use]
    pub fn with_product_age(mut self, source: AgeSource) -> Self {
        self.product_age = source;
        self
    }

    /// Restricts the behaviour to agents whose age satisfies `predicate`.
    #[must_use]
    pub fn with_age_predicate(mut self, predicate: Predicate) -> Self {
        self.age = Some(predicate);
        self
    }

    /// Restricts the behaviour to cells whose `field` reading satisfies `predicate`.
    #[must_use]
    pub fn with_field_predicate(mut self, field: FieldId, predicate: Predicate) -> Self {
        self.field_predicates
            .push(FieldPredicate::new(field, predicate));
        self
    }

    /// Appends a neighbour sub-clause.
    #[must_use]
    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reactions.push(reaction);
        self
    }

    /// Steers neighbour choice along `field` with `weight`.
    #[must_use]
    pub fn with_field_influence(mut self, field: FieldId, weight: f32) -> Self {
        self.field_influences
            .push(FieldInfluence::new(field, weight));
        self
    }

    /// Grain the main cell must hold.
    #[must_use]
    pub const fn reactive(&self) -> GrainId {
        self.reactive
    }

    /// Grain written into the main cell; `None` clears it.
    #[must_use]
    pub const fn product(&self) -> Option<GrainId> {
        self.product
    }

    /// Whose age the main product inherits.
    #[must_use]
    pub const fn product_age(&self) -> AgeSource {
        self.product_age
    }

    /// Age condition, if any.
    #[must_use]
    pub const fn age_predicate(&self) -> Option<Predicate> {
        self.age
    }

    /// Field conditions on the main cell.
    #[must_use]
    pub fn field_predicates(&self) -> &[FieldPredicate] {
        &self.field_predicates
    }

    /// Probability the behaviour is considered in a step when applicable.
    #[must_use]
    pub const fn probability(&self) -> f64 {
        self.probability
    }

    /// Neighbour sub-clauses.
    #[must_use]
    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// Field influences steering neighbour choice.
    #[must_use]
    pub fn field_influences(&self) -> &[FieldInfluence] {
        &self.field_influences
    }

    /// Decides whether the behaviour may fire for an agent.
    ///
    /// `field_value` yields the local intensity of a field and `occupant` the
    /// grain found along a direction. Grain and age are checked first, then
    /// field predicates, and the neighbour search runs last. The search only
    /// establishes that every sub-clause has at least one candidate.
    pub fn is_applicable<F, N>(&self, grain: GrainId, age: u32, field_value: F, occupant: N) -> bool
    where
        F: Fn(FieldId) -> f32,
        N: Fn(Direction) -> Option<GrainId>,
    {
        if grain != self.reactive {
            return false;
        }

        if let Some(predicate) = self.age {
            if !predicate.check(f64::from(age)) {
                return false;
            }
        }

        let fields_hold = self.field_predicates.iter().all(|condition| {
            let reading = flatten_noise(field_value(condition.field()));
            condition.predicate().check(f64::from(reading))
        });
        if !fields_hold {
            return false;
        }

        self.reactions.iter().all(|reaction| {
            reaction
                .directions()
                .iter()
                .any(|direction| reaction.matches(occupant(direction)))
        })
    }
}

/// Flattens intensities below the noise floor to zero before comparisons.
#[must_use]
pub fn flatten_noise(value: f32) -> f32 {
    if value < FIELD_NOISE_FLOOR {
        0.0
    } else {
        value
    }
}

/// Complete set of grain, field and behaviour definitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleModel {
    #[serde(default)]
    grains: Vec<Grain>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    behaviours: Vec<Behaviour>,
}

impl RuleModel {
    /// Bundles definitions into a model. Call [`RuleModel::validate`] before use.
    #[must_use]
    pub fn new(grains: Vec<Grain>, fields: Vec<Field>, behaviours: Vec<Behaviour>) -> Self {
        Self {
            grains,
            fields,
            behaviours,
        }
    }

    /// Grain definitions in declaration order.
    #[must_use]
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    /// Field definitions in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Authored behaviours in declaration order.
    #[must_use]
    pub fn behaviours(&self) -> &[Behaviour] {
        &self.behaviours
    }

    /// Looks up a grain by identifier.
    #[must_use]
    pub fn grain(&self, id: GrainId) -> Option<&Grain> {
        self.grains.iter().find(|grain| grain.id() == id)
    }

    /// Looks up a field by identifier.
    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|field| field.id() == id)
    }

    /// Checks identifiers, references and numeric ranges across the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut field_ids = HashSet::new();
        for field in &self.fields {
            if !field_ids.insert(field.id()) {
                return Err(ModelError::DuplicateField(field.id()));
            }
            if !(0.0..=1.0).contains(&field.diffusion_speed()) {
                return Err(ModelError::InvalidDiffusionSpeed {
                    field: field.id(),
                    speed: field.diffusion_speed(),
                });
            }
            if !valid_half_life(field.half_life()) {
                return Err(ModelError::InvalidFieldHalfLife {
                    field: field.id(),
                    half_life: field.half_life(),
                });
            }
        }

        let mut grain_ids = HashSet::new();
        for grain in &self.grains {
            if !grain_ids.insert(grain.id()) {
                return Err(ModelError::DuplicateGrain(grain.id()));
            }
            if !valid_half_life(grain.half_life()) {
                return Err(ModelError::InvalidGrainHalfLife {
                    grain: grain.id(),
                    half_life: grain.half_life(),
                });
            }
            if !(0.0..=1.0).contains(&grain.movement_probability()) {
                return Err(ModelError::InvalidMovementProbability {
                    grain: grain.id(),
                    probability: grain.movement_probability(),
                });
            }
            if let Some(unknown) = grain
                .fields()
                .iter()
                .find(|coefficients| !field_ids.contains(&coefficients.field()))
            {
                return Err(ModelError::UnknownGrainField {
                    grain: grain.id(),
                    field: unknown.field(),
                });
            }
        }

        for (index, behaviour) in self.behaviours.iter().enumerate() {
            validate_behaviour(index, behaviour, &grain_ids, &field_ids)?;
        }

        Ok(())
    }

    /// Checks that `layout` covers `lattice` and only places known grains.
    pub fn validate_layout(
        &self,
        lattice: &Lattice,
        layout: &[Option<GrainId>],
    ) -> Result<(), ModelError> {
        if layout.len() != lattice.data_size() {
            return Err(ModelError::LayoutSizeMismatch {
                expected: lattice.data_size(),
                actual: layout.len(),
            });
        }

        for (index, grain) in layout.iter().enumerate() {
            if let Some(grain) = grain {
                if self.grain(*grain).is_none() {
                    return Err(ModelError::UnknownLayoutGrain {
                        index,
                        grain: *grain,
                    });
                }
            }
        }

        Ok(())
    }
}

fn valid_half_life(half_life: f32) -> bool {
    half_life.is_finite() && half_life >= 0.0
}

fn validate_behaviour(
    index: usize,
    behaviour: &Behaviour,
    grain_ids: &HashSet<GrainId>,
    field_ids: &HashSet<FieldId>,
) -> Result<(), ModelError> {
    let known_grain = |grain: Option<GrainId>| match grain {
        Some(grain) if !grain_ids.contains(&grain) => Err(ModelError::UnknownBehaviourGrain {
            behaviour: index,
            grain,
        }),
        _ => Ok(()),
    };
    let known_field = |field: FieldId| {
        if field_ids.contains(&field) {
            Ok(())
        } else {
            Err(ModelError::UnknownBehaviourField {
                behaviour: index,
                field,
            })
        }
    };
    let bound = behaviour.reactions().len();
    let age_in_range = |source: AgeSource| match source {
        AgeSource::Neighbour(neighbour) if neighbour == 0 || neighbour > bound => {
            Err(ModelError::AgeSourceOutOfRange {
                behaviour: index,
                neighbour,
                bound,
            })
        }
        _ => Ok(()),
    };

    known_grain(Some(behaviour.reactive()))?;
    known_grain(behaviour.product())?;
    age_in_range(behaviour.product_age())?;

    if !(0.0..=1.0).contains(&behaviour.probability()) {
        return Err(ModelError::InvalidBehaviourProbability {
            behaviour: index,
            probability: behaviour.probability(),
        });
    }

    for condition in behaviour.field_predicates() {
        known_field(condition.field())?;
    }
    for influence in behaviour.field_influences() {
        known_field(influence.field())?;
    }
    for reaction in behaviour.reactions() {
        known_grain(reaction.reactive())?;
        known_grain(reaction.product())?;
        age_in_range(reaction.age_source())?;
    }

    Ok(())
}

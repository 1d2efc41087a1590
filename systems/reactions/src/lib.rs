#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Behaviour matching and conflict resolution for the Grainfield engine.
//!
//! The system never mutates the grid while it searches. [`Matcher::collect`]
//! reads an immutable [`GridView`] and records one [`ApplicableBehaviour`] per
//! cell that fires, [`resolve_conflicts`] drops candidates that would touch a
//! cell already claimed by another, and [`apply_candidate`] writes the
//! survivors back. Callers drive the three phases in that order.

mod combinations;
mod conflicts;
mod influence;

use std::collections::HashMap;

use grainfield_core::{
    AgeSource, Behaviour, Direction, Field, FieldId, Grain, GrainId, Lattice, ModelError,
    RuleModel, MIN_FIELD,
};
use rand::Rng;

pub use conflicts::{resolve_conflicts, Resolution};
pub use influence::sharpened_weights;

/// Rule model compiled into the lookup tables used while stepping.
///
/// Movement behaviours are synthesized once here and appended after the
/// authored behaviours, so matching never special-cases them.
#[derive(Clone, Debug)]
pub struct RuleTable {
    grains: Vec<Grain>,
    grain_slots: HashMap<GrainId, usize>,
    fields: Vec<Field>,
    field_slots: HashMap<FieldId, usize>,
    behaviours: Vec<Behaviour>,
    authored: usize,
    by_grain: HashMap<GrainId, Vec<usize>>,
}

impl RuleTable {
    /// Validates `model` and builds the id lookups.
    pub fn compile(model: &RuleModel) -> Result<Self, ModelError> {
        model.validate()?;

        let grains = model.grains().to_vec();
        let grain_slots = grains
            .iter()
            .enumerate()
            .map(|(slot, grain)| (grain.id(), slot))
            .collect();
        let fields = model.fields().to_vec();
        let field_slots = fields
            .iter()
            .enumerate()
            .map(|(slot, field)| (field.id(), slot))
            .collect();

        let mut behaviours = model.behaviours().to_vec();
        let authored = behaviours.len();
        behaviours.extend(grains.iter().filter_map(Grain::movement_behaviour));

        let mut by_grain: HashMap<GrainId, Vec<usize>> = HashMap::new();
        for (index, behaviour) in behaviours.iter().enumerate() {
            by_grain.entry(behaviour.reactive()).or_default().push(index);
        }

        Ok(Self {
            grains,
            grain_slots,
            fields,
            field_slots,
            behaviours,
            authored,
            by_grain,
        })
    }

    /// Grain definitions in model order.
    #[must_use]
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    /// Looks up a grain by identifier.
    #[must_use]
    pub fn grain(&self, id: GrainId) -> Option<&Grain> {
        self.grain_slots
            .get(&id)
            .and_then(|slot| self.grains.get(*slot))
    }

    /// Position of `grain` in [`RuleTable::grains`].
    #[must_use]
    pub fn grain_slot(&self, grain: GrainId) -> Option<usize> {
        self.grain_slots.get(&grain).copied()
    }

    /// Field definitions in model order. A field's position is its slot.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Position of `field` in [`RuleTable::fields`].
    #[must_use]
    pub fn field_slot(&self, field: FieldId) -> Option<usize> {
        self.field_slots.get(&field).copied()
    }

    /// Authored behaviours followed by synthesized movement behaviours.
    #[must_use]
    pub fn behaviours(&self) -> &[Behaviour] {
        &self.behaviours
    }

    /// Number of synthesized movement behaviours.
    #[must_use]
    pub fn movement_behaviour_count(&self) -> usize {
        self.behaviours.len() - self.authored
    }

    /// Indices of the behaviours whose main reactive grain is `grain`, in table order.
    #[must_use]
    pub fn behaviours_for(&self, grain: GrainId) -> &[usize] {
        self.by_grain
            .get(&grain)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reports whether any behaviour can trigger on `grain`.
    #[must_use]
    pub fn is_reactive(&self, grain: GrainId) -> bool {
        self.by_grain.contains_key(&grain)
    }
}

/// Read-only view of the grid state searched for candidates.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    lattice: &'a Lattice,
    agents: &'a [Option<GrainId>],
    ages: &'a [Option<u32>],
    fields: &'a [Vec<f32>],
}

impl<'a> GridView<'a> {
    /// Captures a view over agent, age and field buffers indexed like `lattice`.
    ///
    /// `fields` holds one buffer per field slot of the [`RuleTable`].
    #[must_use]
    pub fn new(
        lattice: &'a Lattice,
        agents: &'a [Option<GrainId>],
        ages: &'a [Option<u32>],
        fields: &'a [Vec<f32>],
    ) -> Self {
        Self {
            lattice,
            agents,
            ages,
            fields,
        }
    }

    /// Lattice the buffers are laid out on.
    #[must_use]
    pub fn lattice(&self) -> &'a Lattice {
        self.lattice
    }

    /// Grain occupying `index`, if any.
    #[must_use]
    pub fn occupant(&self, index: usize) -> Option<GrainId> {
        self.agents.get(index).copied().flatten()
    }

    /// Age of the agent at `index`, if any.
    #[must_use]
    pub fn age(&self, index: usize) -> Option<u32> {
        self.ages.get(index).copied().flatten()
    }

    /// Intensity of the field in `slot` at `index`, floored when missing.
    #[must_use]
    pub fn field_value(&self, slot: usize, index: usize) -> f32 {
        self.fields
            .get(slot)
            .and_then(|values| values.get(index))
            .copied()
            .unwrap_or(MIN_FIELD)
    }
}

/// Neighbour bound to one reaction sub-clause of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundNeighbour {
    /// Direction the neighbour was found along.
    pub direction: Direction,
    /// Cell of the neighbour.
    pub index: usize,
    /// Grain the neighbour held when it was bound.
    pub occupant: Option<GrainId>,
    /// Age of the neighbour when it was bound.
    pub age: Option<u32>,
}

/// Behaviour chosen to fire at a cell, with concrete neighbour bindings.
///
/// Lives for a single step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicableBehaviour {
    /// Cell of the main agent.
    pub origin: usize,
    /// Age of the main agent when the behaviour was chosen.
    pub age: u32,
    /// Index of the behaviour in [`RuleTable::behaviours`].
    pub behaviour: usize,
    /// One bound neighbour per reaction sub-clause, in sub-clause order.
    pub neighbours: Vec<BoundNeighbour>,
}

impl ApplicableBehaviour {
    /// Every cell the candidate mutates: the origin, then its neighbours.
    pub fn touched_cells(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.origin).chain(self.neighbours.iter().map(|bound| bound.index))
    }

    fn inherited_age(&self, source: AgeSource) -> u32 {
        match source {
            AgeSource::Reset => 0,
            AgeSource::Main => self.age,
            AgeSource::Neighbour(position) => position
                .checked_sub(1)
                .and_then(|offset| self.neighbours.get(offset))
                .and_then(|bound| bound.age)
                .unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PassingCell {
    cell: usize,
    start: usize,
    end: usize,
}

/// Candidate search with scratch buffers reused across steps.
#[derive(Debug, Default)]
pub struct Matcher {
    passing: Vec<usize>,
    passing_cells: Vec<PassingCell>,
    options: Vec<Vec<BoundNeighbour>>,
}

impl Matcher {
    /// Creates a matcher with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the candidate behaviours of every living reactive agent into `out`.
    ///
    /// Random draws happen in two sweeps so replays stay stable: first one
    /// probability draw per matching behaviour of every cell in scan order,
    /// then, again in scan order, the rule choice and the neighbour
    /// combination choice of every cell that kept at least one behaviour.
    pub fn collect<R: Rng>(
        &mut self,
        table: &RuleTable,
        view: &GridView<'_>,
        rng: &mut R,
        out: &mut Vec<ApplicableBehaviour>,
    ) {
        out.clear();
        self.draw_passing(table, view, rng);

        for position in 0..self.passing_cells.len() {
            let PassingCell { cell, start, end } = self.passing_cells[position];
            let offset = if end - start > 1 {
                rng.gen_range(0..end - start)
            } else {
                0
            };
            let chosen = self.passing[start + offset];
            if let Some(candidate) = self.bind(table, view, cell, chosen, rng) {
                out.push(candidate);
            }
        }
    }

    fn draw_passing<R: Rng>(&mut self, table: &RuleTable, view: &GridView<'_>, rng: &mut R) {
        self.passing.clear();
        self.passing_cells.clear();

        for cell in 0..view.lattice().data_size() {
            let Some(grain) = view.occupant(cell) else {
                continue;
            };
            let candidates = table.behaviours_for(grain);
            if candidates.is_empty() {
                continue;
            }

            let age = view.age(cell).unwrap_or(0);
            let start = self.passing.len();
            for &index in candidates {
                let Some(behaviour) = table.behaviours().get(index) else {
                    continue;
                };
                if rng.gen::<f64>() >= behaviour.probability() {
                    continue;
                }

                let applicable = behaviour.is_applicable(
                    grain,
                    age,
                    |field| {
                        table
                            .field_slot(field)
                            .map_or(MIN_FIELD, |slot| view.field_value(slot, cell))
                    },
                    |direction| view.occupant(view.lattice().neighbour(cell, direction)),
                );
                if applicable {
                    self.passing.push(index);
                }
            }

            if self.passing.len() > start {
                self.passing_cells.push(PassingCell {
                    cell,
                    start,
                    end: self.passing.len(),
                });
            }
        }
    }

    fn bind<R: Rng>(
        &mut self,
        table: &RuleTable,
        view: &GridView<'_>,
        origin: usize,
        behaviour_index: usize,
        rng: &mut R,
    ) -> Option<ApplicableBehaviour> {
        let behaviour = table.behaviours().get(behaviour_index)?;
        let reactions = behaviour.reactions();

        self.options.resize_with(reactions.len(), Vec::new);
        for (reaction, options) in reactions.iter().zip(self.options.iter_mut()) {
            combinations::matching_neighbours(reaction, origin, view, options);
            if options.is_empty() {
                return None;
            }
        }

        let mut legal = combinations::enumerate(&self.options, origin);
        if legal.is_empty() {
            return None;
        }

        let chosen = influence::choose_combination(&legal, behaviour, table, view, origin, rng);
        let neighbours = legal.swap_remove(chosen);
        Some(ApplicableBehaviour {
            origin,
            age: view.age(origin).unwrap_or(0),
            behaviour: behaviour_index,
            neighbours,
        })
    }
}

/// Writes a surviving candidate's products into the grid.
///
/// Ages are taken from the values captured when the candidate was recorded,
/// so the order survivors are applied in does not matter.
pub fn apply_candidate(
    table: &RuleTable,
    candidate: &ApplicableBehaviour,
    agents: &mut [Option<GrainId>],
    ages: &mut [Option<u32>],
) {
    let Some(behaviour) = table.behaviours().get(candidate.behaviour) else {
        return;
    };

    let age = candidate.inherited_age(behaviour.product_age());
    write_cell(agents, ages, candidate.origin, behaviour.product(), age);

    for (reaction, bound) in behaviour.reactions().iter().zip(&candidate.neighbours) {
        let age = candidate.inherited_age(reaction.age_source());
        write_cell(agents, ages, bound.index, reaction.product(), age);
    }
}

fn write_cell(
    agents: &mut [Option<GrainId>],
    ages: &mut [Option<u32>],
    index: usize,
    product: Option<GrainId>,
    age: u32,
) {
    if let (Some(agent), Some(slot_age)) = (agents.get_mut(index), ages.get_mut(index)) {
        *agent = product;
        *slot_age = product.map(|_| age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grainfield_core::{DirectionSet, Reaction};

    const A: GrainId = GrainId::new(0);
    const B: GrainId = GrainId::new(1);

    #[test]
    fn compile_appends_movement_after_authored_behaviours() {
        let model = RuleModel::new(
            vec![
                Grain::new(A).with_movement(0.5, DirectionSet::FOUR),
                Grain::new(B),
            ],
            Vec::new(),
            vec![Behaviour::new(B, Some(A), 0.1)],
        );
        let table = RuleTable::compile(&model).expect("valid model");

        assert_eq!(table.behaviours().len(), 2);
        assert_eq!(table.movement_behaviour_count(), 1);
        assert_eq!(table.behaviours_for(A), &[1]);
        assert_eq!(table.behaviours_for(B), &[0]);
        assert!(table.is_reactive(A));
        assert!(table.grain(B).is_some());
        assert!(table.grain(GrainId::new(9)).is_none());
        assert_eq!(table.grain_slot(B), Some(1));
    }

    #[test]
    fn compile_fails_fast_on_unknown_grains() {
        let model = RuleModel::new(
            vec![Grain::new(A)],
            Vec::new(),
            vec![Behaviour::new(A, Some(B), 1.0)],
        );
        assert!(matches!(
            RuleTable::compile(&model),
            Err(ModelError::UnknownBehaviourGrain { .. })
        ));
    }

    #[test]
    fn apply_uses_captured_ages() {
        let model = RuleModel::new(
            vec![Grain::new(A), Grain::new(B)],
            Vec::new(),
            vec![Behaviour::new(A, Some(B), 1.0)
                .with_product_age(AgeSource::Neighbour(1))
                .with_reaction(
                    Reaction::new(Some(B), Some(A), DirectionSet::FOUR)
                        .with_age_source(AgeSource::Main),
                )],
        );
        let table = RuleTable::compile(&model).expect("valid model");
        let mut agents = vec![Some(A), Some(B)];
        let mut ages = vec![Some(3), Some(9)];
        let candidate = ApplicableBehaviour {
            origin: 0,
            age: 3,
            behaviour: 0,
            neighbours: vec![BoundNeighbour {
                direction: Direction::East,
                index: 1,
                occupant: Some(B),
                age: Some(9),
            }],
        };

        apply_candidate(&table, &candidate, &mut agents, &mut ages);

        assert_eq!(agents, vec![Some(B), Some(A)]);
        assert_eq!(ages, vec![Some(9), Some(3)]);
    }

    #[test]
    fn empty_products_clear_cells() {
        let model = RuleModel::new(
            vec![Grain::new(A)],
            Vec::new(),
            vec![Behaviour::new(A, None, 1.0)],
        );
        let table = RuleTable::compile(&model).expect("valid model");
        let mut agents = vec![Some(A)];
        let mut ages = vec![Some(5)];
        let candidate = ApplicableBehaviour {
            origin: 0,
            age: 5,
            behaviour: 0,
            neighbours: Vec::new(),
        };

        apply_candidate(&table, &candidate, &mut agents, &mut ages);

        assert_eq!(agents, vec![None]);
        assert_eq!(ages, vec![None]);
    }
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative grid state and step execution for Grainfield.
//!
//! The [`Simulator`] owns the agent, age and field buffers of one lattice and
//! advances them with [`Simulator::one_step`]. Adapters drive it through
//! [`apply`] and read it through [`query`].

use std::fmt;

use grainfield_core::{
    Command, EditError, Event, FieldEvaluator, FieldId, GrainId, Lattice, ModelError, RuleModel,
    StepReport, MIN_FIELD,
};
use grainfield_system_diffusion::{clamp_intensity, diffuse_field, Coefficients, FieldPass};
use grainfield_system_reactions::{
    apply_candidate, resolve_conflicts, ApplicableBehaviour, GridView, Matcher, RuleTable,
};
use grainfield_system_statistics::Statistics;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// Stochastic grid simulation bound to one rule model.
///
/// Randomness comes exclusively from `R`, so two simulators built from the
/// same model, layout and seed stay identical step for step.
pub struct Simulator<R = ChaCha8Rng> {
    table: RuleTable,
    lattice: Lattice,
    agents: Vec<Option<GrainId>>,
    ages: Vec<Option<u32>>,
    initial_agents: Vec<Option<GrainId>>,
    current: Vec<Vec<f32>>,
    next: Vec<Vec<f32>>,
    evaluators: Vec<Option<Box<dyn FieldEvaluator>>>,
    coefficients: Vec<Vec<Coefficients>>,
    death_probabilities: Vec<f64>,
    step: u64,
    rng: R,
    matcher: Matcher,
    candidates: Vec<ApplicableBehaviour>,
    grain_counts: Vec<u32>,
    field_totals: Vec<f64>,
    statistics: Statistics,
    formulas_checked: bool,
}

impl Simulator<ChaCha8Rng> {
    /// Creates a simulator driven by a [`ChaCha8Rng`] seeded with `seed`.
    pub fn seeded(
        model: &RuleModel,
        lattice: Lattice,
        layout: Vec<Option<GrainId>>,
        seed: u64,
    ) -> Result<Self, ModelError> {
        Self::new(model, lattice, layout, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> Simulator<R> {
    /// Validates the model and layout and builds the initial grid state.
    ///
    /// Every placed agent starts at age zero and every field at the floor
    /// intensity.
    pub fn new(
        model: &RuleModel,
        lattice: Lattice,
        layout: Vec<Option<GrainId>>,
        rng: R,
    ) -> Result<Self, ModelError> {
        let table = RuleTable::compile(model)?;
        model.validate_layout(&lattice, &layout)?;

        let size = lattice.data_size();
        let field_count = table.fields().len();
        let coefficients = table
            .fields()
            .iter()
            .map(|field| {
                table
                    .grains()
                    .iter()
                    .map(|grain| Coefficients {
                        production: grain.production(field.id()),
                        permeability: grain.permeability(field.id()),
                    })
                    .collect()
            })
            .collect();
        let death_probabilities = table
            .grains()
            .iter()
            .map(|grain| grain.death_probability())
            .collect();
        let statistics = Statistics::new(
            table.grains().iter().map(|grain| grain.id()),
            table.fields().iter().map(|field| field.id()),
        );

        let mut simulator = Self {
            agents: layout.clone(),
            ages: initial_ages(&layout),
            initial_agents: layout,
            current: vec![vec![MIN_FIELD; size]; field_count],
            next: vec![vec![MIN_FIELD; size]; field_count],
            evaluators: (0..field_count).map(|_| None).collect(),
            coefficients,
            death_probabilities,
            step: 0,
            rng,
            matcher: Matcher::new(),
            candidates: Vec::new(),
            grain_counts: vec![0; table.grains().len()],
            field_totals: vec![0.0; field_count],
            statistics,
            formulas_checked: false,
            lattice,
            table,
        };
        simulator.seed_statistics();

        info!(
            width = simulator.lattice.width(),
            height = simulator.lattice.height(),
            depth = simulator.lattice.depth(),
            grains = simulator.table.grains().len(),
            fields = field_count,
            behaviours = simulator.table.behaviours().len(),
            "simulator constructed"
        );
        Ok(simulator)
    }

    /// Binds a custom post-processing hook to `field`, replacing any previous one.
    pub fn with_field_evaluator<E>(mut self, field: FieldId, evaluator: E) -> Result<Self, EditError>
    where
        E: FieldEvaluator + 'static,
    {
        self.set_field_evaluator(field, evaluator)?;
        Ok(self)
    }

    /// Binds a custom post-processing hook to `field`, replacing any previous one.
    pub fn set_field_evaluator<E>(&mut self, field: FieldId, evaluator: E) -> Result<(), EditError>
    where
        E: FieldEvaluator + 'static,
    {
        let slot = self
            .table
            .field_slot(field)
            .ok_or(EditError::UnknownField(field))?;
        let entry = self
            .evaluators
            .get_mut(slot)
            .ok_or(EditError::UnknownField(field))?;
        *entry = Some(Box::new(evaluator));
        Ok(())
    }

    /// Advances the grid by one step and reports what happened.
    ///
    /// Phases never interleave: ageing and deaths first, then the field pass
    /// into the next buffer, then candidate search over the post-death grid,
    /// conflict resolution, application, bookkeeping and the buffer swap.
    pub fn one_step(&mut self) -> StepReport {
        self.warn_unbound_formulas();

        let deaths = self.age_and_cull();
        self.diffuse_fields();

        let view = GridView::new(&self.lattice, &self.agents, &self.ages, &self.current);
        self.matcher
            .collect(&self.table, &view, &mut self.rng, &mut self.candidates);
        let candidates = self.candidates.len();

        let resolution = resolve_conflicts(std::mem::take(&mut self.candidates), &mut self.rng);
        for survivor in &resolution.survivors {
            apply_candidate(&self.table, survivor, &mut self.agents, &mut self.ages);
        }
        let applied = resolution.survivors.len();
        // Hand the emptied survivor buffer back so the next step reuses its allocation.
        let mut spent = resolution.survivors;
        spent.clear();
        self.candidates = spent;

        self.statistics.record(&self.grain_counts, &self.field_totals);
        std::mem::swap(&mut self.current, &mut self.next);

        let report = StepReport {
            step: self.step,
            deaths,
            candidates: saturating_u32(candidates),
            excluded: saturating_u32(resolution.excluded),
            applied: saturating_u32(applied),
        };
        self.step += 1;
        self.statistics.observe(report);

        debug!(
            step = report.step,
            deaths = report.deaths,
            candidates = report.candidates,
            excluded = report.excluded,
            applied = report.applied,
            "step completed"
        );
        report
    }

    /// Restores the construction-time layout, floors every field and restarts history.
    ///
    /// The random source keeps its position.
    pub fn reset(&mut self) {
        self.agents.clone_from(&self.initial_agents);
        self.ages = initial_ages(&self.initial_agents);
        for buffer in self.current.iter_mut().chain(self.next.iter_mut()) {
            buffer.fill(MIN_FIELD);
        }
        self.step = 0;
        self.candidates.clear();
        self.seed_statistics();

        info!(
            agents = self.agents.iter().flatten().count(),
            "simulation reset"
        );
    }

    /// Grain occupying `index`, if any.
    #[must_use]
    pub fn grain_at_index(&self, index: usize) -> Option<GrainId> {
        self.agents.get(index).copied().flatten()
    }

    /// Current intensity of `field` at `index`.
    #[must_use]
    pub fn field_value_at(&self, field: FieldId, index: usize) -> Option<f32> {
        let slot = self.table.field_slot(field)?;
        self.current.get(slot)?.get(index).copied()
    }

    /// Paints `grain` onto `index` with age zero, replacing any occupant.
    ///
    /// Returns the grain that previously occupied the cell.
    pub fn set_agent_at(
        &mut self,
        index: usize,
        grain: GrainId,
    ) -> Result<Option<GrainId>, EditError> {
        if self.table.grain(grain).is_none() {
            return Err(EditError::UnknownGrain(grain));
        }
        let (agent, age) = self.cell_mut(index)?;
        let previous = agent.replace(grain);
        *age = Some(0);
        Ok(previous)
    }

    /// Empties `index` and returns the grain that occupied it.
    pub fn clear_agent_at(&mut self, index: usize) -> Result<Option<GrainId>, EditError> {
        let (agent, age) = self.cell_mut(index)?;
        *age = None;
        Ok(agent.take())
    }

    /// Overrides the current intensity of `field` at `index`.
    ///
    /// The value is clamped to `[MIN_FIELD, 1]`; the stored value is returned.
    pub fn set_field_value_at(
        &mut self,
        field: FieldId,
        index: usize,
        value: f32,
    ) -> Result<f32, EditError> {
        if !value.is_finite() {
            return Err(EditError::NonFiniteValue);
        }
        let slot = self
            .table
            .field_slot(field)
            .ok_or(EditError::UnknownField(field))?;
        let cell = self
            .current
            .get_mut(slot)
            .ok_or(EditError::UnknownField(field))?
            .get_mut(index)
            .ok_or(EditError::OutOfBounds { index })?;
        *cell = clamp_intensity(value);
        Ok(*cell)
    }

    fn cell_mut(
        &mut self,
        index: usize,
    ) -> Result<(&mut Option<GrainId>, &mut Option<u32>), EditError> {
        match (self.agents.get_mut(index), self.ages.get_mut(index)) {
            (Some(agent), Some(age)) => Ok((agent, age)),
            _ => Err(EditError::OutOfBounds { index }),
        }
    }

    /// Ages survivors and removes agents that die this step, in scan order.
    fn age_and_cull(&mut self) -> u32 {
        self.grain_counts.fill(0);
        let mut deaths = 0;

        for (agent, age) in self.agents.iter_mut().zip(self.ages.iter_mut()) {
            let Some(grain) = *agent else {
                continue;
            };
            let Some(slot) = self.table.grain_slot(grain) else {
                continue;
            };

            let death_probability = self.death_probabilities.get(slot).copied().unwrap_or(0.0);
            if death_probability > 0.0 && self.rng.gen::<f64>() < death_probability {
                *agent = None;
                *age = None;
                deaths += 1;
                continue;
            }

            if let Some(count) = self.grain_counts.get_mut(slot) {
                *count += 1;
            }
            *age = Some(age.map_or(1, |value| value.saturating_add(1)));
        }

        deaths
    }

    /// Fills the next buffer of every field from the current one.
    fn diffuse_fields(&mut self) {
        let agents = &self.agents;
        let table = &self.table;
        let step = self.step;

        let layers = table
            .fields()
            .iter()
            .zip(&self.current)
            .zip(self.next.iter_mut())
            .zip(self.evaluators.iter_mut())
            .zip(&self.coefficients)
            .zip(self.field_totals.iter_mut());
        for (((((field, current), next), evaluator), per_grain), total) in layers {
            let lookup = |index: usize| {
                agents
                    .get(index)
                    .copied()
                    .flatten()
                    .and_then(|grain| table.grain_slot(grain))
                    .and_then(|slot| per_grain.get(slot).copied())
                    .unwrap_or(Coefficients::EMPTY)
            };
            let hook: Option<&mut dyn FieldEvaluator> = match evaluator {
                Some(boxed) => Some(&mut **boxed),
                None => None,
            };

            let outcome = diffuse_field(
                FieldPass {
                    lattice: &self.lattice,
                    field,
                    current,
                    step,
                },
                next,
                lookup,
                hook,
            );
            *total = outcome.total;

            if outcome.hook_failures > 0 {
                warn!(
                    field = %field.id(),
                    step,
                    failures = outcome.hook_failures,
                    "field evaluator failed; kept diffused values"
                );
            }
        }
    }

    fn seed_statistics(&mut self) {
        self.grain_counts.fill(0);
        for grain in self.agents.iter().flatten() {
            if let Some(count) = self
                .table
                .grain_slot(*grain)
                .and_then(|slot| self.grain_counts.get_mut(slot))
            {
                *count += 1;
            }
        }
        for (total, buffer) in self.field_totals.iter_mut().zip(&self.current) {
            *total = buffer.iter().map(|value| f64::from(*value)).sum();
        }
        self.statistics.reset_with(&self.grain_counts, &self.field_totals);
    }

    fn warn_unbound_formulas(&mut self) {
        if self.formulas_checked {
            return;
        }
        self.formulas_checked = true;

        for (field, evaluator) in self.table.fields().iter().zip(&self.evaluators) {
            if let (Some(formula), None) = (field.formula(), evaluator) {
                warn!(
                    field = %field.id(),
                    formula,
                    "field carries a formula but no evaluator is bound; values pass through unchanged"
                );
            }
        }
    }
}

impl<R> fmt::Debug for Simulator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("lattice", &self.lattice)
            .field("step", &self.step)
            .field("agents", &self.agents.iter().flatten().count())
            .field(
                "evaluators",
                &self.evaluators.iter().filter(|hook| hook.is_some()).count(),
            )
            .finish_non_exhaustive()
    }
}

fn initial_ages(layout: &[Option<GrainId>]) -> Vec<Option<u32>> {
    layout.iter().map(|agent| agent.map(|_| 0)).collect()
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Applies the provided command to the simulator, reporting the outcome through `out_events`.
pub fn apply<R: Rng>(simulator: &mut Simulator<R>, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Step => {
            let report = simulator.one_step();
            out_events.push(Event::StepCompleted { report });
        }
        Command::StepMany { count } => {
            for _ in 0..count {
                let report = simulator.one_step();
                out_events.push(Event::StepCompleted { report });
            }
        }
        Command::Reset => {
            simulator.reset();
            out_events.push(Event::SimulationReset);
        }
        Command::PlaceGrain { index, grain } => match simulator.set_agent_at(index, grain) {
            Ok(_) => out_events.push(Event::GrainPlaced { index, grain }),
            Err(reason) => out_events.push(Event::EditRejected { reason }),
        },
        Command::ClearCell { index } => match simulator.clear_agent_at(index) {
            Ok(previous) => out_events.push(Event::CellCleared { index, previous }),
            Err(reason) => out_events.push(Event::EditRejected { reason }),
        },
        Command::SetFieldValue {
            field,
            index,
            value,
        } => match simulator.set_field_value_at(field, index, value) {
            Ok(value) => out_events.push(Event::FieldValueSet {
                field,
                index,
                value,
            }),
            Err(reason) => out_events.push(Event::EditRejected { reason }),
        },
    }
}

/// Query functions that provide read-only access to the simulator state.
pub mod query {
    use super::Simulator;
    use grainfield_core::{FieldId, FieldSnapshot, GrainId, GridSnapshot, Lattice, StepReport};
    use grainfield_system_reactions::RuleTable;
    use grainfield_system_statistics::Statistics;

    /// Captures an owned copy of the agents, ages and current field values.
    #[must_use]
    pub fn snapshot<R>(simulator: &Simulator<R>) -> GridSnapshot {
        GridSnapshot {
            step: simulator.step,
            agents: simulator.agents.clone(),
            ages: simulator.ages.clone(),
            fields: simulator
                .table
                .fields()
                .iter()
                .zip(&simulator.current)
                .map(|(field, values)| FieldSnapshot {
                    field: field.id(),
                    values: values.clone(),
                })
                .collect(),
        }
    }

    /// Lattice the simulator runs on.
    #[must_use]
    pub fn lattice<R>(simulator: &Simulator<R>) -> &Lattice {
        &simulator.lattice
    }

    /// Compiled rules, including synthesized movement behaviours.
    #[must_use]
    pub fn rules<R>(simulator: &Simulator<R>) -> &RuleTable {
        &simulator.table
    }

    /// Occupant of every cell.
    #[must_use]
    pub fn agents<R>(simulator: &Simulator<R>) -> &[Option<GrainId>] {
        &simulator.agents
    }

    /// Age of every occupant; `None` for empty cells.
    #[must_use]
    pub fn ages<R>(simulator: &Simulator<R>) -> &[Option<u32>] {
        &simulator.ages
    }

    /// Current intensities of `field`.
    #[must_use]
    pub fn field<R>(simulator: &Simulator<R>, field: FieldId) -> Option<&[f32]> {
        let slot = simulator.table.field_slot(field)?;
        simulator.current.get(slot).map(Vec::as_slice)
    }

    /// Number of steps completed since construction or the last reset.
    #[must_use]
    pub fn step<R>(simulator: &Simulator<R>) -> u64 {
        simulator.step
    }

    /// Number of cells currently occupied by `grain`.
    #[must_use]
    pub fn population<R>(simulator: &Simulator<R>, grain: GrainId) -> usize {
        simulator
            .agents
            .iter()
            .filter(|agent| **agent == Some(grain))
            .count()
    }

    /// Population series of `grain`, starting with the initial layout.
    #[must_use]
    pub fn grain_history<R>(simulator: &Simulator<R>, grain: GrainId) -> Option<&[u32]> {
        simulator.statistics.grain_history(grain)
    }

    /// Total-intensity series of `field`, starting with the initial floor.
    #[must_use]
    pub fn field_history<R>(simulator: &Simulator<R>, field: FieldId) -> Option<&[f64]> {
        simulator.statistics.field_history(field)
    }

    /// Largest population any grain has reached.
    #[must_use]
    pub fn max_grain_count<R>(simulator: &Simulator<R>) -> u32 {
        simulator.statistics.max_grain_count()
    }

    /// Largest total intensity any field has reached.
    #[must_use]
    pub fn max_field_amount<R>(simulator: &Simulator<R>) -> f64 {
        simulator.statistics.max_field_amount()
    }

    /// Counters of the most recent step.
    #[must_use]
    pub fn last_report<R>(simulator: &Simulator<R>) -> Option<&StepReport> {
        simulator.statistics.last_report()
    }

    /// Running statistics.
    #[must_use]
    pub fn statistics<R>(simulator: &Simulator<R>) -> &Statistics {
        &simulator.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grainfield_core::{Behaviour, DirectionSet, Field, FieldCoefficients, Grain, Reaction};

    const A: GrainId = GrainId::new(0);
    const SUGAR: FieldId = FieldId::new(0);

    fn model() -> RuleModel {
        RuleModel::new(
            vec![Grain::new(A).with_field(FieldCoefficients::new(SUGAR).with_production(0.25))],
            vec![Field::new(SUGAR).with_diffusion(0.2, DirectionSet::FOUR)],
            vec![Behaviour::new(A, Some(A), 1.0).with_reaction(Reaction::new(
                None,
                Some(A),
                DirectionSet::FOUR,
            ))],
        )
    }

    fn simulator() -> Simulator {
        let lattice = Lattice::planar(4, 4).expect("valid lattice");
        let mut layout = vec![None; lattice.data_size()];
        layout[5] = Some(A);
        Simulator::seeded(&model(), lattice, layout, 11).expect("valid model")
    }

    #[test]
    fn construction_rejects_layouts_of_the_wrong_size() {
        let lattice = Lattice::planar(4, 4).expect("valid lattice");
        let error = Simulator::seeded(&model(), lattice, vec![None; 3], 0)
            .expect_err("layout is too short");
        assert_eq!(
            error,
            ModelError::LayoutSizeMismatch {
                expected: 16,
                actual: 3
            }
        );
    }

    #[test]
    fn construction_seeds_history_with_the_initial_layout() {
        let simulator = simulator();
        assert_eq!(query::grain_history(&simulator, A), Some(&[1][..]));
        assert_eq!(query::step(&simulator), 0);
        assert_eq!(simulator.field_value_at(SUGAR, 0), Some(MIN_FIELD));
    }

    #[test]
    fn step_emits_completion_event_and_advances_counter() {
        let mut simulator = simulator();
        let mut events = Vec::new();

        apply(&mut simulator, Command::StepMany { count: 3 }, &mut events);

        assert_eq!(events.len(), 3);
        assert!(matches!(
            events.last(),
            Some(Event::StepCompleted { report }) if report.step == 2
        ));
        assert_eq!(query::step(&simulator), 3);
        assert_eq!(
            query::grain_history(&simulator, A).map(<[u32]>::len),
            Some(4)
        );
    }

    #[test]
    fn produced_intensity_reaches_the_field_buffer() {
        let mut simulator = simulator();
        let _ = simulator.one_step();
        let value = simulator.field_value_at(SUGAR, 5).expect("field exists");
        assert!(value > 0.2, "production was not applied: {value}");
    }

    #[test]
    fn edits_reject_bad_targets() {
        let mut simulator = simulator();
        let mut events = Vec::new();

        apply(
            &mut simulator,
            Command::PlaceGrain {
                index: 99,
                grain: A,
            },
            &mut events,
        );
        apply(
            &mut simulator,
            Command::PlaceGrain {
                index: 0,
                grain: GrainId::new(7),
            },
            &mut events,
        );
        apply(
            &mut simulator,
            Command::SetFieldValue {
                field: SUGAR,
                index: 0,
                value: f32::NAN,
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::EditRejected {
                    reason: EditError::OutOfBounds { index: 99 }
                },
                Event::EditRejected {
                    reason: EditError::UnknownGrain(GrainId::new(7))
                },
                Event::EditRejected {
                    reason: EditError::NonFiniteValue
                },
            ]
        );
    }

    #[test]
    fn edits_paint_and_clear_cells() {
        let mut simulator = simulator();
        let mut events = Vec::new();

        apply(
            &mut simulator,
            Command::PlaceGrain { index: 0, grain: A },
            &mut events,
        );
        assert_eq!(simulator.grain_at_index(0), Some(A));
        assert_eq!(query::ages(&simulator)[0], Some(0));

        apply(&mut simulator, Command::ClearCell { index: 0 }, &mut events);
        assert_eq!(simulator.grain_at_index(0), None);
        assert_eq!(query::ages(&simulator)[0], None);

        apply(
            &mut simulator,
            Command::SetFieldValue {
                field: SUGAR,
                index: 2,
                value: 4.0,
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::GrainPlaced { index: 0, grain: A },
                Event::CellCleared {
                    index: 0,
                    previous: Some(A)
                },
                Event::FieldValueSet {
                    field: SUGAR,
                    index: 2,
                    value: 1.0
                },
            ]
        );
        assert_eq!(simulator.field_value_at(SUGAR, 2), Some(1.0));
    }

    #[test]
    fn evaluators_bind_to_known_fields_only() {
        let simulator = simulator();
        assert!(matches!(
            simulator.with_field_evaluator(FieldId::new(4), grainfield_core::IdentityEvaluator),
            Err(EditError::UnknownField(_))
        ));
    }
}
